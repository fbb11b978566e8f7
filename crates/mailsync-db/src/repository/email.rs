//! # Email Repository
//!
//! Database operations for the local message mirror.
//!
//! ## Upsert Contract
//! `message_id` is globally unique. The engine looks up by message id and
//! either inserts (CREATED) or overwrites mutable fields (UPDATED);
//! deletion events flag the row (DELETED) instead of removing it. This
//! repository provides those three primitives; the classification decision
//! lives in the sync engine.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mailsync_core::{ChangeKind, EmailRecord};

/// Repository for email database operations.
#[derive(Debug, Clone)]
pub struct EmailRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, message_id, mailbox_id, subject, sender_email, sender_name,
    recipients, received_at, has_attachments, is_read, importance,
    body_preview, body_content, body_content_type, categories,
    conversation_id, change_kind, is_deleted, raw_json,
    created_at, updated_at
"#;

impl EmailRepository {
    /// Creates a new EmailRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EmailRepository { pool }
    }

    /// Finds an email by its provider message id.
    pub async fn find_by_message_id(&self, message_id: &str) -> DbResult<Option<EmailRecord>> {
        let email = sqlx::query_as::<_, EmailRecord>(&format!(
            "SELECT {SELECT_COLUMNS} FROM emails WHERE message_id = ?1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(email)
    }

    /// Inserts a new email row.
    pub async fn insert(&self, email: &EmailRecord) -> DbResult<()> {
        debug!(message_id = %email.message_id, "Inserting email");

        sqlx::query(
            r#"
            INSERT INTO emails (
                id, message_id, mailbox_id, subject, sender_email, sender_name,
                recipients, received_at, has_attachments, is_read, importance,
                body_preview, body_content, body_content_type, categories,
                conversation_id, change_kind, is_deleted, raw_json,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21
            )
            "#,
        )
        .bind(&email.id)
        .bind(&email.message_id)
        .bind(&email.mailbox_id)
        .bind(&email.subject)
        .bind(&email.sender_email)
        .bind(&email.sender_name)
        .bind(&email.recipients)
        .bind(email.received_at)
        .bind(email.has_attachments)
        .bind(email.is_read)
        .bind(&email.importance)
        .bind(&email.body_preview)
        .bind(&email.body_content)
        .bind(&email.body_content_type)
        .bind(&email.categories)
        .bind(&email.conversation_id)
        .bind(email.change_kind)
        .bind(email.is_deleted)
        .bind(&email.raw_json)
        .bind(email.created_at)
        .bind(email.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites the mutable fields of an existing email, keyed by
    /// message id. `created_at` and identity columns never change.
    pub async fn update(&self, email: &EmailRecord) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE emails SET
                subject = ?1,
                sender_email = ?2,
                sender_name = ?3,
                recipients = ?4,
                received_at = ?5,
                has_attachments = ?6,
                is_read = ?7,
                importance = ?8,
                body_preview = ?9,
                body_content = ?10,
                body_content_type = ?11,
                categories = ?12,
                conversation_id = ?13,
                change_kind = ?14,
                is_deleted = ?15,
                raw_json = ?16,
                updated_at = ?17
            WHERE message_id = ?18
            "#,
        )
        .bind(&email.subject)
        .bind(&email.sender_email)
        .bind(&email.sender_name)
        .bind(&email.recipients)
        .bind(email.received_at)
        .bind(email.has_attachments)
        .bind(email.is_read)
        .bind(&email.importance)
        .bind(&email.body_preview)
        .bind(&email.body_content)
        .bind(&email.body_content_type)
        .bind(&email.categories)
        .bind(&email.conversation_id)
        .bind(email.change_kind)
        .bind(email.is_deleted)
        .bind(&email.raw_json)
        .bind(now)
        .bind(&email.message_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Email", &email.message_id));
        }

        Ok(())
    }

    /// Flags an email as deleted (logical delete). Unknown message ids are
    /// reported via NotFound; the engine decides whether that matters.
    pub async fn mark_deleted(&self, message_id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE emails SET
                is_deleted = 1,
                change_kind = ?1,
                updated_at = ?2
            WHERE message_id = ?3
            "#,
        )
        .bind(ChangeKind::Deleted)
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Email", message_id));
        }

        Ok(())
    }

    /// Counts all mirrored emails.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts emails owned by one mailbox.
    pub async fn count_by_mailbox(&self, mailbox_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE mailbox_id = ?1")
            .bind(mailbox_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
