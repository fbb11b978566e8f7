//! # Webhook Notification Repository
//!
//! Append-only ledger of inbound push notifications.
//!
//! Rows are kept after successful processing for audit. The retry queue is
//! a query, not a separate table: unprocessed rows below the retry budget,
//! oldest first. Only the cleanup sweep deletes rows, and only processed
//! ones past the retention window.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mailsync_core::WebhookNotification;

/// Repository for webhook notification ledger operations.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, subscription_id, change_type, resource, client_state,
    processed, processing_error, retry_count, raw_payload,
    received_at, processed_at
"#;

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Persists a freshly accepted notification.
    pub async fn insert(&self, notification: &WebhookNotification) -> DbResult<()> {
        debug!(
            id = %notification.id,
            subscription_id = %notification.subscription_id,
            "Persisting webhook notification"
        );

        sqlx::query(
            r#"
            INSERT INTO webhook_notifications (
                id, subscription_id, change_type, resource, client_state,
                processed, processing_error, retry_count, raw_payload,
                received_at, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.subscription_id)
        .bind(&notification.change_type)
        .bind(&notification.resource)
        .bind(&notification.client_state)
        .bind(notification.processed)
        .bind(&notification.processing_error)
        .bind(notification.retry_count)
        .bind(&notification.raw_payload)
        .bind(notification.received_at)
        .bind(notification.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches one ledger entry by id.
    pub async fn get(&self, id: &str) -> DbResult<WebhookNotification> {
        let notification = sqlx::query_as::<_, WebhookNotification>(&format!(
            "SELECT {SELECT_COLUMNS} FROM webhook_notifications WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        notification.ok_or_else(|| DbError::not_found("WebhookNotification", id))
    }

    /// Marks an entry as processed (terminal success), clearing any prior
    /// error message.
    pub async fn mark_processed(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE webhook_notifications SET
                processed = 1,
                processed_at = ?1,
                processing_error = NULL
            WHERE id = ?2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed processing attempt: stores the error message and
    /// increments the retry counter.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_notifications SET
                processing_error = ?1,
                retry_count = retry_count + 1
            WHERE id = ?2
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists unprocessed entries with retries remaining, oldest received
    /// first. Entries at or above `max_retries` are abandoned: they stay in
    /// the ledger but never appear here again.
    pub async fn list_retryable(&self, max_retries: i64) -> DbResult<Vec<WebhookNotification>> {
        let notifications = sqlx::query_as::<_, WebhookNotification>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM webhook_notifications
            WHERE processed = 0 AND retry_count < ?1
            ORDER BY received_at ASC
            "#
        ))
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    /// Counts unprocessed entries (pending + abandoned).
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM webhook_notifications WHERE processed = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes processed entries received before the cutoff. Unprocessed
    /// entries are never purged, whatever their age.
    ///
    /// Returns the number of rows removed.
    pub async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM webhook_notifications WHERE processed = 1 AND received_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn notification(subscription_id: &str) -> WebhookNotification {
        WebhookNotification::new(
            subscription_id,
            Some("created".into()),
            Some(format!("users/a@x.com/messages/m-{subscription_id}")),
            Some("secret".into()),
            Some("{}".into()),
        )
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let db = test_db().await;
        let repo = db.notifications();

        let n = notification("sub-1");
        repo.insert(&n).await.unwrap();

        let found = repo.get(&n.id).await.unwrap();
        assert_eq!(found.subscription_id, "sub-1");
        assert!(!found.processed);
        assert_eq!(found.retry_count, 0);

        assert!(matches!(
            repo.get("missing").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn mark_processed_clears_error_and_stamps_time() {
        let db = test_db().await;
        let repo = db.notifications();

        let n = notification("sub-1");
        repo.insert(&n).await.unwrap();
        repo.mark_failed(&n.id, "transient").await.unwrap();
        repo.mark_processed(&n.id).await.unwrap();

        let found = repo.get(&n.id).await.unwrap();
        assert!(found.processed);
        assert!(found.processed_at.is_some());
        assert!(found.processing_error.is_none());
        // The failed attempt stays counted for audit.
        assert_eq!(found.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_queue_is_bounded_and_oldest_first() {
        let db = test_db().await;
        let repo = db.notifications();

        let mut old = notification("sub-old");
        old.received_at = Utc::now() - Duration::minutes(10);
        repo.insert(&old).await.unwrap();

        let fresh = notification("sub-fresh");
        repo.insert(&fresh).await.unwrap();

        let exhausted = notification("sub-exhausted");
        repo.insert(&exhausted).await.unwrap();
        for _ in 0..5 {
            repo.mark_failed(&exhausted.id, "boom").await.unwrap();
        }

        let done = notification("sub-done");
        repo.insert(&done).await.unwrap();
        repo.mark_processed(&done.id).await.unwrap();

        let retryable = repo.list_retryable(5).await.unwrap();

        assert_eq!(retryable.len(), 2);
        assert_eq!(retryable[0].subscription_id, "sub-old");
        assert_eq!(retryable[1].subscription_id, "sub-fresh");

        // Abandoned entries remain queryable with their last error.
        let abandoned = repo.get(&exhausted.id).await.unwrap();
        assert_eq!(abandoned.retry_count, 5);
        assert_eq!(abandoned.processing_error.as_deref(), Some("boom"));
        assert_eq!(repo.count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn purge_only_touches_old_processed_entries() {
        let db = test_db().await;
        let repo = db.notifications();
        let cutoff = Utc::now() - Duration::days(30);

        let mut old_done = notification("sub-old-done");
        old_done.received_at = Utc::now() - Duration::days(45);
        repo.insert(&old_done).await.unwrap();
        repo.mark_processed(&old_done.id).await.unwrap();

        let mut old_failed = notification("sub-old-failed");
        old_failed.received_at = Utc::now() - Duration::days(45);
        repo.insert(&old_failed).await.unwrap();
        repo.mark_failed(&old_failed.id, "boom").await.unwrap();

        let fresh_done = notification("sub-fresh-done");
        repo.insert(&fresh_done).await.unwrap();
        repo.mark_processed(&fresh_done.id).await.unwrap();

        let purged = repo.purge_processed_before(cutoff).await.unwrap();

        assert_eq!(purged, 1);
        assert!(repo.get(&old_done.id).await.is_err());
        assert!(repo.get(&old_failed.id).await.is_ok());
        assert!(repo.get(&fresh_done.id).await.is_ok());
    }
}
