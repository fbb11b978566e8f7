//! # Mailbox Repository
//!
//! Database operations for mailbox rows.
//!
//! ## Single-Writer Invariant
//! Mailbox rows are the unit of consistency for the whole system: cursor,
//! subscription fields and status must move together. Every update goes
//! through [`MailboxRepository::update`], which carries the version the
//! caller loaded. A stale version fails with [`DbError::Conflict`] instead
//! of overwriting a concurrent writer's cursor.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mailsync_core::{Mailbox, MailboxStatus};

/// Repository for mailbox database operations.
#[derive(Debug, Clone)]
pub struct MailboxRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, address, delta_cursor, subscription_id, subscription_expires_at,
    status, initial_sync_done, last_synced_at, last_error,
    consecutive_failures, created_at, updated_at, version
"#;

impl MailboxRepository {
    /// Creates a new MailboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MailboxRepository { pool }
    }

    /// Finds a mailbox by address.
    pub async fn find_by_address(&self, address: &str) -> DbResult<Option<Mailbox>> {
        let mailbox = sqlx::query_as::<_, Mailbox>(&format!(
            "SELECT {SELECT_COLUMNS} FROM mailboxes WHERE address = ?1"
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mailbox)
    }

    /// Finds a mailbox by address, failing with NotFound when absent.
    pub async fn get_by_address(&self, address: &str) -> DbResult<Mailbox> {
        self.find_by_address(address)
            .await?
            .ok_or_else(|| DbError::not_found("Mailbox", address))
    }

    /// Finds the mailbox owning a push subscription.
    pub async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> DbResult<Option<Mailbox>> {
        let mailbox = sqlx::query_as::<_, Mailbox>(&format!(
            "SELECT {SELECT_COLUMNS} FROM mailboxes WHERE subscription_id = ?1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mailbox)
    }

    /// Returns the mailbox for the address, creating a pristine
    /// NOT_INITIALIZED row on first reference.
    pub async fn get_or_create(&self, address: &str) -> DbResult<Mailbox> {
        if let Some(existing) = self.find_by_address(address).await? {
            return Ok(existing);
        }

        let mailbox = Mailbox::new(address);
        debug!(address = %address, id = %mailbox.id, "Creating mailbox row");

        sqlx::query(
            r#"
            INSERT INTO mailboxes (
                id, address, delta_cursor, subscription_id, subscription_expires_at,
                status, initial_sync_done, last_synced_at, last_error,
                consecutive_failures, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&mailbox.id)
        .bind(&mailbox.address)
        .bind(&mailbox.delta_cursor)
        .bind(&mailbox.subscription_id)
        .bind(mailbox.subscription_expires_at)
        .bind(mailbox.status)
        .bind(mailbox.initial_sync_done)
        .bind(mailbox.last_synced_at)
        .bind(&mailbox.last_error)
        .bind(mailbox.consecutive_failures)
        .bind(mailbox.created_at)
        .bind(mailbox.updated_at)
        .bind(mailbox.version)
        .execute(&self.pool)
        .await?;

        Ok(mailbox)
    }

    /// Persists the mutable fields of a mailbox, guarded by the optimistic
    /// version the caller loaded.
    ///
    /// Returns the stored row (version bumped, updated_at refreshed). A
    /// concurrent writer wins the race by bumping the version first; the
    /// loser gets [`DbError::Conflict`] and must reload.
    pub async fn update(&self, mailbox: &Mailbox) -> DbResult<Mailbox> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE mailboxes SET
                delta_cursor = ?1,
                subscription_id = ?2,
                subscription_expires_at = ?3,
                status = ?4,
                initial_sync_done = ?5,
                last_synced_at = ?6,
                last_error = ?7,
                consecutive_failures = ?8,
                updated_at = ?9,
                version = version + 1
            WHERE id = ?10 AND version = ?11
            "#,
        )
        .bind(&mailbox.delta_cursor)
        .bind(&mailbox.subscription_id)
        .bind(mailbox.subscription_expires_at)
        .bind(mailbox.status)
        .bind(mailbox.initial_sync_done)
        .bind(mailbox.last_synced_at)
        .bind(&mailbox.last_error)
        .bind(mailbox.consecutive_failures)
        .bind(now)
        .bind(&mailbox.id)
        .bind(mailbox.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a stale version from a missing row.
            let exists: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM mailboxes WHERE id = ?1")
                    .bind(&mailbox.id)
                    .fetch_one(&self.pool)
                    .await?;

            return Err(if exists > 0 {
                DbError::conflict("Mailbox", &mailbox.address)
            } else {
                DbError::not_found("Mailbox", &mailbox.address)
            });
        }

        let mut stored = mailbox.clone();
        stored.updated_at = now;
        stored.version += 1;
        Ok(stored)
    }

    /// Lists all mailboxes, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<Mailbox>> {
        let mailboxes = sqlx::query_as::<_, Mailbox>(&format!(
            "SELECT {SELECT_COLUMNS} FROM mailboxes ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(mailboxes)
    }

    /// Lists mailboxes in a given lifecycle state.
    pub async fn list_by_status(&self, status: MailboxStatus) -> DbResult<Vec<Mailbox>> {
        let mailboxes = sqlx::query_as::<_, Mailbox>(&format!(
            "SELECT {SELECT_COLUMNS} FROM mailboxes WHERE status = ?1 ORDER BY created_at ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(mailboxes)
    }

    /// Lists ACTIVE mailboxes whose subscription expires before the
    /// threshold. These are the renewal sweep candidates.
    pub async fn list_expiring_subscriptions(
        &self,
        threshold: DateTime<Utc>,
    ) -> DbResult<Vec<Mailbox>> {
        let mailboxes = sqlx::query_as::<_, Mailbox>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM mailboxes
            WHERE status = ?1
              AND subscription_expires_at IS NOT NULL
              AND subscription_expires_at < ?2
            ORDER BY subscription_expires_at ASC
            "#
        ))
        .bind(MailboxStatus::Active)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(mailboxes)
    }

    /// Lists ACTIVE mailboxes that have not synced since the threshold
    /// (or never synced at all).
    pub async fn list_stale(&self, threshold: DateTime<Utc>) -> DbResult<Vec<Mailbox>> {
        let mailboxes = sqlx::query_as::<_, Mailbox>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM mailboxes
            WHERE status = ?1
              AND (last_synced_at IS NULL OR last_synced_at < ?2)
            ORDER BY last_synced_at ASC
            "#
        ))
        .bind(MailboxStatus::Active)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(mailboxes)
    }

    /// Counts all mailboxes.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mailboxes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts mailboxes in a given lifecycle state.
    pub async fn count_by_status(&self, status: MailboxStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mailboxes WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
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

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let db = test_db().await;
        let repo = db.mailboxes();

        let first = repo.get_or_create("a@x.com").await.unwrap();
        let second = repo.get_or_create("a@x.com").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(second.status, MailboxStatus::NotInitialized);
    }

    #[tokio::test]
    async fn update_bumps_version_and_persists_fields() {
        let db = test_db().await;
        let repo = db.mailboxes();

        let mut mailbox = repo.get_or_create("a@x.com").await.unwrap();
        mailbox.status = MailboxStatus::Active;
        mailbox.delta_cursor = Some("cursor-1".into());
        mailbox.initial_sync_done = true;

        let stored = repo.update(&mailbox).await.unwrap();
        assert_eq!(stored.version, mailbox.version + 1);

        let reloaded = repo.get_by_address("a@x.com").await.unwrap();
        assert_eq!(reloaded.status, MailboxStatus::Active);
        assert_eq!(reloaded.delta_cursor.as_deref(), Some("cursor-1"));
        assert!(reloaded.initial_sync_done);
        assert_eq!(reloaded.version, stored.version);
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let db = test_db().await;
        let repo = db.mailboxes();

        let stale = repo.get_or_create("a@x.com").await.unwrap();

        // A concurrent writer lands first.
        let mut winner = stale.clone();
        winner.last_error = Some("first writer".into());
        repo.update(&winner).await.unwrap();

        let mut loser = stale;
        loser.last_error = Some("second writer".into());
        let err = repo.update(&loser).await.unwrap_err();

        assert!(matches!(err, DbError::Conflict { .. }));

        // The first write survives untouched.
        let reloaded = repo.get_by_address("a@x.com").await.unwrap();
        assert_eq!(reloaded.last_error.as_deref(), Some("first writer"));
    }

    #[tokio::test]
    async fn find_by_subscription_id_matches_only_owner() {
        let db = test_db().await;
        let repo = db.mailboxes();

        let mut a = repo.get_or_create("a@x.com").await.unwrap();
        a.subscription_id = Some("sub-a".into());
        a.subscription_expires_at = Some(Utc::now());
        repo.update(&a).await.unwrap();
        repo.get_or_create("b@x.com").await.unwrap();

        let found = repo.find_by_subscription_id("sub-a").await.unwrap();
        assert_eq!(found.unwrap().address, "a@x.com");

        assert!(repo
            .find_by_subscription_id("sub-missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expiring_subscriptions_query_filters_on_status_and_expiry() {
        let db = test_db().await;
        let repo = db.mailboxes();
        let now = Utc::now();

        // Expiring soon + active: candidate.
        let mut soon = repo.get_or_create("soon@x.com").await.unwrap();
        soon.status = MailboxStatus::Active;
        soon.subscription_id = Some("sub-soon".into());
        soon.subscription_expires_at = Some(now + Duration::hours(1));
        repo.update(&soon).await.unwrap();

        // Expiring late: not a candidate.
        let mut late = repo.get_or_create("late@x.com").await.unwrap();
        late.status = MailboxStatus::Active;
        late.subscription_id = Some("sub-late".into());
        late.subscription_expires_at = Some(now + Duration::hours(48));
        repo.update(&late).await.unwrap();

        // Expiring soon but disabled: not a candidate.
        let mut disabled = repo.get_or_create("off@x.com").await.unwrap();
        disabled.status = MailboxStatus::Disabled;
        disabled.subscription_id = Some("sub-off".into());
        disabled.subscription_expires_at = Some(now + Duration::hours(1));
        repo.update(&disabled).await.unwrap();

        let candidates = repo
            .list_expiring_subscriptions(now + Duration::hours(12))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "soon@x.com");
    }

    #[tokio::test]
    async fn stale_query_includes_never_synced_mailboxes() {
        let db = test_db().await;
        let repo = db.mailboxes();
        let now = Utc::now();

        let mut never = repo.get_or_create("never@x.com").await.unwrap();
        never.status = MailboxStatus::Active;
        repo.update(&never).await.unwrap();

        let mut fresh = repo.get_or_create("fresh@x.com").await.unwrap();
        fresh.status = MailboxStatus::Active;
        fresh.last_synced_at = Some(now);
        repo.update(&fresh).await.unwrap();

        let stale = repo.list_stale(now - Duration::minutes(30)).await.unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].address, "never@x.com");
    }
}
