//! # Sweep Scheduler
//!
//! Timer-driven background tasks: subscription renewal sweep, webhook
//! retry sweep, and webhook cleanup. Each task is an independent interval
//! loop holding only injected handles; there is no shared scheduler state
//! beyond the shutdown channel.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::subscription::SubscriptionManager;
use crate::webhook::NotificationProcessor;

// =============================================================================
// Settings
// =============================================================================

/// Intervals for the periodic sweeps.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Subscription renewal sweep cadence.
    pub subscription_sweep_interval: Duration,

    /// Webhook retry sweep cadence.
    pub retry_sweep_interval: Duration,

    /// Webhook ledger cleanup cadence.
    pub cleanup_interval: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            subscription_sweep_interval: Duration::from_secs(3600),
            retry_sweep_interval: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(86_400),
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Spawns and owns the periodic sweep tasks.
pub struct SweepScheduler {
    subscriptions: SubscriptionManager,
    notifications: NotificationProcessor,
    settings: SweepSettings,
}

/// Handle for shutting the sweep tasks down.
#[derive(Clone)]
pub struct SweepHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl SweepHandle {
    /// Signals all sweep loops to stop after their current iteration.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl SweepScheduler {
    /// Creates a new scheduler over the given components.
    pub fn new(
        subscriptions: SubscriptionManager,
        notifications: NotificationProcessor,
        settings: SweepSettings,
    ) -> Self {
        SweepScheduler {
            subscriptions,
            notifications,
            settings,
        }
    }

    /// Spawns the three sweep loops and returns their shutdown handle.
    pub fn start(self) -> SweepHandle {
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            subscription_sweep_secs = self.settings.subscription_sweep_interval.as_secs(),
            retry_sweep_secs = self.settings.retry_sweep_interval.as_secs(),
            cleanup_secs = self.settings.cleanup_interval.as_secs(),
            "Starting periodic sweeps"
        );

        {
            let subscriptions = self.subscriptions.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let period = self.settings.subscription_sweep_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = subscriptions.sweep().await {
                                error!(error = %e, "Subscription sweep failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Subscription sweep stopping");
                            break;
                        }
                    }
                }
            });
        }

        {
            let notifications = self.notifications.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            let period = self.settings.retry_sweep_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = notifications.retry_sweep().await {
                                error!(error = %e, "Notification retry sweep failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Notification retry sweep stopping");
                            break;
                        }
                    }
                }
            });
        }

        {
            let notifications = self.notifications;
            let mut shutdown_rx = shutdown_tx.subscribe();
            let period = self.settings.cleanup_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = notifications.cleanup().await {
                                error!(error = %e, "Notification cleanup failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            info!("Notification cleanup stopping");
                            break;
                        }
                    }
                }
            });
        }

        SweepHandle { shutdown_tx }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SubscriptionSettings, SyncSettings, WebhookSettings};
    use crate::sync::DeltaSyncEngine;
    use crate::testing::FakeProvider;
    use chrono::Utc;
    use mailsync_core::MailboxStatus;
    use mailsync_db::{Database, DbConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn sweeps_run_and_stop_on_shutdown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let fake = Arc::new(FakeProvider::new());
        let engine = DeltaSyncEngine::new(db.clone(), fake.clone(), SyncSettings::default());
        let subscriptions =
            SubscriptionManager::new(db.clone(), fake.clone(), SubscriptionSettings::default());
        let notifications =
            NotificationProcessor::new(db.clone(), engine, WebhookSettings::new("secret"));

        // One renewal candidate so the subscription sweep has work.
        let mut mailbox = db.mailboxes().get_or_create("a@x.com").await.unwrap();
        mailbox.status = MailboxStatus::Active;
        mailbox.initial_sync_done = true;
        mailbox.subscription_id = Some("sub-old".into());
        mailbox.subscription_expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        db.mailboxes().update(&mailbox).await.unwrap();

        let scheduler = SweepScheduler::new(
            subscriptions,
            notifications,
            SweepSettings {
                subscription_sweep_interval: Duration::from_millis(10),
                retry_sweep_interval: Duration::from_millis(10),
                cleanup_interval: Duration::from_millis(10),
            },
        );
        let handle = scheduler.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        assert!(fake.calls_for("renew_subscription") >= 1);

        // After shutdown no further provider calls happen.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls_after_shutdown = fake.calls_for("renew_subscription");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fake.calls_for("renew_subscription"), calls_after_shutdown);
    }
}
