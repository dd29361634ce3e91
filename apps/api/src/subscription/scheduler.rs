use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::user::User;
use crate::subscription::reconcile::Reconciler;
use crate::subscription::SyncTrigger;

/// Users that have a cached subscription row, i.e. everyone whose plan may
/// have changed at the billing provider since their last visit.
async fn subscribed_users(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM users u
        JOIN subscriptions s ON s.user_id = u.id
        ORDER BY u.created_at
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Runs one `DailyCheck` pass. Returns `(synced, failed)`.
pub async fn run_daily_check(pool: &PgPool, reconciler: &Reconciler) -> (usize, usize) {
    let users = match subscribed_users(pool).await {
        Ok(users) => users,
        Err(e) => {
            warn!("Daily subscription check could not list users: {e}");
            return (0, 0);
        }
    };

    let mut synced = 0;
    let mut failed = 0;
    for user in &users {
        match reconciler.sync(user, SyncTrigger::DailyCheck).await {
            Ok(_) => synced += 1,
            Err(e) => {
                failed += 1;
                warn!("Daily subscription check failed for user {}: {e}", user.id);
            }
        }
    }
    (synced, failed)
}

/// Spawns the daily sweep. The first tick fires immediately. Abort the handle
/// to stop it.
pub fn spawn_daily_check(
    pool: PgPool,
    reconciler: Arc<Reconciler>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let (synced, failed) = run_daily_check(&pool, &reconciler).await;
            info!("Daily subscription check complete: {synced} synced, {failed} failed");
        }
    })
}
