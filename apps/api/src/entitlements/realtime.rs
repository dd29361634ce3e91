//! Bridges Postgres `NOTIFY user_tokens_changed` into `TokenEvents`.
//!
//! Notifications are treated as invalidations only: the payload is parsed as a
//! user id and the row is re-read through the store before publishing.

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entitlements::events::{TokenEvents, TokenUpdate};
use crate::entitlements::EntitlementStore;

pub const CHANNEL: &str = "user_tokens_changed";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Re-reads the entitlement named by `payload` and publishes it.
/// Returns false if the payload was ignored or the re-read failed.
pub async fn refetch_and_publish(
    payload: &str,
    store: &dyn EntitlementStore,
    events: &TokenEvents,
) -> bool {
    let user_id = match Uuid::parse_str(payload.trim()) {
        Ok(id) => id,
        Err(_) => {
            warn!("Ignoring {CHANNEL} notification with unparseable payload '{payload}'");
            return false;
        }
    };

    match store.get(user_id).await {
        Ok(row) => {
            debug!("Entitlement change for user {user_id}, publishing re-read value");
            events.publish(&TokenUpdate::from(&row));
            true
        }
        Err(e) => {
            warn!("Re-read after {CHANNEL} notification failed for user {user_id}: {e}");
            false
        }
    }
}

async fn listen_once(pool: &PgPool, store: &dyn EntitlementStore, events: &TokenEvents) -> Result<()> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANNEL).await?;
    info!("Listening for {CHANNEL} notifications");

    loop {
        let notification = listener.recv().await?;
        refetch_and_publish(notification.payload(), store, events).await;
    }
}

/// Runs the listener forever, reconnecting after failures.
pub async fn listen_for_token_changes(
    pool: PgPool,
    store: std::sync::Arc<dyn EntitlementStore>,
    events: TokenEvents,
) {
    loop {
        if let Err(e) = listen_once(&pool, store.as_ref(), &events).await {
            warn!(
                "{CHANNEL} listener stopped: {e}; reconnecting in {}s",
                RECONNECT_DELAY.as_secs()
            );
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlements::Plan;
    use crate::testing::MemoryEntitlementStore;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_garbage_payload_is_ignored() {
        let store = MemoryEntitlementStore::default();
        let events = TokenEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.subscribe(move |u| sink.lock().unwrap().push(u.clone()));

        assert!(!refetch_and_publish("not-a-uuid", &store, &events).await);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publishes_re_read_value() {
        let store = MemoryEntitlementStore::default();
        let user = Uuid::new_v4();
        store.set_plan(user, Plan::Premium).await.unwrap();
        store.add_credits(user, 7).await.unwrap();

        let events = TokenEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.subscribe(move |u| sink.lock().unwrap().push(u.clone()));

        assert!(refetch_and_publish(&format!(" {user}\n"), &store, &events).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user_id, user);
        assert_eq!(seen[0].plan, Plan::Premium);
        assert_eq!(seen[0].token_balance, 7);
    }
}
