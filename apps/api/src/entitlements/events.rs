//! In-process publish/subscribe for entitlement changes.
//!
//! Injected through `AppState`; there is no module-level listener set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use uuid::Uuid;

use crate::entitlements::{effective_plan, Plan};
use crate::models::entitlement::EntitlementRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenUpdate {
    pub user_id: Uuid,
    pub plan: Plan,
    pub custom_premium: bool,
    pub token_balance: i32,
}

impl From<&EntitlementRow> for TokenUpdate {
    fn from(row: &EntitlementRow) -> Self {
        Self {
            user_id: row.user_id,
            plan: effective_plan(row),
            custom_premium: row.custom_premium == 1,
            token_balance: row.token_balance,
        }
    }
}

type Listener = Arc<dyn Fn(&TokenUpdate) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    by_id: Mutex<HashMap<u64, Listener>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Listener>> {
        self.by_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct TokenEvents {
    listeners: Arc<Listeners>,
}

impl TokenEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` until the returned `Subscription` is dropped or
    /// explicitly unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TokenUpdate) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Arc::new(callback));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Calls every current listener with `update`. Listeners run outside the
    /// lock, so they may subscribe or unsubscribe.
    pub fn publish(&self, update: &TokenUpdate) {
        let snapshot: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in snapshot {
            listener(update);
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Handle returned by `TokenEvents::subscribe`.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn update(balance: i32) -> TokenUpdate {
        TokenUpdate {
            user_id: Uuid::nil(),
            plan: Plan::Basic,
            custom_premium: false,
            token_balance: balance,
        }
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let events = TokenEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let _a = events.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let _b = events.subscribe(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });

        events.publish(&update(1));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let events = TokenEvents::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = events.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        events.publish(&update(1));
        sub.unsubscribe();
        events.publish(&update(2));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_drop_releases_listener() {
        let events = TokenEvents::new();
        {
            let _sub = events.subscribe(|_| {});
            assert_eq!(events.listener_count(), 1);
        }
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_update_uses_effective_plan() {
        let row = EntitlementRow {
            custom_premium: 1,
            ..EntitlementRow::basic_default(Uuid::new_v4())
        };
        let u = TokenUpdate::from(&row);
        assert_eq!(u.plan, Plan::Premium);
        assert!(u.custom_premium);
    }
}
