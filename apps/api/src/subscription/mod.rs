// Subscription Reconciliation: keeps the entitlement store in line with the
// billing provider. Trigger classification and debounce live in reconcile.rs.

pub mod cache;
pub mod handlers;
pub mod reconcile;
pub mod scheduler;

use serde::{Deserialize, Serialize};

/// Why a sync was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    PortalReturn,
    DailyCheck,
    /// The user pressed "refresh subscription".
    Manual,
    /// Client background timer, every 5 minutes by default.
    Periodic,
    VisibilityRegained,
    FocusRegained,
}

impl SyncTrigger {
    /// Critical triggers bypass the local cache and always run a full sync.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            SyncTrigger::Startup
                | SyncTrigger::PortalReturn
                | SyncTrigger::DailyCheck
                | SyncTrigger::Manual
        )
    }

    /// Only user-initiated syncs surface failures.
    pub fn is_user_initiated(self) -> bool {
        self == SyncTrigger::Manual
    }
}
