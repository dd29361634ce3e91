use std::future::Future;

use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::entitlements::EntitlementStore;
use crate::errors::AppError;

/// `{success, error?}` body for credit operations. Failures are reported here
/// instead of as HTTP errors so the caller can roll back its optimistic state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn from_balance(result: Result<i32, AppError>) -> Self {
        match result {
            Ok(balance) => Self {
                success: true,
                balance: Some(balance),
                error: None,
            },
            Err(e) => {
                warn!("Credit operation failed: {e}");
                Self {
                    success: false,
                    balance: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Deducts `amount` credits, runs `op`, and refunds the deduction if `op` fails.
///
/// The refund goes through `deduct_credits` with a negated amount. A failed
/// refund is logged and the original error is still returned.
pub async fn charge_then<T, F, Fut>(
    store: &dyn EntitlementStore,
    user_id: Uuid,
    amount: i32,
    op: F,
) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let balance = store.deduct_credits(user_id, amount).await?;
    debug!("Charged {amount} credit(s) to user {user_id}, balance now {balance}");

    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Refunding {amount} credit(s) to user {user_id} after failure: {e}");
            if let Err(refund_err) = store.deduct_credits(user_id, -amount).await {
                error!("Refund of {amount} credit(s) for user {user_id} failed: {refund_err}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryEntitlementStore;

    #[tokio::test]
    async fn test_successful_op_keeps_charge() {
        let store = MemoryEntitlementStore::default();
        let user = Uuid::new_v4();
        store.add_credits(user, 5).await.unwrap();

        let out = charge_then(&store, user, 2, || async { Ok::<_, AppError>("done") })
            .await
            .unwrap();

        assert_eq!(out, "done");
        assert_eq!(store.get(user).await.unwrap().token_balance, 3);
    }

    #[tokio::test]
    async fn test_failed_op_is_refunded() {
        let store = MemoryEntitlementStore::default();
        let user = Uuid::new_v4();
        store.add_credits(user, 5).await.unwrap();

        let err = charge_then(&store, user, 2, || async {
            Err::<(), _>(AppError::Llm("upstream timeout".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(store.get(user).await.unwrap().token_balance, 5);
    }

    #[test]
    fn test_operation_result_failure_shape() {
        let r = OperationResult::from_balance(Err(AppError::NotFound("user".into())));
        assert!(!r.success);
        assert!(r.balance.is_none());
        assert!(r.error.unwrap().contains("user"));
    }
}
