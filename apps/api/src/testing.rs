//! In-memory stand-ins for the storage and billing seams, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::billing::{BillingError, BillingProvider, BillingSubscription, Customer};
use crate::entitlements::{EntitlementStore, Plan};
use crate::errors::AppError;
use crate::interview::feedback::Feedback;
use crate::interview::iterations::{already_has_feedback, IterationStore, NewIteration};
use crate::models::answer::AnswerIterationRow;
use crate::models::entitlement::EntitlementRow;
use crate::models::subscription::SubscriptionRow;
use crate::models::usage::UsageEventRow;
use crate::subscription::cache::SubscriptionCache;
use crate::usage::{UsageStore, UsageType};

#[derive(Default)]
pub struct MemoryEntitlementStore {
    rows: Mutex<HashMap<Uuid, EntitlementRow>>,
}

impl MemoryEntitlementStore {
    fn update<T>(&self, user_id: Uuid, f: impl FnOnce(&mut EntitlementRow) -> T) -> T {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry(user_id)
            .or_insert_with(|| EntitlementRow::basic_default(user_id));
        row.updated_at = Utc::now();
        f(row)
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn get(&self, user_id: Uuid) -> Result<EntitlementRow, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| EntitlementRow::basic_default(user_id)))
    }

    async fn set_plan(&self, user_id: Uuid, plan: Plan) -> Result<i32, AppError> {
        Ok(self.update(user_id, |row| {
            row.plan_indicator = plan.indicator();
            row.plan_indicator
        }))
    }

    async fn toggle_custom_premium(&self, user_id: Uuid) -> Result<i32, AppError> {
        Ok(self.update(user_id, |row| {
            row.custom_premium = 1 - row.custom_premium;
            row.custom_premium
        }))
    }

    async fn deduct_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        Ok(self.update(user_id, |row| {
            row.token_balance -= amount;
            row.token_balance
        }))
    }

    async fn add_credits(&self, user_id: Uuid, amount: i32) -> Result<i32, AppError> {
        Ok(self.update(user_id, |row| {
            row.token_balance += amount;
            row.token_balance
        }))
    }
}

#[derive(Default)]
pub struct MemorySubscriptionCache {
    rows: Mutex<HashMap<Uuid, SubscriptionRow>>,
}

impl MemorySubscriptionCache {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionCache for MemorySubscriptionCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<SubscriptionRow>, AppError> {
        Ok(self.rows.lock().unwrap().get(&user_id).cloned())
    }

    async fn upsert(&self, row: &SubscriptionRow) -> Result<(), AppError> {
        self.rows.lock().unwrap().insert(row.user_id, row.clone());
        Ok(())
    }
}

/// Scripted billing provider. Clones start with fresh call counters.
#[derive(Default)]
pub struct FakeBilling {
    customer: Option<Customer>,
    subscription: Mutex<Option<BillingSubscription>>,
    fail: bool,
    customer_calls: AtomicUsize,
    subscription_calls: AtomicUsize,
}

impl Clone for FakeBilling {
    fn clone(&self) -> Self {
        Self {
            customer: self.customer.clone(),
            subscription: Mutex::new(self.subscription.lock().unwrap().clone()),
            fail: self.fail,
            ..Default::default()
        }
    }
}

impl FakeBilling {
    pub fn with_customer(email: &str, subscription: Option<BillingSubscription>) -> Self {
        Self {
            customer: Some(Customer {
                id: "cus_test".into(),
                email: Some(email.to_string()),
            }),
            subscription: Mutex::new(subscription),
            ..Default::default()
        }
    }

    pub fn set_subscription(&self, subscription: Option<BillingSubscription>) {
        *self.subscription.lock().unwrap() = subscription;
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn active_subscription() -> BillingSubscription {
        let now = Utc::now().timestamp();
        BillingSubscription {
            id: "sub_test".into(),
            status: "active".into(),
            current_period_start: Some(now - 86_400),
            current_period_end: Some(now + 29 * 86_400),
            cancel_at_period_end: false,
        }
    }

    pub fn customer_calls(&self) -> usize {
        self.customer_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, BillingError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BillingError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self
            .customer
            .clone()
            .filter(|c| c.email.as_deref() == Some(email)))
    }

    async fn list_active_subscriptions(
        &self,
        _customer_id: &str,
        limit: u32,
    ) -> Result<Vec<BillingSubscription>, BillingError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .subscription
            .lock()
            .unwrap()
            .clone()
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn create_checkout_session(
        &self,
        _customer_email: &str,
        user_id: Uuid,
    ) -> Result<String, BillingError> {
        Ok(format!("https://checkout.test/{user_id}"))
    }

    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError> {
        Ok(format!("https://portal.test/{customer_id}"))
    }
}

#[derive(Default)]
pub struct MemoryUsageStore {
    events: Mutex<Vec<UsageEventRow>>,
}

impl MemoryUsageStore {
    pub fn push_at(&self, user_id: Uuid, usage_type: UsageType, at: DateTime<Utc>) {
        self.events.lock().unwrap().push(UsageEventRow {
            id: Uuid::new_v4(),
            user_id,
            usage_type: usage_type.as_str().to_string(),
            created_at: at,
        });
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn count_between(
        &self,
        user_id: Uuid,
        usage_type: UsageType,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.usage_type == usage_type.as_str()
                    && e.created_at >= from
                    && e.created_at < until
            })
            .count() as u32)
    }

    async fn record(&self, user_id: Uuid, usage_type: UsageType) -> Result<UsageEventRow, AppError> {
        let row = UsageEventRow {
            id: Uuid::new_v4(),
            user_id,
            usage_type: usage_type.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.events.lock().unwrap().push(row.clone());
        Ok(row)
    }
}

#[derive(Default)]
pub struct MemoryIterationStore {
    rows: Mutex<Vec<AnswerIterationRow>>,
}

#[async_trait]
impl IterationStore for MemoryIterationStore {
    async fn append(&self, new: NewIteration) -> Result<AnswerIterationRow, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let next = rows
            .iter()
            .filter(|r| {
                r.job_application_id == new.job_application_id
                    && r.question_index == new.question_index
            })
            .map(|r| r.iteration)
            .max()
            .unwrap_or(0)
            + 1;
        let row = AnswerIterationRow {
            id: Uuid::new_v4(),
            job_application_id: new.job_application_id,
            user_id: new.user_id,
            question_index: new.question_index,
            iteration: next,
            answer_text: new.answer_text,
            feedback: None,
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn list(
        &self,
        job_application_id: Uuid,
        question_index: i32,
    ) -> Result<Vec<AnswerIterationRow>, AppError> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.job_application_id == job_application_id && r.question_index == question_index
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.iteration);
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> Result<AnswerIterationRow, AppError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Answer iteration {id} not found")))
    }

    async fn attach_feedback(
        &self,
        id: Uuid,
        feedback: &Feedback,
    ) -> Result<AnswerIterationRow, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Answer iteration {id} not found")))?;
        if row.feedback.is_some() {
            return Err(already_has_feedback(id));
        }
        row.feedback = Some(serde_json::to_value(feedback).unwrap());
        Ok(row.clone())
    }
}
