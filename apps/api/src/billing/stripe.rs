/// Stripe REST client. Only the four calls reconciliation and the billing
/// endpoints need are implemented.
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;
use uuid::Uuid;

use crate::billing::{BillingError, BillingProvider, BillingSubscription, Customer};

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";
/// Pinned so subscription period bounds stay on the subscription object.
const STRIPE_VERSION: &str = "2024-06-20";

#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    price_id: String,
    app_base_url: String,
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        price_id: String,
        app_base_url: String,
    ) -> Result<Self, BillingError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            secret_key,
            price_id,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.secret_key)
            .header("Stripe-Version", STRIPE_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BillingError> {
        let response = self.authed(builder).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    fn checkout_form(&self, customer_email: &str, user_id: Uuid) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", self.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("customer_email", customer_email.to_string()),
            ("client_reference_id", user_id.to_string()),
            (
                "success_url",
                format!("{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}", self.app_base_url),
            ),
            ("cancel_url", format!("{}/pricing", self.app_base_url)),
        ]
    }

    /// The `portal_return` flag tells the web app to fire a critical sync.
    fn portal_return_url(&self) -> String {
        format!("{}/dashboard?portal_return=1", self.app_base_url)
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, BillingError> {
        let list: List<Customer> = self
            .send(
                self.client
                    .get(format!("{STRIPE_API_URL}/customers"))
                    .query(&[("email", email), ("limit", "1")]),
            )
            .await?;
        debug!("Stripe customer lookup returned {} result(s)", list.data.len());
        Ok(list.data.into_iter().next())
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<BillingSubscription>, BillingError> {
        let limit = limit.to_string();
        let list: List<BillingSubscription> = self
            .send(self.client.get(format!("{STRIPE_API_URL}/subscriptions")).query(&[
                ("customer", customer_id),
                ("status", "active"),
                ("limit", limit.as_str()),
            ]))
            .await?;
        Ok(list.data)
    }

    async fn create_checkout_session(
        &self,
        customer_email: &str,
        user_id: Uuid,
    ) -> Result<String, BillingError> {
        let session: SessionResponse = self
            .send(
                self.client
                    .post(format!("{STRIPE_API_URL}/checkout/sessions"))
                    .form(&self.checkout_form(customer_email, user_id)),
            )
            .await?;
        session.url.ok_or(BillingError::MissingUrl)
    }

    async fn create_portal_session(&self, customer_id: &str) -> Result<String, BillingError> {
        let form = [
            ("customer", customer_id.to_string()),
            ("return_url", self.portal_return_url()),
        ];
        let session: SessionResponse = self
            .send(
                self.client
                    .post(format!("{STRIPE_API_URL}/billing_portal/sessions"))
                    .form(&form),
            )
            .await?;
        session.url.ok_or(BillingError::MissingUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StripeClient {
        StripeClient::new(
            "sk_test".into(),
            "price_123".into(),
            "https://storyline.example/".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_checkout_form_carries_price_and_user() {
        let user = Uuid::new_v4();
        let form = client().checkout_form("a@b.c", user);
        assert!(form.contains(&("line_items[0][price]", "price_123".to_string())));
        assert!(form.contains(&("client_reference_id", user.to_string())));
        assert!(form.contains(&("mode", "subscription".to_string())));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(
            client().portal_return_url(),
            "https://storyline.example/dashboard?portal_return=1"
        );
    }

    #[test]
    fn test_list_envelope_deserializes() {
        let body = r#"{"object":"list","data":[{"id":"cus_1","email":"a@b.c"}],"has_more":false}"#;
        let list: List<Customer> = serde_json::from_str(body).unwrap();
        assert_eq!(list.data[0].id, "cus_1");
    }
}
