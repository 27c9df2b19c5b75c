//! Stripe REST client
//!
//! Talks to the Stripe API with plain form-encoded requests and bearer auth.

use std::time::Duration;

use async_trait::async_trait;
use freezealert_shared::{config, ConfigError};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::checkout::{
    checkout_form_params, CheckoutRequest, CheckoutSession, CheckoutSessionResponse,
};
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::StripeSubscription;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_SUCCESS_URL: &str = "https://freeze-alert.com/success";
const DEFAULT_CANCEL_URL: &str = "https://freeze-alert.com/cancelled";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Annual subscription price
    pub price_id: String,
    /// Promotion code applied to every checkout, if set
    pub promo_code: Option<String>,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: config::required("STRIPE_SECRET_KEY")?,
            webhook_secret: config::required("STRIPE_WEBHOOK_SECRET")?,
            price_id: config::required("STRIPE_PRICE_ID")?,
            promo_code: config::optional("STRIPE_PROMO_CODE"),
            api_base: config::trim_base_url(&config::or_default(
                "STRIPE_API_BASE",
                DEFAULT_API_BASE,
            )),
            success_url: config::or_default("STRIPE_SUCCESS_URL", DEFAULT_SUCCESS_URL),
            cancel_url: config::or_default("STRIPE_CANCEL_URL", DEFAULT_CANCEL_URL),
        })
    }
}

/// Outbound payment-provider calls
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a subscription Checkout session carrying the request as metadata
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession>;

    /// Fetch the billing period end of a subscription (unix seconds)
    async fn subscription_period_end(&self, stripe_subscription_id: &str)
        -> BillingResult<Option<i64>>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: Option<StripeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    /// Turn a non-2xx response into `BillingError::StripeApi`
    async fn error_from_response(response: reqwest::Response) -> BillingError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("Stripe API error: {}", status.as_u16()));

        tracing::error!(status = %status, error_body = %body, "Stripe API call failed");
        BillingError::StripeApi(format!("Stripe API error ({}): {}", status.as_u16(), message))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let form_params = checkout_form_params(&self.config, request, now);

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .form(&form_params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| BillingError::MalformedResponse(format!("checkout session: {}", e)))?;

        let url = session.url.ok_or_else(|| {
            BillingError::MalformedResponse(format!(
                "checkout session {} created without a URL",
                session.id
            ))
        })?;

        tracing::info!(
            session_id = %session.id,
            zip_code = %request.zip_code,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn subscription_period_end(
        &self,
        stripe_subscription_id: &str,
    ) -> BillingResult<Option<i64>> {
        let response = self
            .http
            .get(format!(
                "{}/v1/subscriptions/{}",
                self.config.api_base, stripe_subscription_id
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let subscription: StripeSubscription = response
            .json()
            .await
            .map_err(|e| BillingError::MalformedResponse(format!("subscription: {}", e)))?;

        Ok(subscription.period_end())
    }
}

/// In-memory payment provider that records checkout requests
///
/// Used in place of Stripe by tests and local runs.
pub struct RecordingPaymentProvider {
    checkout_base_url: String,
    period_end: Option<i64>,
    fail_checkout: bool,
    fail_fetch: bool,
    checkouts: Mutex<Vec<CheckoutRequest>>,
}

impl RecordingPaymentProvider {
    pub fn new() -> Self {
        Self {
            checkout_base_url: "https://checkout.stripe.com/c/pay".to_string(),
            period_end: Some(1_767_225_600),
            fail_checkout: false,
            fail_fetch: false,
            checkouts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every checkout creation with a Stripe error
    pub fn failing_checkout(mut self) -> Self {
        self.fail_checkout = true;
        self
    }

    /// Fail every subscription fetch with a Stripe error
    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn with_period_end(mut self, period_end: Option<i64>) -> Self {
        self.period_end = period_end;
        self
    }

    pub async fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().await.clone()
    }
}

impl Default for RecordingPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProvider for RecordingPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        if self.fail_checkout {
            return Err(BillingError::StripeApi("checkout disabled".to_string()));
        }
        let mut checkouts = self.checkouts.lock().await;
        checkouts.push(request.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: format!("{}/{}", self.checkout_base_url, id),
            id,
        })
    }

    async fn subscription_period_end(&self, _stripe_subscription_id: &str) -> BillingResult<Option<i64>> {
        if self.fail_fetch {
            return Err(BillingError::StripeApi("subscription fetch disabled".to_string()));
        }
        Ok(self.period_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(api_base: String) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_id: "price_annual".to_string(),
            promo_code: None,
            api_base,
            success_url: "https://freeze-alert.com/success".to_string(),
            cancel_url: "https://freeze-alert.com/cancelled".to_string(),
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            phone: "+15125551234".to_string(),
            zip_code: "78701".to_string(),
            timezone: "America/Chicago".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkout/sessions")
            .match_header("authorization", "Bearer sk_test_123")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("mode".to_string(), "subscription".to_string()),
                Matcher::UrlEncoded("metadata[phone]".to_string(), "+15125551234".to_string()),
                Matcher::UrlEncoded("metadata[zip_code]".to_string(), "78701".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id": "cs_test_1", "url": "https://checkout.stripe.com/c/pay/cs_test_1"}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url())).unwrap();
        let session = client.create_checkout_session(&request()).await.unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, "https://checkout.stripe.com/c/pay/cs_test_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_checkout_without_url_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkout/sessions")
            .with_status(200)
            .with_body(r#"{"id": "cs_test_1", "url": null}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url())).unwrap();
        let err = client.create_checkout_session(&request()).await.unwrap_err();
        assert!(matches!(err, BillingError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_checkout_error_message_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkout/sessions")
            .with_status(400)
            .with_body(r#"{"error": {"message": "No such price: 'price_annual'"}}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url())).unwrap();
        let err = client.create_checkout_session(&request()).await.unwrap_err();
        match err {
            BillingError::StripeApi(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("No such price"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscription_period_end_falls_back_to_item() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_123")
            .match_header("authorization", "Bearer sk_test_123")
            .with_status(200)
            .with_body(
                r#"{"id": "sub_123", "items": {"data": [{"id": "si_1", "current_period_end": 1767225600}]}}"#,
            )
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url())).unwrap();
        assert_eq!(
            client.subscription_period_end("sub_123").await.unwrap(),
            Some(1_767_225_600)
        );
    }

    #[tokio::test]
    async fn test_subscription_fetch_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_missing")
            .with_status(404)
            .with_body(r#"{"error": {"message": "No such subscription"}}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url())).unwrap();
        assert!(matches!(
            client.subscription_period_end("sub_missing").await,
            Err(BillingError::StripeApi(_))
        ));
    }
}
