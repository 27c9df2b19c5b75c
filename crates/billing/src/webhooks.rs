//! Stripe webhook handling
//!
//! Three event types drive the subscription lifecycle:
//!
//! - `checkout.session.completed`: create an `active` subscription and text a confirmation
//! - `customer.subscription.deleted`: move the subscription to `cancelled`
//! - `invoice.payment_failed`: logged for manual follow-up, no state change
//!
//! Everything else is acknowledged without processing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono_tz::Tz;
use freezealert_shared::signature::verify_stripe_signature;
use freezealert_shared::{
    attempt_send, mask_phone, messages, CancelOutcome, NewSubscription, SmsSender,
    SubscriptionStore, ValidationError, US_TIMEZONES,
};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::PaymentProvider;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::DEFAULT_PERIOD_SECONDS;

/// Verified event envelope as delivered by Stripe
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Checkout metadata recovered from a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub session_id: String,
    pub phone: String,
    pub zip_code: String,
    pub timezone: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
}

/// The events this service acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted(CompletedCheckout),
    SubscriptionDeleted {
        stripe_subscription_id: String,
    },
    InvoicePaymentFailed {
        stripe_subscription_id: Option<String>,
        stripe_customer_id: Option<String>,
    },
    Ignored {
        event_type: String,
    },
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    subscription: Option<String>,
    customer: Option<String>,
}

fn decode_object<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> BillingResult<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        BillingError::MalformedEvent(format!("{} object: {}", event.event_type, e))
    })
}

/// Treat absent and empty strings alike
fn require(value: Option<String>, field: &'static str) -> BillingResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(BillingError::Validation(ValidationError::MissingField(field)))
}

impl WebhookEvent {
    /// Decode a verified envelope into one of the handled variants
    ///
    /// A handled event missing an expected field yields `BillingError::Validation`.
    pub fn decode(event: &StripeEvent) -> BillingResult<Self> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: CheckoutSessionObject = decode_object(event)?;
                let mut metadata = session.metadata.unwrap_or_default();
                Ok(WebhookEvent::CheckoutCompleted(CompletedCheckout {
                    session_id: require(session.id, "id")?,
                    phone: require(metadata.remove("phone"), "metadata.phone")?,
                    zip_code: require(metadata.remove("zip_code"), "metadata.zip_code")?,
                    timezone: require(metadata.remove("timezone"), "metadata.timezone")?,
                    stripe_customer_id: require(session.customer, "customer")?,
                    stripe_subscription_id: require(session.subscription, "subscription")?,
                }))
            }
            "customer.subscription.deleted" => {
                let subscription: SubscriptionObject = decode_object(event)?;
                Ok(WebhookEvent::SubscriptionDeleted {
                    stripe_subscription_id: require(subscription.id, "id")?,
                })
            }
            "invoice.payment_failed" => {
                let invoice: InvoiceObject = decode_object(event)?;
                Ok(WebhookEvent::InvoicePaymentFailed {
                    stripe_subscription_id: invoice.subscription,
                    stripe_customer_id: invoice.customer,
                })
            }
            other => Ok(WebhookEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Activated { subscription_id: Uuid },
    Cancelled { count: usize },
    CancelNotFound,
    AlreadyCancelled,
    PaymentFailureLogged,
    Ignored,
    /// The event was authentic but unusable; redelivery would not change it
    Rejected { reason: String },
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    webhook_secret: String,
    store: Arc<dyn SubscriptionStore>,
    payments: Arc<dyn PaymentProvider>,
    sms: Arc<dyn SmsSender>,
}

impl WebhookHandler {
    pub fn new(
        webhook_secret: impl Into<String>,
        store: Arc<dyn SubscriptionStore>,
        payments: Arc<dyn PaymentProvider>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            store,
            payments,
            sms,
        }
    }

    /// Verify the signature and parse the event envelope
    ///
    /// `now` is the current unix time in seconds. The payload is only parsed
    /// after the signature checks out.
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> BillingResult<StripeEvent> {
        let signature = signature.ok_or(BillingError::MissingSignature)?;

        verify_stripe_signature(payload, signature, &self.webhook_secret, now).map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook signature rejected");
            BillingError::WebhookSignatureInvalid(e)
        })?;

        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::MalformedEvent(e.to_string())
        })?;

        tracing::debug!(
            event_type = %event.event_type,
            event_id = %event.id,
            "Webhook signature verified"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event
    ///
    /// Errors returned from here are processing failures Stripe should retry.
    pub async fn handle_event(&self, event: StripeEvent) -> BillingResult<WebhookOutcome> {
        let decoded = match WebhookEvent::decode(&event) {
            Ok(decoded) => decoded,
            Err(e @ (BillingError::Validation(_) | BillingError::MalformedEvent(_))) => {
                tracing::error!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    error = %e,
                    "Unusable webhook event"
                );
                return Ok(WebhookOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        match decoded {
            WebhookEvent::CheckoutCompleted(checkout) => {
                self.handle_checkout_completed(&event.id, checkout).await
            }
            WebhookEvent::SubscriptionDeleted {
                stripe_subscription_id,
            } => self.handle_subscription_deleted(&stripe_subscription_id).await,
            WebhookEvent::InvoicePaymentFailed {
                stripe_subscription_id,
                stripe_customer_id,
            } => {
                tracing::warn!(
                    event_id = %event.id,
                    stripe_subscription_id = ?stripe_subscription_id,
                    stripe_customer_id = ?stripe_customer_id,
                    "Invoice payment failed, needs manual follow-up"
                );
                Ok(WebhookOutcome::PaymentFailureLogged)
            }
            WebhookEvent::Ignored { event_type } => {
                tracing::debug!(event_type = %event_type, "Ignoring Stripe event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        event_id: &str,
        checkout: CompletedCheckout,
    ) -> BillingResult<WebhookOutcome> {
        let supported = checkout
            .timezone
            .parse::<Tz>()
            .map(|tz| US_TIMEZONES.contains(&tz))
            .unwrap_or(false);
        if !supported {
            tracing::error!(
                session_id = %checkout.session_id,
                timezone = %checkout.timezone,
                "Checkout metadata carries an unsupported time zone"
            );
            return Ok(WebhookOutcome::Rejected {
                reason: format!("unsupported time zone {}", checkout.timezone),
            });
        }

        let current_period_end = self
            .current_period_end(&checkout.stripe_subscription_id)
            .await;

        // Redelivered events are not de-duplicated
        let subscription = self
            .store
            .create_active(NewSubscription {
                phone: checkout.phone.clone(),
                zip_code: checkout.zip_code.clone(),
                timezone: checkout.timezone.clone(),
                stripe_customer_id: checkout.stripe_customer_id.clone(),
                stripe_subscription_id: checkout.stripe_subscription_id.clone(),
                current_period_end,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    event_id = %event_id,
                    session_id = %checkout.session_id,
                    error = %e,
                    "Failed to create subscription"
                );
                BillingError::Store(e)
            })?;

        tracing::info!(
            subscription_id = %subscription.id,
            stripe_subscription_id = %checkout.stripe_subscription_id,
            phone = %mask_phone(&checkout.phone),
            zip_code = %checkout.zip_code,
            timezone = %checkout.timezone,
            "Subscription activated"
        );

        attempt_send(
            self.sms.as_ref(),
            &checkout.phone,
            &messages::activation_confirmation(&checkout.zip_code),
            "activation_confirmation",
        )
        .await;

        Ok(WebhookOutcome::Activated {
            subscription_id: subscription.id,
        })
    }

    /// Authoritative period end from Stripe, or one year from now
    async fn current_period_end(&self, stripe_subscription_id: &str) -> i64 {
        let fallback = OffsetDateTime::now_utc().unix_timestamp() + DEFAULT_PERIOD_SECONDS;
        match self
            .payments
            .subscription_period_end(stripe_subscription_id)
            .await
        {
            Ok(Some(period_end)) => period_end,
            Ok(None) => {
                tracing::warn!(
                    stripe_subscription_id = %stripe_subscription_id,
                    "Subscription has no period end, defaulting to one year"
                );
                fallback
            }
            Err(e) => {
                tracing::warn!(
                    stripe_subscription_id = %stripe_subscription_id,
                    error = %e,
                    "Failed to fetch subscription, defaulting period end to one year"
                );
                fallback
            }
        }
    }

    async fn handle_subscription_deleted(
        &self,
        stripe_subscription_id: &str,
    ) -> BillingResult<WebhookOutcome> {
        let outcome = self
            .store
            .cancel_by_stripe_subscription_id(stripe_subscription_id)
            .await?;

        match outcome {
            CancelOutcome::Cancelled { count } => {
                tracing::info!(
                    stripe_subscription_id = %stripe_subscription_id,
                    rows = count,
                    "Subscription cancelled"
                );
                Ok(WebhookOutcome::Cancelled { count })
            }
            CancelOutcome::AlreadyCancelled => {
                tracing::info!(
                    stripe_subscription_id = %stripe_subscription_id,
                    "Subscription already cancelled"
                );
                Ok(WebhookOutcome::AlreadyCancelled)
            }
            CancelOutcome::NotFound => {
                tracing::warn!(
                    stripe_subscription_id = %stripe_subscription_id,
                    "Cancelled subscription not found"
                );
                Ok(WebhookOutcome::CancelNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_checkout_completed() {
        let decoded = WebhookEvent::decode(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {
                    "phone": "+15125551234",
                    "zip_code": "78701",
                    "timezone": "America/Chicago"
                }
            }),
        ))
        .unwrap();

        assert_eq!(
            decoded,
            WebhookEvent::CheckoutCompleted(CompletedCheckout {
                session_id: "cs_1".to_string(),
                phone: "+15125551234".to_string(),
                zip_code: "78701".to_string(),
                timezone: "America/Chicago".to_string(),
                stripe_customer_id: "cus_1".to_string(),
                stripe_subscription_id: "sub_1".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_missing_metadata_is_validation_error() {
        let err = WebhookEvent::decode(&event(
            "checkout.session.completed",
            json!({"id": "cs_1", "customer": "cus_1", "subscription": "sub_1", "metadata": {}}),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::MissingField("metadata.phone"))
        ));
    }

    #[test]
    fn test_decode_null_subscription_is_validation_error() {
        let err = WebhookEvent::decode(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": null,
                "metadata": {"phone": "+15125551234", "zip_code": "78701", "timezone": "America/Chicago"}
            }),
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::MissingField("subscription"))
        ));
    }

    #[test]
    fn test_decode_subscription_deleted() {
        let decoded =
            WebhookEvent::decode(&event("customer.subscription.deleted", json!({"id": "sub_9"})))
                .unwrap();
        assert_eq!(
            decoded,
            WebhookEvent::SubscriptionDeleted {
                stripe_subscription_id: "sub_9".to_string()
            }
        );
    }

    #[test]
    fn test_decode_invoice_payment_failed_tolerates_missing_subscription() {
        let decoded = WebhookEvent::decode(&event(
            "invoice.payment_failed",
            json!({"customer": "cus_1", "subscription": null}),
        ))
        .unwrap();
        assert_eq!(
            decoded,
            WebhookEvent::InvoicePaymentFailed {
                stripe_subscription_id: None,
                stripe_customer_id: Some("cus_1".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_unknown_event_is_ignored() {
        let decoded =
            WebhookEvent::decode(&event("customer.created", json!({"id": "cus_1"}))).unwrap();
        assert_eq!(
            decoded,
            WebhookEvent::Ignored {
                event_type: "customer.created".to_string()
            }
        );
    }

    #[test]
    fn test_decode_wrong_object_shape_is_malformed() {
        let err = WebhookEvent::decode(&event(
            "customer.subscription.deleted",
            json!("not an object"),
        ))
        .unwrap_err();
        assert!(matches!(err, BillingError::MalformedEvent(_)));
    }
}
