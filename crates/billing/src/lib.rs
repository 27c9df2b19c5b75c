// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Freeze Alert Billing Module
//!
//! Handles the Stripe side of a subscription.
//!
//! ## Features
//!
//! - **Checkout**: create a subscription Checkout session for a phone + zip
//! - **Subscriptions**: read the authoritative billing period end
//! - **Webhooks**: verify Stripe events and drive the subscription lifecycle

use std::sync::Arc;

use freezealert_shared::{SmsSender, SubscriptionStore};

pub mod checkout;
pub mod client;
pub mod error;
pub mod subscriptions;
pub mod webhooks;


// Checkout
pub use checkout::{CheckoutRequest, CheckoutSession, CHECKOUT_EXPIRY_SECONDS};

// Client
pub use client::{PaymentProvider, RecordingPaymentProvider, StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Subscriptions
pub use subscriptions::DEFAULT_PERIOD_SECONDS;

// Webhooks
pub use webhooks::{
    CompletedCheckout, StripeEvent, WebhookEvent, WebhookHandler, WebhookOutcome,
};

/// Billing service that aggregates the Stripe-facing pieces
#[derive(Clone)]
pub struct BillingService {
    pub payments: Arc<dyn PaymentProvider>,
    pub webhooks: Arc<WebhookHandler>,
}

impl BillingService {
    /// Create a billing service with explicit config
    pub fn new(
        config: StripeConfig,
        store: Arc<dyn SubscriptionStore>,
        sms: Arc<dyn SmsSender>,
    ) -> BillingResult<Self> {
        let webhook_secret = config.webhook_secret.clone();
        let stripe: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(config)?);
        Ok(Self::with_provider(webhook_secret, stripe, store, sms))
    }

    /// Assemble from an existing payment provider
    pub fn with_provider(
        webhook_secret: impl Into<String>,
        payments: Arc<dyn PaymentProvider>,
        store: Arc<dyn SubscriptionStore>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        let webhooks = WebhookHandler::new(webhook_secret, store, payments.clone(), sms);
        Self {
            payments,
            webhooks: Arc::new(webhooks),
        }
    }
}
