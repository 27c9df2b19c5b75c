//! Billing error types

use freezealert_shared::{SignatureError, StoreError, ValidationError};
use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Webhook signature invalid: {0}")]
    WebhookSignatureInvalid(#[from] SignatureError),

    #[error("Malformed webhook payload: {0}")]
    MalformedEvent(String),

    #[error("Invalid webhook event: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Stripe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed Stripe response: {0}")]
    MalformedResponse(String),

    #[error("Subscription store error: {0}")]
    Store(#[from] StoreError),
}
