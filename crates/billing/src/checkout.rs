//! Stripe Checkout sessions
//!
//! The SMS flow never persists anything before payment: the subscriber's phone,
//! zip and time zone ride along as session metadata (and as subscription
//! metadata) until `checkout.session.completed` brings them back.

use serde::{Deserialize, Serialize};

use crate::client::StripeConfig;

/// Sessions expire after 24 hours
pub const CHECKOUT_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// What the subscriber asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub phone: String,
    pub zip_code: String,
    pub timezone: String,
}

/// A created Checkout session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Raw create-session response; `url` is absent for some session modes
#[derive(Debug, Deserialize)]
pub(crate) struct CheckoutSessionResponse {
    pub id: String,
    pub url: Option<String>,
}

/// Build the form body for `POST /v1/checkout/sessions`
///
/// `now` is the current unix time in seconds.
pub(crate) fn checkout_form_params(
    config: &StripeConfig,
    request: &CheckoutRequest,
    now: i64,
) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "subscription".into()),
        ("line_items[0][price]".into(), config.price_id.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
    ];

    for prefix in ["metadata", "subscription_data[metadata]"] {
        params.push((format!("{}[phone]", prefix), request.phone.clone()));
        params.push((format!("{}[zip_code]", prefix), request.zip_code.clone()));
        params.push((format!("{}[timezone]", prefix), request.timezone.clone()));
    }

    params.push(("success_url".into(), config.success_url.clone()));
    params.push(("cancel_url".into(), config.cancel_url.clone()));
    params.push((
        "expires_at".into(),
        (now + CHECKOUT_EXPIRY_SECONDS).to_string(),
    ));

    if let Some(promo) = &config.promo_code {
        params.push(("discounts[0][promotion_code]".into(), promo.clone()));
    }

    params
}
