//! Stripe webhook endpoint
//!
//! The raw body is verified against `Stripe-Signature` before it is parsed.
//! Anything that passes verification is acknowledged with 200 unless the
//! subscription store failed, in which case Stripe gets a 500 and retries.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::{error::ApiResult, state::AppState};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let event = state.stripe_webhooks.verify_event(&body, signature, now)?;

    let event_id = event.id.clone();
    let outcome = state.stripe_webhooks.handle_event(event).await?;

    tracing::info!(event_id = %event_id, outcome = ?outcome, "Stripe webhook processed");

    Ok(Json(json!({ "received": true })))
}
