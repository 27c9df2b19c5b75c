//! API routes

mod health;
mod stripe_webhook;
mod twilio_webhook;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{error::ApiError, state::AppState};

pub use health::health;
pub use stripe_webhook::{stripe_webhook, STRIPE_SIGNATURE_HEADER};
pub use twilio_webhook::{twilio_webhook, InboundSms, TWILIO_SIGNATURE_HEADER};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/stripe", post(stripe_webhook))
        .route("/webhook/twilio", post(twilio_webhook))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
