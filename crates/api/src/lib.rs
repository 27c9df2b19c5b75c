// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Freeze Alert API Library
//!
//! HTTP surface of the service: the Twilio inbound SMS webhook that starts a
//! signup, and the Stripe webhook that activates or cancels subscriptions.

pub mod config;
pub mod error;
pub mod intake;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use intake::{IntakeOutcome, IntakeRejection, SmsIntake};
pub use state::AppState;
