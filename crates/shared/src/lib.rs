// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Freeze Alert Shared Module
//!
//! Building blocks used by both the API server and the background worker:
//!
//! - **Zip Directory**: zip code → IANA time zone and coordinates, plus "which zones are at 8pm"
//! - **Validation**: phone normalization and zip extraction from free-text SMS
//! - **Signatures**: Stripe (HMAC-SHA256) and Twilio (HMAC-SHA1) webhook verification
//! - **Subscriptions**: the subscription store (Postgres and in-memory)
//! - **Twilio**: outbound SMS client
//! - **Messages**: every text the service sends

pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod signature;
pub mod subscriptions;
pub mod twilio;
pub mod validation;
pub mod zipcodes;

pub use db::{create_pool, run_migrations};
pub use error::{
    ConfigError, SignatureError, SmsError, StoreError, StoreResult, ValidationError,
    ZipLookupError,
};
pub use subscriptions::{
    CancelOutcome, MemorySubscriptionStore, NewSubscription, PgSubscriptionStore, Recipient,
    Subscription, SubscriptionStatus, SubscriptionStore,
};
pub use twilio::{
    attempt_send, RecordingSmsSender, SendOutcome, SentMessage, SmsSender, TwilioClient,
    TwilioConfig,
};
pub use validation::{extract_zip_from_message, validate_phone, validate_zip};
pub use zipcodes::{timezones_at_hour, Coordinates, ZipDirectory, US_TIMEZONES};

/// Local hour (24h clock) at which freeze alerts go out
pub const ALERT_HOUR: u32 = 20;

/// Overnight lows at or below this temperature trigger an alert
pub const FREEZE_THRESHOLD_F: i32 = 28;

/// Mask a phone number for logging, keeping only the last four digits
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+15125551234"), "***1234");
        assert_eq!(mask_phone("12"), "***");
    }
}
