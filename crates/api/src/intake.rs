//! Inbound SMS intake
//!
//! A text to the service number is a signup request:
//!
//! ```text
//! validate phone → extract zip → resolve time zone → check existing
//!     → create checkout session → reply with payment link
//! ```
//!
//! Every stage that fails replies to the sender with a stage-specific message
//! and stops. Nothing here returns an error to the caller.

use std::sync::Arc;

use freezealert_billing::{CheckoutRequest, PaymentProvider};
use freezealert_shared::{
    attempt_send, extract_zip_from_message, mask_phone, messages, validate_phone, SendOutcome,
    SmsSender, SubscriptionStore, ZipDirectory,
};

/// Why a signup text did not produce a payment link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeRejection {
    InvalidPhone,
    ZipNotFound,
    UnsupportedZip { zip_code: String },
    AlreadySubscribed { zip_code: String },
    CheckoutUnavailable,
    StoreUnavailable,
}

impl IntakeRejection {
    /// Text sent back to the subscriber
    pub fn reply(&self) -> String {
        match self {
            Self::InvalidPhone => messages::INVALID_PHONE.to_string(),
            Self::ZipNotFound => messages::ZIP_NOT_FOUND.to_string(),
            Self::UnsupportedZip { zip_code } => messages::unsupported_zip(zip_code),
            Self::AlreadySubscribed { zip_code } => messages::already_subscribed(zip_code),
            Self::CheckoutUnavailable => messages::CHECKOUT_UNAVAILABLE.to_string(),
            Self::StoreUnavailable => messages::STORE_UNAVAILABLE.to_string(),
        }
    }

    fn purpose(&self) -> &'static str {
        match self {
            Self::InvalidPhone => "invalid_phone",
            Self::ZipNotFound => "zip_not_found",
            Self::UnsupportedZip { .. } => "unsupported_zip",
            Self::AlreadySubscribed { .. } => "already_subscribed",
            Self::CheckoutUnavailable => "checkout_unavailable",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Result of handling one inbound text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    PaymentLinkSent {
        zip_code: String,
        checkout_session_id: String,
        reply: SendOutcome,
    },
    Rejected {
        rejection: IntakeRejection,
        reply: SendOutcome,
    },
}

pub struct SmsIntake {
    zips: Arc<ZipDirectory>,
    store: Arc<dyn SubscriptionStore>,
    payments: Arc<dyn PaymentProvider>,
    sms: Arc<dyn SmsSender>,
}

impl SmsIntake {
    pub fn new(
        zips: Arc<ZipDirectory>,
        store: Arc<dyn SubscriptionStore>,
        payments: Arc<dyn PaymentProvider>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            zips,
            store,
            payments,
            sms,
        }
    }

    /// Handle a signup text from `from` with message `body`
    pub async fn handle(&self, from: &str, body: &str) -> IntakeOutcome {
        let phone = match validate_phone(from) {
            Ok(phone) => phone,
            // The raw sender is the only address we have
            Err(_) => return self.reject(from, IntakeRejection::InvalidPhone).await,
        };

        let zip_code = match extract_zip_from_message(body) {
            Ok(zip_code) => zip_code,
            Err(_) => return self.reject(&phone, IntakeRejection::ZipNotFound).await,
        };

        let timezone = match self.zips.timezone_for_zip(&zip_code) {
            Ok(tz) => tz,
            Err(_) => {
                return self
                    .reject(&phone, IntakeRejection::UnsupportedZip { zip_code })
                    .await
            }
        };

        match self.store.active_exists(&phone, &zip_code).await {
            Ok(false) => {}
            Ok(true) => {
                return self
                    .reject(&phone, IntakeRejection::AlreadySubscribed { zip_code })
                    .await
            }
            Err(e) => {
                tracing::error!(
                    phone = %mask_phone(&phone),
                    zip_code = %zip_code,
                    error = %e,
                    "Subscription lookup failed"
                );
                return self.reject(&phone, IntakeRejection::StoreUnavailable).await;
            }
        }

        let request = CheckoutRequest {
            phone: phone.clone(),
            zip_code: zip_code.clone(),
            timezone: timezone.name().to_string(),
        };
        let session = match self.payments.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    phone = %mask_phone(&phone),
                    zip_code = %zip_code,
                    error = %e,
                    "Stripe checkout session creation failed"
                );
                return self
                    .reject(&phone, IntakeRejection::CheckoutUnavailable)
                    .await;
            }
        };

        // A lost payment link is recovered by texting again
        let reply = attempt_send(
            self.sms.as_ref(),
            &phone,
            &messages::payment_link(&zip_code, &session.url),
            "payment_link",
        )
        .await;

        tracing::info!(
            phone = %mask_phone(&phone),
            zip_code = %zip_code,
            timezone = %timezone.name(),
            checkout_session_id = %session.id,
            "Payment link sent"
        );

        IntakeOutcome::PaymentLinkSent {
            zip_code,
            checkout_session_id: session.id,
            reply,
        }
    }

    async fn reject(&self, to: &str, rejection: IntakeRejection) -> IntakeOutcome {
        tracing::info!(
            phone = %mask_phone(to),
            rejection = ?rejection,
            "Signup text rejected"
        );
        let reply = attempt_send(
            self.sms.as_ref(),
            to,
            &rejection.reply(),
            rejection.purpose(),
        )
        .await;
        IntakeOutcome::Rejected { rejection, reply }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezealert_billing::RecordingPaymentProvider;
    use freezealert_shared::{MemorySubscriptionStore, NewSubscription, RecordingSmsSender};

    const DATASET: &str = include_str!("../../../data/zip-timezones.json");
    const PHONE: &str = "+15125551234";

    struct Harness {
        intake: SmsIntake,
        store: Arc<MemorySubscriptionStore>,
        payments: Arc<RecordingPaymentProvider>,
        sms: Arc<RecordingSmsSender>,
    }

    fn harness_with(payments: RecordingPaymentProvider) -> Harness {
        let zips = Arc::new(ZipDirectory::from_json_str(DATASET).unwrap());
        let store = Arc::new(MemorySubscriptionStore::new());
        let payments = Arc::new(payments);
        let sms = Arc::new(RecordingSmsSender::new());
        let intake = SmsIntake::new(zips, store.clone(), payments.clone(), sms.clone());
        Harness {
            intake,
            store,
            payments,
            sms,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingPaymentProvider::new())
    }

    #[tokio::test]
    async fn test_signup_sends_payment_link() {
        let h = harness();

        let outcome = h.intake.handle("(512) 555-1234", "Sign me up for 78701").await;

        match outcome {
            IntakeOutcome::PaymentLinkSent {
                zip_code, reply, ..
            } => {
                assert_eq!(zip_code, "78701");
                assert!(reply.is_sent());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let checkouts = h.payments.checkouts().await;
        assert_eq!(
            checkouts,
            vec![CheckoutRequest {
                phone: PHONE.to_string(),
                zip_code: "78701".to_string(),
                timezone: "America/Chicago".to_string(),
            }]
        );

        let texts = h.sms.sent_to(PHONE).await;
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Freeze Alert for 78701 costs $12/year."));
        assert!(texts[0].contains("https://checkout.stripe.com/c/pay/cs_test_1"));
        assert!(h.store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_phone_replies_to_raw_sender() {
        let h = harness();

        let outcome = h.intake.handle("12345", "78701").await;

        assert!(matches!(
            outcome,
            IntakeOutcome::Rejected {
                rejection: IntakeRejection::InvalidPhone,
                ..
            }
        ));
        assert_eq!(h.sms.sent_to("12345").await, vec![messages::INVALID_PHONE]);
        assert!(h.payments.checkouts().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_zip_in_body() {
        let h = harness();

        let outcome = h.intake.handle(PHONE, "hello").await;

        assert!(matches!(
            outcome,
            IntakeOutcome::Rejected {
                rejection: IntakeRejection::ZipNotFound,
                ..
            }
        ));
        assert_eq!(h.sms.sent_to(PHONE).await, vec![messages::ZIP_NOT_FOUND]);
        assert!(h.payments.checkouts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_zip() {
        let h = harness();

        h.intake.handle(PHONE, "00000").await;

        assert_eq!(
            h.sms.sent_to(PHONE).await,
            vec![messages::unsupported_zip("00000")]
        );
        assert!(h.payments.checkouts().await.is_empty());
    }

    #[tokio::test]
    async fn test_already_subscribed() {
        let h = harness();
        h.store
            .create_active(NewSubscription {
                phone: PHONE.to_string(),
                zip_code: "78701".to_string(),
                timezone: "America/Chicago".to_string(),
                stripe_customer_id: "cus_1".to_string(),
                stripe_subscription_id: "sub_1".to_string(),
                current_period_end: 1_767_225_600,
            })
            .await
            .unwrap();

        let outcome = h.intake.handle(PHONE, "78701").await;

        assert!(matches!(
            outcome,
            IntakeOutcome::Rejected {
                rejection: IntakeRejection::AlreadySubscribed { .. },
                ..
            }
        ));
        assert_eq!(
            h.sms.sent_to(PHONE).await,
            vec![messages::already_subscribed("78701")]
        );
        assert!(h.payments.checkouts().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_zip_for_same_phone_is_allowed() {
        let h = harness();
        h.store
            .create_active(NewSubscription {
                phone: PHONE.to_string(),
                zip_code: "78701".to_string(),
                timezone: "America/Chicago".to_string(),
                stripe_customer_id: "cus_1".to_string(),
                stripe_subscription_id: "sub_1".to_string(),
                current_period_end: 1_767_225_600,
            })
            .await
            .unwrap();

        let outcome = h.intake.handle(PHONE, "and 10001 too").await;
        assert!(matches!(outcome, IntakeOutcome::PaymentLinkSent { .. }));
        assert_eq!(h.payments.checkouts().await[0].timezone, "America/New_York");
    }

    #[tokio::test]
    async fn test_checkout_failure_replies() {
        let h = harness_with(RecordingPaymentProvider::new().failing_checkout());

        let outcome = h.intake.handle(PHONE, "78701").await;

        assert!(matches!(
            outcome,
            IntakeOutcome::Rejected {
                rejection: IntakeRejection::CheckoutUnavailable,
                ..
            }
        ));
        assert_eq!(
            h.sms.sent_to(PHONE).await,
            vec![messages::CHECKOUT_UNAVAILABLE]
        );
    }

    #[tokio::test]
    async fn test_store_failure_replies() {
        let h = harness();
        h.store.set_unavailable(true);

        let outcome = h.intake.handle(PHONE, "78701").await;

        assert!(matches!(
            outcome,
            IntakeOutcome::Rejected {
                rejection: IntakeRejection::StoreUnavailable,
                ..
            }
        ));
        assert!(h.payments.checkouts().await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_failure_is_recorded_not_raised() {
        let h = harness();
        h.sms.fail_for(PHONE).await;

        let outcome = h.intake.handle(PHONE, "78701").await;

        match outcome {
            IntakeOutcome::PaymentLinkSent { reply, .. } => assert!(!reply.is_sent()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
