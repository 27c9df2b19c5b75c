//! Application state

use std::sync::Arc;

use freezealert_billing::{BillingError, BillingService, WebhookHandler};
use freezealert_shared::{
    PgSubscriptionStore, SmsError, SmsSender, SubscriptionStore, TwilioClient, ZipDirectory,
};
use sqlx::PgPool;

use crate::config::Config;
use crate::intake::SmsIntake;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Signup pipeline for inbound texts
    pub intake: Arc<SmsIntake>,
    /// Stripe event verification and lifecycle transitions
    pub stripe_webhooks: Arc<WebhookHandler>,
    /// Key for `X-Twilio-Signature`
    pub twilio_auth_token: String,
    /// Origin Twilio was configured with, used to rebuild the signed URL
    pub public_base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Sms(#[from] SmsError),
}

impl AppState {
    /// Wire the production collaborators: Postgres, Twilio and Stripe
    pub fn new(pool: PgPool, config: &Config, zips: ZipDirectory) -> Result<Self, StateError> {
        let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool));
        let sms: Arc<dyn SmsSender> = Arc::new(TwilioClient::new(config.twilio.clone())?);
        let billing = BillingService::new(config.stripe.clone(), store.clone(), sms.clone())?;

        Ok(Self::from_parts(
            Arc::new(zips),
            store,
            billing,
            sms,
            config.twilio.auth_token.clone(),
            config.public_base_url.clone(),
        ))
    }

    pub fn from_parts(
        zips: Arc<ZipDirectory>,
        store: Arc<dyn SubscriptionStore>,
        billing: BillingService,
        sms: Arc<dyn SmsSender>,
        twilio_auth_token: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        let intake = SmsIntake::new(zips, store, billing.payments.clone(), sms);
        Self {
            intake: Arc::new(intake),
            stripe_webhooks: billing.webhooks,
            twilio_auth_token: twilio_auth_token.into(),
            public_base_url: public_base_url.into(),
        }
    }
}
