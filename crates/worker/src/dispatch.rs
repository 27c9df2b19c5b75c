//! Hourly freeze alert dispatch
//!
//! Each run finds the time zones where it is currently 8pm, loads the active
//! subscribers there, and fetches one forecast per unique zip. Zips are
//! processed in batches of [`BATCH_SIZE`]; within a batch every zip and every
//! recipient runs concurrently. Failures are counted, never raised.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use freezealert_shared::{
    attempt_send, messages, timezones_at_hour, Recipient, SmsSender,
    SubscriptionStore, ZipDirectory, ALERT_HOUR, FREEZE_THRESHOLD_F,
};
use tracing::{error, info, warn};

use crate::weather::WeatherProvider;

/// Zips processed concurrently per batch
pub const BATCH_SIZE: usize = 10;

/// Accounting for one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub target_timezones: Vec<String>,
    pub subscriptions: usize,
    pub unique_zips: usize,
    pub alerts_triggered: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ZipResult {
    triggered: bool,
    sent: usize,
    failed: usize,
}

/// Group recipients by zip code, one entry per zip
pub fn group_by_zip(recipients: Vec<Recipient>) -> BTreeMap<String, Vec<String>> {
    let mut zip_to_phones: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for recipient in recipients {
        zip_to_phones
            .entry(recipient.zip_code)
            .or_default()
            .push(recipient.phone);
    }
    zip_to_phones
}

pub struct AlertDispatcher {
    store: Arc<dyn SubscriptionStore>,
    weather: Arc<dyn WeatherProvider>,
    sms: Arc<dyn SmsSender>,
    zips: Arc<ZipDirectory>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        weather: Arc<dyn WeatherProvider>,
        sms: Arc<dyn SmsSender>,
        zips: Arc<ZipDirectory>,
    ) -> Self {
        Self {
            store,
            weather,
            sms,
            zips,
        }
    }

    /// Run one dispatch pass for the instant `now`
    pub async fn run(&self, now: DateTime<Utc>) -> DispatchSummary {
        let mut summary = DispatchSummary {
            target_timezones: timezones_at_hour(now, ALERT_HOUR)
                .iter()
                .map(|tz| tz.name().to_string())
                .collect(),
            ..Default::default()
        };

        if summary.target_timezones.is_empty() {
            info!("No time zones at the alert hour right now");
            return summary;
        }

        let recipients = match self
            .store
            .active_recipients_in_timezones(&summary.target_timezones)
            .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(
                    target_timezones = ?summary.target_timezones,
                    error = %e,
                    "Failed to load subscriptions for dispatch"
                );
                return summary;
            }
        };

        summary.subscriptions = recipients.len();
        if recipients.is_empty() {
            info!(
                target_timezones = ?summary.target_timezones,
                "No active subscriptions in target time zones"
            );
            return summary;
        }

        let zip_to_phones = group_by_zip(recipients);
        summary.unique_zips = zip_to_phones.len();

        let zips: Vec<(&String, &Vec<String>)> = zip_to_phones.iter().collect();
        for batch in zips.chunks(BATCH_SIZE) {
            let results = join_all(
                batch
                    .iter()
                    .map(|(zip_code, phones)| self.process_zip(zip_code, phones)),
            )
            .await;

            for result in results {
                summary.sent += result.sent;
                summary.failed += result.failed;
                if result.triggered {
                    summary.alerts_triggered += 1;
                }
            }
        }

        info!(
            target_timezones = ?summary.target_timezones,
            subscriptions = summary.subscriptions,
            unique_zips = summary.unique_zips,
            alerts_triggered = summary.alerts_triggered,
            sent = summary.sent,
            failed = summary.failed,
            "Dispatch run complete"
        );

        summary
    }

    async fn process_zip(&self, zip_code: &str, phones: &[String]) -> ZipResult {
        let coordinates = match self.zips.coordinates_for_zip(zip_code) {
            Ok(coordinates) => coordinates,
            Err(e) => {
                error!(zip_code = %zip_code, error = %e, "Subscribed zip missing from directory");
                return ZipResult {
                    failed: phones.len(),
                    ..Default::default()
                };
            }
        };

        let overnight_low = match self.weather.overnight_low(coordinates).await {
            Ok(low) => low,
            Err(e) => {
                error!(zip_code = %zip_code, error = %e, "Weather fetch failed");
                return ZipResult {
                    failed: phones.len(),
                    ..Default::default()
                };
            }
        };

        if overnight_low > FREEZE_THRESHOLD_F {
            info!(
                zip_code = %zip_code,
                overnight_low,
                threshold = FREEZE_THRESHOLD_F,
                "No alert needed"
            );
            return ZipResult::default();
        }

        info!(
            zip_code = %zip_code,
            overnight_low,
            subscribers = phones.len(),
            "Freeze alert needed"
        );

        let body = messages::freeze_alert(zip_code, overnight_low);
        let outcomes = join_all(
            phones
                .iter()
                .map(|phone| attempt_send(self.sms.as_ref(), phone, &body, "freeze_alert")),
        )
        .await;

        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        let failed = outcomes.len() - sent;
        if failed > 0 {
            warn!(
                zip_code = %zip_code,
                failed,
                "Some alerts failed to send"
            );
        }

        ZipResult {
            triggered: true,
            sent,
            failed,
        }
    }
}
