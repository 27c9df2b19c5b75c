//! Stripe subscription objects
//!
//! Only the billing period end is read. Newer Stripe API versions moved
//! `current_period_end` from the subscription onto each subscription item, so
//! both places are checked.

use serde::Deserialize;

/// Seconds in the fallback billing period used when Stripe has no period end
pub const DEFAULT_PERIOD_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub(crate) struct StripeSubscription {
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItem {
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_end_top_level() {
        let sub: StripeSubscription =
            serde_json::from_str(r#"{"id": "sub_1", "current_period_end": 1767225600}"#).unwrap();
        assert_eq!(sub.period_end(), Some(1_767_225_600));
    }

    #[test]
    fn test_period_end_from_first_item() {
        let sub: StripeSubscription = serde_json::from_str(
            r#"{
                "id": "sub_1",
                "items": {"object": "list", "data": [
                    {"id": "si_1", "current_period_end": 1767225600},
                    {"id": "si_2", "current_period_end": 1}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(sub.period_end(), Some(1_767_225_600));
    }

    #[test]
    fn test_period_end_missing() {
        let sub: StripeSubscription =
            serde_json::from_str(r#"{"id": "sub_1", "current_period_end": null}"#).unwrap();
        assert_eq!(sub.period_end(), None);
    }
}
