//! Outbound SMS texts

/// Nightly freeze alert
pub fn freeze_alert(zip_code: &str, overnight_low: i32) -> String {
    format!(
        "🥶 FREEZE ALERT: Low of {}°F tonight in {}. Drip your faucets!",
        overnight_low, zip_code
    )
}

/// Checkout link sent in reply to a signup text
pub fn payment_link(zip_code: &str, checkout_url: &str) -> String {
    format!(
        "Freeze Alert for {} costs $12/year.\nPay here to activate: {}\nLink expires in 24h.",
        zip_code, checkout_url
    )
}

/// Sent once Stripe confirms payment
pub fn activation_confirmation(zip_code: &str) -> String {
    format!(
        "✓ Freeze Alert active for {}!\nYou'll get texts at 8pm when temps drop below 28°F.\n$12/year, auto-renews. Reply STOP to cancel.",
        zip_code
    )
}

pub const INVALID_PHONE: &str = "Invalid phone number. Please text from a valid US number.";

pub const ZIP_NOT_FOUND: &str =
    "Could not find a zip code. Reply with your 5-digit zip code (e.g., 78701).";

pub const CHECKOUT_UNAVAILABLE: &str =
    "Sorry, we couldn't create a payment link right now. Please try again in a few minutes.";

pub const STORE_UNAVAILABLE: &str =
    "Sorry, something went wrong on our end. Please text your zip code again in a few minutes.";

pub fn unsupported_zip(zip_code: &str) -> String {
    format!(
        "Zip code {} is not supported. Please use a valid US zip code.",
        zip_code
    )
}

pub fn already_subscribed(zip_code: &str) -> String {
    format!(
        "You're already subscribed to freeze alerts for {}. You'll receive alerts at 8pm when temps drop below 28°F.",
        zip_code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_alert_text() {
        assert_eq!(
            freeze_alert("78701", 25),
            "🥶 FREEZE ALERT: Low of 25°F tonight in 78701. Drip your faucets!"
        );
    }

    #[test]
    fn test_payment_link_text() {
        let text = payment_link("78701", "https://checkout.stripe.com/c/pay/cs_test");
        assert!(text.starts_with("Freeze Alert for 78701 costs $12/year."));
        assert!(text.contains("https://checkout.stripe.com/c/pay/cs_test"));
        assert!(text.ends_with("Link expires in 24h."));
    }

    #[test]
    fn test_zip_dependent_replies_mention_zip() {
        assert!(activation_confirmation("10001").contains("10001"));
        assert!(unsupported_zip("00000").contains("00000"));
        assert!(already_subscribed("78701").contains("78701"));
    }
}
