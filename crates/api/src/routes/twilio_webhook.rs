//! Twilio inbound SMS endpoint
//!
//! Twilio signs the full public URL plus the sorted form parameters, so the
//! handler keeps the raw body and rebuilds the URL from `PUBLIC_BASE_URL`.
//! A verified request is always answered with an empty 200; replies to the
//! subscriber go out through the REST API instead of TwiML.

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, StatusCode},
};
use freezealert_shared::{mask_phone, signature::verify_twilio_signature};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Fields of the inbound message webhook we care about
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InboundSms {
    pub from: Option<String>,
    pub to: Option<String>,
    pub body: Option<String>,
    pub message_sid: Option<String>,
}

impl InboundSms {
    pub fn from_form(body: &[u8]) -> Self {
        let mut sms = Self::default();
        for (name, value) in url::form_urlencoded::parse(body) {
            let value = Some(value.into_owned());
            match name.as_ref() {
                "From" => sms.from = value,
                "To" => sms.to = value,
                "Body" => sms.body = value,
                "MessageSid" => sms.message_sid = value,
                _ => {}
            }
        }
        sms
    }
}

pub async fn twilio_webhook(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get(TWILIO_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Twilio webhook without signature");
            ApiError::InvalidSignature
        })?;

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let signed_url = format!("{}{}", state.public_base_url, path_and_query);

    verify_twilio_signature(&signed_url, &body, signature, &state.twilio_auth_token).map_err(
        |e| {
            tracing::warn!(url = %signed_url, error = %e, "Twilio webhook signature rejected");
            ApiError::InvalidSignature
        },
    )?;

    let sms = InboundSms::from_form(&body);
    let Some(from) = sms.from.as_deref() else {
        tracing::warn!(message_sid = ?sms.message_sid, "Inbound SMS without sender");
        return Ok(StatusCode::OK);
    };

    tracing::info!(
        from = %mask_phone(from),
        message_sid = ?sms.message_sid,
        "Inbound SMS"
    );

    let outcome = state
        .intake
        .handle(from, sms.body.as_deref().unwrap_or_default())
        .await;
    tracing::debug!(outcome = ?outcome, "Inbound SMS handled");

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_form_fields() {
        let sms = InboundSms::from_form(
            b"MessageSid=SM123&From=%2B15125551234&To=%2B15125550000&Body=Sign+me+up+78701&NumMedia=0",
        );
        assert_eq!(
            sms,
            InboundSms {
                from: Some("+15125551234".to_string()),
                to: Some("+15125550000".to_string()),
                body: Some("Sign me up 78701".to_string()),
                message_sid: Some("SM123".to_string()),
            }
        );
    }

    #[test]
    fn test_inbound_form_missing_fields() {
        assert_eq!(InboundSms::from_form(b""), InboundSms::default());
    }
}
