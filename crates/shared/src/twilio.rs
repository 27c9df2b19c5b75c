//! Twilio outbound SMS
//!
//! Messages are sent through the REST API (`POST /2010-04-01/Accounts/{sid}/Messages.json`)
//! with HTTP basic auth. Inbound webhooks are verified separately in
//! [`crate::signature`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config;
use crate::error::{ConfigError, SmsError};
use crate::mask_phone;

const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Twilio account configuration
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sending number in E.164 form
    pub phone_number: String,
    pub api_base: String,
}

impl TwilioConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            account_sid: config::required("TWILIO_ACCOUNT_SID")?,
            auth_token: config::required("TWILIO_AUTH_TOKEN")?,
            phone_number: config::required("TWILIO_PHONE_NUMBER")?,
            api_base: config::trim_base_url(&config::or_default(
                "TWILIO_API_BASE",
                DEFAULT_API_BASE,
            )),
        })
    }
}

/// Anything that can deliver a text message
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Error body returned by Twilio on non-2xx responses
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
}

/// Twilio REST client
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self, SmsError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.phone_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error: Option<TwilioErrorBody> = response.json().await.ok();
        let (code, message) = match error {
            Some(body) => (
                body.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                body.message,
            ),
            None => (None, None),
        };

        Err(SmsError::Provider {
            status: status.as_u16(),
            code,
            message: message.unwrap_or_else(|| format!("Twilio API error: {}", status.as_u16())),
        })
    }
}

/// Result of a best-effort send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed {
        status: Option<u16>,
        code: Option<String>,
    },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Send a message and record the outcome without propagating failures
///
/// `purpose` names the message kind in the log line (e.g. `"freeze_alert"`).
pub async fn attempt_send(
    sender: &dyn SmsSender,
    to: &str,
    body: &str,
    purpose: &'static str,
) -> SendOutcome {
    match sender.send_sms(to, body).await {
        Ok(()) => {
            tracing::debug!(phone = %mask_phone(to), purpose, "SMS sent");
            SendOutcome::Sent
        }
        Err(e) => {
            tracing::error!(
                phone = %mask_phone(to),
                purpose,
                status = ?e.status_code(),
                twilio_code = ?e.provider_code(),
                error = %e,
                "Failed to send SMS"
            );
            SendOutcome::Failed {
                status: e.status_code(),
                code: e.provider_code().map(str::to_string),
            }
        }
    }
}

/// A message captured by [`RecordingSmsSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

/// In-memory sender that records messages instead of delivering them
///
/// Sends to phones listed in `failing` return a provider error.
#[derive(Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `phone` fail
    pub async fn fail_for(&self, phone: &str) {
        self.failing.lock().await.push(phone.to_string());
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, phone: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == phone)
            .map(|m| m.body.clone())
            .collect()
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), SmsError> {
        if self.failing.lock().await.iter().any(|p| p == to) {
            return Err(SmsError::Provider {
                status: 400,
                code: Some("21211".to_string()),
                message: "The 'To' number is not a valid phone number.".to_string(),
            });
        }
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(api_base: String) -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            phone_number: "+15550001111".to_string(),
            api_base,
        }
    }

    #[tokio::test]
    async fn test_send_posts_form_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".to_string(), "+15125551234".to_string()),
                Matcher::UrlEncoded("From".to_string(), "+15550001111".to_string()),
                Matcher::UrlEncoded("Body".to_string(), "hello".to_string()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid": "SM123"}"#)
            .create_async()
            .await;

        let client = TwilioClient::new(config(server.url())).unwrap();
        client.send_sms("+15125551234", "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_surfaces_provider_error_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code": 21211, "message": "Invalid 'To' Phone Number", "status": 400}"#)
            .create_async()
            .await;

        let client = TwilioClient::new(config(server.url())).unwrap();
        let err = client.send_sms("+15125551234", "hello").await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.provider_code(), Some("21211"));
        assert!(err.to_string().contains("Invalid 'To' Phone Number"));
    }

    #[tokio::test]
    async fn test_send_error_without_json_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let client = TwilioClient::new(config(server.url())).unwrap();
        let err = client.send_sms("+15125551234", "hello").await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.provider_code(), None);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_attempt_send_records_failure_without_propagating() {
        let sender = RecordingSmsSender::new();
        sender.fail_for("+15125550000").await;

        let ok = attempt_send(&sender, "+15125551234", "hi", "test").await;
        assert!(ok.is_sent());

        let failed = attempt_send(&sender, "+15125550000", "hi", "test").await;
        assert_eq!(
            failed,
            SendOutcome::Failed {
                status: Some(400),
                code: Some("21211".to_string()),
            }
        );
        assert_eq!(sender.sent().await.len(), 1);
    }
}
