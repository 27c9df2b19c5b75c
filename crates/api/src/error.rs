//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use freezealert_billing::BillingError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Processing failed")]
    ProcessingFailed(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ProcessingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::MissingSignature => Self::MissingSignature,
            BillingError::WebhookSignatureInvalid(_) => Self::InvalidSignature,
            BillingError::MalformedEvent(msg) => Self::BadRequest(msg),
            other => Self::ProcessingFailed(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::ProcessingFailed(detail) = &self {
            tracing::error!(error = %detail, "Request processing failed");
        }

        // Internal details stay in the logs
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezealert_shared::{SignatureError, StoreError};

    #[test]
    fn test_billing_error_status_mapping() {
        let cases = [
            (BillingError::MissingSignature, StatusCode::BAD_REQUEST),
            (
                BillingError::WebhookSignatureInvalid(SignatureError::Mismatch),
                StatusCode::UNAUTHORIZED,
            ),
            (
                BillingError::MalformedEvent("eof".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                BillingError::Store(StoreError::Unavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}
