//! Gateway error taxonomy and its mapping onto OpenAI-style error responses.
//!
//! Derivation failures all collapse into [`GatewayError::UpstreamAuth`] at
//! this boundary and surface to the client as a generic 502: the concrete
//! challenge-bypass failure reason goes to the logs, not to the caller.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;
use stile_humanizer::DerivationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid api key")]
    Unauthorized,

    #[error("model `{0}` is not in the configured model list")]
    UnknownModel(String),

    #[error("upstream verification failed")]
    UpstreamAuth(#[from] DerivationError),

    #[error("upstream request failed: {0}")]
    UpstreamConnect(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream stream ended before its completion signal")]
    StreamInterrupted,

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "invalid_api_key",
            GatewayError::UnknownModel(_) => "model_not_found",
            GatewayError::UpstreamAuth(_) => "upstream_auth_error",
            GatewayError::UpstreamConnect(_) | GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::StreamInterrupted => "stream_interrupted",
            GatewayError::Encode(_) => "internal_error",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized | GatewayError::UnknownModel(_) => "invalid_request_error",
            _ => "upstream_error",
        }
    }
}

impl actix_web::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::UnknownModel(_) => StatusCode::NOT_FOUND,
            GatewayError::UpstreamAuth(_)
            | GatewayError::UpstreamConnect(_)
            | GatewayError::StreamInterrupted => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
                "code": self.code(),
            }
        }))
    }
}
