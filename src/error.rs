use crate::checkout::CheckoutError;
use crate::state::SessionError;
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No authentication token found")]
    MissingToken,

    #[error("No user is signed in")]
    SignedOut,

    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    Invalid(String),

    #[error("Unexpected response: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Url error {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

// we must manually implement serde::Serialize
impl serde::Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Reqwest(err) => err.status(),
            _ => None,
        }
    }
}

/// Message a failing endpoint put in its body: `message`, then `error`.
pub fn server_message(body: &Value) -> Option<String> {
    ["message", "error"].iter().find_map(|key| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|msg| !msg.is_empty())
            .map(str::to_owned)
    })
}
