use std::fmt;

use reqwest::{Method, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Method and path of an API call, carried by failures for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: Method,
    pub path: String,
}

impl Call {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, Error)]
pub enum DocloudError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unexpected error on {call}, reason : {source}")]
    Transport {
        call: Call,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response code {status} on {call}{}", reason_suffix(.message))]
    UnexpectedStatus {
        call: Call,
        status: u16,
        message: Option<String>,
        body: Option<Value>,
    },

    #[error("Failed to decode response of {call}: {source}")]
    Decode {
        call: Call,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid response to {call}: {reason}")]
    Protocol { call: Call, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gzip compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No Tokio runtime available to drive the job workflow")]
    NoRuntime,
}

fn reason_suffix(message: &Option<String>) -> String {
    match message {
        Some(reason) => format!(", reason : {reason}"),
        None => String::new(),
    }
}

impl DocloudError {
    /// The call that failed, for transport, status and response failures.
    pub fn call(&self) -> Option<&Call> {
        match self {
            DocloudError::Transport { call, .. }
            | DocloudError::UnexpectedStatus { call, .. }
            | DocloudError::Decode { call, .. }
            | DocloudError::Protocol { call, .. } => Some(call),
            _ => None,
        }
    }

    /// HTTP status code of an unexpected-status failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            DocloudError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body returned by the service alongside an unexpected status.
    pub fn body(&self) -> Option<&Value> {
        match self {
            DocloudError::UnexpectedStatus { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

pub(crate) fn validate_id(kind: &str, value: &str) -> Result<(), DocloudError> {
    if value.trim().is_empty() {
        return Err(DocloudError::Validation(format!("{kind} must not be empty")));
    }
    if value.contains('/') {
        return Err(DocloudError::Validation(format!(
            "{kind} '{value}' must not contain '/'"
        )));
    }
    Ok(())
}

pub(crate) fn transport_failure(call: &Call, source: reqwest::Error) -> DocloudError {
    let err = DocloudError::Transport {
        call: call.clone(),
        source,
    };
    warn!("{err}");
    err
}

/// Builds the failure for a completed exchange whose status is not accepted.
pub(crate) fn unexpected_status(call: &Call, status: u16, body: Option<Value>) -> DocloudError {
    let message = body
        .as_ref()
        .and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let err = DocloudError::UnexpectedStatus {
        call: call.clone(),
        status,
        message,
        body,
    };
    warn!("{err}");
    err
}

/// Passes the response through when its status is in `accepted`, otherwise
/// turns the outcome into a [`DocloudError`]. Never retries.
pub(crate) async fn classify(
    call: &Call,
    outcome: Result<Response, reqwest::Error>,
    accepted: &[u16],
) -> Result<Response, DocloudError> {
    let response = outcome.map_err(|source| transport_failure(call, source))?;
    let status = response.status().as_u16();
    if accepted.contains(&status) {
        return Ok(response);
    }
    let body = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());
    Err(unexpected_status(call, status, body))
}
