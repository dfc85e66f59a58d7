//! Error type and response handling shared by the catalog HTTP clients.

use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by source and target catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl CatalogError {
    /// HTTP status of a non-success response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    title: Option<String>,
    detail: Option<String>,
}

/// Render an error body for logs. Structured `{"errors": [...]}` bodies are
/// flattened to their titles and details; anything else is kept verbatim.
pub fn describe_error_body(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_string();
    };
    let described: Vec<String> = parsed
        .errors
        .iter()
        .filter_map(|e| match (&e.title, &e.detail) {
            (Some(title), Some(detail)) => Some(format!("{}: {}", title, detail)),
            (Some(text), None) | (None, Some(text)) => Some(text.clone()),
            (None, None) => None,
        })
        .collect();
    if described.is_empty() {
        body.trim().to_string()
    } else {
        described.join("; ")
    }
}

/// Turn a non-success response into [`CatalogError::Status`], keeping the body.
pub fn check_status(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(CatalogError::Status {
        status: status.as_u16(),
        body: describe_error_body(&body),
    })
}

/// Check the status and decode a JSON body.
pub fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
    let body = check_status(response)?.text()?;
    parse_json(&body)
}

pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, CatalogError> {
    serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))
}
