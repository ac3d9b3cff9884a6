//! Error types for the Sarufi client.
//!
//! # Design
//! The platform answers failures with a handful of JSON shapes keyed by
//! status code. Each shape gets its own payload type so callers can inspect
//! the fields; `DispatchError` wraps them, and `ApiError` adds the name of the
//! operation that failed. Any other non-2xx response keeps its raw body in
//! `DispatchError::Opaque`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// One entry of a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationErrorDetail {
    #[serde(default, deserialize_with = "location_segments")]
    pub loc: Vec<String>,
    #[serde(default)]
    pub msg: String,
    #[serde(default, rename = "type")]
    pub error_type: String,
}

impl fmt::Display for ValidationErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "location: [{}], message: {}, error type: {}",
            self.loc.join(","),
            self.msg,
            self.error_type
        )
    }
}

/// Body of a 422 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationError {
    #[serde(default, deserialize_with = "one_or_many")]
    pub detail: Vec<ValidationErrorDetail>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation error")?;
        for (i, detail) in self.detail.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { ", " })?;
            write!(f, "{detail}")?;
        }
        Ok(())
    }
}

/// Body of a 400 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestError {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        labelled(f, "Bad Request", &self.message, &self.detail)
    }
}

/// Body of a 404 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotFoundError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        labelled(f, "Not Found", &self.message, &self.detail)
    }
}

/// Body of a 401 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Unauthorized {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        labelled(f, "Unauthorized", &self.message, &self.detail)
    }
}

/// Body of a 409 response. Unlike 422, `detail` is a single object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConflictError {
    #[serde(default)]
    pub detail: ValidationErrorDetail,
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conflict Response: {}", self.detail.msg)
    }
}

fn labelled(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    message: &Option<String>,
    detail: &Option<String>,
) -> fmt::Result {
    let primary = message
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| detail.as_deref().filter(|d| !d.is_empty()));
    match primary {
        Some(text) => write!(f, "{label}: {text}"),
        None => f.write_str(label),
    }
}

/// Accept either a list of details or a single detail object.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ValidationErrorDetail>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ValidationErrorDetail>),
        One(ValidationErrorDetail),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(details) => details,
        OneOrMany::One(detail) => vec![detail],
    })
}

/// Location paths mix field names and list indices, e.g. `["body", "flows", 0]`.
fn location_segments<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let segments = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(segments
        .into_iter()
        .map(|segment| match segment {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// Failure while constructing a request.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("encode request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure while executing a request over the network.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request execute: {0}")]
    Request(#[source] ureq::Error),

    #[error("read response body: {0}")]
    ReadBody(#[source] ureq::Error),
}

/// Discriminant of a `DispatchError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Decode,
    Validation,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    ServerError,
    Opaque,
}

/// Classification of a response that did not yield a success value.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The body did not match the expected shape.
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("{0}")]
    BadRequest(RequestError),

    #[error("{0}")]
    Unauthorized(Unauthorized),

    #[error("{0}")]
    NotFound(NotFoundError),

    #[error("{0}")]
    Conflict(ConflictError),

    #[error("Error status code 500: Internal Server Error")]
    ServerError,

    /// Any other non-success status; `body` is the raw response text.
    #[error("status {status}: {body}")]
    Opaque { status: u16, body: String },
}

impl DispatchError {
    pub fn kind(&self) -> DispatchKind {
        match self {
            DispatchError::Decode(_) => DispatchKind::Decode,
            DispatchError::Validation(_) => DispatchKind::Validation,
            DispatchError::BadRequest(_) => DispatchKind::BadRequest,
            DispatchError::Unauthorized(_) => DispatchKind::Unauthorized,
            DispatchError::NotFound(_) => DispatchKind::NotFound,
            DispatchError::Conflict(_) => DispatchKind::Conflict,
            DispatchError::ServerError => DispatchKind::ServerError,
            DispatchError::Opaque { .. } => DispatchKind::Opaque,
        }
    }
}

/// Error returned by every API operation, prefixed with the operation name.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{operation}: {source}")]
    Build {
        operation: &'static str,
        #[source]
        source: BuildError,
    },

    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{operation}: {source}")]
    Dispatch {
        operation: &'static str,
        #[source]
        source: DispatchError,
    },

    #[error("{operation}: {}: {source}", .path.display())]
    Load {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// Failure while reading intents or flows from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn operation(&self) -> &'static str {
        match self {
            ApiError::Build { operation, .. }
            | ApiError::Transport { operation, .. }
            | ApiError::Dispatch { operation, .. }
            | ApiError::Load { operation, .. } => operation,
        }
    }

    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match self {
            ApiError::Dispatch { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn dispatch_kind(&self) -> Option<DispatchKind> {
        self.dispatch_error().map(DispatchError::kind)
    }

    pub fn is_not_found(&self) -> bool {
        self.dispatch_kind() == Some(DispatchKind::NotFound)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.dispatch_kind() == Some(DispatchKind::Unauthorized)
    }

    pub fn is_validation(&self) -> bool {
        self.dispatch_kind() == Some(DispatchKind::Validation)
    }
}
