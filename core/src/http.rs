//! HTTP transport types and the request builder.
//!
//! # Design
//! Requests and responses are plain data. `SarufiClient` builds `HttpRequest`
//! values and the dispatcher consumes `HttpResponse` values; executing the
//! round-trip is the job of a `Transport`. Keeping the two halves apart makes
//! every endpoint testable without a network.
//!
//! All fields use owned types (`String`, `Vec`) so values can be handed to any
//! transport without lifetime concerns.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::BuildError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Deadline attached to every request built from it.
///
/// The transport enforces the timeout; once a response has been received,
/// decoding is never interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub timeout: Option<Duration>,
}

impl RequestContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Build a request, serializing `body` to JSON when present.
    ///
    /// Headers are applied in order and the last value for a key wins. The
    /// caller sets `Content-Type` and `Authorization` itself.
    pub fn build<B>(
        ctx: &RequestContext,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
        headers: &[(&str, &str)],
    ) -> Result<Self, BuildError>
    where
        B: Serialize + ?Sized,
    {
        let parsed = Url::parse(url).map_err(|source| BuildError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let body = body.map(serde_json::to_string).transpose()?;

        let mut request = HttpRequest {
            method,
            url: parsed.into(),
            headers: Vec::with_capacity(headers.len()),
            body,
            timeout: ctx.timeout,
        };
        for (key, value) in headers {
            request.set_header(key, value);
        }

        debug!(
            method = method.as_str(),
            url = %request.url,
            has_body = request.body.is_some(),
            "built request"
        );
        Ok(request)
    }

    /// Set a header, replacing any existing value under the same
    /// (case-insensitive) name.
    pub fn set_header(&mut self, key: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Produced by a `Transport`, then handed to the dispatcher for
/// classification and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Render the value of an `Authorization` header for `token`.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
