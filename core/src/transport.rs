//! Executing `HttpRequest` values over the network.
//!
//! `Transport` is the seam between the pure client and real I/O. The bundled
//! `UreqTransport` is blocking; wrap it in an `Arc` to share one agent across
//! threads.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes a request and returns the response as data, whatever its status.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
///
/// Status-code-as-error is disabled so 4xx/5xx responses come back as data
/// and the dispatcher decides what they mean.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// `timeout` bounds each whole request unless the request carries its own.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = request.method.as_str(), url = %request.url, "executing request");

        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let result = match method {
            HttpMethod::Get => prepare(self.agent.get(&url), &headers, timeout).call(),
            HttpMethod::Delete => prepare(self.agent.delete(&url), &headers, timeout).call(),
            HttpMethod::Post => send(prepare(self.agent.post(&url), &headers, timeout), body),
            HttpMethod::Put => send(prepare(self.agent.put(&url), &headers, timeout), body),
        };
        let mut response = result.map_err(TransportError::Request)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(TransportError::ReadBody)?;

        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
    timeout: Option<Duration>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if timeout.is_some() {
        builder = builder.config().timeout_global(timeout).build();
    }
    builder
}

fn send(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
