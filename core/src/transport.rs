//! The seam between the client and the network.
//!
//! # Design
//! A `Transport` executes one `HttpRequest` synchronously and returns the raw
//! response stream: status line, header block, blank line, body. It does not
//! interpret HTTP status codes, because ACS reports failures inside the JSON
//! envelope and the client must see that envelope whatever the status.
//! `UreqTransport` is the default implementation; tests script their own.

use std::fmt;
use std::fmt::Write as _;

use thiserror::Error;
use ureq::http::{Method, Request, Response};
use ureq::{Agent, Body};

use crate::http::{HttpMethod, HttpRequest};

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        TransportError::new(e.to_string())
    }
}

/// Executes requests on behalf of `AcsClient`.
pub trait Transport {
    /// Perform the round trip and return the raw `headers + body` stream.
    fn execute(&self, request: &HttpRequest) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<String, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<String, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// The agent is built with `http_status_as_error(false)` so 4xx/5xx answers
/// come back as data and their envelopes reach the decoder.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent (proxies, timeouts, TLS). It should keep
    /// `http_status_as_error(false)` or failed envelopes surface as transport
    /// errors.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<String, TransportError> {
        let url = request.url.as_str();
        let mut response = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call()?,
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call()?,
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(url), &request.headers);
                match &request.body {
                    Some(body) => builder.send(body.as_bytes())?,
                    None => builder.send_empty()?,
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(self.agent.put(url), &request.headers);
                match &request.body {
                    Some(body) => builder.send(body.as_bytes())?,
                    None => builder.send_empty()?,
                }
            }
            HttpMethod::Connect => {
                let mut builder = Request::builder().method(Method::CONNECT).uri(url);
                for (k, v) in &request.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                let call = builder.body(()).map_err(|e| TransportError::new(e.to_string()))?;
                self.agent.run(call)?
            }
        };
        render_raw(&mut response)
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (k, v) in headers {
        builder = builder.header(k.as_str(), v.as_str());
    }
    builder
}

/// Rebuild the `headers + body` stream the client expects.
fn render_raw(response: &mut Response<Body>) -> Result<String, TransportError> {
    let status = response.status();
    let mut raw = format!(
        "{:?} {} {}\r\n",
        response.version(),
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes());
        let _ = write!(raw, "{name}: {value}\r\n");
    }
    raw.push_str("\r\n");
    raw.push_str(&response.body_mut().read_to_string()?);
    Ok(raw)
}
