//! The HTTP exchange seam.
//!
//! The engine never talks to the network directly. It hands a fully formed
//! [`TransportRequest`] to a [`Transport`] and gets back a
//! [`TransportResponse`] or a [`TransportError`]. [`ReqwestTransport`] is the
//! production implementation; tests substitute scripted ones.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use sparky_core::{Attachment, Method};
use tracing::trace;

use crate::error::TransportError;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A JSON document.
    Json(Value),
    /// `multipart/form-data` with text fields and an optional file.
    Multipart {
        fields: Vec<(String, String)>,
        attachment: Option<Attachment>,
    },
}

/// One physical HTTP exchange, fully formed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// Logical method; FORM goes out as POST.
    pub method: Method,
    /// Absolute URL without the query string built from `query`.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Query parameters appended to `url`.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
    /// Timeout of the whole exchange.
    pub timeout: Duration,
    /// Whether the response is a file rather than JSON.
    pub binary: bool,
}

impl TransportRequest {
    /// Returns the first header value with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Normalized result of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lowercase names, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder: add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Returns the first header value with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns every value of the given header.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Performs single HTTP exchanges.
///
/// Implementations must not retry, throttle or follow pagination; the engine
/// owns all of that. A response with an error status is still a response,
/// only failures that produced no response become [`TransportError`].
pub trait Transport: Send + Sync {
    /// Executes one exchange.
    fn execute<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with gzip decoding enabled.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &TransportRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post | Method::Form => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart { fields, attachment } => {
                builder.multipart(multipart_form(fields, attachment.as_ref())?)
            }
        };
        Ok(builder)
    }
}

fn multipart_form(
    fields: &[(String, String)],
    attachment: Option<&Attachment>,
) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    if let Some(file) = attachment {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| TransportError::Request(format!("invalid attachment type: {e}")))?;
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let response = self.build(request)?.send().await.map_err(map_send_error)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            trace!(status, bytes = body.len(), url = %request.url, "exchange complete");
            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
