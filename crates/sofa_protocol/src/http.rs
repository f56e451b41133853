//! HTTP request and response envelopes.
//!
//! Transports receive an [`HttpRequest`] and hand back an [`HttpResponse`].
//! Paths are kept as raw segments; encoding them into a URL is the
//! transport's job, so document ids containing `/` survive the trip.

use crate::error::{ProtocolError, ProtocolResult};
use crate::params::Params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// HTTP methods used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
    /// COPY (CouchDB extension)
    Copy,
}

impl Method {
    /// Returns the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Copy => "COPY",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates new credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A single HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Unencoded path segments (`["db", "_design", "ddoc"]`).
    pub segments: Vec<String>,
    /// Query string pairs, already stringified.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Credentials for basic authentication.
    pub credentials: Option<Credentials>,
}

impl HttpRequest {
    /// Creates a request without query, headers or body.
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            credentials: None,
        }
    }

    /// Appends the given query parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.query.extend(params.into_pairs());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> ProtocolResult<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self.with_header("Content-Type", "application/json"))
    }

    /// Sets a raw body with the given content type.
    pub fn with_bytes(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(data);
        self.with_header("Content-Type", content_type)
    }

    /// Sets the credentials.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Returns the path as `/seg/seg`, unencoded. Used for diagnostics and routing.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Looks up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Looks up a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decodes the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        let body = self.body.as_deref().ok_or(ProtocolError::MissingBody)?;
        Ok(serde_json::from_slice(body)?)
    }
}

/// A single HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates an empty response with the canonical reason phrase.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: canonical_reason(status).to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a JSON response.
    pub fn json<T: Serialize + ?Sized>(status: u16, body: &T) -> Self {
        let mut response = Self::new(status).with_header("Content-Type", "application/json");
        response.body = serde_json::to_vec(body).unwrap_or_default();
        response
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a raw body with the given content type.
    pub fn with_bytes(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = data;
        self.with_header("Content-Type", content_type)
    }

    /// Returns true for 2xx responses and redirects the server answers with 302.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) || self.status == 302
    }

    /// Looks up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns the `ETag` header without its surrounding quotes.
    pub fn etag(&self) -> Option<String> {
        self.header("ETag").map(|v| v.trim_matches('"').to_string())
    }

    /// Decodes the JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        if self.body.is_empty() {
            return Err(ProtocolError::MissingBody);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Extracts the `reason` field of a JSON error body, if any.
    pub fn error_reason(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        value
            .get("reason")
            .and_then(|r| r.as_str())
            .map(str::to_string)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Returns the reason phrase for the status codes a CouchDB server produces.
pub fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Object Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        415 => "Unsupported Media Type",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// A server that can answer requests in-process.
///
/// Implemented by the in-memory reference server; the client's loopback
/// transport routes requests straight into it.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and produces the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}
