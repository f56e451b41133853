//! HTTP client implementations.
//!
//! The actual HTTP client is abstracted via a trait so that the library can
//! run against a real server (`reqwest`) or route requests in-process to a
//! [`LoopbackServer`] in tests.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::Url;
use sofa_protocol::{HttpRequest, HttpResponse, LoopbackServer};
use std::sync::Arc;

/// HTTP client abstraction.
///
/// Implementations perform exactly one round trip per call and never retry.
/// An `Err` means no response was received at all; error statuses are
/// returned as ordinary responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// HTTP client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestClient {
    /// Creates a client for the configured server.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let base_url = Url::parse(&config.server_url).map_err(|e| {
            ClientError::invalid_argument(format!(
                "invalid server url '{}': {}",
                config.server_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::invalid_argument(format!(
                "server url '{}' cannot be used as a base",
                config.server_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &HttpRequest) -> Result<Url, String> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| format!("'{}' cannot be a base URL", self.base_url))?;
            segments.pop_if_empty();
            segments.extend(request.segments.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let url = self.url_for(&request)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| e.to_string())?;

        let mut builder = self.client.request(method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.user, Some(&credentials.password));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
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
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            headers,
            body,
        })
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: Arc<S>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: Arc<S>) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer + 'static> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sofa_protocol::Method;

    struct EchoServer;

    impl LoopbackServer for EchoServer {
        fn handle(&self, request: &HttpRequest) -> HttpResponse {
            HttpResponse::new(200).with_bytes(request.path().into_bytes(), "text/plain")
        }
    }

    #[tokio::test]
    async fn loopback_routes_to_server() {
        let client = LoopbackClient::new(Arc::new(EchoServer));
        let response = client
            .send(HttpRequest::new(Method::Get, ["db", "doc"]))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"/db/doc".to_vec());
    }

    #[test]
    fn reqwest_url_encodes_segments() {
        let client = ReqwestClient::new(&ClientConfig::new("http://localhost:5984")).unwrap();
        let request = HttpRequest::new(Method::Get, ["my db", "a/b"]);
        let url = client.url_for(&request).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/my%20db/a%2Fb");
    }

    #[test]
    fn reqwest_keeps_base_path() {
        let client =
            ReqwestClient::new(&ClientConfig::new("http://proxy.local/couch/")).unwrap();
        let request = HttpRequest::new(Method::Get, ["db", "_design", "ddoc"]);
        let url = client.url_for(&request).unwrap();
        assert_eq!(url.as_str(), "http://proxy.local/couch/db/_design/ddoc");
    }

    #[test]
    fn reqwest_rejects_invalid_url() {
        let result = ReqwestClient::new(&ClientConfig::new("not a url"));
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
}
