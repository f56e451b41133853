//! Client configuration.

use sofa_protocol::Credentials;
use std::time::Duration;

/// Default server URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5984";

/// Default number of documents requested per `_find` page.
pub const DEFAULT_FIND_PAGE_SIZE: u64 = 10_000;

/// Configuration for a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, without trailing slash.
    pub server_url: String,
    /// Basic authentication credentials.
    pub credentials: Option<Credentials>,
    /// Request timeout.
    pub timeout: Duration,
    /// Page size for `_find` pagination.
    pub find_page_size: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl ClientConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            credentials: None,
            timeout: Duration::from_secs(30),
            find_page_size: DEFAULT_FIND_PAGE_SIZE,
            user_agent: format!("sofa/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Reads `COUCHDB_HOST`, `COUCHDB_USER` and `COUCHDB_PASS`.
    ///
    /// Missing variables fall back to the defaults; a user without a
    /// password authenticates with an empty one.
    pub fn from_env() -> Self {
        let host = std::env::var("COUCHDB_HOST").unwrap_or_else(|_| DEFAULT_SERVER_URL.into());
        let mut config = Self::new(host);
        if let Ok(user) = std::env::var("COUCHDB_USER") {
            let password = std::env::var("COUCHDB_PASS").unwrap_or_default();
            config = config.with_credentials(user, password);
        }
        config
    }

    /// Sets basic authentication credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the `_find` page size.
    #[must_use]
    pub fn with_find_page_size(mut self, size: u64) -> Self {
        self.find_page_size = size.max(1);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://localhost:5984");
        assert!(config.credentials.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.find_page_size, 10_000);
    }

    #[test]
    fn builder_pattern() {
        let config = ClientConfig::new("http://couch.example.com:5984/")
            .with_credentials("admin", "secret")
            .with_timeout(Duration::from_secs(5))
            .with_find_page_size(0);

        assert_eq!(config.server_url, "http://couch.example.com:5984");
        assert_eq!(config.credentials, Some(Credentials::new("admin", "secret")));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.find_page_size, 1);
    }
}
