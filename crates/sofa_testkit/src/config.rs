//! Server configuration.

use crate::auth::Account;

/// Configuration for the in-memory server.
///
/// Without server admins the server runs in "admin party" mode: every
/// request, anonymous or not, is treated as coming from an admin.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server administrators.
    pub admins: Vec<Account>,
    /// Regular users.
    pub users: Vec<Account>,
    /// Maximum number of documents per `_bulk_docs` request.
    pub max_bulk_docs: usize,
    /// Version reported by `GET /`.
    pub version: String,
}

impl ServerConfig {
    /// Creates a configuration without accounts.
    pub fn new() -> Self {
        Self {
            admins: Vec::new(),
            users: Vec::new(),
            max_bulk_docs: 10_000,
            version: "3.3.3".into(),
        }
    }

    /// Adds a server admin.
    pub fn with_admin(mut self, name: &str, password: &str) -> Self {
        self.admins.push(Account::new(name, password, ["_admin"]));
        self
    }

    /// Adds a regular user with the given roles.
    pub fn with_user<I, S>(mut self, name: &str, password: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users.push(Account::new(name, password, roles));
        self
    }

    /// Sets the maximum `_bulk_docs` batch.
    pub fn with_max_bulk_docs(mut self, max: usize) -> Self {
        self.max_bulk_docs = max;
        self
    }

    /// Sets the reported version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// True once a server admin is configured.
    pub fn requires_auth(&self) -> bool {
        !self.admins.is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_admin_party() {
        let config = ServerConfig::default();
        assert!(!config.requires_auth());
        assert_eq!(config.max_bulk_docs, 10_000);
    }

    #[test]
    fn builder() {
        let config = ServerConfig::new()
            .with_admin("admin", "secret")
            .with_user("lennon", "imagine", ["beatles"])
            .with_max_bulk_docs(2)
            .with_version("2.3.1");

        assert!(config.requires_auth());
        assert_eq!(config.users[0].roles, vec!["beatles"]);
        assert_eq!(config.max_bulk_docs, 2);
        assert_eq!(config.version, "2.3.1");
    }
}
