//! Server session: the entry point of the client.

use crate::config::ClientConfig;
use crate::database::Database;
use crate::error::{ClientError, ClientResult};
use crate::http::{HttpClient, ReqwestClient};
use crate::remote::{ErrorContext, ErrorRule, Remote};
use serde::Deserialize;
use serde_json::Value;
use sofa_protocol::{HttpRequest, JsonObject, Method, Params};
use std::sync::Arc;
use tracing::debug;

const SESSION_RULES: &[ErrorRule] = &[ErrorRule::new(401, "Invalid credentials")];

const CREATE_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid database name"),
    ErrorRule::new(401, "CouchDB Server Administrator privileges required"),
    ErrorRule::new(403, "CouchDB Server Administrator privileges required"),
    ErrorRule::new(412, "Database already exists"),
];

const DATABASE_RULES: &[ErrorRule] = &[
    ErrorRule::new(401, "Read privilege required for database '{db}'"),
    ErrorRule::new(403, "Read privilege required for database '{db}'"),
    ErrorRule::new(404, "The database '{db}' does not exist."),
];

/// The user context reported by `GET /_session`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserContext {
    /// Authenticated user; `None` for anonymous sessions.
    pub name: Option<String>,
    /// Roles of the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(rename = "userCtx")]
    user_ctx: UserContext,
}

/// A connection to one server.
///
/// Cheap to clone; every [`Database`] handed out shares the same transport.
#[derive(Debug, Clone)]
pub struct CouchSession {
    remote: Arc<Remote>,
}

impl CouchSession {
    /// Connects to the configured server over HTTP. No request is made.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let client = ReqwestClient::new(&config)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Uses a custom transport, e.g. a [`LoopbackClient`](crate::LoopbackClient).
    pub fn with_client(config: ClientConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            remote: Arc::new(Remote::new(config, client)),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        self.remote.config()
    }

    /// Verifies the configured credentials.
    ///
    /// Fails with [`ClientError::Unauthorized`] if the server rejects them
    /// or treats the session as anonymous.
    pub async fn check_credentials(&self) -> ClientResult<UserContext> {
        let request = HttpRequest::new(Method::Get, ["_session"]);
        let response: SessionResponse = self
            .remote
            .json(request, &ErrorContext::new(), SESSION_RULES)
            .await?;

        if response.user_ctx.name.is_none() {
            return Err(ClientError::Unauthorized("Invalid credentials".into()));
        }
        debug!(user = ?response.user_ctx.name, "credentials accepted");
        Ok(response.user_ctx)
    }

    /// Creates a database.
    ///
    /// An existing database fails with [`ClientError::PreconditionFailed`]
    /// unless `exists_ok` is set.
    pub async fn create(&self, id: &str, exists_ok: bool) -> ClientResult<Database> {
        self.create_with(id, exists_ok, Params::new()).await
    }

    /// Creates a database with extra parameters (`q`, `n`, `partitioned`).
    pub async fn create_with(&self, id: &str, exists_ok: bool, params: Params) -> ClientResult<Database> {
        let request = HttpRequest::new(Method::Put, [id]).with_params(params);
        let context = ErrorContext::new().with("db", id);
        match self.remote.send(request, &context, CREATE_RULES).await {
            Ok(_) => {}
            Err(ClientError::PreconditionFailed(_)) if exists_ok => {}
            Err(e) => return Err(e),
        }
        Ok(Database::new(Arc::clone(&self.remote), id))
    }

    /// Returns a handle to an existing database.
    ///
    /// Fails with [`ClientError::NotFound`] if it does not exist.
    pub async fn database(&self, id: &str) -> ClientResult<Database> {
        let database = Database::new(Arc::clone(&self.remote), id);
        let request = HttpRequest::new(Method::Head, [id]);
        let context = ErrorContext::new().with("db", id);
        if !self.remote.exists(request, &context, DATABASE_RULES).await? {
            return Err(ClientError::NotFound(format!(
                "The database '{}' does not exist.",
                id
            )));
        }
        Ok(database)
    }

    /// Returns the names of all databases.
    pub async fn keys(&self) -> ClientResult<Vec<String>> {
        let request = HttpRequest::new(Method::Get, ["_all_dbs"]);
        self.remote.json(request, &ErrorContext::new(), &[]).await
    }

    /// Returns the server welcome object (version, vendor, ...).
    pub async fn info(&self) -> ClientResult<JsonObject> {
        let request = HttpRequest::new(Method::Get, Vec::<String>::new());
        self.remote.json(request, &ErrorContext::new(), &[]).await
    }

    /// Returns the server version string.
    pub async fn version(&self) -> ClientResult<String> {
        let info = self.info().await?;
        info.get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::protocol("server info carries no version"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::LoopbackClient;
    use sofa_testkit::{MemoryServer, ServerConfig};

    fn session(server: &Arc<MemoryServer>, config: ClientConfig) -> CouchSession {
        CouchSession::with_client(config, Arc::new(LoopbackClient::new(Arc::clone(server))))
    }

    fn secured_server() -> Arc<MemoryServer> {
        Arc::new(MemoryServer::new(
            ServerConfig::default().with_admin("admin", "secret"),
        ))
    }

    #[tokio::test]
    async fn create_twice_is_precondition_failed() {
        let server = Arc::new(MemoryServer::default());
        let couch = session(&server, ClientConfig::default());

        let db = couch.create("config", false).await.unwrap();
        assert_eq!(db.id(), "config");

        let err = couch.create("config", false).await.unwrap_err();
        assert!(matches!(err, ClientError::PreconditionFailed(_)));
        couch.create("config", true).await.unwrap();

        assert_eq!(couch.keys().await.unwrap(), vec!["config"]);
    }

    #[tokio::test]
    async fn missing_database_is_not_found() {
        let server = Arc::new(MemoryServer::default());
        let couch = session(&server, ClientConfig::default());

        let err = couch.database("nothing").await.unwrap_err();
        match err {
            ClientError::NotFound(message) => {
                assert_eq!(message, "The database 'nothing' does not exist.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn credentials_are_checked() {
        let server = secured_server();

        let admin = session(&server, ClientConfig::default().with_credentials("admin", "secret"));
        let user = admin.check_credentials().await.unwrap();
        assert_eq!(user.name.as_deref(), Some("admin"));
        assert!(user.roles.contains(&"_admin".to_string()));

        let anonymous = session(&server, ClientConfig::default());
        assert!(matches!(
            anonymous.check_credentials().await,
            Err(ClientError::Unauthorized(_))
        ));

        let wrong = session(&server, ClientConfig::default().with_credentials("admin", "nope"));
        assert!(matches!(
            wrong.check_credentials().await,
            Err(ClientError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn server_info_reports_version() {
        let server = Arc::new(MemoryServer::default());
        let couch = session(&server, ClientConfig::default());
        let info = couch.info().await.unwrap();
        assert_eq!(info.get("couchdb").and_then(Value::as_str), Some("Welcome"));
        assert_eq!(couch.version().await.unwrap(), server.config().version);
    }
}
