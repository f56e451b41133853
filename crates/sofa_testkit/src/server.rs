//! The in-memory server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::log::RequestLog;
use sofa_protocol::{HttpRequest, HttpResponse, JsonObject, LoopbackServer, ID_KEY};
use tracing::debug;

/// A CouchDB-compatible server living in process memory.
///
/// It answers the requests a client sends through a loopback transport,
/// keeps a [`RequestLog`] of everything it answered, and offers direct
/// accessors so tests can arrange and inspect state without going through
/// HTTP.
///
/// # Example
///
/// ```
/// use sofa_testkit::{MemoryServer, ServerConfig};
/// use sofa_protocol::{HttpRequest, LoopbackServer, Method};
///
/// let server = MemoryServer::new(ServerConfig::default());
/// server.create_database("animals").unwrap();
///
/// let response = server.handle(&HttpRequest::new(Method::Get, ["animals"]));
/// assert_eq!(response.status, 200);
/// assert_eq!(server.log().count("GET", "/animals"), 1);
/// ```
pub struct MemoryServer {
    context: HandlerContext,
    log: RequestLog,
}

impl MemoryServer {
    /// Creates a server without databases.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            context: HandlerContext::new(config),
            log: RequestLog::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the log of answered requests.
    pub fn log(&self) -> &RequestLog {
        &self.log
    }

    /// Creates a database, bypassing authentication.
    pub fn create_database(&self, name: &str) -> ServerResult<()> {
        self.context.create_database(name)
    }

    /// Names of all databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        self.context.database_names()
    }

    /// Writes a document body carrying its own `_id`. Returns the new revision.
    pub fn put_document(&self, db: &str, body: JsonObject) -> ServerResult<String> {
        let id = body
            .get(ID_KEY)
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        self.context.write(db, |store| store.put(&id, body))
    }

    /// Current body of a live document.
    pub fn document(&self, db: &str, id: &str) -> Option<JsonObject> {
        self.context
            .read(db, |store| Ok(store.live_document(id)))
            .ok()
            .flatten()
    }

    /// Replaces the `_security` object of a database.
    pub fn set_security(&self, db: &str, security: JsonObject) -> ServerResult<()> {
        self.context.write(db, |store| {
            store.set_security(security);
            Ok(())
        })
    }

    /// Current update sequence of a database.
    pub fn update_seq(&self, db: &str) -> ServerResult<u64> {
        self.context.read(db, |store| Ok(store.update_seq()))
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("databases", &self.context.database_names())
            .field("requests", &self.log.len())
            .finish()
    }
}

impl LoopbackServer for MemoryServer {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.path();
        let response = match RequestHandler::new(&self.context).handle(request) {
            Ok(response) => response,
            Err(err) => {
                debug!(method = %request.method, %path, error = %err, "request refused");
                err.into_response()
            }
        };

        debug!(method = %request.method, %path, status = response.status, "answered");
        self.log.record(request.method.as_str(), path, response.status);
        response
    }
}
