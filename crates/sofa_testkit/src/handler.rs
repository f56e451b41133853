//! Request routing and endpoint handlers.

use crate::auth::{
    authenticate, is_db_admin, require_db_admin, require_member, require_server_admin, Principal,
};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::query::ViewQuery;
use crate::store::DatabaseStore;
use parking_lot::RwLock;
use serde_json::{json, Value};
use sofa_protocol::{
    BulkDocsRequest, FindRequest, HttpRequest, HttpResponse, JsonObject, KeysRequest, Method,
    WriteResponse, ID_KEY, REV_KEY,
};
use std::collections::BTreeMap;

const DESIGN: &str = "_design";
const LOCAL: &str = "_local";

/// State shared by all requests.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server instance id reported by `GET /`.
    pub uuid: String,
    databases: RwLock<BTreeMap<String, DatabaseStore>>,
}

impl HandlerContext {
    /// Creates a context without databases.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            uuid: uuid::Uuid::new_v4().simple().to_string(),
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Runs `f` against a database.
    pub fn read<T>(&self, db: &str, f: impl FnOnce(&DatabaseStore) -> ServerResult<T>) -> ServerResult<T> {
        let databases = self.databases.read();
        let store = databases.get(db).ok_or_else(missing_database)?;
        f(store)
    }

    /// Runs `f` against a database, allowing writes.
    pub fn write<T>(
        &self,
        db: &str,
        f: impl FnOnce(&mut DatabaseStore) -> ServerResult<T>,
    ) -> ServerResult<T> {
        let mut databases = self.databases.write();
        let store = databases.get_mut(db).ok_or_else(missing_database)?;
        f(store)
    }

    /// Creates a database.
    pub fn create_database(&self, name: &str) -> ServerResult<()> {
        validate_database_name(name)?;
        let mut databases = self.databases.write();
        if databases.contains_key(name) {
            return Err(ServerError::FileExists(
                "The database could not be created, the file already exists.".into(),
            ));
        }
        databases.insert(name.to_string(), DatabaseStore::new(name));
        Ok(())
    }

    /// Drops a database.
    pub fn delete_database(&self, name: &str) -> ServerResult<()> {
        self.databases
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(missing_database)
    }

    /// Names of all databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        self.databases.read().keys().cloned().collect()
    }
}

fn missing_database() -> ServerError {
    ServerError::NotFound("Database does not exist.".into())
}

/// Database names start with a lowercase letter and continue with
/// lowercase letters, digits or any of `_$()+-/`.
fn validate_database_name(name: &str) -> ServerResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c));
    if valid {
        return Ok(());
    }
    Err(ServerError::BadRequest(format!(
        "Name: '{}'. Only lowercase characters (a-z), digits (0-9), and any of the characters _, $, (, ), +, -, and / are allowed. Must begin with a letter.",
        name
    )))
}

/// Routes requests to the endpoint handlers.
pub struct RequestHandler<'a> {
    context: &'a HandlerContext,
}

impl<'a> RequestHandler<'a> {
    /// Creates a handler over `context`.
    pub fn new(context: &'a HandlerContext) -> Self {
        Self { context }
    }

    /// Authenticates and dispatches one request.
    pub fn handle(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        let principal = authenticate(&self.context.config, request.credentials.as_ref())?;
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();

        match segments.as_slice() {
            [] => self.welcome(request),
            ["_session"] => self.session(request, &principal),
            ["_all_dbs"] => self.all_dbs(request),
            [db] => self.database(request, &principal, db),
            [db, rest @ ..] => {
                let security = self.context.read(db, |store| Ok(store.security().clone()))?;
                let scope = Scope {
                    db: *db,
                    principal: &principal,
                    security: &security,
                };
                self.within(request, &scope, rest)
            }
        }
    }

    fn welcome(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get, Method::Head])?;
        Ok(HttpResponse::json(
            200,
            &json!({
                "couchdb": "Welcome",
                "version": self.context.config.version,
                "uuid": self.context.uuid,
                "vendor": {"name": "sofa_testkit"},
            }),
        ))
    }

    fn session(&self, request: &HttpRequest, principal: &Principal) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get])?;
        Ok(HttpResponse::json(
            200,
            &json!({
                "ok": true,
                "userCtx": {"name": principal.name, "roles": principal.roles},
                "info": {"authentication_handlers": ["default"], "authenticated": "default"},
            }),
        ))
    }

    fn all_dbs(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get])?;
        Ok(HttpResponse::json(200, &self.context.database_names()))
    }

    fn database(&self, request: &HttpRequest, principal: &Principal, db: &str) -> ServerResult<HttpResponse> {
        match request.method {
            Method::Put => {
                require_server_admin(principal)?;
                self.context.create_database(db)?;
                Ok(HttpResponse::json(201, &json!({"ok": true})))
            }
            Method::Delete => {
                require_server_admin(principal)?;
                self.context.delete_database(db)?;
                Ok(HttpResponse::json(200, &json!({"ok": true})))
            }
            Method::Get | Method::Head => {
                let info = self.context.read(db, |store| {
                    require_member(principal, store.security())?;
                    Ok(store.info())
                })?;
                Ok(head_or(request, HttpResponse::json(200, &info)))
            }
            Method::Post => {
                let body: JsonObject = request.json()?;
                let id = match body.get(ID_KEY).and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => uuid::Uuid::new_v4().simple().to_string(),
                };
                let rev = self.context.write(db, |store| {
                    require_member(principal, store.security())?;
                    store.put(&id, body)
                })?;
                Ok(written(201, &id, &rev))
            }
            Method::Copy => Err(not_allowed(request)),
        }
    }

    fn within(&self, request: &HttpRequest, scope: &Scope<'_>, rest: &[&str]) -> ServerResult<HttpResponse> {
        match rest {
            ["_all_docs"] => self.all_docs(request, scope),
            ["_bulk_docs"] => self.bulk_docs(request, scope),
            ["_find"] => self.find(request, scope),
            ["_index"] => self.index(request, scope),
            ["_changes"] => self.changes(request, scope),
            ["_purge"] => self.purge(request, scope),
            ["_security"] => self.security(request, scope),
            [DESIGN, ddoc, "_view", view] => self.view(request, scope, ddoc, view),
            [DESIGN, ddoc] => self.document(request, scope, &format!("{}/{}", DESIGN, ddoc)),
            [DESIGN, ddoc, name] => self.attachment(request, scope, &format!("{}/{}", DESIGN, ddoc), name),
            [LOCAL, id] => self.document(request, scope, &format!("{}/{}", LOCAL, id)),
            [id] if !id.starts_with('_') => self.document(request, scope, id),
            [id, name] if !id.starts_with('_') => self.attachment(request, scope, id, name),
            _ => Err(ServerError::NotFound(format!(
                "Unknown endpoint: {}",
                request.path()
            ))),
        }
    }

    fn all_docs(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get, Method::Post])?;
        scope.member()?;
        let query = ViewQuery::from_request(request)?;
        let keys = keys_of(request)?;
        let response = self.context.read(scope.db, |store| Ok(store.all_docs(&query, keys)))?;
        Ok(HttpResponse::json(200, &response))
    }

    fn view(&self, request: &HttpRequest, scope: &Scope<'_>, ddoc: &str, view: &str) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get, Method::Post])?;
        scope.member()?;
        let query = ViewQuery::from_request(request)?;
        let keys = keys_of(request)?;
        let response = self
            .context
            .read(scope.db, |store| store.view(ddoc, view, &query, keys))?;
        Ok(HttpResponse::json(200, &response))
    }

    fn bulk_docs(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Post])?;
        scope.member()?;
        let body: BulkDocsRequest = request.json()?;

        let max = self.context.config.max_bulk_docs;
        if body.docs.len() > max {
            return Err(ServerError::TooLarge(format!(
                "Too many documents in a single request: {} > {}",
                body.docs.len(),
                max
            )));
        }
        if body.new_edits == Some(false) {
            return Err(ServerError::NotImplemented(
                "new_edits=false is not supported by the in-memory server".into(),
            ));
        }
        let touches_design = body.docs.iter().any(|doc| {
            doc.get(ID_KEY)
                .and_then(Value::as_str)
                .is_some_and(|id| id.starts_with("_design/"))
        });
        if touches_design {
            scope.admin()?;
        }

        let statuses = self.context.write(scope.db, |store| Ok(store.bulk_docs(body.docs)))?;
        Ok(HttpResponse::json(201, &statuses))
    }

    fn find(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Post])?;
        scope.member()?;
        let body: FindRequest = request.json()?;
        let response = self.context.read(scope.db, |store| store.find(&body))?;
        Ok(HttpResponse::json(200, &response))
    }

    fn index(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Post])?;
        scope.admin()?;
        let definition: Value = request.json()?;
        let (id, name, created) = self
            .context
            .write(scope.db, |store| store.create_index(definition))?;
        let result = if created { "created" } else { "exists" };
        Ok(HttpResponse::json(
            200,
            &json!({
                "result": result,
                "id": id,
                "name": name,
            }),
        ))
    }

    fn changes(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Get, Method::Post])?;
        scope.member()?;

        let include_docs = request.query_value("include_docs") == Some("true");
        let limit = match request.query_value("limit") {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ServerError::BadRequest(format!("Invalid value for limit: {}", raw))
            })?),
            None => None,
        };
        // A longpoll without news answers immediately; there is nobody to wait for.
        let response = self.context.read(scope.db, |store| {
            let since = parse_since(request.query_value("since"), store.update_seq());
            Ok(store.changes(since, include_docs, limit))
        })?;
        Ok(HttpResponse::json(200, &response))
    }

    fn purge(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        only(request, &[Method::Post])?;
        scope.admin()?;
        let revisions: BTreeMap<String, Vec<String>> = request.json()?;
        let report = self.context.write(scope.db, |store| Ok(store.purge(revisions)))?;
        Ok(HttpResponse::json(201, &report))
    }

    fn security(&self, request: &HttpRequest, scope: &Scope<'_>) -> ServerResult<HttpResponse> {
        match request.method {
            Method::Get => {
                scope.member()?;
                Ok(HttpResponse::json(200, scope.security))
            }
            Method::Put => {
                if !is_db_admin(scope.principal, scope.security) {
                    return Err(match scope.principal.name {
                        Some(_) => ServerError::Internal("You are not a db or server admin.".into()),
                        None => ServerError::Unauthorized("You are not a db or server admin.".into()),
                    });
                }
                let mut security: JsonObject = request.json()?;
                security.remove(ID_KEY);
                security.remove(REV_KEY);
                self.context.write(scope.db, |store| {
                    store.set_security(security);
                    Ok(())
                })?;
                Ok(HttpResponse::json(200, &json!({"ok": true})))
            }
            _ => Err(not_allowed(request)),
        }
    }

    fn document(&self, request: &HttpRequest, scope: &Scope<'_>, id: &str) -> ServerResult<HttpResponse> {
        scope.member()?;
        let is_design = id.starts_with("_design/");

        match request.method {
            Method::Get | Method::Head => {
                let doc = self
                    .context
                    .read(scope.db, |store| store.get(id, request.query_value("rev")))?;
                let rev = doc.get(REV_KEY).and_then(Value::as_str).unwrap_or_default();
                let response = HttpResponse::json(200, &doc).with_header("ETag", quoted(rev));
                Ok(head_or(request, response))
            }
            Method::Put => {
                if is_design {
                    scope.admin()?;
                }
                let mut body: JsonObject = request.json()?;
                if !body.contains_key(REV_KEY) {
                    if let Some(rev) = requested_rev(request) {
                        body.insert(REV_KEY.into(), Value::String(rev));
                    }
                }
                let rev = self.context.write(scope.db, |store| store.put(id, body))?;
                Ok(written(201, id, &rev))
            }
            Method::Delete => {
                if is_design {
                    scope.admin()?;
                }
                let rev = requested_rev(request);
                let rev = self
                    .context
                    .write(scope.db, |store| store.delete(id, rev.as_deref()))?;
                Ok(written(200, id, &rev))
            }
            Method::Copy => {
                let destination = request
                    .header("Destination")
                    .map(|d| d.split('?').next().unwrap_or(d).to_string())
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| ServerError::BadRequest("Destination header is mandatory for COPY.".into()))?;
                if destination.starts_with("_design/") {
                    scope.admin()?;
                }
                let rev = self
                    .context
                    .write(scope.db, |store| store.copy(id, &destination))?;
                Ok(written(201, &destination, &rev))
            }
            Method::Post => Err(not_allowed(request)),
        }
    }

    fn attachment(
        &self,
        request: &HttpRequest,
        scope: &Scope<'_>,
        id: &str,
        name: &str,
    ) -> ServerResult<HttpResponse> {
        scope.member()?;
        if id.starts_with("_design/") && !matches!(request.method, Method::Get | Method::Head) {
            scope.admin()?;
        }

        match request.method {
            Method::Get | Method::Head => {
                let response = self.context.read(scope.db, |store| {
                    let attachment = store.attachment(id, name)?;
                    Ok(HttpResponse::new(200)
                        .with_bytes(attachment.data.clone(), attachment.content_type.clone())
                        .with_header("ETag", quoted(&attachment.digest())))
                })?;
                Ok(head_or(request, response))
            }
            Method::Put => {
                let data = request.body.clone().unwrap_or_default();
                let content_type = request
                    .header("Content-Type")
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let rev = requested_rev(request);
                let new_rev = self.context.write(scope.db, |store| {
                    store.put_attachment(id, name, rev.as_deref(), data, &content_type)
                })?;
                Ok(written(201, id, &new_rev))
            }
            Method::Delete => {
                let rev = requested_rev(request);
                let new_rev = self
                    .context
                    .write(scope.db, |store| store.delete_attachment(id, name, rev.as_deref()))?;
                Ok(written(200, id, &new_rev))
            }
            Method::Post | Method::Copy => Err(not_allowed(request)),
        }
    }
}

/// The database a request targets and who is asking.
struct Scope<'a> {
    db: &'a str,
    principal: &'a Principal,
    security: &'a JsonObject,
}

impl Scope<'_> {
    fn member(&self) -> ServerResult<()> {
        require_member(self.principal, self.security)
    }

    fn admin(&self) -> ServerResult<()> {
        require_db_admin(self.principal, self.security)
    }
}

fn only(request: &HttpRequest, allowed: &[Method]) -> ServerResult<()> {
    if allowed.contains(&request.method) {
        return Ok(());
    }
    Err(not_allowed(request))
}

fn not_allowed(request: &HttpRequest) -> ServerError {
    ServerError::MethodNotAllowed(format!(
        "{} is not allowed on {}",
        request.method,
        request.path()
    ))
}

fn head_or(request: &HttpRequest, mut response: HttpResponse) -> HttpResponse {
    if request.method == Method::Head {
        response.body.clear();
    }
    response
}

fn written(status: u16, id: &str, rev: &str) -> HttpResponse {
    HttpResponse::json(status, &WriteResponse::new(id, rev)).with_header("ETag", quoted(rev))
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

/// The revision a write names, from the query string or `If-Match`.
fn requested_rev(request: &HttpRequest) -> Option<String> {
    request
        .query_value("rev")
        .or_else(|| request.header("If-Match"))
        .map(|rev| rev.trim_matches('"').to_string())
}

fn keys_of(request: &HttpRequest) -> ServerResult<Option<Vec<Value>>> {
    if request.method != Method::Post {
        return Ok(None);
    }
    let body: KeysRequest = request.json()?;
    Ok(Some(body.keys))
}

/// `since` is `now`, a number, or an opaque `N-...` token.
fn parse_since(raw: Option<&str>, current: u64) -> u64 {
    match raw {
        None => 0,
        Some("now") => current,
        Some(raw) => raw
            .trim_matches('"')
            .split('-')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0),
    }
}
