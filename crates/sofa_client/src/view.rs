//! Views and `_all_docs`.
//!
//! A [`View`] issues one request per call and returns the decoded rows.
//! Pagination and streaming are left to the caller through the usual view
//! parameters (`limit`, `skip`, `startkey`, ...).

use crate::database::Database;
use crate::document::Document;
use crate::error::{ClientError, ClientResult};
use crate::remote::{ErrorContext, ErrorRule};
use serde_json::Value;
use sofa_protocol::{HttpRequest, JsonObject, KeysRequest, Method, Params, ViewResponse, ViewRow};

const VIEW_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, "Invalid request for view '{id}'"),
    ErrorRule::new(401, "Read privileges required for view '{id}'"),
    ErrorRule::new(403, "Read privileges required for view '{id}'"),
    ErrorRule::new(
        404,
        "Specified database, design document or view is missing ({endpoint})",
    ),
];

const DESIGN_PREFIX: &str = "_design/";

/// Upper bound appended to a prefix to form an `endkey`.
///
/// `_all_docs` collates by code point, views by ICU; each needs a sentinel
/// that sorts after every key starting with the prefix.
const ALL_DOCS_SENTINEL: char = '\u{10FFFE}';
const VIEW_SENTINEL: char = '\u{FFFF}';

#[derive(Debug, Clone, PartialEq, Eq)]
enum ViewKind {
    AllDocs,
    Design { ddoc: String, name: String },
}

/// Options for [`View::docs`] and [`Database::docs`].
#[derive(Debug, Clone, Default)]
pub struct DocsQuery {
    ids: Option<Vec<String>>,
    create: bool,
    prefix: Option<String>,
    include_ddocs: bool,
    params: Params,
}

impl DocsQuery {
    /// Creates a query over every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to the given ids, in order.
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Yields fresh documents for ids that do not exist instead of failing.
    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Restricts the query to keys starting with `prefix`.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Includes design documents in the result.
    #[must_use]
    pub fn include_ddocs(mut self, include: bool) -> Self {
        self.include_ddocs = include;
        self
    }

    /// Adds raw view parameters.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }
}

/// A view or the `_all_docs` index of a database.
#[derive(Debug, Clone)]
pub struct View {
    database: Database,
    kind: ViewKind,
}

impl View {
    pub(crate) fn all_docs(database: &Database) -> Self {
        Self {
            database: database.clone(),
            kind: ViewKind::AllDocs,
        }
    }

    pub(crate) fn design(database: &Database, ddoc: impl Into<String>, name: impl Into<String>) -> Self {
        let ddoc: String = ddoc.into();
        Self {
            database: database.clone(),
            kind: ViewKind::Design {
                ddoc: ddoc.trim_start_matches(DESIGN_PREFIX).to_string(),
                name: name.into(),
            },
        }
    }

    /// Returns the database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the view name; `_all_docs` for the primary index.
    pub fn name(&self) -> &str {
        match &self.kind {
            ViewKind::AllDocs => "_all_docs",
            ViewKind::Design { name, .. } => name.as_str(),
        }
    }

    /// Returns the design document name, if this is a design view.
    pub fn design_doc(&self) -> Option<&str> {
        match &self.kind {
            ViewKind::AllDocs => None,
            ViewKind::Design { ddoc, .. } => Some(ddoc.as_str()),
        }
    }

    /// Queries the view.
    pub async fn get(&self, params: Params) -> ClientResult<ViewResult> {
        let request = HttpRequest::new(Method::Get, self.segments()).with_params(params);
        self.query(request).await
    }

    /// Queries the view for the given keys.
    pub async fn post(&self, keys: Vec<Value>, params: Params) -> ClientResult<ViewResult> {
        let request = HttpRequest::new(Method::Post, self.segments())
            .with_params(params)
            .with_json(&KeysRequest { keys })?;
        self.query(request).await
    }

    /// Returns the document ids of all rows.
    pub async fn keys(&self, params: Params) -> ClientResult<Vec<String>> {
        Ok(self.get(params).await?.keys().map(str::to_string).collect())
    }

    /// Returns the values of all rows.
    pub async fn values(&self, params: Params) -> ClientResult<Vec<Value>> {
        Ok(self.get(params).await?.values().cloned().collect())
    }

    /// Returns `(key, value)` of all rows.
    pub async fn items(&self, params: Params) -> ClientResult<Vec<(Value, Value)>> {
        Ok(self
            .get(params)
            .await?
            .items()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Returns document ids, optionally restricted to `keys` or a key prefix.
    pub async fn ids(
        &self,
        keys: Option<Vec<String>>,
        prefix: Option<&str>,
        mut params: Params,
    ) -> ClientResult<Vec<String>> {
        if let Some(prefix) = prefix {
            self.apply_prefix(&mut params, prefix);
        }

        let result = match keys {
            Some(keys) => {
                self.post(keys.into_iter().map(Value::String).collect(), params)
                    .await?
            }
            None => self.get(params).await?,
        };
        Ok(result.keys().map(str::to_string).collect())
    }

    /// Returns documents for the rows of the view.
    ///
    /// `prefix` cannot be combined with `ids` or `create`; that combination
    /// fails with [`ClientError::InvalidArgument`] before any request.
    pub async fn docs(&self, query: DocsQuery) -> ClientResult<Vec<Document>> {
        let DocsQuery {
            ids,
            create,
            prefix,
            include_ddocs,
            mut params,
        } = query;

        if prefix.is_some() && (ids.is_some() || create) {
            return Err(ClientError::invalid_argument(
                "prefix cannot be used together with ids or create parameter",
            ));
        }

        params.set("include_docs", true);
        if let Some(prefix) = prefix.as_deref() {
            self.apply_prefix(&mut params, prefix);
        }

        let result = match ids {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                self.post(ids.into_iter().map(Value::String).collect(), params)
                    .await?
            }
            None => self.get(params).await?,
        };
        result.docs(create, include_ddocs)
    }

    fn prefix_sentinel(&self) -> char {
        match self.kind {
            ViewKind::AllDocs => ALL_DOCS_SENTINEL,
            ViewKind::Design { .. } => VIEW_SENTINEL,
        }
    }

    fn apply_prefix(&self, params: &mut Params, prefix: &str) {
        params.set("startkey", prefix);
        params.set("endkey", format!("{}{}", prefix, self.prefix_sentinel()));
    }

    fn segments(&self) -> Vec<String> {
        let db = self.database.id().to_string();
        match &self.kind {
            ViewKind::AllDocs => vec![db, "_all_docs".to_string()],
            ViewKind::Design { ddoc, name } => vec![
                db,
                "_design".to_string(),
                ddoc.clone(),
                "_view".to_string(),
                name.clone(),
            ],
        }
    }

    async fn query(&self, request: HttpRequest) -> ClientResult<ViewResult> {
        let context = ErrorContext::new()
            .with("id", self.name())
            .with("db", self.database.id())
            .with("endpoint", request.path());
        let response: ViewResponse = self
            .database
            .remote()
            .json(request, &context, VIEW_RULES)
            .await?;

        Ok(ViewResult {
            database: self.database.clone(),
            response,
        })
    }
}

/// Decoded rows of one view request.
#[derive(Debug, Clone)]
pub struct ViewResult {
    database: Database,
    response: ViewResponse,
}

impl ViewResult {
    /// Returns every row, error rows included.
    pub fn rows(&self) -> &[ViewRow] {
        &self.response.rows
    }

    /// Total rows in the index.
    pub fn total_rows(&self) -> Option<u64> {
        self.response.total_rows
    }

    /// Offset of the first row.
    pub fn offset(&self) -> Option<u64> {
        self.response.offset
    }

    /// Update sequence, if requested.
    pub fn update_seq(&self) -> Option<&Value> {
        self.response.update_seq.as_ref()
    }

    /// Document ids of the rows without error.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.valid_rows().filter_map(|row| row.id.as_deref())
    }

    /// Values of the rows without error.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.valid_rows().map(|row| &row.value)
    }

    /// `(key, value)` of the rows without error.
    pub fn items(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.valid_rows().map(|row| (&row.key, &row.value))
    }

    /// Turns rows into documents.
    ///
    /// Rows with a body become clean documents. Missing or deleted rows
    /// become fresh documents when `create` is set and fail with
    /// [`ClientError::NotFound`] otherwise. Design documents are skipped
    /// unless `include_ddocs` is set.
    pub fn docs(&self, create: bool, include_ddocs: bool) -> ClientResult<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.response.rows.len());

        for row in &self.response.rows {
            match (&row.error, &row.doc, &row.id) {
                (None, Some(Value::Object(body)), Some(id)) => {
                    if id.starts_with(DESIGN_PREFIX) && !include_ddocs {
                        continue;
                    }
                    documents.push(Document::from_server(&self.database, id.clone(), body.clone()));
                }
                _ if create => {
                    documents.push(Document::from_object(
                        &self.database,
                        key_string(&row.key),
                        JsonObject::new(),
                    ));
                }
                _ => {
                    return Err(ClientError::NotFound(format!(
                        "The document '{}' does not exist in the database {}.",
                        key_string(&row.key),
                        self.database.id()
                    )));
                }
            }
        }
        Ok(documents)
    }

    /// Unwraps the raw response.
    pub fn into_response(self) -> ViewResponse {
        self.response
    }

    fn valid_rows(&self) -> impl Iterator<Item = &ViewRow> {
        self.response.rows.iter().filter(|row| !row.is_error())
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
