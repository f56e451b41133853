//! Document storage of one database.
//!
//! Every write appends a revision to the document's history and bumps the
//! database update sequence. Revision tokens are `N-<digest>` where `N` is
//! the generation, one more than the revision the write replaced.

use crate::collate::collate;
use crate::error::{ServerError, ServerResult};
use crate::mango;
use crate::query::ViewQuery;
use crate::views::ViewDefinition;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sofa_protocol::{
    BulkDocStatus, ChangeRev, ChangeRow, ChangesResponse, FindRequest, FindResponse, JsonObject,
    ViewResponse, ViewRow, ATTACHMENTS_KEY, DELETED_KEY, ID_KEY, REV_KEY,
};
use std::collections::BTreeMap;

const DESIGN_PREFIX: &str = "_design/";
const LOCAL_PREFIX: &str = "_local/";
const BOOKMARK_PREFIX: &str = "g1:";

/// Attachment content stored with the current revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// MIME type given on upload.
    pub content_type: String,
    /// Raw content.
    pub data: Vec<u8>,
    /// Generation the attachment was written at.
    pub revpos: u64,
}

impl StoredAttachment {
    /// `sha256-<hex>` digest of the content.
    pub fn digest(&self) -> String {
        format!("sha256-{}", hex::encode(Sha256::digest(&self.data)))
    }

    fn stub(&self) -> Value {
        json!({
            "content_type": self.content_type,
            "digest": self.digest(),
            "length": self.data.len(),
            "revpos": self.revpos,
            "stub": true,
        })
    }
}

#[derive(Debug, Clone)]
struct Revision {
    rev: String,
    body: JsonObject,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct DocumentEntry {
    history: Vec<Revision>,
    seq: u64,
    attachments: BTreeMap<String, StoredAttachment>,
}

impl DocumentEntry {
    fn current(&self) -> Option<&Revision> {
        self.history.last()
    }

    fn live(&self) -> Option<&Revision> {
        self.current().filter(|r| !r.deleted)
    }
}

fn generation(rev: &str) -> u64 {
    rev.split('-')
        .next()
        .and_then(|g| g.parse().ok())
        .unwrap_or(0)
}

fn new_rev(generation: u64, previous: Option<&str>, body: &JsonObject, deleted: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.unwrap_or("").as_bytes());
    hasher.update(serde_json::to_vec(body).unwrap_or_default());
    hasher.update([u8::from(deleted)]);
    let digest = hasher.finalize();
    format!("{}-{}", generation, hex::encode(&digest[..16]))
}

fn is_hidden(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// A document write after its reserved members were taken apart.
struct Write {
    rev: Option<String>,
    deleted: bool,
    attachments: Option<Value>,
    body: JsonObject,
}

impl Write {
    fn parse(mut body: JsonObject) -> ServerResult<Self> {
        body.remove(ID_KEY);
        let rev = match body.remove(REV_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(rev)) if generation(&rev) > 0 => Some(rev),
            Some(other) => {
                return Err(ServerError::BadRequest(format!("Invalid rev format: {}", other)))
            }
        };
        let deleted = matches!(body.remove(DELETED_KEY), Some(Value::Bool(true)));
        let attachments = body.remove(ATTACHMENTS_KEY);

        if let Some(key) = body.keys().find(|k| k.starts_with('_')) {
            return Err(ServerError::BadRequest(format!(
                "Bad special document member: {}",
                key
            )));
        }
        Ok(Self {
            rev,
            deleted,
            attachments,
            body,
        })
    }
}

/// One database.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    name: String,
    docs: BTreeMap<String, DocumentEntry>,
    security: JsonObject,
    indexes: Vec<Value>,
    update_seq: u64,
    purge_seq: u64,
}

impl DatabaseStore {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: BTreeMap::new(),
            security: JsonObject::new(),
            indexes: Vec::new(),
            update_seq: 0,
            purge_seq: 0,
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current update sequence.
    pub fn update_seq(&self) -> u64 {
        self.update_seq
    }

    /// `GET /{db}`.
    pub fn info(&self) -> JsonObject {
        let (live, deleted): (Vec<_>, Vec<_>) = self
            .docs
            .iter()
            .filter(|(id, _)| !is_hidden(id))
            .filter_map(|(_, entry)| entry.current())
            .partition(|rev| !rev.deleted);

        let mut info = JsonObject::new();
        info.insert("db_name".into(), json!(self.name));
        info.insert("doc_count".into(), json!(live.len()));
        info.insert("doc_del_count".into(), json!(deleted.len()));
        info.insert("update_seq".into(), json!(self.update_seq.to_string()));
        info.insert("purge_seq".into(), json!(self.purge_seq.to_string()));
        info.insert("instance_start_time".into(), json!("0"));
        info
    }

    /// The `_security` object.
    pub fn security(&self) -> &JsonObject {
        &self.security
    }

    /// Replaces the `_security` object.
    pub fn set_security(&mut self, security: JsonObject) {
        self.security = security;
    }

    /// Current revision of a live document.
    pub fn current_rev(&self, id: &str) -> Option<&str> {
        self.docs
            .get(id)
            .and_then(DocumentEntry::live)
            .map(|r| r.rev.as_str())
    }

    /// Reads a document, or one of its historical revisions.
    ///
    /// A deleted document is only visible when its tombstone revision is
    /// requested explicitly.
    pub fn get(&self, id: &str, rev: Option<&str>) -> ServerResult<JsonObject> {
        let entry = self.docs.get(id).ok_or_else(ServerError::missing)?;
        let current = entry.current().ok_or_else(ServerError::missing)?;

        let revision = match rev {
            Some(rev) => entry
                .history
                .iter()
                .find(|r| r.rev == rev)
                .ok_or_else(ServerError::missing)?,
            None if current.deleted => return Err(ServerError::deleted()),
            None => current,
        };

        let attachments = (revision.rev == current.rev).then_some(&entry.attachments);
        Ok(render(id, revision, attachments))
    }

    /// Reads the current revision of a live document.
    pub fn live_document(&self, id: &str) -> Option<JsonObject> {
        let entry = self.docs.get(id)?;
        entry
            .live()
            .map(|revision| render(id, revision, Some(&entry.attachments)))
    }

    /// Writes a document body carrying optional `_rev`, `_deleted` and
    /// `_attachments` members. Returns the new revision.
    pub fn put(&mut self, id: &str, body: JsonObject) -> ServerResult<String> {
        let write = Write::parse(body)?;
        let previous = self.check_rev(id, write.rev.as_deref())?;
        let attachments = match write.deleted {
            true => BTreeMap::new(),
            false => self.kept_attachments(id, write.attachments.as_ref())?,
        };
        Ok(self.commit(id, previous, write.body, write.deleted, attachments))
    }

    /// Deletes a live document. `rev` must be the current revision.
    pub fn delete(&mut self, id: &str, rev: Option<&str>) -> ServerResult<String> {
        let entry = self.docs.get(id).ok_or_else(ServerError::missing)?;
        let current = entry.live().ok_or_else(ServerError::deleted)?;
        if rev != Some(current.rev.as_str()) {
            return Err(ServerError::update_conflict());
        }

        let previous = Some(current.rev.clone());
        Ok(self.commit(id, previous, JsonObject::new(), true, BTreeMap::new()))
    }

    /// Writes several documents; each gets its own status row.
    pub fn bulk_docs(&mut self, docs: Vec<JsonObject>) -> Vec<BulkDocStatus> {
        docs.into_iter()
            .map(|body| {
                let id = match body.get(ID_KEY).and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => uuid::Uuid::new_v4().simple().to_string(),
                };
                match self.put(&id, body) {
                    Ok(rev) => BulkDocStatus::success(id, rev),
                    Err(err) => BulkDocStatus::failure(id, err.name(), err.reason()),
                }
            })
            .collect()
    }

    /// Copies the current revision of `source` to `destination`.
    pub fn copy(&mut self, source: &str, destination: &str) -> ServerResult<String> {
        let entry = self.docs.get(source).ok_or_else(ServerError::missing)?;
        let revision = entry.live().ok_or_else(ServerError::deleted)?;
        let body = revision.body.clone();
        let attachments = entry.attachments.clone();

        let previous = self.check_rev(destination, None)?;
        Ok(self.commit(destination, previous, body, false, attachments))
    }

    /// Reads an attachment of a live document.
    pub fn attachment(&self, id: &str, name: &str) -> ServerResult<&StoredAttachment> {
        let entry = self.docs.get(id).ok_or_else(ServerError::missing)?;
        entry.live().ok_or_else(ServerError::deleted)?;
        entry
            .attachments
            .get(name)
            .ok_or_else(|| ServerError::NotFound("Document is missing attachment".into()))
    }

    /// Adds or replaces an attachment, creating the document if needed.
    pub fn put_attachment(
        &mut self,
        id: &str,
        name: &str,
        rev: Option<&str>,
        data: Vec<u8>,
        content_type: &str,
    ) -> ServerResult<String> {
        let previous = self.check_rev(id, rev)?;
        let (body, mut attachments) = match self.docs.get(id).and_then(|e| e.live().map(|r| (r, e))) {
            Some((revision, entry)) => (revision.body.clone(), entry.attachments.clone()),
            None => (JsonObject::new(), BTreeMap::new()),
        };

        let revpos = previous.as_deref().map_or(0, generation) + 1;
        attachments.insert(
            name.to_string(),
            StoredAttachment {
                content_type: content_type.to_string(),
                data,
                revpos,
            },
        );
        Ok(self.commit(id, previous, body, false, attachments))
    }

    /// Removes an attachment from a live document.
    pub fn delete_attachment(&mut self, id: &str, name: &str, rev: Option<&str>) -> ServerResult<String> {
        self.attachment(id, name)?;
        let previous = self.check_rev(id, rev)?;
        let (body, mut attachments) = match self.docs.get(id).and_then(|e| e.live().map(|r| (r, e))) {
            Some((revision, entry)) => (revision.body.clone(), entry.attachments.clone()),
            None => return Err(ServerError::missing()),
        };
        attachments.remove(name);
        Ok(self.commit(id, previous, body, false, attachments))
    }

    /// `_all_docs`, optionally restricted to `keys`.
    pub fn all_docs(&self, query: &ViewQuery, keys: Option<Vec<Value>>) -> ViewResponse {
        let visible: Vec<(&String, &DocumentEntry, &Revision)> = self
            .docs
            .iter()
            .filter(|(id, _)| !is_hidden(id))
            .filter_map(|(id, entry)| entry.current().map(|r| (id, entry, r)))
            .collect();
        let total_rows = visible.iter().filter(|(_, _, r)| !r.deleted).count() as u64;

        let (offset, rows) = match keys {
            Some(keys) => {
                let rows = keys
                    .into_iter()
                    .map(|key| {
                        let found = key
                            .as_str()
                            .and_then(|id| visible.iter().find(|(doc_id, _, _)| doc_id.as_str() == id));
                        match found {
                            Some((id, entry, revision)) => {
                                self.all_docs_row(id, entry, revision, query.include_docs)
                            }
                            None => ViewRow {
                                id: None,
                                key,
                                value: Value::Null,
                                doc: None,
                                error: Some("not_found".into()),
                            },
                        }
                    })
                    .collect();
                (0, rows)
            }
            None => {
                let rows = visible
                    .iter()
                    .filter(|(_, _, r)| !r.deleted)
                    .map(|(id, entry, revision)| self.all_docs_row(id, entry, revision, query.include_docs))
                    .collect();
                query.select(rows)
            }
        };

        ViewResponse {
            offset: Some(offset),
            rows,
            total_rows: Some(total_rows),
            update_seq: query.update_seq.then(|| json!(self.update_seq.to_string())),
        }
    }

    fn all_docs_row(&self, id: &str, entry: &DocumentEntry, revision: &Revision, include_docs: bool) -> ViewRow {
        let mut value = json!({ "rev": revision.rev });
        let doc = if revision.deleted {
            value["deleted"] = json!(true);
            include_docs.then_some(Value::Null)
        } else {
            include_docs.then(|| Value::Object(render(id, revision, Some(&entry.attachments))))
        };
        ViewRow {
            id: Some(id.to_string()),
            key: json!(id),
            value,
            doc,
            error: None,
        }
    }

    /// Queries a view of a design document.
    pub fn view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
        keys: Option<Vec<Value>>,
    ) -> ServerResult<ViewResponse> {
        let ddoc_id = format!("{}{}", DESIGN_PREFIX, design);
        let ddoc = self
            .live_document(&ddoc_id)
            .ok_or_else(|| ServerError::NotFound("missing".into()))?;
        let definition = ddoc
            .get("views")
            .and_then(|views| views.get(view))
            .ok_or_else(|| ServerError::NotFound("missing_named_view".into()))?;
        let definition = ViewDefinition::parse(definition)?;

        let mut rows: Vec<ViewRow> = Vec::new();
        for (id, entry) in &self.docs {
            if id.starts_with(DESIGN_PREFIX) || is_hidden(id) {
                continue;
            }
            let Some(revision) = entry.live() else {
                continue;
            };
            let doc = render(id, revision, Some(&entry.attachments));
            if let Some((key, value)) = definition.emit(&doc) {
                rows.push(ViewRow {
                    id: Some(id.clone()),
                    key,
                    value,
                    doc: query.include_docs.then(|| Value::Object(doc)),
                    error: None,
                });
            }
        }
        rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));

        if let Some(keys) = keys {
            rows = keys
                .iter()
                .flat_map(|key| {
                    rows.iter()
                        .filter(move |row| collate(&row.key, key).is_eq())
                        .cloned()
                })
                .collect();
        }
        let total_rows = rows.len() as u64;

        match definition.reducer() {
            Some(reducer) if query.reduce != Some(false) => {
                let (_, selected) = ViewQuery {
                    skip: 0,
                    limit: None,
                    ..query.clone()
                }
                .select(rows);
                let reduced = if query.group {
                    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
                    for row in selected {
                        match groups.last_mut() {
                            Some((key, values)) if collate(key, &row.key).is_eq() => values.push(row.value),
                            _ => groups.push((row.key, vec![row.value])),
                        }
                    }
                    groups
                        .into_iter()
                        .map(|(key, values)| reduced_row(key, reducer.reduce(values.iter())))
                        .collect()
                } else {
                    vec![reduced_row(Value::Null, reducer.reduce(selected.iter().map(|r| &r.value)))]
                };
                Ok(ViewResponse {
                    offset: None,
                    rows: reduced,
                    total_rows: None,
                    update_seq: None,
                })
            }
            _ => {
                let (offset, rows) = query.select(rows);
                Ok(ViewResponse {
                    offset: Some(offset),
                    rows,
                    total_rows: Some(total_rows),
                    update_seq: query.update_seq.then(|| json!(self.update_seq.to_string())),
                })
            }
        }
    }

    /// `_find` with bookmark paging.
    pub fn find(&self, request: &FindRequest) -> ServerResult<FindResponse> {
        let sort = match request.extra.get("sort") {
            Some(sort) => mango::parse_sort(sort)?,
            None => Vec::new(),
        };
        let skip = request
            .extra
            .get("skip")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let limit = request.limit.unwrap_or(25) as usize;
        let start = match &request.bookmark {
            Some(bookmark) => decode_bookmark(bookmark)?,
            None => skip,
        };

        let mut matching = Vec::new();
        for (id, entry) in &self.docs {
            if id.starts_with(DESIGN_PREFIX) || is_hidden(id) {
                continue;
            }
            let Some(revision) = entry.live() else {
                continue;
            };
            let doc = render(id, revision, Some(&entry.attachments));
            if mango::matches(&request.selector, &doc)? {
                matching.push(doc);
            }
        }
        if !sort.is_empty() {
            matching.sort_by(|a, b| mango::compare_docs(&sort, a, b));
        }

        let docs: Vec<JsonObject> = matching.into_iter().skip(start).take(limit).collect();
        let bookmark = encode_bookmark(start + docs.len());
        Ok(FindResponse {
            docs,
            bookmark: Some(bookmark),
            warning: sort
                .is_empty()
                .then(|| "No matching index found, create an index to optimize query time.".into()),
        })
    }

    /// Records an index definition. Returns `(id, name, created)`.
    pub fn create_index(&mut self, definition: Value) -> ServerResult<(String, String, bool)> {
        if definition.get("index").is_none() {
            return Err(ServerError::BadRequest("Missing required key: index".into()));
        }
        let digest = hex::encode(&Sha256::digest(definition.to_string().as_bytes())[..8]);
        let name = definition
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| digest.clone());
        let id = format!("{}{}", DESIGN_PREFIX, digest);

        if self.indexes.contains(&definition) {
            return Ok((id, name, false));
        }
        self.indexes.push(definition);
        Ok((id, name, true))
    }

    /// `_changes`: the latest change of every document after `since`.
    pub fn changes(&self, since: u64, include_docs: bool, limit: Option<usize>) -> ChangesResponse {
        let mut changed: Vec<(&String, &DocumentEntry)> = self
            .docs
            .iter()
            .filter(|(id, entry)| !is_hidden(id) && entry.seq > since)
            .collect();
        changed.sort_by_key(|(_, entry)| entry.seq);

        let total = changed.len();
        let results: Vec<ChangeRow> = changed
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|(id, entry)| {
                let revision = entry.current()?;
                Some(ChangeRow {
                    seq: json!(entry.seq),
                    id: id.clone(),
                    changes: vec![ChangeRev {
                        rev: revision.rev.clone(),
                    }],
                    deleted: revision.deleted,
                    doc: include_docs.then(|| render(id, revision, Some(&entry.attachments))),
                })
            })
            .collect();

        let last_seq = results
            .last()
            .map(|row| row.seq.clone())
            .unwrap_or_else(|| json!(since));
        ChangesResponse {
            pending: Some((total - results.len()) as u64),
            results,
            last_seq,
        }
    }

    /// Removes documents whose listed revisions exist. Returns the purge report.
    pub fn purge(&mut self, revisions: BTreeMap<String, Vec<String>>) -> JsonObject {
        let mut purged = JsonObject::new();
        for (id, revs) in revisions {
            let Some(entry) = self.docs.get(&id) else {
                purged.insert(id, json!([]));
                continue;
            };
            let matched: Vec<String> = revs
                .into_iter()
                .filter(|rev| entry.history.iter().any(|r| &r.rev == rev))
                .collect();
            if !matched.is_empty() {
                self.docs.remove(&id);
            }
            purged.insert(id, json!(matched));
        }
        self.purge_seq += 1;

        let mut response = JsonObject::new();
        response.insert("purge_seq".into(), json!(self.purge_seq.to_string()));
        response.insert("purged".into(), Value::Object(purged));
        response
    }

    /// Checks `rev` against the document state. Returns the revision the
    /// write replaces.
    fn check_rev(&self, id: &str, rev: Option<&str>) -> ServerResult<Option<String>> {
        let current = self.docs.get(id).and_then(DocumentEntry::current);
        match (current, rev) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(ServerError::update_conflict()),
            (Some(current), rev) if current.deleted => match rev {
                None => Ok(Some(current.rev.clone())),
                Some(rev) if rev == current.rev => Ok(Some(current.rev.clone())),
                Some(_) => Err(ServerError::update_conflict()),
            },
            (Some(current), Some(rev)) if rev == current.rev => Ok(Some(current.rev.clone())),
            (Some(_), _) => Err(ServerError::update_conflict()),
        }
    }

    /// Attachments a write keeps: those its `_attachments` stubs name.
    fn kept_attachments(
        &self,
        id: &str,
        stubs: Option<&Value>,
    ) -> ServerResult<BTreeMap<String, StoredAttachment>> {
        let Some(stubs) = stubs else {
            return Ok(BTreeMap::new());
        };
        let stubs = stubs
            .as_object()
            .ok_or_else(|| ServerError::BadRequest("_attachments must be an object".into()))?;
        let existing = self.docs.get(id).map(|e| &e.attachments);

        let mut kept = BTreeMap::new();
        for (name, stub) in stubs {
            if stub.get("stub") != Some(&Value::Bool(true)) {
                return Err(ServerError::NotImplemented(
                    "inline attachments are not supported by the in-memory server".into(),
                ));
            }
            let attachment = existing
                .and_then(|attachments| attachments.get(name))
                .ok_or_else(|| {
                    ServerError::Internal(format!("Invalid attachment stub in {} for {}", id, name))
                })?;
            kept.insert(name.clone(), attachment.clone());
        }
        Ok(kept)
    }

    fn commit(
        &mut self,
        id: &str,
        previous: Option<String>,
        body: JsonObject,
        deleted: bool,
        attachments: BTreeMap<String, StoredAttachment>,
    ) -> String {
        let generation = previous.as_deref().map_or(0, generation) + 1;
        let rev = new_rev(generation, previous.as_deref(), &body, deleted);

        self.update_seq += 1;
        let entry = self.docs.entry(id.to_string()).or_default();
        entry.history.push(Revision {
            rev: rev.clone(),
            body,
            deleted,
        });
        entry.seq = self.update_seq;
        entry.attachments = attachments;
        rev
    }
}

fn render(id: &str, revision: &Revision, attachments: Option<&BTreeMap<String, StoredAttachment>>) -> JsonObject {
    let mut doc = JsonObject::new();
    doc.insert(ID_KEY.into(), json!(id));
    doc.insert(REV_KEY.into(), json!(revision.rev));
    if revision.deleted {
        doc.insert(DELETED_KEY.into(), json!(true));
    }
    for (key, value) in &revision.body {
        doc.insert(key.clone(), value.clone());
    }
    if let Some(attachments) = attachments.filter(|a| !a.is_empty()) {
        let stubs: JsonObject = attachments
            .iter()
            .map(|(name, attachment)| (name.clone(), attachment.stub()))
            .collect();
        doc.insert(ATTACHMENTS_KEY.into(), Value::Object(stubs));
    }
    doc
}

fn reduced_row(key: Value, value: Value) -> ViewRow {
    ViewRow {
        id: None,
        key,
        value,
        doc: None,
        error: None,
    }
}

fn encode_bookmark(offset: usize) -> String {
    hex::encode(format!("{}{}", BOOKMARK_PREFIX, offset))
}

fn decode_bookmark(bookmark: &str) -> ServerResult<usize> {
    let invalid = || ServerError::BadRequest(format!("Invalid bookmark value: {}", bookmark));
    let bytes = hex::decode(bookmark).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(BOOKMARK_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}
