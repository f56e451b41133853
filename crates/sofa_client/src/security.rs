//! Per-database security object.

use crate::database::Database;
use crate::document::{json_type_name, Document, DocumentKind, SECURITY_ID};
use crate::error::{ClientError, ClientResult};
use serde_json::Value;
use sofa_protocol::{JsonObject, WriteResponse};
use std::ops::{Deref, DerefMut};

const MEMBERS: &str = "members";
const ADMINS: &str = "admins";
const NAMES: &str = "names";
const ROLES: &str = "roles";

/// The `_security` object of a database.
///
/// Shaped as `{"members": {"names": [], "roles": []}, "admins": {...}}`.
/// It has no `_id` and the server assigns no revision, but dirty tracking
/// works as for any other [`Document`].
#[derive(Debug, Clone)]
pub struct SecurityDocument {
    document: Document,
}

impl SecurityDocument {
    /// Creates an empty, unfetched security object for `database`.
    pub fn new(database: &Database) -> Self {
        Self {
            document: Document::with_kind(
                database,
                SECURITY_ID,
                DocumentKind::Security,
                JsonObject::new(),
            ),
        }
    }

    /// Retrieves the security object from the server.
    pub async fn fetch(&mut self, discard_changes: bool) -> ClientResult<()> {
        self.document.fetch(discard_changes, None).await
    }

    /// Writes the security object if it changed.
    ///
    /// A server refusing the write because the caller is not an admin
    /// surfaces as [`ClientError::Forbidden`].
    pub async fn save(&mut self) -> ClientResult<Option<WriteResponse>> {
        self.document.save().await
    }

    /// Member user names, if the section exists.
    pub fn members(&self) -> Option<Vec<String>> {
        self.entries(MEMBERS, NAMES)
    }

    /// Member roles, if the section exists.
    pub fn member_roles(&self) -> Option<Vec<String>> {
        self.entries(MEMBERS, ROLES)
    }

    /// Admin user names, if the section exists.
    pub fn admins(&self) -> Option<Vec<String>> {
        self.entries(ADMINS, NAMES)
    }

    /// Admin roles, if the section exists.
    pub fn admin_roles(&self) -> Option<Vec<String>> {
        self.entries(ADMINS, ROLES)
    }

    /// Adds a member. Adding an existing member changes nothing.
    pub fn add_member(&mut self, name: &str) -> ClientResult<()> {
        self.add_entry(MEMBERS, NAMES, name)
    }

    /// Adds a member role.
    pub fn add_member_role(&mut self, role: &str) -> ClientResult<()> {
        self.add_entry(MEMBERS, ROLES, role)
    }

    /// Adds an admin.
    pub fn add_admin(&mut self, name: &str) -> ClientResult<()> {
        self.add_entry(ADMINS, NAMES, name)
    }

    /// Adds an admin role.
    pub fn add_admin_role(&mut self, role: &str) -> ClientResult<()> {
        self.add_entry(ADMINS, ROLES, role)
    }

    /// Removes a member; fails with [`ClientError::NotFound`] if absent.
    pub fn remove_member(&mut self, name: &str) -> ClientResult<()> {
        if self.remove_entry(MEMBERS, NAMES, name) {
            return Ok(());
        }
        Err(ClientError::NotFound(format!(
            "The user '{}' isn't a member of the database '{}'",
            name,
            self.database().id()
        )))
    }

    /// Removes a member role; fails with [`ClientError::NotFound`] if absent.
    pub fn remove_member_role(&mut self, role: &str) -> ClientResult<()> {
        if self.remove_entry(MEMBERS, ROLES, role) {
            return Ok(());
        }
        Err(ClientError::NotFound(format!(
            "The role '{}' isn't a member role of the database '{}'",
            role,
            self.database().id()
        )))
    }

    /// Removes an admin; fails with [`ClientError::NotFound`] if absent.
    pub fn remove_admin(&mut self, name: &str) -> ClientResult<()> {
        if self.remove_entry(ADMINS, NAMES, name) {
            return Ok(());
        }
        Err(ClientError::NotFound(format!(
            "The user '{}' isn't an admin of the database '{}'",
            name,
            self.database().id()
        )))
    }

    /// Removes an admin role; fails with [`ClientError::NotFound`] if absent.
    pub fn remove_admin_role(&mut self, role: &str) -> ClientResult<()> {
        if self.remove_entry(ADMINS, ROLES, role) {
            return Ok(());
        }
        Err(ClientError::NotFound(format!(
            "The role '{}' isn't an admin role of the database '{}'",
            role,
            self.database().id()
        )))
    }

    /// Unwraps the underlying document.
    pub fn into_document(self) -> Document {
        self.document
    }

    fn entries(&self, section: &str, list: &str) -> Option<Vec<String>> {
        let items = self.document.get(section)?.get(list)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        )
    }

    fn add_entry(&mut self, section: &str, list: &str, entry: &str) -> ClientResult<()> {
        let section_map = match self
            .document
            .setdefault(section, Value::Object(JsonObject::new()))
        {
            Value::Object(map) => map,
            other => {
                return Err(ClientError::InvalidType(format!(
                    "security section '{}' is {}, expected an object",
                    section,
                    json_type_name(other)
                )))
            }
        };

        let items = match section_map
            .entry(list.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items,
            other => {
                return Err(ClientError::InvalidType(format!(
                    "security list '{}.{}' is {}, expected an array",
                    section,
                    list,
                    json_type_name(other)
                )))
            }
        };

        if !items.iter().any(|item| item.as_str() == Some(entry)) {
            items.push(Value::String(entry.to_string()));
        }
        Ok(())
    }

    fn remove_entry(&mut self, section: &str, list: &str, entry: &str) -> bool {
        let Some(items) = self
            .document
            .get_mut(section)
            .and_then(|s| s.get_mut(list))
            .and_then(Value::as_array_mut)
        else {
            return false;
        };

        match items.iter().position(|item| item.as_str() == Some(entry)) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }
}

impl Deref for SecurityDocument {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.document
    }
}

impl DerefMut for SecurityDocument {
    fn deref_mut(&mut self) -> &mut Document {
        &mut self.document
    }
}
