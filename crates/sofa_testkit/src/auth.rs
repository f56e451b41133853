//! Basic authentication and per-database access checks.
//!
//! Passwords are kept as salted SHA-256 digests. A request is evaluated
//! against the server accounts first, then against the `_security` object
//! of the database it targets.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sofa_protocol::{Credentials, JsonObject};

/// A server account.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// User name.
    pub name: String,
    /// Roles of the user.
    pub roles: Vec<String>,
    salt: String,
    password_hash: String,
}

impl Account {
    /// Creates an account.
    pub fn new<I, S>(name: &str, password: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Self {
            name: name.to_string(),
            roles: roles.into_iter().map(Into::into).collect(),
            password_hash: hash_password(&salt, password),
            salt,
        }
    }

    /// True if `password` matches.
    pub fn verify(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish()
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User name; `None` for anonymous callers.
    pub name: Option<String>,
    /// Roles; server admins carry `_admin`.
    pub roles: Vec<String>,
}

impl Principal {
    /// An anonymous caller.
    pub fn anonymous() -> Self {
        Self {
            name: None,
            roles: Vec::new(),
        }
    }

    /// True for server admins.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "_admin")
    }

    fn matches(&self, section: Option<&Value>) -> bool {
        let Some(section) = section else {
            return false;
        };
        let listed = |list: &str| -> Vec<&str> {
            section
                .get(list)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default()
        };

        let name_listed = self
            .name
            .as_deref()
            .is_some_and(|name| listed("names").contains(&name));
        let role_listed = listed("roles")
            .iter()
            .any(|role| self.roles.iter().any(|r| r == role));
        name_listed || role_listed
    }
}

/// Resolves the credentials of a request.
///
/// In admin party mode everybody is an admin. Wrong credentials are
/// rejected; missing credentials yield an anonymous principal.
pub fn authenticate(config: &ServerConfig, credentials: Option<&Credentials>) -> ServerResult<Principal> {
    if !config.requires_auth() {
        return Ok(Principal {
            name: credentials.map(|c| c.user.clone()),
            roles: vec!["_admin".to_string()],
        });
    }

    let Some(credentials) = credentials else {
        return Ok(Principal::anonymous());
    };

    config
        .admins
        .iter()
        .chain(config.users.iter())
        .find(|account| account.name == credentials.user && account.verify(&credentials.password))
        .map(|account| Principal {
            name: Some(account.name.clone()),
            roles: account.roles.clone(),
        })
        .ok_or_else(|| ServerError::Unauthorized("Name or password is incorrect.".into()))
}

/// Fails unless the caller is a server admin.
pub fn require_server_admin(principal: &Principal) -> ServerResult<()> {
    if principal.is_admin() {
        return Ok(());
    }
    Err(denied(principal, "You are not a server admin."))
}

/// True for server admins and admins listed in `security`.
pub fn is_db_admin(principal: &Principal, security: &JsonObject) -> bool {
    principal.is_admin() || principal.matches(security.get("admins"))
}

/// Fails unless the caller administers the database.
pub fn require_db_admin(principal: &Principal, security: &JsonObject) -> ServerResult<()> {
    if is_db_admin(principal, security) {
        return Ok(());
    }
    Err(denied(principal, "You are not a db or server admin."))
}

/// Fails unless the caller may read and write documents of the database.
///
/// A database without members is public.
pub fn require_member(principal: &Principal, security: &JsonObject) -> ServerResult<()> {
    if is_db_admin(principal, security) {
        return Ok(());
    }

    let members = security.get("members");
    let restricted = members.is_some_and(|section| {
        ["names", "roles"].iter().any(|list| {
            section
                .get(*list)
                .and_then(Value::as_array)
                .is_some_and(|items| !items.is_empty())
        })
    });

    if !restricted || principal.matches(members) {
        return Ok(());
    }
    Err(denied(
        principal,
        "You are not allowed to access this db.",
    ))
}

fn denied(principal: &Principal, reason: &str) -> ServerError {
    match principal.name {
        Some(_) => ServerError::Forbidden(reason.into()),
        None => ServerError::Unauthorized(reason.into()),
    }
}
