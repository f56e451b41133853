//! Content fingerprints for dirty tracking.
//!
//! A fingerprint is a SHA-256 digest over a canonical walk of a JSON body:
//! object keys are visited in sorted order and every value is prefixed with
//! a type tag and a length, so two bodies get the same fingerprint exactly
//! when they are structurally equal.

use sha2::{Digest, Sha256};
use sofa_protocol::JsonObject;
use serde_json::Value;
use std::fmt;

/// Digest of a document body at the moment it was last synchronized.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of a body.
    pub fn of(body: &JsonObject) -> Self {
        let mut hasher = Sha256::new();
        write_object(&mut hasher, body);
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Returns the raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_ARRAY: u8 = 4;
const TAG_OBJECT: u8 = 5;

fn write_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([TAG_NULL]),
        Value::Bool(b) => hasher.update([TAG_BOOL, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update([TAG_NUMBER]);
            write_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update([TAG_STRING]);
            write_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update([TAG_ARRAY]);
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([TAG_OBJECT]);
            write_object(hasher, map);
        }
    }
}

// Map iteration order depends on serde_json's `preserve_order` feature, so
// keys are sorted explicitly.
fn write_object(hasher: &mut Sha256, map: &JsonObject) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    hasher.update((entries.len() as u64).to_be_bytes());
    for (key, value) in entries {
        write_str(hasher, key);
        write_value(hasher, value);
    }
}

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}
