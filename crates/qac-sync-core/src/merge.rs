//! Two-party merge of the server document with a client snapshot.
//!
//! The merge walks the client's keys over a copy of the server document:
//!
//! - Day records are resolved by [`resolve_date_record`]: submitted beats
//!   unsubmitted, then the later `submitTime` wins, and between two drafts
//!   the client wins unless only the server draft has questions.
//! - The top-level credential is never taken from the client.
//! - The settings object is merged field by field; its credential field is
//!   taken from the client only while the server has none.
//! - Any other key is last-writer-wins: the client's value replaces the
//!   server's.
//!
//! Keys only the server holds pass through untouched.

use serde_json::{Map, Value};

use crate::document::{DateRecord, Document, MergePolicy, RecordKey};

/// Which side a conflict resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Server,
    Client,
}

/// Output of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub document: Document,
    /// Keys whose merged value differs from the server's.
    pub changed_keys: Vec<String>,
}

impl MergeResult {
    /// Whether the merged document differs from the server document.
    pub fn changed(&self) -> bool {
        !self.changed_keys.is_empty()
    }
}

/// Merge `client` into `server`.
pub fn merge(server: &Document, client: &Document, policy: &MergePolicy) -> MergeResult {
    let mut merged = server.clone();

    for (key, client_value) in client.iter() {
        match policy.classify(key) {
            RecordKey::Date(_) => {
                let take_client = match server.get(key) {
                    None => true,
                    Some(server_value) => {
                        resolve_date_record(server_value, client_value) == Winner::Client
                    }
                };
                if take_client {
                    merged.insert(key.clone(), client_value.clone());
                }
            }
            RecordKey::Credential => {}
            RecordKey::ProtectedSettings => {
                let value = merge_settings(
                    server.get(key),
                    client_value,
                    &policy.credential_field,
                );
                merged.insert(key.clone(), value);
            }
            RecordKey::Settings(_) => {
                merged.insert(key.clone(), client_value.clone());
            }
        }
    }

    let changed_keys = client
        .keys()
        .filter(|key| merged.get(key) != server.get(key))
        .cloned()
        .collect();

    MergeResult {
        document: merged,
        changed_keys,
    }
}

/// Decide between two versions of the same day record.
///
/// Ties on submitted records keep the server's copy.
pub fn resolve_date_record(server: &Value, client: &Value) -> Winner {
    let server = DateRecord::new(server);
    let client = DateRecord::new(client);

    match (server.submitted(), client.submitted()) {
        (false, true) => Winner::Client,
        (true, false) => Winner::Server,
        (true, true) => {
            if client.submit_time() > server.submit_time() {
                Winner::Client
            } else {
                Winner::Server
            }
        }
        (false, false) => resolve_drafts(server, client),
    }
}

/// Tie-break between two unsubmitted drafts: the client's draft is
/// considered fresher unless it has no questions and the server's does.
pub fn resolve_drafts(server: DateRecord<'_>, client: DateRecord<'_>) -> Winner {
    if server.has_questions() && !client.has_questions() {
        Winner::Server
    } else {
        Winner::Client
    }
}

/// Overlay the client's settings fields on the server's, keeping the
/// server's credential field once it has one.
fn merge_settings(server: Option<&Value>, client: &Value, credential_field: &str) -> Value {
    let Some(client_fields) = client.as_object() else {
        // A non-object never replaces a settings object.
        return match server {
            Some(existing) if existing.is_object() => existing.clone(),
            _ => client.clone(),
        };
    };

    let mut merged: Map<String, Value> = server
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let server_has_credential = merged.contains_key(credential_field);

    for (name, value) in client_fields {
        if name == credential_field && server_has_credential {
            continue;
        }
        merged.insert(name.clone(), value.clone());
    }

    Value::Object(merged)
}
