//! The synchronised document and the classification of its keys.
//!
//! A document is a flat JSON object. Keys shaped like `20YY-MM-DD` hold
//! one day's task record; every other key is a settings record. A
//! [`MergePolicy`] names the settings object and the credential field that
//! clients are never allowed to overwrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default name of the composite settings object.
pub const DEFAULT_SETTINGS_KEY: &str = "system_settings";

/// Default name of the protected sync credential.
pub const DEFAULT_CREDENTIAL_FIELD: &str = "syncPassword";

/// The single shared document, keyed by string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of day records held by the document.
    pub fn date_record_count(&self) -> usize {
        self.0.keys().filter(|k| is_date_key(k)).count()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.0)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Structural check for a day key: ten characters, `2` and a digit up
/// front, dashes at positions 4 and 7. Calendar validity is not checked.
pub fn is_date_key(key: &str) -> bool {
    let b = key.as_bytes();
    b.len() == 10 && b[0] == b'2' && b[1].is_ascii_digit() && b[4] == b'-' && b[7] == b'-'
}

/// A document key, classified once before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKey<'a> {
    /// A day's task record.
    Date(&'a str),
    /// The top-level protected credential.
    Credential,
    /// The settings object carrying the protected credential sub-field.
    ProtectedSettings,
    /// Any other settings record.
    Settings(&'a str),
}

/// Names of the records that receive special treatment during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    pub settings_key: String,
    pub credential_field: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            settings_key: DEFAULT_SETTINGS_KEY.to_string(),
            credential_field: DEFAULT_CREDENTIAL_FIELD.to_string(),
        }
    }
}

impl MergePolicy {
    pub fn new(settings_key: impl Into<String>, credential_field: impl Into<String>) -> Self {
        Self {
            settings_key: settings_key.into(),
            credential_field: credential_field.into(),
        }
    }

    /// Classify a key. The date shape is checked first.
    pub fn classify<'a>(&self, key: &'a str) -> RecordKey<'a> {
        if is_date_key(key) {
            RecordKey::Date(key)
        } else if key == self.credential_field {
            RecordKey::Credential
        } else if key == self.settings_key {
            RecordKey::ProtectedSettings
        } else {
            RecordKey::Settings(key)
        }
    }

    /// The credential held by `doc`, looked up in the settings object first
    /// and then at the top level.
    pub fn credential_in<'d>(&self, doc: &'d Document) -> Option<&'d str> {
        doc.get(&self.settings_key)
            .and_then(|settings| settings.get(&self.credential_field))
            .and_then(Value::as_str)
            .or_else(|| doc.get(&self.credential_field).and_then(Value::as_str))
    }
}

/// Read-only view of a day record. Missing or mistyped fields take their
/// defaults: unsubmitted, empty submit time, no questions.
#[derive(Debug, Clone, Copy)]
pub struct DateRecord<'a> {
    value: &'a Value,
}

impl<'a> DateRecord<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn submitted(&self) -> bool {
        self.value
            .get("submitted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// ISO-8601 submit time; compared as a plain string.
    pub fn submit_time(&self) -> &'a str {
        self.value
            .get("submitTime")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn has_questions(&self) -> bool {
        self.value
            .get("questions")
            .and_then(Value::as_array)
            .is_some_and(|q| !q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_key_shape() {
        assert!(is_date_key("2024-01-01"));
        assert!(is_date_key("2099-13-45"));
        // Only the shape matters.
        assert!(is_date_key("21xx-yy-zz"));
        assert!(!is_date_key("1999-01-01"));
        assert!(!is_date_key("2024-1-01"));
        assert!(!is_date_key("2024/01/01"));
        assert!(!is_date_key("system_settings"));
        assert!(!is_date_key("Mon Jan 01 2024"));
        assert!(!is_date_key(""));
    }

    #[test]
    fn test_classify() {
        let policy = MergePolicy::default();
        assert_eq!(policy.classify("2024-03-09"), RecordKey::Date("2024-03-09"));
        assert_eq!(policy.classify("syncPassword"), RecordKey::Credential);
        assert_eq!(policy.classify("system_settings"), RecordKey::ProtectedSettings);
        assert_eq!(policy.classify("theme"), RecordKey::Settings("theme"));

        let custom = MergePolicy::new("settings", "credential");
        assert_eq!(custom.classify("settings"), RecordKey::ProtectedSettings);
        assert_eq!(custom.classify("system_settings"), RecordKey::Settings("system_settings"));
    }

    #[test]
    fn test_date_record_defaults() {
        let empty = json!({});
        let record = DateRecord::new(&empty);
        assert!(!record.submitted());
        assert_eq!(record.submit_time(), "");
        assert!(!record.has_questions());

        let not_an_object = json!("garbage");
        assert!(!DateRecord::new(&not_an_object).submitted());

        let full = json!({
            "submitted": true,
            "submitTime": "2024-01-01T10:00:00",
            "questions": [{"q": 1}],
        });
        let record = DateRecord::new(&full);
        assert!(record.submitted());
        assert_eq!(record.submit_time(), "2024-01-01T10:00:00");
        assert!(record.has_questions());
    }

    #[test]
    fn test_credential_lookup() {
        let policy = MergePolicy::default();
        let nested: Document =
            serde_json::from_value(json!({"system_settings": {"syncPassword": "abc"}})).unwrap();
        assert_eq!(policy.credential_in(&nested), Some("abc"));

        let top: Document = serde_json::from_value(json!({"syncPassword": "top"})).unwrap();
        assert_eq!(policy.credential_in(&top), Some("top"));

        assert_eq!(policy.credential_in(&Document::new()), None);
    }

    #[test]
    fn test_document_from_value() {
        assert!(Document::from_value(json!([1, 2])).is_none());
        let doc = Document::from_value(json!({"2024-01-01": {}, "theme": "dark"})).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.date_record_count(), 1);
    }
}
