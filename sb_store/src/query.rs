//! Attribute predicates evaluated against stored documents.

use serde_json::{Map, Value};

/// Conjunction of per-field conditions matched against a document.
///
/// Each condition names a top-level field and an expected value. A document
/// matches when every condition holds: the stored value equals the expected
/// one, or the stored value is an array containing it. An empty query
/// matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Map<String, Value>,
}

impl Query {
    /// Query with no conditions; matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value` (or, for array fields, contain it).
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// True when no conditions have been added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate this query against a document's top-level fields.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            match doc.get(field) {
                Some(stored) if stored == expected => true,
                // Array membership: querying a scalar against a list field
                Some(Value::Array(items)) => items.contains(expected),
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn empty_query_matches_any_document() {
        let doc = fields(json!({ "id": "a" }));
        assert!(Query::new().matches(&doc));
    }

    #[test]
    fn equality_on_multiple_fields() {
        let doc = fields(json!({ "id": "a", "environment": "prod", "latest": true }));
        let query = Query::new().eq("id", "a").eq("environment", "prod");
        assert!(query.matches(&doc));
        assert!(Query::new().eq("latest", true).matches(&doc));
        assert!(!Query::new().eq("id", "a").eq("environment", "dev").matches(&doc));
    }

    #[test]
    fn missing_field_never_matches() {
        let doc = fields(json!({ "id": "a" }));
        assert!(!Query::new().eq("name", "a").matches(&doc));
    }

    #[test]
    fn array_field_matches_by_membership() {
        let doc = fields(json!({ "id": "a", "tags": ["web", "batch"] }));
        assert!(Query::new().eq("tags", "web").matches(&doc));
        assert!(!Query::new().eq("tags", "cron").matches(&doc));
        // Full-array equality still matches
        assert!(Query::new().eq("tags", json!(["web", "batch"])).matches(&doc));
    }
}
