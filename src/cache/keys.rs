//! Query key registry.
//!
//! Every cached resource is addressed by an ordered tuple of segments, e.g.
//! `["stampHistory", "list", {"month": 4, "year": 2024}]`. Filter objects are
//! compared by value (serde_json objects are sorted maps, so field order never
//! matters), and invalidating a family root reaches every key nested under it.

use serde::Serialize;
use serde_json::Value;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Segment {
    Text(String),
    Params(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryKey {
    segments: Vec<Segment>,
}

// Segments only ever hold JSON produced by the registry constructors below,
// so equality is total (no NaN floats).
impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl QueryKey {
    pub fn root(resource: &str) -> Self {
        Self {
            segments: vec![Segment::Text(resource.to_string())],
        }
    }

    pub fn text(mut self, segment: &str) -> Self {
        self.segments.push(Segment::Text(segment.to_string()));
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.segments.push(Segment::Params(params));
        self
    }

    /// True when `prefix` is a leading subsequence of this key; the basis for
    /// family-wide invalidation.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Stable textual form; equal keys always render identically.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.segments).unwrap_or_default()
    }
}

pub fn session() -> QueryKey {
    QueryKey::root("session")
}

pub fn stamps_root() -> QueryKey {
    QueryKey::root("stampHistory")
}

pub fn stamp_history(year: i32, month: u32) -> QueryKey {
    stamps_root()
        .text("list")
        .params(serde_json::json!({ "month": month, "year": year }))
}

pub fn employees_root() -> QueryKey {
    QueryKey::root("employees")
}

pub fn employees(filter: Value) -> QueryKey {
    employees_root().text("list").params(filter)
}

pub fn employee(id: i64) -> QueryKey {
    employees_root()
        .text("detail")
        .params(serde_json::json!({ "id": id }))
}

pub fn requests_root() -> QueryKey {
    QueryKey::root("requests")
}

pub fn requests(status: &str) -> QueryKey {
    requests_root()
        .text("list")
        .params(serde_json::json!({ "status": status }))
}

pub fn request(id: i64) -> QueryKey {
    requests_root()
        .text("detail")
        .params(serde_json::json!({ "id": id }))
}

pub fn news_root() -> QueryKey {
    QueryKey::root("news")
}

pub fn news_list() -> QueryKey {
    news_root().text("list")
}

pub fn dashboard() -> QueryKey {
    QueryKey::root("dashboard")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_filter_produces_equal_keys() {
        // Field order differs at the construction site; the keys must not.
        let a = employees(json!({ "department": "sales", "active": true }));
        let b = employees(json!({ "active": true, "department": "sales" }));
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_different_filters_produce_different_keys() {
        let a = stamp_history(2024, 4);
        let b = stamp_history(2024, 5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_family_root_prefixes_nested_keys() {
        let root = stamps_root();
        assert!(stamp_history(2024, 4).starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!news_list().starts_with(&root));
    }

    #[test]
    fn test_detail_key_not_prefixed_by_list_key() {
        let list = requests("pending");
        assert!(!request(7).starts_with(&list));
        assert!(request(7).starts_with(&requests_root()));
    }
}
