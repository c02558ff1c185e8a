//! Flat, denormalized search documents.
//!
//! A document is a mapping from field name to typed value plus the source
//! row's primary key. Relationships are flattened into scalar or
//! string-joined fields at build time; documents never reference each other.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::{ApiError, Result};
use crate::resource::EntityKind;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Integer(n) => JsonValue::from(*n),
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Date(dt) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Integer(_) => 0,
            Self::Text(_) => 1,
            Self::Bool(_) => 2,
            Self::Date(_) => 3,
        }
    }
}

/// Total order over optional field values, for sorting result sets.
/// Documents missing the sort field order after documents that have it.
pub fn sort_key_cmp(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x, y) {
            (FieldValue::Text(l), FieldValue::Text(r)) => l.cmp(r),
            (FieldValue::Integer(l), FieldValue::Integer(r)) => l.cmp(r),
            (FieldValue::Bool(l), FieldValue::Bool(r)) => l.cmp(r),
            (FieldValue::Date(l), FieldValue::Date(r)) => l.cmp(r),
            _ => x.rank().cmp(&y.rank()),
        },
    }
}

#[derive(Debug, Clone)]
pub struct SearchDocument {
    pub id: u64,
    pub kind: EntityKind,
    pub fields: BTreeMap<String, FieldValue>,
}

impl SearchDocument {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self {
            kind,
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Serialize for the response envelope. The free-text `text` body is
    /// index-only and never leaves the service.
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), JsonValue::from(self.id));
        for (name, value) in &self.fields {
            if name == "text" {
                continue;
            }
            map.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }
}

/// Parse the datetime shapes accepted in filters and stored in the primary
/// store: RFC 3339, `YYYY-MM-DD HH:MM:SS`, or a bare date.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(start) = date.and_hms_opt(0, 0, 0) {
            return Ok(start.and_utc());
        }
    }
    Err(ApiError::InvalidFilter(format!(
        "'{raw}' is not a recognized datetime value."
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_skips_text_body() {
        let mut doc = SearchDocument::new(EntityKind::Sentence, 7);
        doc.set("text", FieldValue::Text("hidden body".into()));
        doc.set("lang", FieldValue::Text("eng".into()));
        let json = doc.to_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["lang"], "eng");
        assert!(json.get("text").is_none());
    }

    #[test]
    fn test_date_json_format() {
        let dt = parse_datetime("2010-06-15 12:30:00").unwrap();
        assert_eq!(
            FieldValue::Date(dt).to_json(),
            JsonValue::String("2010-06-15T12:30:00Z".into())
        );
    }

    #[test]
    fn test_parse_datetime_shapes() {
        assert!(parse_datetime("2010-06-15T12:30:00Z").is_ok());
        assert!(parse_datetime("2010-06-15 12:30:00").is_ok());
        assert!(parse_datetime("2010-06-15").is_ok());
        assert!(matches!(
            parse_datetime("yesterday"),
            Err(ApiError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_sort_key_cmp_missing_sorts_last() {
        let v = FieldValue::Integer(1);
        assert_eq!(sort_key_cmp(Some(&v), None), Ordering::Less);
        assert_eq!(sort_key_cmp(None, Some(&v)), Ordering::Greater);
        assert_eq!(sort_key_cmp(None, None), Ordering::Equal);
    }

    #[test]
    fn test_sort_key_cmp_same_kind() {
        let a = FieldValue::Text("abc".into());
        let b = FieldValue::Text("abd".into());
        assert_eq!(sort_key_cmp(Some(&a), Some(&b)), Ordering::Less);
    }
}
