//! Cursor pagination shared by both access paths.
//!
//! The direct-record path pages by keyset: `offset` names the first id to
//! return and `next` is the id of the last returned record, so paging stays
//! stable when rows are inserted or deleted below the cursor. The search
//! path pages positionally against the index's own result ordering. The two
//! disciplines are deliberately distinct.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::document::SearchDocument;
use crate::error::{ApiError, Result};

/// Page size applied when the request does not name one.
pub const DEFAULT_LIMIT: u64 = 20;

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub limit: u64,
    pub offset: u64,
}

impl PageRequest {
    /// Read `limit`/`offset` from the raw parameter map, clamping the limit
    /// to the resource's ceiling. `limit=0` requests everything from
    /// `offset` onward.
    pub fn from_params(params: &BTreeMap<String, String>, max_limit: u64) -> Result<Self> {
        let limit = match params.get("limit") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ApiError::InvalidFilter(format!("'{raw}' is not a valid limit."))
            })?,
            None => DEFAULT_LIMIT,
        };
        let offset = match params.get("offset") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ApiError::InvalidFilter(format!("'{raw}' is not a valid offset."))
            })?,
            None => 0,
        };

        let limit = if limit == 0 { 0 } else { limit.min(max_limit) };
        Ok(Self { limit, offset })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub offset: u64,
    pub limit: u64,
    /// Approximate on the direct path (planner estimate, not a full count).
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<JsonValue>,
    pub meta: PageMeta,
}

impl Page {
    pub fn envelope(&self, collection_key: &str) -> Result<JsonValue> {
        let mut map = serde_json::Map::new();
        map.insert(collection_key.to_string(), JsonValue::Array(self.items.clone()));
        map.insert("meta".to_string(), serde_json::to_value(&self.meta)?);
        Ok(JsonValue::Object(map))
    }
}

/// Wrap an id-ordered slice already fetched with `id >= offset`.
///
/// `next` is the id of the last item on the page; requesting that offset
/// repeats the boundary record once, which keeps forward paging stable under
/// concurrent writes.
pub fn keyset_page(items: Vec<JsonValue>, req: PageRequest, total_count: u64) -> Page {
    let next = if req.limit > 0 {
        items
            .last()
            .and_then(|item| item.get("id"))
            .and_then(JsonValue::as_u64)
    } else {
        None
    };

    Page {
        items,
        meta: PageMeta {
            offset: req.offset,
            limit: req.limit,
            total_count,
            next,
        },
    }
}

/// Positional offset/limit over an already-ordered search result set.
pub fn slice_page(docs: &[SearchDocument], req: PageRequest) -> Page {
    let total = docs.len() as u64;
    let start = req.offset.min(total) as usize;
    let end = if req.limit == 0 {
        docs.len()
    } else {
        (req.offset.saturating_add(req.limit)).min(total) as usize
    };

    let items = docs[start..end].iter().map(SearchDocument::to_json).collect();
    let next = if req.limit > 0 && (end as u64) < total {
        Some(end as u64)
    } else {
        None
    };

    Page {
        items,
        meta: PageMeta {
            offset: req.offset,
            limit: req.limit,
            total_count: total,
            next,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FieldValue, SearchDocument};
    use crate::resource::EntityKind;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn docs(ids: &[u64]) -> Vec<SearchDocument> {
        ids.iter()
            .map(|id| {
                let mut d = SearchDocument::new(EntityKind::Sentence, *id);
                d.set("lang", FieldValue::Text("eng".into()));
                d
            })
            .collect()
    }

    #[test]
    fn test_page_request_defaults() {
        let req = PageRequest::from_params(&params(&[]), 100).unwrap();
        assert_eq!(req.limit, DEFAULT_LIMIT);
        assert_eq!(req.offset, 0);
    }

    #[test]
    fn test_page_request_clamps_to_ceiling() {
        let req = PageRequest::from_params(&params(&[("limit", "5000")]), 100).unwrap();
        assert_eq!(req.limit, 100);
    }

    #[test]
    fn test_page_request_zero_is_unlimited() {
        let req = PageRequest::from_params(&params(&[("limit", "0")]), 100).unwrap();
        assert_eq!(req.limit, 0);
    }

    #[test]
    fn test_page_request_rejects_garbage() {
        assert!(PageRequest::from_params(&params(&[("limit", "many")]), 100).is_err());
        assert!(PageRequest::from_params(&params(&[("offset", "-3")]), 100).is_err());
    }

    #[test]
    fn test_keyset_next_is_last_id() {
        let items = vec![
            serde_json::json!({"id": 4}),
            serde_json::json!({"id": 9}),
        ];
        let page = keyset_page(items, PageRequest { limit: 2, offset: 3 }, 50);
        assert_eq!(page.meta.next, Some(9));
        assert_eq!(page.meta.total_count, 50);
    }

    #[test]
    fn test_keyset_unlimited_has_no_next() {
        let items = vec![serde_json::json!({"id": 4})];
        let page = keyset_page(items, PageRequest { limit: 0, offset: 0 }, 1);
        assert_eq!(page.meta.next, None);
    }

    #[test]
    fn test_keyset_empty_page_has_no_next() {
        let page = keyset_page(Vec::new(), PageRequest { limit: 5, offset: 99 }, 10);
        assert_eq!(page.meta.next, None);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_slice_page_window_and_next() {
        let all = docs(&[1, 2, 3, 4, 5]);
        let page = slice_page(&all, PageRequest { limit: 2, offset: 1 });
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]["id"], 2);
        assert_eq!(page.meta.next, Some(3));
        assert_eq!(page.meta.total_count, 5);
    }

    #[test]
    fn test_slice_page_last_window_no_next() {
        let all = docs(&[1, 2, 3]);
        let page = slice_page(&all, PageRequest { limit: 5, offset: 1 });
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.meta.next, None);
    }

    #[test]
    fn test_slice_page_unlimited() {
        let all = docs(&[1, 2, 3]);
        let page = slice_page(&all, PageRequest { limit: 0, offset: 1 });
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.meta.next, None);
    }

    #[test]
    fn test_envelope_shape() {
        let all = docs(&[1]);
        let page = slice_page(&all, PageRequest { limit: 1, offset: 0 });
        let env = page.envelope("sentences").unwrap();
        assert!(env["sentences"].is_array());
        assert_eq!(env["meta"]["limit"], 1);
        assert!(env["meta"].get("next").is_none());
    }
}
