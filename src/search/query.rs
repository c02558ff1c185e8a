//! Boolean query combination.
//!
//! Filters are partitioned by a leading marker on the parameter key and
//! folded into one immutable query tree. The combination order is fixed:
//! the AND partition establishes the base result set, the OR partition
//! widens it, the NOT partition narrows it. OR-widening followed by
//! NOT-narrowing can re-admit then exclude the same documents; that is the
//! documented behavior of this API, not an accident of evaluation order.

use std::collections::BTreeMap;

use crate::search::filter::ParsedFilter;

/// Keys consumed by pagination/format/sort control, stripped before filter
/// parsing.
pub const RESERVED_KEYS: &[&str] = &["format", "limit", "offset", "order_by"];

/// Marker prefixes selecting the OR and NOT partitions.
pub const OR_MARKER: char = '|';
pub const NOT_MARKER: char = '~';

/// Remove reserved control keys, returning the remaining filter map and the
/// sort expression if one was supplied.
pub fn strip_reserved(
    params: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, Option<String>) {
    let order_by = params.get("order_by").cloned();
    let filters = params
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (filters, order_by)
}

#[derive(Debug, Clone, Default)]
pub struct Partitions {
    pub and: BTreeMap<String, String>,
    pub or: BTreeMap<String, String>,
    pub not: BTreeMap<String, String>,
}

impl Partitions {
    /// The stemming language applies only to the AND partition, taken from
    /// its own `lang` filter when present.
    pub fn stem_lang(&self) -> &str {
        self.and.get("lang").map_or("", String::as_str)
    }
}

/// Partition filters by leading marker: none → AND, `|` → OR, `~` → NOT.
pub fn partition(filters: &BTreeMap<String, String>) -> Partitions {
    let mut parts = Partitions::default();

    for (key, value) in filters {
        if let Some(rest) = key.strip_prefix(OR_MARKER) {
            parts.or.insert(rest.to_string(), value.clone());
        } else if let Some(rest) = key.strip_prefix(NOT_MARKER) {
            parts.not.insert(rest.to_string(), value.clone());
        } else {
            parts.and.insert(key.clone(), value.clone());
        }
    }

    parts
}

/// Immutable boolean query tree submitted to the index engine.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// The full index; base case when no filters are supplied.
    All,
    Leaf(ParsedFilter),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

/// Fold the three parsed partitions into one tree:
/// `(((All ∩ AND…) ∪ OR…) ∩ ¬NOT…)`.
pub fn combine(
    and: Vec<ParsedFilter>,
    or: Vec<ParsedFilter>,
    not: Vec<ParsedFilter>,
) -> QueryNode {
    let mut root = QueryNode::All;

    if !and.is_empty() {
        let mut children = vec![root];
        children.extend(and.into_iter().map(QueryNode::Leaf));
        root = QueryNode::And(children);
    }

    if !or.is_empty() {
        let mut children = vec![root];
        children.extend(or.into_iter().map(QueryNode::Leaf));
        root = QueryNode::Or(children);
    }

    if !not.is_empty() {
        let mut children = vec![root];
        children.extend(
            not.into_iter()
                .map(|f| QueryNode::Not(Box::new(QueryNode::Leaf(f)))),
        );
        root = QueryNode::And(children);
    }

    root
}
