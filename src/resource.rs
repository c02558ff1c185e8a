//! Static resource definitions.
//!
//! Each exposed collection is declared here as an explicit table: its fields
//! and their kinds, the excluded fields, the stemmable and auto-query sets,
//! the sortable set, and the page-size ceiling. Filter whitelists are derived
//! from these tables at startup; nothing is discovered at request time.

use std::collections::BTreeMap;

use crate::error::{ApiError, Result};

/// Filter operators accepted in `field__operator` query keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Contains,
    Exact,
    In,
    Startswith,
    Lt,
    Lte,
    Gt,
    Gte,
    Range,
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        let op = match s {
            "contains" => Self::Contains,
            "exact" => Self::Exact,
            "in" => Self::In,
            "startswith" => Self::Startswith,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "range" => Self::Range,
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "minute" => Self::Minute,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Exact => "exact",
            Self::In => "in",
            Self::Startswith => "startswith",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Range => "range",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator class for plain text columns on the direct path.
pub const TEXT_OPS: &[Operator] = &[Operator::Exact, Operator::In];

/// Operator class for numeric columns.
pub const NUMBER_OPS: &[Operator] = &[
    Operator::Exact,
    Operator::In,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Range,
];

/// Operator class for date columns: numeric class plus calendar components.
pub const DATE_OPS: &[Operator] = &[
    Operator::Exact,
    Operator::In,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Range,
    Operator::Year,
    Operator::Month,
    Operator::Day,
    Operator::Hour,
    Operator::Minute,
];

/// Operator class for boolean columns.
pub const BOOL_OPS: &[Operator] = &[Operator::Exact];

/// Operator class applied to every filterable field of a search resource.
pub const SEARCH_OPS: &[Operator] = &[
    Operator::Contains,
    Operator::Range,
    Operator::In,
    Operator::Exact,
    Operator::Startswith,
    Operator::Gt,
    Operator::Gte,
    Operator::Lt,
    Operator::Lte,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub stemmable: bool,
    pub autoquery: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            stemmable: false,
            autoquery: false,
        }
    }

    pub const fn autoquery(mut self) -> Self {
        self.autoquery = true;
        self
    }

    pub const fn stemmable(mut self) -> Self {
        self.stemmable = true;
        self
    }
}

/// Entity kinds materialized by the document builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Sentence,
    Tag,
    List,
    Comment,
    Wall,
    User,
}

/// Which backend serves a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// Direct-record path against a primary-store table.
    Store { table: &'static str },
    /// Search path against a tantivy index of builder documents.
    Index { entity: EntityKind },
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceDef {
    pub name: &'static str,
    /// Key the result list is published under in the response envelope.
    pub collection_key: &'static str,
    pub path: AccessPath,
    pub fields: &'static [FieldDescriptor],
    /// Fields omitted from both output and the filter whitelist.
    pub excludes: &'static [&'static str],
    /// Fields `order_by` may name.
    pub ordering: &'static [&'static str],
    pub max_limit: u64,
}

/// Implicit primary-key field exposed on every search resource.
pub const DOCUMENT_ID: &str = "document_id";

impl ResourceDef {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Entity kind behind an indexed resource, `None` for store resources.
    pub fn entity(&self) -> Option<EntityKind> {
        match self.path {
            AccessPath::Index { entity } => Some(entity),
            AccessPath::Store { .. } => None,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        if name == DOCUMENT_ID && matches!(self.path, AccessPath::Index { .. }) {
            return true;
        }
        self.field(name).is_some()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excludes.contains(&name)
    }

    pub fn is_stemmable(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.stemmable)
    }

    pub fn is_autoquery(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.autoquery)
    }

    pub fn is_sortable(&self, name: &str) -> bool {
        self.ordering.contains(&name)
    }

    /// Derive the filter whitelist from the field kinds.
    ///
    /// Search resources get the search operator class on every included
    /// field plus the implicit `document_id`; store resources get the class
    /// matching each column kind. Excluded fields are absent entirely.
    pub fn whitelist(&self) -> FilterWhitelist {
        let mut allowed: BTreeMap<&'static str, &'static [Operator]> = BTreeMap::new();

        match self.path {
            AccessPath::Index { .. } => {
                allowed.insert(DOCUMENT_ID, SEARCH_OPS);
                for f in self.fields {
                    if f.name == "text" || self.is_excluded(f.name) {
                        continue;
                    }
                    allowed.insert(f.name, SEARCH_OPS);
                }
            }
            AccessPath::Store { .. } => {
                for f in self.fields {
                    if self.is_excluded(f.name) {
                        continue;
                    }
                    let ops = match f.kind {
                        FieldKind::Text => TEXT_OPS,
                        FieldKind::Integer => NUMBER_OPS,
                        FieldKind::Boolean => BOOL_OPS,
                        FieldKind::Date => DATE_OPS,
                    };
                    allowed.insert(f.name, ops);
                }
            }
        }

        FilterWhitelist { allowed }
    }
}

/// Explicit enumeration of permitted (field, operator) pairs: the sole gate
/// for accepting a filter.
#[derive(Debug, Clone)]
pub struct FilterWhitelist {
    allowed: BTreeMap<&'static str, &'static [Operator]>,
}

impl FilterWhitelist {
    pub fn check(&self, field: &str, op: Operator) -> Result<()> {
        let Some(ops) = self.allowed.get(field) else {
            return Err(ApiError::InvalidFilter(format!(
                "The '{field}' field does not allow filtering."
            )));
        };

        if !ops.contains(&op) {
            return Err(ApiError::InvalidFilter(format!(
                "'{op}' is not an allowed filter on the '{field}' field."
            )));
        }

        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = &&'static str> {
        self.allowed.keys()
    }
}

static SENTENCES_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("sentence_text", FieldKind::Text).autoquery(),
    FieldDescriptor::new("sentence_text_stemmed", FieldKind::Text)
        .autoquery()
        .stemmable(),
    FieldDescriptor::new("lang", FieldKind::Text).autoquery(),
    FieldDescriptor::new("lang_id", FieldKind::Integer),
    FieldDescriptor::new("owner", FieldKind::Text).autoquery(),
    FieldDescriptor::new("user_id", FieldKind::Integer),
    FieldDescriptor::new("created", FieldKind::Date),
    FieldDescriptor::new("modified", FieldKind::Date),
    FieldDescriptor::new("tags", FieldKind::Text).autoquery(),
    FieldDescriptor::new("trans_langs", FieldKind::Text).autoquery(),
    FieldDescriptor::new("trans_owners", FieldKind::Text).autoquery(),
    FieldDescriptor::new("has_audio", FieldKind::Boolean),
    FieldDescriptor::new("unapproved", FieldKind::Boolean),
    FieldDescriptor::new("trans_orphan", FieldKind::Boolean),
    FieldDescriptor::new("trans_audio", FieldKind::Boolean),
    FieldDescriptor::new("trans_unapproved", FieldKind::Boolean),
    FieldDescriptor::new("correctness", FieldKind::Integer),
];

static TAGS_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("name", FieldKind::Text).autoquery(),
    FieldDescriptor::new("user", FieldKind::Text).autoquery(),
    FieldDescriptor::new("created", FieldKind::Date),
];

static LISTS_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("name", FieldKind::Text).autoquery(),
    FieldDescriptor::new("user", FieldKind::Text).autoquery(),
    FieldDescriptor::new("created", FieldKind::Date),
    FieldDescriptor::new("modified", FieldKind::Date),
];

static COMMENTS_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("comment_text", FieldKind::Text).autoquery(),
    FieldDescriptor::new("user", FieldKind::Text).autoquery(),
    FieldDescriptor::new("sentence_id", FieldKind::Integer),
    FieldDescriptor::new("created", FieldKind::Date),
    FieldDescriptor::new("modified", FieldKind::Date),
    FieldDescriptor::new("hidden", FieldKind::Boolean),
];

static WALL_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("content", FieldKind::Text).autoquery(),
    FieldDescriptor::new("owner", FieldKind::Text).autoquery(),
    FieldDescriptor::new("date", FieldKind::Date),
    FieldDescriptor::new("modified", FieldKind::Date),
];

static USERS_SEARCH_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("username", FieldKind::Text),
    FieldDescriptor::new("since", FieldKind::Date),
    FieldDescriptor::new("group", FieldKind::Text),
];

static SENTENCES_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", FieldKind::Integer),
    FieldDescriptor::new("text", FieldKind::Text),
    FieldDescriptor::new("lang", FieldKind::Text),
    FieldDescriptor::new("user_id", FieldKind::Integer),
    FieldDescriptor::new("created", FieldKind::Date),
    FieldDescriptor::new("modified", FieldKind::Date),
    FieldDescriptor::new("hasaudio", FieldKind::Text),
    FieldDescriptor::new("lang_id", FieldKind::Integer),
    FieldDescriptor::new("correctness", FieldKind::Integer),
];

static TAGS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", FieldKind::Integer),
    FieldDescriptor::new("name", FieldKind::Text),
    FieldDescriptor::new("user_id", FieldKind::Integer),
    FieldDescriptor::new("created", FieldKind::Date),
];

static USERS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("id", FieldKind::Integer),
    FieldDescriptor::new("username", FieldKind::Text),
    FieldDescriptor::new("since", FieldKind::Date),
    FieldDescriptor::new("group_id", FieldKind::Integer),
];

static RESOURCES: &[ResourceDef] = &[
    ResourceDef {
        name: "sentences_search",
        collection_key: "sentences",
        path: AccessPath::Index {
            entity: EntityKind::Sentence,
        },
        fields: SENTENCES_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "created", "modified", "lang", "user_id"],
        max_limit: 100,
    },
    ResourceDef {
        name: "tags_search",
        collection_key: "tags",
        path: AccessPath::Index {
            entity: EntityKind::Tag,
        },
        fields: TAGS_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "name", "created"],
        max_limit: 100,
    },
    ResourceDef {
        name: "sentences_lists_search",
        collection_key: "lists",
        path: AccessPath::Index {
            entity: EntityKind::List,
        },
        fields: LISTS_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "name", "created", "modified"],
        max_limit: 100,
    },
    ResourceDef {
        name: "sentence_comments_search",
        collection_key: "comments",
        path: AccessPath::Index {
            entity: EntityKind::Comment,
        },
        fields: COMMENTS_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "created", "modified", "sentence_id"],
        max_limit: 100,
    },
    ResourceDef {
        name: "wall_search",
        collection_key: "posts",
        path: AccessPath::Index {
            entity: EntityKind::Wall,
        },
        fields: WALL_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "date", "modified"],
        max_limit: 100,
    },
    ResourceDef {
        name: "users_search",
        collection_key: "users",
        path: AccessPath::Index {
            entity: EntityKind::User,
        },
        fields: USERS_SEARCH_FIELDS,
        excludes: &["text"],
        ordering: &[DOCUMENT_ID, "username", "since"],
        max_limit: 100,
    },
    ResourceDef {
        name: "sentences",
        collection_key: "sentences",
        path: AccessPath::Store { table: "sentences" },
        fields: SENTENCES_FIELDS,
        excludes: &["text"],
        ordering: &["id", "created", "modified", "lang"],
        max_limit: 100,
    },
    ResourceDef {
        name: "tags",
        collection_key: "tags",
        path: AccessPath::Store { table: "tags" },
        fields: TAGS_FIELDS,
        excludes: &["name"],
        ordering: &["id", "created"],
        max_limit: 100,
    },
    ResourceDef {
        name: "users",
        collection_key: "users",
        path: AccessPath::Store { table: "users" },
        fields: USERS_FIELDS,
        excludes: &["username"],
        ordering: &["id", "since"],
        max_limit: 100,
    },
];

pub fn registry() -> &'static [ResourceDef] {
    RESOURCES
}

pub fn find(name: &str) -> Result<&'static ResourceDef> {
    RESOURCES
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| ApiError::UnknownResource(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_resources() {
        assert!(find("sentences_search").is_ok());
        assert!(find("sentences").is_ok());
        assert!(matches!(
            find("nope"),
            Err(ApiError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_search_whitelist_has_document_id() {
        let wl = find("sentences_search").unwrap().whitelist();
        assert!(wl.check(DOCUMENT_ID, Operator::Gte).is_ok());
        assert!(wl.check(DOCUMENT_ID, Operator::Contains).is_ok());
    }

    #[test]
    fn test_excluded_field_rejected_for_every_operator() {
        let wl = find("sentences_search").unwrap().whitelist();
        for op in SEARCH_OPS {
            assert!(matches!(
                wl.check("text", *op),
                Err(ApiError::InvalidFilter(_))
            ));
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let wl = find("sentences_search").unwrap().whitelist();
        let err = wl.check("unknownfield", Operator::Exact).unwrap_err();
        assert!(err.to_string().contains("unknownfield"));
    }

    #[test]
    fn test_store_operator_classes() {
        let wl = find("sentences").unwrap().whitelist();
        // Text column: exact/in only.
        assert!(wl.check("lang", Operator::Exact).is_ok());
        assert!(wl.check("lang", Operator::In).is_ok());
        assert!(wl.check("lang", Operator::Gt).is_err());
        // Numeric column: comparisons allowed.
        assert!(wl.check("user_id", Operator::Gte).is_ok());
        assert!(wl.check("user_id", Operator::Year).is_err());
        // Date column: calendar components allowed.
        assert!(wl.check("created", Operator::Year).is_ok());
        assert!(wl.check("created", Operator::Minute).is_ok());
    }

    #[test]
    fn test_disallowed_operator_names_both() {
        let wl = find("sentences").unwrap().whitelist();
        let err = wl.check("lang", Operator::Startswith).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("startswith"));
        assert!(msg.contains("lang"));
    }

    #[test]
    fn test_stemmable_and_autoquery_sets() {
        let r = find("sentences_search").unwrap();
        assert!(r.is_stemmable("sentence_text_stemmed"));
        assert!(!r.is_stemmable("sentence_text"));
        assert!(r.is_autoquery("tags"));
        assert!(!r.is_autoquery("has_audio"));
    }

    #[test]
    fn test_operator_roundtrip() {
        for op in DATE_OPS {
            assert_eq!(Operator::parse(op.as_str()), Some(*op));
        }
        assert_eq!(Operator::parse("like"), None);
    }
}
