//! Tantivy index wrapper: one index per search resource.
//!
//! The schema is derived from the resource's field descriptors; query trees
//! from the combinator are lowered here into tantivy's boolean/term/range
//! query types and executed against a manually-reloaded reader.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::RwLock;

use tantivy::collector::TopDocs;
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, Occur, PhraseQuery, Query, QueryParser, RangeQuery,
    RegexQuery, TermQuery,
};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, FAST, INDEXED,
    STORED,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::document::{parse_datetime, FieldValue, SearchDocument};
use crate::error::{ApiError, Result};
use crate::resource::{AccessPath, FieldKind, Operator, ResourceDef, DOCUMENT_ID};
use crate::search::filter::{FilterValue, ParsedFilter};
use crate::search::query::QueryNode;

pub struct SearchIndex {
    resource: &'static ResourceDef,
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    fields: BTreeMap<&'static str, Field>,
    id_field: Field,
}

/// Typed view of a schema field when lowering a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafKind {
    Id,
    Text,
    Integer,
    Bool,
    Date,
}

impl SearchIndex {
    /// Open or create the index for a search resource under `dir`.
    pub fn open(dir: impl AsRef<Path>, resource: &'static ResourceDef) -> Result<Self> {
        debug_assert!(matches!(resource.path, AccessPath::Index { .. }));
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let schema = build_schema(resource);
        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir)?
        } else {
            Index::create_in_dir(dir, schema.clone())?
        };

        Self::from_index(index, resource, 50_000_000)
    }

    /// In-memory index for tests and ephemeral runs.
    pub fn open_in_memory(resource: &'static ResourceDef) -> Result<Self> {
        let schema = build_schema(resource);
        let index = Index::create_in_ram(schema);
        Self::from_index(index, resource, 15_000_000)
    }

    fn from_index(
        index: Index,
        resource: &'static ResourceDef,
        writer_buffer: usize,
    ) -> Result<Self> {
        let schema = index.schema();
        let id_field = schema.get_field(DOCUMENT_ID)?;

        let mut fields = BTreeMap::new();
        for f in resource.fields {
            fields.insert(f.name, schema.get_field(f.name)?);
        }

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(writer_buffer)?;

        Ok(Self {
            resource,
            index,
            reader,
            writer: RwLock::new(writer),
            fields,
            id_field,
        })
    }

    pub fn resource(&self) -> &'static ResourceDef {
        self.resource
    }

    /// Add or replace one document. The previous version, if any, is deleted
    /// by id first; readers see the replacement atomically at the next
    /// commit.
    pub fn add_document(&self, doc: &SearchDocument) -> Result<()> {
        let mut tdoc = TantivyDocument::new();
        tdoc.add_u64(self.id_field, doc.id);

        for (name, value) in &doc.fields {
            let Some(field) = self.fields.get(name.as_str()).copied() else {
                tracing::warn!(resource = %self.resource.name, field = %name, "document field not in schema, skipping");
                continue;
            };
            match value {
                FieldValue::Text(s) => tdoc.add_text(field, s),
                FieldValue::Integer(n) => tdoc.add_i64(field, *n),
                FieldValue::Bool(b) => tdoc.add_bool(field, *b),
                FieldValue::Date(dt) => tdoc.add_date(
                    field,
                    tantivy::DateTime::from_timestamp_secs(dt.timestamp()),
                ),
            }
        }

        let mut writer = self.write_lock()?;
        writer.delete_term(Term::from_field_u64(self.id_field, doc.id));
        writer.add_document(tdoc)?;
        Ok(())
    }

    pub fn delete_document(&self, id: u64) -> Result<()> {
        let mut writer = self.write_lock()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id));
        Ok(())
    }

    /// Commit pending writes and reload the reader.
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.write_lock()?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut writer = self.write_lock()?;
        writer.delete_all_documents()?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs() == 0
    }

    /// Execute a query tree and materialize every match, in the index's own
    /// result ordering. Sorting and pagination happen downstream.
    pub fn search(&self, node: &QueryNode) -> Result<Vec<SearchDocument>> {
        let searcher = self.reader.searcher();
        let query = self.lower(node)?;

        let limit = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX).max(1);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address)?;
            results.push(self.materialize(&stored));
        }
        Ok(results)
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexWriter>> {
        self.writer.write().map_err(|e| {
            ApiError::SearchIndex(tantivy::TantivyError::InternalError(format!(
                "Failed to acquire write lock: {e}"
            )))
        })
    }

    fn materialize(&self, stored: &TantivyDocument) -> SearchDocument {
        let id = stored
            .get_first(self.id_field)
            .and_then(|v| v.as_u64())
            .unwrap_or_default();

        let entity = match self.resource.path {
            AccessPath::Index { entity } => entity,
            AccessPath::Store { .. } => unreachable!("store resources have no index"),
        };

        let mut doc = SearchDocument::new(entity, id);
        for descriptor in self.resource.fields {
            if descriptor.name == "text" {
                continue;
            }
            let Some(field) = self.fields.get(descriptor.name).copied() else {
                continue;
            };
            let Some(value) = stored.get_first(field) else {
                continue;
            };
            let converted = match descriptor.kind {
                FieldKind::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
                FieldKind::Integer => value.as_i64().map(FieldValue::Integer),
                FieldKind::Boolean => value.as_bool().map(FieldValue::Bool),
                FieldKind::Date => value
                    .as_datetime()
                    .and_then(|dt| {
                        chrono::DateTime::from_timestamp(dt.into_timestamp_secs(), 0)
                    })
                    .map(FieldValue::Date),
            };
            if let Some(v) = converted {
                doc.set(descriptor.name, v);
            }
        }
        doc
    }

    /// Lower the immutable query tree into tantivy's boolean query types.
    /// `Not` children of a conjunction become `MustNot` clauses; a standalone
    /// negation is paired with `AllQuery` so the exclusion has a base set.
    fn lower(&self, node: &QueryNode) -> Result<Box<dyn Query>> {
        let query: Box<dyn Query> = match node {
            QueryNode::All => Box::new(AllQuery),
            QueryNode::Leaf(filter) => self.lower_leaf(filter)?,
            QueryNode::And(children) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(children.len());
                for child in children {
                    match child {
                        QueryNode::Not(inner) => {
                            clauses.push((Occur::MustNot, self.lower(inner)?));
                        }
                        other => clauses.push((Occur::Must, self.lower(other)?)),
                    }
                }
                if clauses.iter().all(|(occur, _)| *occur == Occur::MustNot) {
                    clauses.push((Occur::Must, Box::new(AllQuery)));
                }
                Box::new(BooleanQuery::new(clauses))
            }
            QueryNode::Or(children) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(children.len());
                for child in children {
                    clauses.push((Occur::Should, self.lower(child)?));
                }
                Box::new(BooleanQuery::new(clauses))
            }
            QueryNode::Not(inner) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.lower(inner)?),
            ])),
        };
        Ok(query)
    }

    fn lower_leaf(&self, filter: &ParsedFilter) -> Result<Box<dyn Query>> {
        let (field, kind) = self.field_kind(&filter.field)?;

        match &filter.value {
            FilterValue::Query(expr) => {
                let parser = QueryParser::for_index(&self.index, vec![field]);
                let parsed = parser.parse_query(expr).map_err(|e| {
                    ApiError::QueryParse(format!("Failed to parse query '{expr}': {e}"))
                })?;
                Ok(parsed)
            }
            FilterValue::Null => Err(ApiError::InvalidFilter(format!(
                "The '{}' field does not support null filtering on the search path.",
                filter.field
            ))),
            FilterValue::Bool(b) => self.scalar_query(field, kind, if *b { "true" } else { "false" }, &filter.field),
            FilterValue::List(items) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(items.len());
                for item in items {
                    clauses.push((
                        Occur::Should,
                        self.scalar_query(field, kind, item, &filter.field)?,
                    ));
                }
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            FilterValue::Range(lo, hi) => {
                let lower = Bound::Included(self.bound_term(field, kind, lo, &filter.field)?);
                let upper = Bound::Included(self.bound_term(field, kind, hi, &filter.field)?);
                Ok(Box::new(RangeQuery::new(lower, upper)))
            }
            FilterValue::Text(raw) => match filter.op {
                Operator::Contains | Operator::Exact | Operator::In => {
                    self.scalar_query(field, kind, raw, &filter.field)
                }
                Operator::Startswith => {
                    if kind != LeafKind::Text {
                        return Err(ApiError::InvalidFilter(format!(
                            "'startswith' requires a text field, '{}' is not one.",
                            filter.field
                        )));
                    }
                    let pattern = format!("{}.*", regex::escape(&raw.to_lowercase()));
                    let query = RegexQuery::from_pattern(&pattern, field)?;
                    Ok(Box::new(query))
                }
                Operator::Gt => self.open_range(field, kind, raw, &filter.field, true, false),
                Operator::Gte => self.open_range(field, kind, raw, &filter.field, true, true),
                Operator::Lt => self.open_range(field, kind, raw, &filter.field, false, false),
                Operator::Lte => self.open_range(field, kind, raw, &filter.field, false, true),
                Operator::Range => Err(ApiError::InvalidFilter(format!(
                    "'range' requires exactly two comma-separated values, got '{raw}'."
                ))),
                Operator::Year
                | Operator::Month
                | Operator::Day
                | Operator::Hour
                | Operator::Minute => Err(ApiError::InvalidFilter(format!(
                    "'{}' is not an allowed filter on the '{}' field.",
                    filter.op, filter.field
                ))),
            },
        }
    }

    fn open_range(
        &self,
        field: Field,
        kind: LeafKind,
        raw: &str,
        field_name: &str,
        lower_side: bool,
        inclusive: bool,
    ) -> Result<Box<dyn Query>> {
        let term = self.bound_term(field, kind, raw, field_name)?;
        let bound = if inclusive {
            Bound::Included(term)
        } else {
            Bound::Excluded(term)
        };
        let (lower, upper) = if lower_side {
            (bound, Bound::Unbounded)
        } else {
            (Bound::Unbounded, bound)
        };
        Ok(Box::new(RangeQuery::new(lower, upper)))
    }

    /// Exact-match query for one scalar value, typed by the field kind.
    /// Multi-token text values become phrase queries against the tokenized
    /// field.
    fn scalar_query(
        &self,
        field: Field,
        kind: LeafKind,
        raw: &str,
        field_name: &str,
    ) -> Result<Box<dyn Query>> {
        if kind == LeafKind::Text {
            let tokens: Vec<String> = raw
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            return Ok(match tokens.len() {
                0 => Box::new(EmptyQuery),
                1 => Box::new(TermQuery::new(
                    Term::from_field_text(field, &tokens[0]),
                    IndexRecordOption::WithFreqsAndPositions,
                )),
                _ => Box::new(PhraseQuery::new(
                    tokens
                        .iter()
                        .map(|t| Term::from_field_text(field, t))
                        .collect(),
                )),
            });
        }

        let term = self.bound_term(field, kind, raw, field_name)?;
        Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
    }

    fn bound_term(
        &self,
        field: Field,
        kind: LeafKind,
        raw: &str,
        field_name: &str,
    ) -> Result<Term> {
        let term = match kind {
            LeafKind::Id => Term::from_field_u64(field, parse_number::<u64>(raw, field_name)?),
            LeafKind::Integer => Term::from_field_i64(field, parse_number::<i64>(raw, field_name)?),
            LeafKind::Bool => {
                let value = match raw {
                    "true" | "True" | "1" => true,
                    "false" | "False" | "0" => false,
                    _ => {
                        return Err(ApiError::InvalidFilter(format!(
                            "'{raw}' is not a boolean value for the '{field_name}' field."
                        )))
                    }
                };
                Term::from_field_bool(field, value)
            }
            LeafKind::Date => {
                let dt = parse_datetime(raw)?;
                Term::from_field_date(
                    field,
                    tantivy::DateTime::from_timestamp_secs(dt.timestamp()),
                )
            }
            LeafKind::Text => Term::from_field_text(field, &raw.to_lowercase()),
        };
        Ok(term)
    }

    fn field_kind(&self, name: &str) -> Result<(Field, LeafKind)> {
        if name == DOCUMENT_ID {
            return Ok((self.id_field, LeafKind::Id));
        }

        let descriptor = self.resource.field(name).ok_or_else(|| {
            ApiError::InvalidFilter(format!("The '{name}' field does not allow filtering."))
        })?;
        let field = self.fields.get(name).copied().ok_or_else(|| {
            ApiError::InvalidFilter(format!("The '{name}' field does not allow filtering."))
        })?;

        let kind = match descriptor.kind {
            FieldKind::Text => LeafKind::Text,
            FieldKind::Integer => LeafKind::Integer,
            FieldKind::Boolean => LeafKind::Bool,
            FieldKind::Date => LeafKind::Date,
        };
        Ok((field, kind))
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, field_name: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        ApiError::InvalidFilter(format!(
            "'{raw}' is not a numeric value for the '{field_name}' field."
        ))
    })
}

/// Derive the tantivy schema from a resource's field descriptors.
///
/// Text fields are tokenized with positions; everything except the `text`
/// body is stored for materialization. Numeric and date fields are fast
/// fields.
fn build_schema(resource: &ResourceDef) -> Schema {
    let mut builder = Schema::builder();

    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer("default")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(text_indexing);

    builder.add_u64_field(DOCUMENT_ID, INDEXED | STORED | FAST);

    for f in resource.fields {
        match f.kind {
            FieldKind::Text => {
                if f.name == "text" {
                    // Index-only free-text body.
                    builder.add_text_field(f.name, text_options.clone());
                } else {
                    builder.add_text_field(f.name, text_options.clone() | STORED);
                }
            }
            FieldKind::Integer => {
                builder.add_i64_field(f.name, INDEXED | STORED | FAST);
            }
            FieldKind::Boolean => {
                builder.add_bool_field(f.name, INDEXED | STORED);
            }
            FieldKind::Date => {
                builder.add_date_field(f.name, INDEXED | STORED | FAST);
            }
        }
    }

    builder.build()
}
