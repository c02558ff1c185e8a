//! SQLite corpus store.
//!
//! Holds the normalized corpus tables (sentences, translation links, tags,
//! lists, comments, wall posts, users) that the document builder denormalizes
//! into search documents, and serves the direct resources with keyset
//! pagination over `id`.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value as JsonValue;

use crate::document::{parse_datetime, FieldValue};
use crate::error::{ApiError, Result};
use crate::page::PageRequest;
use crate::resource::{AccessPath, FieldKind, Operator, ResourceDef};
use crate::search::filter::{FilterValue, ParsedFilter};
use crate::storage::migrations;
use crate::text::clean_bytes;

pub struct Database {
    conn: Connection,
    schema_version: u32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceRecord {
    pub id: i64,
    pub text: String,
    pub lang: Option<String>,
    pub lang_id: i64,
    pub user_id: Option<i64>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub hasaudio: String,
    pub correctness: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub internal_name: Option<String>,
    pub user_id: Option<i64>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRecord {
    pub id: i64,
    pub name: String,
    pub user_id: Option<i64>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: i64,
    pub sentence_id: i64,
    pub text: String,
    pub user_id: Option<i64>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallPostRecord {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub content: String,
    pub date: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub since: String,
    pub group_id: Option<i64>,
}

/// One page of direct-resource rows plus the approximate total.
#[derive(Debug)]
pub struct FetchedPage {
    pub rows: Vec<JsonValue>,
    pub total_count: u64,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;

        Ok(Self {
            conn,
            schema_version,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn,
            schema_version,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Refresh the planner statistics used for approximate counts.
    pub fn analyze(&self) -> Result<()> {
        self.conn.execute_batch("ANALYZE;")?;
        Ok(())
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity fetches for the document builder. `since` narrows each scan
    // to records touched at or after the given timestamp.
    // ------------------------------------------------------------------

    pub fn sentences(&self, since: Option<&str>) -> Result<Vec<SentenceRecord>> {
        self.fetch_records(
            "SELECT id, text, lang, lang_id, user_id, created, modified, hasaudio, correctness \
             FROM sentences",
            "COALESCE(modified, created)",
            since,
            sentence_from_row,
        )
    }

    pub fn sentence(&self, id: i64) -> Result<Option<SentenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, text, lang, lang_id, user_id, created, modified, hasaudio, correctness \
             FROM sentences WHERE id = ?",
        )?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(sentence_from_row(row)?));
        }
        Ok(None)
    }

    pub fn tags(&self, since: Option<&str>) -> Result<Vec<TagRecord>> {
        self.fetch_records(
            "SELECT id, name, internal_name, user_id, created FROM tags",
            "created",
            since,
            tag_from_row,
        )
    }

    pub fn lists(&self, since: Option<&str>) -> Result<Vec<ListRecord>> {
        self.fetch_records(
            "SELECT id, name, user_id, created, modified FROM sentences_lists",
            "COALESCE(modified, created)",
            since,
            list_from_row,
        )
    }

    pub fn comments(&self, since: Option<&str>) -> Result<Vec<CommentRecord>> {
        self.fetch_records(
            "SELECT id, sentence_id, text, user_id, created, modified, hidden \
             FROM sentence_comments",
            "COALESCE(modified, created)",
            since,
            comment_from_row,
        )
    }

    pub fn wall_posts(&self, since: Option<&str>) -> Result<Vec<WallPostRecord>> {
        self.fetch_records(
            "SELECT id, owner_id, content, date, modified FROM wall",
            "COALESCE(modified, date)",
            since,
            wall_from_row,
        )
    }

    pub fn users(&self, since: Option<&str>) -> Result<Vec<UserRecord>> {
        self.fetch_records(
            "SELECT id, username, since, group_id FROM users",
            "since",
            since,
            user_from_row,
        )
    }

    fn fetch_records<T>(
        &self,
        select: &str,
        timestamp_expr: &str,
        since: Option<&str>,
        from_row: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let sql = match since {
            Some(_) => format!("{select} WHERE {timestamp_expr} >= ? ORDER BY id"),
            None => format!("{select} ORDER BY id"),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut records = Vec::new();
        match since {
            Some(ts) => {
                let rows = stmt.query_map([ts], from_row)?;
                for row in rows {
                    records.push(row?);
                }
            }
            None => {
                let rows = stmt.query_map([], from_row)?;
                for row in rows {
                    records.push(row?);
                }
            }
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Denormalization lookups
    // ------------------------------------------------------------------

    pub fn username(&self, user_id: i64) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT username FROM users WHERE id = ?")?;
        let mut rows = stmt.query([user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row.get(0)?));
        }
        Ok(None)
    }

    pub fn group_name(&self, group_id: i64) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM groups WHERE id = ?")?;
        let mut rows = stmt.query([group_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row.get(0)?));
        }
        Ok(None)
    }

    /// Distinct tag names attached to a sentence, in name order.
    pub fn tag_names_for_sentence(&self, sentence_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT t.name FROM tags t \
             JOIN tags_sentences ts ON ts.tag_id = t.id \
             WHERE ts.sentence_id = ? ORDER BY t.name",
        )?;
        let rows = stmt.query_map([sentence_id], |row| row.get(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Direct translations of a sentence, by link table.
    pub fn translations_of(&self, sentence_id: i64) -> Result<Vec<SentenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.text, s.lang, s.lang_id, s.user_id, s.created, s.modified, \
                    s.hasaudio, s.correctness \
             FROM sentences s \
             JOIN sentences_translations st ON st.translation_id = s.id \
             WHERE st.sentence_id = ? ORDER BY s.id",
        )?;
        let rows = stmt.query_map([sentence_id], sentence_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Inserts, used by the importer and test fixtures
    // ------------------------------------------------------------------

    pub fn insert_group(&self, id: i64, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO groups (id, name) VALUES (?, ?)",
            params![id, name],
        )?;
        Ok(())
    }

    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, username, since, group_id) VALUES (?, ?, ?, ?)",
            params![user.id, user.username, user.since, user.group_id],
        )?;
        Ok(())
    }

    pub fn insert_sentence(&self, sentence: &SentenceRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sentences (id, text, lang, lang_id, user_id, created, modified, \
             hasaudio, correctness) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                sentence.id,
                sentence.text,
                sentence.lang,
                sentence.lang_id,
                sentence.user_id,
                sentence.created,
                sentence.modified,
                sentence.hasaudio,
                sentence.correctness,
            ],
        )?;
        Ok(())
    }

    /// Record a translation link in both directions.
    pub fn link_translation(&self, sentence_id: i64, translation_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sentences_translations (sentence_id, translation_id) \
             VALUES (?, ?)",
            params![sentence_id, translation_id],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO sentences_translations (sentence_id, translation_id) \
             VALUES (?, ?)",
            params![translation_id, sentence_id],
        )?;
        Ok(())
    }

    pub fn insert_tag(&self, tag: &TagRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tags (id, name, internal_name, user_id, created) \
             VALUES (?, ?, ?, ?, ?)",
            params![tag.id, tag.name, tag.internal_name, tag.user_id, tag.created],
        )?;
        Ok(())
    }

    pub fn tag_sentence(&self, tag_id: i64, sentence_id: i64, user_id: Option<i64>) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tags_sentences (tag_id, sentence_id, user_id) \
             VALUES (?, ?, ?)",
            params![tag_id, sentence_id, user_id],
        )?;
        Ok(())
    }

    pub fn insert_list(&self, list: &ListRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sentences_lists (id, name, user_id, created, modified) \
             VALUES (?, ?, ?, ?, ?)",
            params![list.id, list.name, list.user_id, list.created, list.modified],
        )?;
        Ok(())
    }

    pub fn insert_comment(&self, comment: &CommentRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sentence_comments (id, sentence_id, text, user_id, created, modified, \
             hidden) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                comment.id,
                comment.sentence_id,
                comment.text,
                comment.user_id,
                comment.created,
                comment.modified,
                comment.hidden as i64,
            ],
        )?;
        Ok(())
    }

    pub fn insert_wall_post(&self, post: &WallPostRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO wall (id, owner_id, content, date, modified) VALUES (?, ?, ?, ?, ?)",
            params![post.id, post.owner_id, post.content, post.date, post.modified],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Direct resource path
    // ------------------------------------------------------------------

    /// Fetch one keyset page of a direct resource. Rows with `id >= offset`
    /// are returned in id order; a zero limit means unbounded. The total is
    /// approximate when no filters apply.
    pub fn fetch_page(
        &self,
        resource: &ResourceDef,
        filters: &[ParsedFilter],
        req: &PageRequest,
    ) -> Result<FetchedPage> {
        let table = match resource.path {
            AccessPath::Store { table } => table,
            AccessPath::Index { .. } => {
                return Err(ApiError::UnknownResource(format!(
                    "'{}' is not a direct resource.",
                    resource.name
                )))
            }
        };

        let mut clauses: Vec<String> = Vec::with_capacity(filters.len() + 1);
        let mut params_vec: Vec<SqlValue> = Vec::new();
        for filter in filters {
            clauses.push(sql_clause(resource, filter, &mut params_vec)?);
        }

        let filter_where = clauses.join(" AND ");
        let total_count = self.count_rows(table, &filter_where, &params_vec)?;

        clauses.push("id >= ?".to_string());
        params_vec.push(SqlValue::Integer(i64::try_from(req.offset).unwrap_or(i64::MAX)));

        let columns: Vec<&str> = resource.fields.iter().map(|f| f.name).collect();
        let mut sql = format!(
            "SELECT {} FROM {table} WHERE {} ORDER BY id",
            columns.join(", "),
            clauses.join(" AND "),
        );
        if req.limit > 0 {
            sql.push_str(" LIMIT ?");
            params_vec.push(SqlValue::Integer(i64::try_from(req.limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params_vec.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_json(resource, &columns, row)?);
        }

        Ok(FetchedPage {
            rows: out,
            total_count,
        })
    }

    /// Row count for a filtered query. Unfiltered tables use the planner
    /// statistics when available, so large tables are not scanned just to
    /// fill in pagination metadata.
    fn count_rows(&self, table: &str, filter_where: &str, params_vec: &[SqlValue]) -> Result<u64> {
        if filter_where.is_empty() {
            if let Some(estimate) = self.estimated_count(table)? {
                return Ok(estimate);
            }
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            return Ok(count.max(0) as u64);
        }

        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {filter_where}");
        let count: i64 =
            self.conn
                .query_row(&sql, params_from_iter(params_vec.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn estimated_count(&self, table: &str) -> Result<Option<u64>> {
        let mut stmt = match self
            .conn
            .prepare("SELECT stat FROM sqlite_stat1 WHERE tbl = ? LIMIT 1")
        {
            Ok(stmt) => stmt,
            // sqlite_stat1 only exists after ANALYZE has run.
            Err(_) => return Ok(None),
        };
        let mut rows = stmt.query([table])?;
        if let Some(row) = rows.next()? {
            let stat: String = row.get(0)?;
            let estimate = stat
                .split_whitespace()
                .next()
                .and_then(|n| n.parse::<u64>().ok());
            return Ok(estimate);
        }
        Ok(None)
    }
}

/// Render one filter as a SQL predicate, pushing its bind values.
/// Field names come from the static resource tables, never from input.
fn sql_clause(
    resource: &ResourceDef,
    filter: &ParsedFilter,
    params_vec: &mut Vec<SqlValue>,
) -> Result<String> {
    let descriptor = resource.field(&filter.field).ok_or_else(|| {
        ApiError::InvalidFilter(format!(
            "The '{}' field does not allow filtering.",
            filter.field
        ))
    })?;
    let column = descriptor.name;

    let clause = match &filter.value {
        FilterValue::Null => format!("{column} IS NULL"),
        FilterValue::Bool(b) => {
            params_vec.push(SqlValue::Integer(i64::from(*b)));
            format!("{column} = ?")
        }
        FilterValue::List(items) => {
            if items.is_empty() {
                return Err(ApiError::InvalidFilter(format!(
                    "The '{}' filter needs at least one value.",
                    filter.field
                )));
            }
            for item in items {
                params_vec.push(bind_value(descriptor.kind, item, &filter.field)?);
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            format!("{column} IN ({placeholders})")
        }
        FilterValue::Range(lo, hi) => {
            params_vec.push(bind_value(descriptor.kind, lo, &filter.field)?);
            params_vec.push(bind_value(descriptor.kind, hi, &filter.field)?);
            format!("{column} BETWEEN ? AND ?")
        }
        FilterValue::Query(_) => {
            return Err(ApiError::InvalidFilter(format!(
                "The '{}' field does not support query expressions.",
                filter.field
            )))
        }
        FilterValue::Text(raw) => match filter.op {
            Operator::Exact | Operator::In => {
                params_vec.push(bind_value(descriptor.kind, raw, &filter.field)?);
                format!("{column} = ?")
            }
            Operator::Contains => {
                params_vec.push(SqlValue::Text(format!("%{}%", escape_like(raw))));
                format!("{column} LIKE ? ESCAPE '\\'")
            }
            Operator::Startswith => {
                params_vec.push(SqlValue::Text(format!("{}%", escape_like(raw))));
                format!("{column} LIKE ? ESCAPE '\\'")
            }
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let op = match filter.op {
                    Operator::Lt => "<",
                    Operator::Lte => "<=",
                    Operator::Gt => ">",
                    _ => ">=",
                };
                params_vec.push(bind_value(descriptor.kind, raw, &filter.field)?);
                format!("{column} {op} ?")
            }
            Operator::Range => {
                return Err(ApiError::InvalidFilter(format!(
                    "'range' requires exactly two comma-separated values, got '{raw}'."
                )))
            }
            Operator::Year
            | Operator::Month
            | Operator::Day
            | Operator::Hour
            | Operator::Minute => {
                let code = match filter.op {
                    Operator::Year => "%Y",
                    Operator::Month => "%m",
                    Operator::Day => "%d",
                    Operator::Hour => "%H",
                    _ => "%M",
                };
                let part: i64 = raw.parse().map_err(|_| {
                    ApiError::InvalidFilter(format!(
                        "'{raw}' is not a numeric value for the '{}' filter.",
                        filter.field
                    ))
                })?;
                params_vec.push(SqlValue::Integer(part));
                format!("CAST(strftime('{code}', {column}) AS INTEGER) = ?")
            }
        },
    };
    Ok(clause)
}

fn bind_value(kind: FieldKind, raw: &str, field_name: &str) -> Result<SqlValue> {
    match kind {
        FieldKind::Integer => {
            let n: i64 = raw.parse().map_err(|_| {
                ApiError::InvalidFilter(format!(
                    "'{raw}' is not a numeric value for the '{field_name}' field."
                ))
            })?;
            Ok(SqlValue::Integer(n))
        }
        FieldKind::Boolean => match raw {
            "true" | "True" | "1" => Ok(SqlValue::Integer(1)),
            "false" | "False" | "0" => Ok(SqlValue::Integer(0)),
            _ => Err(ApiError::InvalidFilter(format!(
                "'{raw}' is not a boolean value for the '{field_name}' field."
            ))),
        },
        FieldKind::Text | FieldKind::Date => Ok(SqlValue::Text(raw.to_string())),
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Serialize one row, respecting the resource's excluded fields.
fn row_to_json(resource: &ResourceDef, columns: &[&str], row: &Row<'_>) -> Result<JsonValue> {
    let mut object = serde_json::Map::new();
    for (idx, column) in columns.iter().enumerate() {
        if resource.is_excluded(column) {
            continue;
        }
        let descriptor = resource.field(column).ok_or_else(|| {
            ApiError::UnknownResource(format!("'{column}' missing from '{}'.", resource.name))
        })?;
        let value = match descriptor.kind {
            FieldKind::Integer => row
                .get::<_, Option<i64>>(idx)?
                .map_or(JsonValue::Null, JsonValue::from),
            FieldKind::Boolean => row
                .get::<_, Option<i64>>(idx)?
                .map_or(JsonValue::Null, |n| JsonValue::from(n != 0)),
            FieldKind::Text => row
                .get::<_, Option<String>>(idx)?
                .map_or(JsonValue::Null, JsonValue::from),
            // Dates share the search path's RFC 3339 representation; values
            // the store holds in an unrecognized shape pass through verbatim.
            FieldKind::Date => match row.get::<_, Option<String>>(idx)? {
                Some(raw) => match parse_datetime(&raw) {
                    Ok(dt) => FieldValue::Date(dt).to_json(),
                    Err(_) => JsonValue::from(raw),
                },
                None => JsonValue::Null,
            },
        };
        object.insert((*column).to_string(), value);
    }
    Ok(JsonValue::Object(object))
}

/// Read a text column as raw bytes and decode lossily, so a row holding
/// invalid UTF-8 degrades to its decodable characters instead of failing
/// the whole scan.
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    let value = row.get_ref(idx)?;
    let bytes = value.as_bytes().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, value.data_type(), Box::new(err))
    })?;
    Ok(clean_bytes(bytes))
}

fn sentence_from_row(row: &Row<'_>) -> rusqlite::Result<SentenceRecord> {
    Ok(SentenceRecord {
        id: row.get(0)?,
        text: text_column(row, 1)?,
        lang: row.get(2)?,
        lang_id: row.get(3)?,
        user_id: row.get(4)?,
        created: row.get(5)?,
        modified: row.get(6)?,
        hasaudio: row.get(7)?,
        correctness: row.get(8)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<TagRecord> {
    Ok(TagRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        internal_name: row.get(2)?,
        user_id: row.get(3)?,
        created: row.get(4)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<ListRecord> {
    Ok(ListRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        created: row.get(3)?,
        modified: row.get(4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get(0)?,
        sentence_id: row.get(1)?,
        text: text_column(row, 2)?,
        user_id: row.get(3)?,
        created: row.get(4)?,
        modified: row.get(5)?,
        hidden: row.get::<_, i64>(6)? != 0,
    })
}

fn wall_from_row(row: &Row<'_>) -> rusqlite::Result<WallPostRecord> {
    Ok(WallPostRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: text_column(row, 2)?,
        date: row.get(3)?,
        modified: row.get(4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        since: row.get(2)?,
        group_id: row.get(3)?,
    })
}
