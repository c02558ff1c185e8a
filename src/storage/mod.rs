//! Corpus store: SQLite schema, migrations, and the direct resource path.

pub mod migrations;
pub mod sqlite;

pub use sqlite::{
    CommentRecord, Database, FetchedPage, ListRecord, SentenceRecord, TagRecord, UserRecord,
    WallPostRecord,
};
