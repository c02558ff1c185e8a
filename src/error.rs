use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Search index error: {0}")]
    SearchIndex(#[from] tantivy::TantivyError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

impl ApiError {
    /// Caller errors (malformed filter or sort expressions) surface as 4xx;
    /// everything else is a collaborator or server failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidFilter(_) | Self::InvalidSort(_) | Self::UnknownResource(_))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
