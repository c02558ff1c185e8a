pub mod app;
pub mod builder;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod page;
pub mod resource;
pub mod search;
pub mod stem;
pub mod storage;
pub mod text;

pub use error::{ApiError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
