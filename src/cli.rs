//! Command-line interface definitions and handlers.
//!
//! Uses clap v4 with derive macros for argument parsing. Queries are passed
//! as percent-encoded query strings, the same shape the HTTP layer would
//! hand to the engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::AppContext;
use crate::config::Config;
use crate::error::Result;
use crate::resource::{self, AccessPath};

/// Read-only corpus search API over SQLite and tantivy
#[derive(Parser, Debug)]
#[command(name = "corpus-api")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Search index directory (overrides config)
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the search indexes from the store
    Index {
        /// Only reindex records touched at or after this timestamp
        #[arg(long)]
        since: Option<String>,
    },

    /// Query a search resource (e.g. sentences_search)
    Search {
        /// Resource name
        resource: String,
        /// Query string, e.g. "lang=eng&tags__contains=animals&limit=10"
        #[arg(default_value = "")]
        query: String,
    },

    /// Query a direct resource (e.g. sentences)
    List {
        /// Resource name
        resource: String,
        /// Query string, e.g. "lang=eng&offset=100&limit=20"
        #[arg(default_value = "")]
        query: String,
    },

    /// Print the known resources and their access paths
    Resources,
}

impl Cli {
    /// Effective configuration after applying command-line overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(db) = &self.db {
            config.storage.db_path = db.clone();
        }
        if let Some(dir) = &self.index_dir {
            config.storage.index_dir = dir.clone();
        }
        Ok(config)
    }
}

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Index { since } => {
            let counts = ctx.reindex(since.as_deref())?;
            for (name, count) in &counts {
                println!("{name}: {count} documents");
            }
            Ok(())
        }
        Commands::Search { resource, query } | Commands::List { resource, query } => {
            let params = parse_query_string(query);
            let envelope = ctx.query(resource, &params)?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Commands::Resources => {
            for res in resource::registry() {
                let path = match res.path {
                    AccessPath::Index { .. } => "search",
                    AccessPath::Store { .. } => "direct",
                };
                println!("{:<30} {path}", res.name);
            }
            Ok(())
        }
    }
}

/// Split a raw query string into a parameter map. `+` decodes to space and
/// both keys and values are percent-decoded; a repeated key keeps the last
/// value.
pub fn parse_query_string(raw: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        params.insert(decode_component(key), decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|s| s.into_owned())
        .unwrap_or(plus_decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string_basic() {
        let params = parse_query_string("lang=eng&limit=10");
        assert_eq!(params.get("lang").unwrap(), "eng");
        assert_eq!(params.get("limit").unwrap(), "10");
    }

    #[test]
    fn test_parse_query_string_decodes() {
        let params = parse_query_string("sentence_text=hello+world&%7Elang=jpn");
        assert_eq!(params.get("sentence_text").unwrap(), "hello world");
        assert_eq!(params.get("~lang").unwrap(), "jpn");
    }

    #[test]
    fn test_parse_query_string_empty_and_bare_keys() {
        let params = parse_query_string("flag&x=");
        assert_eq!(params.get("flag").unwrap(), "");
        assert_eq!(params.get("x").unwrap(), "");
        assert!(parse_query_string("").is_empty());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        use clap::Parser;
        let cli = Cli::try_parse_from(["corpus-api", "search", "sentences_search", "lang=eng"])
            .unwrap();
        match cli.command {
            Commands::Search { resource, query } => {
                assert_eq!(resource, "sentences_search");
                assert_eq!(query, "lang=eng");
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_cli_config_overrides() {
        use clap::Parser;
        let cli =
            Cli::try_parse_from(["corpus-api", "--db", "/tmp/x.db", "resources"]).unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/x.db"));
    }
}
