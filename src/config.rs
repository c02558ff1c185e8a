//! Process configuration.
//!
//! Loaded once at startup from TOML and passed down explicitly; the stemmer
//! and registry are built from it and never mutated afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stemming: StemmingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding the normalized source tables.
    pub db_path: PathBuf,
    /// Directory holding one tantivy index per search resource.
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("corpus.db"),
            index_dir: PathBuf::from("index"),
        }
    }
}

/// Per-language stemming tables.
///
/// Keys are the corpus' ISO 639-3 language codes; values name a snowball
/// algorithm. Languages absent from the table stem to the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemmingConfig {
    #[serde(default = "default_languages")]
    pub languages: BTreeMap<String, String>,
    #[serde(default = "default_stop_words")]
    pub stop_words: BTreeMap<String, Vec<String>>,
}

impl Default for StemmingConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            stop_words: default_stop_words(),
        }
    }
}

fn default_languages() -> BTreeMap<String, String> {
    [
        ("ara", "arabic"),
        ("dan", "danish"),
        ("deu", "german"),
        ("ell", "greek"),
        ("eng", "english"),
        ("fin", "finnish"),
        ("fra", "french"),
        ("hun", "hungarian"),
        ("ita", "italian"),
        ("nld", "dutch"),
        ("nob", "norwegian"),
        ("por", "portuguese"),
        ("ron", "romanian"),
        ("rus", "russian"),
        ("spa", "spanish"),
        ("swe", "swedish"),
        ("tur", "turkish"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_stop_words() -> BTreeMap<String, Vec<String>> {
    let eng = [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has",
        "he", "in", "is", "it", "its", "of", "on", "that", "the", "to", "was",
        "were", "will", "with",
    ];
    let mut map = BTreeMap::new();
    map.insert(
        "eng".to_string(),
        eng.iter().map(|w| (*w).to_string()).collect(),
    );
    map
}

impl Config {
    /// Load configuration from an explicit TOML file, falling back to
    /// defaults when no file is given.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = explicit_path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ApiError::Config(format!("read config {}: {err}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|err| ApiError::Config(format!("parse config {}: {err}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.db_path, PathBuf::from("corpus.db"));
        assert_eq!(config.stemming.languages.get("eng").unwrap(), "english");
        assert!(config.stemming.stop_words.contains_key("eng"));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.storage.index_dir, PathBuf::from("index"));
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\ndb_path = \"/srv/corpus.db\"\nindex_dir = \"/srv/index\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/srv/corpus.db"));
        // Stemming section falls back to defaults.
        assert_eq!(config.stemming.languages.get("deu").unwrap(), "german");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
