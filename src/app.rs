//! Application context: owns the store, the stemmer, and one search index
//! per indexed resource, and dispatches queries to the right access path.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as JsonValue;

use crate::builder::DocumentBuilder;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::page::{keyset_page, slice_page, PageRequest};
use crate::resource::{self, AccessPath, ResourceDef};
use crate::search::{
    apply_sort, combine, partition, strip_reserved, validate_sort, FilterParser, SearchIndex,
};
use crate::stem::Stemmer;
use crate::storage::Database;

pub struct AppContext {
    config: Config,
    db: Database,
    stemmer: Stemmer,
    indexes: HashMap<&'static str, SearchIndex>,
}

impl AppContext {
    /// Open the store and every search index under the configured paths,
    /// creating them when absent.
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config.storage.db_path)?;
        let stemmer = Stemmer::new(&config.stemming);

        let mut indexes = HashMap::new();
        for res in resource::registry() {
            if matches!(res.path, AccessPath::Index { .. }) {
                let dir = config.storage.index_dir.join(res.name);
                indexes.insert(res.name, SearchIndex::open(dir, res)?);
            }
        }

        Ok(Self {
            config,
            db,
            stemmer,
            indexes,
        })
    }

    /// Fully in-memory context for tests.
    pub fn in_memory() -> Result<Self> {
        let config = Config::default();
        let db = Database::open_in_memory()?;
        let stemmer = Stemmer::new(&config.stemming);

        let mut indexes = HashMap::new();
        for res in resource::registry() {
            if matches!(res.path, AccessPath::Index { .. }) {
                indexes.insert(res.name, SearchIndex::open_in_memory(res)?);
            }
        }

        Ok(Self {
            config,
            db,
            stemmer,
            indexes,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn stemmer(&self) -> &Stemmer {
        &self.stemmer
    }

    pub fn index(&self, name: &str) -> Option<&SearchIndex> {
        self.indexes.get(name)
    }

    /// Rebuild every search index from the store. Returns documents indexed
    /// per resource.
    pub fn reindex(&self, since: Option<&str>) -> Result<BTreeMap<&'static str, usize>> {
        let builder = DocumentBuilder::new(&self.db, &self.stemmer);
        let mut counts = BTreeMap::new();
        for (name, index) in &self.indexes {
            counts.insert(*name, builder.rebuild(index, since)?);
        }
        Ok(counts)
    }

    /// Run one query against a named resource and return the page envelope.
    pub fn query(&self, resource_name: &str, params: &BTreeMap<String, String>) -> Result<JsonValue> {
        let res = resource::find(resource_name)?;
        match res.path {
            AccessPath::Index { .. } => self.search_query(res, params),
            AccessPath::Store { .. } => self.store_query(res, params),
        }
    }

    fn search_query(
        &self,
        res: &'static ResourceDef,
        params: &BTreeMap<String, String>,
    ) -> Result<JsonValue> {
        let req = PageRequest::from_params(params, res.max_limit)?;
        let (filters, order_by) = strip_reserved(params);
        let parts = partition(&filters);

        let parser = FilterParser::new(res, &self.stemmer);
        let stem_lang = parts.stem_lang().to_string();
        let and = parser.parse(&parts.and, &stem_lang)?;
        let or = parser.parse(&parts.or, "")?;
        let not = parser.parse(&parts.not, "")?;
        let tree = combine(and, or, not);

        let index = self
            .indexes
            .get(res.name)
            .ok_or_else(|| ApiError::UnknownResource(res.name.to_string()))?;
        let mut docs = index.search(&tree)?;

        if let Some(expr) = order_by.as_deref() {
            apply_sort(res, &mut docs, expr)?;
        }

        let page = slice_page(&docs, req);
        page.envelope(res.collection_key)
    }

    fn store_query(
        &self,
        res: &'static ResourceDef,
        params: &BTreeMap<String, String>,
    ) -> Result<JsonValue> {
        let req = PageRequest::from_params(params, res.max_limit)?;
        let (filters, order_by) = strip_reserved(params);

        // The store path is conjunction-only; ordering is validated against
        // the whitelist but the keyset pager always scans in id order.
        if let Some(expr) = order_by.as_deref() {
            validate_sort(res, expr)?;
        }

        let parser = FilterParser::new(res, &self.stemmer);
        let parsed = parser.parse(&filters, "")?;

        let fetched = self.db.fetch_page(res, &parsed, &req)?;
        let page = keyset_page(fetched.rows, req, fetched.total_count);
        page.envelope(res.collection_key)
    }
}
