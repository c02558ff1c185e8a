//! Language-aware stemming, used at index time (document builder) and at
//! query time (filter parser).
//!
//! Built on tantivy's tokenizer pipeline: lowercase, stop-word removal,
//! snowball stemming. One analyzer per configured language, constructed once
//! at startup and shared immutably.

use std::collections::HashMap;

use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer as SnowballStemmer, StopWordFilter,
    TextAnalyzer,
};

use crate::config::StemmingConfig;

pub struct Stemmer {
    analyzers: HashMap<String, TextAnalyzer>,
}

impl std::fmt::Debug for Stemmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stemmer")
            .field("languages", &self.analyzers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Stemmer {
    pub fn new(config: &StemmingConfig) -> Self {
        let mut analyzers = HashMap::new();

        for (code, algorithm) in &config.languages {
            let Some(language) = language_from_name(algorithm) else {
                tracing::warn!(lang = %code, algorithm = %algorithm, "unknown stemming algorithm, skipping");
                continue;
            };

            let stop_words = config.stop_words.get(code).cloned().unwrap_or_default();
            let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .filter(StopWordFilter::remove(stop_words))
                .filter(SnowballStemmer::new(language))
                .build();

            analyzers.insert(code.clone(), analyzer);
        }

        Self { analyzers }
    }

    /// Stem `text` under the given language.
    ///
    /// Languages without a configured stemmer yield the empty string, so an
    /// unstemmable language never produces false matches against stemmed
    /// fields.
    pub fn stem(&self, text: &str, lang: &str) -> String {
        let Some(analyzer) = self.analyzers.get(lang) else {
            return String::new();
        };

        let mut analyzer = analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens: Vec<String> = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }

        tokens.join(" ")
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.analyzers.contains_key(lang)
    }
}

fn language_from_name(name: &str) -> Option<Language> {
    let language = match name {
        "arabic" => Language::Arabic,
        "danish" => Language::Danish,
        "dutch" => Language::Dutch,
        "english" => Language::English,
        "finnish" => Language::Finnish,
        "french" => Language::French,
        "german" => Language::German,
        "greek" => Language::Greek,
        "hungarian" => Language::Hungarian,
        "italian" => Language::Italian,
        "norwegian" => Language::Norwegian,
        "portuguese" => Language::Portuguese,
        "romanian" => Language::Romanian,
        "russian" => Language::Russian,
        "spanish" => Language::Spanish,
        "swedish" => Language::Swedish,
        "tamil" => Language::Tamil,
        "turkish" => Language::Turkish,
        _ => return None,
    };
    Some(language)
}
