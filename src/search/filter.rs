//! Filter expression parsing.
//!
//! Decodes flat `field[__operator]=value` query parameters into typed,
//! whitelist-validated filter triples. Parsing is a pure function of the
//! parameter map and the resource definition.

use std::collections::BTreeMap;

use crate::error::{ApiError, Result};
use crate::resource::{AccessPath, FilterWhitelist, Operator, ResourceDef};
use crate::stem::Stemmer;

/// Separator between field name and operator suffix in a filter key.
pub const LOOKUP_SEP: &str = "__";

/// A filter value coerced to the shape its operator expects.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Null,
    List(Vec<String>),
    Range(String, String),
    /// Free-text query expression for auto-query fields, interpreted in the
    /// index engine's native query syntax rather than as an exact predicate.
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilter {
    pub field: String,
    pub op: Operator,
    pub value: FilterValue,
}

pub struct FilterParser<'a> {
    resource: &'a ResourceDef,
    whitelist: FilterWhitelist,
    stemmer: &'a Stemmer,
}

impl<'a> FilterParser<'a> {
    pub fn new(resource: &'a ResourceDef, stemmer: &'a Stemmer) -> Self {
        Self {
            resource,
            whitelist: resource.whitelist(),
            stemmer,
        }
    }

    /// Parse one partition of filters. `stem_lang` is the language applied
    /// to stemmable fields; only the AND partition supplies one.
    pub fn parse(
        &self,
        filters: &BTreeMap<String, String>,
        stem_lang: &str,
    ) -> Result<Vec<ParsedFilter>> {
        filters
            .iter()
            .map(|(key, value)| self.parse_one(key, value, stem_lang))
            .collect()
    }

    fn parse_one(&self, key: &str, raw: &str, stem_lang: &str) -> Result<ParsedFilter> {
        let mut bits: Vec<&str> = key.split(LOOKUP_SEP).collect();
        let field = bits.remove(0);

        let op = match bits.pop() {
            None => self.default_op(),
            Some(suffix) => Operator::parse(suffix).ok_or_else(|| {
                ApiError::InvalidFilter(format!(
                    "'{suffix}' is not an allowed filter on the '{field}' field."
                ))
            })?,
        };

        let mut value = coerce_value(op, raw)?;

        if self.resource.is_stemmable(field) && !stem_lang.is_empty() {
            if let FilterValue::Text(text) = &value {
                value = FilterValue::Text(self.stemmer.stem(text, stem_lang));
            }
        }

        if self.resource.is_autoquery(field) {
            if let FilterValue::Text(text) = value {
                value = FilterValue::Query(text);
            }
        }

        self.whitelist.check(field, op)?;

        Ok(ParsedFilter {
            field: field.to_string(),
            op,
            value,
        })
    }

    /// A key without an operator suffix means `contains` on the search path
    /// and `exact` on the direct path.
    fn default_op(&self) -> Operator {
        match self.resource.path {
            AccessPath::Index { .. } => Operator::Contains,
            AccessPath::Store { .. } => Operator::Exact,
        }
    }
}

/// Coerce a raw parameter value: boolean and null literals first, then
/// list/range decoding for the operators that expect them.
fn coerce_value(op: Operator, raw: &str) -> Result<FilterValue> {
    match raw {
        "true" | "True" => return Ok(FilterValue::Bool(true)),
        "false" | "False" => return Ok(FilterValue::Bool(false)),
        "none" | "None" => return Ok(FilterValue::Null),
        _ => {}
    }

    if matches!(op, Operator::In | Operator::Range) {
        let stripped: String = raw.chars().filter(|c| *c != '[' && *c != ']').collect();
        let items: Vec<String> = stripped.split(',').map(str::to_string).collect();

        if op == Operator::Range {
            if items.len() != 2 {
                return Err(ApiError::InvalidFilter(format!(
                    "'range' requires exactly two comma-separated values, got '{raw}'."
                )));
            }
            return Ok(FilterValue::Range(items[0].clone(), items[1].clone()));
        }
        return Ok(FilterValue::List(items));
    }

    Ok(FilterValue::Text(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StemmingConfig;
    use crate::resource;

    fn stemmer() -> Stemmer {
        Stemmer::new(&StemmingConfig::default())
    }

    fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_operator_is_contains_on_search_path() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser.parse(&filters(&[("lang", "eng")]), "").unwrap();
        assert_eq!(parsed[0].op, Operator::Contains);
        assert_eq!(parsed[0].field, "lang");
    }

    #[test]
    fn test_default_operator_is_exact_on_store_path() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences").unwrap(), &s);
        let parsed = parser.parse(&filters(&[("lang", "eng")]), "").unwrap();
        assert_eq!(parsed[0].op, Operator::Exact);
    }

    #[test]
    fn test_operator_suffix_parsed() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("user_id__gte", "100")]), "")
            .unwrap();
        assert_eq!(parsed[0].op, Operator::Gte);
        assert_eq!(parsed[0].value, FilterValue::Text("100".into()));
    }

    #[test]
    fn test_boolean_and_null_coercion() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(
                &filters(&[("has_audio", "True"), ("unapproved", "false")]),
                "",
            )
            .unwrap();
        let by_field: BTreeMap<_, _> = parsed
            .iter()
            .map(|f| (f.field.as_str(), f.value.clone()))
            .collect();
        assert_eq!(by_field["has_audio"], FilterValue::Bool(true));
        assert_eq!(by_field["unapproved"], FilterValue::Bool(false));

        let parsed = parser.parse(&filters(&[("owner", "none")]), "").unwrap();
        assert_eq!(parsed[0].value, FilterValue::Null);
    }

    #[test]
    fn test_in_list_brackets_stripped() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("user_id__in", "[1,2,3]")]), "")
            .unwrap();
        assert_eq!(
            parsed[0].value,
            FilterValue::List(vec!["1".into(), "2".into(), "3".into()])
        );
    }

    #[test]
    fn test_range_requires_two_values() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let ok = parser
            .parse(&filters(&[("user_id__range", "[10,20]")]), "")
            .unwrap();
        assert_eq!(ok[0].value, FilterValue::Range("10".into(), "20".into()));

        let err = parser
            .parse(&filters(&[("user_id__range", "[10,20,30]")]), "")
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidFilter(_)));
    }

    #[test]
    fn test_unknown_field_named_in_error() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let err = parser
            .parse(&filters(&[("unknownfield", "foo")]), "")
            .unwrap_err();
        assert!(err.to_string().contains("unknownfield"));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let err = parser
            .parse(&filters(&[("lang__like", "eng")]), "")
            .unwrap_err();
        assert!(err.to_string().contains("like"));
    }

    #[test]
    fn test_excluded_text_field_rejected() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        assert!(parser.parse(&filters(&[("text", "hello")]), "").is_err());
    }

    #[test]
    fn test_stemmable_field_stemmed_with_lang() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("sentence_text_stemmed", "running")]), "eng")
            .unwrap();
        // Stemmed, then wrapped as an auto-query expression.
        assert_eq!(parsed[0].value, FilterValue::Query("run".into()));
    }

    #[test]
    fn test_stemmable_field_unchanged_without_lang() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("sentence_text_stemmed", "running")]), "")
            .unwrap();
        assert_eq!(parsed[0].value, FilterValue::Query("running".into()));
    }

    #[test]
    fn test_autoquery_wrap() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("tags", "animals")]), "")
            .unwrap();
        assert_eq!(parsed[0].value, FilterValue::Query("animals".into()));
    }

    #[test]
    fn test_non_autoquery_field_stays_text() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("users_search").unwrap(), &s);
        let parsed = parser
            .parse(&filters(&[("username", "alice")]), "")
            .unwrap();
        assert_eq!(parsed[0].value, FilterValue::Text("alice".into()));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let s = stemmer();
        let parser = FilterParser::new(resource::find("sentences_search").unwrap(), &s);
        let input = filters(&[("lang", "eng"), ("user_id__gte", "5")]);
        assert_eq!(
            parser.parse(&input, "eng").unwrap(),
            parser.parse(&input, "eng").unwrap()
        );
    }
}
