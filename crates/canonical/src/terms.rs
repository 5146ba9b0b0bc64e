//! Taxonomy term normalization.

use std::collections::HashMap;

use crate::text::{decode_entities, sanitize_text};

/// `source -> destination` rename rules, one per line.
///
/// Source names match case-insensitively. Lines without exactly one `->`
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRules {
    map: HashMap<String, String>,
}

impl MappingRules {
    pub fn parse(rules: &str) -> Self {
        let map = rules
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let parts: Vec<&str> = line.split("->").map(str::trim).collect();
                match parts.as_slice() {
                    [from, to] => Some((from.to_lowercase(), to.to_string())),
                    _ => None,
                }
            })
            .collect();
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn apply(&self, term: String) -> String {
        self.map.get(&term.to_lowercase()).cloned().unwrap_or(term)
    }
}

/// Clean a list of incoming term names.
///
/// Decodes character references, strips markup, applies `rules`, optionally
/// lowercases and trims, then drops empties and duplicates (first wins).
///
/// ```
/// use canonical::{normalize_terms, MappingRules};
///
/// let rules = MappingRules::parse("Tech -> Technology");
/// let terms = vec!["tech".to_string(), "Arts &amp; Culture".into(), "TECHNOLOGY".into()];
/// assert_eq!(normalize_terms(&terms, &rules, true), ["technology", "arts & culture"]);
/// ```
pub fn normalize_terms(terms: &[String], rules: &MappingRules, lowercase: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        let mut term = sanitize_text(&decode_entities(term));
        if !rules.is_empty() {
            term = rules.apply(term);
        }
        if lowercase {
            term = term.to_lowercase().trim().to_string();
        }
        if !term.is_empty() && !out.contains(&term) {
            out.push(term);
        }
    }
    out
}
