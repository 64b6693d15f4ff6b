//! Field Name Normalizer
//!
//! Maps the many spellings collaborators use for the same catalog field
//! ("Number of Pages", "page-count", "PAGES") onto one canonical key.
//!
//! # Algorithm
//! 1. Lowercase
//! 2. Punctuation and underscores become spaces; whitespace collapses
//! 3. Stop words are dropped (unless every token is a stop word)
//! 4. Remaining tokens join with `_`
//! 5. Known synonyms map to their canonical key
//!
//! Tables are fixed when the normalizer is built and never change afterwards,
//! so `normalize` is pure for the lifetime of the engine.

use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Stop words dropped from field names
pub const DEFAULT_STOP_WORDS: &[&str] = &["the", "of", "for", "a", "an", "to", "in", "on"];

/// Built-in synonym table (variant → canonical key)
///
/// Variants are normalized with the stop-word rules before insertion, so any
/// spelling that reduces to the same tokens matches.
pub const DEFAULT_SYNONYMS: &[(&str, &str)] = &[
    ("isbn 13", "isbn"),
    ("isbn or sku", "isbn"),
    ("ean", "isbn"),
    ("isbn10", "isbn_10"),
    ("book title", "title"),
    ("full title", "title"),
    ("author", "contributor_one"),
    ("author name", "contributor_one"),
    ("contributor 1", "contributor_one"),
    ("contributor 1 role", "contributor_one_role"),
    ("author bio", "contributor_bio"),
    ("author biography", "contributor_bio"),
    ("biography", "contributor_bio"),
    ("contributor one bio", "contributor_bio"),
    ("contributor 2", "contributor_two"),
    ("contributor 3", "contributor_three"),
    ("bisac", "subject_code"),
    ("bisac code", "subject_code"),
    ("bisac category", "subject_code"),
    ("bisac subject", "subject_code"),
    ("bisac category 2", "subject_code_2"),
    ("bisac category 3", "subject_code_3"),
    ("summary", "annotation"),
    ("description", "annotation"),
    ("long description", "annotation"),
    ("annotation summary", "annotation"),
    ("pages", "page_count"),
    ("number pages", "page_count"),
    ("trim", "trim_size"),
    ("spine", "spine_width"),
    ("spine width in", "spine_width"),
    ("weight lbs", "weight"),
    ("pub date", "publication_date"),
    ("publish date", "publication_date"),
    ("on sale date", "street_date"),
    ("base price", "list_price"),
    ("price", "list_price"),
    ("base list price", "list_price"),
    ("us price", "us_list_price"),
    ("us suggested list price", "us_list_price"),
    ("uk suggested list price", "uk_list_price"),
    ("eu suggested list price", "eu_list_price"),
    ("lang", "language"),
    ("language code", "language"),
    ("cover file", "cover_path"),
    ("cover file path", "cover_path"),
    ("interior file", "interior_path"),
    ("interior file path", "interior_path"),
    ("jacket file", "jacket_path"),
    ("keyword", "keywords"),
    ("toc", "table_of_contents"),
];

/// Canonicalizes free-form field names
#[derive(Debug, Clone)]
pub struct FieldNameNormalizer {
    stop_words: HashSet<String>,
    synonyms: HashMap<String, String>,
}

impl FieldNameNormalizer {
    pub fn builder() -> NormalizerBuilder {
        NormalizerBuilder::default()
    }

    /// Built-in tables only
    pub fn builtin() -> Self {
        Self::builder().build()
    }

    /// Canonical key for a field name
    pub fn normalize(&self, name: &str) -> String {
        let key = token_key(name, &self.stop_words);
        self.synonyms.get(&key).cloned().unwrap_or(key)
    }

    pub fn synonym_count(&self) -> usize {
        self.synonyms.len()
    }
}

impl Default for FieldNameNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Builder for [`FieldNameNormalizer`]
#[derive(Debug, Clone, Default)]
pub struct NormalizerBuilder {
    extra_stop_words: Vec<String>,
    extra_synonyms: Vec<(String, String)>,
    canonical_names: Vec<String>,
}

impl NormalizerBuilder {
    pub fn stop_word(mut self, word: impl Into<String>) -> Self {
        self.extra_stop_words.push(word.into());
        self
    }

    pub fn synonym(mut self, variant: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.extra_synonyms.push((variant.into(), canonical.into()));
        self
    }

    /// Register schema field names so each normalizes to itself
    ///
    /// A canonical name that is also a synonym variant stays canonical.
    pub fn canonical_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.canonical_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> FieldNameNormalizer {
        let mut stop_words: HashSet<String> =
            DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect();
        stop_words.extend(self.extra_stop_words.iter().map(|w| w.trim().to_lowercase()));

        let mut synonyms = HashMap::new();
        let builtin = DEFAULT_SYNONYMS
            .iter()
            .map(|(v, c)| (v.to_string(), c.to_string()));
        for (variant, canonical) in builtin.chain(self.extra_synonyms) {
            synonyms.insert(token_key(&variant, &stop_words), canonical);
        }

        for name in &self.canonical_names {
            if let Some(previous) = synonyms.remove(name) {
                if &previous != name {
                    debug!(field = %name, shadowed = %previous, "Canonical name shadows synonym");
                }
            }
            let key = token_key(name, &stop_words);
            if &key != name {
                synonyms.insert(key, name.clone());
            }
        }

        FieldNameNormalizer {
            stop_words,
            synonyms,
        }
    }
}

fn token_key(name: &str, stop_words: &HashSet<String>) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let kept: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !stop_words.contains(*t))
        .collect();

    if kept.is_empty() {
        tokens.join("_")
    } else {
        kept.join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_normalization() {
        let normalizer = FieldNameNormalizer::builtin();
        assert_eq!(normalizer.normalize("Page-Count"), "page_count");
        assert_eq!(normalizer.normalize("  Trim   Size "), "trim_size");
        assert_eq!(normalizer.normalize("Number of Pages"), "page_count");
        assert_eq!(normalizer.normalize("ISBN-13"), "isbn");
    }

    #[test]
    fn test_synonyms_collapse_to_one_key() {
        let normalizer = FieldNameNormalizer::builtin();
        for variant in ["Author Bio", "author_biography", "BIOGRAPHY", "Contributor One BIO"] {
            assert_eq!(normalizer.normalize(variant), "contributor_bio", "{}", variant);
        }
    }

    #[test]
    fn test_all_stop_words_kept() {
        let normalizer = FieldNameNormalizer::builtin();
        assert_eq!(normalizer.normalize("The Of"), "the_of");
    }

    #[test]
    fn test_canonical_names_are_fixed_points() {
        let normalizer = FieldNameNormalizer::builder()
            .canonical_names(["table_of_contents", "summary", "page_count"])
            .build();
        assert_eq!(normalizer.normalize("table_of_contents"), "table_of_contents");
        assert_eq!(normalizer.normalize("Table of Contents"), "table_of_contents");
        // A schema field named like a synonym variant keeps its own name
        assert_eq!(normalizer.normalize("summary"), "summary");
    }

    #[test]
    fn test_custom_tables() {
        let normalizer = FieldNameNormalizer::builder()
            .stop_word("field")
            .synonym("Imprint Brand", "imprint")
            .build();
        assert_eq!(normalizer.normalize("Imprint Brand Field"), "imprint");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let normalizer = FieldNameNormalizer::builtin();
        let first = normalizer.normalize("On-Sale Date");
        for _ in 0..10 {
            assert_eq!(normalizer.normalize("On-Sale Date"), first);
        }
        assert_eq!(first, "street_date");
    }
}
