//! Prompt templates for subjective fields
//!
//! Each field has an ordered list of template variants; attempt *n* uses
//! variant `min(n - 1, len - 1)`, so retries move to progressively simpler
//! phrasings. Layers may replace a field's variants wholesale.
//!
//! Placeholders follow the shared template syntax: `{field}` for record
//! values, `{field:label}` for vocabulary labels, plus `{context}` (book
//! text, truncated to the character budget), `{field_label}` and
//! `{max_length}`. A template whose required placeholders cannot be filled
//! falls back to a generic prompt.

use crate::record::MetadataRecord;
use crate::schema::{FieldSchema, FieldSpec};
use crate::strategies::fallback::record_lookup;
use crate::template;
use std::collections::BTreeMap;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You write metadata for a book distribution catalog. \
Reply with the requested value only: no preamble, no quotation marks, no markdown.";

const GENERIC_TEMPLATE: &str = "Write the {field_label} for a book[ titled \"{title}\"][ by {contributor_one}].\
[ Keep it under {max_length} characters.][\n\nBook text:\n{context}]";

const BUILTIN_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "contributor_bio",
        &[
            "Write a third-person biography of {contributor_one}, author of \"{title}\", for a book catalog. \
Use only facts supported by the book text; do not invent awards or credentials. \
Keep it under {max_length} characters.[\n\nBook text:\n{context}]",
            "In two or three plain sentences, describe {contributor_one} as the author of \"{title}\".",
        ],
    ),
    (
        "subject_code",
        &[
            "Choose the single best BISAC subject code for the book \"{title}\"[ by {contributor_one}]. \
Reply with the nine-character code only, for example FIC019000.[\n\nSummary:\n{annotation}][\n\nBook text:\n{context}]",
            "Reply with one BISAC code (three capital letters followed by six digits) for \"{title}\". No other text.",
        ],
    ),
    (
        "subject_code_2",
        &[
            "Choose a secondary BISAC subject code for the book \"{title}\", different from {subject_code}. \
Reply with the nine-character code only.[\n\nBook text:\n{context}]",
        ],
    ),
    (
        "subject_code_3",
        &[
            "Choose a third BISAC subject code for the book \"{title}\", different from {subject_code} and {subject_code_2}. \
Reply with the nine-character code only.",
        ],
    ),
    (
        "keywords",
        &[
            "List up to seven search keywords for the book \"{title}\", separated by semicolons. \
No numbering.[\n\nBook text:\n{context}]",
        ],
    ),
    (
        "short_description",
        &[
            "Write a one-sentence retail description of \"{title}\"[ by {contributor_one}], under {max_length} characters.\
[\n\nBook text:\n{context}]",
            "Summarize \"{title}\" in under {max_length} characters.",
        ],
    ),
    (
        "annotation",
        &[
            "Write a catalog summary of \"{title}\"[ by {contributor_one}] in two or three paragraphs, \
under {max_length} characters. Describe the content without marketing superlatives.[\n\nBook text:\n{context}]",
            "Write a single-paragraph summary of \"{title}\" under {max_length} characters.",
        ],
    ),
    (
        "table_of_contents",
        &["List the chapter titles of \"{title}\", one per line, as they appear in the book text.\n\nBook text:\n{context}"],
    ),
];

/// Prompt built for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub variant: usize,
    pub system: String,
    pub user: String,
}

/// Per-field prompt templates
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    system_prompt: String,
    templates: BTreeMap<String, Vec<String>>,
    context_char_budget: usize,
}

impl PromptTemplates {
    pub fn builtin() -> Self {
        let templates = BUILTIN_TEMPLATES
            .iter()
            .map(|(field, variants)| {
                (
                    field.to_string(),
                    variants.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            templates,
            context_char_budget: 40_000,
        }
    }

    /// Replace variants for the given fields
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Vec<String>>) -> Self {
        self.templates.extend(overrides);
        self
    }

    pub fn with_context_budget(mut self, chars: usize) -> Self {
        self.context_char_budget = chars;
        self
    }

    pub fn variants(&self, field: &str) -> Option<&[String]> {
        self.templates.get(field).map(Vec::as_slice)
    }

    pub fn variant_count(&self, field: &str) -> usize {
        self.variants(field).map_or(1, <[String]>::len).max(1)
    }

    /// Prompt for a 1-based attempt number
    pub fn render(
        &self,
        spec: &FieldSpec,
        attempt_number: u32,
        record: &MetadataRecord,
        schema: &FieldSchema,
        context: Option<&str>,
    ) -> RenderedPrompt {
        let variant = (attempt_number.saturating_sub(1) as usize).min(self.variant_count(&spec.name) - 1);
        let context = context
            .map(|text| truncate_chars(text, self.context_char_budget))
            .filter(|text| !text.trim().is_empty());

        let lookup = |name: &str| -> Option<String> {
            match name {
                "context" => context.clone(),
                "field_label" => Some(spec.label()),
                "max_length" => spec.max_length.map(|m| m.to_string()),
                other => record_lookup(record, schema, other),
            }
        };

        let user = self
            .variants(&spec.name)
            .and_then(|variants| variants.get(variant))
            .and_then(|tpl| template::render(tpl, &lookup))
            .or_else(|| template::render(GENERIC_TEMPLATE, &lookup))
            .unwrap_or_else(|| format!("Write the {} for this book.", spec.label()));

        RenderedPrompt {
            variant,
            system: self.system_prompt.clone(),
            user,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (FieldSchema, MetadataRecord) {
        let schema = FieldSchema::builtin().unwrap();
        let record = MetadataRecord::new()
            .with_field("title", "Atlas of Rain")
            .with_field("contributor_one", "Mara Quell");
        (schema, record)
    }

    #[test]
    fn test_variant_selection_clamps() {
        let (schema, record) = setup();
        let prompts = PromptTemplates::builtin();
        let spec = schema.get("contributor_bio").unwrap();

        assert_eq!(prompts.render(spec, 1, &record, &schema, None).variant, 0);
        assert_eq!(prompts.render(spec, 2, &record, &schema, None).variant, 1);
        assert_eq!(prompts.render(spec, 7, &record, &schema, None).variant, 1);
    }

    #[test]
    fn test_record_values_and_context_substituted() {
        let (schema, record) = setup();
        let prompts = PromptTemplates::builtin();
        let spec = schema.get("contributor_bio").unwrap();
        let prompt = prompts.render(spec, 1, &record, &schema, Some("Chapter One. It rained."));
        assert!(prompt.user.contains("Mara Quell"));
        assert!(prompt.user.contains("\"Atlas of Rain\""));
        assert!(prompt.user.contains("Chapter One. It rained."));
        assert!(prompt.user.contains("2000 characters"));
        assert_eq!(prompt.system, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_context_truncated_to_budget() {
        let (schema, record) = setup();
        let prompts = PromptTemplates::builtin().with_context_budget(5);
        let spec = schema.get("keywords").unwrap();
        let prompt = prompts.render(spec, 1, &record, &schema, Some("abcdefghij"));
        assert!(prompt.user.contains("abcde"));
        assert!(!prompt.user.contains("abcdef"));
    }

    #[test]
    fn test_missing_required_placeholder_uses_generic() {
        let (schema, _) = setup();
        let record = MetadataRecord::new().with_field("title", "Atlas of Rain");
        let prompts = PromptTemplates::builtin();
        let spec = schema.get("contributor_bio").unwrap();
        let prompt = prompts.render(spec, 1, &record, &schema, None);
        assert!(prompt.user.starts_with("Write the contributor one bio for a book titled"));
    }

    #[test]
    fn test_layer_overrides_replace_variants() {
        let (schema, record) = setup();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "contributor_bio".to_string(),
            vec!["Bio for {contributor_one}.".to_string()],
        );
        let prompts = PromptTemplates::builtin().with_overrides(overrides);
        let spec = schema.get("contributor_bio").unwrap();
        assert_eq!(prompts.variant_count("contributor_bio"), 1);
        assert_eq!(
            prompts.render(spec, 3, &record, &schema, None).user,
            "Bio for Mara Quell."
        );
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
