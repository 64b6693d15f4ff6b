//! Per-record mapping summary

use crate::strategies::MappingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Strategy chosen for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecision {
    pub field: String,
    #[serde(flatten)]
    pub strategy: MappingStrategy,
}

/// Outcome of one mapping pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSummary {
    pub record_id: Option<Uuid>,
    /// Decisions in resolution order
    pub decisions: Vec<FieldDecision>,
    /// Subjective fields whose completion exhausted without a value
    pub generative_failures: Vec<String>,
    /// Provider calls made during this pass
    pub completion_calls: u32,
    /// Input names dropped because another spelling of the field won
    pub discarded_inputs: Vec<String>,
    pub elapsed_ms: u64,
}

impl MappingSummary {
    pub fn strategy_for(&self, field: &str) -> Option<&MappingStrategy> {
        self.decisions
            .iter()
            .find(|d| d.field == field)
            .map(|d| &d.strategy)
    }

    /// Decision count per strategy label
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for decision in &self.decisions {
            *counts.entry(decision.strategy.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, label: &str) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.strategy.label() == label)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scope;

    #[test]
    fn test_counts_and_lookup() {
        let summary = MappingSummary {
            decisions: vec![
                FieldDecision {
                    field: "title".into(),
                    strategy: MappingStrategy::Passthrough,
                },
                FieldDecision {
                    field: "contributor_bio".into(),
                    strategy: MappingStrategy::Override {
                        scope: Scope::Imprint,
                    },
                },
                FieldDecision {
                    field: "subtitle".into(),
                    strategy: MappingStrategy::Fallback,
                },
            ],
            ..Default::default()
        };
        assert_eq!(summary.count("passthrough"), 1);
        assert_eq!(summary.counts().get("override"), Some(&1));
        assert_eq!(
            summary.strategy_for("contributor_bio").and_then(MappingStrategy::scope),
            Some(Scope::Imprint)
        );
        assert!(summary.strategy_for("isbn").is_none());
    }

    #[test]
    fn test_decision_serializes_flat() {
        let decision = FieldDecision {
            field: "spine_width".into(),
            strategy: MappingStrategy::Computed {
                rule: crate::strategies::ComputedRule::SpineWidth,
            },
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["field"], "spine_width");
        assert_eq!(json["strategy"], "computed");
        assert_eq!(json["rule"]["rule"], "spine_width");
    }
}
