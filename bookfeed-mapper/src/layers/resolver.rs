//! Configuration resolver
//!
//! Overrides are checked imprint → publisher → global and the first hit
//! wins; only when no layer overrides a field are the default maps checked,
//! in the same order. A field absent from every layer resolves to `None`.

use super::LayerSet;
use crate::types::{FieldValue, Scope};
use serde::Serialize;

/// Which map a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Override,
    Default,
}

/// Resolved configuration value with its source layer
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: FieldValue,
    pub scope: Scope,
    pub kind: ResolutionKind,
}

/// Read-only view over a [`LayerSet`]
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'a> {
    layers: &'a LayerSet,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(layers: &'a LayerSet) -> Self {
        Self { layers }
    }

    /// Override first, then default
    pub fn resolve(&self, field: &str) -> Option<Resolution> {
        self.resolve_override(field)
            .or_else(|| self.resolve_default(field))
    }

    pub fn resolve_override(&self, field: &str) -> Option<Resolution> {
        self.layers.layers().iter().find_map(|layer| {
            layer.override_value(field).map(|value| Resolution {
                value: value.clone(),
                scope: layer.scope(),
                kind: ResolutionKind::Override,
            })
        })
    }

    pub fn resolve_default(&self, field: &str) -> Option<Resolution> {
        self.layers.layers().iter().find_map(|layer| {
            layer.default_value(field).map(|value| Resolution {
                value: value.clone(),
                scope: layer.scope(),
                kind: ResolutionKind::Default,
            })
        })
    }

    /// Lower-precedence overrides hidden by the winning one
    pub fn shadowed_overrides(&self, field: &str) -> Vec<Scope> {
        self.layers
            .layers()
            .iter()
            .filter(|layer| layer.override_value(field).is_some())
            .skip(1)
            .map(|layer| layer.scope())
            .collect()
    }
}
