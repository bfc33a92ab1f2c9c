//! Drug catalog models.

use serde::{Deserialize, Serialize};

/// One drug concept row in the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogDrug {
    /// RxCUI - concept identifier, may be missing in dirty imports
    pub rxcui: Option<String>,
    /// Short display name (e.g., "metformin")
    pub name: Option<String>,
    /// Fully specified name (e.g., "metformin hydrochloride 500 MG Oral Tablet")
    pub full_name: Option<String>,
    pub generic_name: Option<String>,
    /// Brand name for branded term types (e.g., "Glucophage")
    pub brand_name: Option<String>,
    /// Strength as written in the catalog (e.g., "500 MG")
    pub strength: Option<String>,
    pub route: Option<String>,
    pub dose_form: Option<String>,
    /// RxNorm term type code (SBD, SCD, BPCK, ...)
    pub term_type: Option<String>,
    /// Precomputed name embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl CatalogDrug {
    /// Create a catalog drug with the required fields.
    pub fn new(rxcui: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            rxcui: Some(rxcui.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn full_name(mut self, value: impl Into<String>) -> Self {
        self.full_name = Some(value.into());
        self
    }

    pub fn generic_name(mut self, value: impl Into<String>) -> Self {
        self.generic_name = Some(value.into());
        self
    }

    pub fn brand_name(mut self, value: impl Into<String>) -> Self {
        self.brand_name = Some(value.into());
        self
    }

    pub fn strength(mut self, value: impl Into<String>) -> Self {
        self.strength = Some(value.into());
        self
    }

    pub fn route(mut self, value: impl Into<String>) -> Self {
        self.route = Some(value.into());
        self
    }

    pub fn dose_form(mut self, value: impl Into<String>) -> Self {
        self.dose_form = Some(value.into());
        self
    }

    pub fn term_type(mut self, value: impl Into<String>) -> Self {
        self.term_type = Some(value.into());
        self
    }

    pub fn embedding(mut self, value: Vec<f32>) -> Self {
        self.embedding = Some(value);
        self
    }
}
