//! Search input models.

use serde::{Deserialize, Serialize};

/// Opaque safety assessment passed through to scoring.
pub type SafetyContext = serde_json::Map<String, serde_json::Value>;

/// One drug to look up, as extracted from a prescription.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DrugQuery {
    /// Noisy drug name as written on the prescription
    pub drug_name: String,
    /// Free-text strength (e.g., "500mg")
    pub strength: Option<String>,
    /// Free-text prescriber directions (sig)
    pub instructions: Option<String>,
    /// Safety assessment from an upstream agent
    pub safety_context: Option<SafetyContext>,
}

impl DrugQuery {
    pub fn new(drug_name: impl Into<String>) -> Self {
        Self {
            drug_name: drug_name.into(),
            ..Default::default()
        }
    }

    pub fn with_strength(mut self, strength: impl Into<String>) -> Self {
        self.strength = Some(strength.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_safety_context(mut self, context: SafetyContext) -> Self {
        self.safety_context = Some(context);
        self
    }

    /// Drug name with surrounding whitespace removed.
    pub fn name(&self) -> &str {
        self.drug_name.trim()
    }

    /// Strength if present and non-blank.
    pub fn strength(&self) -> Option<&str> {
        non_blank(self.strength.as_deref())
    }

    /// Instructions if present and non-blank.
    pub fn instructions(&self) -> Option<&str> {
        non_blank(self.instructions.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
