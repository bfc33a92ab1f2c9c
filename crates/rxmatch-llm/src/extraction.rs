//! Prescription extraction parsing.
//!
//! The vision model answers with a JSON document describing the prescriber,
//! the patient and each medication. Models wrap that JSON in prose or
//! markdown fences and occasionally leave trailing commas; parsing tolerates
//! all three.

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use rxmatch_core::{DrugQuery, SafetyContext};

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Missing required section: {0}")]
    MissingSection(&'static str),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Top-level sections every extraction must carry.
pub const REQUIRED_SECTIONS: [&str; 3] = ["prescriber", "patient", "medications"];

/// Structured read of one prescription image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionExtraction {
    #[serde(default)]
    pub prescriber: Option<Prescriber>,
    #[serde(default)]
    pub patient: Option<Patient>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_prescription_written: Option<String>,
    #[serde(default)]
    pub medications: Vec<PrescriptionDrug>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prescriber {
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub npi_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dea_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub certainty: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_of_birth: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub certainty: Option<f64>,
}

/// One medication line as read from the prescription.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionDrug {
    #[serde(default, deserialize_with = "lenient_string")]
    pub drug_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub strength: Option<String>,
    /// Directions exactly as written (abbreviated sig)
    #[serde(default, deserialize_with = "lenient_string")]
    pub instructions_for_use: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub days_of_use: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub refills: Option<String>,
    /// RxCUI suggested by the model, unverified
    #[serde(default, deserialize_with = "lenient_string")]
    pub rxcui: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand_drug: Option<String>,
    /// Patient-facing directions
    #[serde(default, deserialize_with = "lenient_string")]
    pub sig_english: Option<String>,
    /// Model certainty, 0 - 100
    #[serde(default, deserialize_with = "lenient_number")]
    pub certainty: Option<f64>,
}

impl PrescriptionDrug {
    /// Search input for this medication, or `None` without a usable name.
    pub fn to_query(&self) -> Option<DrugQuery> {
        let name = self.drug_name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        let mut query = DrugQuery::new(name);
        query.strength = self.strength.clone();
        query.instructions = self
            .instructions_for_use
            .clone()
            .or_else(|| self.sig_english.clone());
        Some(query)
    }
}

impl PrescriptionExtraction {
    /// Search inputs for every named medication, in prescription order.
    pub fn to_queries(&self, safety_context: Option<&SafetyContext>) -> Vec<DrugQuery> {
        self.medications
            .iter()
            .filter_map(|drug| {
                let query = drug.to_query();
                if query.is_none() {
                    debug!(?drug, "skipping medication without a name");
                }
                query
            })
            .map(|mut query| {
                query.safety_context = safety_context.cloned();
                query
            })
            .collect()
    }
}

/// Parse a vision-model response into a prescription extraction.
pub fn parse_extraction(response: &str) -> ExtractionResult<PrescriptionExtraction> {
    let body = strip_code_fences(response);
    let json_start = body.find('{').ok_or_else(|| {
        ExtractionError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = body.rfind('}').ok_or_else(|| {
        ExtractionError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ExtractionError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let json_slice = &body[json_start..=json_end];
    let value: Value = match serde_json::from_str(json_slice) {
        Ok(value) => value,
        Err(first) => {
            let repaired = strip_trailing_commas(json_slice);
            serde_json::from_str(&repaired).map_err(|_| first)?
        }
    };

    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidFormat("Response is not a JSON object".into()))?;
    for section in REQUIRED_SECTIONS {
        if !object.contains_key(section) {
            return Err(ExtractionError::MissingSection(section));
        }
    }
    if !object["medications"].is_array() {
        return Err(ExtractionError::InvalidFormat(
            "medications is not a list".into(),
        ));
    }

    let extraction: PrescriptionExtraction = serde_json::from_value(value)?;
    debug!(
        medications = extraction.medications.len(),
        "parsed prescription extraction"
    );
    Ok(extraction)
}

/// Contents of the first fenced block, or the input when it has none.
fn strip_code_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => {
            warn!("unterminated code fence in model response");
            body
        }
    }
}

/// Drop commas that directly precede a closing bracket, outside strings.
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Strings stay strings, numbers and booleans are stringified, blanks are `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty() && !s.eq_ignore_ascii_case("null")).then(|| s.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Numbers or numeric strings ("95", "95%"); anything else is `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("number out of range")),
        Some(Value::String(s)) => Ok(s.trim().trim_end_matches('%').trim().parse().ok()),
        _ => Ok(None),
    }
}

/// Text-only stand-in for the vision model, for tests.
///
/// Each non-empty line is one medication: the drug name, then a strength
/// starting with a digit, then free-text directions.
pub struct MockExtractor;

impl MockExtractor {
    pub fn extract(text: &str) -> PrescriptionExtraction {
        let medications = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_line)
            .collect();
        PrescriptionExtraction {
            prescriber: Some(Prescriber::default()),
            patient: Some(Patient::default()),
            date_prescription_written: None,
            medications,
        }
    }

    /// Render an extraction the way the vision model would, wrapped in a fence.
    pub fn respond(text: &str) -> String {
        let extraction = Self::extract(text);
        let json = serde_json::to_string_pretty(&extraction).unwrap_or_else(|_| "{}".into());
        format!("Here is the prescription:\n```json\n{json}\n```")
    }
}

const STRENGTH_UNITS: [&str; 8] = ["mg", "mcg", "g", "ml", "%", "units", "meq", "iu"];

fn parse_line(line: &str) -> PrescriptionDrug {
    let words: Vec<&str> = line.split_whitespace().collect();
    let strength_at = words
        .iter()
        .position(|w| w.starts_with(|c: char| c.is_ascii_digit() || c == '.'));

    let Some(at) = strength_at else {
        return PrescriptionDrug {
            drug_name: Some(line.to_string()),
            ..Default::default()
        };
    };

    // A bare number takes the following unit word with it ("500 mg").
    let unit_follows = words
        .get(at + 1)
        .map(|w| STRENGTH_UNITS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false);
    let strength_end = if unit_follows { at + 2 } else { at + 1 };

    let name = words[..at].join(" ");
    let instructions = words[strength_end..].join(" ");
    PrescriptionDrug {
        drug_name: (!name.is_empty()).then_some(name),
        strength: Some(words[at..strength_end].join(" ")),
        instructions_for_use: (!instructions.is_empty()).then_some(instructions),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RESPONSE: &str = r#"{
        "prescriber": {"full_name": "Dr. A", "npi_number": 1234567890, "certainty": "90"},
        "patient": {"full_name": "J. Doe", "certainty": 85},
        "date_prescription_written": "2024-03-01",
        "medications": [
            {"drug_name": "Metformin", "strength": "500mg", "instructions_for_use": "1 tab po bid", "refills": 2, "certainty": 95},
            {"drug_name": null, "strength": "10mg"},
            {"drug_name": "Lisinopril", "strength": "", "sig_english": "Take 1 tablet by mouth daily"}
        ]
    }"#;

    #[test]
    fn test_parse_extraction() {
        let extraction = parse_extraction(RESPONSE).unwrap();
        assert_eq!(extraction.medications.len(), 3);

        let metformin = &extraction.medications[0];
        assert_eq!(metformin.drug_name.as_deref(), Some("Metformin"));
        assert_eq!(metformin.refills.as_deref(), Some("2"));
        assert_eq!(metformin.certainty, Some(95.0));

        let prescriber = extraction.prescriber.unwrap();
        assert_eq!(prescriber.npi_number.as_deref(), Some("1234567890"));
        assert_eq!(prescriber.certainty, Some(90.0));
        assert_eq!(extraction.medications[2].strength, None);
    }

    #[test]
    fn test_to_queries() {
        let extraction = parse_extraction(RESPONSE).unwrap();
        let mut safety = SafetyContext::new();
        safety.insert("risk".into(), "low".into());

        let queries = extraction.to_queries(Some(&safety));
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].name(), "Metformin");
        assert_eq!(queries[0].strength(), Some("500mg"));
        assert_eq!(queries[0].instructions(), Some("1 tab po bid"));
        assert!(queries[0].safety_context.is_some());

        assert_eq!(queries[1].name(), "Lisinopril");
        assert_eq!(queries[1].strength(), None);
        assert_eq!(queries[1].instructions(), Some("Take 1 tablet by mouth daily"));
    }

    #[test]
    fn test_parse_with_prose_and_fence() {
        let response = format!("Sure! Here it is:\n```json\n{RESPONSE}\n```\nLet me know.");
        let extraction = parse_extraction(&response).unwrap();
        assert_eq!(extraction.medications.len(), 3);
    }

    #[test]
    fn test_parse_repairs_trailing_commas() {
        let response = r#"{"prescriber": {}, "patient": {"full_name": "a, b",}, "medications": [{"drug_name": "x",},],}"#;
        let extraction = parse_extraction(response).unwrap();
        assert_eq!(extraction.medications[0].drug_name.as_deref(), Some("x"));
        assert_eq!(
            extraction.patient.unwrap().full_name.as_deref(),
            Some("a, b")
        );
    }

    #[test]
    fn test_missing_sections() {
        let err = parse_extraction(r#"{"prescriber": {}, "medications": []}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingSection("patient")));

        let err =
            parse_extraction(r#"{"prescriber": {}, "patient": {}, "medications": {}}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidFormat(_)));

        let err = parse_extraction("no json here").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidFormat(_)));
    }

    #[test]
    fn test_mock_extractor() {
        let text = "metformin 500 mg take 1 tablet by mouth twice daily\n\nlisinopril 10mg\nvitamin d";
        let extraction = MockExtractor::extract(text);
        assert_eq!(extraction.medications.len(), 3);

        let first = &extraction.medications[0];
        assert_eq!(first.drug_name.as_deref(), Some("metformin"));
        assert_eq!(first.strength.as_deref(), Some("500 mg"));
        assert_eq!(
            first.instructions_for_use.as_deref(),
            Some("take 1 tablet by mouth twice daily")
        );

        assert_eq!(extraction.medications[1].strength.as_deref(), Some("10mg"));
        assert_eq!(extraction.medications[1].instructions_for_use, None);
        assert_eq!(extraction.medications[2].drug_name.as_deref(), Some("vitamin d"));
        assert_eq!(extraction.medications[2].strength, None);
    }

    #[test]
    fn test_mock_response_round_trips_through_parser() {
        let response = MockExtractor::respond("amoxicillin 500mg 1 cap po tid");
        let queries = parse_extraction(&response).unwrap().to_queries(None);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].name(), "amoxicillin");
        assert_eq!(queries[0].strength(), Some("500mg"));
        assert_eq!(queries[0].instructions(), Some("1 cap po tid"));
    }

    proptest! {
        #[test]
        fn parse_never_panics(s in "\\PC{0,64}") {
            let _ = parse_extraction(&s);
        }

        #[test]
        fn trailing_comma_repair_keeps_valid_json(n in 0usize..5) {
            let items: Vec<String> = (0..n).map(|i| format!("{{\"drug_name\": \"d{i}\"}}")).collect();
            let json = format!(
                "{{\"prescriber\": null, \"patient\": null, \"medications\": [{}]}}",
                items.join(", ")
            );
            prop_assert_eq!(strip_trailing_commas(&json), json.clone());
            let extraction = parse_extraction(&json).unwrap();
            prop_assert_eq!(extraction.medications.len(), n);
        }
    }
}
