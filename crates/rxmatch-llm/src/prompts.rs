//! Prompts for prescription image extraction.
//!
//! The vision model is asked for raw JSON in the shape
//! [`crate::PrescriptionExtraction`] parses.

/// System prompt for prescription reading.
pub const SYSTEM_PROMPT: &str = r#"You read handwritten and printed medical prescriptions for a pharmacist who reviews every answer.

Rules:
- Report only what the prescription shows. Do not guess missing details.
- Keep spelling, abbreviations and capitalization exactly as written.
- Write numbers and units exactly as written (500mg, 0.5 %, 2 tabs).
- Give a certainty from 0 to 100 for the prescriber, the patient and each medication.
- Answer with raw JSON only: no markdown, no commentary."#;

/// JSON shape the model must return.
pub const RESPONSE_SCHEMA: &str = r#"{
  "prescriber": {
    "full_name": "string or null",
    "npi_number": "string or null",
    "dea_number": "string or null",
    "certainty": "number or null"
  },
  "patient": {
    "full_name": "string or null",
    "date_of_birth": "string or null",
    "certainty": "number or null"
  },
  "date_prescription_written": "string or null",
  "medications": [
    {
      "drug_name": "string or null",
      "strength": "string or null",
      "instructions_for_use": "string or null",
      "quantity": "string or null",
      "days_of_use": "string or null",
      "refills": "string or null",
      "rxcui": "string or null",
      "brand_drug": "string or null",
      "sig_english": "string or null",
      "certainty": "number or null"
    }
  ]
}"#;

/// User prompt sent with the prescription image.
///
/// `retry_feedback` carries the parse error from a previous attempt.
pub fn make_extraction_prompt(retry_feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "Extract every medication from this prescription image.\n\n\
         For each medication give the drug name, the strength and the directions \
         for use as written. Also write patient-facing directions in sig_english \
         with a verb, quantity, route and frequency.\n\n\
         Return JSON with exactly this structure:\n\n{RESPONSE_SCHEMA}"
    );
    if let Some(feedback) = retry_feedback.map(str::trim).filter(|f| !f.is_empty()) {
        prompt.push_str(&format!(
            "\n\nYour previous answer could not be used: {feedback}\nReturn corrected JSON only."
        ));
    }
    prompt
}
