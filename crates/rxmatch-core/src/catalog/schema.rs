//! SQLite schema for the drug catalog.

/// Catalog schema. Embeddings are stored as JSON arrays of floats.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS drugs (
    rxcui TEXT UNIQUE,
    name TEXT,
    full_name TEXT,
    generic_name TEXT,
    brand_name TEXT,
    strength TEXT,
    route TEXT,
    dose_form TEXT,
    term_type TEXT,
    embedding TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_drugs_name ON drugs(lower(name));
CREATE INDEX IF NOT EXISTS idx_drugs_term_type ON drugs(term_type);
"#;
