//! Drug synonym table.
//!
//! Pairs are stored in both directions (`a -> b` and `b -> a`); lookups never
//! chase synonyms of synonyms.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use thiserror::Error;
use tracing::{info, warn};

/// Synonym source errors.
#[derive(Error, Debug)]
pub enum SynonymError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] calamine::Error),

    #[error("Spreadsheet has no worksheet")]
    NoWorksheet,
}

pub type SynonymResult<T> = Result<T, SynonymError>;

/// Extensions read as spreadsheets rather than delimited text.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read-only bidirectional synonym lookup.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    /// Lowercased name → lowercased alternates
    map: BTreeMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    /// Build from `(name, alternate)` pairs. Blank and identical pairs are skipped.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut table = Self::default();
        for (a, b) in pairs {
            table.insert(a.as_ref(), b.as_ref());
        }
        table
    }

    /// Load a two-column synonym export whose first row is a header.
    ///
    /// A missing or unreadable source yields an empty table.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        Self::load_with(path, true)
    }

    /// Load a two-column synonym export, logging and returning an empty table
    /// on failure.
    pub fn load_with<P: AsRef<Path>>(path: P, has_header: bool) -> Self {
        let path = path.as_ref();
        match Self::try_load(path, has_header) {
            Ok(table) => {
                info!(path = %path.display(), entries = table.len(), "loaded synonyms");
                table
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "synonyms unavailable, synonym search disabled");
                Self::default()
            }
        }
    }

    /// Load from a spreadsheet (first worksheet) or a CSV/TSV file.
    ///
    /// Only the first two columns are read; shorter rows are skipped.
    pub fn try_load<P: AsRef<Path>>(path: P, has_header: bool) -> SynonymResult<Self> {
        let path = path.as_ref();
        let is_spreadsheet = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SPREADSHEET_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        let pairs = if is_spreadsheet {
            read_spreadsheet(path, has_header)?
        } else {
            read_delimited(&fs::read_to_string(path)?, has_header)?
        };
        Ok(Self::from_pairs(pairs))
    }

    /// Add a pair in both directions.
    pub fn insert(&mut self, a: &str, b: &str) {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a.is_empty() || b.is_empty() || a == b {
            return;
        }
        self.map.entry(a.clone()).or_default().insert(b.clone());
        self.map.entry(b).or_default().insert(a);
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Alternates for `name`: direct entries plus those of every key that
    /// contains, or is contained in, the lowercased name. Sorted, no duplicates.
    pub fn get_synonyms(&self, name: &str) -> Vec<String> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut found = BTreeSet::new();
        for (key, values) in &self.map {
            if key.contains(&query) || query.contains(key.as_str()) {
                found.extend(values.iter().cloned());
            }
        }
        found.into_iter().collect()
    }
}

/// First two cells of each CSV or TSV record. Tab-delimited when the first
/// line contains a tab.
fn read_delimited(text: &str, has_header: bool) -> SynonymResult<Vec<(String, String)>> {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let delimiter = if first_line.contains('\t') { b'\t' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(a), Some(b)) = (record.get(0), record.get(1)) {
            pairs.push((a.to_string(), b.to_string()));
        }
    }
    Ok(pairs)
}

/// First two cells of each row of the first worksheet.
fn read_spreadsheet(path: &Path, has_header: bool) -> SynonymResult<Vec<(String, String)>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SynonymError::NoWorksheet)??;

    Ok(range
        .rows()
        .skip(usize::from(has_header))
        .filter_map(|row| match row {
            [a, b, ..] => Some((a.to_string(), b.to_string())),
            _ => None,
        })
        .collect())
}
