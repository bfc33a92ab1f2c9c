//! Search configuration.
//!
//! Defaults match the production service. Values can be overridden from
//! `RXMATCH_*` environment variables or a JSON file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::templates::EMBEDDING_SCAN_CAP;
use crate::strategies::{
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_STRENGTH_BOOST, DEFAULT_STRENGTH_SIMILARITY_THRESHOLD,
};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for one orchestrator and its strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Rows each strategy may return
    pub limit_per_method: usize,
    /// Candidates returned after scoring
    pub top_k: usize,
    /// Per-strategy time budget
    pub strategy_timeout_ms: u64,
    pub embedding_threshold: f64,
    pub embedding_strength_threshold: f64,
    pub embedding_strength_boost: f64,
    /// Embedded rows scanned per embedding query
    pub embedding_scan_cap: usize,
    pub embedding_timeout_ms: u64,
    pub catalog_path: Option<PathBuf>,
    pub synonyms_path: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit_per_method: 5,
            top_k: 10,
            strategy_timeout_ms: 10_000,
            embedding_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            embedding_strength_threshold: DEFAULT_STRENGTH_SIMILARITY_THRESHOLD,
            embedding_strength_boost: DEFAULT_STRENGTH_BOOST,
            embedding_scan_cap: EMBEDDING_SCAN_CAP,
            embedding_timeout_ms: 15_000,
            catalog_path: None,
            synonyms_path: None,
            gemini_api_key: None,
        }
    }
}

impl SearchConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("RXMATCH_LIMIT_PER_METHOD") {
            config.limit_per_method = parse("RXMATCH_LIMIT_PER_METHOD", &v)?;
        }
        if let Some(v) = get("RXMATCH_TOP_K") {
            config.top_k = parse("RXMATCH_TOP_K", &v)?;
        }
        if let Some(v) = get("RXMATCH_STRATEGY_TIMEOUT_MS") {
            config.strategy_timeout_ms = parse("RXMATCH_STRATEGY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("RXMATCH_EMBEDDING_THRESHOLD") {
            config.embedding_threshold = parse("RXMATCH_EMBEDDING_THRESHOLD", &v)?;
        }
        if let Some(v) = get("RXMATCH_EMBEDDING_STRENGTH_THRESHOLD") {
            config.embedding_strength_threshold =
                parse("RXMATCH_EMBEDDING_STRENGTH_THRESHOLD", &v)?;
        }
        if let Some(v) = get("RXMATCH_EMBEDDING_STRENGTH_BOOST") {
            config.embedding_strength_boost = parse("RXMATCH_EMBEDDING_STRENGTH_BOOST", &v)?;
        }
        if let Some(v) = get("RXMATCH_EMBEDDING_SCAN_CAP") {
            config.embedding_scan_cap = parse("RXMATCH_EMBEDDING_SCAN_CAP", &v)?;
        }
        if let Some(v) = get("RXMATCH_EMBEDDING_TIMEOUT_MS") {
            config.embedding_timeout_ms = parse("RXMATCH_EMBEDDING_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("RXMATCH_CATALOG_PATH") {
            config.catalog_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RXMATCH_SYNONYMS_PATH") {
            config.synonyms_path = Some(PathBuf::from(v));
        }
        config.gemini_api_key = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));

        Ok(config)
    }

    /// Defaults overridden by a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.limit_per_method, 5);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.strategy_timeout(), Duration::from_secs(10));
        assert_eq!(config.embedding_threshold, 0.7);
        assert_eq!(config.embedding_strength_threshold, 0.6);
        assert_eq!(config.embedding_scan_cap, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let config = SearchConfig::from_lookup(lookup(&[
            ("RXMATCH_TOP_K", " 3 "),
            ("RXMATCH_STRATEGY_TIMEOUT_MS", "250"),
            ("RXMATCH_CATALOG_PATH", "/tmp/catalog.db"),
            ("GOOGLE_API_KEY", "g-key"),
        ]))
        .unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.strategy_timeout(), Duration::from_millis(250));
        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/catalog.db")));
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(config.limit_per_method, 5);
    }

    #[test]
    fn test_gemini_key_takes_precedence() {
        let config = SearchConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "gem"),
            ("GOOGLE_API_KEY", "goo"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("gem"));
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = SearchConfig::from_lookup(lookup(&[("RXMATCH_TOP_K", "ten")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RXMATCH_TOP_K"));
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"top_k": 4, "embedding_threshold": 0.8}}"#).unwrap();
        let config = SearchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.embedding_threshold, 0.8);
        assert_eq!(config.limit_per_method, 5);
    }
}
