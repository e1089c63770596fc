use crate::error::{EngineError, Result};
use crate::tokenizer::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What the text operator returns for an empty text clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTextPolicy {
    #[default]
    MatchNothing,
    /// Every indexed document with score 1.0, in identifier order, up to the cap.
    MatchAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding index generations and the `CURRENT` pointer.
    pub index_root: PathBuf,
    /// Directory of `<id>.txt` documents.
    pub docs_dir: PathBuf,
    /// Join key: relational column and index identifier field.
    pub key_field: String,
    pub language: Language,
    pub max_results: usize,
    /// Keyword separating the relational clause from the text clause.
    pub separator: String,
    pub empty_text: EmptyTextPolicy,
    pub bm25: Bm25Params,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_root: PathBuf::from("./index"),
            docs_dir: PathBuf::from("./docs"),
            key_field: "id".to_string(),
            language: Language::French,
            max_results: 100,
            separator: "WITH".to_string(),
            empty_text: EmptyTextPolicy::default(),
            bm25: Bm25Params::default(),
        }
    }
}

impl EngineConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(index_root: P, docs_dir: Q, key_field: &str) -> Self {
        Self {
            index_root: index_root.as_ref().to_path_buf(),
            docs_dir: docs_dir.as_ref().to_path_buf(),
            key_field: key_field.to_string(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: EngineConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("cannot parse {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let key = self.key_field.trim();
        if key.is_empty() {
            return Err(EngineError::Config("key_field must not be empty".into()));
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(EngineError::Config(format!("key_field `{key}` is not a plain column name")));
        }
        if self.max_results == 0 {
            return Err(EngineError::Config("max_results must be at least 1".into()));
        }
        if self.separator.trim().is_empty() || self.separator.chars().any(char::is_whitespace) {
            return Err(EngineError::Config("separator must be a single non-empty word".into()));
        }
        if self.bm25.k1.is_nan() || self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(EngineError::Config(format!("invalid BM25 parameters {:?}", self.bm25)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.max_results, 100);
        assert_eq!(cfg.empty_text, EmptyTextPolicy::MatchNothing);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"key_field":"id_site","empty_text":"match_all"}"#).unwrap();
        assert_eq!(cfg.key_field, "id_site");
        assert_eq!(cfg.empty_text, EmptyTextPolicy::MatchAll);
        assert_eq!(cfg.separator, "WITH");
    }

    #[test]
    fn rejects_bad_key_and_cap() {
        let mut cfg = EngineConfig::new("/tmp/i", "/tmp/d", "id site");
        assert!(cfg.validate().is_err());
        cfg.key_field = "id_site".into();
        cfg.max_results = 0;
        assert!(cfg.validate().is_err());
    }
}
