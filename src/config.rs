use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Persisted settings. Every field is optional; absent fields fall back to
/// the defaults above (and to the CLI arguments, which win over the file).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub docs_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("could not determine config directory"))?;
        Ok(config_dir.join("docent").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.backend_url.is_none());
        assert!(config.request_timeout_secs.is_none());
        assert!(config.docs_dir.is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docent").join("config.json");

        let config = Config {
            backend_url: Some("http://10.0.0.2:9000".to_string()),
            request_timeout_secs: Some(5),
            docs_dir: Some(PathBuf::from("/srv/book")),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.backend_url.as_deref(), Some("http://10.0.0.2:9000"));
        assert_eq!(loaded.request_timeout_secs, Some(5));
        assert_eq!(loaded.docs_dir, Some(PathBuf::from("/srv/book")));
    }

    #[test]
    fn test_partial_file_leaves_missing_fields_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backend_url": "http://one:1"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend_url.as_deref(), Some("http://one:1"));
        assert!(config.request_timeout_secs.is_none());
        assert!(config.docs_dir.is_none());
    }
}
