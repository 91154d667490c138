//! Client configuration
//!
//! Resolution order, highest first:
//!   1. explicit `with_*` overrides (CLI flags)
//!   2. `RAGDESK_API_URL` / `RAGDESK_HOME` environment variables
//!   3. `<data_dir>/config.toml`
//!   4. built-in defaults

use crate::{RagdeskError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TOP_K: u8 = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

const CONFIG_FILE: &str = "config.toml";

/// Keys accepted by `ragdesk config set`
pub const SETTABLE_KEYS: &[&str] = &["base_url", "timeout_secs", "default_top_k", "page_size"];

/// Configuration for Ragdesk
#[derive(Debug, Clone)]
pub struct RagdeskConfig {
    /// Base URL of the platform API
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Directory holding config.toml, credentials.json and the TUI log
    pub data_dir: PathBuf,

    /// Number of excerpts requested per question
    pub default_top_k: u8,

    /// Documents per page in the documents view
    pub page_size: u32,
}

/// On-disk shape of config.toml. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigToml {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    default_top_k: Option<u8>,
    page_size: Option<u32>,
}

impl RagdeskConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            data_dir,
            default_top_k: DEFAULT_TOP_K,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Load configuration from `data_dir` (or the default data dir), then
    /// apply environment overrides.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        let mut config = Self::new(data_dir);
        config.merge_file()?;

        if let Ok(url) = std::env::var("RAGDESK_API_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.base_url = url.to_string();
            }
        }

        config.base_url = normalize_base_url(&config.base_url);
        info!(
            "Config resolved: base_url='{}', timeout={:?}, top_k={}, page_size={}",
            config.base_url, config.timeout, config.default_top_k, config.page_size
        );
        Ok(config)
    }

    fn merge_file(&mut self) -> Result<()> {
        let path = self.config_path();
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return Ok(());
        }

        let content = std::fs::read_to_string(&path)?;
        let file: ConfigToml = toml::from_str(&content)?;

        if let Some(url) = file.base_url {
            self.base_url = url;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(k) = file.default_top_k {
            if crate::validation::TopK::new(k).is_ok() {
                self.default_top_k = k;
            } else {
                warn!("Ignoring out-of-range default_top_k={} in {}", k, path.display());
            }
        }
        if let Some(size) = file.page_size {
            self.page_size = size.clamp(1, 100);
        }
        Ok(())
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_top_k(mut self, k: u8) -> Self {
        self.default_top_k = k;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("ragdesk.log")
    }
}

/// Default data directory: `$RAGDESK_HOME`, else `~/.ragdesk`
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("RAGDESK_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| RagdeskError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".ragdesk"))
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Set one key in `<data_dir>/config.toml`, keeping the rest of the file
/// (comments included) untouched.
pub fn write_config_value(data_dir: &Path, key: &str, value: &str) -> Result<()> {
    if !SETTABLE_KEYS.contains(&key) {
        return Err(RagdeskError::Config(format!(
            "Unknown key '{key}'. Allowed: {}",
            SETTABLE_KEYS.join(", ")
        )));
    }

    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(CONFIG_FILE);
    let existing = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let mut doc: toml_edit::DocumentMut = existing.parse()?;
    let item = match key {
        "base_url" => toml_edit::value(normalize_base_url(value)),
        _ => {
            let n: i64 = value.trim().parse().map_err(|_| {
                RagdeskError::Config(format!("'{key}' expects an integer, got '{value}'"))
            })?;
            if key == "default_top_k" && crate::validation::TopK::new_checked(n).is_err() {
                return Err(RagdeskError::Config(format!(
                    "default_top_k must be between {} and {}",
                    crate::validation::TOP_K_MIN,
                    crate::validation::TOP_K_MAX
                )));
            }
            if n < 1 {
                return Err(RagdeskError::Config(format!("'{key}' must be positive")));
            }
            toml_edit::value(n)
        }
    };
    doc[key] = item;

    std::fs::write(&path, doc.to_string())?;
    info!("Updated {} in {}", key, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let mut config = RagdeskConfig::new(dir.path().to_path_buf());
        config.merge_file().unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_top_k, DEFAULT_TOP_K);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_file_values_are_merged() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "base_url = \"https://rag.internal/\"\ntimeout_secs = 5\ndefault_top_k = 8\n",
        )
        .unwrap();

        let mut config = RagdeskConfig::new(dir.path().to_path_buf());
        config.merge_file().unwrap();
        assert_eq!(config.base_url, "https://rag.internal/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.default_top_k, 8);
    }

    #[test]
    fn test_out_of_range_top_k_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "default_top_k = 40\n").unwrap();

        let mut config = RagdeskConfig::new(dir.path().to_path_buf());
        config.merge_file().unwrap();
        assert_eq!(config.default_top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_write_config_preserves_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# platform settings\npage_size = 20\n").unwrap();

        write_config_value(dir.path(), "base_url", "http://10.0.0.5:8000/").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# platform settings"));
        assert!(text.contains("page_size = 20"));
        assert!(text.contains("base_url = \"http://10.0.0.5:8000\""));
    }

    #[test]
    fn test_write_config_rejects_unknown_key() {
        let dir = TempDir::new().unwrap();
        assert!(write_config_value(dir.path(), "model", "x").is_err());
        assert!(write_config_value(dir.path(), "default_top_k", "50").is_err());
    }

    #[test]
    fn test_builder_normalizes_url() {
        let config = RagdeskConfig::new(PathBuf::from("/tmp/x")).with_base_url(" http://h:1/ ");
        assert_eq!(config.base_url, "http://h:1");
    }
}
