//! Configuration for namerec.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (NAMEREC_HOME, NAMEREC_STORE, NAMEREC_REVIEWER)
//! 2. Config file (.namerec/config.yaml)
//! 3. Defaults (~/.namerec)
//!
//! Config file discovery:
//! - Searches current directory and parents for .namerec/config.yaml
//! - Paths in config file are relative to the project root (the directory
//!   containing .namerec/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::StatusFilter;

/// Default concept page base
pub const DEFAULT_CONCEPT_BASE_URL: &str = "https://wellcomecollection.org/concepts/";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub review: Option<ReviewConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Shared records file
    pub store: Option<String>,
    /// Decision log
    pub decisions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewConfig {
    pub reviewer: Option<String>,
    pub concept_base_url: Option<String>,
    pub default_filter: Option<StatusFilter>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to namerec home
    pub home: PathBuf,
    /// Shared records file
    pub store: PathBuf,
    /// Decision log
    pub decisions: PathBuf,
    /// Reviewer identity, if configured
    pub reviewer: Option<String>,
    pub concept_base_url: String,
    pub default_filter: StatusFilter,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".namerec").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Read a non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Merge file settings, env overrides and defaults
fn resolve(config: Option<(&Path, ConfigFile)>, default_home: PathBuf) -> ResolvedConfig {
    let (config_file, file) = match config {
        Some((path, file)) => (Some(path.to_path_buf()), Some(file)),
        None => (None, None),
    };

    // Base directory is the parent of .namerec/ (i.e., grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();
    let review = file.and_then(|f| f.review).unwrap_or_default();

    let home = env_var("NAMEREC_HOME")
        .map(PathBuf::from)
        .or_else(|| paths.home.as_deref().map(|h| resolve_path(&base_dir, h)))
        .unwrap_or(default_home);

    let store = env_var("NAMEREC_STORE")
        .map(PathBuf::from)
        .or_else(|| paths.store.as_deref().map(|s| resolve_path(&base_dir, s)))
        .unwrap_or_else(|| home.join("records.json"));

    let decisions = paths
        .decisions
        .as_deref()
        .map(|d| resolve_path(&base_dir, d))
        .unwrap_or_else(|| home.join("decisions.jsonl"));

    ResolvedConfig {
        reviewer: env_var("NAMEREC_REVIEWER").or(review.reviewer),
        concept_base_url: review
            .concept_base_url
            .unwrap_or_else(|| DEFAULT_CONCEPT_BASE_URL.to_string()),
        default_filter: review.default_filter.unwrap_or_default(),
        home,
        store,
        decisions,
        config_file,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".namerec");

    let config = match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    Ok(resolve(
        config.as_ref().map(|(path, file)| (path.as_path(), file.clone())),
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let home = PathBuf::from("/home/ana/.namerec");
        let config = resolve(None, home.clone());

        if std::env::var("NAMEREC_HOME").is_err() {
            assert_eq!(config.home, home);
        }
        if std::env::var("NAMEREC_STORE").is_err() {
            assert_eq!(config.store, config.home.join("records.json"));
        }
        assert_eq!(config.decisions, config.home.join("decisions.jsonl"));
        assert_eq!(config.concept_base_url, DEFAULT_CONCEPT_BASE_URL);
        assert_eq!(config.default_filter, StatusFilter::All);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let namerec_dir = temp.path().join(".namerec");
        std::fs::create_dir_all(&namerec_dir).unwrap();

        let config_path = namerec_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  store: data/records.json
  decisions: /var/lib/namerec/decisions.jsonl
review:
  reviewer: ana@example.org
  default_filter: unevaluated
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.paths.store.as_deref(), Some("data/records.json"));

        let config = resolve(Some((config_path.as_path(), parsed)), PathBuf::from("/unused"));
        if std::env::var("NAMEREC_STORE").is_err() {
            assert_eq!(config.store, temp.path().join("data/records.json"));
        }
        assert_eq!(
            config.decisions,
            PathBuf::from("/var/lib/namerec/decisions.jsonl")
        );
        if std::env::var("NAMEREC_REVIEWER").is_err() {
            assert_eq!(config.reviewer.as_deref(), Some("ana@example.org"));
        }
        assert_eq!(config.default_filter, StatusFilter::Unevaluated);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
