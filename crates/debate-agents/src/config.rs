//! Runner configuration: `debate.toml` plus `DEBATE_*` environment overrides.
//!
//! ```toml
//! [engine]
//! max_concurrent_debates = 4
//!
//! [engine.governance]
//! confidence_threshold = 75
//!
//! [generator]
//! url = "http://localhost:8000/v1/chat/completions"
//! model = "qwen2.5-14b-instruct"
//!
//! [storage]
//! database_url = "postgres://debate@localhost/debates"
//! transcript_dir = "./transcripts"
//! ```

use std::path::{Path, PathBuf};

use coordination::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "debate.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error(transparent)]
    Engine(#[from] ConfigError),
}

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// When false every round uses fallback content.
    pub enabled: bool,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "default".to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.4,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Postgres connection string. Snapshots stay in memory without one.
    pub database_url: Option<String>,
    /// Markdown transcripts directory. Disabled without one.
    pub transcript_dir: Option<PathBuf>,
    /// Upper bound on how long a command waits for debates it started.
    pub wait_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            transcript_dir: None,
            wait_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub generator: GeneratorSettings,
    pub storage: StorageSettings,
}

impl AppConfig {
    /// Load `path`, or `debate.toml` when present, or defaults; then apply
    /// the process environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `DEBATE_*` overrides from `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(url) = lookup("DEBATE_GENERATOR_URL") {
            self.generator.url = url;
        }
        if let Some(model) = lookup("DEBATE_MODEL") {
            self.generator.model = model;
        }
        if let Some(key) = lookup("DEBATE_API_KEY") {
            self.generator.api_key = Some(key);
        }
        if let Some(enabled) = parse_env(&lookup, "DEBATE_GENERATION")? {
            self.generator.enabled = enabled;
        }
        if let Some(url) = lookup("DEBATE_DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(dir) = lookup("DEBATE_TRANSCRIPT_DIR") {
            self.storage.transcript_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parse_env(&lookup, "DEBATE_WAIT_SECS")? {
            self.storage.wait_secs = secs;
        }
        if let Some(cap) = parse_env(&lookup, "DEBATE_MAX_CONCURRENT")? {
            self.engine.max_concurrent_debates = cap;
        }
        if let Some(secs) = parse_env(&lookup, "DEBATE_ROUND_TIMEOUT_SECS")? {
            self.engine.round_timeout_secs = secs;
        }
        if let Some(threshold) = parse_env(&lookup, "DEBATE_CONFIDENCE_THRESHOLD")? {
            self.engine.governance.confidence_threshold = threshold;
        }
        if let Some(enabled) = parse_env(&lookup, "DEBATE_COACHING")? {
            self.engine.coaching.enabled = enabled;
        }
        if let Some(secs) = parse_env(&lookup, "DEBATE_COACHING_INTERVAL_SECS")? {
            self.engine.coaching.interval_secs = secs;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, SettingsError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::Env { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine.max_concurrent_debates, 10);
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn test_partial_tables_merge_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            max_concurrent_debates = 3

            [engine.governance]
            confidence_threshold = 80

            [generator]
            model = "local-14b"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_concurrent_debates, 3);
        assert_eq!(config.engine.governance.confidence_threshold, 80);
        assert_eq!(config.engine.governance.approval_score, 70);
        assert_eq!(config.generator.model, "local-14b");
        assert_eq!(config.engine.teams.len(), 4);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("DEBATE_MAX_CONCURRENT", "2"),
                ("DEBATE_GENERATION", "false"),
                ("DEBATE_DATABASE_URL", "postgres://localhost/debates"),
                ("DEBATE_CONFIDENCE_THRESHOLD", "60"),
            ]))
            .unwrap();
        assert_eq!(config.engine.max_concurrent_debates, 2);
        assert!(!config.generator.enabled);
        assert_eq!(
            config.storage.database_url.as_deref(),
            Some("postgres://localhost/debates")
        );
        assert_eq!(config.engine.governance.confidence_threshold, 60);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("DEBATE_MAX_CONCURRENT", "many")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Env { var: "DEBATE_MAX_CONCURRENT", .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debate.toml");
        std::fs::write(&path, "[storage]\nwait_secs = 30\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.storage.wait_secs, 30);

        let missing = AppConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, SettingsError::Read { .. }));
    }
}
