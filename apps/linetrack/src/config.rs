//! # Configuration Loading
//!
//! Reads the line configuration from TOML. Precedence is
//! `CLI flags > config file > built-in defaults`; a missing file simply
//! means defaults.
//!
//! ```toml
//! [line]
//! items = 5
//!
//! [[stages]]
//! ideal_cycle_time = 1.0
//! processing_multiplier = 1.3
//!
//! [monitor]
//! horizon_ms = 60000
//! warmup_samples = 3
//! optimal_rate = 1.0
//! reconnect_attempts = 5
//! reconnect_delay_ms = 0
//!
//! [storage]
//! database = "linetrack.redb"
//! backend = "redb"
//! ```

use clap::ValueEnum;
use linetrack_core::{LineConfig, LineError, MonitorConfig, StageSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "linetrack.toml";

/// Default database file.
pub const DEFAULT_DATABASE: &str = "linetrack.redb";

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Where cycle records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// redb database file.
    #[default]
    Redb,
    /// Process memory; nothing survives the command.
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redb => write!(f, "redb"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

// =============================================================================
// FILE FORMAT
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    line: LineSection,
    #[serde(default)]
    stages: Option<Vec<StageSpec>>,
    #[serde(default)]
    monitor: Option<MonitorConfig>,
    #[serde(default)]
    storage: StorageSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LineSection {
    items: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StorageSection {
    database: Option<PathBuf>,
    backend: Option<BackendKind>,
}

// =============================================================================
// RESOLVED CONFIGURATION
// =============================================================================

/// Storage settings after all overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    /// Database file for the redb backend.
    pub database: PathBuf,
    /// Selected backend.
    pub backend: BackendKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backend: BackendKind::Redb,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--database`
    pub database: Option<PathBuf>,
    /// `--backend`
    pub backend: Option<BackendKind>,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    /// Line and monitor parameters.
    pub line: LineConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// File the values came from, if any.
    pub source: Option<PathBuf>,
}

/// Load configuration from `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path, overrides: &CliOverrides) -> Result<AppConfig, LineError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return load_from_str(None, None, overrides);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| LineError::IoError(format!("Cannot read {}: {}", path.display(), e)))?;
    load_from_str(Some(&contents), Some(path), overrides)
}

/// Build the configuration from raw TOML and overrides.
pub fn load_from_str(
    contents: Option<&str>,
    source: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<AppConfig, LineError> {
    let file: ConfigFile = match contents {
        Some(text) => toml::from_str(text)
            .map_err(|e| LineError::InvalidConfig(format!("config file: {e}")))?,
        None => ConfigFile::default(),
    };

    let mut line = LineConfig::default();
    if let Some(items) = file.line.items {
        line.items = items;
    }
    if let Some(stages) = file.stages {
        line.stages = stages;
    }
    if let Some(monitor) = file.monitor {
        line.monitor = monitor;
    }
    line.validate()?;

    let mut storage = StorageConfig::default();
    if let Some(database) = file.storage.database {
        storage.database = database;
    }
    if let Some(backend) = file.storage.backend {
        storage.backend = backend;
    }
    if let Some(database) = &overrides.database {
        storage.database.clone_from(database);
    }
    if let Some(backend) = overrides.backend {
        storage.backend = backend;
    }

    let config = AppConfig {
        line,
        storage,
        source: source.map(Path::to_path_buf),
    };
    tracing::debug!(
        stages = config.line.stages.len(),
        items = config.line.items,
        backend = %config.storage.backend,
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = load_from_str(Some(""), None, &CliOverrides::default()).expect("config");
        assert_eq!(config.line, LineConfig::default());
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn cli_overrides_file() {
        let toml = r#"
            [storage]
            database = "from-file.redb"
            backend = "redb"
        "#;
        let overrides = CliOverrides {
            database: Some(PathBuf::from("from-cli.redb")),
            backend: Some(BackendKind::Memory),
        };
        let config = load_from_str(Some(toml), None, &overrides).expect("config");
        assert_eq!(config.storage.database, PathBuf::from("from-cli.redb"));
        assert_eq!(config.storage.backend, BackendKind::Memory);
    }

    #[test]
    fn unknown_section_rejected() {
        let result = load_from_str(Some("[lines]\nitems = 3\n"), None, &CliOverrides::default());
        assert!(matches!(result, Err(LineError::InvalidConfig(_))));
    }
}
