//! Run configuration
//!
//! Loaded from YAML, then overridden by environment variables (a `.env` file
//! is honored). Every field has a default so an empty file is valid.
//!
//! ```yaml
//! targets_path: config/metas.csv
//! snapshot_path: relatorios/monitoramento.csv
//! history_path: relatorios/historico_status.csv
//! output_dir: relatorios
//! continuation: flat_increment
//! unknown_location_label: N/D
//! columns:
//!   entity_id: OS ID
//!   status: Status OS
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calendar::ContinuationPolicy;
use crate::error::{MonitorError, MonitorResult};
use crate::io::csv_sink::HISTORY_FILE;
use crate::pipeline::EngineOptions;
use crate::report::{ReportOptions, DEFAULT_UNKNOWN_LOCATION};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "OS_MONITOR_CONFIG";

/// Configuration file used when none is named
pub const DEFAULT_CONFIG_PATH: &str = "config/os_monitor.yaml";

const TARGETS_ENV: &str = "OS_MONITOR_TARGETS";
const SNAPSHOT_ENV: &str = "OS_MONITOR_SNAPSHOT";
const HISTORY_ENV: &str = "OS_MONITOR_HISTORY";
const OUTPUT_DIR_ENV: &str = "OS_MONITOR_OUTPUT_DIR";
const CONTINUATION_ENV: &str = "OS_MONITOR_CONTINUATION";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Status → target table (CSV with Status/Meta columns, or YAML map)
    pub targets_path: PathBuf,
    /// Previously consolidated table to resume from
    pub snapshot_path: Option<PathBuf>,
    /// Interval history of the previous run; defaults to the history file
    /// next to the snapshot
    pub history_path: Option<PathBuf>,
    /// Directory the report tables are written to
    pub output_dir: PathBuf,
    pub continuation: ContinuationPolicy,
    /// Ranking group for entities without a location code
    pub unknown_location_label: String,
    /// Column names of the uploaded extracts
    pub columns: ColumnMapping,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets_path: PathBuf::from("config/metas.csv"),
            snapshot_path: None,
            history_path: None,
            output_dir: PathBuf::from("relatorios"),
            continuation: ContinuationPolicy::default(),
            unknown_location_label: DEFAULT_UNKNOWN_LOCATION.to_string(),
            columns: ColumnMapping::default(),
        }
    }
}

/// Header names of the extract columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub entity_id: String,
    pub status: String,
    pub location: String,
    pub tat: String,
    pub model: String,
    pub serial: String,
    pub part_delivery: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            entity_id: "OS ID".to_string(),
            status: "Status OS".to_string(),
            location: "Cod Autorizada".to_string(),
            tat: "TAT".to_string(),
            model: "Modelo".to_string(),
            serial: "Número de Série".to_string(),
            part_delivery: "Entrega da Peça".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> MonitorResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| MonitorError::io(path, source))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> MonitorResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the configuration for a run.
    ///
    /// File selection: `explicit`, then `$OS_MONITOR_CONFIG`, then
    /// [`DEFAULT_CONFIG_PATH`] if it exists, else built-in defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> MonitorResult<Self> {
        dotenvy::dotenv().ok();

        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match named {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                tracing::info!(path = DEFAULT_CONFIG_PATH, "Loading configuration");
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                tracing::debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `OS_MONITOR_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> MonitorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(TARGETS_ENV) {
            self.targets_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(SNAPSHOT_ENV) {
            self.snapshot_path = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(path) = lookup(HISTORY_ENV) {
            self.history_path = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(path) = lookup(OUTPUT_DIR_ENV) {
            self.output_dir = PathBuf::from(path);
        }
        if let Some(policy) = lookup(CONTINUATION_ENV) {
            self.continuation = policy.parse().map_err(MonitorError::config)?;
        }
        Ok(())
    }

    /// History file to resume from, only when resuming from a snapshot
    pub fn history_source(&self) -> Option<PathBuf> {
        let snapshot = self.snapshot_path.as_ref()?;
        Some(self.history_path.clone().unwrap_or_else(|| {
            snapshot
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(HISTORY_FILE)
        }))
    }

    /// Engine options derived from this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            continuation: self.continuation,
            report: ReportOptions {
                unknown_location_label: self.unknown_location_label.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = MonitorConfig::from_yaml("").unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.columns.entity_id, "OS ID");
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
continuation: elapsed_business_days
snapshot_path: relatorios/monitoramento.csv
columns:
  status: Situacao
"#;
        let config = MonitorConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.continuation, ContinuationPolicy::ElapsedBusinessDays);
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("relatorios/monitoramento.csv"))
        );
        assert_eq!(config.columns.status, "Situacao");
        assert_eq!(config.columns.entity_id, "OS ID");
        assert_eq!(config.unknown_location_label, DEFAULT_UNKNOWN_LOCATION);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let err = MonitorConfig::from_yaml("continuation: weekly").unwrap_err();
        assert!(matches!(err, MonitorError::Yaml(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OS_MONITOR_TARGETS", "metas.yaml"),
            ("OS_MONITOR_CONTINUATION", "elapsed"),
            ("OS_MONITOR_SNAPSHOT", ""),
        ]);
        let mut config = MonitorConfig {
            snapshot_path: Some(PathBuf::from("old.csv")),
            ..Default::default()
        };

        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.targets_path, PathBuf::from("metas.yaml"));
        assert_eq!(config.continuation, ContinuationPolicy::ElapsedBusinessDays);
        assert_eq!(config.snapshot_path, None);
    }

    #[test]
    fn test_history_source_follows_snapshot() {
        let mut config = MonitorConfig::default();
        assert_eq!(config.history_source(), None);

        config.snapshot_path = Some(PathBuf::from("relatorios/monitoramento.csv"));
        assert_eq!(
            config.history_source(),
            Some(PathBuf::from("relatorios/historico_status.csv"))
        );

        config
            .apply_overrides(|key| {
                (key == "OS_MONITOR_HISTORY").then(|| "arquivo/h.csv".to_string())
            })
            .unwrap();
        assert_eq!(config.history_source(), Some(PathBuf::from("arquivo/h.csv")));
    }

    #[test]
    fn test_bad_policy_override_is_config_error() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_overrides(|key| (key == "OS_MONITOR_CONTINUATION").then(|| "daily".to_string()))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config { .. }));
    }
}
