use serde_json::Value;
use std::env;
use std::fmt;
use std::path::Path;

/// Distinguishes runtime behavior for different stages of the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Default verbosity when neither `RUST_LOG` nor `APP_LOG_LEVEL` is set:
    /// chatty during development, quiet under test runners.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Test => "warn",
            Self::Production => "info",
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL")
            .unwrap_or_else(|_| environment.default_log_level().to_string());

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// One configured dimension: which registry class to build, whether to run
/// it, which metrics to execute (in order), and constructor parameters.
#[derive(Debug, Clone)]
pub struct DimensionEntry {
    pub name: String,
    pub class: String,
    pub enabled: bool,
    pub metrics: Vec<String>,
    pub params: Option<Value>,
}

/// Parsed pipeline configuration: the ordered `dimensions` block of the
/// configuration document. Parsing is strict; a malformed document is a
/// fatal error before any metric executes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dimensions: Vec<DimensionEntry>,
}

impl PipelineConfig {
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Some(root) = value.as_object() else {
            return Err(ConfigError::NotAnObject { key: "<root>" });
        };
        let Some(dimensions) = root.get("dimensions") else {
            return Err(ConfigError::MissingKey { key: "dimensions" });
        };
        let Some(dimensions) = dimensions.as_object() else {
            return Err(ConfigError::NotAnObject { key: "dimensions" });
        };

        let mut entries = Vec::with_capacity(dimensions.len());
        for (name, entry) in dimensions {
            let Some(entry) = entry.as_object() else {
                return Err(ConfigError::EntryNotAnObject { name: name.clone() });
            };

            let class = entry
                .get("class")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::EntryMissingClass { name: name.clone() })?
                .to_string();

            let enabled = match entry.get("enabled") {
                None => true,
                Some(Value::Bool(flag)) => *flag,
                Some(_) => {
                    return Err(ConfigError::EntryInvalidField {
                        name: name.clone(),
                        field: "enabled",
                    })
                }
            };

            let metrics = match entry.get("metrics") {
                None => Vec::new(),
                Some(Value::Array(items)) => {
                    let mut metrics = Vec::with_capacity(items.len());
                    for item in items {
                        let Some(metric) = item.as_str() else {
                            return Err(ConfigError::EntryInvalidField {
                                name: name.clone(),
                                field: "metrics",
                            });
                        };
                        metrics.push(metric.to_string());
                    }
                    metrics
                }
                Some(_) => {
                    return Err(ConfigError::EntryInvalidField {
                        name: name.clone(),
                        field: "metrics",
                    })
                }
            };

            entries.push(DimensionEntry {
                name: name.clone(),
                class,
                enabled,
                metrics,
                params: entry.get("params").cloned(),
            });
        }

        Ok(Self { dimensions: entries })
    }

    /// Entries that will actually run: enabled with at least one metric.
    pub fn active_dimensions(&self) -> impl Iterator<Item = &DimensionEntry> {
        self.dimensions
            .iter()
            .filter(|entry| entry.enabled && !entry.metrics.is_empty())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: String,
        source: std::io::Error,
    },
    Json {
        path: String,
        source: serde_json::Error,
    },
    MissingKey {
        key: &'static str,
    },
    NotAnObject {
        key: &'static str,
    },
    EntryNotAnObject {
        name: String,
    },
    EntryMissingClass {
        name: String,
    },
    EntryInvalidField {
        name: String,
        field: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, .. } => {
                write!(f, "could not read configuration file '{path}'")
            }
            ConfigError::Json { path, .. } => {
                write!(f, "configuration file '{path}' is not valid JSON")
            }
            ConfigError::MissingKey { key } => {
                write!(f, "configuration is missing the '{key}' object")
            }
            ConfigError::NotAnObject { key } => {
                write!(f, "configuration '{key}' must be a JSON object")
            }
            ConfigError::EntryNotAnObject { name } => {
                write!(f, "dimension entry '{name}' must be a JSON object")
            }
            ConfigError::EntryMissingClass { name } => {
                write!(f, "dimension entry '{name}' is missing a string 'class'")
            }
            ConfigError::EntryInvalidField { name, field } => {
                write!(f, "dimension entry '{name}' has an invalid '{field}' field")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn environment_parses_aliases_and_sets_log_defaults() {
        assert_eq!(AppEnvironment::from_str("prod"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_str(" CI "), AppEnvironment::Test);
        assert_eq!(
            AppEnvironment::from_str("anything-else"),
            AppEnvironment::Development
        );

        assert_eq!(AppEnvironment::Development.default_log_level(), "debug");
        assert_eq!(AppEnvironment::Test.default_log_level(), "warn");
        assert_eq!(AppEnvironment::Production.default_log_level(), "info");
    }

    #[test]
    fn parses_ordered_dimensions_with_defaults() {
        let value = json!({
            "dimensions": {
                "volumetry": {"class": "volume", "metrics": ["volume_by_channel"]},
                "perf": {"class": "operational_performance", "enabled": false,
                         "metrics": ["fcr_rate"]},
                "econ": {"class": "cost", "metrics": ["cpi_by_skill_channel"],
                         "params": {"labor_cost_per_hour": 30.0}},
                "idle": {"class": "satisfaction"},
            }
        });
        let config = PipelineConfig::from_value(&value).expect("valid config");
        assert_eq!(config.dimensions.len(), 4);
        assert!(config.dimensions[0].enabled, "enabled defaults to true");
        assert!(config.dimensions[3].metrics.is_empty());

        let active: Vec<&str> = config
            .active_dimensions()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(active, vec!["volumetry", "econ"], "disabled and metric-less skipped");
        assert!(config.dimensions[2].params.is_some());
    }

    #[test]
    fn declaration_order_is_preserved() {
        let value = json!({
            "dimensions": {
                "z_first": {"class": "volume", "metrics": ["volume_by_skill"]},
                "a_second": {"class": "satisfaction", "metrics": ["csat_global"]},
            }
        });
        let config = PipelineConfig::from_value(&value).expect("valid config");
        assert_eq!(config.dimensions[0].name, "z_first");
        assert_eq!(config.dimensions[1].name, "a_second");
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let err = PipelineConfig::from_value(&json!([])).expect_err("root must be object");
        assert!(matches!(err, ConfigError::NotAnObject { key: "<root>" }));

        let err = PipelineConfig::from_value(&json!({})).expect_err("dimensions required");
        assert!(matches!(err, ConfigError::MissingKey { key: "dimensions" }));

        let err = PipelineConfig::from_value(&json!({"dimensions": {"v": {"metrics": []}}}))
            .expect_err("class required");
        assert!(matches!(err, ConfigError::EntryMissingClass { .. }));

        let err = PipelineConfig::from_value(
            &json!({"dimensions": {"v": {"class": "volume", "metrics": "volume_by_skill"}}}),
        )
        .expect_err("metrics must be an array");
        assert!(matches!(
            err,
            ConfigError::EntryInvalidField { field: "metrics", .. }
        ));
    }
}
