use super::{DataSource, DataSourceError, ResultsSink, SinkError};
use crate::dataset::InteractionFrame;
use crate::pipeline::value::ChartSpec;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads interaction tables from the local filesystem; the locator is a
/// plain CSV path.
#[derive(Debug, Default)]
pub struct LocalDataSource;

impl DataSource for LocalDataSource {
    fn read_table(&self, locator: &str) -> Result<InteractionFrame, DataSourceError> {
        let path = Path::new(locator);
        if !path.exists() {
            return Err(DataSourceError::NotFound {
                locator: locator.to_string(),
            });
        }
        debug!(%locator, "reading interaction table");
        InteractionFrame::from_csv_path(path).map_err(|source| DataSourceError::Read {
            locator: locator.to_string(),
            source,
        })
    }
}

/// Writes run artifacts under a base directory, creating parents as needed.
/// Rewrites are idempotent: the same logical path overwrites on rerun.
#[derive(Debug)]
pub struct LocalResultsSink {
    base_dir: PathBuf,
}

impl LocalResultsSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: path.to_string(),
                source,
            })?;
        }
        std::fs::write(&target, bytes).map_err(|source| SinkError::Io {
            path: path.to_string(),
            source,
        })?;
        debug!(path, bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

impl ResultsSink for LocalResultsSink {
    fn write_json(&self, path: &str, data: &Value) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(data).map_err(|source| SinkError::Serialize {
            path: path.to_string(),
            source,
        })?;
        self.write_bytes(path, &bytes)
    }

    fn write_plot(&self, path: &str, chart: &ChartSpec) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(chart).map_err(|source| SinkError::Serialize {
            path: path.to_string(),
            source,
        })?;
        self.write_bytes(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sink_creates_parent_directories_and_overwrites() {
        let dir = std::env::temp_dir().join(format!("ci-sink-{}", std::process::id()));
        let sink = LocalResultsSink::new(&dir);

        sink.write_json("run1/results.json", &json!({"a": 1}))
            .expect("first write");
        sink.write_json("run1/results.json", &json!({"a": 2}))
            .expect("overwrite");

        let content = std::fs::read_to_string(dir.join("run1/results.json"))
            .expect("file exists");
        assert!(content.contains("\"a\": 2"));

        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn missing_input_is_a_not_found_error() {
        let source = LocalDataSource;
        let err = source
            .read_table("/definitely/not/here.csv")
            .expect_err("missing file");
        assert!(matches!(err, DataSourceError::NotFound { .. }));
    }
}
