//! Collaborator boundaries: where the input table comes from and where run
//! artifacts go. The pipeline only ever talks to these traits.

pub mod local;
pub mod memory;

use crate::dataset::InteractionFrame;
use crate::pipeline::value::ChartSpec;
use serde_json::Value;
use thiserror::Error;

pub use local::{LocalDataSource, LocalResultsSink};
pub use memory::MemorySink;

/// Yields the interaction table for an opaque locator. Interpretation of the
/// locator (path, URI, file id) is the implementor's concern.
pub trait DataSource {
    fn read_table(&self, locator: &str) -> Result<InteractionFrame, DataSourceError>;
}

/// Persists run artifacts under logical, run-relative paths.
pub trait ResultsSink {
    fn write_json(&self, path: &str, data: &Value) -> Result<(), SinkError>;
    fn write_plot(&self, path: &str, chart: &ChartSpec) -> Result<(), SinkError>;
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("could not read input table '{locator}'")]
    Read {
        locator: String,
        #[source]
        source: csv::Error,
    },
    #[error("input table '{locator}' does not exist")]
    NotFound { locator: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not write artifact '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize artifact '{path}'")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
