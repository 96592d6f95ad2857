pub mod cost;
pub mod performance;
pub mod satisfaction;
pub mod stats;
pub mod volume;

use crate::dataset::{InteractionFrame, SchemaError};
use crate::pipeline::value::MetricValue;
use serde_json::Value;
use std::fmt;

pub use cost::{CostCalculator, CostConfig};
pub use performance::PerformanceCalculator;
pub use satisfaction::SatisfactionCalculator;
pub use volume::VolumeCalculator;

/// Registry class names accepted in the pipeline configuration.
pub const CLASS_VOLUME: &str = "volume";
pub const CLASS_PERFORMANCE: &str = "operational_performance";
pub const CLASS_SATISFACTION: &str = "satisfaction";
pub const CLASS_COST: &str = "cost";

/// A constructed dimension: a fixed set of named metrics over one table.
pub trait DimensionCalculator {
    fn name(&self) -> &'static str;

    /// Execute one named metric. Unknown names are a fatal error for the
    /// run, never a silent skip.
    fn run_metric(&self, metric: &str) -> Result<MetricValue, UnknownMetric>;
}

#[derive(Debug, Clone)]
pub struct UnknownMetric {
    pub dimension: &'static str,
    pub metric: String,
}

impl fmt::Display for UnknownMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "metric '{}' does not exist on dimension '{}'",
            self.metric, self.dimension
        )
    }
}

impl std::error::Error for UnknownMetric {}

/// Static registry: configuration selects a class name, the registry maps it
/// to a constructor. No runtime reflection.
pub fn build_dimension<'a>(
    class: &str,
    frame: &'a InteractionFrame,
    params: Option<&Value>,
) -> Result<Box<dyn DimensionCalculator + 'a>, DimensionBuildError> {
    match class {
        CLASS_VOLUME => Ok(Box::new(VolumeCalculator::new(frame)?)),
        CLASS_PERFORMANCE => Ok(Box::new(PerformanceCalculator::new(frame)?)),
        CLASS_SATISFACTION => Ok(Box::new(SatisfactionCalculator::new(frame)?)),
        CLASS_COST => {
            let config = match params {
                Some(value) => Some(serde_json::from_value::<CostConfig>(value.clone()).map_err(
                    |source| DimensionBuildError::Params {
                        class: class.to_string(),
                        source,
                    },
                )?),
                None => None,
            };
            Ok(Box::new(CostCalculator::new(frame, config)?))
        }
        other => Err(DimensionBuildError::UnknownClass(other.to_string())),
    }
}

#[derive(Debug)]
pub enum DimensionBuildError {
    UnknownClass(String),
    Schema(SchemaError),
    Params {
        class: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for DimensionBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimensionBuildError::UnknownClass(class) => {
                write!(f, "unknown dimension class '{}'", class)
            }
            DimensionBuildError::Schema(err) => write!(f, "{}", err),
            DimensionBuildError::Params { class, .. } => {
                write!(f, "invalid parameters for dimension class '{}'", class)
            }
        }
    }
}

impl std::error::Error for DimensionBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DimensionBuildError::UnknownClass(_) => None,
            DimensionBuildError::Schema(err) => Some(err),
            DimensionBuildError::Params { source, .. } => Some(source),
        }
    }
}

impl From<SchemaError> for DimensionBuildError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
