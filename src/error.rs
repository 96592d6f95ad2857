use crate::config::ConfigError;
use crate::io::{DataSourceError, SinkError};
use crate::pipeline::PipelineError;
use crate::telemetry::TelemetryError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Pipeline(PipelineError),
    Source(DataSourceError),
    Sink(SinkError),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Pipeline(err) => write!(f, "pipeline error: {}", err),
            AppError::Source(err) => write!(f, "data source error: {}", err),
            AppError::Sink(err) => write!(f, "sink error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::Source(err) => Some(err),
            AppError::Sink(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Json(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<DataSourceError> for AppError {
    fn from(value: DataSourceError) -> Self {
        Self::Source(value)
    }
}

impl From<SinkError> for AppError {
    fn from(value: SinkError) -> Self {
        Self::Sink(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
