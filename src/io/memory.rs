use super::{ResultsSink, SinkError};
use crate::pipeline::value::ChartSpec;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Sink that keeps every artifact in memory. Used by tests and by embedders
/// that want the result tree without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemorySink {
    json: Mutex<BTreeMap<String, Value>>,
    plots: Mutex<BTreeMap<String, ChartSpec>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(&self, path: &str) -> Option<Value> {
        self.json
            .lock()
            .ok()
            .and_then(|map| map.get(path).cloned())
    }

    pub fn json_paths(&self) -> Vec<String> {
        self.json
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn plot_paths(&self) -> Vec<String> {
        self.plots
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ResultsSink for MemorySink {
    fn write_json(&self, path: &str, data: &Value) -> Result<(), SinkError> {
        if let Ok(mut map) = self.json.lock() {
            map.insert(path.to_string(), data.clone());
        }
        Ok(())
    }

    fn write_plot(&self, path: &str, chart: &ChartSpec) -> Result<(), SinkError> {
        if let Ok(mut map) = self.plots.lock() {
            map.insert(path.to_string(), chart.clone());
        }
        Ok(())
    }
}
