//! The orchestrator: builds each configured dimension against the input
//! table, runs its metrics in declaration order, and assembles the result
//! tree handed to post-run callbacks.

pub mod value;

use crate::config::PipelineConfig;
use crate::dataset::InteractionFrame;
use crate::dimensions::{build_dimension, DimensionBuildError, UnknownMetric};
use crate::io::{DataSource, DataSourceError, ResultsSink, SinkError};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{error, info};
use value::{json_num_opt, series_json, MetricValue};

/// dimension name -> metric name -> serialized value, in declaration order.
pub type ResultTree = Map<String, Value>;

/// Hook invoked after every dimension has run. Failures are isolated: the
/// pipeline logs them and still returns the assembled tree.
pub trait PostRunCallback {
    fn name(&self) -> &str;

    fn run(
        &self,
        tree: &mut ResultTree,
        run_dir: &str,
        sink: &dyn ResultsSink,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

pub struct MetricsPipeline<'a> {
    source: &'a dyn DataSource,
    sink: &'a dyn ResultsSink,
    config: PipelineConfig,
    callbacks: Vec<Box<dyn PostRunCallback + 'a>>,
}

impl<'a> MetricsPipeline<'a> {
    pub fn new(
        source: &'a dyn DataSource,
        sink: &'a dyn ResultsSink,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Box<dyn PostRunCallback + 'a>) {
        self.callbacks.push(callback);
    }

    /// Read the table through the data source and execute the configured
    /// dimensions. `run_dir` prefixes every artifact path for this run.
    pub fn run(
        &self,
        input: &str,
        run_dir: &str,
        write_results_json: bool,
    ) -> Result<ResultTree, PipelineError> {
        let frame = self.source.read_table(input)?;
        info!(
            rows = frame.len(),
            columns = frame.column_count(),
            input,
            "interaction table loaded"
        );
        self.execute(&frame, run_dir, write_results_json)
    }

    /// Same as [`run`](Self::run), but over an already-loaded table.
    pub fn execute(
        &self,
        frame: &InteractionFrame,
        run_dir: &str,
        write_results_json: bool,
    ) -> Result<ResultTree, PipelineError> {
        let mut tree = ResultTree::new();

        for entry in self.config.active_dimensions() {
            let dimension = build_dimension(&entry.class, frame, entry.params.as_ref())?;
            info!(
                dimension = %entry.name,
                class = %entry.class,
                metrics = entry.metrics.len(),
                "running dimension"
            );

            let mut metrics_out = Map::new();
            for metric in &entry.metrics {
                // One exhaustive match over every shape a metric may return.
                let serialized = match dimension.run_metric(metric)? {
                    MetricValue::Plot(chart) => {
                        let path = format!("{run_dir}/{}_{metric}.chart.json", entry.name);
                        self.sink.write_plot(&path, &chart)?;
                        json!({"type": "image", "path": path})
                    }
                    MetricValue::Scalar(value) => json_num_opt(value),
                    MetricValue::Series { labels, values } => series_json(labels, values),
                    MetricValue::Record(map) => Value::Object(map),
                    MetricValue::Table(rows) => Value::Array(rows),
                };
                metrics_out.insert(metric.clone(), serialized);
            }
            tree.insert(entry.name.clone(), Value::Object(metrics_out));
        }

        if write_results_json {
            let path = format!("{run_dir}/results.json");
            self.sink.write_json(&path, &Value::Object(tree.clone()))?;
        }

        for callback in &self.callbacks {
            if let Err(err) = callback.run(&mut tree, run_dir, self.sink) {
                error!(callback = callback.name(), %err, "post-run callback failed");
            }
        }

        Ok(tree)
    }
}

#[derive(Debug)]
pub enum PipelineError {
    Source(DataSourceError),
    Sink(SinkError),
    Dimension(DimensionBuildError),
    Metric(UnknownMetric),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Source(err) => write!(f, "{err}"),
            PipelineError::Sink(err) => write!(f, "{err}"),
            PipelineError::Dimension(err) => write!(f, "{err}"),
            PipelineError::Metric(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Source(err) => Some(err),
            PipelineError::Sink(err) => Some(err),
            PipelineError::Dimension(err) => Some(err),
            PipelineError::Metric(err) => Some(err),
        }
    }
}

impl From<DataSourceError> for PipelineError {
    fn from(value: DataSourceError) -> Self {
        Self::Source(value)
    }
}

impl From<SinkError> for PipelineError {
    fn from(value: SinkError) -> Self {
        Self::Sink(value)
    }
}

impl From<DimensionBuildError> for PipelineError {
    fn from(value: DimensionBuildError) -> Self {
        Self::Dimension(value)
    }
}

impl From<UnknownMetric> for PipelineError {
    fn from(value: UnknownMetric) -> Self {
        Self::Metric(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySink;
    use std::io::Cursor;

    struct StaticSource(&'static str);

    impl DataSource for StaticSource {
        fn read_table(&self, _locator: &str) -> Result<InteractionFrame, DataSourceError> {
            Ok(InteractionFrame::from_csv_reader(Cursor::new(self.0)).expect("test csv parses"))
        }
    }

    const CSV: &str = "\
interaction_id,datetime_start,queue_skill,channel,duration_talk,hold_time,wrap_up_time,agent_id,transfer_flag
id1,2024-01-01 10:00:00,sales,voice,300,0,60,a1,0
id2,2024-01-02 14:00:00,support,chat,500,30,60,a2,1
";

    fn config(value: Value) -> PipelineConfig {
        PipelineConfig::from_value(&value).expect("test config parses")
    }

    #[test]
    fn runs_dimensions_in_declaration_order_and_persists_plots() {
        let source = StaticSource(CSV);
        let sink = MemorySink::new();
        let pipeline = MetricsPipeline::new(
            &source,
            &sink,
            config(json!({
                "dimensions": {
                    "volumetry": {
                        "class": "volume",
                        "metrics": ["volume_by_channel", "plot_channel_distribution"],
                    },
                    "performance": {
                        "class": "operational_performance",
                        "metrics": ["escalation_rate"],
                    },
                }
            })),
        );

        let tree = pipeline.run("ignored", "run1", true).expect("pipeline runs");

        let keys: Vec<&String> = tree.keys().collect();
        assert_eq!(keys, vec!["volumetry", "performance"]);
        assert_eq!(tree["performance"]["escalation_rate"], 50.0);

        let plot_ref = &tree["volumetry"]["plot_channel_distribution"];
        assert_eq!(plot_ref["type"], "image");
        assert_eq!(plot_ref["path"], "run1/volumetry_plot_channel_distribution.chart.json");
        assert_eq!(
            sink.plot_paths(),
            vec!["run1/volumetry_plot_channel_distribution.chart.json".to_string()]
        );

        let results = sink.json("run1/results.json").expect("results persisted");
        assert_eq!(results["volumetry"]["volume_by_channel"]["values"][0], 1.0);
    }

    #[test]
    fn unknown_metric_is_fatal() {
        let source = StaticSource(CSV);
        let sink = MemorySink::new();
        let pipeline = MetricsPipeline::new(
            &source,
            &sink,
            config(json!({
                "dimensions": {
                    "volumetry": {"class": "volume", "metrics": ["nope"]},
                }
            })),
        );

        let err = pipeline.run("ignored", "run1", true).expect_err("fatal");
        assert!(matches!(err, PipelineError::Metric(_)));
        assert!(sink.json_paths().is_empty(), "no partial results written");
    }

    #[test]
    fn unknown_class_is_fatal_before_metrics() {
        let source = StaticSource(CSV);
        let sink = MemorySink::new();
        let pipeline = MetricsPipeline::new(
            &source,
            &sink,
            config(json!({
                "dimensions": {
                    "bogus": {"class": "made_up", "metrics": ["anything"]},
                }
            })),
        );

        let err = pipeline.run("ignored", "run1", true).expect_err("fatal");
        assert!(matches!(err, PipelineError::Dimension(_)));
    }

    struct FailingCallback;

    impl PostRunCallback for FailingCallback {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(
            &self,
            tree: &mut ResultTree,
            _run_dir: &str,
            _sink: &dyn ResultsSink,
        ) -> Result<(), Box<dyn std::error::Error>> {
            tree.insert("partial".to_string(), json!(true));
            Err("deliberate failure".into())
        }
    }

    #[test]
    fn callback_failure_does_not_abort_the_run() {
        let source = StaticSource(CSV);
        let sink = MemorySink::new();
        let mut pipeline = MetricsPipeline::new(
            &source,
            &sink,
            config(json!({
                "dimensions": {
                    "volumetry": {"class": "volume", "metrics": ["volume_by_skill"]},
                }
            })),
        );
        pipeline.add_callback(Box::new(FailingCallback));

        let tree = pipeline.run("ignored", "run1", false).expect("run completes");
        assert!(tree.contains_key("volumetry"));
        assert_eq!(tree["partial"], true, "mutations before failure survive");
    }
}
