use serde::Serialize;
use serde_json::{Map, Value};

/// Closed set of shapes a metric may return. The pipeline serializes through
/// one exhaustive match over these cases; there is no runtime type probing.
#[derive(Debug, Clone)]
pub enum MetricValue {
    /// Single number. `None` stands for "not computed"; non-finite values
    /// collapse to `None` at construction so NaN never leaves a calculator.
    Scalar(Option<f64>),
    /// Categorical series keeping both axes, so downstream consumers can
    /// identify the category each value belongs to.
    Series { labels: Vec<String>, values: Vec<f64> },
    /// Small keyed summary (percentile bundles, score component maps, ...).
    Record(Map<String, Value>),
    /// Row-oriented table.
    Table(Vec<Value>),
    /// Declarative chart artifact; persisted by the sink, never embedded.
    Plot(ChartSpec),
}

impl MetricValue {
    /// Scalar with the non-finite-to-null conversion applied.
    pub fn scalar(value: f64) -> Self {
        MetricValue::Scalar(value.is_finite().then_some(value))
    }

    pub fn scalar_opt(value: Option<f64>) -> Self {
        MetricValue::Scalar(value.filter(|v| v.is_finite()))
    }

    pub fn empty_record() -> Self {
        MetricValue::Record(Map::new())
    }
}

/// Series serialization keeping both axes, so downstream consumers can tell
/// which category each value belongs to.
pub fn series_json(labels: Vec<String>, values: Vec<f64>) -> Value {
    let mut map = Map::new();
    map.insert(
        "labels".to_string(),
        Value::Array(labels.into_iter().map(Value::String).collect()),
    );
    map.insert(
        "values".to_string(),
        Value::Array(values.into_iter().map(json_num).collect()),
    );
    Value::Object(map)
}

/// Finite float to JSON number, anything else to null. This is the only path
/// numbers take into the result tree, so NaN/Infinity never appear in output.
pub fn json_num(value: f64) -> Value {
    if value.is_finite() {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

pub fn json_num_opt(value: Option<f64>) -> Value {
    match value {
        Some(v) => json_num(v),
        None => Value::Null,
    }
}

/// Self-describing chart document. Rendering to an actual image is the
/// `ResultsSink` collaborator's concern.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<ChartSeries>,
    /// Set when the underlying metric had nothing to draw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            categories: Vec::new(),
            series: Vec::new(),
            placeholder: None,
        }
    }

    /// Chart standing in for "no data to draw"; still a renderable artifact.
    pub fn placeholder(title: &str, message: &str) -> Self {
        Self {
            kind: ChartKind::Bar,
            title: title.to_string(),
            x_label: String::new(),
            y_label: String::new(),
            categories: Vec::new(),
            series: Vec::new(),
            placeholder: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    StackedBar,
    Heatmap,
    Scatter,
    Histogram,
    Box,
    Waterfall,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<[f64; 2]>,
}

impl ChartSeries {
    pub fn values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().filter(|v| v.is_finite()).collect(),
            points: Vec::new(),
        }
    }

    pub fn points(name: impl Into<String>, points: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            points: points
                .into_iter()
                .filter(|p| p[0].is_finite() && p[1].is_finite())
                .collect(),
        }
    }
}
