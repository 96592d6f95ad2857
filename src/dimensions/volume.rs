use super::stats;
use super::{DimensionCalculator, UnknownMetric, CLASS_VOLUME};
use crate::dataset::{InteractionFrame, InteractionRecord, SchemaError};
use crate::pipeline::value::{ChartKind, ChartSeries, ChartSpec, MetricValue};
use chrono::{Datelike, Timelike};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

const REQUIRED_COLUMNS: [&str; 4] = ["interaction_id", "datetime_start", "queue_skill", "channel"];

/// Peak window: hours 10:00-19:59 inclusive.
const PEAK_HOURS: std::ops::RangeInclusive<u32> = 10..=19;

const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Volume dimension: interaction counts, distributions, occupancy heatmap,
/// seasonality and concentration indicators.
#[derive(Debug)]
pub struct VolumeCalculator<'a> {
    frame: &'a InteractionFrame,
}

impl<'a> VolumeCalculator<'a> {
    pub fn new(frame: &'a InteractionFrame) -> Result<Self, SchemaError> {
        frame.require_columns(CLASS_VOLUME, &REQUIRED_COLUMNS)?;
        Ok(Self { frame })
    }

    /// Distinct interaction ids per group label, descending by count with
    /// ties broken by label for deterministic output.
    fn distinct_counts<F>(&self, key: F) -> Vec<(String, u64)>
    where
        F: Fn(&InteractionRecord) -> &str,
    {
        let mut groups: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for record in self.frame.records() {
            if let Some(id) = record.interaction_id.as_deref() {
                groups.entry(key(record)).or_default().insert(id);
            }
        }

        let mut counts: Vec<(String, u64)> = groups
            .into_iter()
            .map(|(label, ids)| (label.to_string(), ids.len() as u64))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    fn distribution_pct(counts: &[(String, u64)]) -> Vec<(String, f64)> {
        let total: u64 = counts.iter().map(|(_, c)| c).sum();
        counts
            .iter()
            .map(|(label, count)| {
                let pct = if total == 0 {
                    0.0
                } else {
                    stats::round2(*count as f64 / total as f64 * 100.0)
                };
                (label.clone(), pct)
            })
            .collect()
    }

    pub fn volume_by_channel(&self) -> Vec<(String, u64)> {
        self.distinct_counts(|r| r.channel.as_str())
    }

    pub fn volume_by_skill(&self) -> Vec<(String, u64)> {
        self.distinct_counts(|r| r.queue_skill.as_str())
    }

    pub fn channel_distribution_pct(&self) -> Vec<(String, f64)> {
        Self::distribution_pct(&self.volume_by_channel())
    }

    pub fn skill_distribution_pct(&self) -> Vec<(String, f64)> {
        Self::distribution_pct(&self.volume_by_skill())
    }

    /// 7x24 matrix of distinct interaction counts, Monday = row 0. Rows
    /// without a timestamp are excluded.
    pub fn heatmap_24x7(&self) -> Vec<[u64; 24]> {
        let mut cells: BTreeMap<(usize, usize), HashSet<&str>> = BTreeMap::new();
        for record in self.frame.records() {
            let (Some(started), Some(id)) = (record.started_at, record.interaction_id.as_deref())
            else {
                continue;
            };
            let dow = started.weekday().num_days_from_monday() as usize;
            let hour = started.hour() as usize;
            cells.entry((dow, hour)).or_default().insert(id);
        }

        let mut matrix = vec![[0u64; 24]; 7];
        for ((dow, hour), ids) in cells {
            matrix[dow][hour] = ids.len() as u64;
        }
        matrix
    }

    /// Coefficient of variation of monthly volume, in percent. Undefined
    /// with fewer than two observed months.
    pub fn monthly_seasonality_cv(&self) -> Option<f64> {
        let mut months: BTreeMap<(i32, u32), HashSet<&str>> = BTreeMap::new();
        for record in self.frame.records() {
            let (Some(started), Some(id)) = (record.started_at, record.interaction_id.as_deref())
            else {
                continue;
            };
            months
                .entry((started.year(), started.month()))
                .or_default()
                .insert(id);
        }

        if months.len() < 2 {
            return None;
        }

        let counts: Vec<f64> = months.values().map(|ids| ids.len() as f64).collect();
        let mean = stats::mean(&counts)?;
        if mean == 0.0 {
            return None;
        }
        let std = stats::sample_std(&counts)?;
        Some(stats::round2(std / mean * 100.0))
    }

    /// Distinct volume inside the peak window over distinct volume outside
    /// it. Undefined when no timestamps exist or off-peak volume is zero.
    pub fn peak_offpeak_ratio(&self) -> Option<f64> {
        let mut peak: HashSet<&str> = HashSet::new();
        let mut off: HashSet<&str> = HashSet::new();
        for record in self.frame.records() {
            let (Some(started), Some(id)) = (record.started_at, record.interaction_id.as_deref())
            else {
                continue;
            };
            if PEAK_HOURS.contains(&started.hour()) {
                peak.insert(id);
            } else {
                off.insert(id);
            }
        }

        if peak.is_empty() && off.is_empty() {
            return None;
        }
        if off.is_empty() {
            // Infinite ratio collapses to "not computed" at this boundary.
            return None;
        }
        Some(stats::round3(peak.len() as f64 / off.len() as f64))
    }

    /// Share of volume concentrated in the top 20% of skills (minimum one).
    pub fn concentration_top20_skills_pct(&self) -> Option<f64> {
        let counts = self.volume_by_skill();
        if counts.is_empty() {
            return None;
        }

        let top_n = ((0.2 * counts.len() as f64).ceil() as usize).max(1);
        let top: u64 = counts.iter().take(top_n).map(|(_, c)| c).sum();
        let total: u64 = counts.iter().map(|(_, c)| c).sum();
        if total == 0 {
            return None;
        }
        Some(stats::round2(top as f64 / total as f64 * 100.0))
    }

    pub fn plot_heatmap_24x7(&self) -> ChartSpec {
        let matrix = self.heatmap_24x7();
        let mut chart = ChartSpec::new(
            ChartKind::Heatmap,
            "Volume by weekday and hour",
            "Hour of day",
            "Weekday",
        );
        chart.categories = (0..24).map(|h| h.to_string()).collect();
        chart.series = matrix
            .iter()
            .enumerate()
            .map(|(dow, row)| {
                ChartSeries::values(
                    WEEKDAY_LABELS[dow],
                    row.iter().map(|c| *c as f64).collect(),
                )
            })
            .collect();
        chart
    }

    pub fn plot_channel_distribution(&self) -> ChartSpec {
        let counts = self.volume_by_channel();
        let mut chart = ChartSpec::new(
            ChartKind::Bar,
            "Volume by channel",
            "Channel",
            "Interactions",
        );
        chart.categories = counts.iter().map(|(label, _)| label.clone()).collect();
        chart.series = vec![ChartSeries::values(
            "interactions",
            counts.iter().map(|(_, c)| *c as f64).collect(),
        )];
        chart
    }

    pub fn plot_skill_pareto(&self) -> ChartSpec {
        let counts = self.volume_by_skill();
        let mut chart = ChartSpec::new(
            ChartKind::Bar,
            "Volume pareto by skill",
            "Skill / queue",
            "Interactions",
        );
        chart.categories = counts.iter().map(|(label, _)| label.clone()).collect();
        chart.series = vec![ChartSeries::values(
            "interactions",
            counts.iter().map(|(_, c)| *c as f64).collect(),
        )];
        chart
    }
}

fn series(counts: Vec<(String, u64)>) -> MetricValue {
    MetricValue::Series {
        labels: counts.iter().map(|(label, _)| label.clone()).collect(),
        values: counts.iter().map(|(_, count)| *count as f64).collect(),
    }
}

fn pct_series(values: Vec<(String, f64)>) -> MetricValue {
    MetricValue::Series {
        labels: values.iter().map(|(label, _)| label.clone()).collect(),
        values: values.iter().map(|(_, pct)| *pct).collect(),
    }
}

impl DimensionCalculator for VolumeCalculator<'_> {
    fn name(&self) -> &'static str {
        CLASS_VOLUME
    }

    fn run_metric(&self, metric: &str) -> Result<MetricValue, UnknownMetric> {
        let value = match metric {
            "volume_by_channel" => series(self.volume_by_channel()),
            "volume_by_skill" => series(self.volume_by_skill()),
            "channel_distribution_pct" => pct_series(self.channel_distribution_pct()),
            "skill_distribution_pct" => pct_series(self.skill_distribution_pct()),
            "heatmap_24x7" => MetricValue::Table(
                self.heatmap_24x7()
                    .into_iter()
                    .enumerate()
                    .map(|(dow, row)| {
                        json!({
                            "weekday": dow,
                            "counts": Value::Array(
                                row.iter().map(|c| Value::from(*c)).collect(),
                            ),
                        })
                    })
                    .collect(),
            ),
            "monthly_seasonality_cv" => MetricValue::scalar_opt(self.monthly_seasonality_cv()),
            "peak_offpeak_ratio" => MetricValue::scalar_opt(self.peak_offpeak_ratio()),
            "concentration_top20_skills_pct" => {
                MetricValue::scalar_opt(self.concentration_top20_skills_pct())
            }
            "plot_heatmap_24x7" => MetricValue::Plot(self.plot_heatmap_24x7()),
            "plot_channel_distribution" => MetricValue::Plot(self.plot_channel_distribution()),
            "plot_skill_pareto" => MetricValue::Plot(self.plot_skill_pareto()),
            other => {
                return Err(UnknownMetric {
                    dimension: CLASS_VOLUME,
                    metric: other.to_string(),
                })
            }
        };
        Ok(value)
    }
}
