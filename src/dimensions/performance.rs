use super::stats;
use super::{DimensionCalculator, UnknownMetric, CLASS_PERFORMANCE};
use crate::dataset::{InteractionFrame, InteractionRecord, SchemaError};
use crate::pipeline::value::{json_num_opt, ChartKind, ChartSeries, ChartSpec, MetricValue};
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

const REQUIRED_COLUMNS: [&str; 9] = [
    "interaction_id",
    "datetime_start",
    "queue_skill",
    "channel",
    "duration_talk",
    "hold_time",
    "wrap_up_time",
    "agent_id",
    "transfer_flag",
];

/// Saturating-normalization reference points for the composite score.
const AHT_GOOD: f64 = 300.0;
const AHT_BAD: f64 = 900.0;
const VAR_RATIO_GOOD: f64 = 1.2;
const VAR_RATIO_BAD: f64 = 3.0;

const HIGH_HOLD_THRESHOLD_SECS: f64 = 60.0;

/// Operational performance dimension: speed, resolution quality and service
/// variability, plus a blended 0-10 performance score.
pub struct PerformanceCalculator<'a> {
    frame: &'a InteractionFrame,
}

impl<'a> PerformanceCalculator<'a> {
    pub fn new(frame: &'a InteractionFrame) -> Result<Self, SchemaError> {
        frame.require_columns(CLASS_PERFORMANCE, &REQUIRED_COLUMNS)?;
        Ok(Self { frame })
    }

    fn valid_handle_times(&self) -> Vec<f64> {
        self.frame
            .records()
            .iter()
            .filter(|r| r.valid)
            .map(|r| r.handle_secs)
            .collect()
    }

    /// P10/P50/P90 of handle time over valid rows, plus the P90/P50 spread
    /// ratio. Empty when no valid rows exist; ratio null when P50 is zero.
    pub fn aht_distribution(&self) -> Map<String, Value> {
        let handle = self.valid_handle_times();
        let mut out = Map::new();
        let (Some(p10), Some(p50), Some(p90)) = (
            stats::percentile(&handle, 10.0),
            stats::percentile(&handle, 50.0),
            stats::percentile(&handle, 90.0),
        ) else {
            return out;
        };

        let ratio = (p50 > 0.0).then(|| stats::round3(p90 / p50));
        out.insert("p10".to_string(), json!(stats::round2(p10)));
        out.insert("p50".to_string(), json!(stats::round2(p50)));
        out.insert("p90".to_string(), json!(stats::round2(p90)));
        out.insert("p90_p50_ratio".to_string(), json_num_opt(ratio));
        out
    }

    /// Median talk / hold / wrap-up per skill, all rows, one table row per
    /// skill in label order.
    pub fn talk_hold_acw_p50_by_skill(&self) -> Vec<Value> {
        let mut groups: BTreeMap<&str, (Vec<f64>, Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for record in self.frame.records() {
            let entry = groups.entry(record.queue_skill.as_str()).or_default();
            if let Some(v) = record.talk_secs {
                entry.0.push(v);
            }
            if let Some(v) = record.hold_secs {
                entry.1.push(v);
            }
            if let Some(v) = record.wrap_secs {
                entry.2.push(v);
            }
        }

        groups
            .into_iter()
            .map(|(skill, (talk, hold, acw))| {
                json!({
                    "queue_skill": skill,
                    "talk_p50": json_num_opt(stats::percentile(&talk, 50.0).map(stats::round2)),
                    "hold_p50": json_num_opt(stats::percentile(&hold, 50.0).map(stats::round2)),
                    "acw_p50": json_num_opt(stats::percentile(&acw, 50.0).map(stats::round2)),
                })
            })
            .collect()
    }

    /// First-contact resolution, three-tier fallback: explicit resolution
    /// flag, then the FCR flag, then the escalation complement.
    pub fn fcr_rate(&self) -> Option<f64> {
        let total = self.frame.len();
        if total == 0 {
            return None;
        }

        if self.frame.has_column("is_resolved") {
            let resolved = self
                .frame
                .records()
                .iter()
                .filter(|r| r.resolved == Some(true))
                .count();
            return Some(clamp_pct(stats::round2(
                resolved as f64 / total as f64 * 100.0,
            )));
        }

        if self.frame.has_column("fcr_real_flag") {
            let flagged = self
                .frame
                .records()
                .iter()
                .filter(|r| r.fcr == Some(true))
                .count();
            return Some(clamp_pct(stats::round2(
                flagged as f64 / total as f64 * 100.0,
            )));
        }

        self.escalation_rate()
            .map(|esc| clamp_pct(stats::round2(100.0 - esc)))
    }

    pub fn escalation_rate(&self) -> Option<f64> {
        let total = self.frame.len();
        if total == 0 {
            return None;
        }
        let escalated = self
            .frame
            .records()
            .iter()
            .filter(|r| r.transfer == Some(true))
            .count();
        Some(stats::round2(escalated as f64 / total as f64 * 100.0))
    }

    /// Abandonment percentage; undefined when no abandonment column exists.
    pub fn abandonment_rate(&self) -> Option<f64> {
        let total = self.frame.len();
        if total == 0 || self.frame.abandonment_column().is_none() {
            return None;
        }
        let abandoned = self
            .frame
            .records()
            .iter()
            .filter(|r| r.abandoned == Some(true))
            .count();
        Some(stats::round2(abandoned as f64 / total as f64 * 100.0))
    }

    /// Share of interactions held longer than 60 seconds; a complexity proxy.
    pub fn high_hold_time_rate(&self) -> Option<f64> {
        let total = self.frame.len();
        if total == 0 {
            return None;
        }
        let high = self
            .frame
            .records()
            .iter()
            .filter(|r| r.hold_secs.unwrap_or(0.0) > HIGH_HOLD_THRESHOLD_SECS)
            .count();
        Some(stats::round2(high as f64 / total as f64 * 100.0))
    }

    /// Share of customers who contact again for the same skill within seven
    /// days. A customer contacting two different skills is not recurrent.
    pub fn recurrence_rate_7d(&self) -> Option<f64> {
        if !self.frame.has_customer_identity() {
            return None;
        }

        let mut contacts: BTreeMap<(&str, &str), Vec<NaiveDateTime>> = BTreeMap::new();
        let mut customers: HashSet<&str> = HashSet::new();
        for record in self.frame.records() {
            let (Some(started), Some(customer)) =
                (record.started_at, record.customer_id.as_deref())
            else {
                continue;
            };
            customers.insert(customer);
            contacts
                .entry((customer, record.queue_skill.as_str()))
                .or_default()
                .push(started);
        }

        if customers.is_empty() {
            return None;
        }

        let window = Duration::days(7);
        let mut recurrent: HashSet<&str> = HashSet::new();
        for ((customer, _), mut times) in contacts {
            times.sort();
            if times.windows(2).any(|pair| pair[1] - pair[0] < window) {
                recurrent.insert(customer);
            }
        }

        Some(stats::round2(
            recurrent.len() as f64 / customers.len() as f64 * 100.0,
        ))
    }

    /// Among same-customer consecutive contacts within seven days (any
    /// skill), the share arriving through the same channel. Undefined when no
    /// recurrent pair exists.
    pub fn repeat_channel_rate(&self) -> Option<f64> {
        let mut by_customer: BTreeMap<&str, Vec<(NaiveDateTime, &str)>> = BTreeMap::new();
        for record in self.frame.records() {
            let (Some(started), Some(customer)) =
                (record.started_at, record.customer_id.as_deref())
            else {
                continue;
            };
            by_customer
                .entry(customer)
                .or_default()
                .push((started, record.channel.as_str()));
        }

        let window = Duration::days(7);
        let mut recurrent_pairs = 0u64;
        let mut same_channel = 0u64;
        for contacts in by_customer.values_mut() {
            contacts.sort_by_key(|(t, _)| *t);
            for pair in contacts.windows(2) {
                if pair[1].0 - pair[0].0 < window {
                    recurrent_pairs += 1;
                    if pair[0].1 == pair[1].1 {
                        same_channel += 1;
                    }
                }
            }
        }

        if recurrent_pairs == 0 {
            return None;
        }
        Some(stats::round2(
            same_channel as f64 / recurrent_pairs as f64 * 100.0,
        ))
    }

    /// Total handle time over total logged time. Undefined without logged
    /// data or when the logged total is zero.
    pub fn occupancy_rate(&self) -> Option<f64> {
        if !self.frame.has_column("logged_time") {
            return None;
        }
        let logged: f64 = self
            .frame
            .records()
            .iter()
            .map(|r| r.logged_secs.unwrap_or(0.0))
            .sum();
        if logged == 0.0 {
            return None;
        }
        let handle: f64 = self.frame.records().iter().map(|r| r.handle_secs).sum();
        Some(stats::round2(handle / logged * 100.0))
    }

    /// Blended 0-10 score: speed 0.4, resolution 0.3, variability 0.2, other
    /// factors (occupancy + escalation) 0.1. Empty when no valid AHT data.
    pub fn performance_score(&self) -> Map<String, Value> {
        let dist = self.aht_distribution();
        let Some(p50) = dist.get("p50").and_then(Value::as_f64) else {
            return Map::new();
        };
        let ratio = dist.get("p90_p50_ratio").and_then(Value::as_f64);

        let aht_norm = scale_to_0_10(Some(p50), AHT_GOOD, AHT_BAD);
        let fcr_norm = self.fcr_rate().map(|pct| pct / 10.0).unwrap_or(0.0);
        let var_norm = scale_to_0_10(ratio, VAR_RATIO_GOOD, VAR_RATIO_BAD);
        let other_score = other_factors_score(self.occupancy_rate(), self.escalation_rate());

        let score = 0.4 * (10.0 - aht_norm)
            + 0.3 * fcr_norm
            + 0.2 * (10.0 - var_norm)
            + 0.1 * other_score;
        let score = score.clamp(0.0, 10.0);

        let mut out = Map::new();
        out.insert("score".to_string(), json!(stats::round2(score)));
        out.insert("aht_norm".to_string(), json!(stats::round2(aht_norm)));
        out.insert("fcr_norm".to_string(), json!(stats::round2(fcr_norm)));
        out.insert("var_norm".to_string(), json!(stats::round2(var_norm)));
        out.insert(
            "other_score".to_string(),
            json!(stats::round2(other_score)),
        );
        out
    }

    /// Per-skill operational snapshot, one table row per skill.
    pub fn metrics_by_skill(&self) -> Vec<Value> {
        let mut groups: BTreeMap<&str, Vec<&InteractionRecord>> = BTreeMap::new();
        for record in self.frame.records() {
            groups
                .entry(record.queue_skill.as_str())
                .or_default()
                .push(record);
        }

        let has_abandon = self.frame.abandonment_column().is_some();
        let has_repeat = self.frame.repeat_column().is_some();

        groups
            .into_iter()
            .map(|(skill, rows)| {
                let total = rows.len() as f64;
                let transfers = rows.iter().filter(|r| r.transfer == Some(true)).count();
                let transfer_rate = stats::round2(transfers as f64 / total * 100.0);
                let fcr_technical = stats::round2(100.0 - transfer_rate);

                let abandonment_rate = if has_abandon {
                    let abandoned = rows.iter().filter(|r| r.abandoned == Some(true)).count();
                    stats::round2(abandoned as f64 / total * 100.0)
                } else {
                    0.0
                };

                // FCR real: neither transferred nor re-contacted within 7d.
                let fcr_real = if has_repeat {
                    let resolved_once = rows
                        .iter()
                        .filter(|r| {
                            r.transfer != Some(true) && r.repeat_within_7d != Some(true)
                        })
                        .count();
                    stats::round2(resolved_once as f64 / total * 100.0)
                } else {
                    fcr_technical
                };

                let valid_handle: Vec<f64> =
                    rows.iter().filter(|r| r.valid).map(|r| r.handle_secs).collect();
                let all_handle: Vec<f64> = rows.iter().map(|r| r.handle_secs).collect();
                let valid_hold: Vec<f64> = rows
                    .iter()
                    .filter(|r| r.valid)
                    .filter_map(|r| r.hold_secs)
                    .collect();

                json!({
                    "skill": skill,
                    "volume": rows.len(),
                    "transfer_rate": transfer_rate,
                    "abandonment_rate": abandonment_rate,
                    "fcr_technical": fcr_technical,
                    "fcr_real": fcr_real,
                    "aht_mean": stats::round2(stats::mean(&valid_handle).unwrap_or(0.0)),
                    "aht_total": stats::round2(stats::mean(&all_handle).unwrap_or(0.0)),
                    "hold_time_mean": stats::round2(stats::mean(&valid_hold).unwrap_or(0.0)),
                })
            })
            .collect()
    }

    pub fn plot_aht_boxplot_by_skill(&self) -> ChartSpec {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for record in self.frame.records() {
            groups
                .entry(record.queue_skill.as_str())
                .or_default()
                .push(record.handle_secs);
        }
        if groups.is_empty() {
            return ChartSpec::placeholder("AHT distribution by skill", "no handle-time data");
        }

        let mut chart = ChartSpec::new(
            ChartKind::Box,
            "AHT distribution by skill",
            "Skill / queue",
            "AHT (seconds)",
        );
        chart.categories = groups.keys().map(|s| s.to_string()).collect();
        for (label, quantile) in [("p10", 10.0), ("p50", 50.0), ("p90", 90.0)] {
            chart.series.push(ChartSeries::values(
                label,
                groups
                    .values()
                    .map(|v| stats::percentile(v, quantile).unwrap_or(0.0))
                    .collect(),
            ));
        }
        chart
    }

    pub fn plot_resolution_funnel_by_skill(&self) -> ChartSpec {
        let rows = self.talk_hold_acw_p50_by_skill();
        if rows.is_empty() {
            return ChartSpec::placeholder("Resolution funnel by skill", "no data for funnel");
        }

        let mut chart = ChartSpec::new(
            ChartKind::StackedBar,
            "Resolution funnel (P50) by skill",
            "Skill / queue",
            "Seconds",
        );
        chart.categories = rows
            .iter()
            .filter_map(|r| r["queue_skill"].as_str().map(str::to_string))
            .collect();
        for (name, key) in [("Talk P50", "talk_p50"), ("Hold P50", "hold_p50"), ("ACW P50", "acw_p50")] {
            chart.series.push(ChartSeries::values(
                name,
                rows.iter()
                    .map(|r| r[key].as_f64().unwrap_or(0.0))
                    .collect(),
            ));
        }
        chart
    }
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Linear scale mapping `good` to 0 and `bad` to 10, saturating outside the
/// band. Missing input takes the neutral midpoint.
fn scale_to_0_10(value: Option<f64>, good: f64, bad: f64) -> f64 {
    let Some(value) = value else {
        return 5.0;
    };
    if good == bad {
        return 5.0;
    }
    if good < bad {
        if value <= good {
            0.0
        } else if value >= bad {
            10.0
        } else {
            10.0 * (value - good) / (bad - good)
        }
    } else if value >= good {
        0.0
    } else if value <= bad {
        10.0
    } else {
        10.0 * (good - value) / (good - bad)
    }
}

/// Occupancy (ideal near 80%) and escalation (ideal low) blended evenly.
fn other_factors_score(occupancy_pct: Option<f64>, escalation_pct: Option<f64>) -> f64 {
    let occ_score = match occupancy_pct {
        Some(occ) => {
            let penalty = ((occ - 80.0).abs() / 5.0 * 2.0).min(10.0);
            (10.0 - penalty).max(0.0)
        }
        None => 5.0,
    };

    let esc_score = match escalation_pct {
        Some(esc) if esc <= 0.0 => 10.0,
        Some(esc) if esc >= 40.0 => 0.0,
        Some(esc) => 10.0 * (1.0 - esc / 40.0),
        None => 5.0,
    };

    (occ_score + esc_score) / 2.0
}

impl DimensionCalculator for PerformanceCalculator<'_> {
    fn name(&self) -> &'static str {
        CLASS_PERFORMANCE
    }

    fn run_metric(&self, metric: &str) -> Result<MetricValue, UnknownMetric> {
        let value = match metric {
            "aht_distribution" => MetricValue::Record(self.aht_distribution()),
            "talk_hold_acw_p50_by_skill" => MetricValue::Table(self.talk_hold_acw_p50_by_skill()),
            "fcr_rate" => MetricValue::scalar_opt(self.fcr_rate()),
            "escalation_rate" => MetricValue::scalar_opt(self.escalation_rate()),
            "abandonment_rate" => MetricValue::scalar_opt(self.abandonment_rate()),
            "high_hold_time_rate" => MetricValue::scalar_opt(self.high_hold_time_rate()),
            "recurrence_rate_7d" => MetricValue::scalar_opt(self.recurrence_rate_7d()),
            "repeat_channel_rate" => MetricValue::scalar_opt(self.repeat_channel_rate()),
            "occupancy_rate" => MetricValue::scalar_opt(self.occupancy_rate()),
            "performance_score" => MetricValue::Record(self.performance_score()),
            "metrics_by_skill" => MetricValue::Table(self.metrics_by_skill()),
            "plot_aht_boxplot_by_skill" => MetricValue::Plot(self.plot_aht_boxplot_by_skill()),
            "plot_resolution_funnel_by_skill" => {
                MetricValue::Plot(self.plot_resolution_funnel_by_skill())
            }
            other => {
                return Err(UnknownMetric {
                    dimension: CLASS_PERFORMANCE,
                    metric: other.to_string(),
                })
            }
        };
        Ok(value)
    }
}
