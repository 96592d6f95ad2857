use super::stats;
use super::{DimensionCalculator, UnknownMetric, CLASS_COST};
use crate::dataset::{InteractionFrame, SchemaError};
use crate::pipeline::value::{ChartKind, ChartSeries, ChartSpec, MetricValue};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

const REQUIRED_COLUMNS: [&str; 7] = [
    "interaction_id",
    "datetime_start",
    "queue_skill",
    "channel",
    "duration_talk",
    "hold_time",
    "wrap_up_time",
];

/// Share of interactions assumed to sit above the median handle time when
/// estimating inefficiency cost.
const INEFFICIENCY_AFFECTED_FRACTION: f64 = 0.4;

/// Externally supplied monetary parameters. The labor rate is mandatory for
/// any monetary output; everything else defaults to "not modeled".
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Fully-loaded agent cost per hour.
    pub labor_cost_per_hour: f64,
    /// Variable overhead as a fraction of labor cost (0.1 = 10%).
    #[serde(default)]
    pub overhead_rate: f64,
    /// Annual technology cost (licenses, infrastructure, ...).
    #[serde(default)]
    pub tech_costs_annual: f64,
    /// Cost per automated interaction.
    #[serde(default)]
    pub automation_cpi: Option<f64>,
    /// Automatable share of volume, 0-1.
    #[serde(default)]
    pub automation_volume_share: f64,
    /// Automation success rate, 0-1.
    #[serde(default)]
    pub automation_success_rate: f64,
    /// Scales observed volume to a yearly figure when the sample covers a
    /// shorter period (1.0 = the dataset already spans a year).
    #[serde(default = "default_annualization_factor")]
    pub annualization_factor: f64,
}

fn default_annualization_factor() -> f64 {
    1.0
}

/// Per skill/channel aggregate shared by every monetary metric.
struct CostGroup {
    skill: String,
    channel: String,
    handle_times: Vec<f64>,
    aht_mean: f64,
    labor_cost: f64,
    overhead_cost: f64,
    cpi_total: f64,
    /// Distinct interactions scaled by the annualization factor.
    volume: f64,
    row_count: usize,
}

/// Economy and cost dimension. Every metric returns empty output without a
/// cost configuration; nothing here ever errors at metric time.
pub struct CostCalculator<'a> {
    frame: &'a InteractionFrame,
    config: Option<CostConfig>,
}

impl<'a> CostCalculator<'a> {
    pub fn new(frame: &'a InteractionFrame, config: Option<CostConfig>) -> Result<Self, SchemaError> {
        frame.require_columns(CLASS_COST, &REQUIRED_COLUMNS)?;
        Ok(Self { frame, config })
    }

    fn groups(&self) -> Option<(Vec<CostGroup>, &CostConfig)> {
        let config = self.config.as_ref()?;

        let mut handle: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
        let mut ids: BTreeMap<(&str, &str), HashSet<&str>> = BTreeMap::new();
        for record in self.frame.records() {
            let key = (record.queue_skill.as_str(), record.channel.as_str());
            handle.entry(key).or_default().push(record.handle_secs);
            if let Some(id) = record.interaction_id.as_deref() {
                ids.entry(key).or_default().insert(id);
            }
        }
        if handle.is_empty() {
            return None;
        }

        let groups = handle
            .into_iter()
            .map(|((skill, channel), handle_times)| {
                let aht_mean = stats::mean(&handle_times).unwrap_or(0.0);
                let labor_cost = config.labor_cost_per_hour * aht_mean / 3600.0;
                let overhead_cost = labor_cost * config.overhead_rate;
                let volume = ids
                    .get(&(skill, channel))
                    .map(|set| set.len() as f64)
                    .unwrap_or(0.0)
                    * config.annualization_factor;
                CostGroup {
                    skill: skill.to_string(),
                    channel: channel.to_string(),
                    aht_mean,
                    labor_cost,
                    overhead_cost,
                    cpi_total: labor_cost + overhead_cost,
                    volume,
                    row_count: handle_times.len(),
                    handle_times,
                }
            })
            .collect();
        Some((groups, config))
    }

    /// Cost per interaction (labor at mean handle time plus variable
    /// overhead) per skill/channel pair.
    pub fn cpi_by_skill_channel(&self) -> Vec<Value> {
        let Some((groups, _)) = self.groups() else {
            return Vec::new();
        };
        groups
            .iter()
            .map(|g| {
                json!({
                    "queue_skill": g.skill,
                    "channel": g.channel,
                    "aht_seconds": stats::round2(g.aht_mean),
                    "labor_cost": stats::round4(g.labor_cost),
                    "overhead_cost": stats::round4(g.overhead_cost),
                    "cpi_total": stats::round4(g.cpi_total),
                })
            })
            .collect()
    }

    /// Annualized cost per skill/channel pair: CPI times distinct volume
    /// scaled by the annualization factor.
    pub fn annual_cost_by_skill_channel(&self) -> Vec<Value> {
        let Some((groups, _)) = self.groups() else {
            return Vec::new();
        };
        groups
            .iter()
            .map(|g| {
                json!({
                    "queue_skill": g.skill,
                    "channel": g.channel,
                    "aht_seconds": stats::round2(g.aht_mean),
                    "labor_cost": stats::round4(g.labor_cost),
                    "overhead_cost": stats::round4(g.overhead_cost),
                    "cpi_total": stats::round4(g.cpi_total),
                    "volume": g.volume,
                    "annual_cost": stats::round2(g.cpi_total * g.volume),
                })
            })
            .collect()
    }

    /// Labor / overhead / tech split of the annual cost base. Empty when the
    /// total is not positive.
    pub fn cost_breakdown(&self) -> Map<String, Value> {
        let Some((groups, config)) = self.groups() else {
            return Map::new();
        };

        let annual_labor: f64 = groups.iter().map(|g| g.labor_cost * g.volume).sum();
        let annual_overhead: f64 = groups.iter().map(|g| g.overhead_cost * g.volume).sum();
        let annual_tech = config.tech_costs_annual;
        let total = annual_labor + annual_overhead + annual_tech;
        if total <= 0.0 {
            return Map::new();
        }

        let mut out = Map::new();
        out.insert(
            "labor_pct".to_string(),
            json!(stats::round2(annual_labor / total * 100.0)),
        );
        out.insert(
            "overhead_pct".to_string(),
            json!(stats::round2(annual_overhead / total * 100.0)),
        );
        out.insert(
            "tech_pct".to_string(),
            json!(stats::round2(annual_tech / total * 100.0)),
        );
        out.insert("labor_annual".to_string(), json!(stats::round2(annual_labor)));
        out.insert(
            "overhead_annual".to_string(),
            json!(stats::round2(annual_overhead)),
        );
        out.insert("tech_annual".to_string(), json!(stats::round2(annual_tech)));
        out.insert("total_annual".to_string(), json!(stats::round2(total)));
        out
    }

    /// Order-of-magnitude cost of service variability: excess seconds above
    /// the median, over the assumed affected fraction, at each group's labor
    /// cost per second.
    pub fn inefficiency_cost_by_skill_channel(&self) -> Vec<Value> {
        let Some((groups, _)) = self.groups() else {
            return Vec::new();
        };
        groups
            .iter()
            .map(|g| {
                let p50 = stats::percentile(&g.handle_times, 50.0).unwrap_or(0.0);
                let p90 = stats::percentile(&g.handle_times, 90.0).unwrap_or(0.0);
                let delta = (p90 - p50).max(0.0);
                let ineff_seconds =
                    delta * g.row_count as f64 * INEFFICIENCY_AFFECTED_FRACTION;
                let cost_per_second = if g.aht_mean > 0.0 {
                    g.labor_cost / g.aht_mean
                } else {
                    0.0
                };
                json!({
                    "queue_skill": g.skill,
                    "channel": g.channel,
                    "aht_p50": stats::round2(p50),
                    "aht_p90": stats::round2(p90),
                    "volume": g.row_count,
                    "ineff_seconds": stats::round2(ineff_seconds),
                    "ineff_cost": stats::round2(ineff_seconds * cost_per_second),
                })
            })
            .collect()
    }

    /// Annual savings from automating a share of the volume at the automated
    /// unit cost. Empty unless the automation parameters are all set.
    pub fn potential_savings(&self) -> Map<String, Value> {
        let Some((groups, config)) = self.groups() else {
            return Map::new();
        };
        let Some(automation_cpi) = config.automation_cpi else {
            return Map::new();
        };
        if config.automation_volume_share <= 0.0 || config.automation_success_rate <= 0.0 {
            return Map::new();
        }

        let total_volume: f64 = groups.iter().map(|g| g.volume).sum();
        if total_volume <= 0.0 {
            return Map::new();
        }

        let weighted_cpi: f64 =
            groups.iter().map(|g| g.cpi_total * g.volume).sum::<f64>() / total_volume;
        let volume_automatable = total_volume * config.automation_volume_share;
        let effective_volume = volume_automatable * config.automation_success_rate;
        let delta_cpi = (weighted_cpi - automation_cpi).max(0.0);

        let mut out = Map::new();
        out.insert("cpi_human".to_string(), json!(stats::round4(weighted_cpi)));
        out.insert(
            "cpi_automated".to_string(),
            json!(stats::round4(automation_cpi)),
        );
        out.insert("volume_total".to_string(), json!(stats::round2(total_volume)));
        out.insert(
            "volume_automatable".to_string(),
            json!(stats::round2(volume_automatable)),
        );
        out.insert(
            "effective_volume".to_string(),
            json!(stats::round2(effective_volume)),
        );
        out.insert(
            "annual_savings".to_string(),
            json!(stats::round2(delta_cpi * effective_volume)),
        );
        out
    }

    pub fn plot_cost_waterfall(&self) -> ChartSpec {
        let breakdown = self.cost_breakdown();
        if breakdown.is_empty() {
            return ChartSpec::placeholder("Annual cost breakdown", "no cost configuration");
        }

        let mut chart = ChartSpec::new(
            ChartKind::Waterfall,
            "Annual cost breakdown",
            "Cost component",
            "Annual cost",
        );
        chart.categories = vec![
            "Labor".to_string(),
            "Overhead".to_string(),
            "Tech".to_string(),
        ];
        chart.series = vec![ChartSeries::values(
            "annual_cost",
            ["labor_annual", "overhead_annual", "tech_annual"]
                .iter()
                .map(|key| breakdown[*key].as_f64().unwrap_or(0.0))
                .collect(),
        )];
        chart
    }

    pub fn plot_cpi_by_channel(&self) -> ChartSpec {
        let Some((groups, _)) = self.groups() else {
            return ChartSpec::placeholder("CPI by channel", "no cost configuration");
        };

        // Volume-weighted mean CPI per channel.
        let mut per_channel: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        for g in &groups {
            let entry = per_channel.entry(g.channel.as_str()).or_default();
            entry.0 += g.cpi_total * g.volume;
            entry.1 += g.volume;
        }

        let mut chart = ChartSpec::new(
            ChartKind::Bar,
            "Cost per interaction by channel",
            "Channel",
            "Mean CPI",
        );
        chart.categories = per_channel.keys().map(|c| c.to_string()).collect();
        chart.series = vec![ChartSeries::values(
            "cpi_mean",
            per_channel
                .values()
                .map(|(weighted, volume)| stats::round4(weighted / volume.max(1.0)))
                .collect(),
        )];
        chart
    }
}

impl DimensionCalculator for CostCalculator<'_> {
    fn name(&self) -> &'static str {
        CLASS_COST
    }

    fn run_metric(&self, metric: &str) -> Result<MetricValue, UnknownMetric> {
        let value = match metric {
            "cpi_by_skill_channel" => MetricValue::Table(self.cpi_by_skill_channel()),
            "annual_cost_by_skill_channel" => {
                MetricValue::Table(self.annual_cost_by_skill_channel())
            }
            "cost_breakdown" => MetricValue::Record(self.cost_breakdown()),
            "inefficiency_cost_by_skill_channel" => {
                MetricValue::Table(self.inefficiency_cost_by_skill_channel())
            }
            "potential_savings" => MetricValue::Record(self.potential_savings()),
            "plot_cost_waterfall" => MetricValue::Plot(self.plot_cost_waterfall()),
            "plot_cpi_by_channel" => MetricValue::Plot(self.plot_cpi_by_channel()),
            other => {
                return Err(UnknownMetric {
                    dimension: CLASS_COST,
                    metric: other.to_string(),
                })
            }
        };
        Ok(value)
    }
}
