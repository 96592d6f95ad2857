use super::stats;
use super::{DimensionCalculator, UnknownMetric, CLASS_SATISFACTION};
use crate::dataset::{InteractionFrame, InteractionRecord, SchemaError};
use crate::pipeline::value::{ChartKind, ChartSeries, ChartSpec, MetricValue};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const REQUIRED_COLUMNS: [&str; 7] = [
    "interaction_id",
    "datetime_start",
    "queue_skill",
    "channel",
    "duration_talk",
    "hold_time",
    "wrap_up_time",
];

/// Satisfaction and experience dimension. Every satisfaction input is
/// optional; metrics degrade to empty results, never to errors.
pub struct SatisfactionCalculator<'a> {
    frame: &'a InteractionFrame,
}

impl<'a> SatisfactionCalculator<'a> {
    pub fn new(frame: &'a InteractionFrame) -> Result<Self, SchemaError> {
        frame.require_columns(CLASS_SATISFACTION, &REQUIRED_COLUMNS)?;
        Ok(Self { frame })
    }

    /// Long-form average of one optional score per skill/channel pair.
    fn avg_by_skill_channel<F>(&self, score: F) -> Vec<Value>
    where
        F: Fn(&InteractionRecord) -> Option<f64>,
    {
        let mut groups: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
        for record in self.frame.records() {
            if let Some(value) = score(record) {
                groups
                    .entry((record.queue_skill.as_str(), record.channel.as_str()))
                    .or_default()
                    .push(value);
            }
        }

        groups
            .into_iter()
            .filter_map(|((skill, channel), values)| {
                stats::mean(&values).map(|avg| {
                    json!({
                        "queue_skill": skill,
                        "channel": channel,
                        "avg": stats::round2(avg),
                    })
                })
            })
            .collect()
    }

    pub fn csat_avg_by_skill_channel(&self) -> Vec<Value> {
        self.avg_by_skill_channel(|r| r.csat)
    }

    pub fn nps_avg_by_skill_channel(&self) -> Vec<Value> {
        self.avg_by_skill_channel(|r| r.nps)
    }

    pub fn ces_avg_by_skill_channel(&self) -> Vec<Value> {
        self.avg_by_skill_channel(|r| r.ces)
    }

    pub fn csat_global(&self) -> Option<f64> {
        let scores: Vec<f64> = self.frame.records().iter().filter_map(|r| r.csat).collect();
        stats::mean(&scores).map(stats::round2)
    }

    fn csat_aht_pairs(&self) -> (Vec<f64>, Vec<f64>) {
        let mut aht = Vec::new();
        let mut csat = Vec::new();
        for record in self.frame.records() {
            if let (Some(a), Some(c)) = (record.aht_secs, record.csat) {
                aht.push(a);
                csat.push(c);
            }
        }
        (aht, csat)
    }

    /// Pearson correlation between CSAT and AHT with an interpretation code:
    /// `no_data`, `insufficient_n`, `zero_variance`, or the sign band
    /// (`negative` below -0.3, `positive` above 0.3, `neutral` between).
    pub fn csat_aht_correlation(&self) -> Map<String, Value> {
        let (aht, csat) = self.csat_aht_pairs();

        let (r, n, code) = if csat.is_empty() {
            (None, 0, "no_data")
        } else if csat.len() < 2 {
            (None, csat.len(), "insufficient_n")
        } else {
            match stats::pearson(&aht, &csat) {
                None => (None, csat.len(), "zero_variance"),
                Some(r) if r < -0.3 => (Some(r), csat.len(), "negative"),
                Some(r) if r > 0.3 => (Some(r), csat.len(), "positive"),
                Some(r) => (Some(r), csat.len(), "neutral"),
            }
        };

        let mut out = Map::new();
        out.insert(
            "r".to_string(),
            crate::pipeline::value::json_num_opt(r.map(stats::round3)),
        );
        out.insert("n".to_string(), json!(n));
        out.insert("interpretation_code".to_string(), json!(code));
        out
    }

    /// Per-skill sweet-spot classification against the global 40th/60th
    /// percentiles of AHT and CSAT. Empty without paired data.
    pub fn csat_aht_skill_summary(&self) -> Vec<Value> {
        let (aht_all, csat_all) = self.csat_aht_pairs();
        let (Some(aht_p40), Some(aht_p60), Some(csat_p40), Some(csat_p60)) = (
            stats::percentile(&aht_all, 40.0),
            stats::percentile(&aht_all, 60.0),
            stats::percentile(&csat_all, 40.0),
            stats::percentile(&csat_all, 60.0),
        ) else {
            return Vec::new();
        };

        let mut groups: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for record in self.frame.records() {
            if let (Some(a), Some(c)) = (record.aht_secs, record.csat) {
                let entry = groups.entry(record.queue_skill.as_str()).or_default();
                entry.0.push(c);
                entry.1.push(a);
            }
        }

        groups
            .into_iter()
            .filter_map(|(skill, (csat, aht))| {
                let csat_avg = stats::mean(&csat)?;
                let aht_avg = stats::mean(&aht)?;
                let classification = if aht_avg <= aht_p40 && csat_avg >= csat_p60 {
                    "ideal_to_automate"
                } else if aht_avg >= aht_p60 && csat_avg >= csat_p40 {
                    "requires_human"
                } else {
                    "neutral"
                };
                Some(json!({
                    "queue_skill": skill,
                    "csat_avg": stats::round2(csat_avg),
                    "aht_avg": stats::round2(aht_avg),
                    "classification": classification,
                }))
            })
            .collect()
    }

    pub fn plot_csat_vs_aht_scatter(&self) -> ChartSpec {
        let mut groups: BTreeMap<&str, Vec<[f64; 2]>> = BTreeMap::new();
        for record in self.frame.records() {
            if let (Some(a), Some(c)) = (record.aht_secs, record.csat) {
                groups
                    .entry(record.queue_skill.as_str())
                    .or_default()
                    .push([a, c]);
            }
        }
        if groups.is_empty() {
            return ChartSpec::placeholder("CSAT vs AHT by skill", "no CSAT/AHT data");
        }

        let mut chart = ChartSpec::new(
            ChartKind::Scatter,
            "CSAT vs AHT by skill",
            "AHT (seconds)",
            "CSAT",
        );
        chart.series = groups
            .into_iter()
            .map(|(skill, points)| ChartSeries::points(skill, points))
            .collect();
        chart
    }

    pub fn plot_csat_distribution(&self) -> ChartSpec {
        let scores: Vec<f64> = self.frame.records().iter().filter_map(|r| r.csat).collect();
        if scores.is_empty() {
            return ChartSpec::placeholder("CSAT distribution", "no CSAT data");
        }

        let mut chart = ChartSpec::new(
            ChartKind::Histogram,
            "CSAT distribution",
            "CSAT",
            "Frequency",
        );
        chart.series = vec![ChartSeries::values("csat", scores)];
        chart
    }
}

impl DimensionCalculator for SatisfactionCalculator<'_> {
    fn name(&self) -> &'static str {
        CLASS_SATISFACTION
    }

    fn run_metric(&self, metric: &str) -> Result<MetricValue, UnknownMetric> {
        let value = match metric {
            "csat_avg_by_skill_channel" => MetricValue::Table(self.csat_avg_by_skill_channel()),
            "nps_avg_by_skill_channel" => MetricValue::Table(self.nps_avg_by_skill_channel()),
            "ces_avg_by_skill_channel" => MetricValue::Table(self.ces_avg_by_skill_channel()),
            "csat_global" => MetricValue::scalar_opt(self.csat_global()),
            "csat_aht_correlation" => MetricValue::Record(self.csat_aht_correlation()),
            "csat_aht_skill_summary" => MetricValue::Table(self.csat_aht_skill_summary()),
            "plot_csat_vs_aht_scatter" => MetricValue::Plot(self.plot_csat_vs_aht_scatter()),
            "plot_csat_distribution" => MetricValue::Plot(self.plot_csat_distribution()),
            other => {
                return Err(UnknownMetric {
                    dimension: CLASS_SATISFACTION,
                    metric: other.to_string(),
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str =
        "interaction_id,datetime_start,queue_skill,channel,duration_talk,hold_time,wrap_up_time";

    fn frame_from(csv: &str) -> InteractionFrame {
        InteractionFrame::from_csv_reader(Cursor::new(csv)).expect("frame parses")
    }

    #[test]
    fn metrics_degrade_when_scores_absent() {
        let csv = format!(
            "{HEADER}\n\
id1,2024-01-01 10:00:00,sales,voice,300,0,60\n"
        );
        let frame = frame_from(&csv);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");

        assert!(calc.csat_avg_by_skill_channel().is_empty());
        assert_eq!(calc.csat_global(), None);
        assert!(calc.csat_aht_skill_summary().is_empty());

        let corr = calc.csat_aht_correlation();
        assert_eq!(corr["interpretation_code"], "no_data");
        assert_eq!(corr["r"], Value::Null);
        assert_eq!(corr["n"], 0);
    }

    #[test]
    fn csat_averages_group_by_skill_and_channel() {
        let csv = format!(
            "{HEADER},csat_score\n\
id1,2024-01-01 10:00:00,sales,voice,300,0,60,4\n\
id2,2024-01-02 10:00:00,sales,voice,300,0,60,5\n\
id3,2024-01-03 10:00:00,sales,chat,300,0,60,3\n\
id4,2024-01-04 10:00:00,support,voice,300,0,60,\n"
        );
        let frame = frame_from(&csv);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");

        let rows = calc.csat_avg_by_skill_channel();
        assert_eq!(rows.len(), 2, "support has no scored rows");
        assert_eq!(rows[0]["queue_skill"], "sales");
        assert_eq!(rows[0]["channel"], "chat");
        assert_eq!(rows[0]["avg"], 3.0);
        assert_eq!(rows[1]["channel"], "voice");
        assert_eq!(rows[1]["avg"], 4.5);

        assert_eq!(calc.csat_global(), Some(4.0));
    }

    #[test]
    fn correlation_detects_negative_relationship() {
        // CSAT falls as AHT grows: strongly negative correlation.
        let csv = format!(
            "{HEADER},csat_score\n\
id1,2024-01-01 10:00:00,sales,voice,100,0,0,5\n\
id2,2024-01-02 10:00:00,sales,voice,300,0,0,4\n\
id3,2024-01-03 10:00:00,sales,voice,600,0,0,2\n\
id4,2024-01-04 10:00:00,sales,voice,900,0,0,1\n"
        );
        let frame = frame_from(&csv);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");

        let corr = calc.csat_aht_correlation();
        assert_eq!(corr["interpretation_code"], "negative");
        assert_eq!(corr["n"], 4);
        assert!(corr["r"].as_f64().expect("r present") < -0.9);
    }

    #[test]
    fn correlation_edge_codes() {
        let one_row = format!(
            "{HEADER},csat_score\n\
id1,2024-01-01 10:00:00,sales,voice,100,0,0,5\n"
        );
        let frame = frame_from(&one_row);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");
        assert_eq!(
            calc.csat_aht_correlation()["interpretation_code"],
            "insufficient_n"
        );

        let flat = format!(
            "{HEADER},csat_score\n\
id1,2024-01-01 10:00:00,sales,voice,100,0,0,5\n\
id2,2024-01-02 10:00:00,sales,voice,200,0,0,5\n"
        );
        let frame = frame_from(&flat);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");
        assert_eq!(
            calc.csat_aht_correlation()["interpretation_code"],
            "zero_variance"
        );
    }

    #[test]
    fn skill_summary_classifies_sweet_spot() {
        // fast skill: low AHT and high CSAT; slow skill: high AHT, decent
        // CSAT; mid skill sits between the bands.
        let csv = format!(
            "{HEADER},csat_score\n\
id1,2024-01-01 10:00:00,fast,voice,100,0,0,5\n\
id2,2024-01-02 10:00:00,fast,voice,120,0,0,5\n\
id3,2024-01-03 10:00:00,mid,voice,400,0,0,3\n\
id4,2024-01-04 10:00:00,mid,voice,450,0,0,3\n\
id5,2024-01-05 10:00:00,slow,voice,800,0,0,4\n\
id6,2024-01-06 10:00:00,slow,voice,900,0,0,4\n"
        );
        let frame = frame_from(&csv);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");

        let rows = calc.csat_aht_skill_summary();
        let classification = |skill: &str| -> String {
            rows.iter()
                .find(|r| r["queue_skill"] == skill)
                .and_then(|r| r["classification"].as_str())
                .expect("skill classified")
                .to_string()
        };
        assert_eq!(classification("fast"), "ideal_to_automate");
        assert_eq!(classification("slow"), "requires_human");
        assert_eq!(classification("mid"), "neutral");
    }

    #[test]
    fn plots_fall_back_to_placeholders_without_data() {
        let csv = format!(
            "{HEADER}\n\
id1,2024-01-01 10:00:00,sales,voice,300,0,60\n"
        );
        let frame = frame_from(&csv);
        let calc = SatisfactionCalculator::new(&frame).expect("columns present");
        assert!(calc.plot_csat_distribution().placeholder.is_some());
        assert!(calc.plot_csat_vs_aht_scatter().placeholder.is_some());
    }
}
