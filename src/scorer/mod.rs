//! Composite automation-readiness scoring over an assembled result tree.
//!
//! Six threshold-based sub-scores are computed independently, each with its
//! own missing-data escape hatch; base weights are then renormalized over the
//! computed subset only, so a missing dimension redistributes its weight
//! instead of dragging the composite down.

use crate::dimensions::{CLASS_COST, CLASS_PERFORMANCE, CLASS_VOLUME};
use crate::io::ResultsSink;
use crate::pipeline::{PostRunCallback, ResultTree};
use serde_json::{json, Map, Value};
use tracing::info;

/// Reserved top-level key the composite result is embedded under.
pub const READINESS_KEY: &str = "automation_readiness";

const BASE_WEIGHTS: [(&str, f64); 6] = [
    ("repetitiveness", 0.25),
    ("predictability", 0.20),
    ("structuredness", 0.15),
    ("complexity", 0.15),
    ("stability", 0.10),
    ("roi", 0.15),
];

/// One sub-score with its audit trail. `computed == false` always pairs with
/// a null score.
#[derive(Debug, Clone)]
pub struct SubScore {
    pub score: Option<f64>,
    pub computed: bool,
    pub reason: &'static str,
    pub details: Map<String, Value>,
}

impl SubScore {
    fn not_computed(reason: &'static str, details: Map<String, Value>) -> Self {
        Self {
            score: None,
            computed: false,
            reason,
            details,
        }
    }

    fn computed(score: f64, reason: &'static str, details: Map<String, Value>) -> Self {
        Self {
            score: Some(score),
            computed: true,
            reason,
            details,
        }
    }

    fn into_json(self) -> Value {
        json!({
            "score": crate::pipeline::value::json_num_opt(self.score),
            "computed": self.computed,
            "reason": self.reason,
            "details": Value::Object(self.details),
        })
    }
}

/// Four-tier step function on the final score, with a fifth tier for "no
/// sub-score computable". Boundaries are contractual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Automate,
    Assist,
    Augment,
    HumanOnly,
    NoData,
}

impl Classification {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => Self::NoData,
            Some(s) if s >= 8.0 => Self::Automate,
            Some(s) if s >= 5.0 => Self::Assist,
            Some(s) if s >= 3.0 => Self::Augment,
            Some(_) => Self::HumanOnly,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Automate => "AUTOMATE",
            Self::Assist => "ASSIST",
            Self::Augment => "AUGMENT",
            Self::HumanOnly => "HUMAN_ONLY",
            Self::NoData => "NO_DATA",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Automate => {
                "High repetitiveness, high predictability and strong ROI. \
                 Candidate for full automation."
            }
            Self::Assist => {
                "Medium complexity or limited ROI. Recommended agent-copilot \
                 approach with real-time suggestions."
            }
            Self::Augment => {
                "High complexity or low volume. Better served by support \
                 tooling such as knowledge bases and dynamic guides."
            }
            Self::HumanOnly => {
                "Very low volume or extremely complex processes. Keep the \
                 operation fully human for now."
            }
            Self::NoData => {
                "No dimension had enough data to compute a readiness score."
            }
        }
    }

    fn into_json(self) -> Value {
        json!({"label": self.label(), "description": self.description()})
    }
}

/// Computes the readiness document from a result tree. Also usable as a
/// pipeline post-run callback, where it embeds the document in the tree and
/// persists it next to the run's other artifacts.
#[derive(Debug, Default)]
pub struct ReadinessScorer;

impl ReadinessScorer {
    pub fn new() -> Self {
        Self
    }

    /// Full readiness document: final score, classification, weight sets and
    /// the six sub-scores.
    pub fn compute(&self, tree: &ResultTree) -> Map<String, Value> {
        let volume = tree.get(CLASS_VOLUME);
        let performance = tree.get(CLASS_PERFORMANCE);
        let cost = tree.get(CLASS_COST);

        let volume_by_skill = numeric_sequence(lookup(volume, &["volume_by_skill"]));
        let channel_distribution =
            numeric_sequence(lookup(volume, &["channel_distribution_pct"]));
        let peak_offpeak = scalar(lookup(volume, &["peak_offpeak_ratio"]));
        let aht_ratio = scalar(lookup(
            performance,
            &["aht_distribution", "p90_p50_ratio"],
        ));
        let escalation = scalar(lookup(performance, &["escalation_rate"]));
        let annual_savings = scalar(lookup(cost, &["potential_savings", "annual_savings"]));

        let sub_scores = [
            ("repetitiveness", score_repetitiveness(volume_by_skill.as_deref())),
            ("predictability", score_predictability(aht_ratio, escalation)),
            ("structuredness", score_structuredness(channel_distribution.as_deref())),
            ("complexity", score_complexity(aht_ratio, escalation)),
            ("stability", score_stability(peak_offpeak)),
            ("roi", score_roi(annual_savings)),
        ];

        // Base weights restricted to computed sub-scores, rescaled to sum 1.
        let effective_total: f64 = BASE_WEIGHTS
            .iter()
            .zip(sub_scores.iter())
            .filter(|(_, (_, sub))| sub.computed)
            .map(|((_, w), _)| w)
            .sum();

        let mut normalized = Map::new();
        let mut final_score = None;
        if effective_total > 0.0 {
            let mut acc = 0.0;
            for ((name, base), (_, sub)) in BASE_WEIGHTS.iter().zip(sub_scores.iter()) {
                if sub.computed {
                    let weight = base / effective_total;
                    normalized.insert(name.to_string(), json!(weight));
                    acc += sub.score.unwrap_or(0.0) * weight;
                }
            }
            final_score = Some((acc * 100.0).round() / 100.0);
        }

        let classification = Classification::from_score(final_score);

        let mut base = Map::new();
        for (name, weight) in BASE_WEIGHTS {
            base.insert(name.to_string(), json!(weight));
        }

        let mut sub_scores_json = Map::new();
        for (name, sub) in sub_scores {
            sub_scores_json.insert(name.to_string(), sub.into_json());
        }

        let mut out = Map::new();
        out.insert(
            "final_score".to_string(),
            crate::pipeline::value::json_num_opt(final_score),
        );
        out.insert("classification".to_string(), classification.into_json());
        out.insert(
            "weights".to_string(),
            json!({"base": Value::Object(base), "normalized": Value::Object(normalized)}),
        );
        out.insert("sub_scores".to_string(), Value::Object(sub_scores_json));
        out
    }
}

impl PostRunCallback for ReadinessScorer {
    fn name(&self) -> &str {
        "readiness_scorer"
    }

    fn run(
        &self,
        tree: &mut ResultTree,
        run_dir: &str,
        sink: &dyn ResultsSink,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let readiness = self.compute(tree);
        info!(
            final_score = ?readiness.get("final_score"),
            "readiness score computed"
        );

        let document = Value::Object(readiness.clone());
        sink.write_json(&format!("{run_dir}/{READINESS_KEY}.json"), &document)?;
        tree.insert(READINESS_KEY.to_string(), document);
        Ok(())
    }
}

fn lookup<'a>(root: Option<&'a Value>, keys: &[&str]) -> Option<&'a Value> {
    let mut current = root?;
    for key in keys {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn scalar(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Numeric sequence in either the labeled-series form (`{labels, values}`)
/// or a bare array.
fn numeric_sequence(value: Option<&Value>) -> Option<Vec<f64>> {
    let value = value?;
    let array = match value {
        Value::Object(map) => map.get("values")?.as_array()?,
        Value::Array(items) => items,
        _ => return None,
    };
    let numbers: Vec<f64> = array
        .iter()
        .filter_map(Value::as_f64)
        .filter(|v| v.is_finite())
        .collect();
    (!numbers.is_empty()).then_some(numbers)
}

fn details(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn score_repetitiveness(volume_by_skill: Option<&[f64]>) -> SubScore {
    let Some(volumes) = volume_by_skill.filter(|v| !v.is_empty()) else {
        return SubScore::not_computed(
            "no_volume_data",
            details(&[("avg_volume_per_skill", Value::Null)]),
        );
    };

    let avg = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let (score, reason) = if avg > 80.0 {
        (10.0, "high_volume")
    } else if avg >= 40.0 {
        (5.0, "medium_volume")
    } else {
        (0.0, "low_volume")
    };

    SubScore::computed(
        score,
        reason,
        details(&[
            ("avg_volume_per_skill", json!(avg)),
            ("thresholds", json!({"high": 80, "medium": 40})),
        ]),
    )
}

fn score_predictability(aht_ratio: Option<f64>, escalation_pct: Option<f64>) -> SubScore {
    let base_details = details(&[
        (
            "aht_p90_p50_ratio",
            crate::pipeline::value::json_num_opt(aht_ratio),
        ),
        (
            "escalation_rate_pct",
            crate::pipeline::value::json_num_opt(escalation_pct),
        ),
    ]);

    match (aht_ratio, escalation_pct) {
        (None, None) => SubScore::not_computed("no_data", base_details),
        (Some(ratio), Some(esc)) => {
            let (score, reason) = if ratio < 1.5 && esc < 10.0 {
                (10.0, "high_predictability")
            } else if (1.5..=2.0).contains(&ratio) || (10.0..=20.0).contains(&esc) {
                (5.0, "medium_predictability")
            } else if ratio > 2.0 && esc > 20.0 {
                (0.0, "low_predictability")
            } else {
                (3.0, "mixed_signals")
            };
            SubScore::computed(score, reason, base_details)
        }
        // One side missing: penalized flat fallback, still computed.
        _ => SubScore::computed(3.0, "partial_data", base_details),
    }
}

fn score_structuredness(channel_distribution_pct: Option<&[f64]>) -> SubScore {
    let Some(shares) = channel_distribution_pct.filter(|v| !v.is_empty()) else {
        return SubScore::not_computed(
            "no_channel_data",
            details(&[("max_channel_share_pct", Value::Null)]),
        );
    };

    let max_share = shares.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (score, reason) = if max_share > 60.0 {
        (10.0, "high_text_share")
    } else if max_share >= 30.0 {
        (5.0, "medium_text_share")
    } else {
        (0.0, "low_text_share")
    };

    SubScore::computed(
        score,
        reason,
        details(&[
            ("max_channel_share_pct", json!(max_share)),
            ("thresholds_pct", json!({"high": 60, "medium": 30})),
        ]),
    )
}

fn score_complexity(aht_ratio: Option<f64>, escalation_pct: Option<f64>) -> SubScore {
    if aht_ratio.is_none() && escalation_pct.is_none() {
        return SubScore::not_computed(
            "no_data",
            details(&[
                ("aht_p90_p50_ratio", Value::Null),
                ("escalation_rate_pct", Value::Null),
            ]),
        );
    }

    // Linear inverse of the spread ratio: 1.0 -> 10, 3.0 -> 0.
    let base = match aht_ratio {
        Some(ratio) => ((3.0 - ratio) / 2.0 * 10.0).clamp(0.0, 10.0),
        None => 5.0,
    };
    // Every 5 points of escalation cost one point.
    let adjustment = escalation_pct.map(|esc| -(esc / 5.0)).unwrap_or(0.0);
    let score = (base + adjustment).clamp(0.0, 10.0);

    SubScore::computed(
        score,
        "inverse_complexity",
        details(&[
            (
                "aht_p90_p50_ratio",
                crate::pipeline::value::json_num_opt(aht_ratio),
            ),
            (
                "escalation_rate_pct",
                crate::pipeline::value::json_num_opt(escalation_pct),
            ),
            ("base_score", json!(base)),
            ("adjustment", json!(adjustment)),
        ]),
    )
}

fn score_stability(peak_offpeak_ratio: Option<f64>) -> SubScore {
    let Some(ratio) = peak_offpeak_ratio else {
        return SubScore::not_computed(
            "no_peak_offpeak_data",
            details(&[("peak_offpeak_ratio", Value::Null)]),
        );
    };

    let (score, reason) = if ratio < 3.0 {
        (10.0, "very_stable")
    } else if ratio < 5.0 {
        (7.0, "moderately_stable")
    } else if ratio < 7.0 {
        (3.0, "pronounced_peak")
    } else {
        (0.0, "very_unstable")
    };

    SubScore::computed(
        score,
        reason,
        details(&[
            ("peak_offpeak_ratio", json!(ratio)),
            (
                "thresholds",
                json!({"very_stable": 3.0, "stable": 5.0, "unstable": 7.0}),
            ),
        ]),
    )
}

fn score_roi(annual_savings: Option<f64>) -> SubScore {
    let Some(savings) = annual_savings else {
        return SubScore::not_computed(
            "no_savings_data",
            details(&[("annual_savings", Value::Null)]),
        );
    };

    let (score, reason) = if savings > 100_000.0 {
        (10.0, "high_roi")
    } else if savings >= 10_000.0 {
        (5.0, "medium_roi")
    } else {
        (0.0, "low_roi")
    };

    SubScore::computed(
        score,
        reason,
        details(&[
            ("annual_savings", json!(savings)),
            ("thresholds", json!({"high": 100_000, "medium": 10_000})),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_from(value: Value) -> ResultTree {
        value.as_object().expect("test tree is an object").clone()
    }

    fn sub(readiness: &Map<String, Value>, name: &str) -> Value {
        readiness["sub_scores"][name].clone()
    }

    #[test]
    fn predictability_scenario_both_good() {
        let sub = score_predictability(Some(1.2), Some(5.0));
        assert!(sub.computed);
        assert_eq!(sub.score, Some(10.0));
        assert_eq!(sub.reason, "high_predictability");
    }

    #[test]
    fn predictability_band_boundaries() {
        assert_eq!(score_predictability(Some(1.5), Some(5.0)).score, Some(5.0));
        assert_eq!(score_predictability(Some(2.0), Some(5.0)).score, Some(5.0));
        assert_eq!(score_predictability(Some(1.2), Some(10.0)).score, Some(5.0));
        assert_eq!(score_predictability(Some(2.5), Some(25.0)).score, Some(0.0));
        // Bad ratio with good escalation is the mixed case.
        let mixed = score_predictability(Some(2.5), Some(5.0));
        assert_eq!(mixed.score, Some(3.0));
        assert_eq!(mixed.reason, "mixed_signals");
        // Partial data is penalized but still computed.
        let partial = score_predictability(Some(1.2), None);
        assert!(partial.computed);
        assert_eq!(partial.score, Some(3.0));
    }

    #[test]
    fn repetitiveness_scenario_medium_volume() {
        let sub = score_repetitiveness(Some(&[45.0]));
        assert_eq!(sub.score, Some(5.0));
        assert_eq!(sub.reason, "medium_volume");

        assert_eq!(score_repetitiveness(Some(&[81.0])).score, Some(10.0));
        assert_eq!(score_repetitiveness(Some(&[40.0])).score, Some(5.0));
        assert_eq!(score_repetitiveness(Some(&[39.9])).score, Some(0.0));
        assert!(!score_repetitiveness(None).computed);
    }

    #[test]
    fn stability_scenario_pronounced_peak() {
        let sub = score_stability(Some(6.5));
        assert_eq!(sub.score, Some(3.0));
        assert_eq!(sub.reason, "pronounced_peak");

        assert_eq!(score_stability(Some(2.9)).score, Some(10.0));
        assert_eq!(score_stability(Some(3.0)).score, Some(7.0));
        assert_eq!(score_stability(Some(5.0)).score, Some(3.0));
        assert_eq!(score_stability(Some(7.0)).score, Some(0.0));
    }

    #[test]
    fn structuredness_uses_max_channel_share() {
        assert_eq!(score_structuredness(Some(&[61.0, 39.0])).score, Some(10.0));
        assert_eq!(score_structuredness(Some(&[30.0, 30.0, 40.0])).score, Some(5.0));
        assert_eq!(score_structuredness(Some(&[25.0, 25.0, 25.0, 25.0])).score, Some(0.0));
    }

    #[test]
    fn complexity_base_minus_escalation_penalty() {
        // ratio 2.0 -> base 5; escalation 10% -> -2.
        let sub = score_complexity(Some(2.0), Some(10.0));
        assert_eq!(sub.score, Some(3.0));

        // Missing ratio takes the neutral base.
        let sub = score_complexity(None, Some(10.0));
        assert_eq!(sub.score, Some(3.0));

        // Clamped at zero.
        let sub = score_complexity(Some(3.0), Some(50.0));
        assert_eq!(sub.score, Some(0.0));
    }

    #[test]
    fn roi_thresholds() {
        assert_eq!(score_roi(Some(150_000.0)).score, Some(10.0));
        assert_eq!(score_roi(Some(10_000.0)).score, Some(5.0));
        assert_eq!(score_roi(Some(9_999.0)).score, Some(0.0));
        assert!(!score_roi(None).computed);
    }

    #[test]
    fn weights_renormalize_over_computed_subset() {
        let tree = tree_from(json!({
            "volume": {
                "volume_by_skill": {"labels": ["a", "b"], "values": [100.0, 100.0]},
                "peak_offpeak_ratio": 1.5,
            },
        }));
        let readiness = ReadinessScorer::new().compute(&tree);

        let normalized = readiness["weights"]["normalized"]
            .as_object()
            .expect("normalized weights");
        // Only repetitiveness (0.25) and stability (0.10) computed.
        assert_eq!(normalized.len(), 2);
        let sum: f64 = normalized.values().map(|v| v.as_f64().expect("weight")).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        // 10 * 0.25/0.35 + 10 * 0.10/0.35 = 10.
        assert_eq!(readiness["final_score"], 10.0);
        assert_eq!(readiness["classification"]["label"], "AUTOMATE");
    }

    #[test]
    fn empty_tree_yields_no_data() {
        let readiness = ReadinessScorer::new().compute(&ResultTree::new());
        assert_eq!(readiness["final_score"], Value::Null);
        assert_eq!(readiness["classification"]["label"], "NO_DATA");
        for (name, _) in BASE_WEIGHTS {
            let sub = sub(&readiness, name);
            assert_eq!(sub["computed"], false, "sub-score {name}");
            assert_eq!(sub["score"], Value::Null, "sub-score {name}");
        }
        assert!(readiness["weights"]["normalized"]
            .as_object()
            .expect("normalized weights")
            .is_empty());
    }

    #[test]
    fn tolerates_bare_arrays_for_series() {
        let labeled = tree_from(json!({
            "volume": {"volume_by_skill": {"labels": ["a"], "values": [90.0]}},
        }));
        let bare = tree_from(json!({
            "volume": {"volume_by_skill": [90.0]},
        }));
        let scorer = ReadinessScorer::new();
        assert_eq!(
            scorer.compute(&labeled)["sub_scores"]["repetitiveness"]["score"],
            scorer.compute(&bare)["sub_scores"]["repetitiveness"]["score"],
        );
    }

    #[test]
    fn classification_boundaries_are_exact() {
        assert_eq!(Classification::from_score(Some(8.0)).label(), "AUTOMATE");
        assert_eq!(Classification::from_score(Some(7.99)).label(), "ASSIST");
        assert_eq!(Classification::from_score(Some(5.0)).label(), "ASSIST");
        assert_eq!(Classification::from_score(Some(4.99)).label(), "AUGMENT");
        assert_eq!(Classification::from_score(Some(3.0)).label(), "AUGMENT");
        assert_eq!(Classification::from_score(Some(2.99)).label(), "HUMAN_ONLY");
        assert_eq!(Classification::from_score(None).label(), "NO_DATA");
    }
}
