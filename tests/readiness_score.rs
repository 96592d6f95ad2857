use contact_insights::config::PipelineConfig;
use contact_insights::dataset::InteractionFrame;
use contact_insights::io::{DataSource, DataSourceError, MemorySink};
use contact_insights::pipeline::MetricsPipeline;
use contact_insights::scorer::{ReadinessScorer, READINESS_KEY};
use serde_json::{json, Value};
use std::io::Cursor;

struct StaticSource(String);

impl DataSource for StaticSource {
    fn read_table(&self, _locator: &str) -> Result<InteractionFrame, DataSourceError> {
        Ok(InteractionFrame::from_csv_reader(Cursor::new(self.0.as_bytes()))
            .expect("test csv parses"))
    }
}

/// One chat skill, tight handle-time spread, no escalations. Eight contacts
/// in the peak window against four off-peak.
fn steady_queue_csv() -> String {
    let header = "interaction_id,datetime_start,queue_skill,channel,duration_talk,hold_time,wrap_up_time,agent_id,transfer_flag";
    let mut rows = vec![header.to_string()];
    for day in 1..=8 {
        rows.push(format!(
            "id{day:02},2024-01-{day:02} 11:00:00,reset_password,chat,300,0,0,a1,0"
        ));
    }
    for day in 9..=10 {
        rows.push(format!(
            "id{day:02},2024-01-{day:02} 08:00:00,reset_password,chat,300,0,0,a1,0"
        ));
    }
    for day in 11..=12 {
        rows.push(format!(
            "id{day:02},2024-01-{day:02} 08:00:00,reset_password,chat,320,0,0,a1,0"
        ));
    }
    rows.join("\n") + "\n"
}

fn scoreable_config() -> PipelineConfig {
    // Entry names match the keys the scorer reads back out of the tree.
    PipelineConfig::from_value(&json!({
        "dimensions": {
            "volume": {
                "class": "volume",
                "metrics": [
                    "volume_by_skill",
                    "channel_distribution_pct",
                    "peak_offpeak_ratio",
                ],
            },
            "operational_performance": {
                "class": "operational_performance",
                "metrics": ["aht_distribution", "escalation_rate"],
            },
            "cost": {
                "class": "cost",
                "metrics": ["potential_savings"],
                "params": {
                    "labor_cost_per_hour": 30.0,
                    "automation_cpi": 0.2,
                    "automation_volume_share": 0.5,
                    "automation_success_rate": 0.8,
                    "annualization_factor": 1000.0,
                },
            },
        }
    }))
    .expect("config parses")
}

fn run_scored(csv: String, config: PipelineConfig) -> (serde_json::Map<String, Value>, MemorySink) {
    let source = StaticSource(csv);
    let sink = MemorySink::new();
    let tree = {
        let mut pipeline = MetricsPipeline::new(&source, &sink, config);
        pipeline.add_callback(Box::new(ReadinessScorer::new()));
        pipeline.run("table", "run", true).expect("pipeline runs")
    };
    (tree, sink)
}

#[test]
fn steady_queue_scores_as_assist() {
    let (tree, _sink) = run_scored(steady_queue_csv(), scoreable_config());
    let readiness = &tree[READINESS_KEY];

    let sub = |name: &str| readiness["sub_scores"][name].clone();
    // Twelve interactions on a single skill is low volume.
    assert_eq!(sub("repetitiveness")["score"], 0.0);
    assert_eq!(sub("repetitiveness")["reason"], "low_volume");
    // Spread ratio ~1.06 with zero escalation.
    assert_eq!(sub("predictability")["score"], 10.0);
    assert_eq!(sub("predictability")["reason"], "high_predictability");
    // Single channel: 100% share.
    assert_eq!(sub("structuredness")["score"], 10.0);
    // Peak/off-peak 8:4.
    assert_eq!(sub("stability")["score"], 10.0);
    assert_eq!(sub("stability")["reason"], "very_stable");
    // ~11k annual savings lands in the medium ROI band.
    assert_eq!(sub("roi")["score"], 5.0);
    assert_eq!(sub("roi")["reason"], "medium_roi");
    assert_eq!(sub("complexity")["computed"], true);

    let normalized = readiness["weights"]["normalized"]
        .as_object()
        .expect("normalized weights");
    assert_eq!(normalized.len(), 6, "every sub-score computed");
    let sum: f64 = normalized
        .values()
        .map(|v| v.as_f64().expect("weight"))
        .sum();
    assert!((sum - 1.0).abs() < 1e-9);

    let final_score = readiness["final_score"].as_f64().expect("score present");
    assert!(
        (6.5..6.9).contains(&final_score),
        "final score was {final_score}"
    );
    assert_eq!(readiness["classification"]["label"], "ASSIST");
}

#[test]
fn readiness_document_is_persisted_and_embedded() {
    let (tree, sink) = run_scored(steady_queue_csv(), scoreable_config());

    let persisted = sink
        .json(&format!("run/{READINESS_KEY}.json"))
        .expect("readiness document persisted");
    assert_eq!(&persisted, &tree[READINESS_KEY]);

    // results.json is written before callbacks run, so the on-disk tree
    // carries only the dimension results.
    let results = sink.json("run/results.json").expect("results persisted");
    assert!(results.get(READINESS_KEY).is_none());
    assert!(results.get("volume").is_some());
}

#[test]
fn unscoreable_run_yields_no_data() {
    let csv = "\
interaction_id,datetime_start,queue_skill,channel,duration_talk,hold_time,wrap_up_time
id1,2024-01-01 10:00:00,sales,voice,300,0,60
"
    .to_string();
    let config = PipelineConfig::from_value(&json!({
        "dimensions": {
            "satisfaction": {
                "class": "satisfaction",
                "metrics": ["csat_global"],
            },
        }
    }))
    .expect("config parses");

    let (tree, sink) = run_scored(csv, config);
    let readiness = &tree[READINESS_KEY];

    assert_eq!(readiness["final_score"], Value::Null);
    assert_eq!(readiness["classification"]["label"], "NO_DATA");
    for (_, sub) in readiness["sub_scores"].as_object().expect("sub scores") {
        assert_eq!(sub["computed"], false);
    }
    assert!(sink
        .json(&format!("run/{READINESS_KEY}.json"))
        .is_some());
}
