use clap::{Args, Parser, Subcommand};
use contact_insights::config::{AppConfig, PipelineConfig};
use contact_insights::dimensions::CLASS_COST;
use contact_insights::error::AppError;
use contact_insights::io::{LocalDataSource, LocalResultsSink, ResultsSink};
use contact_insights::pipeline::MetricsPipeline;
use contact_insights::scorer::{ReadinessScorer, READINESS_KEY};
use contact_insights::telemetry;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "contact-insights",
    about = "Contact-center KPI pipeline and automation readiness scoring",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the metrics pipeline over an interaction CSV and score the result
    Analyze(AnalyzeArgs),
    /// Recompute the readiness score from an existing results.json
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Interaction table (CSV)
    #[arg(long)]
    input: PathBuf,
    /// Pipeline configuration (JSON with a `dimensions` object)
    #[arg(long)]
    config: PathBuf,
    /// Directory run artifacts are written under
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
    /// Run identifier; artifacts land at <out-dir>/<run-id>/
    #[arg(long, default_value = "run")]
    run_id: String,
    /// Override the labor cost per hour in every cost dimension's parameters
    #[arg(long)]
    labor_cost_per_hour: Option<f64>,
    /// Override the overhead rate (fraction of labor cost) likewise
    #[arg(long)]
    overhead_rate: Option<f64>,
    /// Skip writing the aggregate results.json
    #[arg(long)]
    no_results_json: bool,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Directory containing a results.json from a previous run
    #[arg(long)]
    run_dir: PathBuf,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Score(args) => run_score(args),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let mut pipeline_config = PipelineConfig::from_json_path(&args.config)?;
    apply_cost_overrides(
        &mut pipeline_config,
        args.labor_cost_per_hour,
        args.overhead_rate,
    );

    let source = LocalDataSource;
    let sink = LocalResultsSink::new(&args.out_dir);
    let mut pipeline = MetricsPipeline::new(&source, &sink, pipeline_config);
    pipeline.add_callback(Box::new(ReadinessScorer::new()));

    let input = args.input.display().to_string();
    let tree = pipeline.run(&input, &args.run_id, !args.no_results_json)?;

    info!(
        run_id = %args.run_id,
        dimensions = tree.len(),
        "pipeline run complete"
    );
    print_readiness(tree.get(READINESS_KEY));
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let results_path = args.run_dir.join("results.json");
    let raw = std::fs::read_to_string(&results_path)?;
    let tree: Value = serde_json::from_str(&raw)?;
    let tree = tree.as_object().cloned().unwrap_or_default();

    let readiness = ReadinessScorer::new().compute(&tree);
    let document = Value::Object(readiness);

    let sink = LocalResultsSink::new(&args.run_dir);
    sink.write_json(&format!("{READINESS_KEY}.json"), &document)?;

    print_readiness(Some(&document));
    Ok(())
}

/// Command-line monetary overrides win over the configuration file for every
/// cost-class dimension entry.
fn apply_cost_overrides(
    config: &mut PipelineConfig,
    labor_cost_per_hour: Option<f64>,
    overhead_rate: Option<f64>,
) {
    if labor_cost_per_hour.is_none() && overhead_rate.is_none() {
        return;
    }

    for entry in &mut config.dimensions {
        if entry.class != CLASS_COST {
            continue;
        }
        let mut params = match entry.params.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(rate) = labor_cost_per_hour {
            params.insert("labor_cost_per_hour".to_string(), json!(rate));
        }
        if let Some(rate) = overhead_rate {
            params.insert("overhead_rate".to_string(), json!(rate));
        }
        entry.params = Some(Value::Object(params));
    }
}

fn print_readiness(document: Option<&Value>) {
    let Some(document) = document else {
        println!("No readiness score produced");
        return;
    };

    let label = document["classification"]["label"]
        .as_str()
        .unwrap_or("NO_DATA");
    match document["final_score"].as_f64() {
        Some(score) => println!("Automation readiness: {score:.2} ({label})"),
        None => println!("Automation readiness: no data ({label})"),
    }

    if let Some(subs) = document["sub_scores"].as_object() {
        for (name, sub) in subs {
            let status = match sub["score"].as_f64() {
                Some(score) => format!("{score:.1}"),
                None => "not computed".to_string(),
            };
            println!("- {name}: {status}");
        }
    }
}
