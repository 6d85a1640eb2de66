use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use driftwood_drift::{Adwin, Detector};
use driftwood_forest::{
    Accuracy, AdaptiveRandomForestClassifier, AdaptiveRandomForestRegressor, Aggregation,
    ForestConfig, MaxFeatures, Metric, RegressionMetric, RunningError,
};
use driftwood_io::{CsvStream, LabelEncoder, PrequentialReport, ReportWriter, Task};
use driftwood_tree::{LeafPrediction, SplitCriterion};

#[derive(Parser)]
#[command(name = "driftwood")]
#[command(about = "Prequential evaluation of adaptive random forests on CSV streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel member updates (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Shared ensemble and member-tree parameters.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of ensemble members
    #[arg(long, default_value_t = 10)]
    n_models: usize,

    /// Features sampled per leaf: "sqrt", "log2", "all", an integer or a fraction
    #[arg(long, default_value = "sqrt")]
    max_features: String,

    /// Poisson rate for online bagging
    #[arg(long, default_value_t = 6.0)]
    lambda: f64,

    /// Give every member an equal vote
    #[arg(long, default_value_t = false)]
    disable_weighted_vote: bool,

    /// ADWIN confidence of the drift detector
    #[arg(long, default_value_t = 0.001)]
    drift_delta: f64,

    /// ADWIN confidence of the warning detector
    #[arg(long, default_value_t = 0.01)]
    warning_delta: f64,

    /// Disable drift detection (and with it background learners)
    #[arg(long, default_value_t = false)]
    no_drift_detection: bool,

    /// Disable warning detection and background learners
    #[arg(long, default_value_t = false)]
    no_background: bool,

    /// Update members on the rayon pool
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Weight a leaf must see between split attempts
    #[arg(long, default_value_t = 50)]
    grace_period: usize,

    /// Allowed error of the split decision
    #[arg(long, default_value_t = 0.01)]
    split_confidence: f64,

    /// Hoeffding bound below which near-tied candidates are split anyway
    #[arg(long, default_value_t = 0.05)]
    tie_threshold: f64,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Comma-separated zero-based feature indices to treat as nominal
    #[arg(long, value_delimiter = ',')]
    nominal: Vec<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Test-then-train an adaptive random forest classifier
    Classify {
        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the label column
        #[arg(long)]
        target: String,

        /// Split criterion: "gini", "info_gain" or "hellinger"
        #[arg(long, default_value = "info_gain")]
        split_criterion: String,

        /// Leaf prediction: "mc", "nb" or "nba"
        #[arg(long, default_value = "nba")]
        leaf_prediction: String,

        /// Leaf weight required before naive Bayes is used
        #[arg(long, default_value_t = 0.0)]
        nb_threshold: f64,

        /// Write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Save the trained forest to this path
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Test-then-train an adaptive random forest regressor
    Regress {
        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the numeric target column
        #[arg(long)]
        target: String,

        /// How member predictions are combined: "mean" or "median"
        #[arg(long, default_value = "median")]
        aggregation: String,

        /// Member and report metric: "mae", "mse" or "rmse"
        #[arg(long, default_value = "mse")]
        metric: String,

        /// Minimum branch weight for a split
        #[arg(long, default_value_t = 5.0)]
        min_samples_split: f64,

        /// Write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Save the trained forest to this path
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        forest: ForestArgs,
    },
}

fn build_config(args: &ForestArgs, seed: u64) -> Result<ForestConfig> {
    let max_features: MaxFeatures = args.max_features.parse()?;
    let drift_detector = if args.no_drift_detection {
        None
    } else {
        Some(Detector::from(Adwin::new(args.drift_delta)?))
    };
    let warning_detector = if args.no_background {
        None
    } else {
        Some(Detector::from(Adwin::new(args.warning_delta)?))
    };
    Ok(ForestConfig::new(args.n_models)?
        .with_max_features(max_features)
        .with_lambda(args.lambda)
        .with_disable_weighted_vote(args.disable_weighted_vote)
        .with_drift_detector(drift_detector)
        .with_warning_detector(warning_detector)
        .with_seed(Some(seed))
        .with_parallel(args.parallel)
        .with_grace_period(args.grace_period)
        .with_split_confidence(args.split_confidence)
        .with_tie_threshold(args.tie_threshold)
        .with_max_depth(args.max_depth)
        .with_nominal_features(args.nominal.iter().copied()))
}

fn emit(report: &PrequentialReport, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        ReportWriter::new(path)?
            .write_prequential(report)
            .context("failed to write report")?;
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Classify {
            data,
            target,
            split_criterion,
            leaf_prediction,
            nb_threshold,
            report,
            save,
            forest,
        } => {
            let config = build_config(&forest, cli.seed)?
                .with_split_criterion(split_criterion.parse::<SplitCriterion>()?)
                .with_leaf_prediction(leaf_prediction.parse::<LeafPrediction>()?)
                .with_nb_threshold(nb_threshold);
            let mut model = AdaptiveRandomForestClassifier::new(config)
                .context("invalid forest configuration")?;
            let stream = CsvStream::open(&data, &target).context("failed to open input CSV")?;

            let start = Instant::now();
            let mut encoder = LabelEncoder::new();
            let mut accuracy = Accuracy::default();
            for record in stream {
                let record = record.context("failed to read example")?;
                let y = encoder.encode(&record.target);
                let prediction = model
                    .predict(&record.features)
                    .with_context(|| format!("prediction failed at row {}", record.row_index))?;
                accuracy.update(y, &prediction);
                model
                    .learn(&record.features, y)
                    .with_context(|| format!("learning failed at row {}", record.row_index))?;
            }
            info!(
                n_samples = model.n_samples_seen(),
                accuracy = accuracy.get(),
                n_drifts = model.n_drifts_detected(),
                "prequential evaluation complete"
            );

            let summary = PrequentialReport {
                task: Task::Classification,
                data: data.display().to_string(),
                target,
                n_samples: model.n_samples_seen(),
                n_models: forest.n_models,
                metric: "accuracy".into(),
                score: accuracy.get(),
                n_drifts: model.n_drifts_detected(),
                n_warnings: model.n_warnings_detected(),
                labels: Some(encoder.labels().to_vec()),
                elapsed_secs: start.elapsed().as_secs_f64(),
            };
            emit(&summary, report.as_deref())?;

            if let Some(path) = save {
                model.save(&path).context("failed to save model")?;
            }
        }

        Command::Regress {
            data,
            target,
            aggregation,
            metric,
            min_samples_split,
            report,
            save,
            forest,
        } => {
            let metric: RegressionMetric = metric.parse()?;
            let config = build_config(&forest, cli.seed)?
                .with_aggregation(aggregation.parse::<Aggregation>()?)
                .with_regression_metric(metric)
                .with_min_samples_split(min_samples_split);
            let mut model = AdaptiveRandomForestRegressor::new(config)
                .context("invalid forest configuration")?;
            let stream = CsvStream::open(&data, &target).context("failed to open input CSV")?;

            let start = Instant::now();
            let mut error = RunningError::new(metric);
            for record in stream {
                let record = record.context("failed to read example")?;
                let y = record.numeric_target().with_context(|| {
                    format!(
                        "non-numeric target \"{}\" at row {}",
                        record.target, record.row_index
                    )
                })?;
                let prediction = model
                    .predict(&record.features)
                    .with_context(|| format!("prediction failed at row {}", record.row_index))?;
                error.update(y, &prediction);
                model
                    .learn(&record.features, y)
                    .with_context(|| format!("learning failed at row {}", record.row_index))?;
            }
            info!(
                n_samples = model.n_samples_seen(),
                %metric,
                score = error.get(),
                n_drifts = model.n_drifts_detected(),
                "prequential evaluation complete"
            );

            let summary = PrequentialReport {
                task: Task::Regression,
                data: data.display().to_string(),
                target,
                n_samples: model.n_samples_seen(),
                n_models: forest.n_models,
                metric: metric.to_string(),
                score: error.get(),
                n_drifts: model.n_drifts_detected(),
                n_warnings: model.n_warnings_detected(),
                labels: None,
                elapsed_secs: start.elapsed().as_secs_f64(),
            };
            emit(&summary, report.as_deref())?;

            if let Some(path) = save {
                model.save(&path).context("failed to save model")?;
            }
        }
    }

    Ok(())
}
