//! Referral CLI - train, serve and inspect referral scoring models

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use referral::config::{BoostParams, ClassifierParams, ForestParams, ImputeStrategy, PipelineConfig};
use referral::{DatasetProfile, PredictionBatch, RecordSet, ReferralPredictor, Trainer};

const DEFAULT_BUNDLE: &str = "model/referral.json";

#[derive(Parser)]
#[command(name = "referral")]
#[command(author, version, about = "Clinical referral scoring CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log pipeline details
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Median,
    Knn,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierArg {
    Forest,
    Boosting,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model bundle from a labeled CSV
    Train {
        /// Labeled training CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Output bundle path
        #[arg(short, long, default_value = DEFAULT_BUNDLE)]
        bundle: PathBuf,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of features to keep
        #[arg(long)]
        features: Option<usize>,

        /// Missing-value strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Classifier family
        #[arg(long, value_enum)]
        classifier: Option<ClassifierArg>,

        /// Random seed for selection, split and classifier
        #[arg(long)]
        seed: Option<u64>,

        /// Write training rows with model-assigned labels to this CSV
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Predict referrals for an unlabeled CSV
    Predict {
        /// Model bundle
        #[arg(short, long, default_value = DEFAULT_BUNDLE)]
        bundle: PathBuf,

        /// Input CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Write predictions to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print predictions as JSON
        #[arg(long)]
        json: bool,

        /// Number of rows to show
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Summarize missing values, feature means and label balance
    Profile {
        /// Input CSV
        #[arg(short, long)]
        input: PathBuf,

        /// JSON pipeline configuration (for column roles)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    println!("{}", format!("Referral CLI v{}", env!("CARGO_PKG_VERSION")).cyan().bold());
    println!();

    match cli.command {
        Commands::Train {
            data,
            bundle,
            config,
            features,
            strategy,
            classifier,
            seed,
            audit,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(k) = features {
                config.feature_count = k;
            }
            if let Some(strategy) = strategy {
                config.impute = match strategy {
                    StrategyArg::Median => ImputeStrategy::Median,
                    StrategyArg::Knn => ImputeStrategy::default(),
                };
            }
            if let Some(classifier) = classifier {
                config.classifier = match classifier {
                    ClassifierArg::Forest => ClassifierParams::RandomForest(ForestParams::default()),
                    ClassifierArg::Boosting => ClassifierParams::GradientBoosting(BoostParams::default()),
                };
            }
            if let Some(seed) = seed {
                config.seed = seed;
                config.selector.seed = seed;
                if let ClassifierParams::RandomForest(params) = &mut config.classifier {
                    params.seed = seed;
                }
            }
            run_train(&data, &bundle, config, audit.as_deref())?;
        }
        Commands::Predict {
            bundle,
            input,
            output,
            json,
            top,
        } => {
            run_predict(&bundle, &input, output.as_deref(), json, top)?;
        }
        Commands::Profile { input, config } => {
            let config = load_config(config.as_deref())?;
            run_profile(&input, &config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn report_path(bundle: &Path) -> PathBuf {
    let mut name = bundle.as_os_str().to_owned();
    name.push(".report.txt");
    PathBuf::from(name)
}

fn run_train(data: &Path, bundle: &Path, config: PipelineConfig, audit: Option<&Path>) -> Result<()> {
    println!("{}: {:?}", "Training from".green(), data);
    println!();

    let table = RecordSet::from_csv_path(data)
        .with_context(|| format!("Failed to load CSV from {:?}", data))?;
    let trainer = Trainer::new(config).context("Invalid pipeline configuration")?;

    let pb = spinner("Fitting pipeline...")?;
    let outcome = trainer.train(&table);
    pb.finish_and_clear();
    let outcome = outcome.context("Training failed")?;

    outcome
        .bundle()
        .save(bundle)
        .with_context(|| format!("Failed to save bundle to {:?}", bundle))?;

    let report = outcome.report();
    let report_file = report_path(bundle);
    std::fs::write(&report_file, format!("{}\n", report))
        .with_context(|| format!("Failed to write report to {:?}", report_file))?;

    println!("{}", "Selected features".bold());
    for feature in outcome.bundle().features() {
        println!("  {:<24} {:.4}", feature.name, feature.importance);
    }
    println!();
    println!("{}", report);

    if report.beats_baseline() {
        println!("{}", "Model meets the majority baseline.".green());
    } else {
        println!("{}", "Model is below the majority baseline.".yellow());
    }

    if let Some(path) = audit {
        outcome
            .write_audit_csv(&table, path)
            .with_context(|| format!("Failed to write audit CSV to {:?}", path))?;
        println!("{}: {:?}", "Audit written".green(), path);
    }

    println!("{}: {:?}", "Bundle saved".green(), bundle);
    println!("{}: {:?}", "Report saved".green(), report_file);
    Ok(())
}

fn run_predict(bundle: &Path, input: &Path, output: Option<&Path>, json: bool, top: usize) -> Result<()> {
    let predictor = ReferralPredictor::load(bundle)
        .with_context(|| format!("Failed to load model bundle from {:?}", bundle))?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;

    let pb = spinner("Scoring rows...")?;
    let batch = predictor.predict_upload(Some(bytes.as_slice()));
    pb.finish_and_clear();
    let batch = batch.with_context(|| format!("Prediction failed for {:?}", input))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        print_batch(&batch, top);
    }

    if let Some(path) = output {
        batch
            .to_csv(path)
            .with_context(|| format!("Failed to write predictions to {:?}", path))?;
        println!("{}: {:?}", "Predictions saved".green(), path);
    }
    Ok(())
}

fn print_batch(batch: &PredictionBatch, top: usize) {
    let id_header = batch.identifier_column.as_deref().unwrap_or("row");
    print!("{:<14}", id_header);
    for name in &batch.feature_names {
        print!(" {:>12}", truncate_name(name, 12));
    }
    println!(" {:>10} {:>8}", "referral", "prob");
    println!("{}", "-".repeat(14 + 13 * batch.feature_names.len() + 20));

    for row in batch.rows.iter().take(top) {
        let id = row.identifier.clone().unwrap_or_else(|| row.row.to_string());
        print!("{:<14}", truncate_name(&id, 14));
        for feature in &row.features {
            print!(" {:>12.2}", feature.value);
        }
        let label = if row.prediction == 1 {
            format!("{:>10}", "yes").red().bold()
        } else {
            format!("{:>10}", "no").normal()
        };
        println!(" {} {:>8.3}", label, row.probability);
    }
    if batch.len() > top {
        println!("... {} more rows", batch.len() - top);
    }

    println!();
    println!(
        "Total: {} rows, {} referrals ({:.1}%), {} no referral",
        batch.summary.total,
        batch.summary.positive,
        batch.summary.positive_rate() * 100.0,
        batch.summary.negative
    );
}

fn run_profile(input: &Path, config: &PipelineConfig) -> Result<()> {
    let table = RecordSet::from_csv_path(input)
        .with_context(|| format!("Failed to load CSV from {:?}", input))?;
    let profile = DatasetProfile::from_record_set(&table, config);

    println!("{}: {:?} ({} rows)", "Profile of".green(), input, profile.rows);
    println!();
    println!("{:<24} {:>8} {:>10} {:>12}", "column", "kind", "missing", "mean");
    println!("{}", "-".repeat(57));
    for column in &profile.columns {
        let mean = column
            .mean
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "-".to_string());
        let missing = format!("{:>10}", column.missing);
        let missing = if column.missing > 0 {
            missing.yellow()
        } else {
            missing.normal()
        };
        println!(
            "{:<24} {:>8} {} {:>12}",
            truncate_name(&column.name, 24),
            if column.numeric { "numeric" } else { "text" },
            missing,
            mean
        );
    }

    println!();
    let incomplete: Vec<&str> = profile
        .most_incomplete()
        .into_iter()
        .filter(|c| c.missing > 0)
        .take(3)
        .map(|c| c.name.as_str())
        .collect();
    if !incomplete.is_empty() {
        println!("Most incomplete: {}", incomplete.join(", "));
    }
    match &profile.labels {
        Some(labels) => println!(
            "Referral rate: {:.1}% ({} need, {} no need, {} unlabeled)",
            labels.positive_rate() * 100.0,
            labels.positive,
            labels.negative,
            labels.unlabeled
        ),
        None => println!("{}", format!("No '{}' column in input.", config.target_column).yellow()),
    }

    Ok(())
}

fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        name.to_string()
    } else {
        let cut: String = name.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}~", cut)
    }
}
