//! ExoAI CLI Module
//!
//! Command-line interface for training, batch prediction, dataset inspection
//! and serving the prediction API.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::export::{ArtifactBundle, ArtifactPaths};
use crate::inference::Predictor;
use crate::schema::{label_values, Feature, SchemaNormalizer};
use crate::training::{TrainEngine, TrainingConfig, TrainingMode};
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "exoai")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stacking-ensemble exoplanet candidate classifier")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the stacking ensemble and write the artifacts
    Train {
        /// Labelled mission CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Training mode (lightweight, full)
        #[arg(short, long, default_value = "lightweight")]
        mode: String,

        /// Stratified downsampling bound for lightweight runs
        #[arg(long)]
        max_samples: Option<usize>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Artifact output directory
        #[arg(short, long, default_value = "models")]
        output: PathBuf,
    },

    /// Classify every row of a CSV with canonical headers
    Predict {
        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV (prints a summary only when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding the trained artifacts
        #[arg(long, default_value = "models")]
        models: PathBuf,
    },

    /// Show how a CSV maps onto the feature schema
    Info {
        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Start the prediction API
    Serve {
        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Server host
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    data_path: &Path,
    mode: &str,
    max_samples: Option<usize>,
    seed: u64,
    output: &Path,
) -> anyhow::Result<()> {
    section("Train");

    let mode: TrainingMode = mode.parse()?;
    let mut config = TrainingConfig::new(mode)
        .with_random_state(seed)
        .with_output_dir(output);
    if let Some(n) = max_samples {
        config = config.with_max_samples(n);
    }

    step_run(&format!("Training {} ensemble", mode.to_string().cyan()));
    let start = Instant::now();
    let report = TrainEngine::new(config).run(data_path)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    println!();
    println!("  {:<20} {}", muted("Rows labelled"), report.n_rows_labelled);
    println!(
        "  {:<20} {} / {} / {}",
        muted("Train/val/test"),
        report.n_train,
        report.n_validation,
        report.n_test
    );
    for (class, count) in &report.class_counts {
        println!("  {:<20} {}", muted(class), count);
    }
    if let Some(search) = &report.search {
        println!(
            "  {:<20} {} combos, best cv {}",
            muted("Grid search"),
            search.n_combinations,
            pct(search.best_cv_accuracy)
        );
    }
    if let Some(acc) = report.validation_accuracy {
        println!("  {:<20} {}", muted("Validation acc"), pct(acc));
    }
    println!("  {:<20} {:.2}", muted("Threshold"), report.threshold);
    if let Some(test) = &report.test_report {
        println!("  {:<20} {}", muted("Test accuracy"), pct(test.accuracy).white().bold());
        println!("  {:<20} {:.4}", muted("Test weighted F1"), test.weighted_avg.f1);
        if let Some(auc) = test.roc_auc {
            println!("  {:<20} {:.4}", muted("Test ROC AUC"), auc);
        }
    }

    if !report.base_test_accuracy.is_empty() {
        section("Base learners");
        for (id, acc) in &report.base_test_accuracy {
            println!("  {:<20} {}", muted(id), pct(*acc));
        }
    }

    println!();
    println!("  {} artifacts written to {}", ok("✓"), output.display());
    println!();
    Ok(())
}

pub fn cmd_predict(data_path: &Path, output: Option<&Path>, models_dir: &Path) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading artifacts");
    let bundle = ArtifactBundle::load(&ArtifactPaths::new(models_dir))?;
    let predictor = Predictor::new(Arc::new(bundle));
    step_done(&format!("{} classes", predictor.class_names().len()));

    step_run("Loading data");
    let df = DataLoader::new().load_csv(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let mut out = predictor.predict_batch(df)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    let labels = label_values(&out, crate::inference::PREDICTED_LABEL_COLUMN)?;
    let mut counts = std::collections::BTreeMap::new();
    for label in labels.into_iter().flatten() {
        *counts.entry(label).or_insert(0usize) += 1;
    }
    println!();
    for (label, count) in &counts {
        println!("  {:<20} {}", muted(label), count);
    }

    if let Some(path) = output {
        DataSaver::save_csv(&mut out, path)?;
        println!();
        println!("  {} predictions written to {}", ok("✓"), path.display());
    }
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let raw = DataLoader::new().load_csv(data_path)?;
    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), raw.height());
    println!("  {:<12} {}", muted("Columns"), raw.width());

    let normalizer = SchemaNormalizer::new();
    let df = normalizer.normalize(raw)?;

    section("Features");
    println!("  {:<28} {:>8} {:>8}", muted("Feature"), muted("Present"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(46)));
    for feature in Feature::ALL.iter() {
        let (present, nulls) = match df.column(feature.canonical_key()) {
            Ok(col) => (ok("yes"), col.null_count().to_string()),
            Err(_) => ("no".red(), "-".to_string()),
        };
        println!("  {:<28} {:>8} {:>8}", feature.display_name(), present, nulls);
    }

    section("Labels");
    match normalizer.resolve_label_column(&df) {
        Some(column) => {
            let mut counts = std::collections::BTreeMap::new();
            for label in label_values(&df, &column)? {
                *counts.entry(label.unwrap_or_else(|| "(missing)".to_string())).or_insert(0usize) += 1;
            }
            println!("  {:<20} {}", muted("Column"), column);
            for (label, count) in &counts {
                println!("  {:<20} {}", muted(label), count);
            }
        }
        None => println!("  {}", "no disposition column".yellow()),
    }

    println!();
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", "ExoAI".white().bold()));
    line_box_center(&format!("{}", dim(&format!("v{}", env!("CARGO_PKG_VERSION")))));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("API    ", &format!("http://{}:{}", host, port)));
    line_box(&kv("Health ", &format!("http://{}:{}/health", host, port)));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box_center(&format!("{}", dim("ctrl+c to stop")));
    line_box_empty();
    line_box_bottom();
    println!();

    let config = ServerConfig::default().with_host(host).with_port(port);
    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let colored = format!("{}", "hello".truecolor(1, 2, 3));
        assert_eq!(strip_ansi(&colored), "hello");
    }

    #[test]
    fn test_parse_train_command() {
        let cli = Cli::try_parse_from(["exoai", "train", "--data", "k.csv", "--mode", "full", "--max-samples", "500"]).unwrap();
        match cli.command {
            Commands::Train { mode, max_samples, output, .. } => {
                assert_eq!(mode, "full");
                assert_eq!(max_samples, Some(500));
                assert_eq!(output, PathBuf::from("models"));
            }
            _ => panic!("expected train"),
        }
    }
}
