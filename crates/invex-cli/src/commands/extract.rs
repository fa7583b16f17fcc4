//! Extract command - run the pipeline over one or more files.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use invex_core::{ExtractionJob, ExtractionReport, LineEntry, Pipeline, Scalar};

use super::load_config;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Invoice files (jpg, jpeg, png, pdf) or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Print a detailed summary of every extracted invoice
    #[arg(short, long)]
    summary: bool,

    /// Model to use (overrides gemini.model)
    #[arg(short, long)]
    model: Option<String>,

    /// Directory for JSON artifacts (overrides output.json_dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// History CSV file (overrides output.history_file)
    #[arg(long)]
    history: Option<PathBuf>,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(model) = args.model {
        config.gemini.model = model;
    }
    if let Some(dir) = args.output_dir {
        config.output.json_dir = dir;
    }
    if let Some(file) = args.history {
        config.output.history_file = file;
    }

    // Fails on a missing API key before any file is touched
    let pipeline = Pipeline::from_config(&config)?;

    let inputs = expand_inputs(&args.inputs);
    let mut failed: Vec<(String, String)> = Vec::new();
    let mut files = Vec::new();
    for input in inputs {
        match input {
            Input::File(path) => files.push(path),
            Input::Unmatched { pattern, reason } => {
                println!("{} {}: {}", style("✗").red(), pattern, reason);
                failed.push((pattern, reason));
            }
        }
    }
    let total = files.len() + failed.len();

    println!(
        "{} Processing {} file(s) with {}",
        style("ℹ").blue(),
        files.len(),
        config.gemini.model
    );

    let spinner_style = ProgressStyle::with_template("{spinner:.green} {msg}")?;

    for path in &files {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style.clone());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(format!("Extracting {}", path.display()));

        let file_start = Instant::now();
        let outcome = match ExtractionJob::from_path(path) {
            Ok(job) => pipeline.process(job).await,
            Err(e) => Err(e),
        };
        spinner.finish_and_clear();
        debug!("{} took {:?}", path.display(), file_start.elapsed());

        match outcome {
            Ok(report) if report.is_persisted() => {
                let artifact = report
                    .artifact
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!(
                    "{} {} -> {}",
                    style("✓").green(),
                    path.display(),
                    artifact
                );
                if args.summary {
                    print_summary(&report);
                }
            }
            Ok(report) => {
                let message = report
                    .persistence_errors()
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                println!("{} {}: {}", style("✗").red(), path.display(), message);
                if args.summary {
                    print_summary(&report);
                }
                failed.push((path.display().to_string(), message));
            }
            Err(e) => {
                warn!("Failed to process {}: {}", path.display(), e);
                println!("{} {}: {}", style("✗").red(), path.display(), e);
                failed.push((path.display().to_string(), e.to_string()));
            }
        }
    }

    let succeeded = total - failed.len();

    println!();
    println!(
        "{} Processed {} input(s) in {:?}",
        style("✓").green(),
        total,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(succeeded).green(),
        style(failed.len()).red()
    );
    if succeeded > 0 {
        println!(
            "   History: {}",
            pipeline.store().history_file().display()
        );
    }

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for (input, error) in &failed {
            println!("  - {}: {}", input, error);
        }
        anyhow::bail!("{} of {} input(s) failed", failed.len(), total);
    }

    Ok(())
}

/// One command-line argument after expansion.
#[derive(Debug, PartialEq)]
enum Input {
    File(PathBuf),
    /// A pattern that is invalid or matched no file; counts as a failure.
    Unmatched { pattern: String, reason: String },
}

/// Expand arguments into files.
///
/// An argument naming an existing path is taken literally even when it
/// holds glob metacharacters. Other arguments with `*`, `?` or `[` are
/// expanded; arguments without them are passed through and fail later if
/// missing.
fn expand_inputs(inputs: &[String]) -> Vec<Input> {
    let mut expanded = Vec::new();

    for input in inputs {
        let literal = PathBuf::from(input);
        if literal.exists() || !input.contains(['*', '?', '[']) {
            expanded.push(Input::File(literal));
            continue;
        }

        let paths = match glob(input) {
            Ok(paths) => paths,
            Err(e) => {
                expanded.push(Input::Unmatched {
                    pattern: input.clone(),
                    reason: format!("invalid pattern: {}", e),
                });
                continue;
            }
        };

        let before = expanded.len();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => expanded.push(Input::File(path)),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path: {}", e),
            }
        }
        if expanded.len() == before {
            expanded.push(Input::Unmatched {
                pattern: input.clone(),
                reason: "no files match pattern".to_string(),
            });
        }
    }

    expanded
}

fn or_na(value: Option<&Scalar>) -> String {
    value.map(Scalar::to_cell).unwrap_or_else(|| "N/A".to_string())
}

fn print_summary(report: &ExtractionReport) {
    let record = &report.record;
    let metadata = &report.metadata;
    let rule = "=".repeat(60);

    println!();
    println!("{}", rule);
    println!("{:^60}", "INVOICE SUMMARY");
    println!("{}", rule);

    println!();
    println!("File: {} ({})", metadata.source_file, metadata.file_type);
    if metadata.pages > 1 {
        println!("   Pages processed: {}", metadata.pages);
    }

    println!();
    println!("Issuer:");
    println!("   Company: {}", or_na(record.issuer.name.as_ref()));
    println!("   Tax ID: {}", or_na(record.issuer.tax_id.as_ref()));

    println!();
    println!("Date: {}", or_na(record.issue_date.as_ref()));
    println!("Number: {}", or_na(record.invoice_number.as_ref()));

    println!();
    println!("Items ({}):", record.item_count());
    for (i, entry) in record.line_items.iter().enumerate() {
        match entry {
            LineEntry::Item(item) => println!(
                "   {}. {} | Qty: {} | Total: {}",
                i + 1,
                or_na(item.description.as_ref()),
                or_na(item.quantity.as_ref()),
                or_na(item.total.as_ref())
            ),
            LineEntry::Other(value) => println!("   {}. {}", i + 1, value),
        }
    }

    println!();
    println!("Grand total: {}", or_na(record.grand_total.as_ref()));

    println!();
    println!("Taxes:");
    for name in ["icms", "iss"] {
        println!(
            "   {}: {}",
            name.to_uppercase(),
            or_na(record.tax(name).as_ref())
        );
    }

    println!();
    println!("{}", rule);
}
