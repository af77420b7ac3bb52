//! Misclassification report for visualize mode.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use surfeval_core::transform::to_image;
use surfeval_core::{ConfusionCounts, ErrorRecord, EvalReport, Metrics};

#[derive(Serialize)]
struct ErrorEntry<'a> {
    rank: usize,
    source: &'a Path,
    label: u8,
    predicted: usize,
    probability: f32,
    image: String,
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    generated_at: String,
    /// SHA-256 of the evaluated checkpoint, when it was verified.
    checkpoint_sha256: Option<&'a str>,
    counts: &'a ConfusionCounts,
    metrics: &'a Metrics,
    errors: Vec<ErrorEntry<'a>>,
}

/// File name for the image of the error at `rank` (1-based).
fn image_name(rank: usize, error: &ErrorRecord) -> String {
    format!(
        "{rank:04}_label{}_pred{}_p{:.3}.png",
        error.label, error.predicted, error.probability
    )
}

/// Print misclassified samples, most confident first.
pub fn print_errors(errors: &[ErrorRecord]) {
    println!("Misclassified samples: {}", errors.len());
    for (i, error) in errors.iter().enumerate() {
        println!(
            "{:>5}  p={:.4}  label={}  predicted={}  {}",
            i + 1,
            error.probability,
            error.label,
            error.predicted,
            error.source.display()
        );
    }
}

/// Write each misclassified input as a PNG plus an `errors.json` index.
pub fn write_errors(
    dir: &Path,
    report: &EvalReport,
    checkpoint_sha256: Option<&str>,
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut entries = Vec::with_capacity(report.errors.len());
    for (i, error) in report.errors.iter().enumerate() {
        let rank = i + 1;
        let name = image_name(rank, error);
        let path = dir.join(&name);
        to_image(&error.image)
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;

        entries.push(ErrorEntry {
            rank,
            source: &error.source,
            label: error.label,
            predicted: error.predicted,
            probability: error.probability,
            image: name,
        });
    }

    let index = ErrorReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        checkpoint_sha256,
        counts: &report.counts,
        metrics: &report.metrics,
        errors: entries,
    };
    let json = serde_json::to_string_pretty(&index)?;
    fs::write(dir.join("errors.json"), json)?;

    Ok(())
}
