//! Dataset mode: evaluate the classifier on a CASIA-SURF dev split.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use surfeval_core::{evaluate, CasiaSurfDataset, DataLoader, EvalReport, EvalTransform, Mode};

use crate::config::Config;
use crate::report;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetArgs {
    pub protocol: u32,
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub num_workers: usize,
    pub visualize: bool,
    pub errors_dir: Option<PathBuf>,
}

pub fn run(
    args: &DatasetArgs,
    checkpoint: &Path,
    num_classes: usize,
    config: &Config,
) -> Result<EvalReport> {
    let verified = if config.verify_models {
        let verified =
            surfeval_models::verify_checkpoint(checkpoint).context("checkpoint check failed")?;
        tracing::info!(
            path = %verified.path.display(),
            sha256 = %verified.digest,
            pinned = verified.pinned,
            "checkpoint verified"
        );
        Some(verified)
    } else {
        None
    };

    let dataset = CasiaSurfDataset::open(
        args.protocol,
        Mode::Dev,
        &args.data_dir,
        EvalTransform::default(),
    )
    .with_context(|| format!("failed to open dataset in {}", args.data_dir.display()))?;
    let loader = DataLoader::new(&dataset, args.batch_size, args.num_workers)?;

    let mut classifier = surfeval_core::OnnxClassifier::load(
        &checkpoint.to_string_lossy(),
        num_classes,
        config.intra_threads,
    )
    .context("failed to load classifier")?;

    println!("Evaluating...");
    let bar = progress_bar(loader.num_batches() as u64);
    let report = evaluate(loader, &mut classifier, args.visualize, |_| bar.inc(1));
    bar.finish_and_clear();
    let report = report.context("evaluation failed")?;

    if args.visualize {
        report::print_errors(&report.errors);
        if let Some(dir) = &args.errors_dir {
            let digest = verified.as_ref().map(|v| v.digest.as_str());
            report::write_errors(dir, &report, digest)
                .with_context(|| format!("failed to write error report to {}", dir.display()))?;
            tracing::info!(dir = %dir.display(), "error report written");
        }
    } else if args.errors_dir.is_some() {
        tracing::warn!("--errors-dir has no effect without --visualize");
    }

    Ok(report)
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
