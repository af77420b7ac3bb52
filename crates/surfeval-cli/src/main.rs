//! surfeval: evaluate a face anti-spoofing classifier on CASIA-SURF, or
//! classify the faces in a single image.

use anyhow::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod eval;
mod report;
mod single;

use config::Config;

/// Anti-spoofing classifier evaluation
#[derive(Parser, Debug)]
#[command(name = "surfeval", version, about, long_about = None)]
pub struct Args {
    /// Dataset evaluation protocol (1, 2 or 3)
    #[arg(long)]
    pub protocol: u32,

    /// CASIA-SURF dataset root
    #[arg(long = "data-dir", default_value = "data/CASIA_SURF")]
    pub data_dir: PathBuf,

    /// Classifier checkpoint (ONNX)
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Number of classifier outputs
    #[arg(long = "num_classes", default_value_t = 2)]
    pub num_classes: usize,

    #[arg(long = "batch_size", default_value_t = 1)]
    pub batch_size: usize,

    /// Collect and rank misclassified samples
    #[arg(long)]
    pub visualize: bool,

    /// Threads used to decode each batch (0 = load on the main thread)
    #[arg(long = "num_workers", default_value_t = 0)]
    pub num_workers: usize,

    /// Classify the faces in this image instead of evaluating the dataset
    #[arg(long = "image_path", default_value = "")]
    pub image_path: String,

    /// Write ranked misclassified images and errors.json here (with --visualize)
    #[arg(long = "errors-dir", value_name = "DIR")]
    pub errors_dir: Option<PathBuf>,

    /// Write each masked face here (single-image mode)
    #[arg(long = "save-masked", value_name = "DIR")]
    pub save_masked: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// What a run does, decided once from the arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationMode {
    Dataset(eval::DatasetArgs),
    SingleImage(single::SingleImageArgs),
}

impl Args {
    pub fn mode(&self) -> EvaluationMode {
        if self.image_path.is_empty() {
            EvaluationMode::Dataset(eval::DatasetArgs {
                protocol: self.protocol,
                data_dir: self.data_dir.clone(),
                batch_size: self.batch_size,
                num_workers: self.num_workers,
                visualize: self.visualize,
                errors_dir: self.errors_dir.clone(),
            })
        } else {
            EvaluationMode::SingleImage(single::SingleImageArgs {
                image_path: PathBuf::from(&self.image_path),
                save_masked: self.save_masked.clone(),
            })
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config = Config::from_env();
    let mode = args.mode();

    tracing::info!(
        checkpoint = %args.checkpoint.display(),
        num_classes = args.num_classes,
        mode = ?mode,
        "surfeval starting"
    );

    match mode {
        EvaluationMode::Dataset(dataset) => {
            let report = eval::run(&dataset, &args.checkpoint, args.num_classes, &config)?;
            println!("{}", report.metrics);
        }
        EvaluationMode::SingleImage(single) => {
            let verdicts = single::run(&single, &args.checkpoint, args.num_classes, &config)?;
            for verdict in &verdicts {
                println!("{}", verdict.liveness);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["surfeval", "--protocol", "1", "--checkpoint", "model.onnx"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_defaults_match_reference_script() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.data_dir, PathBuf::from("data/CASIA_SURF"));
        assert_eq!(args.num_classes, 2);
        assert_eq!(args.batch_size, 1);
        assert_eq!(args.num_workers, 0);
        assert!(!args.visualize);
        assert!(args.image_path.is_empty());
    }

    #[test]
    fn test_protocol_and_checkpoint_are_required() {
        assert!(Args::try_parse_from(["surfeval", "--checkpoint", "m.onnx"]).is_err());
        assert!(Args::try_parse_from(["surfeval", "--protocol", "1"]).is_err());
    }

    #[test]
    fn test_underscore_flag_names() {
        let args = parse(&[
            "--num_classes",
            "3",
            "--batch_size",
            "16",
            "--num_workers",
            "4",
            "--data-dir",
            "/data/surf",
            "--visualize",
        ])
        .unwrap();
        assert_eq!(args.num_classes, 3);
        assert_eq!(args.batch_size, 16);
        assert_eq!(args.num_workers, 4);
        assert_eq!(args.data_dir, PathBuf::from("/data/surf"));
        assert!(args.visualize);
    }

    #[test]
    fn test_empty_image_path_selects_dataset_mode() {
        let args = parse(&["--batch_size", "8", "--errors-dir", "out"]).unwrap();
        match args.mode() {
            EvaluationMode::Dataset(d) => {
                assert_eq!(d.protocol, 1);
                assert_eq!(d.batch_size, 8);
                assert_eq!(d.errors_dir, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected mode: {other:?}"),
        }
    }

    #[test]
    fn test_image_path_selects_single_image_mode() {
        let args = parse(&["--image_path", "face.jpg", "--save-masked", "masks"]).unwrap();
        assert_eq!(
            args.mode(),
            EvaluationMode::SingleImage(single::SingleImageArgs {
                image_path: PathBuf::from("face.jpg"),
                save_masked: Some(PathBuf::from("masks")),
            })
        );
    }

    #[test]
    fn test_verbosity_counts() {
        assert_eq!(parse(&["-vv"]).unwrap().verbose, 2);
    }
}
