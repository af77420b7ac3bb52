//! Single-image mode: detect faces, mask each with its reconstructed depth,
//! classify the masked frame.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use surfeval_core::dataset::load_rgb;
use surfeval_core::{
    FaceVerdict, OnnxClassifier, OnnxDepthReconstructor, OnnxFaceDetector, OnnxLandmarkRegressor,
    SingleImagePipeline,
};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct SingleImageArgs {
    pub image_path: PathBuf,
    pub save_masked: Option<PathBuf>,
}

pub fn run(
    args: &SingleImageArgs,
    checkpoint: &Path,
    num_classes: usize,
    config: &Config,
) -> Result<Vec<FaceVerdict>> {
    if config.verify_models {
        let mut verified = vec![
            surfeval_models::verify_checkpoint(checkpoint).context("checkpoint check failed")?,
        ];
        verified.extend(
            surfeval_models::verify_models_dir(&config.model_dir)
                .context("face pipeline model check failed")?,
        );
        for model in &verified {
            tracing::info!(
                role = %model.role,
                path = %model.path.display(),
                sha256 = %model.digest,
                pinned = model.pinned,
                "model verified"
            );
        }
    }

    let image = load_rgb(&args.image_path)?;
    tracing::info!(
        path = %args.image_path.display(),
        width = image.width(),
        height = image.height(),
        "image loaded"
    );

    let detector = OnnxFaceDetector::load(
        &config.detector_model_path(),
        config.detector_score_threshold,
        config.detector_nms_threshold,
        config.intra_threads,
    )
    .context("failed to load face detector")?;
    let landmarks = OnnxLandmarkRegressor::load(&config.landmark_model_path(), config.intra_threads)
        .context("failed to load landmark regressor")?;
    let depth = OnnxDepthReconstructor::load(&config.depth_model_path(), config.intra_threads)
        .context("failed to load depth reconstructor")?;
    let classifier = OnnxClassifier::load(
        &checkpoint.to_string_lossy(),
        num_classes,
        config.intra_threads,
    )
    .context("failed to load classifier")?;

    let mut pipeline = SingleImagePipeline::new(detector, landmarks, depth, classifier);
    let verdicts = pipeline.run(&image).context("inference failed")?;

    if let Some(dir) = &args.save_masked {
        save_masked(dir, &args.image_path, &verdicts)?;
    }

    Ok(verdicts)
}

/// Masked-frame file name for face `index` of `image_path`.
fn masked_name(image_path: &Path, index: usize, liveness: usize) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}_face{index}_live{liveness}.png")
}

fn save_masked(dir: &Path, image_path: &Path, verdicts: &[FaceVerdict]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    for (i, verdict) in verdicts.iter().enumerate() {
        let path = dir.join(masked_name(image_path, i, verdict.liveness));
        verdict
            .masked
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        tracing::info!(path = %path.display(), "masked face saved");
    }

    Ok(())
}
