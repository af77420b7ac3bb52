//! Dataset evaluation loop.
//!
//! Runs the classifier over every batch, folds each batch's 2x2 confusion
//! cells into a local accumulator and derives APCER / BPCER / ACER once the
//! pass is complete. In visualize mode every misclassified sample is kept,
//! ranked by the probability the classifier assigned to its wrong answer.

use thiserror::Error;

use crate::classifier::{argmax, softmax, Classifier, ClassifierError};
use crate::dataset::DatasetError;
use crate::metrics::{ConfusionCounts, Metrics};
use crate::types::{Batch, ErrorRecord};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("data loading failed: {0}")]
    Dataset(#[from] DatasetError),
    #[error("classifier failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("batch {batch}: classifier returned {rows} score rows for {labels} labels")]
    RowCountMismatch {
        batch: usize,
        rows: usize,
        labels: usize,
    },
}

/// Outcome of one full evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub counts: ConfusionCounts,
    pub metrics: Metrics,
    /// Misclassified samples, highest probability first. Empty unless visualize was set.
    pub errors: Vec<ErrorRecord>,
    pub batches: usize,
}

/// Progress notification sent after each batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub batch: usize,
    pub samples: usize,
}

/// Evaluate `classifier` over `batches`.
///
/// Any data or classifier error aborts the pass.
pub fn evaluate<I, C, F>(
    batches: I,
    classifier: &mut C,
    visualize: bool,
    mut on_batch: F,
) -> Result<EvalReport, EvalError>
where
    I: IntoIterator<Item = Result<Batch, DatasetError>>,
    C: Classifier + ?Sized,
    F: FnMut(BatchProgress),
{
    let mut counts = ConfusionCounts::default();
    let mut errors = Vec::new();
    let mut batch_count = 0usize;

    for (index, batch) in batches.into_iter().enumerate() {
        let batch = batch?;
        let scores = classifier.classify(&batch.images)?;

        if scores.nrows() != batch.len() {
            return Err(EvalError::RowCountMismatch {
                batch: index,
                rows: scores.nrows(),
                labels: batch.len(),
            });
        }

        let predicted: Vec<usize> = scores.rows().into_iter().map(argmax).collect();
        let batch_counts = ConfusionCounts::from_predictions(&batch.labels, &predicted);
        if batch_counts.ignored > 0 {
            tracing::warn!(
                batch = index,
                ignored = batch_counts.ignored,
                "samples outside the [0, 1] label ordering were not counted"
            );
        }
        counts.merge(&batch_counts);

        if visualize {
            for (i, (&label, &pred)) in batch.labels.iter().zip(&predicted).enumerate() {
                if label as usize == pred {
                    continue;
                }
                let probability = softmax(scores.row(i))[pred];
                errors.push(ErrorRecord {
                    image: batch.images.index_axis(ndarray::Axis(0), i).to_owned(),
                    label,
                    predicted: pred,
                    probability,
                    source: batch.sources[i].clone(),
                });
            }
        }

        tracing::debug!(
            batch = index,
            size = batch.len(),
            tp = batch_counts.tp,
            tn = batch_counts.tn,
            fp = batch_counts.fp,
            fn_ = batch_counts.fn_,
            "batch evaluated"
        );

        batch_count += 1;
        on_batch(BatchProgress {
            batch: index,
            samples: batch.len(),
        });
    }

    rank_errors(&mut errors);
    let metrics = counts.metrics();

    tracing::info!(
        batches = batch_count,
        samples = counts.total(),
        apcer = metrics.apcer,
        bpcer = metrics.bpcer,
        acer = metrics.acer,
        misclassified = errors.len(),
        "evaluation complete"
    );

    Ok(EvalReport {
        counts,
        metrics,
        errors,
        batches: batch_count,
    })
}

/// Sort error records by probability, highest first. Equal probabilities keep their order.
pub fn rank_errors(errors: &mut [ErrorRecord]) {
    errors.sort_by(|a, b| b.probability.total_cmp(&a.probability));
}
