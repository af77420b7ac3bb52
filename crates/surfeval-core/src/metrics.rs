//! Anti-spoofing error rates derived from a binary confusion matrix.
//!
//! Label 1 is a bona fide (live) presentation and label 0 an attack, so a
//! false positive is an attack accepted as live. The counts follow a
//! confusion matrix with the fixed label ordering `[0, 1]`: predictions or
//! ground truth outside that ordering are not counted in any cell.

use serde::Serialize;

/// Running confusion totals for a binary live/spoof classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    /// Live sample predicted live.
    pub tp: u64,
    /// Spoof sample predicted spoof.
    pub tn: u64,
    /// Spoof sample predicted live.
    pub fp: u64,
    /// Live sample predicted spoof.
    pub fn_: u64,
    /// Samples whose label or prediction fell outside `[0, 1]`.
    pub ignored: u64,
}

impl ConfusionCounts {
    /// Tally one (label, prediction) pair.
    pub fn record(&mut self, label: u8, predicted: usize) {
        match (label, predicted) {
            (1, 1) => self.tp += 1,
            (0, 0) => self.tn += 1,
            (0, 1) => self.fp += 1,
            (1, 0) => self.fn_ += 1,
            _ => self.ignored += 1,
        }
    }

    /// Build the 2x2 counts for one batch of labels and predictions.
    pub fn from_predictions(labels: &[u8], predicted: &[usize]) -> Self {
        let mut counts = Self::default();
        for (&label, &pred) in labels.iter().zip(predicted) {
            counts.record(label, pred);
        }
        counts
    }

    /// Add another set of counts into this one.
    pub fn merge(&mut self, other: &ConfusionCounts) {
        self.tp += other.tp;
        self.tn += other.tn;
        self.fp += other.fp;
        self.fn_ += other.fn_;
        self.ignored += other.ignored;
    }

    /// Number of samples counted in the four cells.
    pub fn total(&self) -> u64 {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::from_counts(self)
    }
}

/// APCER / BPCER / ACER, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub apcer: f64,
    pub bpcer: f64,
    pub acer: f64,
}

impl Metrics {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        // fp > 0 implies tn + fp > 0, so the numerator guard also covers the denominator.
        let apcer = if counts.fp != 0 {
            counts.fp as f64 / (counts.tn + counts.fp) as f64
        } else {
            0.0
        };
        let bpcer = if counts.fn_ != 0 {
            counts.fn_ as f64 / (counts.fn_ + counts.tp) as f64
        } else {
            0.0
        };

        Self {
            apcer,
            bpcer,
            acer: (apcer + bpcer) / 2.0,
        }
    }
}

/// Float with a trailing `.0` when whole, so `1` prints as `1.0`.
fn float_repr(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// An error rate. A zero rate comes from the empty-numerator guard and is
/// printed as the integer `0`.
fn rate_repr(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else {
        float_repr(v)
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "APCER: {}, BPCER: {}, ACER: {}",
            rate_repr(self.apcer),
            rate_repr(self.bpcer),
            float_repr(self.acer)
        )
    }
}
