//! CASIA-SURF list-file dataset and an ordered batch loader.
//!
//! A protocol split is described by `4@{protocol}_{mode}.txt` under the
//! dataset root. Each line names the RGB image path (relative to the root)
//! first and the integer label last; any tokens in between (depth and IR
//! paths in the multi-modal lists) are ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use ndarray::{Array4, ArrayView3, Axis};
use thiserror::Error;

use crate::transform::EvalTransform;
use crate::types::{Batch, Sample, LABEL_LIVE, LABEL_SPOOF};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("invalid protocol {0} (expected 1, 2 or 3)")]
    InvalidProtocol(u32),
    #[error("failed to read list file {path}: {source}")]
    ListIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("sample index {index} out of range (dataset has {len} samples)")]
    OutOfRange { index: usize, len: usize },
    #[error("batch samples have mismatched shapes: {0}")]
    ShapeMismatch(#[from] ndarray::ShapeError),
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Dev,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Dev => "dev",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a protocol list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub label: u8,
}

/// Labeled RGB images of one CASIA-SURF protocol split.
#[derive(Debug, Clone)]
pub struct CasiaSurfDataset {
    root: PathBuf,
    entries: Vec<Entry>,
    transform: EvalTransform,
}

/// Path of the list file for a protocol split.
pub fn list_path(dir: &Path, protocol: u32, mode: Mode) -> PathBuf {
    dir.join(format!("4@{protocol}_{mode}.txt"))
}

impl CasiaSurfDataset {
    /// Read the list file for `protocol`/`mode` under `dir`.
    pub fn open(
        protocol: u32,
        mode: Mode,
        dir: &Path,
        transform: EvalTransform,
    ) -> Result<Self, DatasetError> {
        if !(1..=3).contains(&protocol) {
            return Err(DatasetError::InvalidProtocol(protocol));
        }

        let path = list_path(dir, protocol, mode);
        let contents = std::fs::read_to_string(&path).map_err(|source| DatasetError::ListIo {
            path: path.clone(),
            source,
        })?;
        let entries = parse_list(&path, &contents)?;

        tracing::info!(
            list = %path.display(),
            protocol,
            mode = %mode,
            samples = entries.len(),
            "dataset opened"
        );

        Ok(Self {
            root: dir.to_path_buf(),
            entries,
            transform,
        })
    }

    /// Build a dataset from already-parsed entries.
    pub fn from_entries(root: &Path, entries: Vec<Entry>, transform: EvalTransform) -> Self {
        Self {
            root: root.to_path_buf(),
            entries,
            transform,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Load, convert and transform the sample at `index`.
    pub fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        let entry = self.entries.get(index).ok_or(DatasetError::OutOfRange {
            index,
            len: self.entries.len(),
        })?;
        let path = self.root.join(&entry.path);
        let image = load_rgb(&path)?;

        Ok(Sample {
            image: self.transform.apply(&image),
            label: entry.label,
            source: path,
        })
    }
}

/// Open an image file and convert it to 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage, DatasetError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse list-file contents. `path` is only used for error messages.
pub fn parse_list(path: &Path, contents: &str) -> Result<Vec<Entry>, DatasetError> {
    let mut entries = Vec::new();

    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_err = |reason: String| DatasetError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(parse_err(format!(
                "expected `<image> ... <label>`, got {line:?}"
            )));
        }

        let raw_label = tokens[tokens.len() - 1];
        let label: u8 = raw_label
            .parse()
            .map_err(|_| parse_err(format!("label {raw_label:?} is not an integer")))?;
        if label != LABEL_LIVE && label != LABEL_SPOOF {
            return Err(parse_err(format!("label {label} is not 0 or 1")));
        }

        entries.push(Entry {
            path: PathBuf::from(tokens[0]),
            label,
        });
    }

    Ok(entries)
}

/// Iterates a dataset in order, one batch at a time.
///
/// With `num_workers > 0` the samples of each batch are decoded on that many
/// scoped threads; batch contents and order are the same either way.
pub struct DataLoader<'a> {
    dataset: &'a CasiaSurfDataset,
    batch_size: usize,
    num_workers: usize,
    cursor: usize,
}

impl<'a> DataLoader<'a> {
    pub fn new(
        dataset: &'a CasiaSurfDataset,
        batch_size: usize,
        num_workers: usize,
    ) -> Result<Self, DatasetError> {
        if batch_size == 0 {
            return Err(DatasetError::ZeroBatchSize);
        }
        Ok(Self {
            dataset,
            batch_size,
            num_workers,
            cursor: 0,
        })
    }

    /// Total number of batches in one pass.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn load_range(&self, start: usize, end: usize) -> Result<Vec<Sample>, DatasetError> {
        if self.num_workers == 0 || end - start <= 1 {
            return (start..end).map(|i| self.dataset.get(i)).collect();
        }

        let indices: Vec<usize> = (start..end).collect();
        let chunk = indices.len().div_ceil(self.num_workers);
        let dataset = self.dataset;

        std::thread::scope(|scope| -> Result<Vec<Sample>, DatasetError> {
            let handles: Vec<_> = indices
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        part.iter()
                            .map(|&i| dataset.get(i))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let mut samples = Vec::with_capacity(indices.len());
            for handle in handles {
                match handle.join() {
                    Ok(part) => samples.extend(part?),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(samples)
        })
    }
}

impl Iterator for DataLoader<'_> {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.dataset.len();
        if self.cursor >= len {
            return None;
        }

        let start = self.cursor;
        let end = (start + self.batch_size).min(len);
        self.cursor = end;

        tracing::trace!(start, end, "loading batch");
        Some(self.load_range(start, end).and_then(collate))
    }
}

/// Stack samples into one NCHW batch.
pub fn collate(samples: Vec<Sample>) -> Result<Batch, DatasetError> {
    let views: Vec<ArrayView3<f32>> = samples.iter().map(|s| s.image.view()).collect();
    let images: Array4<f32> = ndarray::stack(Axis(0), &views)?;

    let mut labels = Vec::with_capacity(samples.len());
    let mut sources = Vec::with_capacity(samples.len());
    for sample in samples {
        labels.push(sample.label);
        sources.push(sample.source);
    }

    Ok(Batch {
        images,
        labels,
        sources,
    })
}
