//! Model manifest and content digests for surfeval.
//!
//! Every model file the CLI loads is hashed before use. The digest identifies
//! exactly which weights produced a set of metrics, and when a
//! `<file>.sha256` sidecar sits next to the model it pins the expected
//! digest.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model file descriptor: expected filename and its role in the pipeline.
pub struct ModelFile {
    pub name: &'static str,
    pub role: &'static str,
}

pub const FACE_DETECTOR: ModelFile = ModelFile {
    name: "face_detector.onnx",
    role: "face detector",
};

pub const LANDMARK_REGRESSOR: ModelFile = ModelFile {
    name: "landmarks_68.onnx",
    role: "68-point landmark regressor",
};

pub const DEPTH_RECONSTRUCTOR: ModelFile = ModelFile {
    name: "dense_depth.onnx",
    role: "dense depth reconstructor",
};

/// Models required by single-image inference, in pipeline order.
pub const MODELS: &[ModelFile] = &[FACE_DETECTOR, LANDMARK_REGRESSOR, DEPTH_RECONSTRUCTOR];

/// Extension of the optional digest file stored next to a model.
pub const SIDECAR_EXTENSION: &str = "sha256";

const DIGEST_HEX_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("{role} not found: {path}")]
    Missing { role: String, path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed digest sidecar {path}: {reason}")]
    BadSidecar { path: PathBuf, reason: String },

    #[error("{role} at {path} does not match its sidecar\n  pinned: {pinned}\n  actual: {actual}")]
    DigestMismatch {
        role: String,
        path: PathBuf,
        pinned: String,
        actual: String,
    },
}

/// A model file that exists and, if pinned, matches its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedModel {
    pub role: String,
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the file contents.
    pub digest: String,
    /// Whether a sidecar digest was present and checked.
    pub pinned: bool,
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn file_digest(path: &Path) -> Result<String, ModelIntegrityError> {
    let io_err = |source| ModelIntegrityError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher).map_err(io_err)?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Path of the digest sidecar for `path` (`model.onnx` -> `model.onnx.sha256`).
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(SIDECAR_EXTENSION);
    PathBuf::from(os)
}

/// Pinned digest from a sidecar in `sha256sum` format, lowercased.
///
/// Returns `Ok(None)` when no sidecar exists or it is empty.
pub fn read_sidecar(path: &Path) -> Result<Option<String>, ModelIntegrityError> {
    let sidecar = sidecar_path(path);
    if !sidecar.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&sidecar).map_err(|source| ModelIntegrityError::Io {
        path: sidecar.clone(),
        source,
    })?;
    let Some(token) = contents.split_whitespace().next() else {
        return Ok(None);
    };

    if token.len() != DIGEST_HEX_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ModelIntegrityError::BadSidecar {
            path: sidecar,
            reason: format!("expected {DIGEST_HEX_LEN} hex digits, got {token:?}"),
        });
    }

    Ok(Some(token.to_ascii_lowercase()))
}

/// Hash the file at `path` and check it against its sidecar, if any.
pub fn verify_with_sidecar(role: &str, path: &Path) -> Result<VerifiedModel, ModelIntegrityError> {
    if !path.is_file() {
        return Err(ModelIntegrityError::Missing {
            role: role.to_string(),
            path: path.to_path_buf(),
        });
    }

    let digest = file_digest(path)?;
    let pinned = read_sidecar(path)?;
    if let Some(pinned) = &pinned {
        if *pinned != digest {
            return Err(ModelIntegrityError::DigestMismatch {
                role: role.to_string(),
                path: path.to_path_buf(),
                pinned: pinned.clone(),
                actual: digest,
            });
        }
    }

    Ok(VerifiedModel {
        role: role.to_string(),
        path: path.to_path_buf(),
        digest,
        pinned: pinned.is_some(),
    })
}

/// Verify the classifier checkpoint.
pub fn verify_checkpoint(path: &Path) -> Result<VerifiedModel, ModelIntegrityError> {
    verify_with_sidecar("classifier checkpoint", path)
}

/// Verify every model in [`MODELS`] under `model_dir`.
pub fn verify_models_dir(model_dir: &Path) -> Result<Vec<VerifiedModel>, ModelIntegrityError> {
    MODELS
        .iter()
        .map(|model| verify_with_sidecar(model.role, &model_dir.join(model.name)))
        .collect()
}
