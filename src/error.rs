//! Errors raised while loading documents (parameter trees, situations) from
//! outside the engine. Evaluation itself reports [`ComputationError`].
use crate::compute::ComputationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid document: {0}")]
    Invalid(String),
    #[error(transparent)]
    Computation(#[from] ComputationError),
}
