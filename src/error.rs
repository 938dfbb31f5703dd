//! Error types for microflow

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Model encoding error: {0}")]
  Encode(#[from] postcard::Error),

  #[error("Descriptor error: {0}")]
  Descriptor(#[from] serde_yaml::Error),

  #[error("Unsupported model format version {0}")]
  UnsupportedVersion(u32),

  #[error("Invalid layer: {0}")]
  InvalidLayer(String),

  #[error("Invalid training config: {0}")]
  InvalidConfig(String),

  #[error("Path already exists: {0}")]
  AlreadyExists(PathBuf),

  #[error("Not a model directory: {0}")]
  NotADirectory(PathBuf),

  #[error("Model at {path} has no '{flavor}' flavor")]
  MissingFlavor { path: PathBuf, flavor: String },

  #[error("Flavor '{flavor}' is missing the '{key}' entry")]
  MissingFlavorKey { flavor: String, key: String },

  #[error("No loader registered for module '{0}'")]
  UnknownLoader(String),

  #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
  ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

  #[error("Run {0} is already active")]
  RunActive(String),

  #[error("Run '{0}' not found")]
  RunNotFound(String),

  #[error("Invalid artifact URI: {0}")]
  InvalidUri(String),
}

pub type Result<T> = std::result::Result<T, Error>;
