use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read image directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no sketch/portrait pairs found between {sketch_dir} and {photo_dir}")]
    NoPairs {
        sketch_dir: PathBuf,
        photo_dir: PathBuf,
    },

    #[error("{0} image pairs cannot fill non-empty train, validation and test splits")]
    TooFewPairs(usize),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] RecorderError),

    #[error("failed to load configuration from {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
