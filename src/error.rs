use std::path::PathBuf;
use thiserror::Error;

use crate::analyzer::cluster::ClusterError;
use crate::analyzer::document::DocumentError;
use crate::analyzer::merge::MergeError;
use crate::analyzer::resource::ResourceError;

#[derive(Error, Debug)]
pub enum KubeguardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error in {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors that abort processing of a single manifest file.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("document {index}: {source}")]
    Document {
        index: usize,
        #[source]
        source: DocumentError,
    },

    #[error("document {index}: {source}")]
    Resource {
        index: usize,
        #[source]
        source: ResourceError,
    },

    #[error("document {index}: {source}")]
    Merge {
        index: usize,
        #[source]
        source: MergeError,
    },
}

pub type Result<T> = std::result::Result<T, KubeguardError>;
