// SPDX-License-Identifier: MIT OR Apache-2.0
//! Application errors.

use modsynth_graph::{BackendError, ConnectionError, GraphError};
use std::path::PathBuf;

/// Result alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Anything that stops a render run
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing command-line arguments
    #[error("usage: modsynth <graph.ron> [settings.ron]")]
    Usage,

    /// A file could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A RON file could not be parsed or written
    #[error("{}: {message}", path.display())]
    Ron {
        /// File involved
        path: PathBuf,
        /// Parser or serializer message
        message: String,
    },

    /// Two document nodes share a key
    #[error("Node key `{0}` is used more than once")]
    DuplicateKey(String),

    /// A connection names a key no node defines
    #[error("Unknown node key `{0}`")]
    UnknownKey(String),

    /// A node could not be created or configured
    #[error("Node `{key}`: {source}")]
    Node {
        /// Document key
        key: String,
        /// Graph error
        #[source]
        source: GraphError,
    },

    /// A connection was rejected
    #[error("Connection {from} -> {to}: {source}")]
    Connect {
        /// Source key and output
        from: String,
        /// Target key and input
        to: String,
        /// Rule that rejected it
        #[source]
        source: ConnectionError,
    },

    /// Backend failure outside node evaluation
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Image decode or encode failure
    #[error("{}: {source}", path.display())]
    Image {
        /// File involved
        path: PathBuf,
        /// Codec error
        #[source]
        source: image::ImageError,
    },

    /// At least one node failed to evaluate
    #[error("{0} node(s) failed to evaluate")]
    SolveFailed(usize),
}

impl AppError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ron(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Ron {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
