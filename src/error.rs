//! Error types for the tiled factorization and its collaborators.

use crate::{linalg::kernels::KernelKind, tile::TileIndex};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a matrix, building a tiling or running a factorization.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameters, detected before any tile is registered.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The matrix source file is missing or unreadable.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The matrix source file was readable but its content is not a supported matrix.
    #[error("malformed matrix file {}: {reason}", path.display())]
    MatrixFormat {
        /// File that could not be parsed.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A tile coordinate outside of the tiling was requested.
    #[error("tile {index} is outside of the {row_blocks}x{col_blocks} tiling")]
    OutOfRange {
        /// Requested tile.
        index: TileIndex,
        /// Number of tile rows.
        row_blocks: usize,
        /// Number of tile columns.
        col_blocks: usize,
    },

    /// A kernel reported a negative status.
    #[error("{kind} on tile {tile} failed with info = {info}")]
    Numerical {
        /// Kernel that failed.
        kind: KernelKind,
        /// Tile written by the failing task.
        tile: TileIndex,
        /// Negative status code, `-(c + 1)` for the first offending local column `c`.
        info: i32,
    },

    /// The factorization was cancelled before every task could run.
    #[error("factorization cancelled")]
    Cancelled,

    /// The worker pool could not be started.
    #[cfg(feature = "rayon")]
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// The execution trace could not be written.
    #[error("cannot write trace: {0}")]
    Trace(#[from] csv::Error),
}

impl Error {
    /// Returns `true` if the error originates from a kernel.
    #[inline]
    pub fn is_numerical(&self) -> bool {
        matches!(self, Error::Numerical { .. })
    }
}
