//! `tiled-qr` computes the QR decomposition of a dense real matrix by splitting it into square
//! tiles and running a dependency-ordered graph of per-tile Householder kernels, possibly in
//! parallel.
//!
//! The crate is organized bottom-up:
//! - [`mat`]: owned row-major matrices with a leading dimension, and strided views over them.
//! - [`tile`]: the tiling geometry of a matrix and the shared tile storage handed to kernels.
//! - [`linalg::kernels`]: the four tile kernels (panel factorization, panel update, tile
//! elimination, tile-pair update).
//! - [`linalg::qr::tiled`]: the task graph builder, the factorization entry points and the
//! reconstruction helpers.
//! - [`sched`]: the tile-hazard scheduler executing a task graph on a worker pool.
//! - [`trace`]: an execution trace recorder that can be exported to CSV.
//! - [`io`] and [`stats`]: matrix sources (Matrix Market files, random matrices) and printing.
//!
//! # Example
//! ```
//! use tiled_qr::{linalg::qr::tiled::TiledQr, stats::StandardNormalMat, Parallelism};
//! use rand::prelude::*;
//!
//! let rng = &mut StdRng::seed_from_u64(0);
//! let a = StandardNormalMat { nrows: 12, ncols: 8 }.sample(rng);
//!
//! let qr = TiledQr::new(a.as_ref(), 4, Parallelism::None).unwrap();
//! let error = qr.backward_error(a.as_ref());
//! assert!(error < 1e-12);
//! ```

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(non_snake_case)]

use equator::{assert, debug_assert};

pub mod error;
pub mod io;
pub mod linalg;
pub mod mat;
pub mod sched;
pub mod stats;
pub mod tile;
pub mod trace;
pub mod utils;

pub use dyn_stack;
pub use reborrow;

pub use error::{Error, Result};
pub use mat::{Mat, MatMut, MatRef};

/// How the tasks of a factorization are spread over workers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism.
    ///
    /// Every task is executed sequentially on the thread that calls the routine, in the order in
    /// which the tasks were emitted.
    None,
    /// A dedicated pool of the given number of workers. Requires the `rayon` feature.
    ///
    /// `0` means one worker per thread of the global rayon pool, which defaults to the available
    /// hardware concurrency.
    #[cfg(feature = "rayon")]
    Rayon(usize),
}
