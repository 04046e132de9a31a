//! The tiled QR decomposition of a matrix $A$ is a factorization $A = QR$ computed tile by tile.
//!
//! The matrix is split into square tiles of size `b`. For each panel iteration `k`, the diagonal
//! tile is factorized, its reflectors are applied to the tiles on its right, then each tile below
//! it is folded into its triangular factor, and the matching reflectors are applied to the
//! trailing tile pairs. The resulting tasks are executed by the [`Scheduler`](crate::sched::Scheduler),
//! which runs tasks that touch disjoint tiles concurrently.
//!
//! On exit, the upper triangle of the matrix holds $R$, and its strictly lower part together
//! with the reflector coefficient matrix $T$ represent $Q$ implicitly. $T$ has
//! `row_blocks * b` rows and as many columns as the matrix (see [`factor_dims`]).
//!
//! # Example
//! ```
//! use tiled_qr::{
//!     linalg::qr::tiled::{factor_dims, qr_in_place, reconstruct::backward_error, TiledQrParams},
//!     tile::TileLayout,
//!     Mat, Parallelism,
//! };
//!
//! let a = Mat::from_fn(6, 4, |i, j| 1.0 / (i + j + 1) as f64);
//! let b = 2;
//!
//! let mut factors = a.clone();
//! let (t_rows, t_cols) = factor_dims(6, 4, b);
//! let mut t = Mat::zeros(t_rows, t_cols);
//!
//! let info = qr_in_place(
//!     factors.as_mut(),
//!     t.as_mut(),
//!     b,
//!     Parallelism::None,
//!     TiledQrParams::default(),
//! )
//! .unwrap();
//! assert_eq!(info.task_count, 8);
//!
//! let layout = TileLayout::new(6, 4, 4, b).unwrap();
//! let error = backward_error(a.as_ref(), factors.as_ref(), t.as_ref(), &layout, Parallelism::None);
//! assert!(error < 1e-12);
//! ```

use crate::{
    linalg::kernels,
    sched::{CancellationToken, Observer, Scheduler},
    tile::{TileLayout, TileStorage},
    utils::DivCeil,
    Error, Mat, MatMut, MatRef, Parallelism, Result,
};
use reborrow::*;
use std::time::Duration;

pub mod graph;
pub mod reconstruct;

use graph::TaskGraph;

/// Tuning and instrumentation parameters for [`qr_in_place`].
#[derive(Clone, Default)]
#[non_exhaustive]
pub struct TiledQrParams<'a> {
    /// Stops the factorization before the next task starts, once cancelled.
    pub cancellation: Option<CancellationToken>,
    /// Receives task state transitions.
    pub observer: Option<&'a dyn Observer>,
}

impl core::fmt::Debug for TiledQrParams<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TiledQrParams")
            .field("cancellation", &self.cancellation)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Summary of a completed factorization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TiledQrInfo {
    /// Number of tasks emitted.
    pub task_count: usize,
    /// Number of workers used.
    pub workers: usize,
    /// Time spent executing the task graph.
    pub compute_time: Duration,
}

/// Returns a tile size suited to a matrix of the given dimensions.
pub fn recommended_tile_size(nrows: usize, ncols: usize) -> usize {
    let prod = nrows.saturating_mul(ncols);
    let size = nrows.min(ncols);

    (if prod > 8192 * 8192 {
        256
    } else if prod > 2048 * 2048 {
        192
    } else if prod > 1024 * 1024 {
        128
    } else if prod > 512 * 512 {
        96
    } else if prod > 128 * 128 {
        64
    } else if prod > 32 * 32 {
        32
    } else if prod > 16 * 16 {
        8
    } else {
        4
    })
    .min(size)
    .max(1)
}

/// Dimensions `(rows, cols)` of the reflector coefficient matrix for an `nrows × ncols` matrix
/// tiled with `tile_size`.
///
/// # Panics
/// Panics if `tile_size` is zero.
#[track_caller]
pub fn factor_dims(nrows: usize, ncols: usize, tile_size: usize) -> (usize, usize) {
    crate::assert!(tile_size > 0);
    (nrows.msrv_div_ceil(tile_size) * tile_size, ncols)
}

/// Computes the tiled QR decomposition of `a` in place, storing the reflector coefficients in
/// `householder_factor`.
///
/// `householder_factor` must have the dimensions returned by [`factor_dims`] and be stored
/// contiguously. Its previous content is ignored.
///
/// # Errors
/// - [`Error::Configuration`] if `tile_size` is zero or `householder_factor` has the wrong shape,
/// - [`Error::Numerical`] if a kernel meets a non-finite value,
/// - [`Error::Cancelled`] if `params.cancellation` was triggered before every task could start,
/// - [`Error::WorkerPool`] if the worker threads could not be started.
///
/// After an error, the tiles touched by tasks that completed hold partial results, the others are
/// untouched.
pub fn qr_in_place(
    a: MatMut<'_>,
    householder_factor: MatMut<'_>,
    tile_size: usize,
    parallelism: Parallelism,
    params: TiledQrParams<'_>,
) -> Result<TiledQrInfo> {
    let (m, n) = (a.nrows(), a.ncols());
    let layout = TileLayout::new(m, n, a.row_stride(), tile_size)?;

    if householder_factor.nrows() != layout.t_nrows()
        || householder_factor.ncols() != n
        || householder_factor.row_stride() != n
    {
        return Err(Error::Configuration(format!(
            "reflector coefficient matrix must be {}x{} with a row stride of {n}, got {}x{} with a row stride of {}",
            layout.t_nrows(),
            n,
            householder_factor.nrows(),
            householder_factor.ncols(),
            householder_factor.row_stride(),
        )));
    }

    #[cfg(feature = "perf-warn")]
    if tile_size > Ord::min(m, n) && log::log_enabled!(target: "tiled_qr_perf", log::Level::Warn) {
        log::warn!(
            target: "tiled_qr_perf",
            "tile size {tile_size} exceeds the matrix dimensions {m}x{n}, the factorization runs on a single tile"
        );
    }

    let scratch = kernels::scratch_req(tile_size)
        .map_err(|_| Error::Configuration(format!("tile size {tile_size} is too large")))?;

    let graph = TaskGraph::build(&layout);
    let storage = TileStorage::new(a, householder_factor, layout);

    let mut scheduler = Scheduler::new(&graph, parallelism);
    if let Some(token) = params.cancellation {
        scheduler = scheduler.with_cancellation(token);
    }
    if let Some(observer) = params.observer {
        scheduler = scheduler.with_observer(observer);
    }

    // the scheduler never runs two tasks with conflicting accesses to a tile concurrently
    let stats = scheduler.run(scratch, |task, stack| unsafe { kernels::execute(task, &storage, stack) })?;

    Ok(TiledQrInfo {
        task_count: graph.len(),
        workers: stats.workers,
        compute_time: stats.elapsed,
    })
}

/// Owned tiled QR decomposition of a matrix.
#[derive(Clone, Debug)]
pub struct TiledQr {
    factors: Mat,
    householder_factor: Mat,
    layout: TileLayout,
    info: TiledQrInfo,
}

impl TiledQr {
    /// Factorizes a copy of `a` with tiles of size `tile_size`.
    pub fn new(a: MatRef<'_>, tile_size: usize, parallelism: Parallelism) -> Result<Self> {
        Self::with_params(a, tile_size, parallelism, TiledQrParams::default())
    }

    /// Factorizes a copy of `a` with tiles of size `tile_size` and the given parameters.
    pub fn with_params(
        a: MatRef<'_>,
        tile_size: usize,
        parallelism: Parallelism,
        params: TiledQrParams<'_>,
    ) -> Result<Self> {
        let (m, n) = (a.nrows(), a.ncols());
        let layout = TileLayout::new(m, n, n, tile_size)?;
        let mut factors = a.to_owned();
        let mut householder_factor = Mat::zeros(layout.t_nrows(), n);
        let info = qr_in_place(
            factors.as_mut(),
            householder_factor.as_mut(),
            tile_size,
            parallelism,
            params,
        )?;
        Ok(Self {
            factors,
            householder_factor,
            layout,
            info,
        })
    }

    /// The factorized matrix: $R$ in the upper triangle, reflectors below.
    #[inline]
    pub fn factors(&self) -> MatRef<'_> {
        self.factors.as_ref()
    }

    /// The reflector coefficient matrix.
    #[inline]
    pub fn householder_factor(&self) -> MatRef<'_> {
        self.householder_factor.as_ref()
    }

    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    #[inline]
    pub fn info(&self) -> TiledQrInfo {
        self.info
    }

    /// Returns $R$, with explicit zeros below the diagonal.
    pub fn r(&self) -> Mat {
        reconstruct::r_factor(self.factors())
    }

    /// Computes $QR$.
    pub fn reconstruct(&self, parallelism: Parallelism) -> Mat {
        reconstruct::reconstruct(self.factors(), self.householder_factor(), &self.layout, parallelism)
    }

    /// Computes $Q \times$ `rhs` in place.
    #[track_caller]
    pub fn apply_q(&self, rhs: MatMut<'_>, parallelism: Parallelism) {
        reconstruct::apply_q_in_place(self.factors(), self.householder_factor(), &self.layout, rhs, parallelism)
    }

    /// Computes $Q^T \times$ `rhs` in place.
    #[track_caller]
    pub fn apply_q_transpose(&self, mut rhs: MatMut<'_>, parallelism: Parallelism) {
        reconstruct::apply_q_transpose_in_place(
            self.factors(),
            self.householder_factor(),
            &self.layout,
            rhs.rb_mut(),
            parallelism,
        )
    }

    /// Returns the relative residual $\|A - QR\|_F / \|A\|_F$.
    pub fn backward_error(&self, a: MatRef<'_>) -> f64 {
        reconstruct::backward_error(
            a,
            self.factors(),
            self.householder_factor(),
            &self.layout,
            Parallelism::None,
        )
    }
}
