//! The four tile kernels of the tiled QR factorization.
//!
//! | kernel   | operands                              | effect                                           |
//! |----------|---------------------------------------|--------------------------------------------------|
//! | `dgeqrt` | `A(k, k)`, `T(k, k)`                  | QR of the diagonal tile                          |
//! | `dlarfb` | `A(k, k)`, `T(k, k)`, `A(k, j)`       | applies the diagonal reflectors to a row tile    |
//! | `dtpqrt` | `A(k, k)`, `A(i, k)`, `T(i, k)`       | folds a tile below the diagonal into `R(k, k)`   |
//! | `dtpmqrt`| `A(i, k)`, `T(i, k)`, `A(k, j)`, `A(i, j)` | applies the elimination reflectors to a tile pair |
//!
//! Kernels are pure transforms of their tile views. They don't allocate: temporaries come from
//! the [`PodStack`] handed to them, sized by [`scratch_req`].

use crate::{
    linalg::qr::tiled::graph::Task,
    tile::{TileIndex, TileStorage},
    Error, MatRef, Result,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use serde::Serialize;

pub mod geqrt;
pub mod larfb;
pub mod tpmqrt;
pub mod tpqrt;

/// The closed set of tile kernels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KernelKind {
    /// Panel factorization of a diagonal tile.
    #[serde(rename = "dgeqrt")]
    Geqrt,
    /// Panel update of a tile to the right of the diagonal.
    #[serde(rename = "dlarfb")]
    Larfb,
    /// Elimination of a tile below the diagonal.
    #[serde(rename = "dtpqrt")]
    Tpqrt,
    /// Update of a pair of trailing tiles by an elimination.
    #[serde(rename = "dtpmqrt")]
    Tpmqrt,
}

impl KernelKind {
    pub const ALL: [KernelKind; 4] = [Self::Geqrt, Self::Larfb, Self::Tpqrt, Self::Tpmqrt];

    /// Conventional name of the kernel.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            KernelKind::Geqrt => "dgeqrt",
            KernelKind::Larfb => "dlarfb",
            KernelKind::Tpqrt => "dtpqrt",
            KernelKind::Tpmqrt => "dtpmqrt",
        }
    }
}

impl core::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Negative status reported by a kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelError {
    /// `-(c + 1)` for the first offending local column `c`.
    pub info: i32,
}

/// Checks that every entry of `tile` is finite.
///
/// # Errors
/// Reports the first column, scanning left to right, that holds a non-finite value.
pub fn check_finite(tile: MatRef<'_>) -> core::result::Result<(), KernelError> {
    for j in 0..tile.ncols() {
        for i in 0..tile.nrows() {
            if !tile.read(i, j).is_finite() {
                return Err(KernelError {
                    info: -(j as i32) - 1,
                });
            }
        }
    }
    Ok(())
}

/// Computes the size and alignment of the workspace any kernel needs on tiles of size
/// `tile_size`.
pub fn scratch_req(tile_size: usize) -> core::result::Result<StackReq, SizeOverflow> {
    StackReq::try_any_of([
        geqrt::geqrt_req(tile_size)?,
        larfb::larfb_req(tile_size, tile_size)?,
        tpqrt::tpqrt_req(tile_size)?,
        tpmqrt::tpmqrt_req(tile_size, tile_size)?,
    ])
}

/// Runs the kernel of `task` on the tiles of `storage`.
///
/// # Safety
/// No other task touching a tile written by `task` may run concurrently, and no task writing a
/// tile read by `task` may run concurrently.
pub unsafe fn execute(task: &Task, storage: &TileStorage<'_>, stack: PodStack<'_>) -> Result<()> {
    let op = |i: usize| task.operand(i);
    let status = match task.kind {
        KernelKind::Geqrt => geqrt::geqrt(storage.tile_mut(op(0)), storage.tile_mut(op(1))),
        KernelKind::Larfb => larfb::larfb(
            storage.tile_ref(op(0)),
            storage.tile_ref(op(1)),
            storage.tile_mut(op(2)),
            stack,
        ),
        KernelKind::Tpqrt => tpqrt::tpqrt(
            storage.tile_mut(op(0)),
            storage.tile_mut(op(1)),
            storage.tile_mut(op(2)),
        ),
        KernelKind::Tpmqrt => tpmqrt::tpmqrt(
            storage.tile_ref(op(0)),
            storage.tile_ref(op(1)),
            storage.tile_mut(op(2)),
            storage.tile_mut(op(3)),
            stack,
        ),
    };
    status.map_err(|e| numerical_error(task.kind, task.target(), e))
}

#[cold]
fn numerical_error(kind: KernelKind, tile: TileIndex, e: KernelError) -> Error {
    Error::Numerical {
        kind,
        tile,
        info: e.info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, Mat};

    #[test]
    fn finite_check_reports_the_first_column() {
        let mut a = Mat::from_fn(3, 4, |i, j| (i + j) as f64);
        assert!(check_finite(a.as_ref()).is_ok());
        a.write(2, 3, f64::INFINITY);
        a.write(1, 1, f64::NAN);
        assert!(check_finite(a.as_ref()) == Err(KernelError { info: -2 }));
    }

    #[test]
    fn kernel_names() {
        let names: Vec<_> = KernelKind::ALL.iter().map(|k| k.to_string()).collect();
        assert!(names == ["dgeqrt", "dlarfb", "dtpqrt", "dtpmqrt"]);
    }
}
