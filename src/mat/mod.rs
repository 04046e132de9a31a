//! Dense row-major matrices of `f64`.
//!
//! [`Mat`] owns its storage. [`MatRef`] and [`MatMut`] are strided views over it, similar to
//! `&[f64]` and `&mut [f64]` with a second dimension. Rows are contiguous, and consecutive rows
//! are `row_stride` elements apart, where `row_stride >= ncols` is the leading dimension.

use core::{marker::PhantomData, ptr::NonNull};
use reborrow::*;

mod matmut;
mod matown;
mod matref;

pub use matmut::MatMut;
pub use matown::Mat;
pub use matref::MatRef;

#[repr(C)]
#[derive(Copy, Clone)]
struct MatImpl {
    ptr: NonNull<f64>,
    nrows: usize,
    ncols: usize,
    row_stride: usize,
}

unsafe impl Sync for MatImpl {}
unsafe impl Send for MatImpl {}

impl MatImpl {
    #[inline(always)]
    unsafe fn ptr_at(self, row: usize, col: usize) -> *mut f64 {
        self.ptr.as_ptr().add(row * self.row_stride + col)
    }

    /// Same as `ptr_at`, but may point past the end of the allocation for empty views.
    #[inline(always)]
    fn overflowing_ptr_at(self, row: usize, col: usize) -> *mut f64 {
        self.ptr.as_ptr().wrapping_add(row.wrapping_mul(self.row_stride).wrapping_add(col))
    }

    #[inline(always)]
    unsafe fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        Self {
            ptr: NonNull::new_unchecked(self.overflowing_ptr_at(row_start, col_start)),
            nrows,
            ncols,
            row_stride: self.row_stride,
        }
    }
}

/// Minimum number of elements a slice must hold to back a matrix with the given shape.
#[inline]
pub(crate) fn required_len(nrows: usize, ncols: usize, row_stride: usize) -> usize {
    if nrows == 0 || ncols == 0 {
        0
    } else {
        (nrows - 1) * row_stride + ncols
    }
}

/// Scaled sum of squares over the elements of `iter`, in the manner of the reference BLAS
/// `nrm2`, so that the result neither overflows nor underflows for representable inputs.
#[inline]
pub(crate) fn norm_l2_of(iter: impl Iterator<Item = f64>) -> f64 {
    let mut scale = 0.0f64;
    let mut ssq = 1.0f64;
    for x in iter {
        if x != 0.0 {
            let abs = x.abs();
            if scale < abs {
                let r = scale / abs;
                ssq = 1.0 + ssq * r * r;
                scale = abs;
            } else {
                let r = abs / scale;
                ssq += r * r;
            }
        }
    }
    scale * ssq.sqrt()
}
