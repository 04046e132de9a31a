use super::*;
use crate::{assert, debug_assert};

/// Immutable view over a matrix, similar to an immutable reference to a 2D strided [prim@slice].
#[repr(C)]
pub struct MatRef<'a> {
    pub(super) inner: MatImpl,
    pub(super) __marker: PhantomData<&'a f64>,
}

impl Clone for MatRef<'_> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl Copy for MatRef<'_> {}

impl<'short> Reborrow<'short> for MatRef<'_> {
    type Target = MatRef<'short>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short> ReborrowMut<'short> for MatRef<'_> {
    type Target = MatRef<'short>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl IntoConst for MatRef<'_> {
    type Target = Self;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'a> MatRef<'a> {
    /// Creates a `MatRef` from a pointer to the first element, the dimensions and the row
    /// stride.
    ///
    /// # Safety
    /// For the lifetime `'a`, every element `ptr.add(i * row_stride + j)` with `i < nrows` and
    /// `j < ncols` must be valid for reads, and must not be written through another pointer.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const f64, nrows: usize, ncols: usize, row_stride: usize) -> Self {
        Self {
            inner: MatImpl {
                ptr: NonNull::new_unchecked(ptr as *mut f64),
                nrows,
                ncols,
                row_stride,
            },
            __marker: PhantomData,
        }
    }

    /// Creates a `MatRef` over a row-major slice with leading dimension `row_stride`.
    ///
    /// # Panics
    /// Panics if `row_stride < ncols` or if the slice is too short.
    #[track_caller]
    #[inline]
    pub fn from_row_major_slice(slice: &'a [f64], nrows: usize, ncols: usize, row_stride: usize) -> Self {
        assert!(all(
            row_stride >= ncols,
            slice.len() >= required_len(nrows, ncols, row_stride),
        ));
        unsafe { Self::from_raw_parts(slice.as_ptr(), nrows, ncols, row_stride) }
    }

    /// Returns the number of rows of the matrix.
    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.inner.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.inner.ncols
    }

    /// Returns the distance between consecutive rows, in elements.
    #[inline(always)]
    pub fn row_stride(&self) -> usize {
        self.inner.row_stride
    }

    /// Returns a pointer to the first element of the matrix.
    #[inline(always)]
    pub fn as_ptr(self) -> *const f64 {
        self.inner.ptr.as_ptr()
    }

    /// Reads the value at the given indices.
    ///
    /// # Panics
    /// Panics if either index is out of bounds.
    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> f64 {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { self.read_unchecked(row, col) }
    }

    /// Reads the value at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn read_unchecked(&self, row: usize, col: usize) -> f64 {
        debug_assert!(all(row < self.nrows(), col < self.ncols()));
        *self.inner.ptr_at(row, col)
    }

    /// Returns the `i`-th row as a slice.
    #[inline]
    #[track_caller]
    pub fn row(self, i: usize) -> &'a [f64] {
        assert!(i < self.nrows());
        unsafe { core::slice::from_raw_parts(self.inner.ptr_at(i, 0), self.ncols()) }
    }

    /// Returns a view over the submatrix starting at `(row_start, col_start)` with the given
    /// dimensions.
    ///
    /// # Panics
    /// Panics if the submatrix does not fit in `self`.
    #[track_caller]
    #[inline]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        assert!(all(row_start <= self.nrows(), col_start <= self.ncols()));
        assert!(all(
            nrows <= self.nrows() - row_start,
            ncols <= self.ncols() - col_start,
        ));
        Self {
            inner: unsafe { self.inner.submatrix(row_start, col_start, nrows, ncols) },
            __marker: PhantomData,
        }
    }

    /// Splits the matrix into four corner parts at the given indices, in the order
    /// top left, top right, bottom left, bottom right.
    #[track_caller]
    #[inline]
    pub fn split_at(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        assert!(all(row <= self.nrows(), col <= self.ncols()));
        let (m, n) = (self.nrows(), self.ncols());
        (
            self.submatrix(0, 0, row, col),
            self.submatrix(0, col, row, n - col),
            self.submatrix(row, 0, m - row, col),
            self.submatrix(row, col, m - row, n - col),
        )
    }

    /// Splits the matrix horizontally at the given row index.
    #[track_caller]
    #[inline]
    pub fn split_at_row(self, row: usize) -> (Self, Self) {
        assert!(row <= self.nrows());
        let (m, n) = (self.nrows(), self.ncols());
        (self.submatrix(0, 0, row, n), self.submatrix(row, 0, m - row, n))
    }

    /// Iterates over the entries of the matrix in row-major order.
    #[inline]
    pub fn iter(self) -> impl Iterator<Item = f64> + 'a {
        (0..self.nrows()).flat_map(move |i| self.row(i).iter().copied())
    }

    /// Returns the scaled L2 norm of the entries, treated as a single vector.
    #[inline]
    pub fn norm_l2(self) -> f64 {
        norm_l2_of(self.iter())
    }

    /// Returns the Frobenius norm of the matrix.
    #[inline]
    pub fn norm_frobenius(self) -> f64 {
        self.norm_l2()
    }

    /// Returns `true` if every entry is finite.
    #[inline]
    pub fn is_all_finite(self) -> bool {
        self.iter().all(f64::is_finite)
    }

    /// Returns an owned copy of the matrix, compacted so that `row_stride == ncols`.
    #[inline]
    pub fn to_owned(self) -> Mat {
        Mat::from_fn(self.nrows(), self.ncols(), |i, j| unsafe { self.read_unchecked(i, j) })
    }
}

impl core::fmt::Debug for MatRef<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct DebugRow<'a>(&'a [f64]);
        impl core::fmt::Debug for DebugRow<'_> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_list().entries(self.0.iter()).finish()
            }
        }
        let this = *self;
        f.debug_list()
            .entries((0..this.nrows()).map(|i| DebugRow(this.row(i))))
            .finish()
    }
}

impl core::ops::Index<(usize, usize)> for MatRef<'_> {
    type Output = f64;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &*self.inner.ptr_at(row, col) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn submatrix_follows_the_leading_dimension() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        // 3x3 matrix with leading dimension 4
        let a = MatRef::from_row_major_slice(&data, 3, 3, 4);
        let s = a.submatrix(1, 1, 2, 2);
        assert!(s.read(0, 0) == 5.0);
        assert!(s.read(1, 1) == 10.0);
        assert!(s.row(1).len() == 2);
        assert!(s.row(1)[0] == 9.0);

        let (tl, tr, bl, br) = a.split_at(1, 2);
        assert!(all(
            tl.nrows() == 1,
            tl.ncols() == 2,
            tr.ncols() == 1,
            bl.nrows() == 2,
            br.read(1, 0) == 10.0,
        ));
    }

    #[test]
    fn norm_l2_is_scaled() {
        let data = [3e200, 4e200];
        let a = MatRef::from_row_major_slice(&data, 1, 2, 2);
        assert!((a.norm_l2() / 5e200 - 1.0).abs() < 1e-15);

        let tiny = [3e-200, 4e-200];
        let a = MatRef::from_row_major_slice(&tiny, 2, 1, 1);
        assert!((a.norm_l2() / 5e-200 - 1.0).abs() < 1e-15);
    }
}
