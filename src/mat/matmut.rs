use super::*;
use crate::{assert, debug_assert};

/// Mutable view over a matrix, similar to a mutable reference to a 2D strided [prim@slice].
#[repr(C)]
pub struct MatMut<'a> {
    pub(super) inner: MatImpl,
    pub(super) __marker: PhantomData<&'a mut f64>,
}

impl<'short> Reborrow<'short> for MatMut<'_> {
    type Target = MatRef<'short>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        MatRef {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'short> ReborrowMut<'short> for MatMut<'_> {
    type Target = MatMut<'short>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        MatMut {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'a> IntoConst for MatMut<'a> {
    type Target = MatRef<'a>;

    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef {
            inner: self.inner,
            __marker: PhantomData,
        }
    }
}

impl<'a> MatMut<'a> {
    /// Creates a `MatMut` from a pointer to the first element, the dimensions and the row
    /// stride.
    ///
    /// # Safety
    /// For the lifetime `'a`, every element `ptr.add(i * row_stride + j)` with `i < nrows` and
    /// `j < ncols` must be valid for reads and writes, and must not be accessed through any
    /// other pointer.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut f64, nrows: usize, ncols: usize, row_stride: usize) -> Self {
        Self {
            inner: MatImpl {
                ptr: NonNull::new_unchecked(ptr),
                nrows,
                ncols,
                row_stride,
            },
            __marker: PhantomData,
        }
    }

    /// Creates a `MatMut` over a row-major slice with leading dimension `row_stride`.
    ///
    /// # Panics
    /// Panics if `row_stride < ncols` or if the slice is too short.
    #[track_caller]
    #[inline]
    pub fn from_row_major_slice_mut(
        slice: &'a mut [f64],
        nrows: usize,
        ncols: usize,
        row_stride: usize,
    ) -> Self {
        assert!(all(
            row_stride >= ncols,
            slice.len() >= required_len(nrows, ncols, row_stride),
        ));
        unsafe { Self::from_raw_parts(slice.as_mut_ptr(), nrows, ncols, row_stride) }
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

    /// Returns a mutable pointer to the first element of the matrix.
    #[inline(always)]
    pub fn as_ptr_mut(self) -> *mut f64 {
        self.inner.ptr.as_ptr()
    }

    /// Reads the value at the given indices.
    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> f64 {
        self.rb().read(row, col)
    }

    /// Reads the value at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn read_unchecked(&self, row: usize, col: usize) -> f64 {
        self.rb().read_unchecked(row, col)
    }

    /// Writes the value at the given indices.
    ///
    /// # Panics
    /// Panics if either index is out of bounds.
    #[inline(always)]
    #[track_caller]
    pub fn write(&mut self, row: usize, col: usize, value: f64) {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { self.write_unchecked(row, col, value) }
    }

    /// Writes the value at the given indices, without bound checks.
    ///
    /// # Safety
    /// `row < self.nrows()` and `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub unsafe fn write_unchecked(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(all(row < self.nrows(), col < self.ncols()));
        *self.inner.ptr_at(row, col) = value;
    }

    /// Returns the `i`-th row as a mutable slice.
    #[inline]
    #[track_caller]
    pub fn row_mut(self, i: usize) -> &'a mut [f64] {
        assert!(i < self.nrows());
        unsafe { core::slice::from_raw_parts_mut(self.inner.ptr_at(i, 0), self.ncols()) }
    }

    /// Returns a view over the submatrix starting at `(row_start, col_start)` with the given
    /// dimensions.
    ///
    /// # Panics
    /// Panics if the submatrix does not fit in `self`.
    #[track_caller]
    #[inline]
    pub fn submatrix_mut(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        let sub = self.into_const().submatrix(row_start, col_start, nrows, ncols);
        Self {
            inner: sub.inner,
            __marker: PhantomData,
        }
    }

    /// Splits the matrix into four disjoint corner parts at the given indices, in the order
    /// top left, top right, bottom left, bottom right.
    #[track_caller]
    #[inline]
    pub fn split_at_mut(self, row: usize, col: usize) -> (Self, Self, Self, Self) {
        let (tl, tr, bl, br) = self.into_const().split_at(row, col);
        let wrap = |m: MatRef<'_>| Self {
            inner: m.inner,
            __marker: PhantomData,
        };
        (wrap(tl), wrap(tr), wrap(bl), wrap(br))
    }

    /// Splits the matrix horizontally at the given row index into two disjoint parts.
    #[track_caller]
    #[inline]
    pub fn split_at_row_mut(self, row: usize) -> (Self, Self) {
        let (top, bot) = self.into_const().split_at_row(row);
        (
            Self {
                inner: top.inner,
                __marker: PhantomData,
            },
            Self {
                inner: bot.inner,
                __marker: PhantomData,
            },
        )
    }

    /// Copies the values from `src` into `self`.
    ///
    /// # Panics
    /// Panics if the dimensions differ.
    #[track_caller]
    pub fn copy_from(&mut self, src: MatRef<'_>) {
        assert!(all(src.nrows() == self.nrows(), src.ncols() == self.ncols()));
        for i in 0..self.nrows() {
            self.rb_mut().row_mut(i).copy_from_slice(src.row(i));
        }
    }

    /// Fills the matrix with the given value.
    pub fn fill(&mut self, value: f64) {
        for i in 0..self.nrows() {
            self.rb_mut().row_mut(i).fill(value);
        }
    }

    /// Fills the matrix with zeros.
    #[inline]
    pub fn fill_zero(&mut self) {
        self.fill(0.0)
    }
}

impl core::fmt::Debug for MatMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.rb(), f)
    }
}

impl core::ops::Index<(usize, usize)> for MatMut<'_> {
    type Output = f64;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &*self.inner.ptr_at(row, col) }
    }
}

impl core::ops::IndexMut<(usize, usize)> for MatMut<'_> {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(all(row < self.nrows(), col < self.ncols()));
        unsafe { &mut *self.inner.ptr_at(row, col) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn split_parts_are_disjoint() {
        let mut data = vec![0.0; 20];
        let a = MatMut::from_row_major_slice_mut(&mut data, 4, 4, 5);
        let (mut tl, mut tr, mut bl, mut br) = a.split_at_mut(2, 1);
        tl.fill(1.0);
        tr.fill(2.0);
        bl.fill(3.0);
        br.fill(4.0);

        // padding column stays untouched
        for i in 0..4 {
            assert!(data[i * 5 + 4] == 0.0);
        }
        assert!(all(data[0] == 1.0, data[1] == 2.0, data[10] == 3.0, data[18] == 4.0));
    }

    #[test]
    fn copy_from_respects_strides() {
        let src: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let src = MatRef::from_row_major_slice(&src, 2, 3, 3);
        let mut dst = vec![-1.0; 8];
        let mut d = MatMut::from_row_major_slice_mut(&mut dst, 2, 3, 4);
        d.copy_from(src);
        assert!(d[(1, 2)] == 5.0);
        assert!(dst[3] == -1.0);
        assert!(dst[6] == 5.0);
    }
}
