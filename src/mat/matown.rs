use super::*;
use crate::assert;

/// Heap allocated resizable matrix, stored in row-major order with a leading dimension.
///
/// The leading dimension (`row_stride`) may be larger than the number of columns, in which case
/// the padding at the end of each row is never read or written by the views.
#[derive(Clone)]
pub struct Mat {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
    row_stride: usize,
}

impl Mat {
    /// Returns an empty matrix of dimension `0×0`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            nrows: 0,
            ncols: 0,
            row_stride: 0,
        }
    }

    /// Returns a matrix with the given dimensions, filled with zeros.
    #[inline]
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::with_row_stride(nrows, ncols, ncols)
    }

    /// Returns a zero matrix with the given dimensions and leading dimension.
    ///
    /// # Panics
    /// Panics if `row_stride < ncols`, or if the required size overflows.
    #[track_caller]
    pub fn with_row_stride(nrows: usize, ncols: usize, row_stride: usize) -> Self {
        assert!(row_stride >= ncols);
        let len = nrows.checked_mul(row_stride).unwrap_or_else(|| capacity_overflow());
        Self {
            data: vec![0.0; len],
            nrows,
            ncols,
            row_stride,
        }
    }

    /// Returns a matrix with the given dimensions, where the `(i, j)` entry is `f(i, j)`.
    ///
    /// Entries are generated in row-major order.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(nrows.checked_mul(ncols).unwrap_or_else(|| capacity_overflow()));
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        Self {
            data,
            nrows,
            ncols,
            row_stride: ncols,
        }
    }

    /// Takes ownership of a row-major buffer with leading dimension `row_stride`.
    ///
    /// # Panics
    /// Panics if `row_stride < ncols` or if `data.len() != nrows * row_stride`.
    #[track_caller]
    pub fn from_row_major_vec(data: Vec<f64>, nrows: usize, ncols: usize, row_stride: usize) -> Self {
        assert!(row_stride >= ncols);
        assert!(Some(data.len()) == nrows.checked_mul(row_stride));
        Self {
            data,
            nrows,
            ncols,
            row_stride,
        }
    }

    /// Returns the number of rows of the matrix.
    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns the leading dimension of the matrix.
    #[inline(always)]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Returns the underlying row-major buffer, padding included.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Returns the underlying row-major buffer mutably, padding included.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Returns a view over the matrix.
    #[inline]
    pub fn as_ref(&self) -> MatRef<'_> {
        unsafe { MatRef::from_raw_parts(self.data.as_ptr(), self.nrows, self.ncols, self.row_stride) }
    }

    /// Returns a mutable view over the matrix.
    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_> {
        unsafe {
            MatMut::from_raw_parts(self.data.as_mut_ptr(), self.nrows, self.ncols, self.row_stride)
        }
    }

    /// Reads the value at the given indices.
    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> f64 {
        self.as_ref().read(row, col)
    }

    /// Writes the value at the given indices.
    #[inline(always)]
    #[track_caller]
    pub fn write(&mut self, row: usize, col: usize, value: f64) {
        self.as_mut().write(row, col, value)
    }
}

impl Default for Mat {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Mat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.as_ref(), f)
    }
}

impl core::ops::Index<(usize, usize)> for Mat {
    type Output = f64;

    #[inline]
    #[track_caller]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(all(row < self.nrows, col < self.ncols));
        &self.data[row * self.row_stride + col]
    }
}

impl core::ops::IndexMut<(usize, usize)> for Mat {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(all(row < self.nrows, col < self.ncols));
        &mut self.data[row * self.row_stride + col]
    }
}

#[cold]
#[track_caller]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn from_fn_fills_row_major() {
        let mut order = Vec::new();
        let a = Mat::from_fn(2, 3, |i, j| {
            order.push((i, j));
            (10 * i + j) as f64
        });
        assert!(order == vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        assert!(a[(1, 2)] == 12.0);
        assert!(a.as_slice().len() == 6);
    }

    #[test]
    fn padded_storage() {
        let mut a = Mat::with_row_stride(3, 2, 5);
        a.write(2, 1, 7.0);
        assert!(a.as_slice()[2 * 5 + 1] == 7.0);
        assert!(a.as_ref().row_stride() == 5);

        let b = a.as_ref().to_owned();
        assert!(all(b.row_stride() == 2, b[(2, 1)] == 7.0));
    }
}
