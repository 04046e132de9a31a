use super::{DataHandle, TileKind, TileLayout};
use crate::{assert, utils::thread::Ptr, MatMut, MatRef};
use core::marker::PhantomData;

/// Shared access to the matrix and reflector coefficient buffers of a factorization, addressed by
/// tile handles.
///
/// The storage hands out tile views through raw pointers, so that tasks running on different
/// workers can access disjoint tiles concurrently. Exclusivity is the responsibility of the
/// caller, which is what the scheduler's hazard tracking guarantees.
pub struct TileStorage<'a> {
    a: Ptr<f64>,
    t: Ptr<f64>,
    layout: TileLayout,
    __marker: PhantomData<&'a mut f64>,
}

impl<'a> TileStorage<'a> {
    /// Borrows `a` and `t` for the duration of a factorization.
    ///
    /// # Panics
    /// Panics if the dimensions of `a` or `t` don't match `layout`.
    #[track_caller]
    pub fn new(a: MatMut<'a>, t: MatMut<'a>, layout: TileLayout) -> Self {
        assert!(all(
            a.nrows() == layout.nrows(),
            a.ncols() == layout.ncols(),
            a.row_stride() == layout.lda(),
        ));
        assert!(all(
            t.nrows() == layout.t_nrows(),
            t.ncols() == layout.ncols(),
            t.row_stride() == layout.ncols(),
        ));
        Self {
            a: Ptr(a.as_ptr_mut()),
            t: Ptr(t.as_ptr_mut()),
            layout,
            __marker: PhantomData,
        }
    }

    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    #[inline]
    fn raw_parts(&self, handle: DataHandle) -> (*mut f64, usize, usize, usize) {
        let tile = match self.layout.resolve(handle) {
            Ok(tile) => tile,
            Err(e) => panic!("{e}"),
        };
        let base = match handle.kind {
            TileKind::Matrix => self.a.0,
            TileKind::Factor => self.t.0,
        };
        let ptr = base.wrapping_add(tile.offset());
        (ptr, tile.nrows, tile.ncols, tile.row_stride)
    }

    /// Returns a mutable view over the tile referred to by `handle`.
    ///
    /// # Panics
    /// Panics if `handle` is outside of the tiling.
    ///
    /// # Safety
    /// No other view of the same tile may be alive while the returned one is used.
    #[track_caller]
    pub unsafe fn tile_mut(&self, handle: DataHandle) -> MatMut<'a> {
        let (ptr, nrows, ncols, row_stride) = self.raw_parts(handle);
        MatMut::from_raw_parts(ptr, nrows, ncols, row_stride)
    }

    /// Returns a view over the tile referred to by `handle`.
    ///
    /// # Panics
    /// Panics if `handle` is outside of the tiling.
    ///
    /// # Safety
    /// No mutable view of the same tile may be alive while the returned one is used.
    #[track_caller]
    pub unsafe fn tile_ref(&self, handle: DataHandle) -> MatRef<'a> {
        let (ptr, nrows, ncols, row_stride) = self.raw_parts(handle);
        MatRef::from_raw_parts(ptr, nrows, ncols, row_stride)
    }
}
