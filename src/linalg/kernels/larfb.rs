use super::{check_finite, KernelError};
use crate::{
    assert,
    linalg::householder::{
        apply_block_householder_on_the_left_in_place_req,
        apply_block_householder_transpose_on_the_left_in_place,
    },
    MatMut, MatRef,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Computes the size and alignment of required workspace for [`larfb`].
#[inline]
pub fn larfb_req(tile_size: usize, rhs_ncols: usize) -> Result<StackReq, SizeOverflow> {
    apply_block_householder_on_the_left_in_place_req(tile_size, rhs_ncols)
}

/// Applies $Q^T$ of a tile factorized by [`geqrt`](super::geqrt::geqrt) to the tile `c` on its
/// right, `c <- (I - V T V^T)^T c`.
///
/// `v` is the factorized `mk × nk` diagonal tile and `t` its `nk × nk` reflector coefficients.
/// `c` must have `mk` rows.
pub fn larfb(
    v: MatRef<'_>,
    t: MatRef<'_>,
    mut c: MatMut<'_>,
    stack: PodStack<'_>,
) -> Result<(), KernelError> {
    let m = v.nrows();
    let r = Ord::min(m, v.ncols());
    assert!(c.nrows() == m);

    check_finite(c.rb())?;
    apply_block_householder_transpose_on_the_left_in_place(
        v.submatrix(0, 0, m, r),
        t.submatrix(0, 0, r, r),
        c.rb_mut(),
        stack,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{linalg::kernels::geqrt::geqrt, stats::StandardNormalMat, Mat};
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    #[test]
    fn update_matches_factorizing_the_wide_block() {
        let rng = &mut StdRng::seed_from_u64(0);
        let (m, n0, n1) = (5, 5, 3);
        let a = StandardNormalMat {
            nrows: m,
            ncols: n0 + n1,
        }
        .sample(rng);

        let mut left = a.as_ref().submatrix(0, 0, m, n0).to_owned();
        let mut right = a.as_ref().submatrix(0, n0, m, n1).to_owned();
        let mut t = Mat::zeros(n0, n0);
        geqrt(left.as_mut(), t.as_mut()).unwrap();

        let mut mem = GlobalPodBuffer::new(larfb_req(n0, n1).unwrap());
        larfb(left.as_ref(), t.as_ref(), right.as_mut(), PodStack::new(&mut mem)).unwrap();

        // Q^T a = [R_left, Q^T right] is the R factor of the whole block
        let mut whole = a.clone();
        let mut t_whole = Mat::zeros(n0 + n1, n0 + n1);
        geqrt(whole.as_mut(), t_whole.as_mut()).unwrap();
        for i in 0..m {
            for j in 0..n1 {
                if i <= n0 + j {
                    assert_approx_eq!(right[(i, j)], whole[(i, n0 + j)], 1e-12);
                }
            }
        }
    }
}
