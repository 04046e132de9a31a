use super::{check_finite, KernelError};
use crate::{
    assert,
    linalg::householder::{
        apply_stacked_block_householder_on_the_left_in_place_req,
        apply_stacked_block_householder_transpose_on_the_left_in_place,
    },
    MatMut, MatRef,
};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Computes the size and alignment of required workspace for [`tpmqrt`].
#[inline]
pub fn tpmqrt_req(tile_size: usize, rhs_ncols: usize) -> Result<StackReq, SizeOverflow> {
    apply_stacked_block_householder_on_the_left_in_place_req(tile_size, rhs_ncols)
}

/// Applies $Q^T$ of an elimination computed by [`tpqrt`](super::tpqrt::tpqrt) to the stacked
/// pair $\begin{bmatrix} C_0 \\ C_1 \end{bmatrix}$, where $C_0$ is the leading `nk` rows of `a`
/// and $C_1$ is `b`.
///
/// `v` is the eliminated `mb × nk` tile holding the bottom parts of the reflectors, and `t` their
/// `nk × nk` Householder factor.
pub fn tpmqrt(
    v: MatRef<'_>,
    t: MatRef<'_>,
    mut a: MatMut<'_>,
    mut b: MatMut<'_>,
    stack: PodStack<'_>,
) -> Result<(), KernelError> {
    let n = v.ncols();
    assert!(all(
        a.nrows() >= n,
        b.nrows() == v.nrows(),
        a.ncols() == b.ncols(),
    ));

    check_finite(a.rb())?;
    check_finite(b.rb())?;

    let top = a.rb_mut().submatrix_mut(0, 0, n, b.ncols());
    apply_stacked_block_householder_transpose_on_the_left_in_place(v, t, top, b.rb_mut(), stack);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::{
        linalg::kernels::{geqrt::geqrt, larfb::larfb, tpqrt::tpqrt},
        stats::StandardNormalMat,
        Mat,
    };
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;
    use rand::prelude::*;

    #[test]
    fn two_by_two_tiles() {
        // factorize a 2x2 grid of 3x3 tiles by hand and compare the R factor with the one of the
        // whole matrix
        let rng = &mut StdRng::seed_from_u64(2);
        let b = 3;
        let a0 = StandardNormalMat {
            nrows: 2 * b,
            ncols: 2 * b,
        }
        .sample(rng);
        let tile = |i: usize, j: usize| a0.as_ref().submatrix(i * b, j * b, b, b).to_owned();
        let (mut a00, mut a01, mut a10, mut a11) = (tile(0, 0), tile(0, 1), tile(1, 0), tile(1, 1));
        let (mut t00, mut t10, mut t11) = (Mat::zeros(b, b), Mat::zeros(b, b), Mat::zeros(b, b));

        let mut mem = GlobalPodBuffer::new(crate::linalg::kernels::scratch_req(b).unwrap());

        geqrt(a00.as_mut(), t00.as_mut()).unwrap();
        larfb(a00.as_ref(), t00.as_ref(), a01.as_mut(), PodStack::new(&mut mem)).unwrap();
        tpqrt(a00.as_mut(), a10.as_mut(), t10.as_mut()).unwrap();
        tpmqrt(
            a10.as_ref(),
            t10.as_ref(),
            a01.as_mut(),
            a11.as_mut(),
            PodStack::new(&mut mem),
        )
        .unwrap();
        geqrt(a11.as_mut(), t11.as_mut()).unwrap();

        let mut whole = a0.clone();
        let mut t = Mat::zeros(2 * b, 2 * b);
        geqrt(whole.as_mut(), t.as_mut()).unwrap();

        let r = |i: usize, j: usize| match (i / b, j / b) {
            (0, 0) => a00[(i, j)],
            (0, 1) => a01[(i, j - b)],
            (1, 1) => a11[(i - b, j - b)],
            _ => 0.0,
        };
        for i in 0..2 * b {
            let sign = (r(i, i) * whole[(i, i)]).signum();
            for j in i..2 * b {
                assert_approx_eq!(r(i, j), sign * whole[(i, j)], 1e-10);
            }
        }
    }
}
