use super::{check_finite, KernelError};
use crate::{
    assert,
    linalg::householder::{column_norm, make_householder_in_place, upgrade_householder_factor},
    MatMut,
};
use dyn_stack::{SizeOverflow, StackReq};
use reborrow::*;

/// Computes the size and alignment of required workspace for [`tpqrt`].
#[inline]
pub fn tpqrt_req(_tile_size: usize) -> Result<StackReq, SizeOverflow> {
    Ok(StackReq::empty())
}

/// Computes the QR factorization of the stacked matrix $\begin{bmatrix} R \\ B \end{bmatrix}$,
/// where $R$ is the upper triangle of the leading `nk × nk` block of the diagonal tile `a`, and
/// $B$ is the full `mb × nk` tile `b` below it.
///
/// On exit, $R$ is overwritten by the updated triangular factor, `b` holds the bottom parts of
/// the `nk` Householder vectors (their top parts are unit vectors), and `t` receives the
/// `nk × nk` upper triangular Householder factor. The strictly lower part of `a` is neither
/// read nor written.
pub fn tpqrt(mut a: MatMut<'_>, mut b: MatMut<'_>, mut t: MatMut<'_>) -> Result<(), KernelError> {
    let n = b.ncols();
    let mb = b.nrows();
    assert!(all(
        a.nrows() >= n,
        a.ncols() == n,
        t.nrows() == n,
        t.ncols() == n,
    ));

    check_finite(b.rb())?;
    t.fill_zero();

    for j in 0..n {
        let head = a.read(j, j);
        let tail_norm = column_norm(b.rb().submatrix(0, j, mb, 1));
        let (tau, beta) =
            make_householder_in_place(Some(b.rb_mut().submatrix_mut(0, j, mb, 1)), head, tail_norm);
        a.write(j, j, beta);

        if tau != 0.0 {
            for c in j + 1..n {
                let mut w = a.read(j, c);
                for i in 0..mb {
                    w += b.read(i, j) * b.read(i, c);
                }
                let tw = tau * w;
                let x = a.read(j, c);
                a.write(j, c, x - tw);
                for i in 0..mb {
                    let x = b.read(i, c);
                    b.write(i, c, x - b.read(i, j) * tw);
                }
            }
        }

        // the unit top parts are orthogonal, only the bottom parts contribute
        for p in 0..j {
            let mut z = 0.0;
            for i in 0..mb {
                z += b.read(i, p) * b.read(i, j);
            }
            t.write(p, j, z);
        }
        upgrade_householder_factor(t.rb_mut(), j, tau);
    }

    check_finite(b.rb())
}
