//! Householder QR of a single tile.

use super::{check_finite, KernelError};
use crate::{
    assert,
    linalg::householder::{column_norm, make_householder_in_place, upgrade_householder_factor},
    MatMut,
};
use dyn_stack::{SizeOverflow, StackReq};
use reborrow::*;

/// Computes the size and alignment of required workspace for [`geqrt`].
#[inline]
pub fn geqrt_req(_tile_size: usize) -> Result<StackReq, SizeOverflow> {
    Ok(StackReq::empty())
}

/// Computes the QR factorization of the `mk × nk` tile `a` in place.
///
/// On exit, the upper triangle of `a` holds $R$ and its strictly lower part holds the essential
/// parts of the `r = min(mk, nk)` Householder vectors. The leading `r × r` block of the
/// `nk × nk` tile `t` receives the upper triangular Householder factor, the rest of `t` is
/// zeroed.
pub fn geqrt(mut a: MatMut<'_>, mut t: MatMut<'_>) -> Result<(), KernelError> {
    let m = a.nrows();
    let n = a.ncols();
    let r = Ord::min(m, n);
    assert!(all(t.nrows() >= r, t.ncols() >= r));

    check_finite(a.rb())?;
    t.fill_zero();

    for j in 0..r {
        let head = a.read(j, j);
        let tail_norm = column_norm(a.rb().submatrix(j + 1, j, m - j - 1, 1));
        let (tau, beta) = make_householder_in_place(
            Some(a.rb_mut().submatrix_mut(j + 1, j, m - j - 1, 1)),
            head,
            tail_norm,
        );
        a.write(j, j, beta);

        // H_j on the trailing columns
        if tau != 0.0 {
            for c in j + 1..n {
                let mut w = a.read(j, c);
                for i in j + 1..m {
                    w += a.read(i, j) * a.read(i, c);
                }
                let tw = tau * w;
                let x = a.read(j, c);
                a.write(j, c, x - tw);
                for i in j + 1..m {
                    let x = a.read(i, c);
                    a.write(i, c, x - a.read(i, j) * tw);
                }
            }
        }

        // z = V[:, ..j]^T v_j
        for p in 0..j {
            let mut z = a.read(j, p);
            for i in j + 1..m {
                z += a.read(i, p) * a.read(i, j);
            }
            t.write(p, j, z);
        }
        upgrade_householder_factor(t.rb_mut().submatrix_mut(0, 0, r, r), j, tau);
    }

    // overflow while reducing
    check_finite(a.rb())
}
