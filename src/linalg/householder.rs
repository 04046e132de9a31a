//! Block Householder transformations.
//!
//! A Householder reflection is a linear transformation that describes a reflection about a
//! hyperplane that crosses the origin of the space. We use the convention
//! $$H = I - \tau v v^T,$$
//! where $v$ has a unit leading component.
//!
//! A block Householder transformation is a sequence of such transformations
//! $H_0, H_1, \dots, H_{r-1}$ applied one after the other, with the restriction that the first
//! $i$ components of the vector $v_i$ of the $i$-th transformation are zero, and the component at
//! index $i$ is one.
//!
//! The matrix $V = [v_0\ v_1\ \dots\ v_{r-1}]$ is thus a lower trapezoidal matrix with unit
//! diagonal. We call it the Householder basis. Only its strictly lower part is stored, the unit
//! diagonal and the zeros above it are implicit.
//!
//! There exists a unique upper triangular matrix $T$, that we call the Householder factor, such
//! that $$H_0 \times \dots \times H_{r-1} = I - VTV^T.$$
//!
//! The stacked variants handle the basis $\begin{bmatrix} I \\ V \end{bmatrix}$ that appears when
//! a triangular tile is combined with a full tile below it: the top part is the identity and only
//! the bottom part $V$ is stored.

use crate::{assert, mat::norm_l2_of, MatMut, MatRef};
use dyn_stack::{PodStack, SizeOverflow, StackReq};
use reborrow::*;

/// Computes the Householder reflection $I - \tau v v^T$ such that when multiplied by $x$ from the
/// left, the result is $\beta e_0$. $\tau$ and $\beta$ are returned.
///
/// $x$ is determined by $x_0$, contained in `head`, and $\|x_{1\dots}\|$, contained in
/// `tail_norm`. The vector $v$ is such that $v_0 = 1$ and $v_{1\dots}$ is stored in `essential`
/// (when provided), which must initially hold $x_{1\dots}$.
///
/// If the tail is zero, the reflection is the identity and $\tau = 0$.
#[inline]
pub fn make_householder_in_place(essential: Option<MatMut<'_>>, head: f64, tail_norm: f64) -> (f64, f64) {
    if tail_norm == 0.0 {
        return (0.0, head);
    }

    let norm = head.hypot(tail_norm);
    let beta = if head >= 0.0 { -norm } else { norm };
    let tau = (beta - head) / beta;

    if let Some(mut essential) = essential {
        assert!(essential.ncols() == 1);
        let scale = (head - beta).recip();
        for i in 0..essential.nrows() {
            let e = essential.read(i, 0);
            essential.write(i, 0, e * scale);
        }
    }
    (tau, beta)
}

/// Returns the L2 norm of a column vector, computed without undue overflow or underflow.
#[inline]
pub fn column_norm(col: MatRef<'_>) -> f64 {
    norm_l2_of(col.iter())
}

/// Fills the column `j` of the Householder factor, given $\tau_j$.
///
/// On entry, `factor[0..j, j]` must contain $z = V_{:, 0..j}^T v_j$. On exit it contains
/// $-\tau_j T_{0..j, 0..j} z$, the diagonal entry is $\tau_j$ and the entries below it are zero.
pub fn upgrade_householder_factor(mut factor: MatMut<'_>, j: usize, tau: f64) {
    assert!(all(factor.nrows() == factor.ncols(), j < factor.ncols()));
    let r = factor.nrows();

    // in place: entry p only reads z[p..j], which are still untouched
    for p in 0..j {
        let mut acc = 0.0;
        for q in p..j {
            acc += factor.read(p, q) * factor.read(q, j);
        }
        factor.write(p, j, -tau * acc);
    }
    factor.write(j, j, tau);
    for p in j + 1..r {
        factor.write(p, j, 0.0);
    }
}

/// Computes the size and alignment of required workspace for applying a block Householder
/// transformation, or its transpose, with `blocksize` reflectors to a right-hand-side matrix with
/// `rhs_ncols` columns.
pub fn apply_block_householder_on_the_left_in_place_req(
    blocksize: usize,
    rhs_ncols: usize,
) -> Result<StackReq, SizeOverflow> {
    let len = blocksize.checked_mul(rhs_ncols).ok_or(SizeOverflow)?;
    StackReq::try_new::<f64>(len)
}

/// Computes the size and alignment of required workspace for applying a stacked block
/// Householder transformation, or its transpose, to a pair of right-hand-side matrices with
/// `rhs_ncols` columns.
pub fn apply_stacked_block_householder_on_the_left_in_place_req(
    blocksize: usize,
    rhs_ncols: usize,
) -> Result<StackReq, SizeOverflow> {
    apply_block_householder_on_the_left_in_place_req(blocksize, rhs_ncols)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Forward,
    Transposed,
}

/// Computes $W \leftarrow T W$ or $W \leftarrow T^T W$ in place, where $T$ is upper triangular.
fn triangular_factor_mul(factor: MatRef<'_>, mut w: MatMut<'_>, side: Side) {
    let r = factor.nrows();
    let ncols = w.ncols();
    match side {
        Side::Forward => {
            // row p of T W only uses rows p.. of W
            for p in 0..r {
                for c in 0..ncols {
                    let mut acc = 0.0;
                    for q in p..r {
                        acc += factor.read(p, q) * w.read(q, c);
                    }
                    w.write(p, c, acc);
                }
            }
        }
        Side::Transposed => {
            // row p of T^T W only uses rows ..=p of W
            for p in (0..r).rev() {
                for c in 0..ncols {
                    let mut acc = 0.0;
                    for q in 0..=p {
                        acc += factor.read(q, p) * w.read(q, c);
                    }
                    w.write(p, c, acc);
                }
            }
        }
    }
}

fn apply_block_householder_impl(
    basis: MatRef<'_>,
    factor: MatRef<'_>,
    mut matrix: MatMut<'_>,
    side: Side,
    stack: PodStack<'_>,
) {
    let m = basis.nrows();
    let r = basis.ncols();
    let ncols = matrix.ncols();
    assert!(all(
        r <= m,
        factor.nrows() == r,
        factor.ncols() == r,
        matrix.nrows() == m,
    ));

    let (w, _) = stack.make_raw::<f64>(r * ncols);
    let mut w = MatMut::from_row_major_slice_mut(w, r, ncols, ncols);

    // W = V^T C
    for p in 0..r {
        for c in 0..ncols {
            let mut acc = matrix.read(p, c);
            for i in p + 1..m {
                acc += basis.read(i, p) * matrix.read(i, c);
            }
            w.write(p, c, acc);
        }
    }

    triangular_factor_mul(factor, w.rb_mut(), side);

    // C -= V W
    for i in 0..m {
        let kmax = Ord::min(i + 1, r);
        for c in 0..ncols {
            let mut acc = 0.0;
            for p in 0..kmax {
                let v = if p == i { 1.0 } else { basis.read(i, p) };
                acc += v * w.read(p, c);
            }
            let x = matrix.read(i, c);
            matrix.write(i, c, x - acc);
        }
    }
}

/// Computes the product of the block Householder transformation $I - VTV^T$ and `matrix`, and
/// stores the result in `matrix`.
///
/// `basis` is the `m × r` Householder basis, only its strictly lower part is read.
#[track_caller]
pub fn apply_block_householder_on_the_left_in_place(
    basis: MatRef<'_>,
    factor: MatRef<'_>,
    matrix: MatMut<'_>,
    stack: PodStack<'_>,
) {
    apply_block_householder_impl(basis, factor, matrix, Side::Forward, stack)
}

/// Computes the product of the transpose of the block Householder transformation
/// $I - VTV^T$ and `matrix`, and stores the result in `matrix`.
///
/// `basis` is the `m × r` Householder basis, only its strictly lower part is read.
#[track_caller]
pub fn apply_block_householder_transpose_on_the_left_in_place(
    basis: MatRef<'_>,
    factor: MatRef<'_>,
    matrix: MatMut<'_>,
    stack: PodStack<'_>,
) {
    apply_block_householder_impl(basis, factor, matrix, Side::Transposed, stack)
}

fn apply_stacked_block_householder_impl(
    basis_bot: MatRef<'_>,
    factor: MatRef<'_>,
    mut top: MatMut<'_>,
    mut bot: MatMut<'_>,
    side: Side,
    stack: PodStack<'_>,
) {
    let r = basis_bot.ncols();
    let mb = basis_bot.nrows();
    let ncols = top.ncols();
    assert!(all(
        factor.nrows() == r,
        factor.ncols() == r,
        top.nrows() == r,
        bot.nrows() == mb,
        bot.ncols() == ncols,
    ));

    let (w, _) = stack.make_raw::<f64>(r * ncols);
    let mut w = MatMut::from_row_major_slice_mut(w, r, ncols, ncols);

    // W = C_top + V^T C_bot
    for p in 0..r {
        for c in 0..ncols {
            let mut acc = top.read(p, c);
            for i in 0..mb {
                acc += basis_bot.read(i, p) * bot.read(i, c);
            }
            w.write(p, c, acc);
        }
    }

    triangular_factor_mul(factor, w.rb_mut(), side);

    // C_top -= W
    for p in 0..r {
        for c in 0..ncols {
            let x = top.read(p, c);
            top.write(p, c, x - w.read(p, c));
        }
    }
    // C_bot -= V W
    for i in 0..mb {
        for c in 0..ncols {
            let mut acc = 0.0;
            for p in 0..r {
                acc += basis_bot.read(i, p) * w.read(p, c);
            }
            let x = bot.read(i, c);
            bot.write(i, c, x - acc);
        }
    }
}

/// Applies the block Householder transformation with basis $\begin{bmatrix} I \\ V \end{bmatrix}$
/// and factor $T$ to the stacked matrix $\begin{bmatrix} C_0 \\ C_1 \end{bmatrix}$, in place.
///
/// `top` must have as many rows as there are reflectors.
#[track_caller]
pub fn apply_stacked_block_householder_on_the_left_in_place(
    basis_bot: MatRef<'_>,
    factor: MatRef<'_>,
    top: MatMut<'_>,
    bot: MatMut<'_>,
    stack: PodStack<'_>,
) {
    apply_stacked_block_householder_impl(basis_bot, factor, top, bot, Side::Forward, stack)
}

/// Applies the transpose of the block Householder transformation with basis
/// $\begin{bmatrix} I \\ V \end{bmatrix}$ and factor $T$ to the stacked matrix
/// $\begin{bmatrix} C_0 \\ C_1 \end{bmatrix}$, in place.
#[track_caller]
pub fn apply_stacked_block_householder_transpose_on_the_left_in_place(
    basis_bot: MatRef<'_>,
    factor: MatRef<'_>,
    top: MatMut<'_>,
    bot: MatMut<'_>,
    stack: PodStack<'_>,
) {
    apply_stacked_block_householder_impl(basis_bot, factor, top, bot, Side::Transposed, stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::Mat;
    use assert_approx_eq::assert_approx_eq;
    use dyn_stack::GlobalPodBuffer;

    #[test]
    fn reflection_maps_to_beta_e0() {
        let x = [3.0, 1.0, -2.0, 0.5];
        let mut tail = Mat::from_fn(3, 1, |i, _| x[i + 1]);
        let tail_norm = column_norm(tail.as_ref());
        let (tau, beta) = make_householder_in_place(Some(tail.as_mut()), x[0], tail_norm);

        let norm = x.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert_approx_eq!(beta.abs(), norm);
        assert!(beta < 0.0);

        // v = [1; tail], H x = x - tau v (v^T x)
        let v = [1.0, tail[(0, 0)], tail[(1, 0)], tail[(2, 0)]];
        let dot: f64 = v.iter().zip(x.iter()).map(|(v, x)| v * x).sum();
        for i in 0..4 {
            let hx = x[i] - tau * v[i] * dot;
            let expected = if i == 0 { beta } else { 0.0 };
            assert_approx_eq!(hx, expected, 1e-12);
        }
    }

    #[test]
    fn zero_tail_is_identity() {
        let (tau, beta) = make_householder_in_place(None, -2.0, 0.0);
        assert!(all(tau == 0.0, beta == -2.0));
    }

    #[test]
    fn transpose_undoes_forward() {
        // two reflectors on 4 rows, basis stored strictly below the diagonal
        let basis = Mat::from_fn(4, 2, |i, j| if i > j { 0.25 * (i + j) as f64 - 0.3 } else { 0.0 });
        let vectors: Vec<Vec<f64>> = (0..2)
            .map(|j| {
                (0..4)
                    .map(|i| match i {
                        i if i < j => 0.0,
                        i if i == j => 1.0,
                        i => basis[(i, j)],
                    })
                    .collect()
            })
            .collect();
        // tau = 2 / |v|^2 makes each reflection orthogonal
        let taus: Vec<f64> = vectors
            .iter()
            .map(|v| 2.0 / v.iter().map(|x| x * x).sum::<f64>())
            .collect();

        let mut factor = Mat::zeros(2, 2);
        for j in 0..2 {
            for p in 0..j {
                let mut z = basis[(j, p)];
                for i in j + 1..4 {
                    z += basis[(i, p)] * basis[(i, j)];
                }
                factor.write(p, j, z);
            }
            upgrade_householder_factor(factor.as_mut(), j, taus[j]);
        }

        let c = Mat::from_fn(4, 3, |i, j| (i * 3 + j) as f64 * 0.1 + 1.0);
        let mut x = c.clone();
        let mut mem = GlobalPodBuffer::new(apply_block_householder_on_the_left_in_place_req(2, 3).unwrap());
        apply_block_householder_on_the_left_in_place(
            basis.as_ref(),
            factor.as_ref(),
            x.as_mut(),
            PodStack::new(&mut mem),
        );

        // compare against H_0 H_1 c computed one reflector at a time
        let mut y = c.clone();
        for j in (0..2).rev() {
            let v = &vectors[j];
            for col in 0..3 {
                let dot: f64 = (0..4).map(|i| v[i] * y[(i, col)]).sum();
                for i in 0..4 {
                    y[(i, col)] -= taus[j] * v[i] * dot;
                }
            }
        }
        for i in 0..4 {
            for j in 0..3 {
                assert_approx_eq!(x[(i, j)], y[(i, j)], 1e-12);
            }
        }

        apply_block_householder_transpose_on_the_left_in_place(
            basis.as_ref(),
            factor.as_ref(),
            x.as_mut(),
            PodStack::new(&mut mem),
        );
        for i in 0..4 {
            for j in 0..3 {
                assert_approx_eq!(x[(i, j)], c[(i, j)], 1e-12);
            }
        }
    }
}
