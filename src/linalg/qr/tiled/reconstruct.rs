//! Applying the implicit $Q$ of a tiled factorization, and rebuilding the factorized matrix.
//!
//! The factorization applies, for each panel iteration `k`, the reflectors of the diagonal tile
//! followed by those of every elimination of tile column `k`, so that
//! $$Q^T = \prod_{k} \left(Q_{r-1,k}^T \cdots Q_{k+1,k}^T Q_{k,k}^T\right).$$

use crate::{
    assert,
    linalg::householder::{
        apply_block_householder_on_the_left_in_place,
        apply_block_householder_on_the_left_in_place_req,
        apply_block_householder_transpose_on_the_left_in_place,
        apply_stacked_block_householder_on_the_left_in_place,
        apply_stacked_block_householder_transpose_on_the_left_in_place,
    },
    tile::TileLayout,
    utils::thread::{for_each_raw, par_split_indices, parallelism_degree, Ptr},
    Mat, MatMut, MatRef, Parallelism,
};
use dyn_stack::{GlobalPodBuffer, PodStack};
use reborrow::*;

#[derive(Copy, Clone, PartialEq, Eq)]
enum Direction {
    Q,
    QTranspose,
}

fn check_dims(factors: MatRef<'_>, householder_factor: MatRef<'_>, layout: &TileLayout, rhs: MatRef<'_>) {
    assert!(all(
        factors.nrows() == layout.nrows(),
        factors.ncols() == layout.ncols(),
        householder_factor.nrows() == layout.t_nrows(),
        householder_factor.ncols() == layout.ncols(),
        rhs.nrows() == layout.nrows(),
    ));
}

fn apply_sequential(
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    mut rhs: MatMut<'_>,
    direction: Direction,
    mut stack: PodStack<'_>,
) {
    let b = layout.tile_size();
    let rb = layout.row_blocks();
    let p = rhs.ncols();

    let v_tile = |i: usize, k: usize| factors.submatrix(i * b, k * b, layout.tile_nrows(i), layout.tile_ncols(k));
    let t_tile = |i: usize, k: usize| {
        let nk = layout.tile_ncols(k);
        householder_factor.submatrix(i * b, k * b, nk, nk)
    };

    let diagonal = |k: usize, rhs: MatMut<'_>, stack: PodStack<'_>| {
        let v = v_tile(k, k);
        let r = Ord::min(v.nrows(), v.ncols());
        let basis = v.submatrix(0, 0, v.nrows(), r);
        let factor = t_tile(k, k).submatrix(0, 0, r, r);
        let block = rhs.submatrix_mut(k * b, 0, v.nrows(), p);
        match direction {
            Direction::Q => apply_block_householder_on_the_left_in_place(basis, factor, block, stack),
            Direction::QTranspose => {
                apply_block_householder_transpose_on_the_left_in_place(basis, factor, block, stack)
            }
        }
    };
    let elimination = |k: usize, i: usize, rhs: MatMut<'_>, stack: PodStack<'_>| {
        let v = v_tile(i, k);
        let nk = v.ncols();
        let (top_rows, bot_rows) = rhs.split_at_row_mut(i * b);
        let top = top_rows.submatrix_mut(k * b, 0, nk, p);
        let bot = bot_rows.submatrix_mut(0, 0, v.nrows(), p);
        match direction {
            Direction::Q => {
                apply_stacked_block_householder_on_the_left_in_place(v, t_tile(i, k), top, bot, stack)
            }
            Direction::QTranspose => apply_stacked_block_householder_transpose_on_the_left_in_place(
                v,
                t_tile(i, k),
                top,
                bot,
                stack,
            ),
        }
    };

    match direction {
        Direction::QTranspose => {
            for k in 0..layout.diagonal_count() {
                diagonal(k, rhs.rb_mut(), stack.rb_mut());
                for i in k + 1..rb {
                    elimination(k, i, rhs.rb_mut(), stack.rb_mut());
                }
            }
        }
        Direction::Q => {
            for k in (0..layout.diagonal_count()).rev() {
                for i in (k + 1..rb).rev() {
                    elimination(k, i, rhs.rb_mut(), stack.rb_mut());
                }
                diagonal(k, rhs.rb_mut(), stack.rb_mut());
            }
        }
    }
}

fn apply(
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    rhs: MatMut<'_>,
    direction: Direction,
    parallelism: Parallelism,
) {
    check_dims(factors, householder_factor, layout, rhs.rb());
    let ncols = rhs.ncols();
    if ncols == 0 {
        return;
    }

    // the columns of rhs are independent
    let chunks = Ord::min(parallelism_degree(parallelism), ncols);
    let (nrows, row_stride) = (rhs.nrows(), rhs.row_stride());
    let ptr = Ptr(rhs.as_ptr_mut());

    for_each_raw(
        chunks,
        |idx| {
            let (col_start, len) = par_split_indices(ncols, idx, chunks);
            let ptr = ptr;
            // chunks cover disjoint column ranges of rhs
            let chunk = unsafe { MatMut::from_raw_parts(ptr.0.wrapping_add(col_start), nrows, len, row_stride) };
            let req = apply_block_householder_on_the_left_in_place_req(layout.tile_size(), len);
            let mut mem = GlobalPodBuffer::new(match req {
                Ok(req) => req,
                Err(_) => panic!("workspace size overflow"),
            });
            apply_sequential(factors, householder_factor, layout, chunk, direction, PodStack::new(&mut mem));
        },
        parallelism,
    );
}

/// Computes $Q \times$ `rhs` in place, where $Q$ is the orthogonal factor stored in `factors` and
/// `householder_factor`.
///
/// # Panics
/// Panics if the dimensions don't match `layout`.
#[track_caller]
pub fn apply_q_in_place(
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    rhs: MatMut<'_>,
    parallelism: Parallelism,
) {
    apply(factors, householder_factor, layout, rhs, Direction::Q, parallelism)
}

/// Computes $Q^T \times$ `rhs` in place, where $Q$ is the orthogonal factor stored in `factors`
/// and `householder_factor`.
///
/// # Panics
/// Panics if the dimensions don't match `layout`.
#[track_caller]
pub fn apply_q_transpose_in_place(
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    rhs: MatMut<'_>,
    parallelism: Parallelism,
) {
    apply(factors, householder_factor, layout, rhs, Direction::QTranspose, parallelism)
}

/// Returns the triangular factor $R$: the upper triangle of `factors`, with zeros below the
/// diagonal.
pub fn r_factor(factors: MatRef<'_>) -> Mat {
    Mat::from_fn(factors.nrows(), factors.ncols(), |i, j| {
        if i <= j {
            factors.read(i, j)
        } else {
            0.0
        }
    })
}

/// Computes $QR$ from the factorization.
#[track_caller]
pub fn reconstruct(
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    parallelism: Parallelism,
) -> Mat {
    let mut dst = r_factor(factors);
    apply_q_in_place(factors, householder_factor, layout, dst.as_mut(), parallelism);
    dst
}

/// Returns $\|A - QR\|_F / \|A\|_F$, or the absolute residual if $A$ is zero.
#[track_caller]
pub fn backward_error(
    a: MatRef<'_>,
    factors: MatRef<'_>,
    householder_factor: MatRef<'_>,
    layout: &TileLayout,
    parallelism: Parallelism,
) -> f64 {
    let qr = reconstruct(factors, householder_factor, layout, parallelism);
    assert!(all(qr.nrows() == a.nrows(), qr.ncols() == a.ncols()));
    let diff = Mat::from_fn(a.nrows(), a.ncols(), |i, j| a.read(i, j) - qr.read(i, j));
    let residual = diff.as_ref().norm_frobenius();
    let norm = a.norm_frobenius();
    if norm == 0.0 {
        residual
    } else {
        residual / norm
    }
}
