use assert_approx_eq::assert_approx_eq;
use equator::assert;
use rand::prelude::*;
use tiled_qr::{
    io::read_matrix_market,
    linalg::{
        kernels::KernelKind,
        qr::tiled::{factor_dims, graph::TaskGraph, qr_in_place, TiledQr, TiledQrParams},
    },
    sched::CancellationToken,
    stats::StandardNormalMat,
    tile::{TileIndex, TileLayout},
    Error, Mat, Parallelism,
};

fn random(nrows: usize, ncols: usize, seed: u64) -> Mat {
    StandardNormalMat { nrows, ncols }.sample(&mut StdRng::seed_from_u64(seed))
}

fn orthogonality_error(qr: &TiledQr) -> f64 {
    let m = qr.factors().nrows();
    let mut q = Mat::from_fn(m, m, |i, j| if i == j { 1.0 } else { 0.0 });
    qr.apply_q(q.as_mut(), Parallelism::None);
    let mut max = 0.0f64;
    for i in 0..m {
        for j in 0..m {
            let dot: f64 = (0..m).map(|k| q.read(k, i) * q.read(k, j)).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            max = max.max((dot - expected).abs());
        }
    }
    max
}

#[test]
fn reconstructs_square_and_rectangular() {
    for (m, n, b) in [
        (4, 4, 2),
        (8, 8, 3),
        (13, 7, 4),
        (7, 13, 4),
        (16, 16, 16),
        (20, 6, 5),
        (31, 17, 8),
        (1, 1, 1),
    ] {
        let a = random(m, n, (m * 100 + n) as u64);
        let qr = TiledQr::new(a.as_ref(), b, Parallelism::None).unwrap();
        assert!(qr.backward_error(a.as_ref()) < 1e-12);
        assert!(orthogonality_error(&qr) < 1e-12);

        let r = qr.r();
        for i in 0..m {
            for j in 0..Ord::min(i, n) {
                assert!(r.read(i, j) == 0.0);
            }
        }
    }
}

#[test]
#[cfg(feature = "rayon")]
fn parallel_matches_sequential() {
    let a = random(64, 48, 0);
    let seq = TiledQr::new(a.as_ref(), 8, Parallelism::None).unwrap();
    for workers in [1, 2, 4, 8] {
        let par = TiledQr::new(a.as_ref(), 8, Parallelism::Rayon(workers)).unwrap();
        assert!(par.backward_error(a.as_ref()) < 1e-12);
        // every kernel sees the same tile contents whatever the interleaving
        assert!(par.factors().iter().eq(seq.factors().iter()));
        assert!(par.householder_factor().iter().eq(seq.householder_factor().iter()));
    }
}

#[test]
fn sequential_runs_are_bit_identical() {
    let a = random(24, 24, 3);
    let first = TiledQr::new(a.as_ref(), 5, Parallelism::None).unwrap();
    let second = TiledQr::new(a.as_ref(), 5, Parallelism::None).unwrap();
    assert!(first.factors().iter().map(f64::to_bits).eq(second.factors().iter().map(f64::to_bits)));
}

#[test]
fn four_by_four_task_counts() {
    let layout = TileLayout::new(4, 4, 4, 2).unwrap();
    let graph = TaskGraph::build(&layout);
    assert!(all(
        graph.count(KernelKind::Geqrt, Some(0)) == 1,
        graph.count(KernelKind::Larfb, Some(0)) == 1,
        graph.count(KernelKind::Tpqrt, Some(0)) == 1,
        graph.count(KernelKind::Tpmqrt, Some(0)) == 1,
        graph.count(KernelKind::Geqrt, Some(1)) == 1,
        graph.len() == 5,
    ));

    let a = Mat::from_fn(4, 4, |i, j| if i == j { 4.0 } else { 1.0 / (1 + i + j) as f64 });
    let qr = TiledQr::new(a.as_ref(), 2, Parallelism::None).unwrap();
    assert!(qr.info().task_count == 5);
    assert!(qr.backward_error(a.as_ref()) < 1e-9);
}

#[test]
fn task_counts_follow_the_tiling() {
    for (m, n, b) in [(9, 9, 3), (10, 6, 4), (6, 10, 4), (5, 5, 5)] {
        let layout = TileLayout::new(m, n, n, b).unwrap();
        let (rb, cb) = (layout.row_blocks(), layout.col_blocks());
        let graph = TaskGraph::build(&layout);

        let mut expected = 0;
        for k in 0..Ord::min(rb, cb) {
            let eliminations = rb - k - 1;
            let updates = cb - k - 1;
            assert!(all(
                graph.count(KernelKind::Geqrt, Some(k)) == 1,
                graph.count(KernelKind::Larfb, Some(k)) == updates,
                graph.count(KernelKind::Tpqrt, Some(k)) == eliminations,
                graph.count(KernelKind::Tpmqrt, Some(k)) == eliminations * updates,
            ));
            expected += 1 + updates + eliminations * (1 + updates);
        }
        assert!(graph.len() == expected);
    }
}

#[test]
fn tile_sizes_sum_to_matrix_dims() {
    let layout = TileLayout::new(11, 7, 7, 3).unwrap();
    let rows: usize = (0..layout.row_blocks()).map(|i| layout.tile_nrows(i)).sum();
    let cols: usize = (0..layout.col_blocks()).map(|j| layout.tile_ncols(j)).sum();
    assert!(all(rows == 11, cols == 7));

    let err = layout.tile(TileIndex::new(4, 0)).unwrap_err();
    assert!(matches!(err, Error::OutOfRange { .. }));
}

#[test]
fn nan_reports_the_failing_tile() {
    let mut a = random(6, 6, 1);
    // local column 1 of tile (2, 0)
    a.write(5, 1, f64::NAN);
    let (t_nrows, t_ncols) = factor_dims(6, 6, 2);
    let mut t = Mat::zeros(t_nrows, t_ncols);

    let err = qr_in_place(a.as_mut(), t.as_mut(), 2, Parallelism::None, TiledQrParams::default())
        .unwrap_err();
    assert!(err.is_numerical());
    match err {
        Error::Numerical { kind, tile, info } => {
            assert!(all(kind == KernelKind::Tpqrt, tile == TileIndex::new(2, 0), info == -2));
        }
        _ => unreachable!(),
    }
}

#[test]
#[cfg(feature = "rayon")]
fn nan_reports_the_failing_tile_in_parallel() {
    let mut a = random(12, 12, 1);
    a.write(9, 1, f64::NAN);
    let err = TiledQr::new(a.as_ref(), 3, Parallelism::Rayon(4)).unwrap_err();
    assert!(matches!(
        err,
        Error::Numerical {
            kind: KernelKind::Tpqrt,
            tile: TileIndex { row: 3, col: 0 },
            info: -2,
        }
    ));
}

#[test]
fn cancelled_before_start() {
    let a = random(8, 8, 2);
    let token = CancellationToken::new();
    token.cancel();

    let mut params = TiledQrParams::default();
    params.cancellation = Some(token);
    let err = TiledQr::with_params(a.as_ref(), 2, Parallelism::None, params).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn rejects_bad_configuration() {
    let a = random(4, 4, 0);
    assert!(matches!(
        TiledQr::new(a.as_ref(), 0, Parallelism::None),
        Err(Error::Configuration(_))
    ));

    let mut a = a;
    let mut t = Mat::zeros(3, 4);
    assert!(matches!(
        qr_in_place(a.as_mut(), t.as_mut(), 2, Parallelism::None, TiledQrParams::default()),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn factorizes_matrix_market_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.mtx");
    std::fs::write(
        &path,
        "%%MatrixMarket matrix coordinate real general\n\
         % 4x3 test matrix\n\
         4 3 6\n\
         1 1 2.0\n\
         2 2 3.0\n\
         3 3 4.0\n\
         4 1 1.0\n\
         4 2 -1.0\n\
         1 3 0.5\n",
    )
    .unwrap();

    let a = read_matrix_market(&path).unwrap();
    assert!(all(a.nrows() == 4, a.ncols() == 3, a.read(3, 1) == -1.0, a.read(2, 0) == 0.0));

    let qr = TiledQr::new(a.as_ref(), 2, Parallelism::None).unwrap();
    assert!(qr.backward_error(a.as_ref()) < 1e-12);

    // |R| has the same column norms as A
    let r = qr.r();
    for j in 0..3 {
        let norm_a: f64 = (0..4).map(|i| a.read(i, j).powi(2)).sum();
        let norm_r: f64 = (0..4).map(|i| r.read(i, j).powi(2)).sum();
        assert_approx_eq!(norm_a, norm_r, 1e-12);
    }
}
