//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use tilr::dtype::ElementType;
use tilr::grid::ProcessGrid;
use tilr::matrix::TiledMatrix;
use tilr::ops::NormKind;

/// Deterministic mixed-sign fill value for element `(i, j)`
pub fn fill_value(i: usize, j: usize) -> f64 {
    ((i * 31 + j * 17) % 23) as f64 - 11.0
}

/// Tiled matrix filled with [`fill_value`], plus its dense row-major mirror
pub fn filled_matrix(
    rows: usize,
    cols: usize,
    mb: usize,
    nb: usize,
    grid: ProcessGrid,
) -> (Arc<TiledMatrix>, Vec<f64>) {
    let mat = TiledMatrix::from_fn(rows, cols, mb, nb, grid, |i, j| fill_value(i, j))
        .expect("matrix construction");
    let mut dense = vec![0.0f64; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            dense[i * cols + j] = fill_value(i, j);
        }
    }
    (mat, dense)
}

/// Zeroed f64 matrix on the given grid
pub fn zero_matrix(
    rows: usize,
    cols: usize,
    mb: usize,
    nb: usize,
    grid: ProcessGrid,
) -> Arc<TiledMatrix> {
    TiledMatrix::zeros(ElementType::F64, rows, cols, mb, nb, grid).expect("matrix construction")
}

/// Reference norm of a dense row-major matrix
pub fn ref_norm(kind: NormKind, dense: &[f64], rows: usize, cols: usize) -> f64 {
    match kind {
        NormKind::Max => dense.iter().fold(0.0f64, |acc, &v| acc.max(v.abs())),
        NormKind::Inf => (0..rows)
            .map(|i| (0..cols).map(|j| dense[i * cols + j].abs()).sum::<f64>())
            .fold(0.0f64, f64::max),
        NormKind::One => (0..cols)
            .map(|j| (0..rows).map(|i| dense[i * cols + j].abs()).sum::<f64>())
            .fold(0.0f64, f64::max),
        NormKind::Frobenius => dense.iter().map(|&v| v * v).sum::<f64>().sqrt(),
    }
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two scalars are close within relative tolerance
pub fn assert_close(a: f64, b: f64, rtol: f64, msg: &str) {
    let diff = (a - b).abs();
    let tol = 1e-12 + rtol * b.abs();
    assert!(diff <= tol, "{}: {} vs {} (diff={}, tol={})", msg, a, b, diff, tol);
}
