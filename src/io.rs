//! Matrix sources and text output.
//!
//! A matrix is either read from a coordinate Matrix Market file, or generated from a seed. Both
//! produce a dense row-major [`Mat`] with `lda == ncols`.

use crate::{stats::ShiftedUniformMat, Error, Mat, MatRef, Result};
use matrix_market_rs::MtxData;
use rand::{distributions::Distribution, rngs::StdRng, SeedableRng};
use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
};

/// Reads a sparse coordinate Matrix Market file into a dense matrix.
///
/// Files starting with a `%%MatrixMarket` banner are parsed as standard Matrix Market. Files
/// without a banner are read as `%` comment lines, a `nrows ncols nnz` header, then `nnz`
/// one-based `row col value` triplets.
///
/// Entries that are not listed in the file are zero. Duplicate entries keep the last value.
pub fn read_matrix_market(path: impl AsRef<Path>) -> Result<Mat> {
    let path = path.as_ref();
    let format_error = |reason: String| Error::MatrixFormat {
        path: path.to_path_buf(),
        reason,
    };

    // distinguish unreadable files from malformed ones
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let has_banner = content
        .lines()
        .map(str::trim_start)
        .find(|line| !line.is_empty())
        .map_or(false, |line| line.starts_with("%%MatrixMarket"));

    let ([nrows, ncols], indices, values) = if has_banner {
        let data = MtxData::<f64>::from_file(path).map_err(|e| format_error(format!("{e:?}")))?;
        let MtxData::Sparse(dims, indices, values, _) = data else {
            return Err(format_error("only coordinate (sparse) files are supported".into()));
        };
        (dims, indices, values)
    } else {
        parse_coordinate(&content).map_err(format_error)?
    };

    let mut mat = Mat::zeros(nrows, ncols);
    for (&[row, col], &value) in indices.iter().zip(values.iter()) {
        if row >= nrows || col >= ncols {
            return Err(format_error(format!(
                "entry ({}, {}) is outside of the {nrows}x{ncols} matrix",
                row + 1,
                col + 1,
            )));
        }
        mat.write(row, col, value);
    }

    log::debug!(
        "read {nrows}x{ncols} matrix with {} entries from {}",
        indices.len(),
        path.display(),
    );
    Ok(mat)
}

/// Parses the banner-less coordinate form. Any line containing `%` is a comment.
fn parse_coordinate(
    content: &str,
) -> core::result::Result<([usize; 2], Vec<[usize; 2]>, Vec<f64>), String> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.contains('%') && !line.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| "missing size header".to_string())?;
    let sizes = header
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid size header `{}`: {e}", header.trim()))?;
    let &[nrows, ncols, nnz] = sizes.as_slice() else {
        return Err(format!("size header `{}` must be `nrows ncols nnz`", header.trim()));
    };

    let mut indices = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    for count in 0..nnz {
        let (lineno, line) =
            lines.next().ok_or_else(|| format!("expected {nnz} entries, found {count}"))?;
        let invalid = || format!("invalid entry `{}` on line {}", line.trim(), lineno + 1);

        let mut fields = line.split_whitespace();
        let (Some(row), Some(col), Some(value), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(invalid());
        };
        let row = row.parse::<usize>().map_err(|_| invalid())?;
        let col = col.parse::<usize>().map_err(|_| invalid())?;
        let value = value.parse::<f64>().map_err(|_| invalid())?;
        if row == 0 || col == 0 {
            return Err(format!("{}: indices are one-based", invalid()));
        }
        indices.push([row - 1, col - 1]);
        values.push(value);
    }

    Ok(([nrows, ncols], indices, values))
}

/// Generates a `size x size` matrix whose entries are `u + k`, with `u` uniform in `[0, 1)` and
/// `k` a uniform integer in `[-min_max, min_max)`.
///
/// The same `seed` always produces the same matrix.
pub fn random_matrix(size: usize, seed: u64, min_max: i64) -> Result<Mat> {
    let dist = ShiftedUniformMat::new(size, size, min_max)
        .ok_or_else(|| Error::Configuration(format!("min_max must be positive, got {min_max}")))?;
    Ok(dist.sample(&mut StdRng::seed_from_u64(seed)))
}

/// Where the input matrix comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatrixSource {
    /// A Matrix Market file.
    File(PathBuf),
    /// A seeded random square matrix, see [`random_matrix`].
    Random { size: usize, seed: u64, min_max: i64 },
}

impl MatrixSource {
    /// Loads or generates the matrix.
    pub fn load(&self) -> Result<Mat> {
        match self {
            MatrixSource::File(path) => read_matrix_market(path),
            &MatrixSource::Random {
                size,
                seed,
                min_max,
            } => random_matrix(size, seed, min_max),
        }
    }
}

impl fmt::Display for MatrixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixSource::File(path) => write!(f, "{}", path.display()),
            MatrixSource::Random {
                size,
                seed,
                min_max,
            } => write!(f, "random {size}x{size} (seed {seed}, min_max {min_max})"),
        }
    }
}

fn write_rows(
    w: &mut impl Write,
    mat: MatRef<'_>,
    title: &str,
    entry: impl Fn(usize, usize) -> f64,
) -> std::io::Result<()> {
    writeln!(w, "{title}")?;
    for i in 0..mat.nrows() {
        for j in 0..mat.ncols() {
            write!(w, "{:12.6}", entry(i, j))?;
        }
        writeln!(w)?;
    }
    writeln!(w)
}

/// Writes `mat` row by row, each entry right-aligned in a 12 character field with 6 decimals,
/// followed by a blank line.
pub fn write_matrix(w: &mut impl Write, mat: MatRef<'_>, title: &str) -> std::io::Result<()> {
    write_rows(w, mat, title, |i, j| mat.read(i, j))
}

/// Same as [`write_matrix`], but prints zeros below the diagonal so that only the $R$ factor
/// stored in the upper triangle of `mat` is shown.
pub fn write_r(w: &mut impl Write, mat: MatRef<'_>, title: &str) -> std::io::Result<()> {
    write_rows(w, mat, title, |i, j| if j < i { 0.0 } else { mat.read(i, j) })
}
