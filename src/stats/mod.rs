//! Random matrix distributions.

use crate::Mat;
use rand::distributions::{Distribution, Uniform};
use rand_distr::{Standard, StandardNormal};

/// The standard normal distribution, `N(0, 1)` for `0 <= i < nrows`, `0 <= j < ncols`.
pub struct StandardNormalMat {
    /// Number of rows of the sampled matrix.
    pub nrows: usize,
    /// Number of columns of the sampled matrix.
    pub ncols: usize,
}

/// Samples `u + k` for every entry, where `u` is uniform in `[0, 1)` and `k` is a uniformly
/// distributed integer in `[-bound, bound)`.
///
/// Entries therefore lie in `[-bound, bound)`, with a fractional part that is never constant.
pub struct ShiftedUniformMat {
    /// Number of rows of the sampled matrix.
    pub nrows: usize,
    /// Number of columns of the sampled matrix.
    pub ncols: usize,
    integers: Uniform<i64>,
}

impl ShiftedUniformMat {
    /// Construct, from dimensions and the magnitude bound of the integer part.
    ///
    /// Returns `None` if `bound` is not positive.
    pub fn new(nrows: usize, ncols: usize, bound: i64) -> Option<Self> {
        if bound <= 0 {
            return None;
        }
        Some(Self {
            nrows,
            ncols,
            integers: Uniform::new(-bound, bound),
        })
    }
}

impl Distribution<Mat> for StandardNormalMat {
    fn sample<R: rand::prelude::Rng + ?Sized>(&self, rng: &mut R) -> Mat {
        Mat::from_fn(self.nrows, self.ncols, |_, _| StandardNormal.sample(rng))
    }
}

impl Distribution<Mat> for ShiftedUniformMat {
    fn sample<R: rand::prelude::Rng + ?Sized>(&self, rng: &mut R) -> Mat {
        Mat::from_fn(self.nrows, self.ncols, |_, _| {
            let frac: f64 = Standard.sample(rng);
            frac + self.integers.sample(rng) as f64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use rand::prelude::*;

    #[test]
    fn normalmat() {
        let rng = &mut StdRng::seed_from_u64(0);
        let a = StandardNormalMat { nrows: 20, ncols: 3 }.sample(rng);
        assert!(all(a.nrows() == 20, a.ncols() == 3));
        assert!(a.as_ref().is_all_finite());
    }

    #[test]
    fn shifted_uniform_is_bounded_and_seeded() {
        let dist = ShiftedUniformMat::new(16, 16, 3).unwrap();
        let a = dist.sample(&mut StdRng::seed_from_u64(42));
        let b = dist.sample(&mut StdRng::seed_from_u64(42));
        assert!(a.as_slice() == b.as_slice());
        assert!(a.as_ref().iter().all(|x| (-3.0..3.0).contains(&x)));

        let c = dist.sample(&mut StdRng::seed_from_u64(43));
        assert!(a.as_slice() != c.as_slice());

        assert!(ShiftedUniformMat::new(4, 4, 0).is_none());
    }
}
