//! Samplers for secrets, errors and masks.

use crate::{Error, Result};
use num_bigint::{BigInt, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// Sample a vector of independent ternary coefficients in {-1, 0, 1}, where
/// 0 has probability 1/2 and -1, 1 have probability 1/4 each.
pub fn sample_vec_ternary<R: RngCore + CryptoRng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| match rng.gen_range(0..4u8) {
            0 => -1,
            1 => 1,
            _ => 0,
        })
        .collect()
}

/// Sample a vector of independent centered Gaussian values of standard
/// deviation `sigma`, truncated to `[-bound, bound]` by rejection.
///
/// Returns an error if `sigma` is not a positive finite number or if `bound`
/// is smaller than `sigma`.
pub fn sample_vec_normal<R: RngCore + CryptoRng>(
    n: usize,
    sigma: f64,
    bound: f64,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Default(format!(
            "Invalid standard deviation: {sigma}"
        )));
    }
    if !bound.is_finite() || bound < sigma {
        return Err(Error::Default(format!(
            "Truncation bound {bound} is below the standard deviation {sigma}"
        )));
    }
    let normal = Normal::new(0.0, sigma).map_err(|e| Error::Default(e.to_string()))?;
    Ok((0..n)
        .map(|_| loop {
            let x: f64 = normal.sample(rng);
            if x.abs() <= bound {
                break x;
            }
        })
        .collect())
}

/// Sample a vector of independent integers uniform in
/// `[-2^(log_bound - 1), 2^(log_bound - 1))`. A zero `log_bound` yields the
/// zero vector.
pub fn sample_vec_uniform<R: RngCore + CryptoRng>(
    n: usize,
    log_bound: u32,
    rng: &mut R,
) -> Vec<BigInt> {
    if log_bound == 0 {
        return vec![BigInt::zero(); n];
    }
    let half = BigInt::one() << (log_bound - 1);
    let low = -&half;
    (0..n).map(|_| rng.gen_bigint_range(&low, &half)).collect()
}

#[cfg(test)]
mod tests {
    use super::{sample_vec_normal, sample_vec_ternary, sample_vec_uniform};
    use num_bigint::BigInt;
    use num_traits::Zero;
    use rand::thread_rng;

    #[test]
    fn ternary() {
        let mut rng = thread_rng();
        let v = sample_vec_ternary(4096, &mut rng);
        assert_eq!(v.len(), 4096);
        assert!(v.iter().all(|vi| (-1..=1).contains(vi)));
        // Roughly half of the coefficients are zero.
        let zeros = v.iter().filter(|vi| **vi == 0).count();
        assert!(zeros > 1536 && zeros < 2560);
    }

    #[test]
    fn normal_is_truncated() {
        let mut rng = thread_rng();
        let v = sample_vec_normal(10000, 3.2, 19.2, &mut rng).unwrap();
        assert_eq!(v.len(), 10000);
        assert!(v.iter().all(|vi| vi.abs() <= 19.2));
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        assert!(mean.abs() < 0.5);
    }

    #[test]
    fn normal_rejects_bad_parameters() {
        let mut rng = thread_rng();
        assert!(sample_vec_normal(8, 0.0, 1.0, &mut rng).is_err());
        assert!(sample_vec_normal(8, f64::NAN, 1.0, &mut rng).is_err());
        assert!(sample_vec_normal(8, 3.2, 1.0, &mut rng).is_err());
    }

    #[test]
    fn uniform() {
        let mut rng = thread_rng();
        let v = sample_vec_uniform(1000, 3, &mut rng);
        assert!(v.iter().all(|vi| (-4..4).contains(&i64::try_from(vi).unwrap())));
        assert!(v.iter().any(|vi| *vi < BigInt::zero()));

        let wide = sample_vec_uniform(64, 200, &mut rng);
        assert!(wide.iter().all(|vi| vi.bits() <= 200));
        assert!(wide.iter().any(|vi| vi.bits() > 150));
        assert!(sample_vec_uniform(4, 0, &mut rng).iter().all(Zero::is_zero));
    }
}
