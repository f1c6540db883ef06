//! Homomorphic comparison through a composite sign polynomial.

use crate::ckks::{Bootstrapper, Ciphertext, Evaluator};
use crate::{Error, Result};

/// Approximation of the sign function on `[-1, 1]` by iterating the
/// polynomial `f(x) = (3x - x³) / 2`.
///
/// Each iteration pushes values away from zero towards ±1. An input of
/// magnitude `δ` is within `2^-20` of its sign after roughly
/// `log_1.5(1/δ) + 6` iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignPolynomial {
    iterations: usize,
}

impl Default for SignPolynomial {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ITERATIONS)
    }
}

impl SignPolynomial {
    /// Levels consumed by one iteration.
    pub const DEPTH: usize = 2;

    /// Number of iterations used by default.
    pub const DEFAULT_ITERATIONS: usize = 24;

    /// A sign approximation with `iterations` iterations of `f`.
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }

    /// The number of iterations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Evaluates the approximation on a plaintext value.
    pub fn evaluate(&self, x: f64) -> f64 {
        (0..self.iterations).fold(x, |x, _| x * (3.0 - x * x) / 2.0)
    }
}

/// Evaluates sign, minimum and maximum on encrypted values, refreshing
/// intermediate ciphertexts with a [`Bootstrapper`] when their level runs
/// low.
pub struct ComparisonEvaluator<'a, B: Bootstrapper + ?Sized> {
    eval: &'a Evaluator,
    btp: &'a B,
    poly: SignPolynomial,
}

impl<'a, B: Bootstrapper + ?Sized> ComparisonEvaluator<'a, B> {
    /// Create a comparison evaluator. The bootstrapper must output
    /// ciphertexts with enough levels for one iteration of the sign
    /// polynomial.
    pub fn new(eval: &'a Evaluator, btp: &'a B, poly: SignPolynomial) -> Result<Self> {
        let required = btp.minimum_input_level() + SignPolynomial::DEPTH;
        if btp.output_level() < required {
            return Err(Error::LevelTooLow {
                level: btp.output_level(),
                required,
            });
        }
        Ok(Self { eval, btp, poly })
    }

    fn ensure_level(&self, ct: &Ciphertext, required: usize) -> Result<Ciphertext> {
        if ct.level >= required {
            Ok(ct.clone())
        } else {
            self.btp.bootstrap(ct)
        }
    }

    /// Approximate sign of every slot. The slots must lie in `[-1, 1]`; the
    /// output is at a level at least the minimum refresh level.
    pub fn sign(&self, x: &Ciphertext) -> Result<Ciphertext> {
        let required = self.btp.minimum_input_level() + SignPolynomial::DEPTH;
        let mut x = x.clone();
        for _ in 0..self.poly.iterations {
            x = self.ensure_level(&x, required)?;
            let x2 = self.eval.rescale(self.eval.mul_relin(&x, &x)?)?;
            let half = self.eval.rescale(self.eval.mul_scalar(&x, -0.5)?)?;
            let t = self.eval.add_scalar(&x2, -3.0)?;
            x = self.eval.rescale(self.eval.mul_relin(&half, &t)?)?;
        }
        Ok(x)
    }

    /// Slot-wise minimum and maximum of two ciphertexts with slots in
    /// `[-1, 1]`. Both inputs must be above the minimum refresh level.
    ///
    /// With `d = (a - b) / 2`, the outputs are `(a + b) / 2 ∓ d·sign(d)`.
    /// Only the real part of `d` is compared.
    pub fn min_max(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        let min_level = self.btp.minimum_input_level();
        let level = a.level.min(b.level);
        if level < min_level + 1 {
            return Err(Error::LevelTooLow {
                level,
                required: min_level + 1,
            });
        }

        let sum = self.eval.add(a, b)?;
        let avg = self.eval.rescale(self.eval.mul_scalar(&sum, 0.5)?)?;

        let diff = self.eval.sub(a, b)?;
        let conj = self.eval.conjugate(&diff)?;
        let d = self.eval.add(&diff, &conj)?;
        let d = self.eval.rescale(self.eval.mul_scalar(&d, 0.25)?)?;
        let d = self.ensure_level(&d, min_level + 1)?;

        let s = self.sign(&d)?;
        let s = self.ensure_level(&s, min_level + 1)?;
        let abs = self.eval.rescale(self.eval.mul_relin(&d, &s)?)?;

        Ok((self.eval.sub(&avg, &abs)?, self.eval.add(&avg, &abs)?))
    }

    /// Slot-wise minimum of two ciphertexts with slots in `[-1, 1]`.
    pub fn min(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.min_max(a, b).map(|(min, _)| min)
    }

    /// Slot-wise maximum of two ciphertexts with slots in `[-1, 1]`.
    pub fn max(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.min_max(a, b).map(|(_, max)| max)
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonEvaluator, SignPolynomial};
    use crate::ckks::bootstrapping::IdealBootstrapper;
    use crate::ckks::{
        Ciphertext, CkksParameters, Encoding, EvaluationKeySet, Evaluator, GaloisElement,
        GaloisKey, Plaintext, RelinearizationKey, SecretKey,
    };
    use crate::Error;
    use fedstat_traits::{FheCiphertext, FheEncoder, FheEncrypter};
    use proptest::prelude::*;
    use rand::thread_rng;
    use std::sync::Arc;

    fn setup() -> (SecretKey, Evaluator, IdealBootstrapper) {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        let gk = GaloisKey::new(&sk, GaloisElement::Conjugation, &mut rng).unwrap();
        let keys = Arc::new(EvaluationKeySet::new(rlk, [gk]).unwrap());
        let btp = IdealBootstrapper {
            sk: sk.clone(),
            minimum_level: 3,
        };
        (sk, Evaluator::with_keys(&keys), btp)
    }

    fn encrypt(sk: &SecretKey, values: &[f64]) -> Ciphertext {
        let par = sk.parameters();
        let pt = Plaintext::try_encode(values, Encoding::default_for(par), par).unwrap();
        sk.try_encrypt(&pt, &mut thread_rng()).unwrap()
    }

    #[test]
    fn sign_polynomial() {
        let poly = SignPolynomial::default();
        assert_eq!(poly.iterations(), 24);
        for x in [1.0, 0.5, 0.01, 1e-3] {
            assert!((poly.evaluate(x) - 1.0).abs() < 1e-6);
            assert!((poly.evaluate(-x) + 1.0).abs() < 1e-6);
        }
        assert_eq!(poly.evaluate(0.0), 0.0);
    }

    #[test]
    fn encrypted_sign() {
        let (sk, eval, btp) = setup();
        let cmp = ComparisonEvaluator::new(&eval, &btp, SignPolynomial::default()).unwrap();
        let x = encrypt(&sk, &[0.9, -0.9, 0.05, -0.05, 0.3, -0.3, 1.0, -1.0]);
        let s = cmp.sign(&x).unwrap();
        assert!(s.level() >= btp.minimum_level);
        let values = Evaluator::peek(&s, &sk);
        for (v, e) in values.iter().zip([1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]) {
            assert!((v - e).abs() < 1e-4, "{v} != {e}");
        }
    }

    #[test]
    fn min_max() {
        let (sk, eval, btp) = setup();
        let cmp = ComparisonEvaluator::new(&eval, &btp, SignPolynomial::default()).unwrap();
        let a = [0.1, -0.5, 0.9, 0.25, -1.0, 0.0, 0.7, 0.3];
        let b = [0.5, -0.2, -0.9, 0.25, 1.0, 0.001, 0.6, -0.3];
        let (min, max) = cmp
            .min_max(&encrypt(&sk, &a), &encrypt(&sk, &b))
            .unwrap();
        assert!(min.level() >= btp.minimum_level);
        let min = Evaluator::peek(&min, &sk);
        let max = Evaluator::peek(&max, &sk);
        for i in 0..8 {
            assert!((min[i] - a[i].min(b[i])).abs() < 1e-4);
            assert!((max[i] - a[i].max(b[i])).abs() < 1e-4);
        }
    }

    #[test]
    fn level_checks() {
        let (sk, eval, btp) = setup();
        let cmp = ComparisonEvaluator::new(&eval, &btp, SignPolynomial::new(2)).unwrap();
        let par = sk.parameters();
        let pt = Plaintext::try_encode(&[0.5][..], Encoding::at_level(par, 3), par).unwrap();
        let low = sk.try_encrypt(&pt, &mut thread_rng()).unwrap();
        assert_eq!(
            cmp.min(&low, &low).unwrap_err(),
            Error::LevelTooLow {
                level: 3,
                required: 4
            }
        );

        let greedy = IdealBootstrapper {
            sk: sk.clone(),
            minimum_level: 13,
        };
        assert!(ComparisonEvaluator::new(&eval, &greedy, SignPolynomial::default()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]
        #[test]
        fn min_matches_plaintext(a in -1.0f64..1.0, b in -1.0f64..1.0) {
            prop_assume!((a - b).abs() > 1e-3);
            let (sk, eval, btp) = setup();
            let cmp = ComparisonEvaluator::new(&eval, &btp, SignPolynomial::default()).unwrap();
            let min = cmp.min(&encrypt(&sk, &[a]), &encrypt(&sk, &[b])).unwrap();
            let min = Evaluator::peek(&min, &sk);
            prop_assert!((min[0] - a.min(b)).abs() < 1e-4);
        }
    }
}
