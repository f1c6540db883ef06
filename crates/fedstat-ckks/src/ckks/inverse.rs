//! Homomorphic inversion over a positive domain.

use crate::ckks::{Bootstrapper, Ciphertext, Evaluator};
use crate::{Error, Result};

/// Evaluates `1/x` on encrypted values known to lie in a positive interval
/// `[2^log_min, 2^log_max]`, with Goldschmidt's division algorithm.
pub struct InverseEvaluator<'a, B: Bootstrapper + ?Sized> {
    eval: &'a Evaluator,
    btp: &'a B,
}

impl<'a, B: Bootstrapper + ?Sized> InverseEvaluator<'a, B> {
    /// Levels needed between two refreshes.
    const DEPTH: usize = 2;

    /// Create an inverse evaluator.
    pub fn new(eval: &'a Evaluator, btp: &'a B) -> Result<Self> {
        let required = btp.minimum_input_level() + Self::DEPTH;
        if btp.output_level() < required {
            return Err(Error::LevelTooLow {
                level: btp.output_level(),
                required,
            });
        }
        Ok(Self { eval, btp })
    }

    /// Number of Goldschmidt iterations for the domain `[2^log_min, 2^log_max]`.
    pub fn iterations(log_min: f64, log_max: f64) -> usize {
        (log_max - log_min).ceil().max(0.0) as usize + 6
    }

    fn ensure_level(&self, ct: &Ciphertext, required: usize) -> Result<Ciphertext> {
        if ct.level >= required {
            Ok(ct.clone())
        } else {
            self.btp.bootstrap(ct)
        }
    }

    /// Approximates `1/x` for slots in `[2^log_min, 2^log_max]`. Slots
    /// outside the domain yield meaningless values. The output is at a level
    /// at least the minimum refresh level.
    pub fn evaluate_positive_domain(
        &self,
        ct: &Ciphertext,
        log_min: f64,
        log_max: f64,
    ) -> Result<Ciphertext> {
        if !log_min.is_finite() || !log_max.is_finite() || log_min >= log_max {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid inversion domain [2^{log_min}, 2^{log_max}]"
            )));
        }
        let log_scale = self.eval.parameters().log_default_scale() as f64;
        if log_max.abs() >= log_scale {
            return Err(Error::UnspecifiedInput(format!(
                "Inversion domain bound 2^{log_max} is not representable at scale 2^{log_scale}"
            )));
        }
        let min_level = self.btp.minimum_input_level();
        let normalization = 2f64.powf(-log_max);

        // y = x / 2^log_max lies in (0, 1].
        let x = self.ensure_level(ct, min_level + 1)?;
        let y = self.eval.rescale(self.eval.mul_scalar(&x, normalization)?)?;
        let neg_y = self.eval.neg(&y)?;
        let mut a = self.eval.add_scalar(&neg_y, 2.0)?;
        let mut b = self.eval.add_scalar(&neg_y, 1.0)?;

        for _ in 0..Self::iterations(log_min, log_max) {
            if a.level < min_level + Self::DEPTH || b.level < min_level + Self::DEPTH {
                let refreshed = self.btp.bootstrap_many(&[a, b])?;
                let mut refreshed = refreshed.into_iter();
                a = refreshed.next().ok_or(Error::TooFewValues(0, 2))?;
                b = refreshed.next().ok_or(Error::TooFewValues(1, 2))?;
            }
            b = self.eval.rescale(self.eval.mul_relin(&b, &b)?)?;
            let t = self.eval.add_scalar(&b, 1.0)?;
            a = self.eval.rescale(self.eval.mul_relin(&a, &t)?)?;
        }

        let a = self.ensure_level(&a, min_level + 1)?;
        self.eval
            .rescale(self.eval.mul_scalar(&a, normalization)?)
    }
}

#[cfg(test)]
mod tests {
    use super::InverseEvaluator;
    use crate::ckks::bootstrapping::IdealBootstrapper;
    use crate::ckks::{
        CkksParameters, Encoding, EvaluationKeySet, Evaluator, Plaintext, RelinearizationKey,
        SecretKey,
    };
    use crate::Error;
    use fedstat_traits::{FheCiphertext, FheEncoder, FheEncrypter};
    use rand::thread_rng;
    use std::sync::Arc;

    #[test]
    fn inverse() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        let keys = Arc::new(EvaluationKeySet::new(rlk, []).unwrap());
        let eval = Evaluator::with_keys(&keys);
        let btp = IdealBootstrapper {
            sk: sk.clone(),
            minimum_level: 3,
        };
        let inv = InverseEvaluator::new(&eval, &btp).unwrap();

        let values = [1.0, 2.0, 8.0, 3.0, 1000.0, 123456.0, 0.5, 7.0];
        let pt = Plaintext::try_encode(&values[..], Encoding::default_for(&par), &par).unwrap();
        let ct = sk.try_encrypt(&pt, &mut rng).unwrap();
        let out = inv.evaluate_positive_domain(&ct, -30.0, 30.0).unwrap();
        assert!(out.level() >= 3);
        let decrypted = Evaluator::peek(&out, &sk);
        for (d, v) in decrypted.iter().zip(values) {
            // y = x·2^-30 keeps about 15 + log2(x) bits at the default scale.
            assert!((d * v - 1.0).abs() < 2e-4, "{d} != 1/{v}");
        }

        assert!(matches!(
            inv.evaluate_positive_domain(&ct, 3.0, 1.0),
            Err(Error::UnspecifiedInput(_))
        ));
        assert!(matches!(
            inv.evaluate_positive_domain(&ct, -30.0, 50.0),
            Err(Error::UnspecifiedInput(_))
        ));
        assert_eq!(InverseEvaluator::<IdealBootstrapper>::iterations(-30.0, 30.0), 66);
    }
}
