//! Key-switching keys for the simulated CKKS scheme

use crate::ckks::{CkksParameters, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// A key switching `from` a ring element into the secret `s`.
///
/// The elements live modulo `P·Q_L` where `P` is the special modulus of the
/// parameters, and satisfy `k0 + k1·s ≈ P·from`.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct KeySwitchingKey {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) k0: Poly,
    pub(crate) k1: Poly,
}

impl KeySwitchingKey {
    /// Generate a key switching from `from` to the secret key `sk`.
    pub(crate) fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        from: &Poly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk.par.clone();
        let log_key_modulus = par.log_key_modulus_at(par.max_level())?;
        let s = sk.poly(log_key_modulus);
        let k1 = Poly::random(par.slots(), log_key_modulus, rng);
        let e = Zeroizing::new(Poly::gaussian(
            par.slots(),
            log_key_modulus,
            par.error_std,
            par.error_bound,
            rng,
        )?);
        let mut k0 = -(&k1 * &*s);
        k0 += &*e;
        k0 += &Zeroizing::new(
            from.change_modulus(log_key_modulus)
                .mul_power_of_two(par.log_special_modulus()),
        );
        Ok(Self { par, k0, k1 })
    }

    /// Assemble a key from its elements.
    pub(crate) fn from_parts(par: &Arc<CkksParameters>, k0: Poly, k1: Poly) -> Self {
        Self {
            par: par.clone(),
            k0,
            k1,
        }
    }

    /// Switch the key of `p`: returns `(d0, d1)`, at the modulus of `p`, with
    /// `d0 + d1·s ≈ p·from`.
    pub(crate) fn key_switch(&self, p: &Poly) -> Result<(Poly, Poly)> {
        let log_special = self.par.log_special_modulus();
        let log_key_modulus = p.log_modulus() + log_special;
        if log_key_modulus > self.k0.log_modulus() {
            return Err(Error::MathError(fedstat_math::Error::InvalidModulus(
                p.log_modulus(),
                self.k0.log_modulus() - log_special,
            )));
        }
        let p = p.change_modulus(log_key_modulus);
        let d0 = (&p * &self.k0.change_modulus(log_key_modulus)).scale_down(log_special)?;
        let d1 = (&p * &self.k1.change_modulus(log_key_modulus)).scale_down(log_special)?;
        Ok((d0, d1))
    }
}

#[cfg(test)]
mod tests {
    use super::KeySwitchingKey;
    use crate::ckks::{CkksParameters, SecretKey};
    use crate::Error;
    use fedstat_math::rq::Poly;
    use rand::thread_rng;

    #[test]
    fn switches_key() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(16).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let s = sk.poly(par.log_modulus_at(par.max_level()).unwrap());
        let from = &*s * &*s;
        let ksk = KeySwitchingKey::new(&sk, &from, &mut rng).unwrap();
        assert_eq!(
            ksk.k0.log_modulus(),
            par.log_key_modulus_at(par.max_level()).unwrap()
        );

        for level in [0, 5, par.max_level()] {
            let log_modulus = par.log_modulus_at(level).unwrap();
            let s = sk.poly(log_modulus);
            let from = from.change_modulus(log_modulus);
            let p = Poly::random(16, log_modulus, &mut rng);
            let (d0, d1) = ksk.key_switch(&p).unwrap();
            assert_eq!(d0.log_modulus(), log_modulus);
            let noise = &(&d0 + &(&d1 * &*s)) - &(&p * &from);
            assert!(noise.coeffs().iter().all(|c| c.bits() <= 6));
        }
    }

    #[test]
    fn rejects_larger_moduli() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(16).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let from = (*sk.poly(10)).clone();
        let ksk = KeySwitchingKey::new(&sk, &from, &mut rng).unwrap();
        let top = par.log_modulus_at(par.max_level()).unwrap();
        let p = Poly::random(16, top + 1, &mut rng);
        assert_eq!(
            ksk.key_switch(&p).unwrap_err(),
            Error::MathError(fedstat_math::Error::InvalidModulus(top + 1, top))
        );
    }
}
