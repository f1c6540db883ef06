//! Public keys for the simulated CKKS scheme

use crate::ckks::{CkksParameters, Ciphertext, Plaintext, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use fedstat_traits::{FheEncrypter, FheParametrized};
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Public key for the simulated CKKS scheme.
#[derive(Debug, PartialEq, Clone)]
pub struct PublicKey {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) c: Ciphertext,
}

impl FheParametrized for PublicKey {
    type Parameters = CkksParameters;
}

impl PublicKey {
    /// Generate a new [`PublicKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let par = sk.par.clone();
        let zero = Poly::zero(par.slots(), par.log_modulus_at(par.max_level())?);
        let c = sk.encrypt_poly(&zero, par.max_level(), par.log_default_scale(), rng)?;
        Ok(Self { par, c })
    }

    /// The parameters of the key.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The two elements `(p0, p1)` of the key, with `p0 + p1·s ≈ 0`.
    pub(crate) fn parts(&self) -> (&Poly, &Poly) {
        (&self.c.c[0], &self.c.c[1])
    }
}

impl FheEncrypter<Plaintext, Ciphertext> for PublicKey {
    type Error = Error;

    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if !CkksParameters::same(&self.par, &pt.par) {
            return Err(Error::ParametersMismatch);
        }
        let slots = self.par.slots();
        let log_modulus = self.par.log_modulus_at(pt.level)?;
        let p = self.c.parts_at(pt.level)?;

        let u = Zeroizing::new(Poly::small(slots, log_modulus, rng));
        let e0 = Zeroizing::new(Poly::gaussian(
            slots,
            log_modulus,
            self.par.error_std,
            self.par.error_bound,
            rng,
        )?);
        let e1 = Zeroizing::new(Poly::gaussian(
            slots,
            log_modulus,
            self.par.error_std,
            self.par.error_bound,
            rng,
        )?);

        let mut c0 = &p[0] * &*u;
        c0 += &*e0;
        c0 += &pt.values;
        let mut c1 = &p[1] * &*u;
        c1 += &*e1;

        Ciphertext::new(vec![c0, c1], pt.level, pt.log_scale, &self.par)
    }
}
