//! Secret keys for the simulated CKKS scheme

use crate::ckks::{CkksParameters, Ciphertext, Plaintext};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use fedstat_math::sampling::sample_vec_ternary;
use fedstat_traits::{FheDecrypter, FheEncrypter, FheParametrized};
use itertools::izip;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Secret key for the simulated CKKS scheme.
#[derive(Debug, PartialEq, Clone)]
pub struct SecretKey {
    /// The CKKS parameters
    pub(crate) par: Arc<CkksParameters>,
    /// The secret key coefficients
    pub(crate) coeffs: Box<[i64]>,
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.coeffs.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl FheParametrized for SecretKey {
    type Parameters = CkksParameters;
}

impl SecretKey {
    /// Generate a random [`SecretKey`] with ternary coefficients.
    pub fn random<R: RngCore + CryptoRng>(par: &Arc<CkksParameters>, rng: &mut R) -> Self {
        Self::new(sample_vec_ternary(par.slots(), rng), par)
    }

    /// Generate a [`SecretKey`] from its coefficients.
    pub fn new(coeffs: Vec<i64>, par: &Arc<CkksParameters>) -> Self {
        Self {
            par: par.clone(),
            coeffs: coeffs.into_boxed_slice(),
        }
    }

    /// The parameters of the key.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The secret as a ring element modulo 2^`log_modulus`.
    pub(crate) fn poly(&self, log_modulus: u32) -> Zeroizing<Poly> {
        Zeroizing::new(Poly::from_i64(&self.coeffs, log_modulus))
    }

    /// Sum secret keys into the key they jointly hold.
    ///
    /// The collective protocols never compute this key. It is only meant to
    /// check their outputs in tests and simulations.
    pub fn ideal<'a, I>(shares: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a SecretKey>,
    {
        let mut shares = shares.into_iter();
        let first = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut coeffs = Zeroizing::new(first.coeffs.to_vec());
        for sk in shares {
            if !CkksParameters::same(&first.par, &sk.par) {
                return Err(Error::ParametersMismatch);
            }
            izip!(coeffs.iter_mut(), sk.coeffs.iter()).for_each(|(c, s)| *c += s);
        }
        Ok(Self::new(coeffs.to_vec(), &first.par))
    }

    /// Encrypt a ring element under this key with a uniformly random mask.
    pub(crate) fn encrypt_poly<R: RngCore + CryptoRng>(
        &self,
        m: &Poly,
        level: usize,
        log_scale: u32,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let log_modulus = self.par.log_modulus_at(level)?;
        m.check_modulus(log_modulus)?;
        let s = self.poly(log_modulus);
        let a = Poly::random(self.par.slots(), log_modulus, rng);
        let e = Zeroizing::new(Poly::gaussian(
            self.par.slots(),
            log_modulus,
            self.par.error_std,
            self.par.error_bound,
            rng,
        )?);
        let mut c0 = -(&a * &*s);
        c0 += &*e;
        c0 += m;
        Ciphertext::new(vec![c0, a], level, log_scale, &self.par)
    }
}

impl FheEncrypter<Plaintext, Ciphertext> for SecretKey {
    type Error = Error;

    fn try_encrypt<R: RngCore + CryptoRng>(
        &self,
        pt: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if !CkksParameters::same(&self.par, &pt.par) {
            return Err(Error::ParametersMismatch);
        }
        self.encrypt_poly(&pt.values, pt.level, pt.log_scale, rng)
    }
}

impl FheDecrypter<Plaintext, Ciphertext> for SecretKey {
    type Error = Error;

    fn try_decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        if !CkksParameters::same(&self.par, &ct.par) {
            return Err(Error::ParametersMismatch);
        }
        let s = self.poly(self.par.log_modulus_at(ct.level)?);
        let mut si = Zeroizing::new((*s).clone());
        let mut m = Zeroizing::new(ct.c[0].clone());
        for ci in ct.c.iter().skip(1) {
            let cis = Zeroizing::new(ci * &*si);
            *m += &*cis;
            *si *= &*s;
        }
        Ok(Plaintext {
            par: self.par.clone(),
            values: (*m).clone(),
            level: ct.level,
            log_scale: ct.log_scale,
        })
    }
}
