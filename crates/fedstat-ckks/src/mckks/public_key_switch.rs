use std::sync::Arc;

use crate::ckks::{Ciphertext, CkksParameters, PublicKey, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{fingerprint, Aggregate, ShareSum};

/// Gaussian noise added to key-switch and refresh shares so that they do not
/// leak the secret key shares through the ciphertext noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Smudging {
    /// Standard deviation of the integer noise.
    pub sigma: f64,
    /// Truncation bound of the integer noise.
    pub bound: f64,
}

impl Default for Smudging {
    fn default() -> Self {
        Self {
            sigma: Self::DEFAULT_SIGMA,
            bound: 6.0 * Self::DEFAULT_SIGMA,
        }
    }
}

impl Smudging {
    /// Standard deviation used by default: eight times the error standard
    /// deviation.
    pub const DEFAULT_SIGMA: f64 = 8.0 * CkksParameters::DEFAULT_ERROR_STD;

    /// Checks that the distribution is well defined.
    pub fn validate(&self) -> Result<()> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(Error::UnspecifiedInput(format!(
                "Smudging standard deviation {} must be positive",
                self.sigma
            )));
        }
        if !self.bound.is_finite() || self.bound < self.sigma {
            return Err(Error::UnspecifiedInput(format!(
                "Smudging bound {} must be at least the standard deviation {}",
                self.bound, self.sigma
            )));
        }
        Ok(())
    }

    pub(crate) fn sample<R: RngCore + CryptoRng>(
        &self,
        slots: usize,
        log_modulus: u32,
        rng: &mut R,
    ) -> Result<Zeroizing<Poly>> {
        Ok(Zeroizing::new(Poly::gaussian(
            slots,
            log_modulus,
            self.sigma,
            self.bound,
            rng,
        )?))
    }
}

/// A party's share in the public key switch protocol.
///
/// Switches a ciphertext under the collective secret key into a ciphertext
/// under an external public key, without decrypting it. Use the
/// [`Aggregate`] impl to combine the shares into a [`Ciphertext`] that the
/// owner of the output key can decrypt.
#[derive(Debug, PartialEq, Clone)]
pub struct PublicKeySwitchShare {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) h0: Poly,
    pub(crate) h1: Poly,
    pub(crate) fingerprint: [u8; 32],
}

impl PublicKeySwitchShare {
    /// Participate in a new public key switch protocol.
    ///
    /// 1. *Private input*: secret key share
    /// 2. *Public input*: output public key
    /// 3. *Public input*: ciphertext to switch
    /// 4. *Public input*: smudging noise distribution
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        pk_out: &PublicKey,
        ct: Arc<Ciphertext>,
        smudging: &Smudging,
        rng: &mut R,
    ) -> Result<Self> {
        if !CkksParameters::same(&sk_share.par, &ct.par)
            || !CkksParameters::same(&pk_out.par, &ct.par)
        {
            return Err(Error::ParametersMismatch);
        }
        if ct.c.len() != 2 {
            return Err(Error::TooManyValues(ct.c.len(), 2));
        }
        smudging.validate()?;

        let par = sk_share.par.clone();
        let slots = par.slots();
        let log_modulus = par.log_modulus_at(ct.level)?;
        let s = sk_share.poly(log_modulus);
        let p = pk_out.c.parts_at(ct.level)?;
        let u = Zeroizing::new(Poly::small(slots, log_modulus, rng));
        let e0 = smudging.sample(slots, log_modulus, rng)?;
        let e1 = Zeroizing::new(Poly::gaussian(
            slots,
            log_modulus,
            par.error_std,
            par.error_bound,
            rng,
        )?);

        let mut h0 = &ct.c[1] * &*s;
        h0 += &(&p[0] * &*u);
        h0 += &*e0;

        let mut h1 = &p[1] * &*u;
        h1 += &*e1;

        let fingerprint = Self::fingerprint_for(&ct, pk_out);
        Ok(Self {
            par,
            ct,
            h0,
            h1,
            fingerprint,
        })
    }

    fn fingerprint_for(ct: &Ciphertext, pk_out: &PublicKey) -> [u8; 32] {
        let (p0, p1) = pk_out.parts();
        fingerprint(
            b"pcks",
            &[ct.level as u64, ct.log_scale as u64],
            ct.c.iter().chain([p0, p1]),
        )
    }

    /// The digest of the public inputs of the share.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl Aggregate<PublicKeySwitchShare> for Ciphertext {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeySwitchShare>,
    {
        let mut shares = iter.into_iter();
        let share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut sum = ShareSum::new(&share.par, share.fingerprint);
        sum.add(&share.par, &share.fingerprint, [&share.h0, &share.h1])?;
        for sh in shares {
            sum.add(&sh.par, &sh.fingerprint, [&sh.h0, &sh.h1])?;
        }
        let [h0, h1] = sum.finish()?;

        let c0 = &share.ct.c[0] + &h0;
        Ciphertext::new(vec![c0, h1], share.ct.level, share.ct.log_scale, &share.par)
    }
}
