//! Relinearization keys for the simulated CKKS scheme

use super::key_switching_key::KeySwitchingKey;
use crate::ckks::{CkksParameters, Ciphertext, SecretKey};
use crate::{Error, Result};
use fedstat_traits::FheParametrized;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Relinearization key for the simulated CKKS scheme.
///
/// It switches the `s²` component of a degree-2 ciphertext back to `s`.
#[derive(Debug, PartialEq, Clone)]
pub struct RelinearizationKey {
    pub(crate) ksk: KeySwitchingKey,
}

impl FheParametrized for RelinearizationKey {
    type Parameters = CkksParameters;
}

impl RelinearizationKey {
    /// Generate a [`RelinearizationKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(sk: &SecretKey, rng: &mut R) -> Result<Self> {
        let s = sk.poly(sk.par.log_modulus_at(sk.par.max_level())?);
        let s2 = Zeroizing::new(&*s * &*s);
        let ksk = KeySwitchingKey::new(sk, &s2, rng)?;
        Ok(Self { ksk })
    }

    /// The parameters of the key.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.ksk.par
    }

    /// Relinearize an "extended" ciphertext (c₀, c₁, c₂) into a [`Ciphertext`]
    pub fn relinearizes(&self, ct: &mut Ciphertext) -> Result<()> {
        if ct.c.len() != 3 {
            return Err(Error::DefaultError(
                "Only supports relinearization of ciphertext with 3 parts".to_string(),
            ));
        }
        if !CkksParameters::same(&self.ksk.par, &ct.par) {
            return Err(Error::ParametersMismatch);
        }
        let c2 = ct.c.pop().ok_or(Error::TooFewValues(0, 3))?;
        let (d0, d1) = self.ksk.key_switch(&c2)?;
        ct.c[0] += &d0;
        ct.c[1] += &d1;
        Ok(())
    }
}
