use std::sync::Arc;

use crate::ckks::{Ciphertext, CkksParameters, PublicKey, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use super::{Aggregate, CommonRandomPoly, ShareSum};

/// A party's share in the public key generation protocol.
///
/// Each party uses the `PublicKeyShare` to generate their share of the public
/// key, a symmetric encryption of zero under its secret key share using the
/// common random polynomial as mask. Use the [`Aggregate`] impl to combine
/// the shares into a [`PublicKey`].
#[derive(Debug, PartialEq, Clone)]
pub struct PublicKeyShare {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) p0_share: Poly,
    pub(crate) fingerprint: [u8; 32],
}

impl PublicKeyShare {
    /// Participate in a new public key generation protocol.
    ///
    /// 1. *Private input*: secret key share
    /// 2. *Public input*: common random polynomial
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let log_modulus = par.log_modulus_at(par.max_level())?;
        let s = sk_share.poly(log_modulus);
        let e = Zeroizing::new(Poly::gaussian(
            par.slots(),
            log_modulus,
            par.error_std,
            par.error_bound,
            rng,
        )?);

        let mut p0_share = -(&crp.at(log_modulus) * &*s);
        p0_share += &*e;

        let fingerprint = crp.fingerprint();
        Ok(Self {
            par,
            crp,
            p0_share,
            fingerprint,
        })
    }

    /// The digest of the public inputs of the share.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl Aggregate<PublicKeyShare> for PublicKey {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = PublicKeyShare>,
    {
        let mut shares = iter.into_iter();
        let share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut sum = ShareSum::new(&share.par, share.fingerprint);
        sum.add(&share.par, &share.fingerprint, [&share.p0_share])?;
        for sh in shares {
            sum.add(&sh.par, &sh.fingerprint, [&sh.p0_share])?;
        }
        let [p0] = sum.finish()?;

        let par = share.par;
        let p1 = share.crp.at(p0.log_modulus());
        Ok(PublicKey {
            c: Ciphertext::new(
                vec![p0, p1],
                par.max_level(),
                par.log_default_scale(),
                &par,
            )?,
            par,
        })
    }
}
