use std::sync::Arc;

use crate::ckks::{CkksParameters, GaloisElement, GaloisKey, KeySwitchingKey, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use super::{fingerprint, Aggregate, CommonRandomPoly, ShareSum};

/// A party's share in the Galois key generation protocol.
///
/// Each party publishes `-a·s + P·σ(s) + e` modulo the key-switching
/// modulus, for the common random polynomial `a`, the special modulus `P` and
/// the automorphism `σ`. Use the [`Aggregate`] impl to combine the
/// shares into a [`GaloisKey`].
#[derive(Debug, PartialEq, Clone)]
pub struct GaloisKeyShare {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) element: GaloisElement,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) h: Poly,
    pub(crate) fingerprint: [u8; 32],
}

impl GaloisKeyShare {
    /// Participate in a new Galois key generation protocol.
    ///
    /// 1. *Private input*: secret key share
    /// 2. *Public input*: automorphism
    /// 3. *Public input*: common random polynomial
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        element: GaloisElement,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> Result<Self> {
        let par = sk_share.par.clone();
        let log_modulus = par.log_max_key_modulus();
        let s = sk_share.poly(log_modulus);
        let e = Zeroizing::new(Poly::gaussian(
            par.slots(),
            log_modulus,
            par.error_std,
            par.error_bound,
            rng,
        )?);

        let mut h = -(&crp.poly * &*s);
        h += &*Zeroizing::new(element.apply(&s).mul_power_of_two(par.log_special_modulus()));
        h += &*e;

        let fingerprint = Self::fingerprint_for(element, &crp);
        Ok(Self {
            par,
            element,
            crp,
            h,
            fingerprint,
        })
    }

    fn fingerprint_for(element: GaloisElement, crp: &CommonRandomPoly) -> [u8; 32] {
        let tag = match element {
            GaloisElement::Rotation(steps) => [0, steps as u64],
            GaloisElement::Conjugation => [1, 0],
        };
        fingerprint(b"galois", &tag, [&crp.poly])
    }

    /// The automorphism of the share.
    pub fn element(&self) -> GaloisElement {
        self.element
    }

    /// The digest of the public inputs of the share.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl Aggregate<GaloisKeyShare> for GaloisKey {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = GaloisKeyShare>,
    {
        let mut shares = iter.into_iter();
        let share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut sum = ShareSum::new(&share.par, share.fingerprint);
        sum.add(&share.par, &share.fingerprint, [&share.h])?;
        for sh in shares {
            sum.add(&sh.par, &sh.fingerprint, [&sh.h])?;
        }
        let [k0] = sum.finish()?;
        Ok(GaloisKey {
            element: share.element,
            ksk: KeySwitchingKey::from_parts(&share.par, k0, share.crp.poly),
        })
    }
}
