use std::marker::PhantomData;
use std::sync::Arc;

use crate::ckks::{CkksParameters, KeySwitchingKey, RelinearizationKey, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use super::{fingerprint, Aggregate, CommonRandomPoly, ShareSum};

/// A party's generator in the relinearization key generation protocol.
///
/// The protocol has two rounds. In the first round every party publishes a
/// [`RelinKeyShare<R1>`]; the round-1 shares are aggregated into a
/// [`RelinKeyShare<R1Aggregate>`], from which every party computes a
/// [`RelinKeyShare<R2>`]. The round-2 shares aggregate into a
/// [`RelinearizationKey`]. The generator holds the ephemeral secret used in
/// both rounds.
pub struct RelinKeyGenerator<'a> {
    sk_share: &'a SecretKey,
    crp: &'a CommonRandomPoly,
    u: Zeroizing<Poly>,
}

impl<'a> RelinKeyGenerator<'a> {
    /// Create a new relinearization key generator for a given party.
    ///
    /// 1. *Private input*: secret key share
    /// 2. *Public input*: common random polynomial
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &'a SecretKey,
        crp: &'a CommonRandomPoly,
        rng: &mut R,
    ) -> Self {
        let par = &sk_share.par;
        let u = Zeroizing::new(Poly::small(par.slots(), par.log_max_key_modulus(), rng));
        Self { sk_share, crp, u }
    }

    fn secret(&self) -> Zeroizing<Poly> {
        self.sk_share.poly(self.sk_share.par.log_max_key_modulus())
    }

    fn error<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Zeroizing<Poly>> {
        let par = &self.sk_share.par;
        Ok(Zeroizing::new(Poly::gaussian(
            par.slots(),
            par.log_max_key_modulus(),
            par.error_std,
            par.error_bound,
            rng,
        )?))
    }

    /// Generate the share for round 1: `(-u·a + P·s + e0, s·a + e1)` modulo
    /// the key-switching modulus, where `P` is the special modulus.
    pub fn round_1<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<RelinKeyShare<R1>> {
        let par = &self.sk_share.par;
        let s = self.secret();
        let a = &self.crp.poly;

        let mut h0 = -(a * &*self.u);
        h0 += &Zeroizing::new(s.mul_power_of_two(par.log_special_modulus()));
        h0 += &*self.error(rng)?;

        let mut h1 = a * &*s;
        h1 += &*self.error(rng)?;

        Ok(RelinKeyShare {
            par: self.sk_share.par.clone(),
            h0,
            h1,
            fingerprint: self.crp.fingerprint(),
            _phantom_data: PhantomData,
        })
    }

    /// Generate the share for round 2 from the aggregated round-1 shares
    /// `(h0, h1)`: `(s·h0 + e0, (u - s)·h1 + e1)`.
    pub fn round_2<R: RngCore + CryptoRng>(
        &self,
        r1: &RelinKeyShare<R1Aggregate>,
        rng: &mut R,
    ) -> Result<RelinKeyShare<R2>> {
        if !CkksParameters::same(&self.sk_share.par, &r1.par) {
            return Err(Error::ParametersMismatch);
        }
        let s = self.secret();

        let mut h0 = &r1.h0 * &*s;
        h0 += &*self.error(rng)?;

        let u_minus_s = Zeroizing::new(&*self.u - &*s);
        let mut h1 = &r1.h1 * &*u_minus_s;
        h1 += &*self.error(rng)?;

        Ok(RelinKeyShare {
            par: self.sk_share.par.clone(),
            h0,
            h1,
            fingerprint: r1.round_2_fingerprint(),
            _phantom_data: PhantomData,
        })
    }
}

/// Marker for round-1 shares.
#[derive(Debug, Clone, PartialEq)]
pub struct R1;

/// Marker for the aggregate of the round-1 shares.
#[derive(Debug, Clone, PartialEq)]
pub struct R1Aggregate;

/// Marker for round-2 shares.
#[derive(Debug, Clone, PartialEq)]
pub struct R2;

/// A share in the relinearization key generation protocol, typed by round.
#[derive(Debug, Clone, PartialEq)]
pub struct RelinKeyShare<R> {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) h0: Poly,
    pub(crate) h1: Poly,
    pub(crate) fingerprint: [u8; 32],
    _phantom_data: PhantomData<R>,
}

impl<R> RelinKeyShare<R> {
    /// The digest of the public inputs of the share.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl RelinKeyShare<R1Aggregate> {
    /// Digest identifying round-2 shares computed from this aggregate.
    fn round_2_fingerprint(&self) -> [u8; 32] {
        fingerprint(b"rlk-r2", &[], [&self.h0, &self.h1])
    }
}

impl Aggregate<RelinKeyShare<R1>> for RelinKeyShare<R1Aggregate> {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = RelinKeyShare<R1>>,
    {
        let mut shares = iter.into_iter();
        let share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut sum = ShareSum::new(&share.par, share.fingerprint);
        sum.add(&share.par, &share.fingerprint, [&share.h0, &share.h1])?;
        for sh in shares {
            sum.add(&sh.par, &sh.fingerprint, [&sh.h0, &sh.h1])?;
        }
        let [h0, h1] = sum.finish()?;
        Ok(RelinKeyShare {
            par: share.par,
            h0,
            h1,
            fingerprint: share.fingerprint,
            _phantom_data: PhantomData,
        })
    }
}

/// Aggregates the round-2 shares. The round-1 aggregate is needed to finalize
/// the key, so the shares come with it.
impl<'a> Aggregate<(RelinKeyShare<R2>, &'a RelinKeyShare<R1Aggregate>)> for RelinearizationKey {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = (RelinKeyShare<R2>, &'a RelinKeyShare<R1Aggregate>)>,
    {
        let mut shares = iter.into_iter();
        let (share, r1) = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let expected = r1.round_2_fingerprint();
        let mut sum = ShareSum::new(&r1.par, expected);
        sum.add(&share.par, &share.fingerprint, [&share.h0, &share.h1])?;
        for (sh, other) in shares {
            if !std::ptr::eq(r1, other) && r1 != other {
                return Err(Error::ShareMismatch(
                    "round-2 shares finalized against different round-1 aggregates".to_string(),
                ));
            }
            sum.add(&sh.par, &sh.fingerprint, [&sh.h0, &sh.h1])?;
        }
        let [h0, h1] = sum.finish()?;
        let k0 = &h0 + &h1;
        Ok(RelinearizationKey {
            ksk: KeySwitchingKey::from_parts(&r1.par, k0, r1.h1.clone()),
        })
    }
}

impl RelinearizationKey {
    /// Finalize the relinearization key from the round-1 aggregate and the
    /// round-2 shares.
    pub fn from_round_2_shares<T>(r1: &RelinKeyShare<R1Aggregate>, shares: T) -> Result<Self>
    where
        T: IntoIterator<Item = RelinKeyShare<R2>>,
    {
        Self::from_shares(shares.into_iter().map(|sh| (sh, r1)))
    }
}
