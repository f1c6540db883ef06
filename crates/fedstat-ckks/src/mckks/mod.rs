//! The multiparty (threshold) protocols of the simulated CKKS scheme.
//!
//! Every protocol follows the same pattern: each party computes a share from
//! its secret key share and public inputs, then the shares are combined with
//! the [`Aggregate`] implementation of the protocol output. Aggregation sums
//! shares modulo the ring modulus, so its result does not depend on the order
//! of the shares.

mod crp;
mod galois_key_gen;
mod public_key_gen;
mod public_key_switch;
mod refresh;
mod relin_key_gen;

pub use crp::{CommonRandomPoly, CommonReferenceString};
pub use galois_key_gen::GaloisKeyShare;
pub use public_key_gen::PublicKeyShare;
pub use public_key_switch::{PublicKeySwitchShare, Smudging};
pub use refresh::{minimum_level_for_refresh, RefreshShare};
pub use relin_key_gen::{RelinKeyGenerator, RelinKeyShare, R1, R1Aggregate, R2};

use crate::ckks::CkksParameters;
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Aggregate shares in an MPC protocol.
pub trait Aggregate<S>: Sized {
    /// Create an aggregate from an iterator of shares.
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = S>;
}

/// Extension trait for aggregation on iterators.
pub trait AggregateIter<S>: Iterator<Item = S> + Sized {
    /// Aggregate the shares of the iterator.
    fn aggregate<A: Aggregate<S>>(self) -> Result<A> {
        A::from_shares(self)
    }
}

impl<S, I: Iterator<Item = S>> AggregateIter<S> for I {}

/// SHA-256 digest of ring elements and metadata, identifying the public
/// inputs a share was computed against.
pub(crate) fn fingerprint<'a, I>(tag: &[u8], metadata: &[u64], polys: I) -> [u8; 32]
where
    I: IntoIterator<Item = &'a Poly>,
{
    let mut hasher = Sha256::new();
    hasher.update((tag.len() as u64).to_le_bytes());
    hasher.update(tag);
    for m in metadata {
        hasher.update(m.to_le_bytes());
    }
    for p in polys {
        hasher.update((p.slots() as u64).to_le_bytes());
        hasher.update(u64::from(p.log_modulus()).to_le_bytes());
        for c in p.coeffs() {
            let bytes = c.to_signed_bytes_le();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Modular sum of one or more components of compatible shares.
pub(crate) struct ShareSum<const K: usize> {
    par: Arc<CkksParameters>,
    fingerprint: [u8; 32],
    acc: Option<[Poly; K]>,
    count: usize,
}

impl<const K: usize> ShareSum<K> {
    /// Start a sum with the parameters and fingerprint of the first share.
    pub(crate) fn new(par: &Arc<CkksParameters>, fingerprint: [u8; 32]) -> Self {
        Self {
            par: par.clone(),
            fingerprint,
            acc: None,
            count: 0,
        }
    }

    /// Add the components of a share.
    pub(crate) fn add(
        &mut self,
        par: &Arc<CkksParameters>,
        fingerprint: &[u8; 32],
        components: [&Poly; K],
    ) -> Result<()> {
        if !CkksParameters::same(&self.par, par) {
            return Err(Error::ParametersMismatch);
        }
        if &self.fingerprint != fingerprint {
            return Err(Error::ShareMismatch(
                "share computed against different public inputs".to_string(),
            ));
        }
        // Validate all components before committing any of them.
        for (i, p) in components.iter().enumerate() {
            if p.slots() != self.par.slots() {
                return Err(Error::ShareMismatch(format!(
                    "share has {} slots, expected {}",
                    p.slots(),
                    self.par.slots()
                )));
            }
            if let Some(acc) = &self.acc {
                if acc[i].log_modulus() != p.log_modulus() {
                    return Err(Error::ShareMismatch(format!(
                        "share component {i} is modulo 2^{}, expected 2^{}",
                        p.log_modulus(),
                        acc[i].log_modulus()
                    )));
                }
            }
        }
        match &mut self.acc {
            Some(acc) => acc.iter_mut().zip(components).for_each(|(a, p)| *a += p),
            None => self.acc = Some(components.map(Poly::clone)),
        }
        self.count += 1;
        Ok(())
    }

    /// Number of shares added.
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// The sums of the components.
    pub(crate) fn finish(self) -> Result<[Poly; K]> {
        self.acc.ok_or(Error::TooFewValues(0, 1))
    }
}
