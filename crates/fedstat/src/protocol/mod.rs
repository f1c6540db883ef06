//! The collective protocols of the federation: key generation and
//! decryption towards an external requester.
//!
//! Every protocol runs in two phases. The participants compute their shares
//! in parallel, then the shares are checked and aggregated. A share computed
//! against other public inputs than the rest is attributed to its party and
//! aborts the protocol.

mod decryption;
mod keygen;

pub use decryption::CollectiveDecryptor;
pub use keygen::{CollectiveKeyGenerator, CollectiveKeys};

use fedstat_ckks::mckks::{
    Aggregate, GaloisKeyShare, PublicKeyShare, PublicKeySwitchShare, RefreshShare, RelinKeyShare,
};

use crate::{Error, Protocol, Result};

/// A protocol share carrying the digest of its public inputs.
pub(crate) trait Fingerprinted {
    fn fingerprint(&self) -> &[u8; 32];
}

macro_rules! impl_fingerprinted {
    ($($share:ty),*) => {
        $(
            impl Fingerprinted for $share {
                fn fingerprint(&self) -> &[u8; 32] {
                    <$share>::fingerprint(self)
                }
            }
        )*
    };
}

impl_fingerprinted!(
    PublicKeyShare,
    GaloisKeyShare,
    PublicKeySwitchShare,
    RefreshShare
);

impl<R> Fingerprinted for RelinKeyShare<R> {
    fn fingerprint(&self) -> &[u8; 32] {
        RelinKeyShare::<R>::fingerprint(self)
    }
}

/// Checks that every share was computed against the same public inputs as
/// the first one, and returns the shares without their party identities.
pub(crate) fn check_shares<S: Fingerprinted>(
    protocol: Protocol,
    shares: Vec<(usize, S)>,
) -> Result<Vec<S>> {
    let expected = match shares.first() {
        Some((_, share)) => *share.fingerprint(),
        None => {
            return Err(Error::ProtocolShareMismatch {
                protocol,
                party: None,
                reason: "no shares to aggregate".to_string(),
            })
        }
    };
    if let Some((party, _)) = shares
        .iter()
        .find(|(_, share)| share.fingerprint() != &expected)
    {
        return Err(Error::ProtocolShareMismatch {
            protocol,
            party: Some(*party),
            reason: "share computed against different public inputs".to_string(),
        });
    }
    Ok(shares.into_iter().map(|(_, share)| share).collect())
}

/// Checks the shares of a protocol and aggregates them.
pub(crate) fn aggregate_shares<S, A>(protocol: Protocol, shares: Vec<(usize, S)>) -> Result<A>
where
    S: Fingerprinted,
    A: Aggregate<S>,
{
    let shares = check_shares(protocol, shares)?;
    A::from_shares(shares).map_err(|e| Error::from_protocol(protocol, e))
}
