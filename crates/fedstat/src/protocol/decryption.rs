//! Collective decryption through a public key switch.

use std::sync::Arc;

use fedstat_ckks::ckks::{Ciphertext, CkksParameters, PublicKey, SecretKey};
use fedstat_ckks::mckks::Smudging;
use fedstat_traits::{FheDecoder, FheDecrypter};
use log::debug;
use rand::thread_rng;
use rayon::prelude::*;
use zeroize::Zeroizing;

use super::aggregate_shares;
use crate::{Error, Participant, Protocol, Result};

/// Decrypts ciphertexts under the collective key towards a requester.
///
/// The participants jointly switch a ciphertext from the collective secret
/// key to the requester's public key; only the owner of the matching secret
/// key can decrypt the result.
#[derive(Debug, Clone)]
pub struct CollectiveDecryptor {
    par: Arc<CkksParameters>,
    smudging: Smudging,
}

impl CollectiveDecryptor {
    /// Creates a decryptor adding `smudging` noise to every key switch share.
    pub fn new(par: &Arc<CkksParameters>, smudging: Smudging) -> Self {
        Self {
            par: par.clone(),
            smudging,
        }
    }

    /// Switches `ct` to a ciphertext decryptable by the owner of `pk_out`.
    pub fn key_switch(
        &self,
        participants: &[Participant],
        ct: &Ciphertext,
        pk_out: &PublicKey,
    ) -> Result<Ciphertext> {
        let ct = Arc::new(ct.clone());
        let shares = participants
            .par_iter()
            .map(|p| {
                p.key_switch_share(pk_out, ct.clone(), &self.smudging, &mut thread_rng())
                    .map(|share| (p.id(), share))
                    .map_err(|e| Error::from_protocol(Protocol::PublicKeySwitch, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Collected {} key switch shares", shares.len());
        aggregate_shares(Protocol::PublicKeySwitch, shares)
    }

    /// Reveals the slot values of `ct` to a requester holding a disposable
    /// key pair.
    pub fn reveal(&self, participants: &[Participant], ct: &Ciphertext) -> Result<Vec<f64>> {
        self.reveal_many(participants, &[ct])?
            .pop()
            .ok_or_else(|| Error::UnspecifiedInput("Nothing revealed".to_string()))
    }

    /// Reveals several ciphertexts with a single disposable key pair.
    pub fn reveal_many(
        &self,
        participants: &[Participant],
        cts: &[&Ciphertext],
    ) -> Result<Vec<Vec<f64>>> {
        let mut rng = thread_rng();
        let sk = SecretKey::random(&self.par, &mut rng);
        let pk = PublicKey::new(&sk, &mut rng)?;
        cts.iter()
            .map(|ct| {
                let switched = self.key_switch(participants, ct, &pk)?;
                let pt = Zeroizing::new(sk.try_decrypt(&switched)?);
                Ok(Vec::<f64>::try_decode(&*pt)?)
            })
            .collect()
    }
}
