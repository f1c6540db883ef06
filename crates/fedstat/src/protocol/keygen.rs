//! Collective key generation.

use std::sync::Arc;

use fedstat_ckks::ckks::{
    CkksParameters, EvaluationKeySet, GaloisElement, GaloisKey, PublicKey, RelinearizationKey,
};
use fedstat_ckks::mckks::{CommonReferenceString, RelinKeyGenerator, RelinKeyShare, R1Aggregate};
use log::{debug, info};
use rand::thread_rng;
use rayon::prelude::*;

use super::{aggregate_shares, check_shares};
use crate::{Error, Participant, Protocol, Result};

/// The keys produced by collective key generation.
#[derive(Debug, Clone)]
pub struct CollectiveKeys {
    /// The collective public key.
    pub public_key: Arc<PublicKey>,
    /// The relinearization key and the rotation and conjugation keys.
    pub evaluation_keys: Arc<EvaluationKeySet>,
}

/// Runs the collective key generation protocols.
///
/// Every key is derived from the next polynomials of a common reference
/// string, so that all parties agree on the public inputs without
/// communicating.
#[derive(Debug)]
pub struct CollectiveKeyGenerator {
    par: Arc<CkksParameters>,
    crs: CommonReferenceString,
}

impl CollectiveKeyGenerator {
    /// Creates a generator drawing its common random polynomials from the
    /// reference string keyed by `seed`.
    pub fn new(par: &Arc<CkksParameters>, seed: &[u8]) -> Self {
        Self {
            par: par.clone(),
            crs: CommonReferenceString::new(seed),
        }
    }

    fn check_participants(&self, participants: &[Participant]) -> Result<()> {
        if participants.is_empty() {
            return Err(Error::InvalidConfig(
                "Key generation needs at least one participant".to_string(),
            ));
        }
        if let Some(p) = participants
            .iter()
            .find(|p| **p.parameters() != *self.par)
        {
            return Err(Error::ProtocolShareMismatch {
                protocol: Protocol::PublicKeyGeneration,
                party: Some(p.id()),
                reason: "secret key share built from different parameters".to_string(),
            });
        }
        Ok(())
    }

    /// Generates the collective public key.
    pub fn public_key(&mut self, participants: &[Participant]) -> Result<PublicKey> {
        self.check_participants(participants)?;
        let crp = self.crs.next_crp(&self.par);
        let shares = participants
            .par_iter()
            .map(|p| {
                p.public_key_share(crp.clone(), &mut thread_rng())
                    .map(|share| (p.id(), share))
                    .map_err(|e| Error::from_protocol(Protocol::PublicKeyGeneration, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Collected {} public key shares", shares.len());
        aggregate_shares(Protocol::PublicKeyGeneration, shares)
    }

    /// Generates the collective relinearization key in two rounds.
    pub fn relinearization_key(
        &mut self,
        participants: &[Participant],
    ) -> Result<RelinearizationKey> {
        self.check_participants(participants)?;
        let crp = self.crs.next_crp(&self.par);
        let generators = participants
            .par_iter()
            .map(|p| (p.id(), p.relin_key_generator(&crp, &mut thread_rng())))
            .collect::<Vec<(usize, RelinKeyGenerator)>>();

        let round_1 = generators
            .par_iter()
            .map(|(id, generator)| {
                generator
                    .round_1(&mut thread_rng())
                    .map(|share| (*id, share))
                    .map_err(|e| Error::from_protocol(Protocol::RelinearizationRound1, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Collected {} relinearization round 1 shares", round_1.len());
        let r1: RelinKeyShare<R1Aggregate> =
            aggregate_shares(Protocol::RelinearizationRound1, round_1)?;

        let round_2 = generators
            .par_iter()
            .map(|(id, generator)| {
                generator
                    .round_2(&r1, &mut thread_rng())
                    .map(|share| (*id, share))
                    .map_err(|e| Error::from_protocol(Protocol::RelinearizationRound2, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Collected {} relinearization round 2 shares", round_2.len());
        let round_2 = check_shares(Protocol::RelinearizationRound2, round_2)?;
        RelinearizationKey::from_round_2_shares(&r1, round_2)
            .map_err(|e| Error::from_protocol(Protocol::RelinearizationRound2, e))
    }

    /// Generates the collective key of an automorphism.
    pub fn galois_key(
        &mut self,
        participants: &[Participant],
        element: GaloisElement,
    ) -> Result<GaloisKey> {
        self.check_participants(participants)?;
        let crp = self.crs.next_crp(&self.par);
        let shares = participants
            .par_iter()
            .map(|p| {
                p.galois_key_share(element, crp.clone(), &mut thread_rng())
                    .map(|share| (p.id(), share))
                    .map_err(|e| Error::from_protocol(Protocol::GaloisKeyGeneration, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Collected {} shares of the {element:?} key", shares.len());
        aggregate_shares(Protocol::GaloisKeyGeneration, shares)
    }

    /// Generates the public key, the relinearization key and the keys of
    /// `elements`.
    pub fn generate(
        &mut self,
        participants: &[Participant],
        elements: &[GaloisElement],
    ) -> Result<CollectiveKeys> {
        let public_key = self.public_key(participants)?;
        let rlk = self.relinearization_key(participants)?;
        let galois_keys = elements
            .iter()
            .map(|element| self.galois_key(participants, *element))
            .collect::<Result<Vec<_>>>()?;
        let evaluation_keys = EvaluationKeySet::new(rlk, galois_keys)?;
        info!(
            "Generated collective keys for {} participants with {} Galois keys",
            participants.len(),
            elements.len()
        );
        Ok(CollectiveKeys {
            public_key: Arc::new(public_key),
            evaluation_keys: Arc::new(evaluation_keys),
        })
    }
}
