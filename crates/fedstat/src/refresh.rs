//! The refresh manager: collective refresh behind a level policy.

use std::sync::{Arc, Mutex, PoisonError};

use fedstat_ckks::ckks::{Bootstrapper, Ciphertext, CkksParameters};
use fedstat_ckks::mckks::{minimum_level_for_refresh, CommonReferenceString, Smudging};
use fedstat_traits::FheCiphertext;
use log::debug;
use rand::thread_rng;
use rayon::prelude::*;

use crate::protocol::aggregate_shares;
use crate::{Error, Participant, Protocol, ProtocolConfig, Result};

/// Refreshes ciphertexts with the collective refresh protocol.
///
/// A refresh is only secure when the modulus at the input level is large
/// enough for the masks of all the parties to hide the plaintext. The
/// manager computes that minimum level once and rejects every ciphertext
/// below it. Refreshed ciphertexts are at the maximum level.
///
/// Every refresh draws a fresh common random polynomial from the reference
/// string. Managers over the same participants must share the reference
/// string, see [`Refresher::with_reference_string`].
pub struct Refresher<'a> {
    par: Arc<CkksParameters>,
    participants: &'a [Participant],
    crs: Arc<Mutex<CommonReferenceString>>,
    smudging: Smudging,
    minimum_level: usize,
    log_bound: u32,
}

impl<'a> Refresher<'a> {
    /// Creates the refresh manager of `participants` with its own reference
    /// string.
    pub fn new(participants: &'a [Participant], config: &ProtocolConfig) -> Result<Self> {
        let crs = Arc::new(Mutex::new(Self::reference_string(config)));
        Self::with_reference_string(participants, config, crs)
    }

    /// The reference string of the refresh protocol for `config`.
    pub fn reference_string(config: &ProtocolConfig) -> CommonReferenceString {
        let seed = [config.crs_seed.as_bytes(), b"/refresh".as_slice()].concat();
        CommonReferenceString::new(&seed)
    }

    /// Creates the refresh manager of `participants`, drawing the common
    /// random polynomials from the shared `crs`.
    pub fn with_reference_string(
        participants: &'a [Participant],
        config: &ProtocolConfig,
        crs: Arc<Mutex<CommonReferenceString>>,
    ) -> Result<Self> {
        let first = participants.first().ok_or_else(|| {
            Error::InvalidConfig("Refresh needs at least one participant".to_string())
        })?;
        let par = first.parameters().clone();
        let n = participants.len();
        let (minimum_level, log_bound) = minimum_level_for_refresh(
            config.security_bits,
            par.log_default_scale(),
            n,
            par.log_q(),
        )
        .ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Modulus chain too short to refresh securely with {n} parties and {} bits of security",
                config.security_bits
            ))
        })?;
        if minimum_level >= par.max_level() {
            return Err(Error::InvalidConfig(format!(
                "Refresh requires level {minimum_level}, which leaves no level above it"
            )));
        }
        debug!("Refresh requires level {minimum_level} (mask bound 2^{log_bound})");
        Ok(Self {
            par,
            participants,
            crs,
            smudging: config.smudging,
            minimum_level,
            log_bound,
        })
    }

    /// Smallest level a ciphertext must have to be refreshed.
    pub fn minimum_input_level(&self) -> usize {
        self.minimum_level
    }

    /// Level of refreshed ciphertexts.
    pub fn output_level(&self) -> usize {
        self.par.max_level()
    }

    /// Base-2 logarithm of the bound on the plaintexts hidden by the masks.
    pub fn log_bound(&self) -> u32 {
        self.log_bound
    }

    fn check_level(&self, ct: &Ciphertext) -> Result<()> {
        if ct.level() < self.minimum_level {
            return Err(Error::LevelTooLow {
                level: ct.level(),
                required: self.minimum_level,
            });
        }
        Ok(())
    }

    /// Refreshes a ciphertext to the maximum level.
    pub fn refresh(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_level(ct)?;
        let crp = self
            .crs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_crp(&self.par);
        let ct = Arc::new(ct.clone());
        let shares = self
            .participants
            .par_iter()
            .map(|p| {
                p.refresh_share(
                    ct.clone(),
                    crp.clone(),
                    &self.smudging,
                    self.log_bound,
                    &mut thread_rng(),
                )
                .map(|share| (p.id(), share))
                    .map_err(|e| Error::from_protocol(Protocol::Refresh, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Refreshed a ciphertext from level {} to level {}",
            ct.level(),
            self.output_level()
        );
        aggregate_shares(Protocol::Refresh, shares)
    }

    /// Refreshes a batch of ciphertexts. Fails before running any refresh if
    /// one of them is below the minimum level.
    pub fn refresh_many(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
        cts.iter().try_for_each(|ct| self.check_level(ct))?;
        cts.iter().map(|ct| self.refresh(ct)).collect()
    }
}

impl Bootstrapper for Refresher<'_> {
    fn bootstrap(&self, ct: &Ciphertext) -> fedstat_ckks::Result<Ciphertext> {
        Ok(self.refresh(ct)?)
    }

    fn bootstrap_many(&self, cts: &[Ciphertext]) -> fedstat_ckks::Result<Vec<Ciphertext>> {
        Ok(self.refresh_many(cts)?)
    }

    fn depth(&self) -> usize {
        0
    }

    fn minimum_input_level(&self) -> usize {
        self.minimum_level
    }

    fn output_level(&self) -> usize {
        self.par.max_level()
    }
}

#[cfg(test)]
mod tests {
    use super::Refresher;
    use crate::protocol::{CollectiveDecryptor, CollectiveKeyGenerator};
    use crate::{Error, Participant, ProtocolConfig};
    use fedstat_ckks::ckks::{CkksParameters, CkksParametersBuilder, Evaluator, PublicKey};
    use fedstat_traits::FheCiphertext;
    use rand::thread_rng;
    use std::sync::{Arc, Mutex};

    fn setup(par: &Arc<CkksParameters>, n: usize) -> (Vec<Participant>, PublicKey) {
        let parties = (0..n)
            .map(|i| Participant::new(i, par, vec![vec![]], &mut thread_rng()).unwrap())
            .collect::<Vec<_>>();
        let pk = CollectiveKeyGenerator::new(par, b"refresh")
            .public_key(&parties)
            .unwrap();
        (parties, pk)
    }

    #[test]
    fn minimum_level_of_the_default_chain() {
        let par = CkksParameters::default_arc(8).unwrap();
        let (parties, _) = setup(&par, 4);
        let refresher = Refresher::new(&parties, &ProtocolConfig::default()).unwrap();
        assert_eq!(refresher.minimum_input_level(), 3);
        assert_eq!(refresher.output_level(), 14);
        assert_eq!(refresher.log_bound(), 128 + 45);
    }

    #[test]
    fn refresh_restores_the_level() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let (parties, pk) = setup(&par, 4);
        let config = ProtocolConfig::default();
        let refresher = Refresher::new(&parties, &config).unwrap();
        let eval = Evaluator::new(&par);

        let values = [0.25, -3.0, 12.5];
        let mut ct = parties[2].encrypt(&values, &pk, &mut rng).unwrap();
        eval.drop_level(&mut ct, 3).unwrap();
        let refreshed = refresher.refresh(&ct).unwrap();
        assert_eq!(refreshed.level(), 14);
        assert!(refreshed.level() >= ct.level());

        let decryptor = CollectiveDecryptor::new(&par, config.smudging);
        let revealed = decryptor.reveal(&parties, &refreshed).unwrap();
        for (v, r) in values.iter().zip(revealed.iter()) {
            assert!((v - r).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_low_levels_before_refreshing() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let (parties, pk) = setup(&par, 3);
        let config = ProtocolConfig::default();
        let refresher = Refresher::new(&parties, &config).unwrap();
        let eval = Evaluator::new(&par);

        let ok = parties[0].encrypt(&[1.0], &pk, &mut rng).unwrap();
        let mut low = ok.clone();
        eval.drop_level(&mut low, 2).unwrap();
        assert_eq!(
            refresher.refresh(&low),
            Err(Error::LevelTooLow {
                level: 2,
                required: 3
            })
        );
        assert_eq!(
            refresher.refresh_many(&[ok.clone(), low, ok]),
            Err(Error::LevelTooLow {
                level: 2,
                required: 3
            })
        );

        // No refresh consumed a common random polynomial.
        let expected = Refresher::reference_string(&config).next_crp(&par);
        assert_eq!(refresher.crs.lock().unwrap().next_crp(&par), expected);
    }

    #[test]
    fn shared_reference_string() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let (parties, pk) = setup(&par, 2);
        let config = ProtocolConfig::default();
        let crs = Arc::new(Mutex::new(Refresher::reference_string(&config)));
        let first = Refresher::with_reference_string(&parties, &config, crs.clone()).unwrap();
        let second = Refresher::with_reference_string(&parties, &config, crs.clone()).unwrap();

        let ct = parties[0].encrypt(&[1.0], &pk, &mut rng).unwrap();
        let a = first.refresh(&ct).unwrap();
        let b = second.refresh(&ct).unwrap();
        assert_ne!(a.parts()[1], b.parts()[1]);

        let mut unshared = Refresher::reference_string(&config);
        unshared.next_crps(&par, 2);
        assert_eq!(crs.lock().unwrap().next_crp(&par), unshared.next_crp(&par));
    }

    #[test]
    fn short_chains_cannot_refresh() {
        let par = CkksParametersBuilder::new()
            .set_slots(8)
            .set_log_moduli(&[30, 20, 20, 20])
            .set_log_default_scale(20)
            .build_arc()
            .unwrap();
        let (parties, _) = setup(&par, 2);
        assert!(matches!(
            Refresher::new(&parties, &ProtocolConfig::default()),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Refresher::new(&[], &ProtocolConfig::default()),
            Err(Error::InvalidConfig(_))
        ));
    }
}
