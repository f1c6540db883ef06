//! A federation: participants sharing collective keys and protocol
//! constants.

use std::sync::{Arc, Mutex};

use fedstat_ckks::ckks::{
    Ciphertext, CkksParameters, EvaluationKeySet, Evaluator, GaloisElement, PublicKey,
};
use fedstat_ckks::mckks::CommonReferenceString;
use log::info;
use rand::thread_rng;
use rayon::prelude::*;

use crate::protocol::{CollectiveDecryptor, CollectiveKeyGenerator, CollectiveKeys};
use crate::stats::{
    Extrema, FeatureQuery, MinMaxPipeline, Moments, MomentsPipeline, NormalizationFactors,
    OrderStatisticPipeline, OrderStatistics, RobustStatistics, Target, ZScore,
};
use crate::{Error, Participant, ProtocolConfig, Refresher, Result};

/// Participants holding horizontally partitioned data under one collective
/// key.
///
/// Creating a federation runs the collective key generation. The keys and
/// the configuration are immutable afterwards; the statistic pipelines
/// borrow them.
#[derive(Debug)]
pub struct Federation {
    config: Arc<ProtocolConfig>,
    par: Arc<CkksParameters>,
    participants: Vec<Participant>,
    keys: CollectiveKeys,
    evaluator: Evaluator,
    decryptor: CollectiveDecryptor,
    refresh_crs: Arc<Mutex<CommonReferenceString>>,
    n_features: usize,
}

impl Federation {
    /// Precision of the encrypted extrema relative to their normalization
    /// factor.
    pub const COMPARISON_PRECISION: f64 = 1e-3;

    /// Creates a federation and generates its collective keys.
    pub fn new(config: ProtocolConfig, participants: Vec<Participant>) -> Result<Self> {
        let first = participants.first().ok_or_else(|| {
            Error::InvalidConfig("A federation needs at least one participant".to_string())
        })?;
        let par = first.parameters().clone();
        let n_features = first.n_features();
        config.validate_for(&par)?;

        for (i, p) in participants.iter().enumerate() {
            if p.n_features() != n_features {
                return Err(Error::UnspecifiedInput(format!(
                    "Participant {} has {} features, expected {n_features}",
                    p.id(),
                    p.n_features()
                )));
            }
            if participants[..i].iter().any(|q| q.id() == p.id()) {
                return Err(Error::UnspecifiedInput(format!(
                    "Duplicate participant identity {}",
                    p.id()
                )));
            }
        }

        // Fails early when the chain cannot support a secure refresh.
        Refresher::new(&participants, &config)?;

        let elements = GaloisElement::for_inner_sum(n_features.next_power_of_two(), &par);
        let keys = CollectiveKeyGenerator::new(&par, config.crs_seed.as_bytes())
            .generate(&participants, &elements)?;
        let evaluator = Evaluator::with_keys(&keys.evaluation_keys);
        let decryptor = CollectiveDecryptor::new(&par, config.smudging);
        let refresh_crs = Arc::new(Mutex::new(Refresher::reference_string(&config)));
        info!(
            "Federation of {} participants over {n_features} features is ready",
            participants.len()
        );
        Ok(Self {
            config: Arc::new(config),
            par,
            participants,
            keys,
            evaluator,
            decryptor,
            refresh_crs,
            n_features,
        })
    }

    /// The protocol constants.
    pub fn config(&self) -> &Arc<ProtocolConfig> {
        &self.config
    }

    /// The scheme parameters.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The participants.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub(crate) fn participants_mut(&mut self) -> &mut [Participant] {
        &mut self.participants
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The collective public key.
    pub fn public_key(&self) -> &Arc<PublicKey> {
        &self.keys.public_key
    }

    /// The collective evaluation keys.
    pub fn evaluation_keys(&self) -> &Arc<EvaluationKeySet> {
        &self.keys.evaluation_keys
    }

    /// The evaluator holding the collective evaluation keys.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// The collective decryptor.
    pub fn decryptor(&self) -> &CollectiveDecryptor {
        &self.decryptor
    }

    /// A refresh manager over the participants. All the managers of a
    /// federation draw from one reference string.
    pub fn refresher(&self) -> Result<Refresher<'_>> {
        Refresher::with_reference_string(
            &self.participants,
            &self.config,
            self.refresh_crs.clone(),
        )
    }

    /// Returns an error naming the first feature without a value at any
    /// participant.
    pub fn check_partition(&self) -> Result<()> {
        let counts = self
            .participants
            .iter()
            .map(Participant::local_counts)
            .collect::<Vec<_>>();
        match (0..self.n_features).find(|j| counts.iter().all(|c| c[*j] == 0)) {
            Some(feature) => Err(Error::InvalidPartition { feature }),
            None => Ok(()),
        }
    }

    /// Every participant computes a local vector with `local` and encrypts
    /// it under the collective public key.
    pub fn encrypt_local<F>(&self, local: F) -> Result<Vec<Ciphertext>>
    where
        F: Fn(&Participant) -> Result<Vec<f64>> + Sync,
    {
        self.participants
            .par_iter()
            .map(|p| {
                let values = zeroize::Zeroizing::new(local(p)?);
                p.encrypt(&values, &self.keys.public_key, &mut thread_rng())
            })
            .collect()
    }

    /// Sums the encryptions of the local vectors computed with `local`.
    pub fn encrypt_and_sum<F>(&self, local: F) -> Result<Ciphertext>
    where
        F: Fn(&Participant) -> Result<Vec<f64>> + Sync,
    {
        let cts = self.encrypt_local(local)?;
        Ok(self.evaluator.sum(&cts)?)
    }

    /// Reveals the per-feature lanes of a ciphertext.
    pub fn reveal(&self, ct: &Ciphertext) -> Result<Vec<f64>> {
        let mut values = self.decryptor.reveal(&self.participants, ct)?;
        values.truncate(self.n_features);
        Ok(values)
    }

    /// Global minimum and maximum of every feature.
    pub fn min_max(&self, factors: &NormalizationFactors) -> Result<Extrema> {
        MinMaxPipeline::new(self)?.run(factors)
    }

    /// Global mean and population variance of every feature.
    pub fn mean_variance(&self) -> Result<Moments> {
        MomentsPipeline::new(self)?.run()
    }

    /// Mean and standard deviation of every feature.
    pub fn z_score(&self) -> Result<ZScore> {
        MomentsPipeline::new(self)?.z_score()
    }

    /// Total number of values of every feature.
    pub fn total_counts(&mut self) -> Result<Vec<u64>> {
        OrderStatisticPipeline::new(self).total_counts()
    }

    /// Order statistics, one query per feature.
    pub fn order_statistics(&mut self, queries: &[FeatureQuery]) -> Result<OrderStatistics> {
        OrderStatisticPipeline::new(self).run(queries)
    }

    /// Order statistics searched between the global extrema of every
    /// feature, one target per feature.
    ///
    /// The extrema come from [`Federation::min_max`]; the search interval is
    /// widened by `epsilon` plus the comparison precision relative to the
    /// normalization factor.
    pub fn order_statistics_within_extrema(
        &mut self,
        targets: &[Target],
        factors: &NormalizationFactors,
        epsilon: f64,
    ) -> Result<OrderStatistics> {
        let extrema = self.min_max(factors)?;
        let queries = targets
            .iter()
            .zip(extrema.min.iter().zip(&extrema.max))
            .zip(factors.factors())
            .map(|((target, (min, max)), f)| {
                let margin = epsilon + Self::COMPARISON_PRECISION * f;
                FeatureQuery::new(*target, min - margin, max + margin, epsilon)
            })
            .collect::<Result<Vec<_>>>()?;
        self.order_statistics(&queries)
    }

    /// Median, quartiles and inter-quartile range of every feature, searched
    /// within per-feature `bounds`.
    pub fn robust_statistics(
        &mut self,
        bounds: &[(f64, f64)],
        epsilon: f64,
    ) -> Result<RobustStatistics> {
        OrderStatisticPipeline::new(self).robust_statistics(bounds, epsilon)
    }
}
