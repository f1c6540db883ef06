//! Global minimum and maximum through encrypted comparisons.

use fedstat_ckks::ckks::{Ciphertext, ComparisonEvaluator};
use log::{debug, info};
use rand::thread_rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Error, Federation, Refresher, Result};

/// Per-feature normalization factors.
///
/// Every value `x` of feature `j` must satisfy `|x| <= f_j`, so that the
/// normalized values `x / f_j` lie in `[-1, 1]`, the domain of the sign
/// polynomial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationFactors(Vec<f64>);

impl NormalizationFactors {
    /// Creates normalization factors; every factor must be positive and
    /// finite.
    pub fn new(factors: Vec<f64>) -> Result<Self> {
        if factors.is_empty() {
            return Err(Error::UnspecifiedInput(
                "No normalization factor".to_string(),
            ));
        }
        if let Some(j) = factors.iter().position(|f| !f.is_finite() || *f <= 0.0) {
            return Err(Error::UnspecifiedInput(format!(
                "Normalization factor of feature {j} must be positive and finite"
            )));
        }
        Ok(Self(factors))
    }

    /// The same factor for `n_features` features.
    pub fn uniform(factor: f64, n_features: usize) -> Result<Self> {
        Self::new(vec![factor; n_features])
    }

    /// The factors.
    pub fn factors(&self) -> &[f64] {
        &self.0
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: there is at least one factor.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn inverses(&self) -> Vec<f64> {
        self.0.iter().map(|f| 1.0 / f).collect()
    }

    fn negated(&self) -> Vec<f64> {
        self.0.iter().map(|f| -f).collect()
    }
}

/// The global minimum and maximum of every feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    /// Minimum of every feature.
    pub min: Vec<f64>,
    /// Maximum of every feature.
    pub max: Vec<f64>,
}

/// Encryptions of the global minimum and maximum, in the units of the data.
#[derive(Debug, Clone)]
pub struct EncryptedExtrema {
    /// Encryption of the minimum of every feature.
    pub min: Ciphertext,
    /// Encryption of the maximum of every feature.
    pub max: Ciphertext,
}

/// Computes the global minimum and maximum of every feature.
///
/// Each participant encrypts its local extrema, using `+f_j` and `-f_j` in
/// place of the minimum and maximum of a feature it holds no value of. The
/// candidates are normalized into `[-1, 1]`, folded pairwise with the
/// encrypted comparison, refreshed after every fold, and scaled back.
pub struct MinMaxPipeline<'a> {
    federation: &'a Federation,
    refresher: Refresher<'a>,
}

impl<'a> MinMaxPipeline<'a> {
    /// Creates the pipeline over a federation.
    pub fn new(federation: &'a Federation) -> Result<Self> {
        Ok(Self {
            refresher: federation.refresher()?,
            federation,
        })
    }

    fn check_factors(&self, factors: &NormalizationFactors) -> Result<()> {
        let n_features = self.federation.n_features();
        if factors.len() != n_features {
            return Err(Error::UnspecifiedInput(format!(
                "Expected {n_features} normalization factors, found {}",
                factors.len()
            )));
        }
        Ok(())
    }

    /// Local extrema of a participant, checked against the factors.
    fn candidates(
        &self,
        factors: &NormalizationFactors,
    ) -> Result<Vec<(Ciphertext, Ciphertext)>> {
        let pk = self.federation.public_key();
        self.federation
            .participants()
            .par_iter()
            .map(|p| {
                let min = p.local_minimums(factors.factors())?;
                let max = p.local_maximums(&factors.negated())?;
                for (j, f) in factors.factors().iter().enumerate() {
                    if min[j] < -f || max[j] > *f {
                        return Err(Error::UnspecifiedInput(format!(
                            "Participant {} holds a value of feature {j} outside [-{f}, {f}]",
                            p.id()
                        )));
                    }
                }
                let mut rng = thread_rng();
                Ok((p.encrypt(&min, pk, &mut rng)?, p.encrypt(&max, pk, &mut rng)?))
            })
            .collect()
    }

    fn scale(&self, ct: &Ciphertext, factors: &[f64]) -> Result<Ciphertext> {
        let eval = self.federation.evaluator();
        Ok(eval.rescale(eval.mul_const(ct, factors)?)?)
    }

    /// Computes encryptions of the global extrema.
    pub fn run_encrypted(&self, factors: &NormalizationFactors) -> Result<EncryptedExtrema> {
        self.check_factors(factors)?;
        self.federation.check_partition()?;

        let inverses = factors.inverses();
        let (mins, maxs): (Vec<_>, Vec<_>) = self
            .candidates(factors)?
            .into_iter()
            .map(|(min, max)| Ok((self.scale(&min, &inverses)?, self.scale(&max, &inverses)?)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();
        info!("Collected {} pairs of local extrema", mins.len());

        let comparison = ComparisonEvaluator::new(
            self.federation.evaluator(),
            &self.refresher,
            self.federation.config().sign_polynomial(),
        )?;

        let mut min = mins[0].clone();
        let mut max = maxs[0].clone();
        for (i, (next_min, next_max)) in mins.iter().zip(&maxs).enumerate().skip(1) {
            min = self.refresher.refresh(&comparison.min(&min, next_min)?)?;
            max = self.refresher.refresh(&comparison.max(&max, next_max)?)?;
            debug!("Folded the extrema of participant {i}");
        }

        Ok(EncryptedExtrema {
            min: self.scale(&min, factors.factors())?,
            max: self.scale(&max, factors.factors())?,
        })
    }

    /// Computes and reveals the global extrema.
    pub fn run(&self, factors: &NormalizationFactors) -> Result<Extrema> {
        let extrema = self.run_encrypted(factors)?;
        let mut revealed = self
            .federation
            .decryptor()
            .reveal_many(self.federation.participants(), &[&extrema.min, &extrema.max])?
            .into_iter()
            .map(|mut values| {
                values.truncate(self.federation.n_features());
                values
            });
        let min = revealed.next().unwrap_or_default();
        let max = revealed.next().unwrap_or_default();
        info!("Revealed the extrema of {} features", min.len());
        Ok(Extrema { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::{MinMaxPipeline, NormalizationFactors};
    use crate::federation::tests::federation;
    use crate::{Error, ProtocolConfig};

    fn close(a: &[f64], b: &[f64], tolerance: f64) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tolerance)
    }

    #[test]
    fn extrema_of_three_participants() {
        let fed = federation(
            vec![vec![vec![1.0]], vec![vec![5.0]], vec![vec![9.0]]],
            ProtocolConfig::default(),
        );
        let factors = NormalizationFactors::uniform(10.0, 1).unwrap();
        let extrema = fed.min_max(&factors).unwrap();
        assert!(close(&extrema.min, &[1.0], 1e-3), "{extrema:?}");
        assert!(close(&extrema.max, &[9.0], 1e-3), "{extrema:?}");
    }

    #[test]
    fn participants_without_values_do_not_count() {
        let fed = federation(
            vec![
                vec![vec![-3.0, 2.0], vec![]],
                vec![vec![], vec![40.0, 12.5]],
                vec![vec![0.5], vec![-20.0]],
            ],
            ProtocolConfig::default(),
        );
        let factors = NormalizationFactors::new(vec![4.0, 50.0]).unwrap();
        let extrema = fed.min_max(&factors).unwrap();
        assert!(close(&extrema.min, &[-3.0, -20.0], 1e-2), "{extrema:?}");
        assert!(close(&extrema.max, &[2.0, 40.0], 1e-2), "{extrema:?}");
    }

    #[test]
    fn single_participant() {
        let fed = federation(vec![vec![vec![0.25, -0.75, 0.5]]], ProtocolConfig::default());
        let pipeline = MinMaxPipeline::new(&fed).unwrap();
        let factors = NormalizationFactors::uniform(1.0, 1).unwrap();
        let extrema = pipeline.run(&factors).unwrap();
        assert!(close(&extrema.min, &[-0.75], 1e-6));
        assert!(close(&extrema.max, &[0.5], 1e-6));
    }

    #[test]
    fn invalid_inputs() {
        let fed = federation(
            vec![vec![vec![1.0], vec![]], vec![vec![12.0], vec![]]],
            ProtocolConfig::default(),
        );
        let pipeline = MinMaxPipeline::new(&fed).unwrap();
        let two = NormalizationFactors::uniform(20.0, 2).unwrap();
        assert_eq!(
            pipeline.run(&two),
            Err(Error::InvalidPartition { feature: 1 })
        );
        assert!(matches!(
            pipeline.run(&NormalizationFactors::uniform(20.0, 1).unwrap()),
            Err(Error::UnspecifiedInput(_))
        ));

        let fed = federation(
            vec![vec![vec![1.0]], vec![vec![12.0]]],
            ProtocolConfig::default(),
        );
        let pipeline = MinMaxPipeline::new(&fed).unwrap();
        assert!(matches!(
            pipeline.run(&NormalizationFactors::uniform(10.0, 1).unwrap()),
            Err(Error::UnspecifiedInput(_))
        ));

        assert!(NormalizationFactors::new(vec![]).is_err());
        assert!(NormalizationFactors::new(vec![1.0, 0.0]).is_err());
        assert!(NormalizationFactors::new(vec![f64::INFINITY]).is_err());
    }
}
