//! Global mean and variance through an encrypted inverse of the counts.

use fedstat_ckks::ckks::{Ciphertext, InverseEvaluator};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{Error, Federation, Participant, Refresher, Result};

/// The global mean and population variance of every feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    /// Mean of every feature.
    pub mean: Vec<f64>,
    /// Population variance of every feature.
    pub variance: Vec<f64>,
}

impl Moments {
    /// Standard deviation of every feature.
    pub fn std_dev(&self) -> Vec<f64> {
        self.variance.iter().map(|v| v.max(0.0).sqrt()).collect()
    }
}

/// Parameters of the z-score normalization `(x - mean) / std_dev`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScore {
    /// Mean of every feature.
    pub mean: Vec<f64>,
    /// Standard deviation of every feature.
    pub std_dev: Vec<f64>,
}

impl From<Moments> for ZScore {
    fn from(moments: Moments) -> Self {
        Self {
            std_dev: moments.std_dev(),
            mean: moments.mean,
        }
    }
}

impl ZScore {
    /// Normalizes a row with one value per feature. A feature with zero
    /// standard deviation normalizes to zero.
    pub fn normalize(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(Error::UnspecifiedInput(format!(
                "Expected {} values, found {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std_dev))
            .map(|(x, (mean, std_dev))| {
                if *std_dev > 0.0 {
                    (x - mean) / std_dev
                } else {
                    0.0
                }
            })
            .collect())
    }
}

/// Computes the global mean and population variance of every feature.
///
/// The sums and the counts are aggregated under encryption; the counts are
/// inverted homomorphically, so that neither the totals nor the counts are
/// ever revealed. The mean is revealed before the second pass, in which the
/// participants encrypt their local squared deviations from it.
pub struct MomentsPipeline<'a> {
    federation: &'a Federation,
    refresher: Refresher<'a>,
}

impl<'a> MomentsPipeline<'a> {
    /// Creates the pipeline over a federation.
    pub fn new(federation: &'a Federation) -> Result<Self> {
        Ok(Self {
            refresher: federation.refresher()?,
            federation,
        })
    }

    /// Encryption of `1 / M_j` for the total count `M_j` of every feature.
    /// The lanes past the features hold 1.
    pub fn inverse_counts(&self) -> Result<Ciphertext> {
        let fed = self.federation;
        let eval = fed.evaluator();
        let counts = fed.encrypt_and_sum(|p| {
            Ok(p.local_counts().into_iter().map(|c| c as f64).collect())
        })?;

        // Unused lanes are zero, which lies outside the inversion domain.
        let n_features = fed.n_features();
        let padding = (0..fed.parameters().slots())
            .map(|i| if i < n_features { 0.0 } else { 1.0 })
            .collect::<Vec<_>>();
        let counts = eval.add_const(&counts, &padding)?;

        let config = fed.config();
        let inverse = InverseEvaluator::new(eval, &self.refresher)?.evaluate_positive_domain(
            &counts,
            config.inverse_log_min,
            config.inverse_log_max,
        )?;
        self.refresher.refresh(&inverse)
    }

    /// Encryption of the per-feature averages of the local vectors computed
    /// with `local`, given the inverse counts.
    fn average<F>(&self, inverse: &Ciphertext, local: F) -> Result<Ciphertext>
    where
        F: Fn(&Participant) -> Result<Vec<f64>> + Sync,
    {
        let eval = self.federation.evaluator();
        let total = self.federation.encrypt_and_sum(local)?;
        Ok(eval.rescale(eval.mul_relin(&total, inverse)?)?)
    }

    /// Encryption of the mean of every feature.
    pub fn mean_encrypted(&self, inverse: &Ciphertext) -> Result<Ciphertext> {
        self.average(inverse, |p| Ok(p.local_sums()))
    }

    /// Encryption of the population variance of every feature around
    /// `mean`.
    pub fn variance_encrypted(&self, inverse: &Ciphertext, mean: &[f64]) -> Result<Ciphertext> {
        self.average(inverse, |p| p.local_squared_deviations(mean))
    }

    /// Computes and reveals the mean and the population variance.
    pub fn run(&self) -> Result<Moments> {
        self.federation.check_partition()?;
        let inverse = self.inverse_counts()?;
        let mean = self.federation.reveal(&self.mean_encrypted(&inverse)?)?;
        info!("Revealed the mean of {} features", mean.len());
        let variance = self
            .federation
            .reveal(&self.variance_encrypted(&inverse, &mean)?)?
            .into_iter()
            .map(|v| v.max(0.0))
            .collect();
        info!("Revealed the variance of {} features", mean.len());
        Ok(Moments { mean, variance })
    }

    /// Computes the z-score normalization parameters.
    pub fn z_score(&self) -> Result<ZScore> {
        self.run().map(ZScore::from)
    }
}

#[cfg(test)]
mod tests {
    use super::{MomentsPipeline, ZScore};
    use crate::federation::tests::federation;
    use crate::reference;
    use crate::{Error, ProtocolConfig};
    use fedstat_traits::FheCiphertext;

    fn narrow() -> ProtocolConfig {
        ProtocolConfig {
            inverse_log_min: -2.0,
            inverse_log_max: 6.0,
            ..ProtocolConfig::default()
        }
    }

    fn data() -> Vec<Vec<Vec<f64>>> {
        vec![
            vec![vec![-1.0, 0.3], vec![10.0]],
            vec![vec![0.7, 1.5], vec![]],
            vec![vec![-0.4, 0.9], vec![14.0, 12.0]],
            vec![vec![1.1, 0.2], vec![]],
        ]
    }

    fn expected(feature: usize) -> Vec<f64> {
        data()
            .into_iter()
            .flat_map(|p| p[feature].clone())
            .collect()
    }

    #[test]
    fn mean_and_variance() {
        let fed = federation(data(), narrow());
        let moments = fed.mean_variance().unwrap();
        for j in 0..2 {
            let values = expected(j);
            let mean = reference::mean(&values).unwrap();
            let variance = reference::population_variance(&values).unwrap();
            assert!((moments.mean[j] - mean).abs() < 1e-4, "{moments:?}");
            assert!((moments.variance[j] - variance).abs() < 1e-4, "{moments:?}");
        }
        assert!((moments.mean[0] - 0.4125).abs() < 1e-4);
        assert!((moments.mean[1] - 12.0).abs() < 1e-4);
    }

    #[test]
    fn mean_with_the_default_inversion_domain() {
        let fed = federation(data(), ProtocolConfig::default());
        let pipeline = MomentsPipeline::new(&fed).unwrap();
        let inverse = pipeline.inverse_counts().unwrap();
        assert_eq!(inverse.level(), fed.parameters().max_level());
        let mean = fed.reveal(&pipeline.mean_encrypted(&inverse).unwrap()).unwrap();
        assert!((mean[0] - 0.4125).abs() < 1e-3, "{mean:?}");
        assert!((mean[1] - 12.0).abs() < 1e-2, "{mean:?}");
    }

    #[test]
    fn z_score_normalization() {
        let fed = federation(data(), narrow());
        let z = fed.z_score().unwrap();
        let values = expected(1);
        let std_dev = reference::population_variance(&values).unwrap().sqrt();
        assert!((z.std_dev[1] - std_dev).abs() < 1e-3, "{z:?}");

        let exact = ZScore {
            mean: vec![0.0, 12.0],
            std_dev: vec![0.0, 2.0],
        };
        assert_eq!(exact.normalize(&[5.0, 16.0]).unwrap(), vec![0.0, 2.0]);
        assert!(exact.normalize(&[5.0]).is_err());
    }

    #[test]
    fn empty_feature() {
        let fed = federation(
            vec![vec![vec![1.0], vec![]], vec![vec![2.0], vec![]]],
            narrow(),
        );
        assert_eq!(
            fed.mean_variance(),
            Err(Error::InvalidPartition { feature: 1 })
        );
    }
}
