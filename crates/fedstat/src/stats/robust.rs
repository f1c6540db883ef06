//! Robust scaling: median and inter-quartile range.

use log::info;
use serde::{Deserialize, Serialize};

use super::order::{FeatureQuery, OrderStatisticPipeline, Percentile};
use crate::{Error, Result};

/// The median, the quartiles and the inter-quartile range of every feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustStatistics {
    /// Median of every feature.
    pub median: Vec<f64>,
    /// First quartile of every feature.
    pub q1: Vec<f64>,
    /// Third quartile of every feature.
    pub q3: Vec<f64>,
    /// Inter-quartile range `q3 - q1` of every feature.
    pub iqr: Vec<f64>,
}

impl RobustStatistics {
    /// Scales a row with one value per feature to `(x - median) / iqr`. A
    /// feature with an empty inter-quartile range is only centered.
    pub fn scale(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.median.len() {
            return Err(Error::UnspecifiedInput(format!(
                "Expected {} values, found {}",
                self.median.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.median.iter().zip(&self.iqr))
            .map(|(x, (median, iqr))| {
                if *iqr > 0.0 {
                    (x - median) / iqr
                } else {
                    x - median
                }
            })
            .collect())
    }
}

impl OrderStatisticPipeline<'_> {
    /// Searches the median and the quartiles of every feature within
    /// per-feature `bounds`, with tolerance `epsilon`.
    pub fn robust_statistics(
        &mut self,
        bounds: &[(f64, f64)],
        epsilon: f64,
    ) -> Result<RobustStatistics> {
        let mut quantile = |p: Percentile| -> Result<Vec<f64>> {
            let queries = bounds
                .iter()
                .map(|(lower, upper)| FeatureQuery::new(p, *lower, *upper, epsilon))
                .collect::<Result<Vec<_>>>()?;
            Ok(self.run(&queries)?.values())
        };
        let median = quantile(Percentile::MEDIAN)?;
        let q1 = quantile(Percentile::Q1)?;
        let q3 = quantile(Percentile::Q3)?;
        let iqr = q3
            .iter()
            .zip(&q1)
            .map(|(q3, q1)| (q3 - q1).max(0.0))
            .collect();
        info!("Computed the robust statistics of {} features", median.len());
        Ok(RobustStatistics {
            median,
            q1,
            q3,
            iqr,
        })
    }
}
