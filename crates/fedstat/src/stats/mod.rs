//! The statistic pipelines.
//!
//! Every pipeline borrows a [`crate::Federation`]: it reads the shared
//! configuration and collective keys, and runs the participants' local
//! computations, the homomorphic aggregation and the collective protocols.

mod minmax;
mod moments;
mod order;
mod robust;

pub use minmax::{EncryptedExtrema, Extrema, MinMaxPipeline, NormalizationFactors};
pub use moments::{Moments, MomentsPipeline, ZScore};
pub use order::{
    BisectionState, FeatureQuery, OrderStatistic, OrderStatisticPipeline, OrderStatistics,
    Percentile, Rank, Resolution, Target,
};
pub use robust::RobustStatistics;
