//! Order statistics through a lockstep bisection over encrypted counts.
//!
//! Every round, each unresolved feature has a midpoint `m` of its search
//! interval `[a, b]`. The participants count their local values strictly
//! below and strictly above `m`; only the sums of these counts over all the
//! participants are revealed. With `l` values below, `g` values above and
//! `M` values in total, the midpoint is the `k`-th smallest value when
//! `l <= k - 1` and `g <= M - k`. Otherwise the interval shrinks to `[a, m]`
//! when `l >= k` and to `[m, b]` otherwise, until it is narrower than the
//! tolerance of the feature.

use std::fmt;

use log::{debug, info, warn};
use rand::thread_rng;
use rayon::prelude::*;

use crate::{Error, Federation, Participant, Result};

/// The rank searched for in a feature, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    /// The `k`-th smallest value.
    Exact(usize),
    /// Any value between the `k`-th and the `k+1`-th smallest values.
    Interpolated(usize),
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Exact(k) => write!(f, "rank {k}"),
            Rank::Interpolated(k) => write!(f, "between ranks {k} and {}", k + 1),
        }
    }
}

impl Rank {
    /// The rank `k`.
    pub fn k(&self) -> usize {
        match self {
            Rank::Exact(k) | Rank::Interpolated(k) => *k,
        }
    }

    /// Checks that the rank exists among `total` values.
    pub fn validate(&self, feature: usize, total: u64) -> Result<()> {
        let k = self.k();
        let last = match self {
            Rank::Exact(_) => total,
            Rank::Interpolated(_) => total.saturating_sub(1),
        };
        if k == 0 || k as u64 > last {
            return Err(Error::InvalidRank {
                feature,
                rank: k,
                total,
            });
        }
        Ok(())
    }

    /// Whether a midpoint with `below` values strictly below it and `above`
    /// values strictly above it, among `total` values, has this rank.
    pub fn is_satisfied_by(&self, below: u64, above: u64, total: u64) -> bool {
        let k = self.k() as u64;
        match self {
            Rank::Exact(_) => below < k && above <= total.saturating_sub(k),
            Rank::Interpolated(_) => below <= k && above <= total.saturating_sub(k),
        }
    }
}

/// A percentile in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentile(f64);

impl Percentile {
    /// The median.
    pub const MEDIAN: Percentile = Percentile(50.0);

    /// The first quartile.
    pub const Q1: Percentile = Percentile(25.0);

    /// The third quartile.
    pub const Q3: Percentile = Percentile(75.0);

    /// Creates a percentile; `p` must lie in `[0, 100]`.
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&p) {
            return Err(Error::UnspecifiedInput(format!(
                "Percentile {p} is not in [0, 100]"
            )));
        }
        Ok(Self(p))
    }

    /// The percentile.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// The rank of the percentile among `total` values of `feature`.
    ///
    /// With `r = 1 + p (M - 1) / 100`, the rank is exact when `r` is an
    /// integer and interpolated between `floor(r)` and `floor(r) + 1`
    /// otherwise.
    pub fn rank(&self, feature: usize, total: u64) -> Result<Rank> {
        if total == 0 {
            return Err(Error::InvalidPartition { feature });
        }
        let r = 1.0 + self.0 * (total - 1) as f64 / 100.0;
        let k = r.floor() as usize;
        if r.fract() == 0.0 {
            Ok(Rank::Exact(k))
        } else {
            Ok(Rank::Interpolated(k))
        }
    }
}

/// What a query searches for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// A rank.
    Rank(Rank),
    /// A percentile, converted into a rank once the total count is known.
    Percentile(Percentile),
}

impl From<Rank> for Target {
    fn from(rank: Rank) -> Self {
        Target::Rank(rank)
    }
}

impl From<Percentile> for Target {
    fn from(p: Percentile) -> Self {
        Target::Percentile(p)
    }
}

impl Target {
    fn rank(&self, feature: usize, total: u64) -> Result<Rank> {
        match self {
            Target::Rank(rank) => Ok(*rank),
            Target::Percentile(p) => p.rank(feature, total),
        }
    }
}

/// The order statistic searched for in one feature: a target, the search
/// interval and the tolerance.
///
/// The interval must contain the searched values; otherwise the search ends
/// near one of its bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureQuery {
    /// The rank or percentile.
    pub target: Target,
    /// Lower bound of the search interval.
    pub lower: f64,
    /// Upper bound of the search interval.
    pub upper: f64,
    /// Width below which the search stops.
    pub epsilon: f64,
}

impl FeatureQuery {
    /// Extra rounds allowed past the rounds needed to narrow the interval.
    pub const ROUND_MARGIN: usize = 8;

    /// Creates a query.
    pub fn new<T: Into<Target>>(target: T, lower: f64, upper: f64, epsilon: f64) -> Result<Self> {
        let query = Self {
            target: target.into(),
            lower,
            upper,
            epsilon,
        };
        query.validate()?;
        Ok(query)
    }

    /// Checks the interval and the tolerance.
    pub fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.lower > self.upper {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid search interval [{}, {}]",
                self.lower, self.upper
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(Error::UnspecifiedInput(format!(
                "Tolerance must be positive, found {}",
                self.epsilon
            )));
        }
        Ok(())
    }

    /// The number of rounds after which the search has necessarily ended:
    /// `ceil(log2((upper - lower) / epsilon))` plus a margin.
    pub fn round_cap(&self) -> usize {
        let halvings = ((self.upper - self.lower) / self.epsilon).log2().ceil();
        halvings.max(0.0) as usize + Self::ROUND_MARGIN
    }
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A midpoint had the searched rank.
    Midpoint,
    /// The interval became narrower than the tolerance; the value is its
    /// center.
    Narrowed,
}

/// An order statistic of one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderStatistic {
    /// The value.
    pub value: f64,
    /// The rank it was searched for.
    pub rank: Rank,
    /// Number of rounds the feature took.
    pub rounds: usize,
    /// How the search ended.
    pub resolution: Resolution,
}

/// The order statistics of every feature.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatistics {
    /// One statistic per feature.
    pub statistics: Vec<OrderStatistic>,
    /// Number of rounds run.
    pub rounds: usize,
}

impl OrderStatistics {
    /// The values, one per feature.
    pub fn values(&self) -> Vec<f64> {
        self.statistics.iter().map(|s| s.value).collect()
    }
}

/// The bisection of one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BisectionState {
    feature: usize,
    rank: Rank,
    total: u64,
    lower: f64,
    upper: f64,
    epsilon: f64,
    rounds: usize,
    resolved: Option<(f64, Resolution)>,
}

impl BisectionState {
    /// Starts the search for `rank` among `total` values of `feature` within
    /// `[lower, upper]`.
    pub fn new(
        feature: usize,
        rank: Rank,
        total: u64,
        lower: f64,
        upper: f64,
        epsilon: f64,
    ) -> Result<Self> {
        if total == 0 {
            return Err(Error::InvalidPartition { feature });
        }
        rank.validate(feature, total)?;
        FeatureQuery::new(rank, lower, upper, epsilon)?;
        let mut state = Self {
            feature,
            rank,
            total,
            lower,
            upper,
            epsilon,
            rounds: 0,
            resolved: None,
        };
        state.check_width();
        Ok(state)
    }

    fn from_query(feature: usize, query: &FeatureQuery, total: u64) -> Result<Self> {
        if total == 0 {
            return Err(Error::InvalidPartition { feature });
        }
        let rank = query.target.rank(feature, total)?;
        Self::new(feature, rank, total, query.lower, query.upper, query.epsilon)
    }

    /// The feature searched.
    pub fn feature(&self) -> usize {
        self.feature
    }

    /// The rank searched.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The current search interval.
    pub fn interval(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// Number of rounds run.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Whether the search has ended.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The midpoint to test next, or `None` once the search has ended.
    pub fn midpoint(&self) -> Option<f64> {
        match self.resolved {
            Some(_) => None,
            None => Some(self.lower + (self.upper - self.lower) / 2.0),
        }
    }

    fn check_width(&mut self) {
        if self.resolved.is_none() && self.upper - self.lower <= self.epsilon {
            let value = self.lower + (self.upper - self.lower) / 2.0;
            warn!(
                "Feature {}: no midpoint has {}, returning {value} within {}",
                self.feature, self.rank, self.epsilon
            );
            self.resolved = Some((value, Resolution::Narrowed));
        }
    }

    /// Updates the search with the global counts of values strictly below
    /// and strictly above the last midpoint.
    pub fn update(&mut self, below: u64, above: u64) {
        let Some(m) = self.midpoint() else {
            return;
        };
        self.rounds += 1;
        if self.rank.is_satisfied_by(below, above, self.total) {
            self.resolved = Some((m, Resolution::Midpoint));
            return;
        }
        if below >= self.rank.k() as u64 {
            self.upper = m;
        } else {
            self.lower = m;
        }
        self.check_width();
    }

    /// The order statistic, once the search has ended.
    pub fn result(&self) -> Option<OrderStatistic> {
        self.resolved.map(|(value, resolution)| OrderStatistic {
            value,
            rank: self.rank,
            rounds: self.rounds,
            resolution,
        })
    }
}

/// Runs the bisection of every feature in lockstep.
///
/// The per-round counts live in each participant's scratch buffers, hence
/// the pipeline borrows the federation mutably.
pub struct OrderStatisticPipeline<'a> {
    federation: &'a mut Federation,
}

impl<'a> OrderStatisticPipeline<'a> {
    /// Creates the pipeline over a federation.
    pub fn new(federation: &'a mut Federation) -> Self {
        Self { federation }
    }

    /// Encrypts the count vectors of every participant, sums them
    /// position-wise and reveals the sums.
    fn reveal_counts<F>(&self, local: F) -> Result<Vec<Vec<u64>>>
    where
        F: Fn(&Participant) -> Vec<Vec<u64>> + Sync,
    {
        let fed = &*self.federation;
        let pk = fed.public_key();
        let cts = fed
            .participants()
            .par_iter()
            .map(|p| {
                let mut rng = thread_rng();
                local(p)
                    .iter()
                    .map(|counts| p.encrypt_counts(counts, pk, &mut rng))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let n = cts.first().map_or(0, Vec::len);
        let sums = (0..n)
            .map(|i| fed.evaluator().sum(cts.iter().map(|c| &c[i])))
            .collect::<fedstat_ckks::Result<Vec<_>>>()?;
        let sums = sums.iter().collect::<Vec<_>>();
        Ok(fed
            .decryptor()
            .reveal_many(fed.participants(), &sums)?
            .into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .take(fed.n_features())
                    .map(|v| v.round().max(0.0) as u64)
                    .collect()
            })
            .collect())
    }

    /// The total number of values of every feature.
    pub fn total_counts(&self) -> Result<Vec<u64>> {
        let totals = self
            .reveal_counts(|p| vec![p.local_counts()])?
            .pop()
            .unwrap_or_default();
        debug!("Total counts: {totals:?}");
        Ok(totals)
    }

    /// One round: local counts around the midpoints, then the revealed
    /// global counts.
    fn round(&mut self, midpoints: &[Option<f64>]) -> Result<(Vec<u64>, Vec<u64>)> {
        self.federation
            .participants_mut()
            .par_iter_mut()
            .try_for_each(|p| p.count_around(midpoints).map(|_| ()))?;
        let mut counts = self
            .reveal_counts(|p| vec![p.scratch().below().to_vec(), p.scratch().above().to_vec()])?
            .into_iter();
        let below = counts.next().unwrap_or_default();
        let above = counts.next().unwrap_or_default();
        Ok((below, above))
    }

    /// Searches the order statistic of every feature, one query per
    /// feature.
    pub fn run(&mut self, queries: &[FeatureQuery]) -> Result<OrderStatistics> {
        let n_features = self.federation.n_features();
        if queries.len() != n_features {
            return Err(Error::UnspecifiedInput(format!(
                "Expected {n_features} queries, found {}",
                queries.len()
            )));
        }
        queries.iter().try_for_each(FeatureQuery::validate)?;
        self.federation.check_partition()?;

        let totals = self.total_counts()?;
        let mut states = queries
            .iter()
            .zip(&totals)
            .enumerate()
            .map(|(j, (query, total))| BisectionState::from_query(j, query, *total))
            .collect::<Result<Vec<_>>>()?;
        let cap = queries
            .iter()
            .map(FeatureQuery::round_cap)
            .max()
            .unwrap_or_default()
            .min(self.federation.config().max_bisection_rounds);

        let mut rounds = 0;
        while let Some(unresolved) = states.iter().find(|s| !s.is_resolved()) {
            if rounds == cap {
                return Err(Error::NonTerminatingBisection {
                    feature: unresolved.feature(),
                    rounds,
                });
            }
            rounds += 1;
            let midpoints = states.iter().map(BisectionState::midpoint).collect::<Vec<_>>();
            let (below, above) = self.round(&midpoints).map_err(|e| e.in_round(rounds))?;
            for (state, (l, g)) in states.iter_mut().zip(below.into_iter().zip(above)) {
                state.update(l, g);
            }
            debug!(
                "Round {rounds}: {} of {n_features} features unresolved",
                states.iter().filter(|s| !s.is_resolved()).count()
            );
        }

        let statistics = states
            .iter()
            .filter_map(BisectionState::result)
            .collect::<Vec<_>>();
        info!("Resolved {} order statistics in {rounds} rounds", statistics.len());
        Ok(OrderStatistics { statistics, rounds })
    }
}

#[cfg(test)]
mod tests {
    use super::{BisectionState, FeatureQuery, Percentile, Rank, Resolution};
    use crate::federation::tests::federation;
    use crate::reference;
    use crate::{Error, ProtocolConfig};
    use proptest::collection::vec as any_vec;
    use proptest::prelude::*;

    /// Runs a bisection on plaintext counts.
    fn bisect(values: &[f64], rank: Rank, lower: f64, upper: f64, epsilon: f64) -> BisectionState {
        let mut state =
            BisectionState::new(0, rank, values.len() as u64, lower, upper, epsilon).unwrap();
        let mut width = upper - lower;
        while let Some(m) = state.midpoint() {
            let below = values.iter().filter(|v| **v < m).count() as u64;
            let above = values.iter().filter(|v| **v > m).count() as u64;
            state.update(below, above);
            let (a, b) = state.interval();
            if !state.is_resolved() {
                assert_eq!(b - a, width / 2.0);
            }
            width = b - a;
        }
        state
    }

    fn scenario() -> Vec<Vec<Vec<f64>>> {
        vec![
            vec![vec![-1.0, 0.3]],
            vec![vec![0.7, 1.5]],
            vec![vec![-0.4, 0.9]],
            vec![vec![1.1, 0.2]],
        ]
    }

    #[test]
    fn exact_rank_over_encrypted_counts() {
        let mut fed = federation(scenario(), ProtocolConfig::default());
        assert_eq!(fed.total_counts().unwrap(), vec![8]);
        let query = FeatureQuery::new(Rank::Exact(4), -2.0, 2.0, 1e-6).unwrap();
        let result = fed.order_statistics(&[query]).unwrap();
        let statistic = result.statistics[0];
        assert!((statistic.value - 0.3).abs() <= 1e-6, "{statistic:?}");
        assert!(result.rounds <= query.round_cap());
        assert_eq!(statistic.rounds, result.rounds);
    }

    #[test]
    fn interpolated_rank_over_encrypted_counts() {
        let mut fed = federation(scenario(), ProtocolConfig::default());
        let query = FeatureQuery::new(Rank::Interpolated(4), -2.0, 2.0, 1e-6).unwrap();
        let statistic = fed.order_statistics(&[query]).unwrap().statistics[0];
        assert_eq!(statistic.value, 0.5);
        assert_eq!(statistic.resolution, Resolution::Midpoint);
        assert_eq!(statistic.rounds, 3);

        let values = scenario().concat().concat();
        let below = values.iter().filter(|v| **v < statistic.value).count();
        let above = values.iter().filter(|v| **v > statistic.value).count();
        assert!(below <= 4 && above <= 4);
    }

    #[test]
    fn several_features_in_lockstep() {
        let mut fed = federation(
            vec![
                vec![vec![3.0, 1.0], vec![100.0], vec![]],
                vec![vec![2.0], vec![-50.0, 25.0], vec![7.0]],
            ],
            ProtocolConfig::default(),
        );
        let queries = [
            FeatureQuery::new(Percentile::MEDIAN, 0.0, 4.0, 1e-3).unwrap(),
            FeatureQuery::new(Rank::Exact(3), -128.0, 128.0, 1e-3).unwrap(),
            FeatureQuery::new(Rank::Exact(1), 0.0, 10.0, 1e-3).unwrap(),
        ];
        let result = fed.order_statistics(&queries).unwrap();
        let values = result.values();
        assert!((values[0] - 2.0).abs() <= 1e-3, "{values:?}");
        assert!((values[1] - 100.0).abs() <= 1e-3, "{values:?}");
        assert!((values[2] - 7.0).abs() <= 1e-3, "{values:?}");
        assert_eq!(
            result.rounds,
            result.statistics.iter().map(|s| s.rounds).max().unwrap()
        );
    }

    #[test]
    fn invalid_queries() {
        let mut fed = federation(
            vec![vec![vec![1.0, 2.0], vec![]], vec![vec![3.0], vec![]]],
            ProtocolConfig::default(),
        );
        let ok = FeatureQuery::new(Rank::Exact(1), 0.0, 4.0, 1e-3).unwrap();
        assert_eq!(
            fed.order_statistics(&[ok, ok]),
            Err(Error::InvalidPartition { feature: 1 })
        );
        assert!(matches!(
            fed.order_statistics(&[ok]),
            Err(Error::UnspecifiedInput(_))
        ));

        let mut fed = federation(
            vec![vec![vec![1.0, 2.0]], vec![vec![3.0]]],
            ProtocolConfig::default(),
        );
        let too_large = FeatureQuery::new(Rank::Exact(4), 0.0, 4.0, 1e-3).unwrap();
        assert_eq!(
            fed.order_statistics(&[too_large]),
            Err(Error::InvalidRank {
                feature: 0,
                rank: 4,
                total: 3
            })
        );
        let last = FeatureQuery::new(Rank::Interpolated(3), 0.0, 4.0, 1e-3).unwrap();
        assert!(matches!(
            fed.order_statistics(&[last]),
            Err(Error::InvalidRank { rank: 3, .. })
        ));

        assert!(FeatureQuery::new(Rank::Exact(1), 1.0, 0.0, 1e-3).is_err());
        assert!(FeatureQuery::new(Rank::Exact(1), 0.0, 1.0, 0.0).is_err());
        assert!(FeatureQuery::new(Rank::Exact(1), 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn round_cap_bounds_the_search() {
        let config = ProtocolConfig {
            max_bisection_rounds: 5,
            ..ProtocolConfig::default()
        };
        let mut fed = federation(scenario(), config);
        let query = FeatureQuery::new(Rank::Exact(4), -2.0, 2.0, 1e-6).unwrap();
        assert_eq!(
            fed.order_statistics(&[query]),
            Err(Error::NonTerminatingBisection {
                feature: 0,
                rounds: 5
            })
        );
        assert_eq!(query.round_cap(), 22 + FeatureQuery::ROUND_MARGIN);
    }

    #[test]
    fn percentile_ranks() {
        let rank = |p: f64, total| Percentile::new(p).unwrap().rank(0, total).unwrap();
        assert_eq!(rank(50.0, 8), Rank::Interpolated(4));
        assert_eq!(rank(50.0, 9), Rank::Exact(5));
        assert_eq!(rank(25.0, 9), Rank::Exact(3));
        assert_eq!(rank(75.0, 8), Rank::Interpolated(6));
        assert_eq!(rank(0.0, 8), Rank::Exact(1));
        assert_eq!(rank(100.0, 8), Rank::Exact(8));
        assert_eq!(rank(10.0, 11), Rank::Exact(2));
        assert_eq!(rank(50.0, 1), Rank::Exact(1));
        assert_eq!(
            Percentile::MEDIAN.rank(2, 0),
            Err(Error::InvalidPartition { feature: 2 })
        );
        assert!(Percentile::new(100.5).is_err());
        assert!(Percentile::new(f64::NAN).is_err());
    }

    #[test]
    fn rank_validation() {
        assert!(Rank::Exact(1).validate(0, 1).is_ok());
        assert!(Rank::Exact(0).validate(0, 1).is_err());
        assert!(Rank::Exact(2).validate(0, 1).is_err());
        assert!(Rank::Interpolated(1).validate(0, 2).is_ok());
        assert!(Rank::Interpolated(1).validate(0, 1).is_err());
        assert!(BisectionState::new(3, Rank::Exact(1), 0, 0.0, 1.0, 0.1).is_err());
    }

    #[test]
    fn ties_resolve_at_the_midpoint() {
        let values = [0.0, 0.0, 0.0, 5.0];
        let state = bisect(&values, Rank::Exact(2), -4.0, 4.0, 1e-9);
        let statistic = state.result().unwrap();
        assert_eq!(statistic.value, 0.0);
        assert_eq!(statistic.resolution, Resolution::Midpoint);
        assert_eq!(statistic.rounds, 1);
    }

    #[test]
    fn narrow_intervals_resolve_immediately() {
        let state = BisectionState::new(0, Rank::Exact(1), 3, 1.0, 1.0, 0.5).unwrap();
        assert!(state.is_resolved());
        assert_eq!(state.midpoint(), None);
        assert_eq!(state.result().unwrap().value, 1.0);
        assert_eq!(state.result().unwrap().rounds, 0);
    }

    proptest! {
        #[test]
        fn exact_ranks_match_the_sorted_values(
            values in any_vec(-1000.0f64..1000.0, 1..40),
            k in any::<prop::sample::Index>(),
        ) {
            let k = k.index(values.len()) + 1;
            let expected = reference::kth_smallest(&values, k).unwrap();
            let state = bisect(&values, Rank::Exact(k), -1024.0, 1024.0, 1e-6);
            let statistic = state.result().unwrap();
            prop_assert!((statistic.value - expected).abs() <= 1e-6);
            prop_assert!(statistic.rounds <= FeatureQuery::new(Rank::Exact(k), -1024.0, 1024.0, 1e-6).unwrap().round_cap());
        }

        #[test]
        fn interpolated_ranks_lie_between_neighbours(
            values in any_vec(-1000.0f64..1000.0, 2..40),
            k in any::<prop::sample::Index>(),
        ) {
            let k = k.index(values.len() - 1) + 1;
            let low = reference::kth_smallest(&values, k).unwrap();
            let high = reference::kth_smallest(&values, k + 1).unwrap();
            let state = bisect(&values, Rank::Interpolated(k), -1024.0, 1024.0, 1e-6);
            let value = state.result().unwrap().value;
            prop_assert!(value >= low - 1e-6 && value <= high + 1e-6);
        }
    }
}
