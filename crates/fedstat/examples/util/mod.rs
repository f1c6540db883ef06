//! Utility functions for the demos.

use std::{fmt, time::Duration};

use fedstat::{Participant, ProtocolConfig};
use fedstat_ckks::ckks::CkksParameters;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{distributions::Uniform, prelude::Distribution, thread_rng};
use std::sync::Arc;

/// Macros to time code and display a human-readable duration.
pub mod timeit {
    #[allow(unused_macros)]
    macro_rules! timeit_n {
        ($name:expr, $loops:expr, $code:expr) => {{
            use util::DisplayDuration;
            let start = std::time::Instant::now();
            let r = $code;
            for _ in 1..$loops {
                let _ = $code;
            }
            println!(
                "⏱  {}: {}",
                $name,
                DisplayDuration(start.elapsed() / $loops)
            );
            r
        }};
    }

    #[allow(unused_macros)]
    macro_rules! timeit {
        ($name:expr, $code:expr) => {{
            use util::DisplayDuration;
            let start = std::time::Instant::now();
            let r = $code;
            println!("⏱  {}: {}", $name, DisplayDuration(start.elapsed()));
            r
        }};
    }

    #[allow(unused_imports)]
    pub(crate) use timeit;
    #[allow(unused_imports)]
    pub(crate) use timeit_n;
}

/// Utility struct for displaying human-readable duration of the form "10.5
/// ms", "350 μs", or "27 ns".
pub struct DisplayDuration(pub Duration);

impl fmt::Display for DisplayDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration_ns = self.0.as_nanos();
        if duration_ns < 1_000_u128 {
            write!(f, "{duration_ns} ns")
        } else if duration_ns < 1_000_000_u128 {
            write!(f, "{} μs", (duration_ns + 500) / 1_000)
        } else if duration_ns < 1_000_000_000_u128 {
            let duration_ms_times_10 = (duration_ns + 50_000) / (100_000);
            write!(f, "{} ms", (duration_ms_times_10 as f64) / 10.0)
        } else {
            let duration_s_times_10 = (duration_ns + 50_000_000) / (100_000_000);
            write!(f, "{} s", (duration_s_times_10 as f64) / 10.0)
        }
    }
}

/// Parses a `--name=<value>` argument.
#[allow(dead_code)]
pub fn parse_value<T: std::str::FromStr>(arg: &str, name: &str) -> Option<T> {
    let parts: Vec<&str> = arg.rsplit('=').collect();
    if parts.len() != 2 || parts[1] != name {
        return None;
    }
    parts[0].parse::<T>().ok()
}

/// Generates the rows of `num_participants` participants: `rows` uniform
/// values in `[low, high)` for each of `num_features` features.
#[allow(dead_code)]
pub fn random_data(
    num_participants: usize,
    num_features: usize,
    rows: usize,
    (low, high): (f64, f64),
) -> Vec<Vec<Vec<f64>>> {
    let bar = ProgressBar::new(num_participants as u64);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>12} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_prefix("Data");
    let dist = Uniform::new(low, high);
    let data = (0..num_participants)
        .map(|_| {
            let features = (0..num_features)
                .map(|_| dist.sample_iter(&mut thread_rng()).take(rows).collect())
                .collect();
            bar.inc(1);
            features
        })
        .collect();
    bar.finish_and_clear();
    data
}

/// Creates one participant per entry of `data`.
#[allow(dead_code)]
pub fn participants(
    par: &Arc<CkksParameters>,
    data: &[Vec<Vec<f64>>],
) -> Result<Vec<Participant>, fedstat::Error> {
    data.iter()
        .enumerate()
        .map(|(id, features)| Participant::new(id, par, features.clone(), &mut thread_rng()))
        .collect()
}

/// The values of feature `j` of every participant, pooled and sorted.
#[allow(dead_code)]
pub fn pooled(data: &[Vec<Vec<f64>>], j: usize) -> Vec<f64> {
    let parts = data.iter().map(|p| p[j].as_slice()).collect::<Vec<_>>();
    fedstat::reference::sorted_union(&parts)
}

/// The protocol constants of the demos.
#[allow(dead_code)]
pub fn demo_config(inverse_log_max: f64) -> ProtocolConfig {
    ProtocolConfig {
        inverse_log_min: -1.0,
        inverse_log_max,
        ..ProtocolConfig::default()
    }
}
