#![crate_name = "fedstat"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Privacy-preserving aggregate statistics over horizontally partitioned
//! data.
//!
//! Several [`Participant`]s each hold rows of the same features. They form a
//! [`Federation`], which generates a collective key whose secret is shared
//! among them. The statistic pipelines in [`stats`] then compute, without
//! any participant revealing its rows:
//!
//! - the minimum and the maximum of every feature, by comparing encrypted
//!   local extrema;
//! - the mean and the population variance, by dividing encrypted sums by
//!   the encrypted inverse of the total count;
//! - order statistics (exact ranks, percentiles, quartiles), by a bisection
//!   in which only the encrypted sums of local counts are revealed.
//!
//! Ciphertexts whose level runs low are restored by the collective
//! [`Refresher`], and results are revealed through a collective key switch
//! towards a disposable key pair.

mod config;
mod errors;
mod federation;
mod participant;
mod refresh;

pub mod protocol;
pub mod reference;
pub mod stats;

pub use config::{
    validate_bisection_rounds, validate_crs_seed, validate_inverse_domain,
    validate_security_bits, validate_sign_iterations, validate_smudging, ProtocolConfig,
};
pub use errors::{Error, Protocol, Result};
pub use federation::Federation;
pub use participant::{Participant, RoundScratch};
pub use refresh::Refresher;
