#![crate_name = "fedstat_ckks"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! A simulated leveled CKKS-style scheme and its multiparty primitives.
//!
//! The [`ckks`] module implements the single-key scheme: parameters with a
//! modulus chain, encoding, keys, the homomorphic evaluator, the sign
//! polynomial comparison and the positive-domain inverse. The [`mckks`]
//! module implements the threshold protocols: collective key generation,
//! public key switching and refresh, each as a per-party share plus an
//! [`mckks::Aggregate`] implementation.
//!
//! Ring elements are slot vectors of reals masked slot-wise by products with
//! the secret key. The algebra, the noise and the level and scale
//! bookkeeping follow an RLWE scheme, but this backend offers **no
//! cryptographic security**: it is a reference backend for protocol code.

mod errors;

pub mod ckks;
pub mod mckks;

pub use errors::{Error, ParametersError, Result};
