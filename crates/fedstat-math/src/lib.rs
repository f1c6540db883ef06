#![crate_name = "fedstat_math"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Mathematical utilities for the fedstat libraries.
//!
//! The [`rq`] module holds the slot-vector ring elements, with integer slots
//! modulo a power of two, that the simulated scheme is built on;
//! [`sampling`] holds the error, mask and key samplers.

mod errors;

pub mod rq;
pub mod sampling;

pub use errors::{Error, Result};
