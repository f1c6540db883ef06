//! Create parameters for the simulated CKKS scheme

use crate::{Error, ParametersError, Result};
use fedstat_traits::FheParameters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Smallest accepted modulus size, in bits.
const MIN_LOG_MODULUS: u32 = 10;

/// Largest accepted modulus size, in bits.
const MAX_LOG_MODULUS: u32 = 61;

/// Parameters for the simulated CKKS scheme.
///
/// The modulus chain is described by the bit sizes of its moduli, which are
/// powers of two: a ciphertext at level `l` lives modulo
/// `Q_l = q_0 · ... · q_l`, and rescaling at level `l` divides it by `q_l`.
/// All moduli above the base one have the size of the default scale, so that
/// the scale is stable across multiplications followed by rescaling.
/// Key-switching keys live modulo `P · Q_l` for a special modulus `P` of the
/// size of the largest `Q_l`.
#[derive(Debug, PartialEq)]
pub struct CkksParameters {
    /// Number of slots of a plaintext.
    slots: usize,

    /// Bit sizes of the ciphertext moduli q_i.
    log_q: Box<[u32]>,

    /// Base-2 logarithm of the default scale.
    log_default_scale: u32,

    /// Standard deviation of the error distribution.
    pub(crate) error_std: f64,

    /// Truncation bound of the error distribution.
    pub(crate) error_bound: f64,
}

impl FheParameters for CkksParameters {}

impl CkksParameters {
    /// Standard deviation of the error distribution used by default.
    pub const DEFAULT_ERROR_STD: f64 = 3.2;

    /// Returns the number of slots.
    pub const fn slots(&self) -> usize {
        self.slots
    }

    /// Returns the bit sizes of the ciphertext moduli.
    pub fn log_q(&self) -> &[u32] {
        &self.log_q
    }

    /// Returns the maximum level allowed by these parameters.
    pub fn max_level(&self) -> usize {
        self.log_q.len() - 1
    }

    /// Returns the bit size of the modulus q_level.
    pub fn log_q_at(&self, level: usize) -> Result<u32> {
        self.log_q
            .get(level)
            .copied()
            .ok_or_else(|| Error::DefaultError(format!("No modulus at level {level}")))
    }

    /// Returns the bit size of the ciphertext modulus at `level`, that is the
    /// sum of the bit sizes of q_0, ..., q_level.
    pub fn log_modulus_at(&self, level: usize) -> Result<u32> {
        if level > self.max_level() {
            return Err(Error::DefaultError(format!("No modulus at level {level}")));
        }
        Ok(self.log_q[..=level].iter().sum())
    }

    /// Returns the bit size of the special modulus `P` of the key-switching
    /// keys.
    pub fn log_special_modulus(&self) -> u32 {
        self.log_q.iter().sum()
    }

    /// Returns the bit size of the key-switching modulus `P · Q_level`.
    pub fn log_key_modulus_at(&self, level: usize) -> Result<u32> {
        Ok(self.log_special_modulus() + self.log_modulus_at(level)?)
    }

    /// Returns the bit size of the key-switching modulus at the maximum level.
    pub fn log_max_key_modulus(&self) -> u32 {
        self.log_special_modulus() + self.log_q.iter().sum::<u32>()
    }

    /// Returns the base-2 logarithm of the default scale.
    pub const fn log_default_scale(&self) -> u32 {
        self.log_default_scale
    }

    /// Returns the default scale.
    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.log_default_scale as i32)
    }

    /// Returns the standard deviation of the error distribution.
    pub const fn error_std(&self) -> f64 {
        self.error_std
    }

    /// Returns the literal these parameters were built from.
    pub fn to_literal(&self) -> CkksParametersLiteral {
        CkksParametersLiteral {
            slots: self.slots,
            log_q: self.log_q.to_vec(),
            log_default_scale: self.log_default_scale,
            error_std: self.error_std,
        }
    }

    /// Parameters with the default modulus chain `[55, 45 × 14]`, a default
    /// scale of 2^45 and 2^14 slots, as used with a ring of degree 2^15.
    pub fn default_128() -> Result<Arc<Self>> {
        CkksParametersLiteral::default().build_arc()
    }

    /// Parameters with the default modulus chain and scale and `slots` slots.
    pub fn default_arc(slots: usize) -> Result<Arc<Self>> {
        CkksParametersLiteral {
            slots,
            ..Default::default()
        }
        .build_arc()
    }

    /// Returns true if both handles describe the same parameters.
    pub(crate) fn same(a: &Arc<Self>, b: &Arc<Self>) -> bool {
        Arc::ptr_eq(a, b) || a == b
    }
}

/// Serializable description of a set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CkksParametersLiteral {
    /// Number of slots.
    pub slots: usize,
    /// Bit sizes of the ciphertext moduli.
    pub log_q: Vec<u32>,
    /// Base-2 logarithm of the default scale.
    pub log_default_scale: u32,
    /// Standard deviation of the error distribution.
    pub error_std: f64,
}

impl Default for CkksParametersLiteral {
    fn default() -> Self {
        let mut log_q = vec![55];
        log_q.extend([45; 14]);
        Self {
            slots: 1 << 14,
            log_q,
            log_default_scale: 45,
            error_std: CkksParameters::DEFAULT_ERROR_STD,
        }
    }
}

impl CkksParametersLiteral {
    /// Build the parameters described by this literal inside an `Arc`.
    pub fn build_arc(&self) -> Result<Arc<CkksParameters>> {
        CkksParametersBuilder::new()
            .set_slots(self.slots)
            .set_log_moduli(&self.log_q)
            .set_log_default_scale(self.log_default_scale)
            .set_error_std(self.error_std)
            .build_arc()
    }
}

/// Builder for parameters for the simulated CKKS scheme.
#[derive(Debug)]
pub struct CkksParametersBuilder {
    slots: usize,
    log_q: Vec<u32>,
    log_default_scale: u32,
    error_std: f64,
}

impl CkksParametersBuilder {
    /// Creates a new instance of the builder
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            log_q: Default::default(),
            log_default_scale: Default::default(),
            error_std: CkksParameters::DEFAULT_ERROR_STD,
        }
    }

    /// Sets the number of slots. Building fails if it is not a power of two.
    pub fn set_slots(&mut self, slots: usize) -> &mut Self {
        self.slots = slots;
        self
    }

    /// Sets the bit sizes of the ciphertext moduli, from q_0 upwards.
    pub fn set_log_moduli(&mut self, log_q: &[u32]) -> &mut Self {
        self.log_q = log_q.to_owned();
        self
    }

    /// Sets the base-2 logarithm of the default scale.
    pub fn set_log_default_scale(&mut self, log_scale: u32) -> &mut Self {
        self.log_default_scale = log_scale;
        self
    }

    /// Sets the standard deviation of the error distribution. The errors are
    /// truncated at six standard deviations.
    pub fn set_error_std(&mut self, error_std: f64) -> &mut Self {
        self.error_std = error_std;
        self
    }

    /// Build a new `CkksParameters` inside an `Arc`.
    pub fn build_arc(&self) -> Result<Arc<CkksParameters>> {
        self.build().map(Arc::new)
    }

    /// Build a new `CkksParameters`.
    pub fn build(&self) -> Result<CkksParameters> {
        if self.slots == 0 || !self.slots.is_power_of_two() {
            return Err(ParametersError::InvalidSlots(self.slots).into());
        }

        if self.log_q.len() < 2 {
            return Err(ParametersError::ChainTooShort(self.log_q.len(), 2).into());
        }
        if let Some(size) = self
            .log_q
            .iter()
            .find(|s| !(MIN_LOG_MODULUS..=MAX_LOG_MODULUS).contains(*s))
        {
            return Err(ParametersError::InvalidModulusSize(
                *size,
                MIN_LOG_MODULUS,
                MAX_LOG_MODULUS,
            )
            .into());
        }

        // The scale must be restored exactly by every rescaling.
        if self.log_q[1..].iter().any(|s| *s != self.log_default_scale) {
            return Err(ParametersError::InvalidScale(format!(
                "moduli above q_0 must all have {} bits",
                self.log_default_scale
            ))
            .into());
        }
        if self.log_q[0] < self.log_default_scale {
            return Err(ParametersError::InvalidScale(format!(
                "q_0 has {} bits, fewer than the scale 2^{}",
                self.log_q[0], self.log_default_scale
            ))
            .into());
        }

        if !self.error_std.is_finite() || self.error_std <= 0.0 {
            return Err(ParametersError::InvalidErrorDistribution(format!(
                "standard deviation {} is not positive",
                self.error_std
            ))
            .into());
        }
        Ok(CkksParameters {
            slots: self.slots,
            log_q: self.log_q.clone().into_boxed_slice(),
            log_default_scale: self.log_default_scale,
            error_std: self.error_std,
            error_bound: 6.0 * self.error_std,
        })
    }
}
