//! Plaintext type in the simulated CKKS scheme.

use crate::ckks::CkksParameters;
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use fedstat_traits::{FheDecoder, FheEncoder, FheParametrized, FhePlaintext};
use std::sync::Arc;
use zeroize::Zeroize;

/// The level and scale a plaintext is encoded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub(crate) level: usize,
    pub(crate) log_scale: u32,
}

impl Encoding {
    /// Encoding at `level` with scale 2^`log_scale`.
    pub fn new(level: usize, log_scale: u32) -> Self {
        Self { level, log_scale }
    }

    /// Encoding at the maximum level with the default scale.
    pub fn default_for(par: &CkksParameters) -> Self {
        Self::new(par.max_level(), par.log_default_scale())
    }

    /// Encoding at `level` with the default scale.
    pub fn at_level(par: &CkksParameters, level: usize) -> Self {
        Self::new(level, par.log_default_scale())
    }
}

/// A plaintext object, that encodes a vector of reals as fixed-point
/// integers modulo the ciphertext modulus of its level.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) values: Poly,
    pub(crate) level: usize,
    pub(crate) log_scale: u32,
}

impl Zeroize for Plaintext {
    fn zeroize(&mut self) {
        self.values.zeroize();
    }
}

impl FheParametrized for Plaintext {
    type Parameters = CkksParameters;
}

impl FhePlaintext for Plaintext {
    type Encoding = Encoding;
}

impl Plaintext {
    /// The level of the plaintext.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The base-2 logarithm of the scale of the plaintext.
    pub fn log_scale(&self) -> u32 {
        self.log_scale
    }
}

impl FheEncoder<&[f64]> for Plaintext {
    type Error = Error;

    fn try_encode(
        value: &[f64],
        encoding: Encoding,
        par: &Arc<CkksParameters>,
    ) -> Result<Self> {
        if encoding.level > par.max_level() {
            return Err(Error::UnspecifiedInput(format!(
                "Level {} exceeds the maximum level {}",
                encoding.level,
                par.max_level()
            )));
        }
        if encoding.log_scale >= par.log_modulus_at(encoding.level)? {
            return Err(Error::UnspecifiedInput(format!(
                "Scale 2^{} does not fit the modulus at level {}",
                encoding.log_scale, encoding.level
            )));
        }
        let values = Poly::try_encode(
            value,
            par.slots(),
            encoding.log_scale,
            par.log_modulus_at(encoding.level)?,
        )?;
        Ok(Self {
            par: par.clone(),
            values,
            level: encoding.level,
            log_scale: encoding.log_scale,
        })
    }
}

impl FheEncoder<&Vec<f64>> for Plaintext {
    type Error = Error;

    fn try_encode(
        value: &Vec<f64>,
        encoding: Encoding,
        par: &Arc<CkksParameters>,
    ) -> Result<Self> {
        Plaintext::try_encode(value.as_slice(), encoding, par)
    }
}

impl FheDecoder<Plaintext> for Vec<f64> {
    type Error = Error;

    fn try_decode(pt: &Plaintext) -> Result<Self> {
        Ok(pt.values.decode(pt.log_scale))
    }
}
