//! Configuration and validation of the federation protocols.
//!
//! The configuration holds the protocol constants shared by every
//! participant: they are fixed for a run and never passed per call.

use fedstat_ckks::ckks::{CkksParameters, SignPolynomial};
use fedstat_ckks::mckks::Smudging;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Protocol constants of a federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Statistical security parameter of the refresh masks, in bits.
    pub security_bits: u32,
    /// Seed of the common reference string.
    pub crs_seed: String,
    /// Smudging noise of the key switch and refresh shares.
    pub smudging: Smudging,
    /// Base-2 logarithm of the lower end of the inversion domain.
    pub inverse_log_min: f64,
    /// Base-2 logarithm of the upper end of the inversion domain.
    pub inverse_log_max: f64,
    /// Upper bound on the number of bisection rounds.
    pub max_bisection_rounds: usize,
    /// Number of iterations of the sign polynomial.
    pub sign_iterations: usize,
}

impl ProtocolConfig {
    /// Security parameter used by default.
    pub const DEFAULT_SECURITY_BITS: u32 = 128;

    /// Seed of the common reference string used by default.
    pub const DEFAULT_CRS_SEED: &'static str = "fedstat";

    /// Bisection round cap used by default.
    pub const DEFAULT_MAX_BISECTION_ROUNDS: usize = 128;

    /// Checks every field of the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_security_bits(self.security_bits)?;
        validate_crs_seed(&self.crs_seed)?;
        validate_smudging(&self.smudging)?;
        validate_inverse_domain(self.inverse_log_min, self.inverse_log_max)?;
        validate_bisection_rounds(self.max_bisection_rounds)?;
        validate_sign_iterations(self.sign_iterations)?;
        Ok(())
    }

    /// Checks the configuration against the scheme parameters.
    pub fn validate_for(&self, par: &CkksParameters) -> Result<()> {
        self.validate()?;
        let log_scale = par.log_default_scale() as f64;
        if self.inverse_log_max.abs() >= log_scale || self.inverse_log_min.abs() >= log_scale {
            return Err(Error::InvalidConfig(format!(
                "Inversion domain [2^{}, 2^{}] is not representable at scale 2^{}",
                self.inverse_log_min, self.inverse_log_max, log_scale
            )));
        }
        Ok(())
    }

    /// The sign polynomial used by comparisons.
    pub fn sign_polynomial(&self) -> SignPolynomial {
        SignPolynomial::new(self.sign_iterations)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            security_bits: Self::DEFAULT_SECURITY_BITS,
            crs_seed: Self::DEFAULT_CRS_SEED.to_string(),
            smudging: Smudging::default(),
            inverse_log_min: -30.0,
            inverse_log_max: 30.0,
            max_bisection_rounds: Self::DEFAULT_MAX_BISECTION_ROUNDS,
            sign_iterations: SignPolynomial::DEFAULT_ITERATIONS,
        }
    }
}

/// Validates the security parameter.
pub fn validate_security_bits(bits: u32) -> Result<()> {
    if bits == 0 || bits > 256 {
        return Err(Error::InvalidConfig(format!(
            "Security parameter must be between 1 and 256 bits, found {bits}"
        )));
    }
    Ok(())
}

/// Validates the seed of the common reference string.
pub fn validate_crs_seed(seed: &str) -> Result<()> {
    if seed.is_empty() {
        return Err(Error::InvalidConfig(
            "Common reference string seed must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates the smudging noise distribution.
pub fn validate_smudging(smudging: &Smudging) -> Result<()> {
    smudging
        .validate()
        .map_err(|e| Error::InvalidConfig(e.to_string()))
}

/// Validates the inversion domain `[2^log_min, 2^log_max]`.
pub fn validate_inverse_domain(log_min: f64, log_max: f64) -> Result<()> {
    if !log_min.is_finite() || !log_max.is_finite() || log_min >= log_max {
        return Err(Error::InvalidConfig(format!(
            "Invalid inversion domain [2^{log_min}, 2^{log_max}]"
        )));
    }
    Ok(())
}

/// Validates the bisection round cap.
pub fn validate_bisection_rounds(rounds: usize) -> Result<()> {
    if rounds == 0 {
        return Err(Error::InvalidConfig(
            "Bisection round cap must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates the number of sign polynomial iterations.
pub fn validate_sign_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(Error::InvalidConfig(
            "Sign polynomial needs at least one iteration".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedstat_ckks::ckks::CkksParametersBuilder;

    #[test]
    fn default_is_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.security_bits, 128);
        assert_eq!(config.smudging.sigma, 8.0 * 3.2);
        assert_eq!(config.smudging.bound, 6.0 * config.smudging.sigma);
        assert_eq!(config.sign_polynomial(), SignPolynomial::default());

        let par = CkksParameters::default_arc(8).unwrap();
        assert!(config.validate_for(&par).is_ok());
    }

    #[test]
    fn test_invalid_security_bits() {
        assert!(validate_security_bits(128).is_ok());
        assert!(validate_security_bits(0).is_err());
        assert!(validate_security_bits(257).is_err());
    }

    #[test]
    fn test_invalid_inverse_domain() {
        assert!(validate_inverse_domain(-30.0, 30.0).is_ok());
        assert!(validate_inverse_domain(3.0, 3.0).is_err());
        assert!(validate_inverse_domain(4.0, -4.0).is_err());
        assert!(validate_inverse_domain(f64::NEG_INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_invalid_counts() {
        assert!(validate_bisection_rounds(0).is_err());
        assert!(validate_bisection_rounds(1).is_ok());
        assert!(validate_sign_iterations(0).is_err());
        assert!(validate_crs_seed("").is_err());
    }

    #[test]
    fn test_invalid_smudging() {
        let smudging = Smudging {
            sigma: 3.2,
            bound: 1.0,
        };
        assert!(matches!(
            validate_smudging(&smudging),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn inverse_domain_must_fit_the_scale() {
        let par = CkksParametersBuilder::new()
            .set_slots(8)
            .set_log_moduli(&[30, 20, 20, 20])
            .set_log_default_scale(20)
            .build_arc()
            .unwrap();
        let config = ProtocolConfig::default();
        assert!(matches!(
            config.validate_for(&par),
            Err(Error::InvalidConfig(_))
        ));

        let config = ProtocolConfig {
            inverse_log_min: -8.0,
            inverse_log_max: 8.0,
            ..Default::default()
        };
        assert!(config.validate_for(&par).is_ok());
    }
}
