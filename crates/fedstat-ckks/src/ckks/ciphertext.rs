//! Ciphertext type in the simulated CKKS scheme.

use crate::ckks::CkksParameters;
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use fedstat_traits::{FheCiphertext, FheParametrized};
use std::sync::Arc;

/// A ciphertext encrypting a plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    /// The parameters of the underlying scheme.
    pub(crate) par: Arc<CkksParameters>,

    /// The ciphertext elements.
    pub(crate) c: Vec<Poly>,

    /// The ciphertext level.
    pub(crate) level: usize,

    /// Base-2 logarithm of the ciphertext scale.
    pub(crate) log_scale: u32,
}

impl Ciphertext {
    /// Create a ciphertext from a vector of ring elements.
    /// A ciphertext must contain at least two elements, all with the number
    /// of slots of the parameters and the modulus of its level, and its level
    /// must be valid.
    pub fn new(
        c: Vec<Poly>,
        level: usize,
        log_scale: u32,
        par: &Arc<CkksParameters>,
    ) -> Result<Self> {
        if c.len() < 2 {
            return Err(Error::TooFewValues(c.len(), 2));
        }
        if level > par.max_level() {
            return Err(Error::UnspecifiedInput(format!(
                "Level {level} exceeds the maximum level {}",
                par.max_level()
            )));
        }
        let log_modulus = par.log_modulus_at(level)?;
        for ci in &c {
            if ci.slots() != par.slots() {
                return Err(fedstat_math::Error::InvalidSlots(ci.slots(), par.slots()).into());
            }
            ci.check_modulus(log_modulus)?;
        }
        Ok(Self {
            par: par.clone(),
            c,
            level,
            log_scale,
        })
    }

    /// Create a transparent encryption of zero.
    pub fn zero(level: usize, log_scale: u32, par: &Arc<CkksParameters>) -> Result<Self> {
        let log_modulus = par.log_modulus_at(level)?;
        Self::new(
            vec![
                Poly::zero(par.slots(), log_modulus),
                Poly::zero(par.slots(), log_modulus),
            ],
            level,
            log_scale,
            par,
        )
    }

    /// The degree of the ciphertext, one less than its number of elements.
    pub fn degree(&self) -> usize {
        self.c.len() - 1
    }

    /// The ciphertext elements.
    pub fn parts(&self) -> &[Poly] {
        &self.c
    }

    /// The parameters of the ciphertext.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The base-2 logarithm of the scale, as an integer.
    pub fn log_scale_bits(&self) -> u32 {
        self.log_scale
    }

    /// The elements reduced to the modulus of a lower `level`.
    pub(crate) fn parts_at(&self, level: usize) -> Result<Vec<Poly>> {
        if level > self.level {
            return Err(Error::LevelTooLow {
                level: self.level,
                required: level,
            });
        }
        let log_modulus = self.par.log_modulus_at(level)?;
        Ok(self.c.iter().map(|ci| ci.change_modulus(log_modulus)).collect())
    }
}

impl FheParametrized for Ciphertext {
    type Parameters = CkksParameters;
}

impl FheCiphertext for Ciphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn log_scale(&self) -> f64 {
        self.log_scale as f64
    }
}

#[cfg(test)]
mod tests {
    use super::Ciphertext;
    use crate::ckks::CkksParameters;
    use crate::Error;
    use fedstat_math::rq::Poly;
    use fedstat_traits::FheCiphertext;

    #[test]
    fn constructor_checks() {
        let par = CkksParameters::default_arc(8).unwrap();
        assert_eq!(
            Ciphertext::new(vec![Poly::zero(8, 55)], 0, 45, &par).unwrap_err(),
            Error::TooFewValues(1, 2)
        );
        assert!(Ciphertext::new(vec![Poly::zero(8, 55), Poly::zero(4, 55)], 0, 45, &par).is_err());
        assert!(Ciphertext::new(vec![Poly::zero(8, 55), Poly::zero(8, 55)], 15, 45, &par).is_err());
        // The elements must live modulo Q_level.
        assert_eq!(
            Ciphertext::new(vec![Poly::zero(8, 55), Poly::zero(8, 100)], 1, 45, &par).unwrap_err(),
            Error::MathError(fedstat_math::Error::InvalidModulus(55, 100))
        );

        let ct = Ciphertext::zero(3, 45, &par).unwrap();
        assert_eq!(ct.degree(), 1);
        assert_eq!(ct.level(), 3);
        assert_eq!(ct.log_scale(), 45.0);
        assert!(ct.parts().iter().all(|p| p.log_modulus() == 190));
        assert!(ct.parts_at(1).unwrap().iter().all(|p| p.log_modulus() == 100));
        assert_eq!(
            ct.parts_at(4).unwrap_err(),
            Error::LevelTooLow {
                level: 3,
                required: 4
            }
        );
    }
}
