//! Homomorphic operations on ciphertexts.

use crate::ckks::{Ciphertext, CkksParameters, EvaluationKeySet, GaloisElement};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use std::sync::Arc;

/// Evaluates homomorphic operations and keeps track of levels and scales.
///
/// Additions require operands of equal scale and are performed at the lower
/// of the two levels. Multiplications add the scales; [`Evaluator::rescale`]
/// divides the ciphertext by the last modulus of the chain, which lowers both
/// its modulus and its scale and consumes one level.
#[derive(Debug, Clone)]
pub struct Evaluator {
    par: Arc<CkksParameters>,
    keys: Option<Arc<EvaluationKeySet>>,
}

impl Evaluator {
    /// An evaluator without evaluation keys: it supports additions,
    /// multiplications by constants and rescaling.
    pub fn new(par: &Arc<CkksParameters>) -> Self {
        Self {
            par: par.clone(),
            keys: None,
        }
    }

    /// An evaluator with evaluation keys.
    pub fn with_keys(keys: &Arc<EvaluationKeySet>) -> Self {
        Self {
            par: keys.par.clone(),
            keys: Some(keys.clone()),
        }
    }

    /// The parameters of the evaluator.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The evaluation keys.
    pub fn keys(&self) -> Result<&Arc<EvaluationKeySet>> {
        self.keys
            .as_ref()
            .ok_or_else(|| Error::MissingKey("evaluation key set".to_string()))
    }

    fn check(&self, ct: &Ciphertext) -> Result<()> {
        if !CkksParameters::same(&self.par, &ct.par) {
            return Err(Error::ParametersMismatch);
        }
        Ok(())
    }

    fn check_degree_one(&self, ct: &Ciphertext) -> Result<()> {
        self.check(ct)?;
        if ct.c.len() != 2 {
            return Err(Error::UnspecifiedInput(format!(
                "Expected a ciphertext of degree 1, found degree {}",
                ct.degree()
            )));
        }
        Ok(())
    }

    fn check_scale_fits(&self, level: usize, log_scale: u32) -> Result<()> {
        if log_scale >= self.par.log_modulus_at(level)? {
            return Err(Error::UnspecifiedInput(format!(
                "Scale 2^{log_scale} overflows the modulus at level {level}"
            )));
        }
        Ok(())
    }

    fn add_sub(&self, a: &Ciphertext, b: &Ciphertext, negate: bool) -> Result<Ciphertext> {
        self.check(a)?;
        self.check(b)?;
        if a.log_scale != b.log_scale {
            return Err(Error::ScaleMismatch(a.log_scale, b.log_scale));
        }
        let level = a.level.min(b.level);
        let log_modulus = self.par.log_modulus_at(level)?;
        let a_parts = a.parts_at(level)?;
        let b_parts = b.parts_at(level)?;
        let n = a_parts.len().max(b_parts.len());
        let mut c = Vec::with_capacity(n);
        for i in 0..n {
            let mut ci = a_parts
                .get(i)
                .cloned()
                .unwrap_or_else(|| Poly::zero(self.par.slots(), log_modulus));
            if let Some(bi) = b_parts.get(i) {
                if negate {
                    ci -= bi;
                } else {
                    ci += bi;
                }
            }
            c.push(ci);
        }
        Ciphertext::new(c, level, a.log_scale, &self.par)
    }

    /// Homomorphic addition.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.add_sub(a, b, false)
    }

    /// Homomorphic subtraction.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.add_sub(a, b, true)
    }

    /// Homomorphic negation.
    pub fn neg(&self, a: &Ciphertext) -> Result<Ciphertext> {
        self.check(a)?;
        Ciphertext::new(
            a.c.iter().map(|ci| -ci).collect(),
            a.level,
            a.log_scale,
            &self.par,
        )
    }

    /// Sum of ciphertexts, at the lowest of their levels.
    pub fn sum<'a, I>(&self, cts: I) -> Result<Ciphertext>
    where
        I: IntoIterator<Item = &'a Ciphertext>,
    {
        let mut cts = cts.into_iter();
        let first = cts.next().ok_or(Error::TooFewValues(0, 1))?;
        self.check(first)?;
        cts.try_fold(first.clone(), |acc, ct| self.add(&acc, ct))
    }

    /// Adds a vector of constants, padded with zeros, encoded at the scale of
    /// the ciphertext.
    pub fn add_const(&self, a: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
        self.check(a)?;
        let constants = Poly::try_encode(
            values,
            self.par.slots(),
            a.log_scale,
            self.par.log_modulus_at(a.level)?,
        )?;
        let mut out = a.clone();
        out.c[0] += &constants;
        Ok(out)
    }

    /// Adds a constant to every slot.
    pub fn add_scalar(&self, a: &Ciphertext, value: f64) -> Result<Ciphertext> {
        self.add_const(a, &vec![value; self.par.slots()])
    }

    /// Multiplies by a vector of constants, padded with zeros. The constants
    /// are encoded at the scale of the current modulus, so that a subsequent
    /// rescale restores the scale of the input.
    pub fn mul_const(&self, a: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
        self.check(a)?;
        let log_const_scale = self.par.log_q_at(a.level)?;
        let log_scale = a.log_scale + log_const_scale;
        self.check_scale_fits(a.level, log_scale)?;
        let constants = Poly::try_encode(
            values,
            self.par.slots(),
            log_const_scale,
            self.par.log_modulus_at(a.level)?,
        )?;
        Ciphertext::new(
            a.c.iter().map(|ci| ci * &constants).collect(),
            a.level,
            log_scale,
            &self.par,
        )
    }

    /// Multiplies every slot by a constant.
    pub fn mul_scalar(&self, a: &Ciphertext, value: f64) -> Result<Ciphertext> {
        self.mul_const(a, &vec![value; self.par.slots()])
    }

    /// Homomorphic multiplication without relinearization: the result has
    /// degree 2.
    pub fn mul(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_degree_one(a)?;
        self.check_degree_one(b)?;
        let level = a.level.min(b.level);
        let log_scale = a.log_scale + b.log_scale;
        self.check_scale_fits(level, log_scale)?;
        let a = a.parts_at(level)?;
        let b = b.parts_at(level)?;
        let c0 = &a[0] * &b[0];
        let mut c1 = &a[0] * &b[1];
        c1 += &(&a[1] * &b[0]);
        let c2 = &a[1] * &b[1];
        Ciphertext::new(vec![c0, c1, c2], level, log_scale, &self.par)
    }

    /// Relinearizes a degree-2 ciphertext in place.
    pub fn relinearize(&self, ct: &mut Ciphertext) -> Result<()> {
        self.check(ct)?;
        self.keys()?.relinearization_key().relinearizes(ct)
    }

    /// Homomorphic multiplication followed by relinearization.
    pub fn mul_relin(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut ct = self.mul(a, b)?;
        self.relinearize(&mut ct)?;
        Ok(ct)
    }

    /// Divides the ciphertext by the last modulus of its level, with
    /// rounding, consuming that level. Fails with [`Error::LevelTooLow`] at
    /// level 0.
    pub fn rescale(&self, ct: Ciphertext) -> Result<Ciphertext> {
        self.check(&ct)?;
        if ct.level == 0 {
            return Err(Error::LevelTooLow {
                level: 0,
                required: 1,
            });
        }
        let log_q = self.par.log_q_at(ct.level)?;
        if ct.log_scale <= log_q {
            return Err(Error::UnspecifiedInput(format!(
                "Cannot rescale a ciphertext of scale 2^{} by 2^{log_q}",
                ct.log_scale
            )));
        }
        let c = ct
            .c
            .iter()
            .map(|ci| Ok(ci.scale_down(log_q)?))
            .collect::<Result<Vec<_>>>()?;
        Ciphertext::new(c, ct.level - 1, ct.log_scale - log_q, &self.par)
    }

    /// Lowers the level of a ciphertext to `level` without changing its scale.
    pub fn drop_level(&self, ct: &mut Ciphertext, level: usize) -> Result<()> {
        self.check(ct)?;
        if level > ct.level {
            return Err(Error::LevelTooLow {
                level: ct.level,
                required: level,
            });
        }
        ct.c = ct.parts_at(level)?;
        ct.level = level;
        Ok(())
    }

    /// Rotates the slots to the left by `steps` positions.
    pub fn rotate(&self, ct: &Ciphertext, steps: usize) -> Result<Ciphertext> {
        self.check_degree_one(ct)?;
        let element = GaloisElement::rotation(steps, &self.par);
        if element == GaloisElement::Rotation(0) {
            return Ok(ct.clone());
        }
        self.keys()?.galois_key(element)?.apply(ct)
    }

    /// Conjugates the slots.
    pub fn conjugate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_degree_one(ct)?;
        self.keys()?
            .galois_key(GaloisElement::Conjugation)?
            .apply(ct)
    }

    /// Sums `span` consecutive slots: slot `i` of the output holds the sum of
    /// the input slots `i, ..., i + span - 1` (cyclically). `span` must be a
    /// power of two.
    pub fn inner_sum(&self, ct: &Ciphertext, span: usize) -> Result<Ciphertext> {
        self.check_degree_one(ct)?;
        if span == 0 || !span.is_power_of_two() || span > self.par.slots() {
            return Err(Error::UnspecifiedInput(format!(
                "Invalid inner sum span {span}"
            )));
        }
        let mut acc = ct.clone();
        let mut step = 1;
        while step < span {
            let rotated = self.rotate(&acc, step)?;
            acc = self.add(&acc, &rotated)?;
            step <<= 1;
        }
        Ok(acc)
    }

    /// The slot values of a ciphertext for a known secret key.
    #[cfg(test)]
    pub(crate) fn peek(ct: &Ciphertext, sk: &crate::ckks::SecretKey) -> Vec<f64> {
        use fedstat_traits::{FheDecoder, FheDecrypter};
        Vec::<f64>::try_decode(&sk.try_decrypt(ct).unwrap()).unwrap()
    }
}
