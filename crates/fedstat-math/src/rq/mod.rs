//! Slot-vector ring elements.
//!
//! A [`Poly`] is an element of the product ring (Z/2^kZ)^n, stored by the
//! centered representatives of its `n` slots, in `[-2^(k-1), 2^(k-1))`.
//! Addition and multiplication are slot-wise, which is the behavior of an
//! RLWE polynomial ring in its evaluation (NTT) representation. Galois
//! automorphisms act as slot permutations.
//!
//! The modulus is a power of two: the moduli of a chain divide each other,
//! so dropping to a lower modulus is a plain reduction and dividing by a
//! modulus of the chain is a rounded shift.

use crate::sampling::{sample_vec_normal, sample_vec_ternary, sample_vec_uniform};
use crate::{Error, Result};
use itertools::izip;
use num_bigint::{BigInt, Sign};
use num_traits::{FromPrimitive, One, ToPrimitive, Zero};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use zeroize::Zeroize;

/// Reduction into the centered range modulo 2^k.
struct Reducer {
    modulus: BigInt,
    half: BigInt,
    neg_half: BigInt,
}

impl Reducer {
    fn new(log_modulus: u32) -> Self {
        let modulus = BigInt::one() << log_modulus;
        let half = if log_modulus == 0 {
            BigInt::zero()
        } else {
            BigInt::one() << (log_modulus - 1)
        };
        Self {
            modulus,
            neg_half: -&half,
            half,
        }
    }

    fn reduce(&self, x: &mut BigInt) {
        if *x >= self.half || *x < self.neg_half {
            *x += &self.half;
            *x %= &self.modulus;
            if x.sign() == Sign::Minus {
                *x += &self.modulus;
            }
            *x -= &self.half;
        }
    }
}

/// `floor(x / 2^bits)`.
fn floor_shift(x: &BigInt, bits: u32) -> BigInt {
    let d = BigInt::one() << bits;
    let q = x / &d;
    if (x % &d).sign() == Sign::Minus {
        q - 1
    } else {
        q
    }
}

/// An element of the slot ring modulo 2^`log_modulus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    coeffs: Box<[BigInt]>,
    log_modulus: u32,
}

impl Zeroize for Poly {
    fn zeroize(&mut self) {
        self.coeffs.iter_mut().for_each(Zero::set_zero);
    }
}

impl Poly {
    /// Creates a ring element from integer slot values, reduced modulo
    /// 2^`log_modulus`.
    pub fn new(coeffs: Vec<BigInt>, log_modulus: u32) -> Self {
        let reducer = Reducer::new(log_modulus);
        let mut coeffs = coeffs.into_boxed_slice();
        coeffs.iter_mut().for_each(|c| reducer.reduce(c));
        Self {
            coeffs,
            log_modulus,
        }
    }

    /// Creates the zero element with `slots` slots.
    pub fn zero(slots: usize, log_modulus: u32) -> Self {
        Self {
            coeffs: vec![BigInt::zero(); slots].into_boxed_slice(),
            log_modulus,
        }
    }

    /// Creates an element from small integer coefficients.
    pub fn from_i64(coeffs: &[i64], log_modulus: u32) -> Self {
        Self::new(coeffs.iter().map(|c| BigInt::from(*c)).collect(), log_modulus)
    }

    /// Encodes at most `slots` reals as fixed-point integers
    /// `round(v · 2^log_scale)`, padding the remaining slots with zeros.
    ///
    /// Fails if a value is not finite or if its encoding does not fit the
    /// centered range of the modulus.
    pub fn try_encode(
        values: &[f64],
        slots: usize,
        log_scale: u32,
        log_modulus: u32,
    ) -> Result<Self> {
        if values.len() > slots {
            return Err(Error::TooManyValues(values.len(), slots));
        }
        let scale = 2f64.powi(log_scale as i32);
        let limit = 2f64.powi(log_modulus as i32 - 1);
        let mut coeffs = vec![BigInt::zero(); slots];
        for (i, (c, v)) in izip!(coeffs.iter_mut(), values).enumerate() {
            if !v.is_finite() {
                return Err(Error::NonFinite(i));
            }
            let scaled = (v * scale).round();
            if scaled.abs() >= limit {
                return Err(Error::Overflow(i));
            }
            *c = BigInt::from_f64(scaled).ok_or(Error::Overflow(i))?;
        }
        Ok(Self {
            coeffs: coeffs.into_boxed_slice(),
            log_modulus,
        })
    }

    /// Decodes the slots as fixed-point values of scale 2^`log_scale`.
    pub fn decode(&self, log_scale: u32) -> Vec<f64> {
        let scale = 2f64.powi(log_scale as i32);
        self.coeffs
            .iter()
            .map(|c| c.to_f64().unwrap_or(f64::NAN) / scale)
            .collect()
    }

    /// Samples an element uniformly modulo 2^`log_modulus`.
    pub fn random<R: RngCore + CryptoRng>(slots: usize, log_modulus: u32, rng: &mut R) -> Self {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        rng.fill_bytes(&mut seed);
        Self::random_from_seed(slots, log_modulus, seed)
    }

    /// Generates an element uniformly modulo 2^`log_modulus`,
    /// deterministically from a seed.
    pub fn random_from_seed(
        slots: usize,
        log_modulus: u32,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Self {
        let mut rng = ChaCha8Rng::from_seed(seed);
        Self {
            coeffs: sample_vec_uniform(slots, log_modulus, &mut rng).into_boxed_slice(),
            log_modulus,
        }
    }

    /// Samples a small (ternary) element.
    pub fn small<R: RngCore + CryptoRng>(slots: usize, log_modulus: u32, rng: &mut R) -> Self {
        Self::from_i64(&sample_vec_ternary(slots, rng), log_modulus)
    }

    /// Samples an error element: a Gaussian of standard deviation `sigma`,
    /// truncated to `bound` and rounded to the nearest integers.
    pub fn gaussian<R: RngCore + CryptoRng>(
        slots: usize,
        log_modulus: u32,
        sigma: f64,
        bound: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let samples = sample_vec_normal(slots, sigma, bound, rng)?;
        Ok(Self::new(
            samples
                .into_iter()
                .map(|e| BigInt::from(e.round() as i64))
                .collect(),
            log_modulus,
        ))
    }

    /// Samples an element uniformly in
    /// `[-2^(log_bound - 1), 2^(log_bound - 1))^slots`.
    pub fn uniform<R: RngCore + CryptoRng>(
        slots: usize,
        log_bound: u32,
        log_modulus: u32,
        rng: &mut R,
    ) -> Self {
        Self::new(sample_vec_uniform(slots, log_bound, rng), log_modulus)
    }

    /// Number of slots.
    pub fn slots(&self) -> usize {
        self.coeffs.len()
    }

    /// Base-2 logarithm of the modulus.
    pub fn log_modulus(&self) -> u32 {
        self.log_modulus
    }

    /// The centered slot values.
    pub fn coeffs(&self) -> &[BigInt] {
        &self.coeffs
    }

    /// Returns an error unless the modulus is 2^`log_modulus`.
    pub fn check_modulus(&self, log_modulus: u32) -> Result<()> {
        if self.log_modulus != log_modulus {
            return Err(Error::InvalidModulus(self.log_modulus, log_modulus));
        }
        Ok(())
    }

    /// The same centered representatives taken modulo 2^`log_modulus`: a
    /// reduction towards a smaller modulus, a lift towards a larger one.
    pub fn change_modulus(&self, log_modulus: u32) -> Self {
        if log_modulus >= self.log_modulus {
            Self {
                coeffs: self.coeffs.clone(),
                log_modulus,
            }
        } else {
            Self::new(self.coeffs.to_vec(), log_modulus)
        }
    }

    /// Multiplies every slot by 2^`bits`.
    pub fn mul_power_of_two(&self, bits: u32) -> Self {
        Self::new(
            self.coeffs.iter().map(|c| c << bits).collect(),
            self.log_modulus,
        )
    }

    /// Divides every slot by 2^`bits`, rounding to the nearest integer, and
    /// lowers the modulus to 2^(`log_modulus` - `bits`).
    pub fn scale_down(&self, bits: u32) -> Result<Self> {
        if bits > self.log_modulus {
            return Err(Error::InvalidModulus(self.log_modulus, bits));
        }
        if bits == 0 {
            return Ok(self.clone());
        }
        let half = BigInt::one() << (bits - 1);
        Ok(Self::new(
            self.coeffs
                .iter()
                .map(|c| floor_shift(&(c + &half), bits))
                .collect(),
            self.log_modulus - bits,
        ))
    }

    /// Rotates the slots to the left by `steps` positions: slot `i` of the
    /// output holds slot `i + steps` of the input.
    pub fn rotate(&self, steps: usize) -> Self {
        let n = self.slots();
        if n == 0 {
            return self.clone();
        }
        let steps = steps % n;
        Self {
            coeffs: self.coeffs[steps..]
                .iter()
                .chain(self.coeffs[..steps].iter())
                .cloned()
                .collect(),
            log_modulus: self.log_modulus,
        }
    }

    fn assert_compatible(&self, other: &Self) {
        assert_eq!(
            self.slots(),
            other.slots(),
            "Incompatible number of slots"
        );
        assert_eq!(
            self.log_modulus, other.log_modulus,
            "Incompatible moduli"
        );
    }
}

impl AddAssign<&Poly> for Poly {
    fn add_assign(&mut self, p: &Poly) {
        self.assert_compatible(p);
        let reducer = Reducer::new(self.log_modulus);
        izip!(self.coeffs.iter_mut(), p.coeffs.iter()).for_each(|(a, b)| {
            *a += b;
            reducer.reduce(a);
        });
    }
}

impl SubAssign<&Poly> for Poly {
    fn sub_assign(&mut self, p: &Poly) {
        self.assert_compatible(p);
        let reducer = Reducer::new(self.log_modulus);
        izip!(self.coeffs.iter_mut(), p.coeffs.iter()).for_each(|(a, b)| {
            *a -= b;
            reducer.reduce(a);
        });
    }
}

impl MulAssign<&Poly> for Poly {
    fn mul_assign(&mut self, p: &Poly) {
        self.assert_compatible(p);
        let reducer = Reducer::new(self.log_modulus);
        izip!(self.coeffs.iter_mut(), p.coeffs.iter()).for_each(|(a, b)| {
            *a *= b;
            reducer.reduce(a);
        });
    }
}

impl Add<&Poly> for &Poly {
    type Output = Poly;

    fn add(self, p: &Poly) -> Poly {
        let mut q = self.clone();
        q += p;
        q
    }
}

impl Sub<&Poly> for &Poly {
    type Output = Poly;

    fn sub(self, p: &Poly) -> Poly {
        let mut q = self.clone();
        q -= p;
        q
    }
}

impl Mul<&Poly> for &Poly {
    type Output = Poly;

    fn mul(self, p: &Poly) -> Poly {
        let mut q = self.clone();
        q *= p;
        q
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        Poly::new(self.coeffs.iter().map(|c| -c).collect(), self.log_modulus)
    }
}

impl Neg for Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        -&self
    }
}
