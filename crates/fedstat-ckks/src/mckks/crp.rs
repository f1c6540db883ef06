use std::sync::Arc;

use crate::ckks::CkksParameters;
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::fingerprint;

/// A ring element sampled from a random _common reference string_.
///
/// It is sampled modulo the largest key-switching modulus and reduced to the
/// modulus each protocol needs.
#[derive(Debug, PartialEq, Clone)]
pub struct CommonRandomPoly {
    pub(crate) poly: Poly,
}

impl CommonRandomPoly {
    /// Generate a new random CRP.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<CkksParameters>, rng: &mut R) -> Self {
        Self {
            poly: Poly::random(par.slots(), par.log_max_key_modulus(), rng),
        }
    }

    /// Generate a new CRP from a shared deterministic seed.
    pub fn new_deterministic(
        par: &Arc<CkksParameters>,
        seed: <ChaCha8Rng as SeedableRng>::Seed,
    ) -> Self {
        Self {
            poly: Poly::random_from_seed(par.slots(), par.log_max_key_modulus(), seed),
        }
    }

    /// The CRP reduced modulo 2^`log_modulus`.
    pub(crate) fn at(&self, log_modulus: u32) -> Poly {
        self.poly.change_modulus(log_modulus)
    }

    /// The digest identifying this CRP.
    pub(crate) fn fingerprint(&self) -> [u8; 32] {
        fingerprint(b"crp", &[], [&self.poly])
    }
}

/// A deterministic common reference string: every party holding the same
/// key derives the same sequence of [`CommonRandomPoly`].
#[derive(Debug, Clone)]
pub struct CommonReferenceString {
    rng: ChaCha8Rng,
}

impl CommonReferenceString {
    /// Create the reference string keyed by `key`.
    pub fn new(key: &[u8]) -> Self {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        seed.copy_from_slice(&Sha256::digest(key));
        Self {
            rng: ChaCha8Rng::from_seed(seed),
        }
    }

    /// The next common random polynomial of the string.
    pub fn next_crp(&mut self, par: &Arc<CkksParameters>) -> CommonRandomPoly {
        let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
        self.rng.fill_bytes(&mut seed);
        CommonRandomPoly::new_deterministic(par, seed)
    }

    /// The next `n` common random polynomials of the string.
    pub fn next_crps(&mut self, par: &Arc<CkksParameters>, n: usize) -> Vec<CommonRandomPoly> {
        (0..n).map(|_| self.next_crp(par)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{CommonRandomPoly, CommonReferenceString};
    use crate::ckks::CkksParameters;
    use rand::thread_rng;

    #[test]
    fn deterministic_reference_string() {
        let par = CkksParameters::default_arc(16).unwrap();
        let mut a = CommonReferenceString::new(b"fedstat");
        let mut b = CommonReferenceString::new(b"fedstat");
        let mut c = CommonReferenceString::new(b"other");
        let first = a.next_crp(&par);
        assert_eq!(first, b.next_crp(&par));
        assert_ne!(first, c.next_crp(&par));
        assert_ne!(first, a.next_crp(&par));
        assert_eq!(a.next_crps(&par, 3), {
            b.next_crp(&par);
            b.next_crps(&par, 3)
        });
    }

    #[test]
    fn random_crp() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(16).unwrap();
        let crp = CommonRandomPoly::new(&par, &mut rng);
        assert_eq!(crp.poly.slots(), 16);
        assert_eq!(crp.poly.log_modulus(), par.log_max_key_modulus());
        let reduced = crp.at(55);
        assert_eq!(reduced.log_modulus(), 55);
        assert_eq!(reduced.change_modulus(40), crp.at(40));
        assert_ne!(crp, CommonRandomPoly::new(&par, &mut rng));
        assert_eq!(crp.fingerprint(), crp.clone().fingerprint());
    }
}
