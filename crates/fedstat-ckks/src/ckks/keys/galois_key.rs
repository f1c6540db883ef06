//! Galois keys for the simulated CKKS scheme

use super::key_switching_key::KeySwitchingKey;
use crate::ckks::{CkksParameters, Ciphertext, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use fedstat_traits::FheParametrized;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use zeroize::Zeroizing;

/// A Galois automorphism of the slot ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GaloisElement {
    /// Left rotation of the slots by the given number of steps.
    Rotation(usize),
    /// Complex conjugation of the slots; it fixes real slot values.
    Conjugation,
}

impl GaloisElement {
    /// The rotation by `steps`, normalized modulo the number of slots.
    pub fn rotation(steps: usize, par: &CkksParameters) -> Self {
        Self::Rotation(steps % par.slots())
    }

    /// The elements needed to sum `span` consecutive slots with
    /// power-of-two rotations, followed by the conjugation.
    pub fn for_inner_sum(span: usize, par: &CkksParameters) -> Vec<Self> {
        let mut elements = vec![];
        let mut step = 1;
        while step < span.min(par.slots()) {
            elements.push(Self::rotation(step, par));
            step <<= 1;
        }
        elements.push(Self::Conjugation);
        elements
    }

    /// Apply the automorphism to a ring element.
    pub fn apply(&self, p: &Poly) -> Poly {
        match self {
            Self::Rotation(steps) => p.rotate(*steps),
            Self::Conjugation => p.clone(),
        }
    }
}

/// Galois key for the simulated CKKS scheme.
///
/// It switches `σ(s)` back to `s` for a Galois automorphism `σ`.
#[derive(Debug, PartialEq, Clone)]
pub struct GaloisKey {
    pub(crate) element: GaloisElement,
    pub(crate) ksk: KeySwitchingKey,
}

impl FheParametrized for GaloisKey {
    type Parameters = CkksParameters;
}

impl GaloisKey {
    /// Generate a [`GaloisKey`] from a [`SecretKey`].
    pub fn new<R: RngCore + CryptoRng>(
        sk: &SecretKey,
        element: GaloisElement,
        rng: &mut R,
    ) -> Result<Self> {
        let s = sk.poly(sk.par.log_modulus_at(sk.par.max_level())?);
        let sigma_s = Zeroizing::new(element.apply(&s));
        let ksk = KeySwitchingKey::new(sk, &sigma_s, rng)?;
        Ok(Self { element, ksk })
    }

    /// The automorphism this key evaluates.
    pub fn element(&self) -> GaloisElement {
        self.element
    }

    /// The parameters of the key.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.ksk.par
    }

    /// Apply the automorphism to a degree-1 ciphertext.
    pub fn apply(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if ct.c.len() != 2 {
            return Err(Error::DefaultError(
                "Galois automorphisms require a ciphertext of degree 1".to_string(),
            ));
        }
        if !CkksParameters::same(&self.ksk.par, &ct.par) {
            return Err(Error::ParametersMismatch);
        }
        let c0 = self.element.apply(&ct.c[0]);
        let c1 = self.element.apply(&ct.c[1]);
        let (mut d0, d1) = self.ksk.key_switch(&c1)?;
        d0 += &c0;
        Ciphertext::new(vec![d0, d1], ct.level, ct.log_scale, &ct.par)
    }
}

#[cfg(test)]
mod tests {
    use super::{GaloisElement, GaloisKey};
    use crate::ckks::{CkksParameters, Encoding, Plaintext, SecretKey};
    use fedstat_traits::{FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};
    use rand::thread_rng;

    #[test]
    fn rotation_and_conjugation() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let values = (1..=8).map(|i| i as f64).collect::<Vec<_>>();
        let pt = Plaintext::try_encode(&values, Encoding::at_level(&par, 2), &par).unwrap();
        let ct = sk.try_encrypt(&pt, &mut rng).unwrap();

        for element in [
            GaloisElement::rotation(1, &par),
            GaloisElement::rotation(3, &par),
            GaloisElement::Conjugation,
        ] {
            let gk = GaloisKey::new(&sk, element, &mut rng).unwrap();
            let out = gk.apply(&ct).unwrap();
            let decrypted = Vec::<f64>::try_decode(&sk.try_decrypt(&out).unwrap()).unwrap();
            assert_eq!(out.level, 2);
            let expected = element.apply(&pt.values).decode(pt.log_scale);
            for (d, e) in decrypted.iter().zip(&expected) {
                assert!((d - e).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn inner_sum_elements() {
        let par = CkksParameters::default_arc(8).unwrap();
        assert_eq!(
            GaloisElement::for_inner_sum(4, &par),
            vec![
                GaloisElement::Rotation(1),
                GaloisElement::Rotation(2),
                GaloisElement::Conjugation
            ]
        );
        assert_eq!(
            GaloisElement::for_inner_sum(1, &par),
            vec![GaloisElement::Conjugation]
        );
        assert_eq!(GaloisElement::rotation(9, &par), GaloisElement::Rotation(1));
    }
}
