//! The set of evaluation keys shared by all evaluators of a run.

use super::{GaloisElement, GaloisKey, RelinearizationKey};
use crate::ckks::CkksParameters;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Relinearization key and Galois keys, read-only after generation.
#[derive(Debug, PartialEq, Clone)]
pub struct EvaluationKeySet {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) rlk: RelinearizationKey,
    pub(crate) gk: HashMap<GaloisElement, GaloisKey>,
}

impl EvaluationKeySet {
    /// Bundle a relinearization key with Galois keys. All keys must share
    /// the same parameters.
    pub fn new<I>(rlk: RelinearizationKey, galois_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = GaloisKey>,
    {
        let par = rlk.parameters().clone();
        let mut gk = HashMap::new();
        for key in galois_keys {
            if !CkksParameters::same(&par, key.parameters()) {
                return Err(Error::ParametersMismatch);
            }
            gk.insert(key.element, key);
        }
        Ok(Self { par, rlk, gk })
    }

    /// The parameters of the keys.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        &self.par
    }

    /// The relinearization key.
    pub fn relinearization_key(&self) -> &RelinearizationKey {
        &self.rlk
    }

    /// The Galois key for `element`.
    pub fn galois_key(&self, element: GaloisElement) -> Result<&GaloisKey> {
        self.gk
            .get(&element)
            .ok_or_else(|| Error::MissingKey(format!("{element:?}")))
    }

    /// Whether a Galois key for `element` is present.
    pub fn supports(&self, element: GaloisElement) -> bool {
        self.gk.contains_key(&element)
    }
}

#[cfg(test)]
mod tests {
    use super::EvaluationKeySet;
    use crate::ckks::{
        CkksParameters, GaloisElement, GaloisKey, RelinearizationKey, SecretKey,
    };
    use crate::Error;
    use rand::thread_rng;

    #[test]
    fn lookup() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let sk = SecretKey::random(&par, &mut rng);
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        let gk = GaloisKey::new(&sk, GaloisElement::Conjugation, &mut rng).unwrap();
        let keys = EvaluationKeySet::new(rlk, [gk]).unwrap();
        assert!(keys.supports(GaloisElement::Conjugation));
        assert!(!keys.supports(GaloisElement::Rotation(1)));
        assert_eq!(
            keys.galois_key(GaloisElement::Rotation(1)).unwrap_err(),
            Error::MissingKey("Rotation(1)".to_string())
        );

        let other = CkksParameters::default_arc(16).unwrap();
        let foreign_sk = SecretKey::random(&other, &mut rng);
        let foreign = GaloisKey::new(&foreign_sk, GaloisElement::Conjugation, &mut rng).unwrap();
        let rlk = RelinearizationKey::new(&sk, &mut rng).unwrap();
        assert_eq!(
            EvaluationKeySet::new(rlk, [foreign]).unwrap_err(),
            Error::ParametersMismatch
        );
    }
}
