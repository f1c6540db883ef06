//! Participants of a federation.
//!
//! A participant owns its secret key share and its private rows. It computes
//! unencrypted partial statistics locally and only ever publishes
//! ciphertexts and protocol shares.

use std::fmt;
use std::sync::Arc;

use fedstat_ckks::ckks::{
    Ciphertext, CkksParameters, Encoding, GaloisElement, Plaintext, PublicKey, SecretKey,
};
use fedstat_ckks::mckks::{
    CommonRandomPoly, GaloisKeyShare, PublicKeyShare, PublicKeySwitchShare, RefreshShare,
    RelinKeyGenerator, Smudging,
};
use fedstat_traits::{FheEncoder, FheEncrypter};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::{Error, Result};

/// Per-round scratch buffers of a participant: the number of local values
/// strictly below and strictly above the midpoint of every feature.
///
/// The buffers are cleared at the start of every bisection round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundScratch {
    below: Vec<u64>,
    above: Vec<u64>,
}

impl RoundScratch {
    /// Empties both buffers.
    pub fn clear(&mut self) {
        self.below.clear();
        self.above.clear();
    }

    /// Number of values strictly below the midpoint, per feature.
    pub fn below(&self) -> &[u64] {
        &self.below
    }

    /// Number of values strictly above the midpoint, per feature.
    pub fn above(&self) -> &[u64] {
        &self.above
    }
}

/// A party of the federation.
pub struct Participant {
    id: usize,
    sk: SecretKey,
    features: Vec<Vec<f64>>,
    scratch: RoundScratch,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("features", &self.features.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.features.iter_mut().for_each(|values| values.zeroize());
    }
}

impl Participant {
    /// Creates a participant with a fresh secret key share.
    ///
    /// `features[j]` holds the participant's values of feature `j`; a
    /// participant may hold no value for a feature.
    pub fn new<R: RngCore + CryptoRng>(
        id: usize,
        par: &Arc<CkksParameters>,
        features: Vec<Vec<f64>>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::with_secret_key(id, SecretKey::random(par, rng), features)
    }

    /// Creates a participant from an existing secret key share.
    pub fn with_secret_key(id: usize, sk: SecretKey, features: Vec<Vec<f64>>) -> Result<Self> {
        if features.is_empty() {
            return Err(Error::UnspecifiedInput(format!(
                "Participant {id} has no feature"
            )));
        }
        if features.len() > sk.parameters().slots() {
            return Err(Error::UnspecifiedInput(format!(
                "Participant {id} has {} features, more than the {} slots",
                features.len(),
                sk.parameters().slots()
            )));
        }
        for (j, values) in features.iter().enumerate() {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::UnspecifiedInput(format!(
                    "Participant {id} has a non-finite value in feature {j}"
                )));
            }
        }
        Ok(Self {
            id,
            sk,
            features,
            scratch: RoundScratch::default(),
        })
    }

    /// The identity of the participant.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// The scheme parameters of the secret key share.
    pub fn parameters(&self) -> &Arc<CkksParameters> {
        self.sk.parameters()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.sk
    }

    /// Number of local values, per feature.
    pub fn local_counts(&self) -> Vec<u64> {
        self.features.iter().map(|v| v.len() as u64).collect()
    }

    /// Sum of the local values, per feature.
    pub fn local_sums(&self) -> Vec<f64> {
        self.features.iter().map(|v| v.iter().sum()).collect()
    }

    /// Smallest local value per feature, or `empty[j]` for a feature without
    /// local values.
    pub fn local_minimums(&self, empty: &[f64]) -> Result<Vec<f64>> {
        self.local_extrema(empty, f64::min)
    }

    /// Largest local value per feature, or `empty[j]` for a feature without
    /// local values.
    pub fn local_maximums(&self, empty: &[f64]) -> Result<Vec<f64>> {
        self.local_extrema(empty, f64::max)
    }

    fn local_extrema(&self, empty: &[f64], pick: fn(f64, f64) -> f64) -> Result<Vec<f64>> {
        self.check_features(empty.len())?;
        Ok(self
            .features
            .iter()
            .zip(empty)
            .map(|(values, e)| values.iter().copied().reduce(pick).unwrap_or(*e))
            .collect())
    }

    /// Sum of the squared deviations of the local values from `means[j]`,
    /// per feature.
    pub fn local_squared_deviations(&self, means: &[f64]) -> Result<Vec<f64>> {
        self.check_features(means.len())?;
        Ok(self
            .features
            .iter()
            .zip(means)
            .map(|(values, mean)| values.iter().map(|v| (v - mean) * (v - mean)).sum())
            .collect())
    }

    /// Counts, for every feature with a midpoint, the local values strictly
    /// below and strictly above it. Values equal to the midpoint are in
    /// neither count; features without a midpoint get zero counts.
    pub fn count_around(&mut self, midpoints: &[Option<f64>]) -> Result<&RoundScratch> {
        self.check_features(midpoints.len())?;
        self.scratch.clear();
        for (values, m) in self.features.iter().zip(midpoints) {
            let (below, above) = match m {
                Some(m) => values.iter().fold((0, 0), |(b, a), v| {
                    (b + u64::from(v < m), a + u64::from(v > m))
                }),
                None => (0, 0),
            };
            self.scratch.below.push(below);
            self.scratch.above.push(above);
        }
        Ok(&self.scratch)
    }

    /// The scratch buffers of the last round.
    pub fn scratch(&self) -> &RoundScratch {
        &self.scratch
    }

    fn check_features(&self, n: usize) -> Result<()> {
        if n != self.features.len() {
            return Err(Error::UnspecifiedInput(format!(
                "Expected {} per-feature values, found {n}",
                self.features.len()
            )));
        }
        Ok(())
    }

    /// Encrypts one value per feature under the collective public key; lane
    /// `j` holds `values[j]` and the remaining lanes are zero.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        values: &[f64],
        pk: &PublicKey,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let par = self.parameters();
        let pt = Zeroizing::new(Plaintext::try_encode(
            values,
            Encoding::default_for(par),
            par,
        )?);
        Ok(pk.try_encrypt(&*pt, rng)?)
    }

    /// Encrypts per-feature counts.
    pub fn encrypt_counts<R: RngCore + CryptoRng>(
        &self,
        counts: &[u64],
        pk: &PublicKey,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let values = Zeroizing::new(counts.iter().map(|c| *c as f64).collect::<Vec<_>>());
        self.encrypt(&values, pk, rng)
    }

    /// Share of the collective public key.
    pub fn public_key_share<R: RngCore + CryptoRng>(
        &self,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> fedstat_ckks::Result<PublicKeyShare> {
        PublicKeyShare::new(&self.sk, crp, rng)
    }

    /// Generator of the shares of the collective relinearization key.
    pub fn relin_key_generator<'a, R: RngCore + CryptoRng>(
        &'a self,
        crp: &'a CommonRandomPoly,
        rng: &mut R,
    ) -> RelinKeyGenerator<'a> {
        RelinKeyGenerator::new(&self.sk, crp, rng)
    }

    /// Share of a collective rotation or conjugation key.
    pub fn galois_key_share<R: RngCore + CryptoRng>(
        &self,
        element: GaloisElement,
        crp: CommonRandomPoly,
        rng: &mut R,
    ) -> fedstat_ckks::Result<GaloisKeyShare> {
        GaloisKeyShare::new(&self.sk, element, crp, rng)
    }

    /// Share of the switch of `ct` towards `pk_out`.
    pub fn key_switch_share<R: RngCore + CryptoRng>(
        &self,
        pk_out: &PublicKey,
        ct: Arc<Ciphertext>,
        smudging: &Smudging,
        rng: &mut R,
    ) -> fedstat_ckks::Result<PublicKeySwitchShare> {
        PublicKeySwitchShare::new(&self.sk, pk_out, ct, smudging, rng)
    }

    /// Share of the refresh of `ct`, with masks of `log_bound` bits.
    pub fn refresh_share<R: RngCore + CryptoRng>(
        &self,
        ct: Arc<Ciphertext>,
        crp: CommonRandomPoly,
        smudging: &Smudging,
        log_bound: u32,
        rng: &mut R,
    ) -> fedstat_ckks::Result<RefreshShare> {
        RefreshShare::new(&self.sk, ct, crp, smudging, log_bound, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::Participant;
    use crate::Error;
    use fedstat_ckks::ckks::CkksParameters;
    use rand::thread_rng;

    fn participant() -> Participant {
        let par = CkksParameters::default_arc(8).unwrap();
        Participant::new(
            3,
            &par,
            vec![vec![0.5, -1.0, 2.0, 0.5], vec![], vec![4.0]],
            &mut thread_rng(),
        )
        .unwrap()
    }

    #[test]
    fn local_statistics() {
        let p = participant();
        assert_eq!(p.id(), 3);
        assert_eq!(p.n_features(), 3);
        assert_eq!(p.local_counts(), vec![4, 0, 1]);
        assert_eq!(p.local_sums(), vec![2.0, 0.0, 4.0]);
        assert_eq!(
            p.local_minimums(&[9.0, 9.0, 9.0]).unwrap(),
            vec![-1.0, 9.0, 4.0]
        );
        assert_eq!(
            p.local_maximums(&[-9.0, -9.0, -9.0]).unwrap(),
            vec![2.0, -9.0, 4.0]
        );
        assert_eq!(
            p.local_squared_deviations(&[0.5, 0.0, 3.0]).unwrap(),
            vec![0.0 + 2.25 + 2.25 + 0.0, 0.0, 1.0]
        );
        assert!(p.local_minimums(&[0.0]).is_err());
    }

    #[test]
    fn counts_exclude_ties_and_reset_every_round() {
        let mut p = participant();
        let scratch = p.count_around(&[Some(0.5), Some(0.0), None]).unwrap();
        assert_eq!(scratch.below(), &[1, 0, 0]);
        assert_eq!(scratch.above(), &[1, 0, 0]);

        let scratch = p.count_around(&[None, None, Some(5.0)]).unwrap();
        assert_eq!(scratch.below(), &[0, 0, 1]);
        assert_eq!(scratch.above(), &[0, 0, 0]);
        assert_eq!(p.scratch().below().len(), 3);

        assert!(matches!(
            p.count_around(&[Some(0.0)]),
            Err(Error::UnspecifiedInput(_))
        ));
    }

    #[test]
    fn rejects_invalid_data() {
        let par = CkksParameters::default_arc(2).unwrap();
        let mut rng = thread_rng();
        assert!(Participant::new(0, &par, vec![], &mut rng).is_err());
        assert!(Participant::new(0, &par, vec![vec![]; 3], &mut rng).is_err());
        assert!(Participant::new(0, &par, vec![vec![f64::NAN]], &mut rng).is_err());
        assert!(Participant::new(0, &par, vec![vec![1.0], vec![]], &mut rng).is_ok());
    }
}
