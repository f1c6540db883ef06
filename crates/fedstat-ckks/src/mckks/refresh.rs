use std::sync::Arc;

use crate::ckks::{Ciphertext, CkksParameters, SecretKey};
use crate::{Error, Result};
use fedstat_math::rq::Poly;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use super::{fingerprint, Aggregate, CommonRandomPoly, ShareSum, Smudging};

/// Minimum level at which a ciphertext can be refreshed securely.
///
/// The masks of the refresh protocol must statistically hide the plaintext:
/// with `log_bound = lambda + log_scale`, the sum of the masks of
/// `n_parties` parties needs `ceil(log_bound + log2(n_parties))` bits of
/// modulus. Returns the smallest level whose modulus is large enough,
/// together with `log_bound`, or `None` if the chain is too short.
pub fn minimum_level_for_refresh(
    lambda: u32,
    log_scale: u32,
    n_parties: usize,
    log_q: &[u32],
) -> Option<(usize, u32)> {
    if n_parties == 0 {
        return None;
    }
    let log_bound = lambda + log_scale;
    let max_bound = (log_bound as f64 + (n_parties as f64).log2()).ceil();
    let mut log_modulus = 0f64;
    for (level, log_qi) in log_q.iter().enumerate() {
        log_modulus += *log_qi as f64;
        if log_modulus >= max_bound {
            return Some((level, log_bound));
        }
    }
    None
}

/// A party's share in the refresh protocol.
///
/// The parties jointly re-encrypt a ciphertext at the maximum level: each
/// party masks its decryption share with a fresh mask, uniform in
/// `[-2^(log_bound - 1), 2^(log_bound - 1))`, and publishes an encryption of
/// the negated mask under the common random polynomial. The masked
/// plaintext is lifted from the modulus of the input level to the modulus of
/// the maximum level, which is exact as long as it does not wrap around.
/// Use the [`Aggregate`] impl to combine the shares into the refreshed
/// [`Ciphertext`].
#[derive(Debug, PartialEq, Clone)]
pub struct RefreshShare {
    pub(crate) par: Arc<CkksParameters>,
    pub(crate) ct: Arc<Ciphertext>,
    pub(crate) crp: CommonRandomPoly,
    pub(crate) h0: Poly,
    pub(crate) h1: Poly,
    pub(crate) fingerprint: [u8; 32],
}

impl RefreshShare {
    /// Participate in a new refresh protocol.
    ///
    /// 1. *Private input*: secret key share
    /// 2. *Public input*: ciphertext to refresh
    /// 3. *Public input*: common random polynomial
    /// 4. *Public input*: smudging noise distribution
    /// 5. *Public input*: bit size of the masks
    pub fn new<R: RngCore + CryptoRng>(
        sk_share: &SecretKey,
        ct: Arc<Ciphertext>,
        crp: CommonRandomPoly,
        smudging: &Smudging,
        log_bound: u32,
        rng: &mut R,
    ) -> Result<Self> {
        if !CkksParameters::same(&sk_share.par, &ct.par) {
            return Err(Error::ParametersMismatch);
        }
        if ct.c.len() != 2 {
            return Err(Error::TooManyValues(ct.c.len(), 2));
        }
        let par = sk_share.par.clone();
        if ct.log_scale != par.log_default_scale() {
            return Err(Error::ScaleMismatch(ct.log_scale, par.log_default_scale()));
        }
        let log_in = par.log_modulus_at(ct.level)?;
        if log_bound >= log_in {
            return Err(Error::LevelTooLow {
                level: ct.level,
                required: ct.level + 1,
            });
        }
        smudging.validate()?;

        let log_out = par.log_modulus_at(par.max_level())?;
        let slots = par.slots();
        let mask = Zeroizing::new(Poly::uniform(slots, log_bound, log_in, rng));
        let e0 = smudging.sample(slots, log_in, rng)?;
        let e1 = Zeroizing::new(Poly::gaussian(
            slots,
            log_out,
            par.error_std,
            par.error_bound,
            rng,
        )?);

        // Masked decryption share, at the level of the input.
        let mut h0 = &ct.c[1] * &*sk_share.poly(log_in);
        h0 += &*mask;
        h0 += &*e0;

        // Encryption of the negated mask at the maximum level.
        let mut h1 = -(&crp.at(log_out) * &*sk_share.poly(log_out));
        h1 -= &*Zeroizing::new(mask.change_modulus(log_out));
        h1 += &*e1;

        let fingerprint = fingerprint(
            b"refresh",
            &[ct.level as u64, ct.log_scale as u64, log_bound as u64],
            ct.c.iter().chain([&crp.poly]),
        );
        Ok(Self {
            par,
            ct,
            crp,
            h0,
            h1,
            fingerprint,
        })
    }

    /// The digest of the public inputs of the share.
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }
}

impl Aggregate<RefreshShare> for Ciphertext {
    fn from_shares<T>(iter: T) -> Result<Self>
    where
        T: IntoIterator<Item = RefreshShare>,
    {
        let mut shares = iter.into_iter();
        let share = shares.next().ok_or(Error::TooFewValues(0, 1))?;
        let mut sum = ShareSum::new(&share.par, share.fingerprint);
        sum.add(&share.par, &share.fingerprint, [&share.h0, &share.h1])?;
        for sh in shares {
            sum.add(&sh.par, &sh.fingerprint, [&sh.h0, &sh.h1])?;
        }
        let [h0, h1] = sum.finish()?;

        // c0 + h0 is the masked plaintext; adding h1 removes the masks under
        // the fresh encryption.
        let masked = &share.ct.c[0] + &h0;
        let mut c0 = masked.change_modulus(h1.log_modulus());
        c0 += &h1;
        let c1 = share.crp.at(h1.log_modulus());
        let par = share.par;
        Ciphertext::new(
            vec![c0, c1],
            par.max_level(),
            par.log_default_scale(),
            &par,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{minimum_level_for_refresh, RefreshShare};
    use crate::ckks::{Ciphertext, CkksParameters, Encoding, Plaintext, SecretKey};
    use crate::mckks::{Aggregate, CommonRandomPoly, Smudging};
    use crate::Error;
    use fedstat_traits::{FheCiphertext, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};
    use proptest::prelude::*;
    use rand::thread_rng;
    use std::sync::Arc;

    #[test]
    fn minimum_level() {
        let mut log_q = vec![55];
        log_q.extend([45; 14]);
        // 128 + 45 = 173 bits, plus 2 bits for four parties: q_0..q_3 hold 190.
        assert_eq!(minimum_level_for_refresh(128, 45, 4, &log_q), Some((3, 173)));
        assert_eq!(minimum_level_for_refresh(128, 45, 1, &log_q), Some((3, 173)));
        assert_eq!(minimum_level_for_refresh(80, 45, 2, &log_q), Some((2, 125)));
        assert_eq!(minimum_level_for_refresh(128, 45, 4, &log_q[..3]), None);
        assert_eq!(minimum_level_for_refresh(128, 45, 0, &log_q), None);
    }

    proptest! {
        #[test]
        fn minimum_level_is_minimal(lambda in 0u32..256, n in 1usize..64) {
            let mut log_q = vec![55];
            log_q.extend([45; 14]);
            if let Some((level, log_bound)) = minimum_level_for_refresh(lambda, 45, n, &log_q) {
                let required = (log_bound as f64 + (n as f64).log2()).ceil();
                let up_to = |l: usize| log_q[..=l].iter().sum::<u32>() as f64;
                prop_assert!(up_to(level) >= required);
                if level > 0 {
                    prop_assert!(up_to(level - 1) < required);
                }
            } else {
                prop_assert!(log_q.iter().sum::<u32>() as f64 <= (lambda as f64 + 45.0 + (n as f64).log2()).ceil());
            }
        }
    }

    #[test]
    fn refresh() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(8).unwrap();
        let sk_shares = (0..3)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect::<Vec<_>>();
        let ideal = SecretKey::ideal(&sk_shares).unwrap();
        let values = vec![0.125, -4.0, 1e3, 0.0, 3.5];
        let pt = Plaintext::try_encode(&values, Encoding::at_level(&par, 3), &par).unwrap();
        let ct = Arc::new(ideal.try_encrypt(&pt, &mut rng).unwrap());
        let crp = CommonRandomPoly::new(&par, &mut rng);

        let shares = sk_shares
            .iter()
            .map(|sk| {
                RefreshShare::new(sk, ct.clone(), crp.clone(), &Smudging::default(), 173, &mut rng)
                    .unwrap()
            })
            .collect::<Vec<_>>();
        let refreshed = Ciphertext::from_shares(shares.clone()).unwrap();
        assert_eq!(refreshed.level(), par.max_level());
        assert_eq!(refreshed.log_scale(), 45.0);
        let decrypted = Vec::<f64>::try_decode(&ideal.try_decrypt(&refreshed).unwrap()).unwrap();
        for (d, v) in decrypted.iter().zip(&values) {
            assert!((d - v).abs() < 1e-9, "{d} != {v}");
        }

        assert_eq!(
            Ciphertext::from_shares(shares.into_iter().rev()).unwrap(),
            refreshed
        );
    }

    #[test]
    fn missing_party() {
        let mut rng = thread_rng();
        let par = CkksParameters::default_arc(64).unwrap();
        let sk_shares = (0..3)
            .map(|_| SecretKey::random(&par, &mut rng))
            .collect::<Vec<_>>();
        let ideal = SecretKey::ideal(&sk_shares).unwrap();
        let pt = Plaintext::try_encode(&[1.0; 64][..], Encoding::at_level(&par, 3), &par).unwrap();
        let ct = Arc::new(ideal.try_encrypt(&pt, &mut rng).unwrap());
        let crp = CommonRandomPoly::new(&par, &mut rng);
        let smudging = Smudging::default();
        // Without every party, the output does not encrypt the input.
        let refreshed = Ciphertext::from_shares(sk_shares[..2].iter().map(|sk| {
            RefreshShare::new(sk, ct.clone(), crp.clone(), &smudging, 173, &mut rng).unwrap()
        }))
        .unwrap();
        let decrypted = Vec::<f64>::try_decode(&ideal.try_decrypt(&refreshed).unwrap()).unwrap();
        assert!(decrypted.iter().any(|d| (d - 1.0).abs() > 1e-6));

        let other = CkksParameters::default_arc(16).unwrap();
        let foreign = SecretKey::random(&other, &mut rng);
        assert_eq!(
            RefreshShare::new(&foreign, ct.clone(), crp.clone(), &smudging, 173, &mut rng)
                .unwrap_err(),
            Error::ParametersMismatch
        );

        let scaled = Arc::new(Ciphertext::new(ct.c.clone(), 3, 90, &par).unwrap());
        assert_eq!(
            RefreshShare::new(&sk_shares[0], scaled, crp.clone(), &smudging, 173, &mut rng)
                .unwrap_err(),
            Error::ScaleMismatch(90, 45)
        );
        assert_eq!(
            RefreshShare::new(&sk_shares[0], ct, crp, &smudging, 190, &mut rng).unwrap_err(),
            Error::LevelTooLow {
                level: 3,
                required: 4
            }
        );
    }
}
