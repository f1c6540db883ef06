//! The refresh interface of the evaluator.

use crate::ckks::Ciphertext;
use crate::Result;

/// Restores the level of ciphertexts.
///
/// Implementations may run a single-key bootstrapping circuit or an
/// interactive multiparty refresh; the comparison and inverse evaluators
/// only rely on this interface.
pub trait Bootstrapper {
    /// Refresh a ciphertext to [`Bootstrapper::output_level`].
    fn bootstrap(&self, ct: &Ciphertext) -> Result<Ciphertext>;

    /// Refresh a batch of ciphertexts.
    fn bootstrap_many(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
        cts.iter().map(|ct| self.bootstrap(ct)).collect()
    }

    /// Number of levels consumed by the refresh itself.
    fn depth(&self) -> usize;

    /// Minimum level a ciphertext must have to be refreshed.
    fn minimum_input_level(&self) -> usize;

    /// Level of refreshed ciphertexts.
    fn output_level(&self) -> usize;
}

/// Refreshes by decrypting and re-encrypting with a known secret key.
#[cfg(test)]
pub(crate) struct IdealBootstrapper {
    pub(crate) sk: crate::ckks::SecretKey,
    pub(crate) minimum_level: usize,
}

#[cfg(test)]
impl Bootstrapper for IdealBootstrapper {
    fn bootstrap(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        use crate::ckks::{Encoding, Plaintext};
        use fedstat_traits::{FheDecoder, FheDecrypter, FheEncoder, FheEncrypter};

        if ct.level < self.minimum_level {
            return Err(crate::Error::LevelTooLow {
                level: ct.level,
                required: self.minimum_level,
            });
        }
        let values = Vec::<f64>::try_decode(&self.sk.try_decrypt(ct)?)?;
        let encoding = Encoding::at_level(&ct.par, self.output_level());
        let pt = Plaintext::try_encode(&values, encoding, &ct.par)?;
        self.sk.try_encrypt(&pt, &mut rand::thread_rng())
    }

    fn depth(&self) -> usize {
        0
    }

    fn minimum_input_level(&self) -> usize {
        self.minimum_level
    }

    fn output_level(&self) -> usize {
        self.sk.par.max_level()
    }
}
