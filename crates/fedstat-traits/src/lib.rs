#![crate_name = "fedstat_traits"]
#![crate_type = "lib"]
#![warn(missing_docs, unused_imports)]

//! Traits for approximate homomorphic encryption schemes.
//!
//! These traits are scheme-agnostic: the statistic pipelines only talk to
//! a scheme through them and through the evaluator of the backend crate.

use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// The parameters of an encryption scheme.
pub trait FheParameters {}

/// Indicates that an object is parametrized.
pub trait FheParametrized {
    /// The type of the FHE parameters.
    type Parameters: FheParameters;
}

/// Indicates that an object is a plaintext.
pub trait FhePlaintext
where
    Self: Sized + FheParametrized,
{
    /// The type of encoding of the plaintext.
    type Encoding;
}

/// Encode a value into a plaintext.
pub trait FheEncoder<V>
where
    Self: FhePlaintext,
{
    /// The type of error returned.
    type Error;

    /// Attempt to encode a value using the specified encoding.
    fn try_encode(
        value: V,
        encoding: Self::Encoding,
        par: &Arc<Self::Parameters>,
    ) -> Result<Self, Self::Error>;
}

/// Decode the value in the plaintext.
pub trait FheDecoder<P: FhePlaintext>
where
    Self: Sized,
{
    /// The type of error returned.
    type Error;

    /// Attempt to decode a plaintext. Approximate schemes return the slot
    /// values as read, rounding is left to the caller.
    fn try_decode(pt: &P) -> Result<Self, Self::Error>;
}

/// A ciphertext which will encrypt a plaintext.
pub trait FheCiphertext
where
    Self: Sized + FheParametrized,
{
    /// The remaining homomorphic budget of the ciphertext.
    fn level(&self) -> usize;

    /// The base-2 logarithm of the fixed-point scale of the ciphertext.
    fn log_scale(&self) -> f64;
}

/// Encrypt a plaintext into a ciphertext.
pub trait FheEncrypter<
    P: FheParametrized + FhePlaintext,
    C: FheParametrized + FheCiphertext,
>
{
    /// The type of error returned.
    type Error;

    /// Try to encrypt an [`FhePlaintext`] into an [`FheCiphertext`].
    fn try_encrypt<R: RngCore + CryptoRng>(&self, pt: &P, rng: &mut R) -> Result<C, Self::Error>;
}

/// Decrypt a ciphertext into a plaintext.
pub trait FheDecrypter<
    P: FheParametrized + FhePlaintext,
    C: FheParametrized + FheCiphertext,
>
{
    /// The type of error returned.
    type Error;

    /// Try to decrypt an [`FheCiphertext`] into an [`FhePlaintext`].
    fn try_decrypt(&self, ct: &C) -> Result<P, Self::Error>;
}
