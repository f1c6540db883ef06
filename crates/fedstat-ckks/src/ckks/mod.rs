//! The simulated CKKS scheme.

mod bootstrapping;
mod ciphertext;
mod comparison;
mod evaluator;
mod inverse;
mod keys;
mod parameters;
mod plaintext;

pub use bootstrapping::Bootstrapper;
pub use ciphertext::Ciphertext;
pub use comparison::{ComparisonEvaluator, SignPolynomial};
pub use evaluator::Evaluator;
pub use inverse::InverseEvaluator;
pub(crate) use keys::KeySwitchingKey;
pub use keys::{
    EvaluationKeySet, GaloisElement, GaloisKey, PublicKey, RelinearizationKey, SecretKey,
};
pub use parameters::{CkksParameters, CkksParametersBuilder, CkksParametersLiteral};
pub use plaintext::{Encoding, Plaintext};
