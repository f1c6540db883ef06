use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an error in the underlying mathematical library was
    /// encountered.
    #[error("{0}")]
    MathError(#[from] fedstat_math::Error),

    /// Indicates an error in the parameters.
    #[error("{0}")]
    ParametersError(#[from] ParametersError),

    /// Indicates that too few values were provided.
    #[error("Too few values provided: {0} is below limit {1}")]
    TooFewValues(usize, usize),

    /// Indicates that too many values were provided.
    #[error("Too many values provided: {0} exceeds limit {1}")]
    TooManyValues(usize, usize),

    /// Indicates that an input is invalid.
    #[error("{0}")]
    UnspecifiedInput(String),

    /// Indicates that a ciphertext does not have enough levels left.
    #[error("Level too low: found {level}, requires at least {required}")]
    LevelTooLow {
        /// Level of the ciphertext.
        level: usize,
        /// Minimum level required by the operation.
        required: usize,
    },

    /// Indicates that two operands have different scales.
    #[error("Scale mismatch: 2^{0} and 2^{1}")]
    ScaleMismatch(u32, u32),

    /// Indicates that objects built from different parameters were combined.
    #[error("Mismatched parameters")]
    ParametersMismatch,

    /// Indicates that an evaluation key is missing.
    #[error("Missing evaluation key: {0}")]
    MissingKey(String),

    /// Indicates that protocol shares are inconsistent with each other.
    #[error("Share mismatch: {0}")]
    ShareMismatch(String),

    /// Indicates a default error.
    #[error("{0}")]
    DefaultError(String),
}

/// Separate enum to indicate parameters-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParametersError {
    /// Indicates that the number of slots is invalid.
    #[error("Invalid number of slots: {0}")]
    InvalidSlots(usize),

    /// Indicates that the modulus size is invalid.
    #[error("Invalid modulus size: {0}, expected an integer between {1} and {2}")]
    InvalidModulusSize(u32, u32, u32),

    /// Indicates that the modulus chain is too short.
    #[error("Modulus chain too short: {0} moduli, at least {1} required")]
    ChainTooShort(usize, usize),

    /// Indicates that the scale is incompatible with the modulus chain.
    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    /// Indicates that the error distribution is invalid.
    #[error("Invalid error distribution: {0}")]
    InvalidErrorDistribution(String),
}
