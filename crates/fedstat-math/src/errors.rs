use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates an invalid number of slots.
    #[error("Invalid number of slots: found {0}, expected {1}")]
    InvalidSlots(usize, usize),

    /// Indicates that too many values were provided.
    #[error("Too many values provided: {0} exceeds limit {1}")]
    TooManyValues(usize, usize),

    /// Indicates a NaN or infinite value to encode.
    #[error("Non-finite value in slot {0}")]
    NonFinite(usize),

    /// Indicates a value too large for the modulus it is encoded in.
    #[error("Value in slot {0} overflows the modulus")]
    Overflow(usize),

    /// Indicates ring elements of different moduli.
    #[error("Invalid modulus: found 2^{0}, expected 2^{1}")]
    InvalidModulus(u32, u32),

    /// Indicates a default error.
    #[error("{0}")]
    Default(String),
}
