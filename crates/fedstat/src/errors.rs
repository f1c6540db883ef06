use std::fmt;

use thiserror::Error;

/// The Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// The multiparty protocols run by the federation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Collective public key generation.
    PublicKeyGeneration,
    /// Collective relinearization key generation, first round.
    RelinearizationRound1,
    /// Collective relinearization key generation, second round.
    RelinearizationRound2,
    /// Collective rotation or conjugation key generation.
    GaloisKeyGeneration,
    /// Collective public key switch (decryption towards a requester).
    PublicKeySwitch,
    /// Collective refresh.
    Refresh,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::PublicKeyGeneration => "public key generation",
            Protocol::RelinearizationRound1 => "relinearization key generation (round 1)",
            Protocol::RelinearizationRound2 => "relinearization key generation (round 2)",
            Protocol::GaloisKeyGeneration => "Galois key generation",
            Protocol::PublicKeySwitch => "public key switch",
            Protocol::Refresh => "refresh",
        };
        f.write_str(name)
    }
}

fn party_suffix(party: &Option<usize>) -> String {
    match party {
        Some(party) => format!(" from party {party}"),
        None => String::new(),
    }
}

/// Enum encapsulating all the possible errors from this library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Indicates that a ciphertext does not have enough levels left for an
    /// operation or for a secure refresh.
    #[error("Level too low: found {level}, requires at least {required}")]
    LevelTooLow {
        /// Level of the ciphertext.
        level: usize,
        /// Minimum level required.
        required: usize,
    },

    /// Indicates that a protocol share was malformed or computed against
    /// different public inputs than the other shares.
    #[error("Share mismatch in {protocol}{}: {reason}", party_suffix(.party))]
    ProtocolShareMismatch {
        /// The protocol in which the mismatch was detected.
        protocol: Protocol,
        /// The offending party, when it can be identified.
        party: Option<usize>,
        /// Description of the mismatch.
        reason: String,
    },

    /// Indicates that a bisection did not resolve within the round cap.
    #[error("Bisection for feature {feature} did not resolve within {rounds} rounds")]
    NonTerminatingBisection {
        /// The unresolved feature.
        feature: usize,
        /// Number of rounds run.
        rounds: usize,
    },

    /// Indicates that no participant holds a value for a feature.
    #[error("Feature {feature} has no values at any participant")]
    InvalidPartition {
        /// The empty feature.
        feature: usize,
    },

    /// Indicates a rank outside of the values of a feature.
    #[error("Invalid rank {rank} for feature {feature} with {total} values")]
    InvalidRank {
        /// The feature queried.
        feature: usize,
        /// The requested rank.
        rank: usize,
        /// Number of values of the feature.
        total: u64,
    },

    /// Indicates an invalid protocol configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Indicates that an input is invalid.
    #[error("{0}")]
    UnspecifiedInput(String),

    /// Indicates that a bisection round failed.
    #[error("Round {round} failed: {source}")]
    RoundFailed {
        /// The failing round, starting at 1.
        round: usize,
        /// The cause of the failure.
        source: Box<Error>,
    },

    /// Indicates an error of the encryption scheme.
    #[error("{0}")]
    Scheme(#[source] fedstat_ckks::Error),
}

impl Error {
    /// Maps a scheme error raised while running `protocol` onto the error
    /// taxonomy of this library.
    pub(crate) fn from_protocol(protocol: Protocol, e: fedstat_ckks::Error) -> Self {
        match e {
            fedstat_ckks::Error::ShareMismatch(reason) => Error::ProtocolShareMismatch {
                protocol,
                party: None,
                reason,
            },
            fedstat_ckks::Error::ParametersMismatch => Error::ProtocolShareMismatch {
                protocol,
                party: None,
                reason: "share built from different parameters".to_string(),
            },
            fedstat_ckks::Error::TooFewValues(0, _) => Error::ProtocolShareMismatch {
                protocol,
                party: None,
                reason: "no shares to aggregate".to_string(),
            },
            e => e.into(),
        }
    }

    pub(crate) fn in_round(self, round: usize) -> Self {
        Error::RoundFailed {
            round,
            source: Box::new(self),
        }
    }
}

impl From<fedstat_ckks::Error> for Error {
    fn from(e: fedstat_ckks::Error) -> Self {
        match e {
            fedstat_ckks::Error::LevelTooLow { level, required } => {
                Error::LevelTooLow { level, required }
            }
            // Homomorphic evaluation only runs a protocol when it refreshes.
            fedstat_ckks::Error::ShareMismatch(reason) => Error::ProtocolShareMismatch {
                protocol: Protocol::Refresh,
                party: None,
                reason,
            },
            e => Error::Scheme(e),
        }
    }
}

impl From<Error> for fedstat_ckks::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::LevelTooLow { level, required } => {
                fedstat_ckks::Error::LevelTooLow { level, required }
            }
            Error::Scheme(e) => e,
            e @ Error::ProtocolShareMismatch { .. } => {
                fedstat_ckks::Error::ShareMismatch(e.to_string())
            }
            e => fedstat_ckks::Error::DefaultError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Protocol};

    #[test]
    fn error_strings() {
        assert_eq!(
            Error::LevelTooLow {
                level: 2,
                required: 3
            }
            .to_string(),
            "Level too low: found 2, requires at least 3"
        );
        assert_eq!(
            Error::ProtocolShareMismatch {
                protocol: Protocol::PublicKeySwitch,
                party: Some(2),
                reason: "different ciphertext".to_string()
            }
            .to_string(),
            "Share mismatch in public key switch from party 2: different ciphertext"
        );
        assert_eq!(
            Error::ProtocolShareMismatch {
                protocol: Protocol::Refresh,
                party: None,
                reason: "bad".to_string()
            }
            .to_string(),
            "Share mismatch in refresh: bad"
        );
        assert_eq!(
            Error::NonTerminatingBisection {
                feature: 1,
                rounds: 40
            }
            .to_string(),
            "Bisection for feature 1 did not resolve within 40 rounds"
        );
        assert_eq!(
            Error::InvalidPartition { feature: 0 }.to_string(),
            "Feature 0 has no values at any participant"
        );
        assert_eq!(
            Error::InvalidRank {
                feature: 0,
                rank: 9,
                total: 8
            }
            .to_string(),
            "Invalid rank 9 for feature 0 with 8 values"
        );
        assert_eq!(
            Error::InvalidPartition { feature: 3 }.in_round(5).to_string(),
            "Round 5 failed: Feature 3 has no values at any participant"
        );
    }

    #[test]
    fn scheme_errors_map_onto_taxonomy() {
        let e: Error = fedstat_ckks::Error::LevelTooLow {
            level: 1,
            required: 3,
        }
        .into();
        assert_eq!(
            e,
            Error::LevelTooLow {
                level: 1,
                required: 3
            }
        );

        let e = Error::from_protocol(
            Protocol::PublicKeyGeneration,
            fedstat_ckks::Error::ShareMismatch("x".to_string()),
        );
        assert!(matches!(
            e,
            Error::ProtocolShareMismatch {
                protocol: Protocol::PublicKeyGeneration,
                party: None,
                ..
            }
        ));

        let e: Error = fedstat_ckks::Error::MissingKey("Conjugation".to_string()).into();
        assert_eq!(
            e,
            Error::Scheme(fedstat_ckks::Error::MissingKey("Conjugation".to_string()))
        );
    }

    #[test]
    fn level_errors_survive_the_scheme_boundary() {
        let scheme: fedstat_ckks::Error = Error::LevelTooLow {
            level: 0,
            required: 3,
        }
        .into();
        assert_eq!(
            Error::from(scheme),
            Error::LevelTooLow {
                level: 0,
                required: 3
            }
        );
    }
}
