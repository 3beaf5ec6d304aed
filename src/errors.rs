//! Error types surfaced by the protocol.
//!
//! Every failure bubbles up to the `Init` / `Presign` / `Sign` entry points;
//! there is no intra-protocol retry. A single unreachable or misbehaving
//! peer aborts the whole session and recovery happens at the operator level.

use crate::sync::RoundError;
use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy.
#[derive(Debug)]
pub enum Error {
    /// Malformed member or committee file, or other unusable configuration.
    Config(String),
    /// A connection-level failure: dial, write, read, or shutdown mid-round.
    Transport(String),
    /// One or more peers failed to deliver or verify within a round.
    Round(RoundError),
    /// A cryptographic check failed.
    Crypto(CryptoError),
    /// The caller drove the protocol state machine incorrectly.
    Protocol(String),
}

/// Failures of cryptographic verification or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A zero-knowledge proof did not verify.
    FailedProof,
    /// An opening did not recompose to the previously received envelope.
    NmcMismatch,
    /// The final CheckDH equation did not balance.
    WrongValue,
    /// A Paillier ciphertext could not be decrypted to an in-range plaintext.
    PaillierDecrypt,
    /// Bytes could not be decoded as a curve point, commitment, or scalar.
    Deserialization,
    /// An opening `(v, r)` did not reproduce the commitment it claims to open.
    BadOpening,
    /// A scalar that must be invertible mod q was zero.
    NotInvertible,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::FailedProof => write!(f, "zero-knowledge proof failed to verify"),
            CryptoError::NmcMismatch => write!(f, "opening does not match committed envelope"),
            CryptoError::WrongValue => write!(f, "wrong value"),
            CryptoError::PaillierDecrypt => write!(f, "Paillier decryption failed"),
            CryptoError::Deserialization => write!(f, "failed to deserialize cryptographic value"),
            CryptoError::BadOpening => write!(f, "opening does not reproduce the commitment"),
            CryptoError::NotInvertible => write!(f, "scalar is not invertible"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Round(err) => write!(f, "round error: {err}"),
            Error::Crypto(err) => write!(f, "crypto error: {err}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RoundError> for Error {
    fn from(err: RoundError) -> Self {
        Error::Round(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
