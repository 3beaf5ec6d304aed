//! Round failure descriptions.

use std::fmt;

/// Why a synchronous round failed.
///
/// `missing` lists the peers that did not deliver a payload in time; the
/// message records everything else, including per-peer verification
/// failures. Either way the failure is fatal to the protocol step that was
/// driving the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundError {
    msg: String,
    missing: Vec<u16>,
}

impl RoundError {
    pub(crate) fn new(msg: impl Into<String>, missing: Vec<u16>) -> Self {
        Self {
            msg: msg.into(),
            missing,
        }
    }

    pub(crate) fn wrap(msg: impl Into<String>) -> Self {
        Self::new(msg, Vec::new())
    }

    /// The parties that did not deliver a payload in time.
    pub fn missing(&self) -> &[u16] {
        &self.missing
    }
}

impl fmt::Display for RoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{} (missing: {:?})", self.msg, self.missing)
        }
    }
}
