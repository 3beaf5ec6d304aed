//! Non-malleable commitment envelope.
//!
//! A placeholder scheme bundling the value-bearing `data` bytes and the
//! `zkp` proof blob of a commit/open round. Commit broadcasts the envelope,
//! open reveals the two byte strings, and verification is byte-exact
//! equality against the envelope received in the commit round. The scheme
//! can be swapped for a proper non-malleable commitment without touching
//! any other layer: only the envelope bytes change.

use crate::{
    errors::{CryptoError, Error, Result},
    utils::{take_len_prefixed, write_len_prefixed, ParseBytes},
};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmcEnvelope {
    data: Vec<u8>,
    zkp: Vec<u8>,
}

impl NmcEnvelope {
    /// Commit to a payload and its proof blob.
    pub fn new(data: Vec<u8>, zkp: Vec<u8>) -> Self {
        Self { data, zkp }
    }

    /// Check that an opening reproduces this envelope exactly.
    pub fn verify(&self, data: &[u8], zkp: &[u8]) -> Result<()> {
        if self.data != data {
            error!("wrong data bytes in commitment opening");
            return Err(Error::Crypto(CryptoError::NmcMismatch));
        }
        if self.zkp != zkp {
            error!("wrong proof bytes in commitment opening");
            return Err(Error::Crypto(CryptoError::NmcMismatch));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len() + self.zkp.len());
        write_len_prefixed(&mut out, &self.data);
        write_len_prefixed(&mut out, &self.zkp);
        out
    }

    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let data = take_len_prefixed(&mut parser)?;
        let zkp = take_len_prefixed(&mut parser)?;
        if !parser.is_empty() {
            error!("trailing bytes after an encoded envelope");
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        Ok(Self { data, zkp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_must_match_exactly() {
        let nmc = NmcEnvelope::new(b"data".to_vec(), b"zkp".to_vec());
        assert!(nmc.verify(b"data", b"zkp").is_ok());
        assert!(nmc.verify(b"data!", b"zkp").is_err());
        assert!(nmc.verify(b"data", b"zkp!").is_err());
    }

    #[test]
    fn codec_round_trips() {
        let nmc = NmcEnvelope::new(vec![1, 2, 3], vec![]);
        let decoded = NmcEnvelope::try_from_bytes(&nmc.to_bytes()).unwrap();
        assert_eq!(nmc, decoded);
    }
}
