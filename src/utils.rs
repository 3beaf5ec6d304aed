// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::errors::{CryptoError, Error, Result};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use tracing::error;
use zeroize::Zeroize;

pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Helper type for parsing byte arrays into fields.
///
/// This type implements [`Zeroize`]. When parsing secret values, call
/// `zeroize()` once parsing is complete.
#[derive(Zeroize)]
pub(crate) struct ParseBytes {
    bytes: Vec<u8>,
    offset: usize,
}

impl ParseBytes {
    /// Consume bytes for parsing.
    pub(crate) fn new(bytes: Vec<u8>) -> ParseBytes {
        ParseBytes { bytes, offset: 0 }
    }

    /// Take next `n` bytes from the array.
    pub(crate) fn take_bytes(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .offset
            .checked_add(n)
            .ok_or(Error::Crypto(CryptoError::Deserialization))?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(Error::Crypto(CryptoError::Deserialization))?;
        self.offset = end;
        Ok(slice)
    }

    /// Parse the next 4 bytes as a big-endian length field.
    pub(crate) fn take_u32_len(&mut self) -> Result<usize> {
        let slice = self.take_bytes(4)?;
        let arr: [u8; 4] = slice.try_into().map_err(|_| {
            error!("4-byte slice did not convert to a 4-byte array");
            Error::Crypto(CryptoError::Deserialization)
        })?;
        Ok(u32::from_be_bytes(arr) as usize)
    }

    /// Parse the next 2 bytes as a little-endian length field.
    pub(crate) fn take_u16_le(&mut self) -> Result<usize> {
        let slice = self.take_bytes(2)?;
        let arr: [u8; 2] = slice.try_into().map_err(|_| {
            error!("2-byte slice did not convert to a 2-byte array");
            Error::Crypto(CryptoError::Deserialization)
        })?;
        Ok(u16::from_le_bytes(arr) as usize)
    }

    /// Parse the next 8 bytes as a little-endian u64.
    pub(crate) fn take_u64_le(&mut self) -> Result<u64> {
        let slice = self.take_bytes(8)?;
        let arr: [u8; 8] = slice.try_into().map_err(|_| {
            error!("8-byte slice did not convert to an 8-byte array");
            Error::Crypto(CryptoError::Deserialization)
        })?;
        Ok(u64::from_le_bytes(arr))
    }

    /// Take the rest of the bytes from the array.
    pub(crate) fn take_rest(&mut self) -> Result<&[u8]> {
        let rest = self
            .bytes
            .get(self.offset..)
            .ok_or(Error::Crypto(CryptoError::Deserialization))?;
        self.offset = self.bytes.len();
        Ok(rest)
    }

    /// True if all bytes have been consumed.
    pub(crate) fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }
}

/// Append a `u32` big-endian length prefix followed by `bytes`.
pub(crate) fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Read a `u32`-length-prefixed field written by [`write_len_prefixed`].
pub(crate) fn take_len_prefixed(parser: &mut ParseBytes) -> Result<Vec<u8>> {
    let len = parser.take_u32_len()?;
    Ok(parser.take_bytes(len)?.to_vec())
}

/// Draw a uniform element of `[0, n)`.
///
/// With `n = q` this is how shares, randomizers, and rerandomization
/// scalars are sampled; the MtA masks use it with Paillier-sized bounds.
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Draw a unit mod `n`: nonzero and coprime with `n`.
///
/// Used for Paillier nonces, where `n` is a peer's modulus. A draw sharing
/// a factor with `n` would amount to factoring that modulus; the chance is
/// negligible, and such a draw is rejected rather than used.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    let one = BigNumber::one();
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        let candidate = BigNumber::from_rng(n, rng);
        if candidate != BigNumber::zero() && candidate.gcd(n) == one {
            return Ok(candidate);
        }
    }
    error!("no unit mod n found within the retry bound");
    Err(Error::Crypto(CryptoError::NotInvertible))
}

/// Squeeze a challenge in `[0, n)` out of the [`Transcript`].
///
/// Out-of-range draws are thrown away and the transcript is squeezed
/// again; each squeeze advances the transcript state, so retries yield
/// fresh bytes. Reducing an oversized draw mod `n` instead would make the
/// low end of the range more likely than the rest.
pub(crate) fn positive_challenge_from_transcript(
    transcript: &mut Transcript,
    n: &BigNumber,
) -> Result<BigNumber> {
    let width = n.to_bytes().len();
    let mut buf = vec![0u8; width];
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        transcript.challenge_bytes(b"challenge", buf.as_mut_slice());
        let candidate = BigNumber::from_slice(buf.as_slice());
        if &candidate < n {
            return Ok(candidate);
        }
    }
    error!("transcript produced no in-range challenge within the retry bound");
    Err(Error::Crypto(CryptoError::FailedProof))
}

/// Integer square root by Newton iteration. Used when recovering the
/// Paillier primes from `(N, φ(N))`; the discriminant there is a perfect
/// square for any well-formed key file.
pub(crate) fn isqrt(n: &BigNumber) -> BigNumber {
    let one = BigNumber::one();
    if n <= &one {
        return n.clone();
    }
    let two = BigNumber::from(2u64);
    let mut x = n.clone();
    let mut y: BigNumber = &(&x + &one) / &two;
    while y < x {
        x = y.clone();
        y = &(&y + &(n / &y)) / &two;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn parse_bytes_reads_fields_in_order() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u16.to_le_bytes());
        buf.extend_from_slice(&42u64.to_le_bytes());
        write_len_prefixed(&mut buf, b"payload");

        let mut parser = ParseBytes::new(buf);
        assert_eq!(parser.take_u16_le().unwrap(), 7);
        assert_eq!(parser.take_u64_le().unwrap(), 42);
        assert_eq!(take_len_prefixed(&mut parser).unwrap(), b"payload");
        assert!(parser.is_empty());
    }

    #[test]
    fn parse_bytes_rejects_short_input() {
        let mut parser = ParseBytes::new(vec![0u8; 3]);
        assert!(parser.take_u32_len().is_err());
    }

    #[test]
    fn isqrt_of_squares_is_exact() {
        let mut rng = init_testing();
        for _ in 0..20 {
            let x = random_positive_bn(&mut rng, &(BigNumber::one() << 256));
            assert_eq!(isqrt(&(&x * &x)), x);
        }
    }

    #[test]
    fn random_bn_is_long_enough() {
        let mut rng = init_testing();
        // Over many draws the longest sample should come close to the bound.
        let mut max_len = 0;
        let bound = BigNumber::one() << 800;
        for _ in 0..1000 {
            let bn = random_positive_bn(&mut rng, &bound);
            let len = bn.to_bytes().len();
            if max_len < len {
                max_len = len;
            }
        }
        assert!(max_len > 98);
    }
}

/// Test RNG plumbing, shared by the test modules across the crate.
#[cfg(test)]
pub(crate) mod testing {
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };

    /// Fresh RNG for a test, seeded from the OS. The seed is echoed to
    /// stderr, so a failing run can be replayed through
    /// [`init_testing_with_seed`].
    pub(crate) fn init_testing() -> StdRng {
        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!("test RNG seed (replay with init_testing_with_seed):");
        eprintln!("\t{seed:?}");
        StdRng::from_seed(seed)
    }

    /// Replay variant of [`init_testing`]: runs the test under a fixed seed
    /// and switches crate-level logging on while debugging it.
    #[allow(unused)]
    pub(crate) fn init_testing_with_seed(seed: [u8; 32]) -> StdRng {
        use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

        let targets = Targets::new().with_target("threshold_ecdsa", tracing::Level::DEBUG);
        let stdout_layer = tracing_subscriber::fmt::layer().pretty();

        // It's okay if this fails. It just means logging has already been set
        // up for this thread.
        let _ = tracing_subscriber::registry()
            .with(stdout_layer.with_filter(targets))
            .try_init();

        StdRng::from_seed(seed)
    }

    /// Derive one deterministic RNG per party from a single session seed, so
    /// multi-party tests can run each party on its own thread.
    pub(crate) fn party_rngs(seed: u64, n_parties: u16) -> Vec<StdRng> {
        (0..n_parties)
            .map(|pid| StdRng::seed_from_u64(seed.wrapping_add(pid as u64)))
            .collect()
    }
}
