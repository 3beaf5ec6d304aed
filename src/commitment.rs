// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! ElGamal commitments over secp256k1.
//!
//! A commitment to `v` with randomizer `r` under factory base `h` is the
//! pair `(r·G, r·h + v·G)`. Commitments are additively homomorphic via
//! [`ElGamal::compose`] and support scalar exponentiation and inversion.

use crate::{
    curve::{k256_order, CurvePoint},
    errors::{CryptoError, Error, Result},
    utils::ParseBytes,
};
use libpaillier::unknown_order::BigNumber;
use tracing::error;

/// Factory producing commitments under a fixed base point `h`.
#[derive(Debug, Clone)]
pub struct ElGamalFactory {
    h: CurvePoint,
}

impl ElGamalFactory {
    /// Create a factory with public base `h`.
    pub fn new(h: CurvePoint) -> Self {
        Self { h }
    }

    /// The factory base.
    pub fn base(&self) -> &CurvePoint {
        &self.h
    }

    /// Commit to `value` with randomizer `r`.
    pub fn create(&self, value: &BigNumber, r: &BigNumber) -> Result<ElGamal> {
        let first = CurvePoint::scale_generator(r)?;
        let second = self.h.multiply_by_bignum(r)? + CurvePoint::scale_generator(value)?;
        Ok(ElGamal {
            first,
            second,
            r: r.clone(),
            s: value.clone(),
        })
    }

    /// The neutral element for [`ElGamal::compose`].
    pub fn neutral(&self) -> ElGamal {
        ElGamal {
            first: CurvePoint::IDENTITY,
            second: CurvePoint::IDENTITY,
            r: BigNumber::zero(),
            s: BigNumber::zero(),
        }
    }

    /// True if `a` is the neutral element.
    pub fn is_neutral(&self, a: &ElGamal) -> bool {
        a == &self.neutral()
    }
}

/// An ElGamal commitment `(C₁, C₂)`.
///
/// The `(r, s)` fields carry the randomizer and committed value for
/// debugging. They ride along through the codec (the wire format requires
/// them) but no verifier ever trusts them; peers' commitments typically
/// carry zeros here.
#[derive(Debug, Clone)]
pub struct ElGamal {
    first: CurvePoint,
    second: CurvePoint,
    r: BigNumber,
    s: BigNumber,
}

impl PartialEq for ElGamal {
    /// Equality is pointwise on the group; the debugging fields are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.first == other.first && self.second == other.second
    }
}

impl Eq for ElGamal {}

impl ElGamal {
    /// First component `r·G`.
    pub fn first(&self) -> &CurvePoint {
        &self.first
    }

    /// Second component `r·h + v·G`.
    pub fn second(&self) -> &CurvePoint {
        &self.second
    }

    /// The carried randomizer and value. Debugging only: for commitments
    /// received from peers these are meaningless.
    pub fn reveal(&self) -> (&BigNumber, &BigNumber) {
        (&self.r, &self.s)
    }

    /// A copy with the debugging fields cleared. Protocol broadcasts send
    /// redacted copies: the wire format carries the `(r, s)` slots, but an
    /// opening must never leave the committing party.
    pub fn redacted(&self) -> ElGamal {
        ElGamal {
            first: self.first,
            second: self.second,
            r: BigNumber::zero(),
            s: BigNumber::zero(),
        }
    }

    /// Pointwise sum of two commitments; commits to the sum of values.
    pub fn compose(&self, other: &ElGamal) -> ElGamal {
        let q = k256_order();
        ElGamal {
            first: self.first + other.first,
            second: self.second + other.second,
            r: (&self.r + &other.r).nmod(&q),
            s: (&self.s + &other.s).nmod(&q),
        }
    }

    /// Scalar exponentiation; commits to `n` times the value.
    pub fn exp(&self, n: &BigNumber) -> Result<ElGamal> {
        let q = k256_order();
        Ok(ElGamal {
            first: self.first.multiply_by_bignum(n)?,
            second: self.second.multiply_by_bignum(n)?,
            r: (&self.r * n).nmod(&q),
            s: (&self.s * n).nmod(&q),
        })
    }

    /// Pointwise negation; commits to the negated value.
    pub fn inverse(&self) -> ElGamal {
        let q = k256_order();
        ElGamal {
            first: self.first.negate(),
            second: self.second.negate(),
            r: (BigNumber::zero() - &self.r).nmod(&q),
            s: (BigNumber::zero() - &self.s).nmod(&q),
        }
    }

    /// Wire encoding:
    /// `Point(C₁) ‖ Point(C₂) ‖ u32 rLen ‖ u32 sLen ‖ rBytes ‖ sBytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let r_bytes = self.r.to_bytes();
        let s_bytes = self.s.to_bytes();
        let mut out = self.first.to_bytes();
        out.extend_from_slice(&self.second.to_bytes());
        out.extend_from_slice(&(r_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&(s_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&r_bytes);
        out.extend_from_slice(&s_bytes);
        out
    }

    /// Deserialize a commitment written by [`ElGamal::to_bytes`].
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let eg = Self::decode(&mut parser)?;
        if !parser.is_empty() {
            error!("trailing bytes after an encoded commitment");
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        Ok(eg)
    }

    /// Decode one commitment from `parser`, leaving remaining bytes in place.
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let first = CurvePoint::decode(parser)?;
        let second = CurvePoint::decode(parser)?;
        let r_len = parser.take_u32_len()?;
        let s_len = parser.take_u32_len()?;
        let r = BigNumber::from_slice(parser.take_bytes(r_len)?);
        let s = BigNumber::from_slice(parser.take_bytes(s_len)?);
        Ok(ElGamal {
            first,
            second,
            r,
            s,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::random_scalar_bn;
    use crate::utils::testing::init_testing;

    fn factory(rng: &mut rand::rngs::StdRng) -> ElGamalFactory {
        let h = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        ElGamalFactory::new(h)
    }

    #[test]
    fn compose_commits_to_sum() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let q = k256_order();

        let (v1, r1) = (random_scalar_bn(&mut rng), random_scalar_bn(&mut rng));
        let (v2, r2) = (random_scalar_bn(&mut rng), random_scalar_bn(&mut rng));
        let lhs = egf
            .create(&v1, &r1)
            .unwrap()
            .compose(&egf.create(&v2, &r2).unwrap());
        let rhs = egf
            .create(&(&v1 + &v2).nmod(&q), &(&r1 + &r2).nmod(&q))
            .unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn exp_commits_to_multiple() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let q = k256_order();

        let (v, r) = (random_scalar_bn(&mut rng), random_scalar_bn(&mut rng));
        let n = random_scalar_bn(&mut rng);
        let lhs = egf.create(&v, &r).unwrap().exp(&n).unwrap();
        let rhs = egf
            .create(&(&v * &n).nmod(&q), &(&r * &n).nmod(&q))
            .unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn exp_by_zero_is_neutral() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let c = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        assert!(egf.is_neutral(&c.exp(&BigNumber::zero()).unwrap()));
    }

    #[test]
    fn inverse_cancels() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let c = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        assert!(egf.is_neutral(&c.compose(&c.inverse())));
    }

    #[test]
    fn codec_round_trips_with_debug_fields() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let (v, r) = (random_scalar_bn(&mut rng), random_scalar_bn(&mut rng));
        let c = egf.create(&v, &r).unwrap();
        let decoded = ElGamal::try_from_bytes(&c.to_bytes()).unwrap();
        assert_eq!(c, decoded);
        // The debugging fields must survive the round-trip too.
        assert_eq!(decoded.reveal(), (&r, &v));
    }

    #[test]
    fn redacted_copy_is_equal_but_carries_no_opening() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let (v, r) = (random_scalar_bn(&mut rng), random_scalar_bn(&mut rng));
        let c = egf.create(&v, &r).unwrap();
        let redacted = c.redacted();
        assert_eq!(c, redacted);
        assert_eq!(redacted.reveal(), (&BigNumber::zero(), &BigNumber::zero()));
    }

    #[test]
    fn neutral_codec_round_trips() {
        let mut rng = init_testing();
        let egf = factory(&mut rng);
        let neutral = egf.neutral();
        let decoded = ElGamal::try_from_bytes(&neutral.to_bytes()).unwrap();
        assert!(egf.is_neutral(&decoded));
    }
}
