// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! secp256k1 group arithmetic and the point wire codec.

use crate::{
    errors::{CryptoError, Error, Result},
    utils::ParseBytes,
};
use generic_array::GenericArray;
use hkdf::Hkdf;
use k256::{
    ecdsa::signature::hazmat::PrehashVerifier,
    elliptic_curve::{
        bigint::Encoding, point::AffineCoordinates, sec1::FromEncodedPoint, sec1::ToEncodedPoint,
        Curve, PrimeField,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
};
use libpaillier::unknown_order::BigNumber;
use sha2::Sha256;
use std::ops::Add;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// Wrapper around [`k256::ProjectivePoint`] so that we control the wire
/// encoding and the identity handling.
///
/// Note that this type derives [`Debug`]; if a `CurvePoint` is held in a
/// private type, `Debug` should be manually implemented with the field of
/// this type explicitly redacted!
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct CurvePoint(pub(crate) ProjectivePoint);

impl CurvePoint {
    /// The base point of secp256k1.
    pub const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);

    /// The identity point, used to initialize sums of curve points.
    pub const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    /// True if this is the neutral element of the group.
    pub fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    /// Negate the point.
    pub fn negate(&self) -> Self {
        Self(-self.0)
    }

    /// Multiply `self` by a [`BigNumber`], which is first reduced into the
    /// scalar field (taken mod `q`, the order of the curve).
    ///
    /// Note: This method ends up cloning the scalar value in the process of
    /// converting it. This may be insecure if the scalar contains private
    /// data.
    pub fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self> {
        let s = Zeroizing::new(bn_to_scalar(scalar)?);
        Ok(self.multiply_by_scalar(&s))
    }

    /// Multiply `self` by a [`Scalar`].
    pub fn multiply_by_scalar(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar)
    }

    /// Multiply the generator by a [`BigNumber`] scalar.
    pub fn scale_generator(scalar: &BigNumber) -> Result<Self> {
        CurvePoint::GENERATOR.multiply_by_bignum(scalar)
    }

    /// The x-coordinate of the point reduced into the scalar field, i.e. the
    /// `r` component of an ECDSA signature with nonce point `self`.
    pub fn x_projection(&self) -> Result<BigNumber> {
        if self.is_identity() {
            error!("attempted to take the x-projection of the identity");
            return Err(Error::Crypto(CryptoError::NotInvertible));
        }
        let x = self.0.to_affine().x();
        Ok(BigNumber::from_slice(x.as_slice()).nmod(&k256_order()))
    }

    /// Serialize the point in the wire format:
    /// `u32 lenX ‖ u32 lenY ‖ Xbytes ‖ Ybytes`, big-endian lengths.
    ///
    /// The identity is encoded as a single zero length field (four zero
    /// bytes) with no payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let encoded = self.0.to_affine().to_encoded_point(false);
        match (encoded.x(), encoded.y()) {
            (Some(x), Some(y)) => {
                let mut out = Vec::with_capacity(8 + x.len() + y.len());
                out.extend_from_slice(&(x.len() as u32).to_be_bytes());
                out.extend_from_slice(&(y.len() as u32).to_be_bytes());
                out.extend_from_slice(x);
                out.extend_from_slice(y);
                out
            }
            _ => 0u32.to_be_bytes().to_vec(),
        }
    }

    /// Deserialize a point written by [`CurvePoint::to_bytes`].
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let point = Self::decode(&mut parser)?;
        if !parser.is_empty() {
            error!("trailing bytes after an encoded curve point");
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        Ok(point)
    }

    /// Decode one point from `parser`, leaving any remaining bytes in place.
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let len_x = parser.take_u32_len()?;
        if len_x == 0 {
            return Ok(Self::IDENTITY);
        }
        let len_y = parser.take_u32_len()?;
        if len_x > 32 || len_y > 32 {
            error!("coordinate length out of range: x={len_x}, y={len_y}");
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        let x = left_pad_32(parser.take_bytes(len_x)?);
        let y = left_pad_32(parser.take_bytes(len_y)?);
        let encoded = EncodedPoint::from_affine_coordinates(
            GenericArray::from_slice(&x),
            GenericArray::from_slice(&y),
            false,
        );
        let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        match affine {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("bytes do not encode a point on secp256k1");
                Err(Error::Crypto(CryptoError::Deserialization))
            }
        }
    }
}

impl Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AsRef<CurvePoint> for CurvePoint {
    fn as_ref(&self) -> &CurvePoint {
        self
    }
}

fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    out
}

/// The order of secp256k1.
pub fn k256_order() -> BigNumber {
    // Set order = q
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

/// Reduce a [`BigNumber`] into the scalar field of secp256k1.
pub(crate) fn bn_to_scalar(x: &BigNumber) -> Result<Scalar> {
    // Take (mod q)
    let order = k256_order();
    let x_modded = x % &order;

    let bytes = Zeroizing::new(x_modded.to_bytes());
    let mut slice = Zeroizing::new(vec![0u8; 32 - bytes.len()]);
    slice.extend_from_slice(&bytes);
    let mut ret: Scalar = Option::from(Scalar::from_repr(GenericArray::clone_from_slice(&slice)))
        .ok_or_else(|| {
            error!("failed to convert BigNumber into k256::Scalar");
            Error::Crypto(CryptoError::Deserialization)
        })?;

    // Make sure to negate the scalar if the original input was negative
    if x < &BigNumber::zero() {
        ret = ret.negate();
    }
    Ok(ret)
}

/// Convert a [`Scalar`] back to a [`BigNumber`].
pub(crate) fn scalar_to_bn(x: &Scalar) -> BigNumber {
    BigNumber::from_slice(x.to_repr())
}

/// Sample a scalar uniformly from `[0, q)`.
pub(crate) fn random_scalar_bn<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> BigNumber {
    BigNumber::from_rng(&k256_order(), rng)
}

/// Hash arbitrary bytes into the scalar field.
///
/// HKDF-SHA256 with a 48-byte output reduced mod q; 48 = ceil((ceil(log2(q))
/// + k) / 8) where k is the bit security level.
pub fn hash_to_scalar(msg: &[u8]) -> BigNumber {
    let info = [b'H', b'2', b'F', 0u8, 1u8];
    let hk = Hkdf::<Sha256>::new(Some(b"ThresholdECDSA"), msg);
    let mut t = [0u8; 48];
    hk.expand(&info, &mut t)
        .expect("48 bytes is a valid HKDF-SHA256 output length");
    BigNumber::from_slice(t).nmod(&k256_order())
}

/// Verify `(r, s)` as a standard secp256k1 ECDSA signature over the 32-byte
/// big-endian prehash of `m`, under public key `pk`.
pub fn verify_ecdsa(pk: &CurvePoint, m: &BigNumber, r: &BigNumber, s: &BigNumber) -> Result<()> {
    let r_scalar = bn_to_scalar(r)?;
    let s_scalar = bn_to_scalar(s)?;
    let signature = k256::ecdsa::Signature::from_scalars(r_scalar, s_scalar).map_err(|_| {
        error!("(r, s) pair does not form a well-formed signature");
        Error::Crypto(CryptoError::Deserialization)
    })?;
    let signature = match signature.normalize_s() {
        Some(normalized) => normalized,
        None => signature,
    };
    let encoded_pk = pk.0.to_affine().to_encoded_point(true);
    let verifying_key =
        k256::ecdsa::VerifyingKey::from_sec1_bytes(encoded_pk.as_bytes()).map_err(|_| {
            error!("public key point is not a valid verifying key");
            Error::Crypto(CryptoError::Deserialization)
        })?;
    let mut prehash = [0u8; 32];
    let m_bytes = m.nmod(&k256_order()).to_bytes();
    prehash[32 - m_bytes.len()..].copy_from_slice(&m_bytes);
    verifying_key
        .verify_prehash(&prehash, &signature)
        .map_err(|_| Error::Crypto(CryptoError::WrongValue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn distributivity_of_base_multiplication() {
        let mut rng = init_testing();
        for _ in 0..10 {
            let a = random_scalar_bn(&mut rng);
            let b = random_scalar_bn(&mut rng);
            let sum = (&a + &b).nmod(&k256_order());
            let lhs = CurvePoint::scale_generator(&sum).unwrap();
            let rhs = CurvePoint::scale_generator(&a).unwrap()
                + CurvePoint::scale_generator(&b).unwrap();
            assert_eq!(lhs, rhs);
        }
    }

    #[test]
    fn negation_cancels_to_identity() {
        let mut rng = init_testing();
        let a = random_scalar_bn(&mut rng);
        let p = CurvePoint::scale_generator(&a).unwrap();
        assert_eq!(p.negate() + p, CurvePoint::IDENTITY);
    }

    #[test]
    fn point_codec_round_trips() {
        let mut rng = init_testing();
        for _ in 0..10 {
            let a = random_scalar_bn(&mut rng);
            let p = CurvePoint::scale_generator(&a).unwrap();
            let decoded = CurvePoint::try_from_bytes(&p.to_bytes()).unwrap();
            assert_eq!(p, decoded);
        }
    }

    #[test]
    fn identity_codec_round_trips() {
        let encoded = CurvePoint::IDENTITY.to_bytes();
        assert_eq!(encoded, vec![0u8; 4]);
        let decoded = CurvePoint::try_from_bytes(&encoded).unwrap();
        assert!(decoded.is_identity());
    }

    #[test]
    fn off_curve_bytes_are_rejected() {
        let mut bad = CurvePoint::GENERATOR.to_bytes();
        let last = bad.len() - 1;
        bad[last] ^= 1;
        assert!(CurvePoint::try_from_bytes(&bad).is_err());
    }

    #[test]
    fn bn_to_scalar_negates() {
        let neg1 = BigNumber::zero() - BigNumber::one();
        let scalar = bn_to_scalar(&neg1).unwrap();
        assert_eq!(Scalar::ZERO, scalar.add(&Scalar::ONE));
    }

    #[test]
    fn hash_to_scalar_is_stable_and_in_range() {
        let a = hash_to_scalar(b"some message");
        let b = hash_to_scalar(b"some message");
        let c = hash_to_scalar(b"another message");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < k256_order());
    }

    #[test]
    fn standard_ecdsa_signature_verifies() {
        let mut rng = init_testing();
        let q = k256_order();
        // Sign directly with textbook ECDSA and check the verifier agrees.
        let x = random_scalar_bn(&mut rng);
        let k = random_scalar_bn(&mut rng);
        let m = random_scalar_bn(&mut rng);
        let pk = CurvePoint::scale_generator(&x).unwrap();
        let r = CurvePoint::scale_generator(&k).unwrap().x_projection().unwrap();
        let k_inv = k.invert(&q).unwrap();
        let s = (&k_inv * &(&m + &(&r * &x))).nmod(&q);
        assert!(verify_ecdsa(&pk, &m, &r, &s).is_ok());
        assert!(verify_ecdsa(&pk, &(&m + &BigNumber::one()), &r, &s).is_err());
    }
}
