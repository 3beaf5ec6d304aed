// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Schnorr proof of knowledge of a discrete logarithm: given `X`, the prover
//! knows `x` with `X = x·G`.

use super::{Proof, ProofContext};
use crate::{
    curve::{k256_order, CurvePoint},
    errors::{CryptoError, Error, Result},
    utils::{
        positive_challenge_from_transcript, random_positive_bn, take_len_prefixed, write_len_prefixed,
        ParseBytes,
    },
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DlogProof {
    commitment: CurvePoint,
    response: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    x_point: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(x_point: &'a CurvePoint) -> Self {
        Self { x_point }
    }
}

pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a BigNumber) -> Self {
        Self { x }
    }
}

impl DlogProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"DlogProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"X", &input.x_point.to_bytes());
        transcript.append_message(b"commitment", &commitment.to_bytes());
        transcript
    }
}

impl Proof for DlogProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput<'_>,
        secret: &Self::ProverSecret<'_>,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<Self> {
        let q = k256_order();
        let mask = random_positive_bn(rng, &q);
        let commitment = CurvePoint::scale_generator(&mask)?;

        let mut transcript = Self::transcript(input, context, &commitment);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response = (&mask + &(&challenge * secret.x)).nmod(&q);
        Ok(Self {
            commitment,
            response,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript = Self::transcript(input, context, &self.commitment);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let lhs = CurvePoint::scale_generator(&self.response)?;
        let rhs = self.commitment + input.x_point.multiply_by_bignum(&challenge)?;
        if lhs != rhs {
            error!("dlog proof equation does not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment.to_bytes();
        write_len_prefixed(&mut out, &self.response.to_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let proof = Self::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        Ok(proof)
    }
}

impl DlogProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment = CurvePoint::decode(parser)?;
        let response = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::random_scalar_bn;
    use crate::utils::testing::init_testing;

    #[test]
    fn proof_verifies() {
        let mut rng = init_testing();
        let x = random_scalar_bn(&mut rng);
        let x_point = CurvePoint::scale_generator(&x).unwrap();
        let context = ProofContext::new("x", 0);

        let proof = DlogProof::prove(
            &CommonInput::new(&x_point),
            &ProverSecret::new(&x),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&CommonInput::new(&x_point), &context).is_ok());
    }

    #[test]
    fn proof_fails_for_wrong_statement() {
        let mut rng = init_testing();
        let x = random_scalar_bn(&mut rng);
        let x_point = CurvePoint::scale_generator(&x).unwrap();
        let other = CurvePoint::scale_generator(&random_scalar_bn(&mut rng)).unwrap();
        let context = ProofContext::new("x", 0);

        let proof = DlogProof::prove(
            &CommonInput::new(&x_point),
            &ProverSecret::new(&x),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&CommonInput::new(&other), &context).is_err());
    }

    #[test]
    fn proof_is_bound_to_context() {
        let mut rng = init_testing();
        let x = random_scalar_bn(&mut rng);
        let x_point = CurvePoint::scale_generator(&x).unwrap();

        let proof = DlogProof::prove(
            &CommonInput::new(&x_point),
            &ProverSecret::new(&x),
            &ProofContext::new("x", 0),
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&x_point), &ProofContext::new("x", 1))
            .is_err());
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = init_testing();
        let x = random_scalar_bn(&mut rng);
        let x_point = CurvePoint::scale_generator(&x).unwrap();
        let context = ProofContext::new("x", 3);

        let proof = DlogProof::prove(
            &CommonInput::new(&x_point),
            &ProverSecret::new(&x),
            &context,
            &mut rng,
        )
        .unwrap();
        let decoded = DlogProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(decoded.verify(&CommonInput::new(&x_point), &context).is_ok());
    }
}
