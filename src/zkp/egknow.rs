// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof of knowledge of an ElGamal commitment opening: given `C = (C₁, C₂)`
//! under base `h`, the prover knows `(v, r)` with `C₁ = r·G` and
//! `C₂ = r·h + v·G`.

use super::{Proof, ProofContext};
use crate::{
    commitment::{ElGamal, ElGamalFactory},
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
pub(crate) struct EgKnowProof {
    commitment_first: CurvePoint,
    commitment_second: CurvePoint,
    response_r: BigNumber,
    response_v: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    egf: &'a ElGamalFactory,
    commitment: &'a ElGamal,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(egf: &'a ElGamalFactory, commitment: &'a ElGamal) -> Self {
        Self { egf, commitment }
    }
}

pub(crate) struct ProverSecret<'a> {
    value: &'a BigNumber,
    randomizer: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(value: &'a BigNumber, randomizer: &'a BigNumber) -> Self {
        Self { value, randomizer }
    }
}

impl EgKnowProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment_first: &CurvePoint,
        commitment_second: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"EgKnowProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"h", &input.egf.base().to_bytes());
        transcript.append_message(b"C1", &input.commitment.first().to_bytes());
        transcript.append_message(b"C2", &input.commitment.second().to_bytes());
        transcript.append_message(b"A1", &commitment_first.to_bytes());
        transcript.append_message(b"A2", &commitment_second.to_bytes());
        transcript
    }
}

impl Proof for EgKnowProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput<'_>,
        secret: &Self::ProverSecret<'_>,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<Self> {
        let q = k256_order();
        let mask_r = random_positive_bn(rng, &q);
        let mask_v = random_positive_bn(rng, &q);

        let commitment_first = CurvePoint::scale_generator(&mask_r)?;
        let commitment_second =
            input.egf.base().multiply_by_bignum(&mask_r)? + CurvePoint::scale_generator(&mask_v)?;

        let mut transcript =
            Self::transcript(input, context, &commitment_first, &commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response_r = (&mask_r + &(&challenge * secret.randomizer)).nmod(&q);
        let response_v = (&mask_v + &(&challenge * secret.value)).nmod(&q);
        Ok(Self {
            commitment_first,
            commitment_second,
            response_r,
            response_v,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript =
            Self::transcript(input, context, &self.commitment_first, &self.commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        // z_r·G == A₁ + e·C₁
        let lhs_first = CurvePoint::scale_generator(&self.response_r)?;
        let rhs_first =
            self.commitment_first + input.commitment.first().multiply_by_bignum(&challenge)?;
        // z_r·h + z_v·G == A₂ + e·C₂
        let lhs_second = input.egf.base().multiply_by_bignum(&self.response_r)?
            + CurvePoint::scale_generator(&self.response_v)?;
        let rhs_second =
            self.commitment_second + input.commitment.second().multiply_by_bignum(&challenge)?;

        if lhs_first != rhs_first || lhs_second != rhs_second {
            error!("EgKnow proof equations do not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment_first.to_bytes();
        out.extend_from_slice(&self.commitment_second.to_bytes());
        write_len_prefixed(&mut out, &self.response_r.to_bytes());
        write_len_prefixed(&mut out, &self.response_v.to_bytes());
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

impl EgKnowProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment_first = CurvePoint::decode(parser)?;
        let commitment_second = CurvePoint::decode(parser)?;
        let response_r = BigNumber::from_slice(take_len_prefixed(parser)?);
        let response_v = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment_first,
            commitment_second,
            response_r,
            response_v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::random_scalar_bn;
    use crate::utils::testing::init_testing;

    fn setup(
        rng: &mut rand::rngs::StdRng,
    ) -> (ElGamalFactory, ElGamal, BigNumber, BigNumber, ProofContext) {
        let h = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        let egf = ElGamalFactory::new(h);
        let v = random_scalar_bn(rng);
        let r = random_scalar_bn(rng);
        let c = egf.create(&v, &r).unwrap();
        (egf, c, v, r, ProofContext::new("k", 1))
    }

    #[test]
    fn proof_verifies() {
        let mut rng = init_testing();
        let (egf, c, v, r, context) = setup(&mut rng);
        let proof = EgKnowProof::prove(
            &CommonInput::new(&egf, &c),
            &ProverSecret::new(&v, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&CommonInput::new(&egf, &c), &context).is_ok());
    }

    #[test]
    fn proof_fails_for_wrong_commitment() {
        let mut rng = init_testing();
        let (egf, c, v, r, context) = setup(&mut rng);
        let other = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        let proof = EgKnowProof::prove(
            &CommonInput::new(&egf, &c),
            &ProverSecret::new(&v, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&egf, &other), &context)
            .is_err());
    }

    #[test]
    fn proof_fails_for_wrong_witness() {
        let mut rng = init_testing();
        let (egf, c, v, _r, context) = setup(&mut rng);
        let wrong_r = random_scalar_bn(&mut rng);
        let proof = EgKnowProof::prove(
            &CommonInput::new(&egf, &c),
            &ProverSecret::new(&v, &wrong_r),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&CommonInput::new(&egf, &c), &context).is_err());
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = init_testing();
        let (egf, c, v, r, context) = setup(&mut rng);
        let proof = EgKnowProof::prove(
            &CommonInput::new(&egf, &c),
            &ProverSecret::new(&v, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        let decoded = EgKnowProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(decoded.verify(&CommonInput::new(&egf, &c), &context).is_ok());
    }
}
