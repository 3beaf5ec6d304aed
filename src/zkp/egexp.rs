// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof of a rerandomized commitment exponentiation: given commitments `B`
//! and `C'` under base `h`, the prover knows `(a, r')` with
//! `C' = B^a ∘ Create(0, r')`, i.e. `C'₁ = a·B₁ + r'·G` and
//! `C'₂ = a·B₂ + r'·h`.

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
pub(crate) struct EgExpProof {
    commitment_first: CurvePoint,
    commitment_second: CurvePoint,
    response_a: BigNumber,
    response_r: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    egf: &'a ElGamalFactory,
    base: &'a ElGamal,
    result: &'a ElGamal,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(egf: &'a ElGamalFactory, base: &'a ElGamal, result: &'a ElGamal) -> Self {
        Self { egf, base, result }
    }
}

pub(crate) struct ProverSecret<'a> {
    exponent: &'a BigNumber,
    randomizer: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(exponent: &'a BigNumber, randomizer: &'a BigNumber) -> Self {
        Self {
            exponent,
            randomizer,
        }
    }
}

impl EgExpProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment_first: &CurvePoint,
        commitment_second: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"EgExpProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"h", &input.egf.base().to_bytes());
        transcript.append_message(b"base", &input.base.to_bytes());
        transcript.append_message(b"result", &input.result.to_bytes());
        transcript.append_message(b"A1", &commitment_first.to_bytes());
        transcript.append_message(b"A2", &commitment_second.to_bytes());
        transcript
    }
}

impl Proof for EgExpProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput<'_>,
        secret: &Self::ProverSecret<'_>,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<Self> {
        let q = k256_order();
        let mask_a = random_positive_bn(rng, &q);
        let mask_r = random_positive_bn(rng, &q);

        let commitment_first =
            input.base.first().multiply_by_bignum(&mask_a)? + CurvePoint::scale_generator(&mask_r)?;
        let commitment_second = input.base.second().multiply_by_bignum(&mask_a)?
            + input.egf.base().multiply_by_bignum(&mask_r)?;

        let mut transcript =
            Self::transcript(input, context, &commitment_first, &commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response_a = (&mask_a + &(&challenge * secret.exponent)).nmod(&q);
        let response_r = (&mask_r + &(&challenge * secret.randomizer)).nmod(&q);
        Ok(Self {
            commitment_first,
            commitment_second,
            response_a,
            response_r,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript =
            Self::transcript(input, context, &self.commitment_first, &self.commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        // z_a·B₁ + z_r·G == A₁ + e·C'₁
        let lhs_first = input.base.first().multiply_by_bignum(&self.response_a)?
            + CurvePoint::scale_generator(&self.response_r)?;
        let rhs_first =
            self.commitment_first + input.result.first().multiply_by_bignum(&challenge)?;
        // z_a·B₂ + z_r·h == A₂ + e·C'₂
        let lhs_second = input.base.second().multiply_by_bignum(&self.response_a)?
            + input.egf.base().multiply_by_bignum(&self.response_r)?;
        let rhs_second =
            self.commitment_second + input.result.second().multiply_by_bignum(&challenge)?;

        if lhs_first != rhs_first || lhs_second != rhs_second {
            error!("EgExp proof equations do not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment_first.to_bytes();
        out.extend_from_slice(&self.commitment_second.to_bytes());
        write_len_prefixed(&mut out, &self.response_a.to_bytes());
        write_len_prefixed(&mut out, &self.response_r.to_bytes());
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

impl EgExpProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment_first = CurvePoint::decode(parser)?;
        let commitment_second = CurvePoint::decode(parser)?;
        let response_a = BigNumber::from_slice(take_len_prefixed(parser)?);
        let response_r = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment_first,
            commitment_second,
            response_a,
            response_r,
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
    ) -> (ElGamalFactory, ElGamal, ElGamal, BigNumber, BigNumber) {
        let h = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        let egf = ElGamalFactory::new(h);
        let base = egf
            .create(&random_scalar_bn(rng), &random_scalar_bn(rng))
            .unwrap();
        let a = random_scalar_bn(rng);
        let r = random_scalar_bn(rng);
        let result = base
            .exp(&a)
            .unwrap()
            .compose(&egf.create(&BigNumber::zero(), &r).unwrap());
        (egf, base, result, a, r)
    }

    #[test]
    fn proof_verifies() {
        let mut rng = init_testing();
        let (egf, base, result, a, r) = setup(&mut rng);
        let context = ProofContext::new("ba", 0);
        let proof = EgExpProof::prove(
            &CommonInput::new(&egf, &base, &result),
            &ProverSecret::new(&a, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&egf, &base, &result), &context)
            .is_ok());
    }

    #[test]
    fn proof_fails_for_wrong_result() {
        let mut rng = init_testing();
        let (egf, base, _result, a, r) = setup(&mut rng);
        let context = ProofContext::new("ba", 0);
        let other = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        let proof = EgExpProof::prove(
            &CommonInput::new(&egf, &base, &other),
            &ProverSecret::new(&a, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&egf, &base, &other), &context)
            .is_err());
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = init_testing();
        let (egf, base, result, a, r) = setup(&mut rng);
        let context = ProofContext::new("ba", 4);
        let proof = EgExpProof::prove(
            &CommonInput::new(&egf, &base, &result),
            &ProverSecret::new(&a, &r),
            &context,
            &mut rng,
        )
        .unwrap();
        let decoded = EgExpProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(decoded
            .verify(&CommonInput::new(&egf, &base, &result), &context)
            .is_ok());
    }
}
