// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof that one ElGamal commitment is a rerandomization of another: given
//! `C` and `C'` under base `h`, the prover knows `ρ` with
//! `C' = C ∘ Create(0, ρ)`, i.e. `C'₁ − C₁ = ρ·G` and `C'₂ − C₂ = ρ·h`.

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
pub(crate) struct EgRefreshProof {
    commitment_first: CurvePoint,
    commitment_second: CurvePoint,
    response: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    egf: &'a ElGamalFactory,
    old: &'a ElGamal,
    new: &'a ElGamal,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(egf: &'a ElGamalFactory, old: &'a ElGamal, new: &'a ElGamal) -> Self {
        Self { egf, old, new }
    }

    /// The difference `(C'₁ − C₁, C'₂ − C₂)` whose discrete logs the proof
    /// relates.
    fn difference(&self) -> (CurvePoint, CurvePoint) {
        (
            *self.new.first() + self.old.first().negate(),
            *self.new.second() + self.old.second().negate(),
        )
    }
}

pub(crate) struct ProverSecret<'a> {
    rho: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(rho: &'a BigNumber) -> Self {
        Self { rho }
    }
}

impl EgRefreshProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment_first: &CurvePoint,
        commitment_second: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"EgRefreshProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"h", &input.egf.base().to_bytes());
        transcript.append_message(b"old", &input.old.to_bytes());
        transcript.append_message(b"new", &input.new.to_bytes());
        transcript.append_message(b"A1", &commitment_first.to_bytes());
        transcript.append_message(b"A2", &commitment_second.to_bytes());
        transcript
    }
}

impl Proof for EgRefreshProof {
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
        let commitment_first = CurvePoint::scale_generator(&mask)?;
        let commitment_second = input.egf.base().multiply_by_bignum(&mask)?;

        let mut transcript =
            Self::transcript(input, context, &commitment_first, &commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response = (&mask + &(&challenge * secret.rho)).nmod(&q);
        Ok(Self {
            commitment_first,
            commitment_second,
            response,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript =
            Self::transcript(input, context, &self.commitment_first, &self.commitment_second);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let (diff_first, diff_second) = input.difference();
        // z·G == A₁ + e·(C'₁ − C₁)
        let lhs_first = CurvePoint::scale_generator(&self.response)?;
        let rhs_first = self.commitment_first + diff_first.multiply_by_bignum(&challenge)?;
        // z·h == A₂ + e·(C'₂ − C₂)
        let lhs_second = input.egf.base().multiply_by_bignum(&self.response)?;
        let rhs_second = self.commitment_second + diff_second.multiply_by_bignum(&challenge)?;

        if lhs_first != rhs_first || lhs_second != rhs_second {
            error!("EgRefresh proof equations do not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment_first.to_bytes();
        out.extend_from_slice(&self.commitment_second.to_bytes());
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

impl EgRefreshProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment_first = CurvePoint::decode(parser)?;
        let commitment_second = CurvePoint::decode(parser)?;
        let response = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment_first,
            commitment_second,
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
        let h = CurvePoint::scale_generator(&random_scalar_bn(&mut rng)).unwrap();
        let egf = ElGamalFactory::new(h);
        let old = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        let rho = random_scalar_bn(&mut rng);
        let new = old.compose(&egf.create(&BigNumber::zero(), &rho).unwrap());
        let context = ProofContext::new("rho", 0);

        let proof = EgRefreshProof::prove(
            &CommonInput::new(&egf, &old, &new),
            &ProverSecret::new(&rho),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&egf, &old, &new), &context)
            .is_ok());
    }

    #[test]
    fn proof_fails_if_value_changes() {
        let mut rng = init_testing();
        let h = CurvePoint::scale_generator(&random_scalar_bn(&mut rng)).unwrap();
        let egf = ElGamalFactory::new(h);
        let old = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        let rho = random_scalar_bn(&mut rng);
        // Not a refresh: this also shifts the committed value.
        let new = old.compose(&egf.create(&BigNumber::one(), &rho).unwrap());
        let context = ProofContext::new("rho", 0);

        let proof = EgRefreshProof::prove(
            &CommonInput::new(&egf, &old, &new),
            &ProverSecret::new(&rho),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(&CommonInput::new(&egf, &old, &new), &context)
            .is_err());
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = init_testing();
        let h = CurvePoint::scale_generator(&random_scalar_bn(&mut rng)).unwrap();
        let egf = ElGamalFactory::new(h);
        let old = egf
            .create(&random_scalar_bn(&mut rng), &random_scalar_bn(&mut rng))
            .unwrap();
        let rho = random_scalar_bn(&mut rng);
        let new = old.compose(&egf.create(&BigNumber::zero(), &rho).unwrap());
        let context = ProofContext::new("rho", 2);

        let proof = EgRefreshProof::prove(
            &CommonInput::new(&egf, &old, &new),
            &ProverSecret::new(&rho),
            &context,
            &mut rng,
        )
        .unwrap();
        let decoded = EgRefreshProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(decoded
            .verify(&CommonInput::new(&egf, &old, &new), &context)
            .is_ok());
    }
}
