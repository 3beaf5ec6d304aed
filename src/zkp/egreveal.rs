// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Reveal-correctness proof (discrete-log equality, Chaum-Pedersen): given a
//! base `P`, a revealed value `T`, and a public key share `X`, the prover
//! knows `sk` with `T = sk·P` and `X = sk·G`. Used in the final CheckDH
//! round to tie the published test value to the party's key share.

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
pub(crate) struct EgRevealProof {
    commitment_base: CurvePoint,
    commitment_gen: CurvePoint,
    response: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    base: &'a CurvePoint,
    revealed: &'a CurvePoint,
    pk_share: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        base: &'a CurvePoint,
        revealed: &'a CurvePoint,
        pk_share: &'a CurvePoint,
    ) -> Self {
        Self {
            base,
            revealed,
            pk_share,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    sk: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(sk: &'a BigNumber) -> Self {
        Self { sk }
    }
}

impl EgRevealProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment_base: &CurvePoint,
        commitment_gen: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"EgRevealProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"P", &input.base.to_bytes());
        transcript.append_message(b"T", &input.revealed.to_bytes());
        transcript.append_message(b"X", &input.pk_share.to_bytes());
        transcript.append_message(b"A1", &commitment_base.to_bytes());
        transcript.append_message(b"A2", &commitment_gen.to_bytes());
        transcript
    }
}

impl Proof for EgRevealProof {
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
        let commitment_base = input.base.multiply_by_bignum(&mask)?;
        let commitment_gen = CurvePoint::scale_generator(&mask)?;

        let mut transcript = Self::transcript(input, context, &commitment_base, &commitment_gen);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response = (&mask + &(&challenge * secret.sk)).nmod(&q);
        Ok(Self {
            commitment_base,
            commitment_gen,
            response,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript =
            Self::transcript(input, context, &self.commitment_base, &self.commitment_gen);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        // z·P == A₁ + e·T
        let lhs_base = input.base.multiply_by_bignum(&self.response)?;
        let rhs_base = self.commitment_base + input.revealed.multiply_by_bignum(&challenge)?;
        // z·G == A₂ + e·X
        let lhs_gen = CurvePoint::scale_generator(&self.response)?;
        let rhs_gen = self.commitment_gen + input.pk_share.multiply_by_bignum(&challenge)?;

        if lhs_base != rhs_base || lhs_gen != rhs_gen {
            error!("EgReveal proof equations do not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment_base.to_bytes();
        out.extend_from_slice(&self.commitment_gen.to_bytes());
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

impl EgRevealProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment_base = CurvePoint::decode(parser)?;
        let commitment_gen = CurvePoint::decode(parser)?;
        let response = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment_base,
            commitment_gen,
            response,
        })
    }
}
