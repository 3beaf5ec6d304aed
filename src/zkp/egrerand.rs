// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Proof for the CheckDH rerandomization shares: given `(u, v, h)` and a
//! pair `(U, V)`, the prover knows `(α, β)` with `U = α·u + β·G` and
//! `V = α·v + β·h`.

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
pub(crate) struct EgRerandProof {
    commitment_u: CurvePoint,
    commitment_v: CurvePoint,
    response_alpha: BigNumber,
    response_beta: BigNumber,
}

pub(crate) struct CommonInput<'a> {
    u: &'a CurvePoint,
    v: &'a CurvePoint,
    h: &'a CurvePoint,
    u_share: &'a CurvePoint,
    v_share: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        u: &'a CurvePoint,
        v: &'a CurvePoint,
        h: &'a CurvePoint,
        u_share: &'a CurvePoint,
        v_share: &'a CurvePoint,
    ) -> Self {
        Self {
            u,
            v,
            h,
            u_share,
            v_share,
        }
    }
}

pub(crate) struct ProverSecret<'a> {
    alpha: &'a BigNumber,
    beta: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(alpha: &'a BigNumber, beta: &'a BigNumber) -> Self {
        Self { alpha, beta }
    }
}

impl EgRerandProof {
    fn transcript(
        input: &CommonInput<'_>,
        context: &ProofContext,
        commitment_u: &CurvePoint,
        commitment_v: &CurvePoint,
    ) -> Transcript {
        let mut transcript = Transcript::new(b"EgRerandProof");
        context.append_to(&mut transcript);
        transcript.append_message(b"u", &input.u.to_bytes());
        transcript.append_message(b"v", &input.v.to_bytes());
        transcript.append_message(b"h", &input.h.to_bytes());
        transcript.append_message(b"U", &input.u_share.to_bytes());
        transcript.append_message(b"V", &input.v_share.to_bytes());
        transcript.append_message(b"A1", &commitment_u.to_bytes());
        transcript.append_message(b"A2", &commitment_v.to_bytes());
        transcript
    }
}

impl Proof for EgRerandProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput<'_>,
        secret: &Self::ProverSecret<'_>,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<Self> {
        let q = k256_order();
        let mask_alpha = random_positive_bn(rng, &q);
        let mask_beta = random_positive_bn(rng, &q);

        let commitment_u =
            input.u.multiply_by_bignum(&mask_alpha)? + CurvePoint::scale_generator(&mask_beta)?;
        let commitment_v =
            input.v.multiply_by_bignum(&mask_alpha)? + input.h.multiply_by_bignum(&mask_beta)?;

        let mut transcript = Self::transcript(input, context, &commitment_u, &commitment_v);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        let response_alpha = (&mask_alpha + &(&challenge * secret.alpha)).nmod(&q);
        let response_beta = (&mask_beta + &(&challenge * secret.beta)).nmod(&q);
        Ok(Self {
            commitment_u,
            commitment_v,
            response_alpha,
            response_beta,
        })
    }

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()> {
        let q = k256_order();
        let mut transcript =
            Self::transcript(input, context, &self.commitment_u, &self.commitment_v);
        let challenge = positive_challenge_from_transcript(&mut transcript, &q)?;

        // z_α·u + z_β·G == A₁ + e·U
        let lhs_u = input.u.multiply_by_bignum(&self.response_alpha)?
            + CurvePoint::scale_generator(&self.response_beta)?;
        let rhs_u = self.commitment_u + input.u_share.multiply_by_bignum(&challenge)?;
        // z_α·v + z_β·h == A₂ + e·V
        let lhs_v = input.v.multiply_by_bignum(&self.response_alpha)?
            + input.h.multiply_by_bignum(&self.response_beta)?;
        let rhs_v = self.commitment_v + input.v_share.multiply_by_bignum(&challenge)?;

        if lhs_u != rhs_u || lhs_v != rhs_v {
            error!("EgRerand proof equations do not hold");
            return Err(Error::Crypto(CryptoError::FailedProof));
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.commitment_u.to_bytes();
        out.extend_from_slice(&self.commitment_v.to_bytes());
        write_len_prefixed(&mut out, &self.response_alpha.to_bytes());
        write_len_prefixed(&mut out, &self.response_beta.to_bytes());
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

impl EgRerandProof {
    pub(crate) fn decode(parser: &mut ParseBytes) -> Result<Self> {
        let commitment_u = CurvePoint::decode(parser)?;
        let commitment_v = CurvePoint::decode(parser)?;
        let response_alpha = BigNumber::from_slice(take_len_prefixed(parser)?);
        let response_beta = BigNumber::from_slice(take_len_prefixed(parser)?);
        Ok(Self {
            commitment_u,
            commitment_v,
            response_alpha,
            response_beta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::random_scalar_bn;
    use crate::utils::testing::init_testing;

    struct Setup {
        u: CurvePoint,
        v: CurvePoint,
        h: CurvePoint,
        u_share: CurvePoint,
        v_share: CurvePoint,
        alpha: BigNumber,
        beta: BigNumber,
    }

    fn setup(rng: &mut rand::rngs::StdRng) -> Setup {
        let u = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        let v = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        let h = CurvePoint::scale_generator(&random_scalar_bn(rng)).unwrap();
        let alpha = random_scalar_bn(rng);
        let beta = random_scalar_bn(rng);
        let u_share = u.multiply_by_bignum(&alpha).unwrap()
            + CurvePoint::scale_generator(&beta).unwrap();
        let v_share = v.multiply_by_bignum(&alpha).unwrap() + h.multiply_by_bignum(&beta).unwrap();
        Setup {
            u,
            v,
            h,
            u_share,
            v_share,
            alpha,
            beta,
        }
    }

    #[test]
    fn proof_verifies() {
        let mut rng = init_testing();
        let s = setup(&mut rng);
        let context = ProofContext::new("checkdh", 0);
        let input = CommonInput::new(&s.u, &s.v, &s.h, &s.u_share, &s.v_share);
        let proof = EgRerandProof::prove(
            &input,
            &ProverSecret::new(&s.alpha, &s.beta),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&input, &context).is_ok());
    }

    #[test]
    fn proof_fails_for_mismatched_shares() {
        let mut rng = init_testing();
        let s = setup(&mut rng);
        let context = ProofContext::new("checkdh", 0);
        let bad_share = CurvePoint::scale_generator(&random_scalar_bn(&mut rng)).unwrap();
        let input = CommonInput::new(&s.u, &s.v, &s.h, &s.u_share, &s.v_share);
        let bad_input = CommonInput::new(&s.u, &s.v, &s.h, &bad_share, &s.v_share);
        let proof = EgRerandProof::prove(
            &input,
            &ProverSecret::new(&s.alpha, &s.beta),
            &context,
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(&bad_input, &context).is_err());
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = init_testing();
        let s = setup(&mut rng);
        let context = ProofContext::new("checkdh", 1);
        let input = CommonInput::new(&s.u, &s.v, &s.h, &s.u_share, &s.v_share);
        let proof = EgRerandProof::prove(
            &input,
            &ProverSecret::new(&s.alpha, &s.beta),
            &context,
            &mut rng,
        )
        .unwrap();
        let decoded = EgRerandProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);
        assert!(decoded.verify(&input, &context).is_ok());
    }
}
