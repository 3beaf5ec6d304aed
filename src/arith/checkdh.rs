// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed Diffie-Hellman check.
//!
//! Given points `u` and `v` and a distributed key with public key `h`, the
//! committee jointly decides whether `log_G(u) == log_h(v)` without
//! revealing anything else. Every party rerandomizes the pair with private
//! `(α, β)`, the rerandomized sums are raised to the shared secret in the
//! exponent, and the equation balances exactly when `v = x·u`.

use crate::{
    arith::DKey,
    curve::{k256_order, CurvePoint},
    errors::{CryptoError, Error, Result},
    nmc::NmcEnvelope,
    sync::RoundPayload,
    utils::{random_positive_bn, ParseBytes},
    zkp::{
        egrerand::{self, EgRerandProof},
        egreveal::{self, EgRevealProof},
        Proof, ProofContext,
    },
};
use rand::{CryptoRng, RngCore};
use tracing::{error, instrument};

const CHECK_DH_LABEL: &str = "checkdh";

/// Decide whether `(u, v)` stand in the same discrete-log relation as the
/// key: `v = x·u` where `x` is the key's shared secret and `h = x·G` its
/// public key. Any proof failure, envelope mismatch, or final imbalance is
/// fatal.
#[instrument(skip_all, fields(pid = key.pid()))]
pub fn check_dh<R: RngCore + CryptoRng>(
    u: &CurvePoint,
    v: &CurvePoint,
    key: &DKey,
    rng: &mut R,
) -> Result<()> {
    let q = k256_order();
    let server = key.server();
    let pid = key.pid();
    let n = server.n_proc() as usize;
    let h = key.public_key();

    // Round 1. Rerandomize (u, v) with private (α, β) and commit to the
    // pair together with its proof.
    let alpha = random_positive_bn(rng, &q);
    let beta = random_positive_bn(rng, &q);
    let u_share = u.multiply_by_bignum(&alpha)? + CurvePoint::scale_generator(&beta)?;
    let v_share = v.multiply_by_bignum(&alpha)? + h.multiply_by_bignum(&beta)?;

    let rerand_proof = EgRerandProof::prove(
        &egrerand::CommonInput::new(u, v, h, &u_share, &v_share),
        &egrerand::ProverSecret::new(&alpha, &beta),
        &ProofContext::new(CHECK_DH_LABEL, pid),
        rng,
    )?;

    let mut data = u_share.to_bytes();
    data.extend_from_slice(&v_share.to_bytes());
    let nmc = NmcEnvelope::new(data.clone(), rerand_proof.to_bytes());

    let mut nmcs: Vec<Option<NmcEnvelope>> = vec![None; n];
    server.round(&RoundPayload::Broadcast(nmc.to_bytes()), |peer, bytes| {
        nmcs[peer as usize] = Some(NmcEnvelope::try_from_bytes(bytes)?);
        Ok(())
    })?;

    // Round 2. Open; each opening must recompose its envelope and its
    // proof must verify against the opened pair.
    let mut opening = data;
    opening.extend_from_slice(&rerand_proof.to_bytes());

    let mut u_shares: Vec<Option<CurvePoint>> = vec![None; n];
    let mut v_shares: Vec<Option<CurvePoint>> = vec![None; n];
    u_shares[pid as usize] = Some(u_share);
    v_shares[pid as usize] = Some(v_share);

    server.round(&RoundPayload::Broadcast(opening), |peer, bytes| {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let peer_u = CurvePoint::decode(&mut parser)?;
        let peer_v = CurvePoint::decode(&mut parser)?;
        let peer_proof = EgRerandProof::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        peer_proof.verify(
            &egrerand::CommonInput::new(u, v, h, &peer_u, &peer_v),
            &ProofContext::new(CHECK_DH_LABEL, peer),
        )?;
        let mut peer_data = peer_u.to_bytes();
        peer_data.extend_from_slice(&peer_v.to_bytes());
        nmcs[peer as usize]
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::NmcMismatch))?
            .verify(&peer_data, &peer_proof.to_bytes())?;
        u_shares[peer as usize] = Some(peer_u);
        v_shares[peer as usize] = Some(peer_v);
        Ok(())
    })?;

    let test_base = u_shares
        .iter()
        .flatten()
        .fold(CurvePoint::IDENTITY, |acc, share| acc + *share);
    let verify_value = v_shares
        .iter()
        .flatten()
        .fold(CurvePoint::IDENTITY, |acc, share| acc + *share);

    // Round 3. Raise the summed rerandomization to the own key share and
    // publish, proving consistency with the public key share.
    let test_value = test_base.multiply_by_bignum(key.sk_share())?;
    let reveal_proof = EgRevealProof::prove(
        &egreveal::CommonInput::new(&test_base, &test_value, key.pk_share()),
        &egreveal::ProverSecret::new(key.sk_share()),
        &ProofContext::new(CHECK_DH_LABEL, pid),
        rng,
    )?;
    let mut payload = test_value.to_bytes();
    payload.extend_from_slice(&reveal_proof.to_bytes());

    let mut test_values: Vec<Option<CurvePoint>> = vec![None; n];
    test_values[pid as usize] = Some(test_value);
    server.round(&RoundPayload::Broadcast(payload), |peer, bytes| {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let peer_test = CurvePoint::decode(&mut parser)?;
        let peer_proof = EgRevealProof::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        peer_proof.verify(
            &egreveal::CommonInput::new(&test_base, &peer_test, &key.pk_shares()[peer as usize]),
            &ProofContext::new(CHECK_DH_LABEL, peer),
        )?;
        test_values[peer as usize] = Some(peer_test);
        Ok(())
    })?;

    let final_test_value = test_values
        .iter()
        .flatten()
        .fold(CurvePoint::IDENTITY, |acc, value| acc + *value);

    if final_test_value != verify_value {
        error!("CheckDH equation does not balance");
        return Err(Error::Crypto(CryptoError::WrongValue));
    }
    Ok(())
}
