// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed keys: an additive share of a secret together with the
//! public key shares of every party and the combined group public key.

use crate::{
    arith::secret::DSecret,
    curve::{k256_order, CurvePoint},
    errors::{CryptoError, Error, Result},
    nmc::NmcEnvelope,
    sync::{RoundPayload, SyncServer},
    utils::{random_positive_bn, take_len_prefixed, write_len_prefixed, ParseBytes},
    zkp::{
        dlog::{self, DlogProof},
        Proof, ProofContext,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use tracing::instrument;

/// A distributed key: this party's share of the secret, every party's
/// public key share, and the group public key `pk = Σ pkShares`.
pub struct DKey {
    secret: DSecret,
    pk_share: CurvePoint,
    pk_shares: Vec<CurvePoint>,
    pk: CurvePoint,
}

impl std::fmt::Debug for DKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DKey")
            .field("secret", &self.secret)
            .field("pk", &self.pk)
            .finish()
    }
}

impl DKey {
    /// The name of the variable.
    pub fn label(&self) -> &str {
        self.secret.label()
    }

    /// The global public key.
    pub fn public_key(&self) -> &CurvePoint {
        &self.pk
    }

    /// This party's public key share.
    pub fn pk_share(&self) -> &CurvePoint {
        &self.pk_share
    }

    /// Every party's public key share, indexed by pid.
    pub fn pk_shares(&self) -> &[CurvePoint] {
        &self.pk_shares
    }

    pub(crate) fn sk_share(&self) -> &BigNumber {
        self.secret.sk_share()
    }

    pub(crate) fn server(&self) -> &Arc<SyncServer> {
        self.secret.server()
    }

    pub(crate) fn pid(&self) -> u16 {
        self.secret.pid()
    }
}

/// A distributed key over a thresholded secret.
pub struct TDKey {
    key: DKey,
    t: u16,
}

impl TDKey {
    pub(crate) fn new(
        secret: DSecret,
        pk_share: CurvePoint,
        pk_shares: Vec<CurvePoint>,
        pk: CurvePoint,
        t: u16,
    ) -> Self {
        Self {
            key: DKey {
                secret,
                pk_share,
                pk_shares,
                pk,
            },
            t,
        }
    }

    /// The number of parties that must collude to reveal the secret.
    pub fn threshold(&self) -> u16 {
        self.t
    }

    /// The global public key, reconstructed by interpolation in the
    /// exponent.
    pub fn public_key(&self) -> &CurvePoint {
        self.key.public_key()
    }
}

/// Generate a distributed key: every party samples a share, commits to its
/// public key share under a non-malleable envelope, then opens with a
/// proof of knowledge of the discrete log.
#[instrument(skip_all, fields(label, pid = server.pid()))]
pub fn gen_exp_reveal<R: RngCore + CryptoRng>(
    label: &str,
    server: &Arc<SyncServer>,
    rng: &mut R,
) -> Result<DKey> {
    let q = k256_order();
    let pid = server.pid();
    let n = server.n_proc() as usize;

    let sk_share = random_positive_bn(rng, &q);
    let pk_share = CurvePoint::scale_generator(&sk_share)?;
    let proof = DlogProof::prove(
        &dlog::CommonInput::new(&pk_share),
        &dlog::ProverSecret::new(&sk_share),
        &ProofContext::new(label, pid),
        rng,
    )?;
    let pk_share_bytes = pk_share.to_bytes();
    let proof_bytes = proof.to_bytes();

    // Round 1: commit to (pkShare, proof).
    let nmc = NmcEnvelope::new(pk_share_bytes.clone(), proof_bytes.clone());
    let mut nmcs: Vec<Option<NmcEnvelope>> = vec![None; n];
    server.round(&RoundPayload::Broadcast(nmc.to_bytes()), |peer, data| {
        nmcs[peer as usize] = Some(NmcEnvelope::try_from_bytes(data)?);
        Ok(())
    })?;

    // Round 2: open. The opening must recompose to the round-1 envelope
    // byte for byte, and the proof must verify against the opened share.
    let mut opening = Vec::new();
    write_len_prefixed(&mut opening, &proof_bytes);
    opening.extend_from_slice(&pk_share_bytes);

    let mut pk_shares: Vec<Option<CurvePoint>> = vec![None; n];
    pk_shares[pid as usize] = Some(pk_share);

    server.round(&RoundPayload::Broadcast(opening), |peer, data| {
        let mut parser = ParseBytes::new(data.to_vec());
        let peer_proof_bytes = take_len_prefixed(&mut parser)?;
        let peer_share_bytes = parser.take_rest()?.to_vec();
        let peer_share = CurvePoint::try_from_bytes(&peer_share_bytes)?;
        let peer_proof = DlogProof::from_bytes(&peer_proof_bytes)?;
        peer_proof.verify(
            &dlog::CommonInput::new(&peer_share),
            &ProofContext::new(label, peer),
        )?;
        nmcs[peer as usize]
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::NmcMismatch))?
            .verify(&peer_share_bytes, &peer_proof_bytes)?;
        pk_shares[peer as usize] = Some(peer_share);
        Ok(())
    })?;

    let pk_shares = pk_shares
        .into_iter()
        .map(|share| share.ok_or_else(|| Error::Protocol("public key share missing".into())))
        .collect::<Result<Vec<_>>>()?;
    let pk = pk_shares
        .iter()
        .fold(CurvePoint::IDENTITY, |acc, share| acc + *share);

    Ok(DKey {
        secret: DSecret::new(pid, label, sk_share, Arc::clone(server)),
        pk_share,
        pk_shares,
        pk,
    })
}
