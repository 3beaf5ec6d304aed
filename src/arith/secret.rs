// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed secrets.
//!
//! A [`DSecret`] is one additive share of a global secret: the secret is
//! the sum of all parties' shares mod q. An [`ADSecret`] additionally
//! carries ElGamal commitments to every party's share, and a [`TDSecret`]
//! is a t-of-N Shamir sharing produced by resharing.

use crate::{
    arith::{key::TDKey, lagrange_coefficient_at_zero},
    commitment::{ElGamal, ElGamalFactory},
    curve::{k256_order, CurvePoint},
    errors::{CryptoError, Error, Result},
    sync::{RoundPayload, SyncServer},
    utils::{random_positive_bn, ParseBytes},
    zkp::{
        egknow::{self, EgKnowProof},
        Proof, ProofContext,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use tracing::{error, instrument};

/// One party's additive share of a distributed secret.
pub struct DSecret {
    pid: u16,
    label: String,
    sk_share: BigNumber,
    server: Arc<SyncServer>,
}

impl std::fmt::Debug for DSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DSecret")
            .field("pid", &self.pid)
            .field("label", &self.label)
            .field("sk_share", &"[redacted]")
            .finish()
    }
}

impl DSecret {
    pub(crate) fn new(
        pid: u16,
        label: &str,
        sk_share: BigNumber,
        server: Arc<SyncServer>,
    ) -> Self {
        Self {
            pid,
            label: label.to_string(),
            sk_share,
            server,
        }
    }

    /// The name of the shared variable.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// This party's index.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub(crate) fn sk_share(&self) -> &BigNumber {
        &self.sk_share
    }

    pub(crate) fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }
}

/// An additively shared secret with ElGamal commitments to every share.
///
/// Invariant: `egs[pid]` opens as `Create(sk_share, r)`; every other slot
/// holds the commitment received from that party after proof verification.
pub struct ADSecret {
    pub(crate) secret: DSecret,
    pub(crate) r: BigNumber,
    pub(crate) egf: ElGamalFactory,
    pub(crate) egs: Vec<ElGamal>,
}

impl std::fmt::Debug for ADSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ADSecret")
            .field("secret", &self.secret)
            .field("r", &"[redacted]")
            .finish()
    }
}

impl ADSecret {
    pub fn label(&self) -> &str {
        self.secret.label()
    }

    pub fn pid(&self) -> u16 {
        self.secret.pid()
    }

    pub(crate) fn sk_share(&self) -> &BigNumber {
        self.secret.sk_share()
    }

    pub(crate) fn server(&self) -> &Arc<SyncServer> {
        self.secret.server()
    }

    /// The commitment this party published for its own share.
    pub(crate) fn own_eg(&self) -> &ElGamal {
        &self.egs[self.pid() as usize]
    }
}

/// A t-of-N Shamir sharing: `sk_share` is the evaluation of a degree t−1
/// polynomial at `pid + 1`, and `egs` commits to every party's evaluation.
pub struct TDSecret {
    pub(crate) secret: ADSecret,
    t: u16,
}

impl std::fmt::Debug for TDSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TDSecret")
            .field("secret", &self.secret)
            .field("t", &self.t)
            .finish()
    }
}

impl TDSecret {
    pub(crate) fn new(secret: ADSecret, t: u16) -> Self {
        Self { secret, t }
    }

    pub fn label(&self) -> &str {
        self.secret.label()
    }

    pub fn pid(&self) -> u16 {
        self.secret.pid()
    }

    /// The number of parties that must cooperate to reveal the secret.
    pub fn threshold(&self) -> u16 {
        self.t
    }

    pub(crate) fn sk_share(&self) -> &BigNumber {
        self.secret.sk_share()
    }

    fn server(&self) -> &Arc<SyncServer> {
        self.secret.server()
    }

    /// The first `t` parties, used as the reconstruction set. Every party
    /// holds a share after resharing, so any fixed choice works as long as
    /// all parties agree on it.
    fn reconstruction_set(&self) -> Vec<u16> {
        (0..self.t).collect()
    }

    /// Reveal the shared secret: one broadcast round of shares, then
    /// Lagrange interpolation at zero over `t` of them.
    #[instrument(skip_all, fields(label = self.label(), pid = self.pid()))]
    pub fn reveal(&self) -> Result<BigNumber> {
        let n = self.server().n_proc() as usize;
        let mut shares: Vec<Option<BigNumber>> = vec![None; n];
        shares[self.pid() as usize] = Some(self.sk_share().clone());

        let to_send = RoundPayload::Broadcast(self.sk_share().to_bytes());
        self.server().round(&to_send, |peer, data| {
            shares[peer as usize] = Some(BigNumber::from_slice(data).nmod(&k256_order()));
            Ok(())
        })?;

        let available = shares.iter().flatten().count();
        if available < self.t as usize {
            error!(
                "only {available} shares available to reveal '{}', need {}",
                self.label(),
                self.t
            );
            return Err(Error::Protocol("too few shares to reveal".into()));
        }

        let q = k256_order();
        let args = self.reconstruction_set();
        let mut secret = BigNumber::zero();
        for &pid in &args {
            let share = shares[pid as usize]
                .as_ref()
                .ok_or_else(|| Error::Protocol("reconstruction share missing".into()))?;
            let lambda = lagrange_coefficient_at_zero(pid, &args)?;
            secret = (&secret + &(&lambda * share)).nmod(&q);
        }
        Ok(secret)
    }

    /// Raise the sharing into the exponent: one broadcast round of public
    /// key shares, then Lagrange reconstruction of the group public key.
    #[instrument(skip_all, fields(label = self.label(), pid = self.pid()))]
    pub fn exp(&self) -> Result<TDKey> {
        let n = self.server().n_proc() as usize;
        let pk_share = CurvePoint::scale_generator(self.sk_share())?;

        let mut pk_shares: Vec<Option<CurvePoint>> = vec![None; n];
        pk_shares[self.pid() as usize] = Some(pk_share);

        let to_send = RoundPayload::Broadcast(pk_share.to_bytes());
        self.server().round(&to_send, |peer, data| {
            pk_shares[peer as usize] = Some(CurvePoint::try_from_bytes(data)?);
            Ok(())
        })?;

        let args = self.reconstruction_set();
        let mut pk = CurvePoint::IDENTITY;
        for &pid in &args {
            let share = pk_shares[pid as usize]
                .ok_or_else(|| Error::Protocol("public key share missing".into()))?;
            let lambda = lagrange_coefficient_at_zero(pid, &args)?;
            pk = pk + share.multiply_by_bignum(&lambda)?;
        }

        let pk_shares = pk_shares
            .into_iter()
            .map(|share| share.ok_or_else(|| Error::Protocol("public key share missing".into())))
            .collect::<Result<Vec<_>>>()?;

        Ok(TDKey::new(
            DSecret::new(
                self.pid(),
                self.label(),
                self.sk_share().clone(),
                Arc::clone(self.server()),
            ),
            pk_share,
            pk_shares,
            pk,
            self.t,
        ))
    }
}

/// Generate a fresh additively shared secret with the given label.
///
/// Samples `sk, r ∈ [0, q)`, publishes `Create(sk, r)` with a proof of
/// knowledge of the opening, and collects every peer's commitment.
#[instrument(skip_all, fields(label, pid = server.pid()))]
pub fn gen<R: RngCore + CryptoRng>(
    label: &str,
    server: &Arc<SyncServer>,
    egf: &ElGamalFactory,
    rng: &mut R,
) -> Result<ADSecret> {
    let q = k256_order();
    let sk = random_positive_bn(rng, &q);
    commit_share(label, server, egf, sk, rng)
}

/// Promote an existing additive share to an [`ADSecret`] by running the
/// commit round on it. Used to make the signing key usable in products.
#[instrument(skip_all, fields(label, pid = server.pid()))]
pub(crate) fn commit_share<R: RngCore + CryptoRng>(
    label: &str,
    server: &Arc<SyncServer>,
    egf: &ElGamalFactory,
    sk_share: BigNumber,
    rng: &mut R,
) -> Result<ADSecret> {
    let q = k256_order();
    let pid = server.pid();
    let n = server.n_proc() as usize;

    let r = random_positive_bn(rng, &q);
    let eg = egf.create(&sk_share, &r)?;
    let proof = EgKnowProof::prove(
        &egknow::CommonInput::new(egf, &eg),
        &egknow::ProverSecret::new(&sk_share, &r),
        &ProofContext::new(label, pid),
        rng,
    )?;

    let mut payload = eg.redacted().to_bytes();
    payload.extend_from_slice(&proof.to_bytes());

    let mut egs: Vec<Option<ElGamal>> = vec![None; n];
    egs[pid as usize] = Some(eg);

    server.round(&RoundPayload::Broadcast(payload), |peer, data| {
        let mut parser = ParseBytes::new(data.to_vec());
        let peer_eg = ElGamal::decode(&mut parser)?;
        let peer_proof = EgKnowProof::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        peer_proof.verify(
            &egknow::CommonInput::new(egf, &peer_eg),
            &ProofContext::new(label, peer),
        )?;
        egs[peer as usize] = Some(peer_eg);
        Ok(())
    })?;

    let egs = egs
        .into_iter()
        .map(|eg| eg.ok_or_else(|| Error::Protocol("peer commitment missing".into())))
        .collect::<Result<Vec<_>>>()?;

    Ok(ADSecret {
        secret: DSecret::new(pid, label, sk_share, Arc::clone(server)),
        r,
        egf: egf.clone(),
        egs,
    })
}

/// Locally compute the linear combination `α·a + β·b` of two sharings with
/// the same threshold, commitments included. No rounds.
pub fn lin(
    alpha: &BigNumber,
    beta: &BigNumber,
    a: &TDSecret,
    b: &TDSecret,
    label: &str,
) -> Result<TDSecret> {
    if a.threshold() != b.threshold() {
        error!(
            "cannot combine sharings with thresholds {} and {}",
            a.threshold(),
            b.threshold()
        );
        return Err(Error::Protocol("mismatched thresholds".into()));
    }
    let q = k256_order();
    let sk_share = (&(alpha * a.sk_share()) + &(beta * b.sk_share())).nmod(&q);
    let r = (&(alpha * &a.secret.r) + &(beta * &b.secret.r)).nmod(&q);
    let egs = a
        .secret
        .egs
        .iter()
        .zip(&b.secret.egs)
        .map(|(ea, eb)| Ok(ea.exp(alpha)?.compose(&eb.exp(beta)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(TDSecret::new(
        ADSecret {
            secret: DSecret::new(
                a.pid(),
                label,
                sk_share,
                Arc::clone(a.secret.server()),
            ),
            r,
            egf: a.secret.egf.clone(),
            egs,
        },
        a.threshold(),
    ))
}
