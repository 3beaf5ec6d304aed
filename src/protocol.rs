// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The threshold ECDSA pipeline: `init`, `presign`, `sign`.
//!
//! `init` establishes the signing key and the commitment base. `presign`
//! prepares one tuple `(k, ρ, η, τ)` of t-of-N shared scalars with
//! `η = ρ·x` and `τ = k·ρ`, so that `sign` only needs two reveals and a
//! local linear combination:
//! `s = (m/τ)·ρ + (r/τ)·η = k⁻¹(m + r·x) (mod q)`.

use crate::{
    arith::{commit_share, gen, gen_exp_reveal, lin, mult, ADSecret, DKey, TDSecret},
    commitment::ElGamalFactory,
    curve::k256_order,
    errors::{CryptoError, Error, Result},
    paillier::{DecryptionKey, EncryptionKey},
    sync::SyncServer,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, instrument};

/// A complete ECDSA signature, low-S normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: BigNumber,
    pub s: BigNumber,
}

/// One precomputed signing tuple. Consumed by exactly one signature;
/// reusing a tuple would disclose the signing key.
struct Presignature {
    k: TDSecret,
    rho: TDSecret,
    eta: TDSecret,
    tau: TDSecret,
}

/// A party's view of the threshold ECDSA protocol.
pub struct Protocol {
    server: Arc<SyncServer>,
    key: DKey,
    eg_key: DKey,
    egf: ElGamalFactory,
    x_secret: ADSecret,
    paillier_sk: DecryptionKey,
    paillier_pks: Vec<EncryptionKey>,
    presigs: VecDeque<Presignature>,
}

impl Protocol {
    /// Run distributed key generation: the signing key `x`, the commitment
    /// base key `h`, and the committed sharing of `x` used by presigning.
    ///
    /// The ElGamal factory is built from the signing key's public key; all
    /// subsequent commitments in this session use that base.
    #[instrument(skip_all, fields(pid = server.pid()))]
    pub fn init<R: RngCore + CryptoRng>(
        server: Arc<SyncServer>,
        paillier_sk: DecryptionKey,
        paillier_pks: Vec<EncryptionKey>,
        rng: &mut R,
    ) -> Result<Self> {
        if paillier_pks.len() != server.n_proc() as usize {
            return Err(Error::Protocol(format!(
                "expected {} Paillier public keys, got {}",
                server.n_proc(),
                paillier_pks.len()
            )));
        }
        let key = gen_exp_reveal("x", &server, rng)?;
        let eg_key = gen_exp_reveal("h", &server, rng)?;
        let egf = ElGamalFactory::new(*key.public_key());
        let x_secret = commit_share("x", &server, &egf, key.sk_share().clone(), rng)?;
        info!("initialized threshold ECDSA for party {}", server.pid());
        Ok(Self {
            server,
            key,
            eg_key,
            egf,
            x_secret,
            paillier_sk,
            paillier_pks,
            presigs: VecDeque::new(),
        })
    }

    /// The group public key signatures verify under.
    pub fn public_key(&self) -> &crate::curve::CurvePoint {
        self.key.public_key()
    }

    /// The commitment base key established during init.
    pub fn eg_key(&self) -> &DKey {
        &self.eg_key
    }

    /// Number of queued presignatures.
    pub fn presignature_count(&self) -> usize {
        self.presigs.len()
    }

    /// Prepare one presignature tuple with threshold `t` and queue it.
    #[instrument(skip_all, fields(pid = self.server.pid(), t))]
    pub fn presign<R: RngCore + CryptoRng>(&mut self, t: u16, rng: &mut R) -> Result<()> {
        let n = self.server.n_proc();
        if t < 1 || t > n {
            return Err(Error::Protocol(format!(
                "presign threshold {t} out of range for {n} parties"
            )));
        }

        let k = gen("k", &self.server, &self.egf, rng)?;
        let rho = gen("rho", &self.server, &self.egf, rng)?;
        let eta = mult(
            &rho,
            &self.x_secret,
            "eta",
            &self.paillier_sk,
            &self.paillier_pks,
            &self.key,
            rng,
        )?;
        let tau = mult(
            &k,
            &rho,
            "tau",
            &self.paillier_sk,
            &self.paillier_pks,
            &self.key,
            rng,
        )?;

        let presig = Presignature {
            k: k.reshare(t, rng)?,
            rho: rho.reshare(t, rng)?,
            eta: eta.reshare(t, rng)?,
            tau: tau.reshare(t, rng)?,
        };
        self.presigs.push_back(presig);
        info!("queued presignature ({} in queue)", self.presigs.len());
        Ok(())
    }

    /// Sign a message scalar, consuming one presignature.
    #[instrument(skip_all, fields(pid = self.server.pid()))]
    pub fn sign(&mut self, message: &BigNumber) -> Result<Signature> {
        // Pop before use: a consumed tuple must never be reusable.
        let presig = self.presigs.pop_front().ok_or_else(|| {
            Error::Protocol(format!(
                "no presignatures left to sign the message {message}"
            ))
        })?;
        let q = k256_order();

        let nonce_key = presig.k.exp()?;
        let r = nonce_key.public_key().x_projection()?;

        let tau = presig.tau.reveal()?;
        let tau_inv = tau
            .invert(&q)
            .ok_or(Error::Crypto(CryptoError::NotInvertible))?;
        let alpha = (&(message.nmod(&q)) * &tau_inv).nmod(&q);
        let beta = (&r * &tau_inv).nmod(&q);

        let s_secret = lin(&alpha, &beta, &presig.rho, &presig.eta, "s")?;
        let mut s = s_secret.reveal()?;

        // Low-S normalization; (r, q − s) verifies whenever (r, s) does.
        let half_q = &q / &BigNumber::from(2u64);
        if s > half_q {
            s = (&q - &s).nmod(&q);
        }
        Ok(Signature { r, s })
    }
}
