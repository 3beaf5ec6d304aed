// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Multiplication of two additively shared secrets.
//!
//! The cross terms are computed by pairwise multiplication-to-additive
//! conversion under Paillier: every ordered pair `(i, j)` converts
//! `a_i · b_j` into additive shares, so the sum of all parties' outputs is
//! `(Σ aᵢ)(Σ bᵢ)`. The result is then committed, tied to the inputs by an
//! exponentiation proof, and certified by a distributed Diffie-Hellman
//! check on `E(ab) ∘ E(c)⁻¹`.

use crate::{
    arith::{check_dh, commit_share, ADSecret, DKey},
    commitment::ElGamal,
    curve::k256_order,
    errors::{CryptoError, Error, Result},
    paillier::{Ciphertext, DecryptionKey, EncryptionKey},
    sync::{RoundPayload, SyncServer},
    utils::{random_positive_bn, ParseBytes},
    zkp::{
        egexp::{self, EgExpProof},
        Proof, ProofContext,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use tracing::{error, instrument};

/// Multiply two additively shared secrets into a fresh sharing of the
/// product. `key` is the distributed key whose public key is the ElGamal
/// factory base; it drives the certification check.
#[instrument(skip_all, fields(label, pid = a.pid()))]
pub fn mult<R: RngCore + CryptoRng>(
    a: &ADSecret,
    b: &ADSecret,
    label: &str,
    paillier_sk: &DecryptionKey,
    paillier_pks: &[EncryptionKey],
    key: &DKey,
    rng: &mut R,
) -> Result<ADSecret> {
    let q = k256_order();
    let pid = a.pid();
    let server = a.server();
    let n = server.n_proc() as usize;
    let egf = &a.egf;

    // Step 1. The composed commitment to b.
    let b_prod = b.egs.iter().fold(egf.neutral(), |acc, eg| acc.compose(eg));

    // Step 2. Pairwise MtA yields this party's additive share of a·b.
    let c_share = priv_mult(
        a.sk_share(),
        b.sk_share(),
        server,
        paillier_sk,
        paillier_pks,
        rng,
    )?;

    // Step 3. Commit the new share and prove knowledge of its opening.
    let c = commit_share(label, server, egf, c_share, rng)?;

    // Step 4. Publish `bProd^a ∘ Create(0, r')` with a proof that the
    // exponent is known.
    let ba_rand = random_positive_bn(rng, &q);
    let ba_share = b_prod
        .exp(a.sk_share())?
        .compose(&egf.create(&BigNumber::zero(), &ba_rand)?);
    let ba_proof = EgExpProof::prove(
        &egexp::CommonInput::new(egf, &b_prod, &ba_share),
        &egexp::ProverSecret::new(a.sk_share(), &ba_rand),
        &ProofContext::new(label, pid),
        rng,
    )?;
    let mut payload = ba_share.redacted().to_bytes();
    payload.extend_from_slice(&ba_proof.to_bytes());

    let mut ba_shares: Vec<Option<ElGamal>> = vec![None; n];
    ba_shares[pid as usize] = Some(ba_share);
    server.round(&RoundPayload::Broadcast(payload), |peer, data| {
        let mut parser = ParseBytes::new(data.to_vec());
        let peer_share = ElGamal::decode(&mut parser)?;
        let peer_proof = EgExpProof::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        peer_proof.verify(
            &egexp::CommonInput::new(egf, &b_prod, &peer_share),
            &ProofContext::new(label, peer),
        )?;
        ba_shares[peer as usize] = Some(peer_share);
        Ok(())
    })?;

    // Step 5. Compose commitments to a·b and to Σ c shares.
    let ab_eg = ba_shares
        .iter()
        .try_fold(egf.neutral(), |acc, share| {
            share
                .as_ref()
                .map(|share| acc.compose(share))
                .ok_or_else(|| Error::Protocol("ba share missing".into()))
        })?;
    let c_eg = c.egs.iter().fold(egf.neutral(), |acc, eg| acc.compose(eg));

    // Step 6. Certify c = a·b: if the two commitments commit to the same
    // value, their quotient is a DH pair under the factory base.
    let quotient = ab_eg.compose(&c_eg.inverse());
    check_dh(quotient.first(), quotient.second(), key, rng)?;

    Ok(c)
}

/// Pairwise multiplication-to-additive conversion.
///
/// Round 1 broadcasts `Enc_own(b)`. Round 2 answers every peer `j` with
/// `Enc_j(a·b_j + mask_j)` for a fresh `mask_j` and decrypts the replies.
/// The share of `a·b` is `a·b − Σ masks sent + Σ replies received (mod q)`.
/// Masks are drawn from `[0, N_j − q²)` so the homomorphic plaintext stays
/// below the modulus.
fn priv_mult<R: RngCore + CryptoRng>(
    a_share: &BigNumber,
    b_share: &BigNumber,
    server: &Arc<SyncServer>,
    paillier_sk: &DecryptionKey,
    paillier_pks: &[EncryptionKey],
    rng: &mut R,
) -> Result<BigNumber> {
    let q = k256_order();
    let pid = server.pid();
    let n = server.n_proc() as usize;
    if paillier_pks.len() != n {
        error!(
            "expected {n} Paillier public keys, got {}",
            paillier_pks.len()
        );
        return Err(Error::Protocol("wrong number of Paillier keys".into()));
    }

    // Round 1: everyone publishes an encryption of its b share under its
    // own key.
    let own_pk = &paillier_pks[pid as usize];
    let b_ciphertext = own_pk.encrypt(rng, b_share)?;
    let mut received: Vec<Option<Ciphertext>> = vec![None; n];
    server.round(
        &RoundPayload::Broadcast(b_ciphertext.to_bytes()),
        |peer, data| {
            received[peer as usize] = Some(Ciphertext::from_slice(data));
            Ok(())
        },
    )?;

    // Round 2: answer each peer with Enc_peer(a · b_peer + mask) and
    // decrypt the answers to our own broadcast.
    let q_squared = &q * &q;
    let mut masks = Vec::with_capacity(n);
    let mut to_send = Vec::with_capacity(n);
    for peer in 0..n {
        if peer == pid as usize {
            masks.push(BigNumber::zero());
            to_send.push(Vec::new());
            continue;
        }
        let peer_pk = &paillier_pks[peer];
        let peer_ciphertext = received[peer]
            .as_ref()
            .ok_or_else(|| Error::Protocol("peer ciphertext missing".into()))?;
        let mask_bound = peer_pk.modulus() - &q_squared;
        if mask_bound <= BigNumber::zero() {
            error!("Paillier modulus of party {peer} is too small for MtA");
            return Err(Error::Protocol("Paillier modulus too small".into()));
        }
        let mask = random_positive_bn(rng, &mask_bound);
        let masked_product = peer_pk.add(
            &peer_pk.mul(peer_ciphertext, a_share)?,
            &peer_pk.encrypt(rng, &mask)?,
        )?;
        to_send.push(masked_product.to_bytes());
        masks.push(mask);
    }

    let mut decrypted: Vec<Option<BigNumber>> = vec![None; n];
    server.round(&RoundPayload::PerPeer(to_send), |peer, data| {
        let reply = paillier_sk.decrypt(&Ciphertext::from_slice(data))?;
        decrypted[peer as usize] = Some(reply.nmod(&q));
        Ok(())
    })?;

    // Assemble the additive share of the product.
    let mut share = (a_share * b_share).nmod(&q);
    for peer in 0..n {
        if peer == pid as usize {
            continue;
        }
        let reply = decrypted[peer]
            .as_ref()
            .ok_or_else(|| Error::Protocol("MtA reply missing".into()))?;
        share = (&share + reply).nmod(&q);
        share = (&(&share + &q) - &masks[peer].nmod(&q)).nmod(&q);
    }
    Ok(share)
}
