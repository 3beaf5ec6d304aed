// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Resharing an additively shared secret into a t-of-N Shamir sharing.
//!
//! Every party deals a random polynomial with its additive share as the
//! constant term, commits to the coefficients (binding the constant term to
//! the already-published share commitment by a refresh proof), derives
//! commitments to every evaluation homomorphically, and privately delivers
//! one evaluation to each party. The new share is the sum of received
//! evaluations, an evaluation at `pid + 1` of the sum polynomial.

use crate::{
    arith::{poly::Polynomial, secret::DSecret, ADSecret, TDSecret},
    commitment::ElGamal,
    curve::k256_order,
    errors::{CryptoError, Error, Result},
    nmc::NmcEnvelope,
    sync::RoundPayload,
    utils::{random_positive_bn, take_len_prefixed, write_len_prefixed, ParseBytes},
    zkp::{
        egknow::{self, EgKnowProof},
        egrefresh::{self, EgRefreshProof},
        Proof, ProofContext,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use tracing::instrument;

/// Coefficient commitments and their proofs, as committed and opened.
struct CoefOpening {
    coef_comms: Vec<ElGamal>,
    egknows: Vec<EgKnowProof>,
    egrefresh: EgRefreshProof,
}

impl CoefOpening {
    /// The envelope contents: commitment bytes as data, proof bytes as zkp.
    /// Encoding is deterministic, so the opener re-encodes and compares.
    fn nmc_parts(&self) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        for comm in &self.coef_comms {
            data.extend_from_slice(&comm.to_bytes());
        }
        let mut zkp = Vec::new();
        for proof in &self.egknows {
            zkp.extend_from_slice(&proof.to_bytes());
        }
        zkp.extend_from_slice(&self.egrefresh.to_bytes());
        (data, zkp)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let (data, zkp) = self.nmc_parts();
        let mut out = data;
        out.extend_from_slice(&zkp);
        out
    }

    fn try_from_bytes(bytes: &[u8], t: u16) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let coef_comms = (0..t)
            .map(|_| ElGamal::decode(&mut parser))
            .collect::<Result<Vec<_>>>()?;
        let egknows = (0..t)
            .map(|_| EgKnowProof::decode(&mut parser))
            .collect::<Result<Vec<_>>>()?;
        let egrefresh = EgRefreshProof::decode(&mut parser)?;
        if !parser.is_empty() {
            return Err(Error::Crypto(CryptoError::Deserialization));
        }
        Ok(Self {
            coef_comms,
            egknows,
            egrefresh,
        })
    }
}

impl ADSecret {
    /// Transform this additive sharing into a t-of-N Shamir sharing.
    #[instrument(skip_all, fields(label = self.label(), pid = self.pid(), t))]
    pub fn reshare<R: RngCore + CryptoRng>(&self, t: u16, rng: &mut R) -> Result<TDSecret> {
        let n = self.server().n_proc();
        if t < 1 || t > n {
            return Err(Error::Protocol(format!(
                "cannot reshare with threshold {t} among {n} parties"
            )));
        }
        let q = k256_order();
        let pid = self.pid();
        let label = self.label().to_string();
        let egf = &self.egf;

        // STEP 1. Prove knowledge of the opening of the existing share
        // commitment; verify every peer's proof against their commitment.
        let own_know = EgKnowProof::prove(
            &egknow::CommonInput::new(egf, self.own_eg()),
            &egknow::ProverSecret::new(self.sk_share(), &self.r),
            &ProofContext::new(&label, pid),
            rng,
        )?;
        self.server()
            .round(&RoundPayload::Broadcast(own_know.to_bytes()), |peer, data| {
                let proof = EgKnowProof::from_bytes(data)?;
                proof.verify(
                    &egknow::CommonInput::new(egf, &self.egs[peer as usize]),
                    &ProofContext::new(&label, peer),
                )
            })?;

        // STEP 2. Pick a random polynomial f of degree t−1 with
        // f(0) = skShare.
        let f = Polynomial::random_with_constant_term(t, self.sk_share().clone(), rng)?;

        // STEP 3. Commit to the coefficients. The constant term is not
        // committed afresh: the existing share commitment is refreshed, so
        // verifiers know the dealt polynomial starts at the committed share.
        let mut coef_comms = Vec::with_capacity(t as usize);
        let mut eff_rands = Vec::with_capacity(t as usize);
        let refresh_rand = random_positive_bn(rng, &q);
        let refreshed_own =
            self.own_eg()
                .compose(&egf.create(&BigNumber::zero(), &refresh_rand)?);
        coef_comms.push(refreshed_own);
        eff_rands.push((&self.r + &refresh_rand).nmod(&q));
        for i in 1..t as usize {
            let rand_i = random_positive_bn(rng, &q);
            coef_comms.push(egf.create(f.coefficient(i), &rand_i)?);
            eff_rands.push(rand_i);
        }

        let egrefresh = EgRefreshProof::prove(
            &egrefresh::CommonInput::new(egf, self.own_eg(), &coef_comms[0]),
            &egrefresh::ProverSecret::new(&refresh_rand),
            &ProofContext::new(&label, pid),
            rng,
        )?;
        let egknows = (0..t as usize)
            .map(|i| {
                EgKnowProof::prove(
                    &egknow::CommonInput::new(egf, &coef_comms[i]),
                    &egknow::ProverSecret::new(f.coefficient(i), &eff_rands[i]),
                    &ProofContext::new(&label, pid),
                    rng,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        // Openings stay local: only redacted copies go on the wire (and
        // into the envelope, so peers can rebuild it byte for byte).
        let opening = CoefOpening {
            coef_comms: coef_comms.iter().map(ElGamal::redacted).collect(),
            egknows,
            egrefresh,
        };

        // STEP 4. Commit to the coefficient commitments and proofs.
        let (data, zkp) = opening.nmc_parts();
        let nmc = NmcEnvelope::new(data, zkp);
        let mut nmcs: Vec<Option<NmcEnvelope>> = vec![None; n as usize];
        self.server()
            .round(&RoundPayload::Broadcast(nmc.to_bytes()), |peer, data| {
                nmcs[peer as usize] = Some(NmcEnvelope::try_from_bytes(data)?);
                Ok(())
            })?;

        // STEP 5. Open; verify proofs against the opened commitments and
        // that the opening recomposes each peer's envelope.
        let mut all_coef_comms: Vec<Option<Vec<ElGamal>>> = vec![None; n as usize];
        self.server()
            .round(&RoundPayload::Broadcast(opening.to_bytes()), |peer, data| {
                let peer_opening = CoefOpening::try_from_bytes(data, t)?;
                peer_opening.egrefresh.verify(
                    &egrefresh::CommonInput::new(
                        egf,
                        &self.egs[peer as usize],
                        &peer_opening.coef_comms[0],
                    ),
                    &ProofContext::new(&label, peer),
                )?;
                for (comm, know) in peer_opening.coef_comms.iter().zip(&peer_opening.egknows) {
                    know.verify(
                        &egknow::CommonInput::new(egf, comm),
                        &ProofContext::new(&label, peer),
                    )?;
                }
                let (peer_data, peer_zkp) = peer_opening.nmc_parts();
                nmcs[peer as usize]
                    .as_ref()
                    .ok_or(Error::Crypto(CryptoError::NmcMismatch))?
                    .verify(&peer_data, &peer_zkp)?;
                all_coef_comms[peer as usize] = Some(peer_opening.coef_comms);
                Ok(())
            })?;
        all_coef_comms[pid as usize] = Some(opening.coef_comms);
        let all_coef_comms = all_coef_comms
            .into_iter()
            .map(|comms| comms.ok_or_else(|| Error::Protocol("coefficient commitments missing".into())))
            .collect::<Result<Vec<_>>>()?;

        // STEP 6. Derive commitments to every evaluation f_k(l+1) from the
        // coefficient commitments. The zeroth term is composed directly:
        // raising to (l+1)^0 must contribute the commitment itself, not the
        // neutral element.
        let mut eg_eval: Vec<Vec<ElGamal>> = Vec::with_capacity(n as usize);
        for dealer in 0..n as usize {
            let mut row = Vec::with_capacity(n as usize);
            for l in 0..n as usize {
                let x = BigNumber::from((l + 1) as u64);
                let mut acc = all_coef_comms[dealer][0].clone();
                let mut x_pow = BigNumber::one();
                for comm in all_coef_comms[dealer].iter().skip(1) {
                    x_pow = (&x_pow * &x).nmod(&q);
                    acc = acc.compose(&comm.exp(&x_pow)?);
                }
                row.push(acc);
            }
            eg_eval.push(row);
        }
        // Track the matching linear combination of our own randomizers so
        // we can open the derived commitments.
        let mut eval_rands = Vec::with_capacity(n as usize);
        for l in 0..n as usize {
            let x = BigNumber::from((l + 1) as u64);
            let mut acc = eff_rands[0].clone();
            let mut x_pow = BigNumber::one();
            for rand_i in eff_rands.iter().skip(1) {
                x_pow = (&x_pow * &x).nmod(&q);
                acc = (&acc + &(rand_i * &x_pow)).nmod(&q);
            }
            eval_rands.push(acc);
        }

        // STEP 7. Refresh the own evaluation commitments and prove each
        // refresh against the derived grid.
        let mut fresh_rands = Vec::with_capacity(n as usize);
        let mut payload = Vec::new();
        let mut own_refreshed = Vec::with_capacity(n as usize);
        for l in 0..n as usize {
            let fresh = random_positive_bn(rng, &q);
            let refreshed =
                eg_eval[pid as usize][l].compose(&egf.create(&BigNumber::zero(), &fresh)?);
            let proof = EgRefreshProof::prove(
                &egrefresh::CommonInput::new(egf, &eg_eval[pid as usize][l], &refreshed),
                &egrefresh::ProverSecret::new(&fresh),
                &ProofContext::new(&label, pid),
                rng,
            )?;
            payload.extend_from_slice(&refreshed.redacted().to_bytes());
            payload.extend_from_slice(&proof.to_bytes());
            own_refreshed.push(refreshed.redacted());
            fresh_rands.push(fresh);
        }

        let mut all_eval_refresh: Vec<Option<Vec<ElGamal>>> = vec![None; n as usize];
        self.server()
            .round(&RoundPayload::Broadcast(payload), |peer, data| {
                let mut parser = ParseBytes::new(data.to_vec());
                let mut comms = Vec::with_capacity(n as usize);
                for l in 0..n as usize {
                    let comm = ElGamal::decode(&mut parser)?;
                    let proof = EgRefreshProof::decode(&mut parser)?;
                    proof.verify(
                        &egrefresh::CommonInput::new(egf, &eg_eval[peer as usize][l], &comm),
                        &ProofContext::new(&label, peer),
                    )?;
                    comms.push(comm);
                }
                if !parser.is_empty() {
                    return Err(Error::Crypto(CryptoError::Deserialization));
                }
                all_eval_refresh[peer as usize] = Some(comms);
                Ok(())
            })?;
        all_eval_refresh[pid as usize] = Some(own_refreshed);
        let all_eval_refresh = all_eval_refresh
            .into_iter()
            .map(|comms| comms.ok_or_else(|| Error::Protocol("evaluation commitments missing".into())))
            .collect::<Result<Vec<_>>>()?;

        // STEP 8. Privately deliver (f(l+1), opening randomizer) to each
        // party l; verify that every received pair opens the sender's
        // refreshed evaluation commitment for our slot.
        let mut to_send = Vec::with_capacity(n as usize);
        let mut open_rands = Vec::with_capacity(n as usize);
        for l in 0..n as usize {
            let eval = f.evaluate(&BigNumber::from((l + 1) as u64));
            let open_rand = (&eval_rands[l] + &fresh_rands[l]).nmod(&q);
            let mut message = Vec::new();
            write_len_prefixed(&mut message, &eval.to_bytes());
            message.extend_from_slice(&open_rand.to_bytes());
            to_send.push(message);
            open_rands.push(open_rand);
        }

        let mut recv_evals: Vec<Option<BigNumber>> = vec![None; n as usize];
        let mut recv_rands: Vec<Option<BigNumber>> = vec![None; n as usize];
        recv_evals[pid as usize] = Some(f.evaluate(&BigNumber::from((pid + 1) as u64)));
        recv_rands[pid as usize] = Some(open_rands[pid as usize].clone());

        self.server()
            .round(&RoundPayload::PerPeer(to_send), |peer, data| {
                let mut parser = ParseBytes::new(data.to_vec());
                let eval = BigNumber::from_slice(take_len_prefixed(&mut parser)?).nmod(&q);
                let rand = BigNumber::from_slice(parser.take_rest()?).nmod(&q);
                if egf.create(&eval, &rand)? != all_eval_refresh[peer as usize][pid as usize] {
                    return Err(Error::Crypto(CryptoError::BadOpening));
                }
                recv_evals[peer as usize] = Some(eval);
                recv_rands[peer as usize] = Some(rand);
                Ok(())
            })?;

        // STEP 9. The new share is the sum of received evaluations; join
        // the commitment grid column-wise to commit to every new share.
        let mut share = BigNumber::zero();
        let mut share_rand = BigNumber::zero();
        for (eval, rand) in recv_evals.iter().zip(&recv_rands) {
            share = (&share
                + eval
                    .as_ref()
                    .ok_or_else(|| Error::Protocol("evaluation missing".into()))?)
            .nmod(&q);
            share_rand = (&share_rand
                + rand
                    .as_ref()
                    .ok_or_else(|| Error::Protocol("randomizer missing".into()))?)
            .nmod(&q);
        }
        let mut share_comms: Vec<ElGamal> = (0..n as usize)
            .map(|l| {
                all_eval_refresh
                    .iter()
                    .fold(egf.neutral(), |acc, row| acc.compose(&row[l]))
            })
            .collect();

        // STEP 10. Final refresh of the own share commitment.
        let final_rand = random_positive_bn(rng, &q);
        let refreshed_share_comm =
            share_comms[pid as usize].compose(&egf.create(&BigNumber::zero(), &final_rand)?);
        let final_proof = EgRefreshProof::prove(
            &egrefresh::CommonInput::new(
                egf,
                &share_comms[pid as usize],
                &refreshed_share_comm,
            ),
            &egrefresh::ProverSecret::new(&final_rand),
            &ProofContext::new(&label, pid),
            rng,
        )?;
        let mut final_payload = refreshed_share_comm.redacted().to_bytes();
        final_payload.extend_from_slice(&final_proof.to_bytes());

        let mut replacements: Vec<Option<ElGamal>> = vec![None; n as usize];
        self.server()
            .round(&RoundPayload::Broadcast(final_payload), |peer, data| {
                let mut parser = ParseBytes::new(data.to_vec());
                let comm = ElGamal::decode(&mut parser)?;
                let proof = EgRefreshProof::decode(&mut parser)?;
                if !parser.is_empty() {
                    return Err(Error::Crypto(CryptoError::Deserialization));
                }
                proof.verify(
                    &egrefresh::CommonInput::new(egf, &share_comms[peer as usize], &comm),
                    &ProofContext::new(&label, peer),
                )?;
                replacements[peer as usize] = Some(comm);
                Ok(())
            })?;
        for (l, replacement) in replacements.into_iter().enumerate() {
            if let Some(comm) = replacement {
                share_comms[l] = comm;
            }
        }
        share_comms[pid as usize] = refreshed_share_comm;

        let r = (&share_rand + &final_rand).nmod(&q);
        Ok(TDSecret::new(
            ADSecret {
                secret: DSecret::new(pid, &label, share, Arc::clone(self.server())),
                r,
                egf: egf.clone(),
                egs: share_comms,
            },
            t,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::testing::{run_parties, test_servers};
    use crate::arith::{gen, lagrange_coefficient_at_zero};
    use crate::commitment::ElGamalFactory;
    use crate::curve::CurvePoint;
    use crate::utils::testing::{init_testing, party_rngs};
    use rand::{Rng, SeedableRng};

    fn gen_and_reshare(n: u16, t: u16) -> (Vec<BigNumber>, Vec<TDSecret>) {
        let mut rng = init_testing();
        let servers = test_servers(n);
        let h = CurvePoint::scale_generator(&BigNumber::from(rng.gen::<u64>())).unwrap();
        let egf = ElGamalFactory::new(h);
        let rngs = party_rngs(rng.gen(), n);

        let outputs = run_parties(&servers, rngs, |server, rng| {
            let ads = gen("x", server, &egf, rng)?;
            let tds = ads.reshare(t, rng)?;
            Ok((ads.sk_share().clone(), tds))
        });
        outputs.into_iter().unzip()
    }

    fn interpolate(tds: &[TDSecret], args: &[u16]) -> BigNumber {
        let q = k256_order();
        let mut sum = BigNumber::zero();
        for &pid in args {
            let lambda = lagrange_coefficient_at_zero(pid, args).unwrap();
            sum = (&sum + &(&lambda * tds[pid as usize].sk_share())).nmod(&q);
        }
        sum
    }

    #[test]
    fn any_t_subset_reconstructs_the_original_secret() {
        let (orig_shares, tds) = gen_and_reshare(3, 2);
        let q = k256_order();
        let secret = orig_shares
            .iter()
            .fold(BigNumber::zero(), |acc, share| (&acc + share).nmod(&q));

        for args in [[0u16, 1], [1, 2], [0, 2]] {
            assert_eq!(interpolate(&tds, &args), secret);
        }
    }

    #[test]
    fn threshold_one_gives_every_party_the_secret() {
        let (orig_shares, tds) = gen_and_reshare(2, 1);
        let q = k256_order();
        let secret = orig_shares
            .iter()
            .fold(BigNumber::zero(), |acc, share| (&acc + share).nmod(&q));
        for pid in 0..2u16 {
            assert_eq!(interpolate(&tds, &[pid]), secret);
        }
    }

    #[test]
    fn full_threshold_reshare_completes_for_two_parties() {
        let (orig_shares, tds) = gen_and_reshare(2, 2);
        let q = k256_order();
        let secret = orig_shares
            .iter()
            .fold(BigNumber::zero(), |acc, share| (&acc + share).nmod(&q));
        assert_eq!(interpolate(&tds, &[0, 1]), secret);
    }

    #[test]
    fn commitment_vectors_agree_and_open_correctly() {
        let (_, tds) = gen_and_reshare(3, 2);
        // Every party derived the same commitment vector.
        for tds_i in &tds[1..] {
            assert_eq!(tds_i.secret.egs, tds[0].secret.egs);
        }
        // Each party's slot opens under its share and randomizer.
        for tds_i in &tds {
            let egf = &tds_i.secret.egf;
            assert_eq!(
                tds_i.secret.own_eg(),
                &egf.create(tds_i.sk_share(), &tds_i.secret.r).unwrap()
            );
        }
    }

    #[test]
    fn reshare_rejects_invalid_thresholds() {
        let mut rng = init_testing();
        let servers = test_servers(2);
        let h = CurvePoint::scale_generator(&BigNumber::from(rng.gen::<u64>())).unwrap();
        let egf = ElGamalFactory::new(h);
        let rngs = party_rngs(rng.gen(), 2);
        let secrets = run_parties(&servers, rngs, |server, rng| gen("x", server, &egf, rng));
        let mut rng0 = rand::rngs::StdRng::seed_from_u64(7);
        assert!(secrets[0].reshare(0, &mut rng0).is_err());
        assert!(secrets[0].reshare(3, &mut rng0).is_err());
    }

    #[test]
    fn reshare_completes_for_ten_parties() {
        let (orig_shares, tds) = gen_and_reshare(10, 2);
        let q = k256_order();
        let secret = orig_shares
            .iter()
            .fold(BigNumber::zero(), |acc, share| (&acc + share).nmod(&q));
        assert_eq!(interpolate(&tds, &[3, 8]), secret);
        assert_eq!(interpolate(&tds, &[0, 9]), secret);
    }

    #[test]
    fn exp_reconstructs_the_public_key_after_resharing() {
        let mut rng = init_testing();
        let n = 3u16;
        let t = 2u16;
        let servers = test_servers(n);
        let h = CurvePoint::scale_generator(&BigNumber::from(rng.gen::<u64>())).unwrap();
        let egf = ElGamalFactory::new(h);
        let rngs = party_rngs(rng.gen(), n);

        let outputs = run_parties(&servers, rngs, |server, rng| {
            let ads = gen("x", server, &egf, rng)?;
            let share = ads.sk_share().clone();
            let tdk = ads.reshare(t, rng)?.exp()?;
            Ok((share, tdk))
        });

        let q = k256_order();
        let secret = outputs
            .iter()
            .fold(BigNumber::zero(), |acc, (share, _)| (&acc + share).nmod(&q));
        let expected = CurvePoint::scale_generator(&secret).unwrap();
        for (_, tdk) in &outputs {
            assert_eq!(tdk.public_key(), &expected);
            assert_eq!(tdk.threshold(), t);
        }
    }
}
