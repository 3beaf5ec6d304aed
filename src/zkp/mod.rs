// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Non-interactive zero-knowledge proofs.
//!
//! Every proof here is a sigma protocol made non-interactive with
//! Fiat-Shamir over a [`merlin::Transcript`]. The transcript binds the
//! statement, the factory base where relevant, and a [`ProofContext`]
//! naming the session label and the proving party, so proofs cannot be
//! replayed across parties or protocol instances.

pub(crate) mod dlog;
pub(crate) mod egexp;
pub(crate) mod egknow;
pub(crate) mod egrefresh;
pub(crate) mod egrerand;
pub(crate) mod egreveal;

use crate::errors::Result;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};

/// Context bound into every proof transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProofContext {
    label: String,
    party: u16,
}

impl ProofContext {
    pub(crate) fn new(label: &str, party: u16) -> Self {
        Self {
            label: label.to_string(),
            party,
        }
    }

    pub(crate) fn append_to(&self, transcript: &mut Transcript) {
        transcript.append_message(b"session label", self.label.as_bytes());
        transcript.append_message(b"party", &self.party.to_le_bytes());
    }
}

/// Common interface for the proofs in this module.
pub(crate) trait Proof: Sized {
    /// Public statement known to prover and verifier.
    type CommonInput<'a>;
    /// Witness known only to the prover.
    type ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput<'_>,
        secret: &Self::ProverSecret<'_>,
        context: &ProofContext,
        rng: &mut R,
    ) -> Result<Self>;

    fn verify(&self, input: &Self::CommonInput<'_>, context: &ProofContext) -> Result<()>;

    fn to_bytes(&self) -> Vec<u8>;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}
