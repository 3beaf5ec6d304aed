// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Polynomials over GF(q) for Shamir resharing.
//!
//! Party `pid` always evaluates at `pid + 1`: evaluating at `pid` would hand
//! party 0 the constant term, which is the shared secret.

use crate::{
    curve::k256_order,
    errors::{CryptoError, Error, Result},
    utils::random_positive_bn,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// A polynomial of degree `t − 1` over GF(q), stored by coefficients with
/// the constant term first.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct Polynomial {
    coefficients: Vec<BigNumber>,
}

impl std::fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &(self.coefficients.len() - 1))
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl Polynomial {
    /// Sample a random polynomial of degree `t − 1` with the given constant
    /// term. The top coefficient is forced nonzero so the degree is exact.
    pub(crate) fn random_with_constant_term<R: RngCore + CryptoRng>(
        t: u16,
        constant_term: BigNumber,
        rng: &mut R,
    ) -> Result<Self> {
        if t < 1 {
            error!("cannot sample a polynomial for threshold {t}");
            return Err(Error::Protocol(format!("cannot reshare with threshold {t}")));
        }
        let q = k256_order();
        let mut coefficients = Vec::with_capacity(t as usize);
        coefficients.push(constant_term.nmod(&q));
        for i in 1..t as usize {
            if i == t as usize - 1 {
                // Top coefficient in [1, q).
                let bound = &q - &BigNumber::one();
                coefficients.push(random_positive_bn(rng, &bound) + BigNumber::one());
            } else {
                coefficients.push(random_positive_bn(rng, &q));
            }
        }
        Ok(Self { coefficients })
    }

    /// Number of coefficients, i.e. the threshold `t`.
    pub(crate) fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub(crate) fn coefficient(&self, i: usize) -> &BigNumber {
        &self.coefficients[i]
    }

    /// Horner evaluation mod q.
    pub(crate) fn evaluate(&self, x: &BigNumber) -> BigNumber {
        let q = k256_order();
        let mut eval = self.coefficients[self.coefficients.len() - 1].clone();
        for coefficient in self.coefficients.iter().rev().skip(1) {
            eval = (&(&eval * x) + coefficient).nmod(&q);
        }
        eval
    }
}

/// The Lagrange coefficient λ_i at zero for the evaluation points
/// `{pid + 1 : pid ∈ args}`: λ_i = Π_{j≠i} x_j / (x_j − x_i) mod q.
pub(crate) fn lagrange_coefficient_at_zero(index: u16, args: &[u16]) -> Result<BigNumber> {
    let q = k256_order();
    let x_i = BigNumber::from((index + 1) as u64);
    let mut num = BigNumber::one();
    let mut den = BigNumber::one();
    for &arg in args {
        if arg == index {
            continue;
        }
        let x_j = BigNumber::from((arg + 1) as u64);
        num = (&num * &x_j).nmod(&q);
        den = (&den * &(&x_j - &x_i).nmod(&q)).nmod(&q);
    }
    let den_inv = den.invert(&q).ok_or_else(|| {
        error!("duplicate evaluation points while interpolating");
        Error::Crypto(CryptoError::NotInvertible)
    })?;
    Ok((&num * &den_inv).nmod(&q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::random_scalar_bn;
    use crate::utils::testing::init_testing;

    #[test]
    fn evaluation_at_zero_is_the_constant_term() {
        let mut rng = init_testing();
        let secret = random_scalar_bn(&mut rng);
        let f = Polynomial::random_with_constant_term(3, secret.clone(), &mut rng).unwrap();
        assert_eq!(f.evaluate(&BigNumber::zero()), secret);
    }

    #[test]
    fn threshold_one_is_a_constant_polynomial() {
        let mut rng = init_testing();
        let secret = random_scalar_bn(&mut rng);
        let f = Polynomial::random_with_constant_term(1, secret.clone(), &mut rng).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.evaluate(&BigNumber::from(17u64)), secret);
    }

    #[test]
    fn threshold_zero_is_rejected() {
        let mut rng = init_testing();
        assert!(Polynomial::random_with_constant_term(0, BigNumber::one(), &mut rng).is_err());
    }

    #[test]
    fn lagrange_reconstructs_the_constant_term() {
        let mut rng = init_testing();
        let q = k256_order();
        let secret = random_scalar_bn(&mut rng);
        let f = Polynomial::random_with_constant_term(3, secret.clone(), &mut rng).unwrap();

        // Any 3 of the 5 parties reconstruct f(0).
        for args in [[0u16, 1, 2], [1, 3, 4], [0, 2, 4]] {
            let mut sum = BigNumber::zero();
            for &pid in &args {
                let share = f.evaluate(&BigNumber::from((pid + 1) as u64));
                let lambda = lagrange_coefficient_at_zero(pid, &args).unwrap();
                sum = (&sum + &(&lambda * &share)).nmod(&q);
            }
            assert_eq!(sum, secret);
        }
    }

    #[test]
    fn shares_are_evaluations_at_pid_plus_one() {
        // Pin the 1-indexing: party 0's share must not be f(0).
        let mut rng = init_testing();
        let secret = random_scalar_bn(&mut rng);
        let f = Polynomial::random_with_constant_term(2, secret.clone(), &mut rng).unwrap();
        let share_of_party_zero = f.evaluate(&BigNumber::from(1u64));
        assert_ne!(share_of_party_zero, secret);
    }
}
