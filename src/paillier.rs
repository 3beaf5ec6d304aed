// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Paillier encryption, used by the pairwise multiplication-to-additive
//! conversion. Thin wrappers around [`libpaillier`] plus the member-file
//! key codec.

use crate::{
    errors::{CryptoError, Error, Result},
    utils::{isqrt, random_bn_in_z_star, ParseBytes},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::error;

/// Bit length of each Paillier prime generated by `gen_keys`.
const PRIME_BITS: usize = 1024;

/// A Paillier ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext(BigNumber);

impl Ciphertext {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(BigNumber::from_slice(bytes))
    }
}

/// A Paillier public (encryption) key.
#[derive(Debug, Clone)]
pub struct EncryptionKey(libpaillier::EncryptionKey);

impl EncryptionKey {
    /// Reconstruct a key from its modulus `N` (the committee file carries
    /// only the modulus).
    pub fn from_modulus(n: &BigNumber) -> Self {
        Self(libpaillier::EncryptionKey::from_bytes(n.to_bytes()).expect("valid modulus bytes"))
    }

    /// The modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        self.0.n()
    }

    /// Encrypt `x ∈ [0, N)` with a fresh nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<Ciphertext> {
        if x < &BigNumber::zero() || x >= self.modulus() {
            error!("Paillier plaintext out of range");
            return Err(Error::Crypto(CryptoError::PaillierDecrypt));
        }
        let nonce = random_bn_in_z_star(rng, self.modulus())?;
        let (ciphertext, _nonce) = self.0.encrypt(x.to_bytes(), Some(nonce)).ok_or_else(|| {
            error!("Paillier encryption failed");
            Error::Crypto(CryptoError::PaillierDecrypt)
        })?;
        Ok(Ciphertext(ciphertext))
    }

    /// Homomorphic addition of plaintexts.
    pub fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Result<Ciphertext> {
        self.0.add(&c1.0, &c2.0).map(Ciphertext).ok_or_else(|| {
            error!("homomorphic addition failed");
            Error::Crypto(CryptoError::PaillierDecrypt)
        })
    }

    /// Homomorphic multiplication of a plaintext by a known scalar.
    pub fn mul(&self, c: &Ciphertext, scalar: &BigNumber) -> Result<Ciphertext> {
        self.0.mul(&c.0, scalar).map(Ciphertext).ok_or_else(|| {
            error!("homomorphic scalar multiplication failed");
            Error::Crypto(CryptoError::PaillierDecrypt)
        })
    }
}

/// A Paillier private (decryption) key. Retains its primes so the key can
/// be re-encoded to the member-file format.
#[derive(Clone)]
pub struct DecryptionKey {
    p: BigNumber,
    q: BigNumber,
    inner: libpaillier::DecryptionKey,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("modulus bits", &(self.modulus().to_bytes().len() * 8))
            .field("...", &"[redacted]")
            .finish()
    }
}

impl DecryptionKey {
    /// Generate a fresh keypair. Slow: samples two large random primes.
    pub fn generate() -> Result<Self> {
        let p = BigNumber::prime(PRIME_BITS);
        let q = BigNumber::prime(PRIME_BITS);
        Self::from_primes(&p, &q)
    }

    /// Assemble a key from two primes.
    pub fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        if p == q {
            error!("Paillier primes must be distinct");
            return Err(Error::Config("Paillier primes must be distinct".into()));
        }
        let inner = libpaillier::DecryptionKey::with_primes(p, q).ok_or_else(|| {
            error!("failed to assemble a Paillier key from primes");
            Error::Config("invalid Paillier primes".into())
        })?;
        Ok(Self {
            p: p.clone(),
            q: q.clone(),
            inner,
        })
    }

    /// The corresponding public key.
    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey(libpaillier::EncryptionKey::from(&self.inner))
    }

    /// The modulus `N = p·q`.
    pub fn modulus(&self) -> BigNumber {
        &self.p * &self.q
    }

    /// Decrypt a ciphertext to its plaintext in `[0, N)`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        let plaintext = self.inner.decrypt(&c.0).ok_or_else(|| {
            error!("Paillier decryption failed");
            Error::Crypto(CryptoError::PaillierDecrypt)
        })?;
        Ok(BigNumber::from_slice(plaintext))
    }

    fn phi(&self) -> BigNumber {
        let one = BigNumber::one();
        &(&self.p - &one) * &(&self.q - &one)
    }

    fn lambda(&self) -> BigNumber {
        // λ(N) = lcm(p−1, q−1) = φ(N) / gcd(p−1, q−1)
        let one = BigNumber::one();
        let g = (&self.p - &one).gcd(&(&self.q - &one));
        &self.phi() / &g
    }

    /// Encode the key in the member-file TLV format: three 16-bit
    /// little-endian length-prefixed big-endian fields `(N, λ(N), φ(N))`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in [self.modulus(), self.lambda(), self.phi()] {
            let bytes = field.to_bytes();
            out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Decode a key from the member-file TLV format.
    ///
    /// The primes are recovered from `(N, φ)`; the λ field is cross-checked
    /// rather than trusted, so files written by encoders that stuffed `N`
    /// into all three slots are rejected instead of yielding a key that
    /// cannot decrypt.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ParseBytes::new(bytes.to_vec());
        let mut fields = Vec::with_capacity(3);
        for _ in 0..3 {
            let len = parser
                .take_u16_le()
                .map_err(|_| Error::Config("truncated Paillier key encoding".into()))?;
            let field = parser
                .take_bytes(len)
                .map_err(|_| Error::Config("truncated Paillier key encoding".into()))?;
            fields.push(BigNumber::from_slice(field));
        }
        let (n, lambda, phi) = (&fields[0], &fields[1], &fields[2]);

        // N = p·q and φ = (p−1)(q−1) give p+q and thus a quadratic in p.
        let one = BigNumber::one();
        let p_plus_q = &(n - phi) + &one;
        let four = BigNumber::from(4u64);
        let disc = &(&p_plus_q * &p_plus_q) - &(&four * n);
        if disc < BigNumber::zero() {
            error!("Paillier key fields are inconsistent");
            return Err(Error::Config("inconsistent Paillier key fields".into()));
        }
        let d = isqrt(&disc);
        if &(&d * &d) != &disc {
            error!("Paillier key fields are inconsistent");
            return Err(Error::Config("inconsistent Paillier key fields".into()));
        }
        let two = BigNumber::from(2u64);
        let p = &(&p_plus_q + &d) / &two;
        let q = &(&p_plus_q - &d) / &two;
        if &(&p * &q) != n || p <= one || q <= one {
            error!("recovered factors do not multiply to N");
            return Err(Error::Config("inconsistent Paillier key fields".into()));
        }
        let key = Self::from_primes(&p, &q)?;
        if &key.lambda() != lambda {
            error!("λ field does not match the recovered factorization");
            return Err(Error::Config("inconsistent Paillier key fields".into()));
        }
        Ok(key)
    }
}

/// Fixed primes for tests.
///
/// Generating Paillier primes is by far the slowest step of key setup, so
/// tests draw from this pool of precomputed 512-bit primes instead. The
/// pool is public knowledge; never use these keys outside tests.
pub mod prime_gen {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POOL_OF_PRIMES: &[&str] = &[
        "dfb32d3f5cf3ae85851877094acc09f7de35a5bd2eb992870ee492c1aacfdfc62b6eade5752d1ac0805570a9692a15090b834ff6e28391e6a75bb258ff1242b3",
        "b5863285bb1426df88fa6c80e6a092894f0b2e76e8ed9402252b73617451f872e668a5e8748037df1089f1141923d010dde9b35e3db12d9051b835521495c5b1",
        "e7f87c509818a1ef768efab8806a888ad5a8424c5920b21f8d5ab13b1e94b7deb4e80da42c51c84c820fe25e174a721c6ecf688ff4b2ed66bda8aeaa9f33ab65",
        "bb6472ee7685b1f061bd8ab0a373c76d1f8657d26bd3c1de44c669655bfc7b26a2898cd946d343623296fd47c276917f5f8a5546df314cb78f2610c2c661191b",
        "d95ef5d094e6b1a80e31c99c383017c628e9d6c1583d54541f36a7c63f4eb0b3ec551960a2ead5ed71c05d54aae202e7dc7a1bb3694bd70e70dff96a2e068fe1",
        "d15ebb439e75260d8fc8bc94ec5089f593b6de323e4dd2c24a57453f5aca382251bc7a45e1445e220e2ebe9d3c830064bbf90550b9627bc779569006f0d28a4f",
        "a47dd62e3f3de6d3cc19bba1fad8ac41043b449838002fb3d7468c6d1940144d2bfecde0ecce2619835b5573be791579e545331228a8aad3118f75dd005a28e1",
        "ba83346280754ae99a600afbb1c1df877a7d48be72ab7ef9767211959fc9236eb41dc52ad83529f77e5159564bebf738fc7eb51691c86cf3065ad411aeaf311d",
        "e55e32a51481d939d91648d81f66123be3e4bf8aa25b2db31628bbede015ed158359b856611982d02fc969d7aed304dee434ed7aa562e2725dcd9f6a0127d3dd",
        "9e2874091ca3fd552b82b369fcb4567787297c29d50447dbfd5c328fa89f8cb1cfea3d4fbae72e80558a45af09c5fe437e91f0ad51f92d41a828739ced7a76db",
        "91af2e8d0b0ba4396dfcd767a77bc69badf209f8c112bf5a9d10fcfe788e8f15a2554057d5c5ddae4309b31a30a5560eb4d479b264b6be1601b6fd02c9f50edf",
        "bd9985b700b701618084cb676c5339eaf5dfcb781644e2526d2f1270e28e508d71af3584471f9dca74b37913debd3b96c34c3ca3ede6f1ba412110c018e873a1",
        "f75849b4e09a76354d377e1cc87ab0ff609b7bef1800aa15e24868ea78a19808ef66ca5040392920cf160ad49958669d2f3b78c724e78a349fa5ee930ed02a05",
        "a01c343a449cd1a2717cbfe95b595cd1e06f8289cc4b5995f90a155764fc2fb272f59e42bee54e09e3e5a2d02cefbbd1af16e16d51b20f7e7856a0d5746ffdb3",
        "fded923376ebc065b2bb1f6e8f1311273ce0726ffc976c881ea021014b65cca3444485c9944370125eb5c2c11f490c1dac3af3514c89784b3364a54d0f536c9b",
        "d9675d7c933306d2d66c01f126c735773d72bc47c045558283a92612a8890e8e17aa85a8eb7b32c85eeab4cf54dc24d94e27e3c2f0ab85d9f7278b6022c378f3",
        "802830dddce254c47c3623cff63a6eef4a951766bdb79a2d72f74950be8c66d5b56cfde5df0d84b7124b3a44545f332cc843ae20e9d01ff0a81c84819785db95",
        "ed026818ef543b5097e83985c8407ce75799625bd9c5ed3b74b9f79a6820c4bd5026fe6b08b10b1f017ace285ec15d0a978f9f7c0fcb679add718c1ce3e0385d",
        "d2c17cf1485b8c0f24835a8884e7fa63434bbcec5c6941767286a3317b565df3e75128e4a0c34c77d337f24852de915d15830dfa6b5b8b9f64838693faf730c7",
        "819302981239048525e18b5dac0a8a9f85cd9ae194249204d26cfca40fa8247d1fd1578d02cf4209ec1da16b33e8aa09105ab9d3778ed693ff5e04a6df4ef637",
        "c3c11a2a69bdac100b64721117d3911032fc2d84e1ba79d60aca0331344a9c97d0aaa81091fd502486f636947cf0f58a332c008b45f48639cb6e76bb4d8ff7e9",
        "ebecd489b428598ee1cd3ec457434d96ab7939fc869d74f03848373f61d0504878c6d6a8953655a4c255d05883341c5e9c9ac77bfbcf8ec0b4e73d6bdebf4c09",
        "d4298351063c557feb78f2a7f9517997feb5d67dd0352c4d61b81eb50b5e78a18499dc58ce80a87e6a4f4063cb6b9efe68031d6f661099a198cb6db5c238d7ef",
        "e8c274d40b09d1d505ec8f1b87ef357487bb4e45ca1836106ca52f519738f92e13979732ad5556553ddc81042e9a19b8fd893c937585ac51011f5cab64fd61b7",
    ];

    static POOL_CURSOR: AtomicUsize = AtomicUsize::new(0);

    fn decode_hex(s: &str) -> BigNumber {
        let bytes: Vec<u8> = (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("pool primes are valid hex"))
            .collect();
        BigNumber::from_slice(bytes)
    }

    /// Hand out the next prime pair from the pool, round-robin. Insecure by
    /// construction: the pool is published with the source.
    pub fn get_prime_pair_from_pool_insecure() -> (BigNumber, BigNumber) {
        let idx = POOL_CURSOR.fetch_add(2, Ordering::Relaxed);
        let p = decode_hex(POOL_OF_PRIMES[idx % POOL_OF_PRIMES.len()]);
        let q = decode_hex(POOL_OF_PRIMES[(idx + 1) % POOL_OF_PRIMES.len()]);
        (p, q)
    }

    /// A full [`DecryptionKey`] from the insecure pool.
    pub fn decryption_key_from_pool_insecure() -> Result<DecryptionKey> {
        let (p, q) = get_prime_pair_from_pool_insecure();
        DecryptionKey::from_primes(&p, &q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::k256_order;
    use crate::utils::{random_positive_bn, testing::init_testing};

    fn setup() -> DecryptionKey {
        prime_gen::decryption_key_from_pool_insecure().unwrap()
    }

    #[test]
    fn encryption_round_trips() {
        let mut rng = init_testing();
        let dk = setup();
        let pk = dk.encryption_key();
        assert!(
            k256_order() * BigNumber::from(2u64) < pk.modulus().clone(),
            "the Paillier modulus is supposed to be much larger than the k256 order"
        );

        let m = random_positive_bn(&mut rng, &k256_order());
        let c = pk.encrypt(&mut rng, &m).unwrap();
        assert_eq!(dk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn homomorphic_add_and_mul() {
        let mut rng = init_testing();
        let dk = setup();
        let pk = dk.encryption_key();
        let q = k256_order();

        let a = random_positive_bn(&mut rng, &q);
        let b = random_positive_bn(&mut rng, &q);
        let k = random_positive_bn(&mut rng, &q);

        let ca = pk.encrypt(&mut rng, &a).unwrap();
        let cb = pk.encrypt(&mut rng, &b).unwrap();

        let sum = dk.decrypt(&pk.add(&ca, &cb).unwrap()).unwrap();
        assert_eq!(sum, &a + &b);

        let scaled = dk.decrypt(&pk.mul(&ca, &k).unwrap()).unwrap();
        assert_eq!(scaled, (&a * &k).nmod(&pk.modulus().clone()));
    }

    #[test]
    fn out_of_range_plaintext_is_rejected() {
        let mut rng = init_testing();
        let dk = setup();
        let pk = dk.encryption_key();
        let too_big = pk.modulus() + &BigNumber::one();
        assert!(pk.encrypt(&mut rng, &too_big).is_err());
    }

    #[test]
    fn key_codec_round_trips() {
        let dk = setup();
        let decoded = DecryptionKey::try_from_bytes(&dk.to_bytes()).unwrap();
        assert_eq!(decoded.modulus(), dk.modulus());

        let mut rng = init_testing();
        let m = random_positive_bn(&mut rng, &k256_order());
        let c = dk.encryption_key().encrypt(&mut rng, &m).unwrap();
        assert_eq!(decoded.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn legacy_triple_modulus_encoding_is_rejected() {
        // The original generator wrote N into the λ and φ slots as well.
        let dk = setup();
        let n_bytes = dk.modulus().to_bytes();
        let mut bad = Vec::new();
        for _ in 0..3 {
            bad.extend_from_slice(&(n_bytes.len() as u16).to_le_bytes());
            bad.extend_from_slice(&n_bytes);
        }
        assert!(DecryptionKey::try_from_bytes(&bad).is_err());
    }

    #[test]
    fn truncated_encoding_is_rejected() {
        let dk = setup();
        let bytes = dk.to_bytes();
        assert!(DecryptionKey::try_from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
