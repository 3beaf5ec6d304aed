//! Committee and member key files.
//!
//! The committee file (`keys_addrs`) holds one whitespace-separated record
//! per party in pid order: `base64(paillier N) "|" host:port`. The member
//! file (`<pid>.pk`) holds `base64(private key TLV)` and the party's pid.
//! Any parse failure is fatal.

use crate::{
    errors::{Error, Result},
    paillier::{DecryptionKey, EncryptionKey},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use libpaillier::unknown_order::BigNumber;
use std::path::Path;

/// The public view of the whole committee.
#[derive(Debug, Clone)]
pub struct Committee {
    pub paillier_pks: Vec<EncryptionKey>,
    pub addresses: Vec<String>,
}

impl Committee {
    /// Number of parties.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Parse a committee file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot read committee file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&contents)
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let mut paillier_pks = Vec::new();
        let mut addresses = Vec::new();
        for record in contents.split_whitespace() {
            let (pk, address) = parse_committee_record(record)?;
            paillier_pks.push(pk);
            addresses.push(address);
        }
        if addresses.len() < 2 {
            return Err(Error::Config(
                "the protocol needs at least 2 parties".into(),
            ));
        }
        Ok(Self {
            paillier_pks,
            addresses,
        })
    }
}

fn parse_committee_record(record: &str) -> Result<(EncryptionKey, String)> {
    let (pk_part, address) = record
        .split_once('|')
        .ok_or_else(|| Error::Config("committee record should be paillierKey|address".into()))?;
    if pk_part.is_empty() {
        return Err(Error::Config("empty paillier key".into()));
    }
    if address.is_empty() {
        return Err(Error::Config("empty address".into()));
    }
    if address.split(':').count() < 2 {
        return Err(Error::Config(format!("malformed address {address}")));
    }
    let modulus_bytes = BASE64
        .decode(pk_part)
        .map_err(|e| Error::Config(format!("malformed paillier key: {e}")))?;
    let modulus = BigNumber::from_slice(modulus_bytes);
    Ok((EncryptionKey::from_modulus(&modulus), address.to_string()))
}

/// This party's private configuration.
pub struct Member {
    pub pid: u16,
    pub paillier_sk: DecryptionKey,
}

impl Member {
    /// Parse a member file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot read member file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&contents)
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let mut words = contents.split_whitespace();
        let key_part = words
            .next()
            .ok_or_else(|| Error::Config("empty member file".into()))?;
        let pid_part = words
            .next()
            .ok_or_else(|| Error::Config("pid missing from member file".into()))?;

        let key_bytes = BASE64
            .decode(key_part)
            .map_err(|e| Error::Config(format!("malformed private key: {e}")))?;
        let paillier_sk = DecryptionKey::try_from_bytes(&key_bytes)?;
        let pid = pid_part
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("malformed pid: {e}")))?;
        Ok(Self { pid, paillier_sk })
    }

    /// Serialize to the member-file format.
    pub fn to_file_contents(&self) -> String {
        format!("{} {}\n", BASE64.encode(self.paillier_sk.to_bytes()), self.pid)
    }
}

/// Serialize one committee record for the given key and address.
pub fn committee_record(pk: &EncryptionKey, address: &str) -> String {
    format!("{}|{}", BASE64.encode(pk.modulus().to_bytes()), address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::prime_gen;

    #[test]
    fn committee_file_round_trips() {
        let sk0 = prime_gen::decryption_key_from_pool_insecure().unwrap();
        let sk1 = prime_gen::decryption_key_from_pool_insecure().unwrap();
        let contents = format!(
            "{}\n{}\n",
            committee_record(&sk0.encryption_key(), "127.0.0.1:10000"),
            committee_record(&sk1.encryption_key(), "127.0.0.1:10001"),
        );
        let committee = Committee::parse(&contents).unwrap();
        assert_eq!(committee.len(), 2);
        assert_eq!(committee.addresses[1], "127.0.0.1:10001");
        assert_eq!(
            committee.paillier_pks[0].modulus(),
            sk0.encryption_key().modulus()
        );
    }

    #[test]
    fn member_file_round_trips() {
        let sk = prime_gen::decryption_key_from_pool_insecure().unwrap();
        let member = Member {
            pid: 3,
            paillier_sk: sk,
        };
        let parsed = Member::parse(&member.to_file_contents()).unwrap();
        assert_eq!(parsed.pid, 3);
        assert_eq!(parsed.paillier_sk.modulus(), member.paillier_sk.modulus());
    }

    #[test]
    fn one_party_committee_is_rejected() {
        let sk = prime_gen::decryption_key_from_pool_insecure().unwrap();
        let contents = committee_record(&sk.encryption_key(), "127.0.0.1:10000");
        assert!(Committee::parse(&contents).is_err());
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(Committee::parse("no-separator-here").is_err());
        assert!(Committee::parse("|127.0.0.1:1").is_err());
        assert!(Committee::parse("AAAA|").is_err());
        assert!(Committee::parse("AAAA|no-port").is_err());
        assert!(Committee::parse("not!!base64|127.0.0.1:1\nAAAA|127.0.0.1:2").is_err());
        assert!(Member::parse("").is_err());
        assert!(Member::parse("AAAA").is_err());
    }
}
