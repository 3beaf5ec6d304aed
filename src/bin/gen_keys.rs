//! Generates key and address files for a committee of the given size:
//! one `<pid>.pk` member file per party and a shared `keys_addrs` file.
//! Intended for local and cloud test runs of the `tecdsa` binary.

use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::io::Write;
use threshold_ecdsa::config::{committee_record, Member};
use threshold_ecdsa::paillier::DecryptionKey;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Committee size.
    number: u16,

    /// Optional file with one host:port per line; defaults to
    /// 127.0.0.1:10000 + pid.
    addresses_file: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.number < 2 {
        bail!("cannot have less than 2 processes");
    }

    let addresses: Vec<String> = match &cli.addresses_file {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("cannot open file {path}"))?;
            let lines: Vec<String> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if lines.len() < cli.number as usize {
                bail!(
                    "addresses file has {} entries, need {}",
                    lines.len(),
                    cli.number
                );
            }
            lines.into_iter().take(cli.number as usize).collect()
        }
        None => (0..cli.number)
            .map(|pid| format!("127.0.0.1:{}", 10000 + pid as u32))
            .collect(),
    };

    let mut keys = Vec::with_capacity(cli.number as usize);
    for pid in 0..cli.number {
        eprintln!("generating Paillier key for party {pid}...");
        keys.push(DecryptionKey::generate()?);
    }

    for (pid, key) in keys.iter().enumerate() {
        let member = Member {
            pid: pid as u16,
            paillier_sk: key.clone(),
        };
        fs::write(format!("{pid}.pk"), member.to_file_contents())
            .with_context(|| format!("cannot write {pid}.pk"))?;
    }

    let mut committee = fs::File::create("keys_addrs").context("cannot create keys_addrs")?;
    for (key, address) in keys.iter().zip(&addresses) {
        writeln!(
            committee,
            "{}",
            committee_record(&key.encryption_key(), address)
        )?;
    }
    Ok(())
}
