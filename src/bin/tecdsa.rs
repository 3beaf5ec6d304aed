//! Threshold ECDSA signing binary.
//!
//! Loads the member and committee files, waits for the common start time,
//! then runs Init, the requested number of Presigns, and the same number of
//! Signs over the TCP mesh. Operational logs go to a file; the process
//! prints one error line and exits nonzero on any fatal error.

use anyhow::{bail, Context};
use clap::Parser;
use libpaillier::unknown_order::BigNumber;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use threshold_ecdsa::{
    config::{Committee, Member},
    protocol::Protocol,
    sync::SyncServer,
    transport::TcpTransport,
};
use tracing::info;

const LOG_FILE: &str = "tecdsa.log";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File with this party's private key and process id.
    #[arg(long = "pk")]
    pk: String,

    /// File with the committee's keys and addresses.
    #[arg(long = "keys_addrs")]
    keys_addrs: String,

    /// Time at which to start the protocol (RFC3339, e.g.
    /// 2026-08-02T15:04:05Z).
    #[arg(long = "startTime")]
    start_time: String,

    /// Duration of a round, e.g. "2s" or "500ms".
    #[arg(long = "roundDuration")]
    round_duration: String,

    /// Number of signatures to generate.
    #[arg(long = "sigNumber", default_value_t = 1)]
    sig_number: u32,

    /// Number of parties that must cooperate to sign a message.
    #[arg(long = "threshold", default_value_t = 1)]
    threshold: u16,
}

fn bench<T>(name: &str, total: &mut Duration, job: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = job();
    let elapsed = start.elapsed();
    *total += elapsed;
    info!("job {name} took {elapsed:?}");
    out
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .with_context(|| format!("cannot open {LOG_FILE}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .init();

    let member = Member::from_path(&cli.pk)?;
    let committee = Committee::from_path(&cli.keys_addrs)
        .with_context(|| format!("invalid keys_addrs file {:?}", cli.keys_addrs))?;
    if member.pid as usize >= committee.len() {
        bail!("wrong pid: {}", member.pid);
    }

    let start_time = humantime::parse_rfc3339(&cli.start_time)
        .with_context(|| format!("cannot parse startTime {:?}", cli.start_time))?;
    let round_duration = humantime::parse_duration(&cli.round_duration)
        .with_context(|| format!("cannot parse roundDuration {:?}", cli.round_duration))?;

    let n_proc = committee.len() as u16;
    info!(
        "nProc:{n_proc} sigNumber:{} threshold:{} startTime:{} roundDuration:{:?}",
        cli.sig_number, cli.threshold, cli.start_time, round_duration
    );

    let net = TcpTransport::start(member.pid, committee.addresses.clone(), round_duration)?;
    let server = Arc::new(SyncServer::new(
        member.pid,
        n_proc,
        start_time,
        round_duration,
        Arc::new(net),
    ));
    info!("starting!");

    let mut rng = rand::rngs::OsRng;
    let mut total = Duration::ZERO;
    let mut protocol = bench("tecdsa.init", &mut total, || {
        Protocol::init(
            Arc::clone(&server),
            member.paillier_sk.clone(),
            committee.paillier_pks.clone(),
            &mut rng,
        )
    })?;

    let mut presign_total = Duration::ZERO;
    for i in 0..cli.sig_number {
        bench(
            &format!("generating a presignature; round {i}"),
            &mut presign_total,
            || protocol.presign(cli.threshold, &mut rng),
        )?;
    }
    info!(
        "presignature stats: total = {presign_total:?}, average = {:?}",
        presign_total / cli.sig_number.max(1)
    );

    let mut sign_total = Duration::ZERO;
    for i in 0..cli.sig_number {
        let signature = bench(&format!("signing; round {i}"), &mut sign_total, || {
            protocol.sign(&BigNumber::from(i as u64))
        })?;
        info!("signature {i}: r={} s={}", signature.r, signature.s);
    }
    info!(
        "signing stats: total = {sign_total:?}, average = {:?}",
        sign_total / cli.sig_number.max(1)
    );

    server.stop();
    info!("all done!");
    Ok(())
}
