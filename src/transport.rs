//! Point-to-point byte transport between committee members.
//!
//! The sync engine only needs an ordered, reliable carrier of opaque
//! payloads with per-peer blocking reads. Tests use an in-memory channel
//! mesh; the signing binary uses a TCP mesh that dials per message and
//! routes incoming frames to per-sender inboxes by the leading sender tag,
//! mirroring the original server design.

use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// An ordered, reliable point-to-point message carrier.
///
/// `send` and `recv` may be called concurrently from multiple threads for
/// distinct peers; that is how the sync engine fans out a round.
pub trait Transport: Send + Sync {
    /// Deliver `payload` to party `to`.
    fn send(&self, to: u16, payload: &[u8]) -> Result<()>;

    /// Block until one payload from party `from` arrives, up to `timeout`.
    fn recv(&self, from: u16, timeout: Duration) -> Result<Vec<u8>>;

    /// Tear down all connections. Subsequent and in-flight calls fail.
    fn shutdown(&self);
}

/// In-memory full mesh for tests: one mpsc channel per ordered pair.
pub struct LocalTransport {
    pid: u16,
    senders: Vec<Option<Sender<Vec<u8>>>>,
    inboxes: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
    down: AtomicBool,
}

impl LocalTransport {
    /// Build a connected mesh of `n` local transports, one per party.
    pub fn mesh(n: u16) -> Vec<LocalTransport> {
        let n = n as usize;
        // channels[from][to]
        let mut txs: Vec<Vec<Option<Sender<Vec<u8>>>>> = (0..n)
            .map(|_| (0..n).map(|_| None).collect())
            .collect();
        let mut rxs: Vec<Vec<Option<Mutex<Receiver<Vec<u8>>>>>> = (0..n)
            .map(|_| (0..n).map(|_| None).collect())
            .collect();
        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                let (tx, rx) = channel();
                txs[from][to] = Some(tx);
                // Party `to` reads messages from `from` out of rxs[to][from].
                rxs[to][from] = Some(Mutex::new(rx));
            }
        }
        txs.into_iter()
            .zip(rxs)
            .enumerate()
            .map(|(pid, (senders, inboxes))| LocalTransport {
                pid: pid as u16,
                senders,
                inboxes,
                down: AtomicBool::new(false),
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn send(&self, to: u16, payload: &[u8]) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!(
                "transport of party {} is shut down",
                self.pid
            )));
        }
        let sender = self
            .senders
            .get(to as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| Error::Transport(format!("no connection to party {to}")))?;
        sender
            .send(payload.to_vec())
            .map_err(|_| Error::Transport(format!("party {to} hung up")))
    }

    fn recv(&self, from: u16, timeout: Duration) -> Result<Vec<u8>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!(
                "transport of party {} is shut down",
                self.pid
            )));
        }
        let inbox = self
            .inboxes
            .get(from as usize)
            .and_then(|r| r.as_ref())
            .ok_or_else(|| Error::Transport(format!("no connection to party {from}")))?;
        let inbox = inbox
            .lock()
            .map_err(|_| Error::Transport("poisoned inbox lock".into()))?;
        match inbox.recv_timeout(timeout) {
            Ok(payload) => Ok(payload),
            Err(RecvTimeoutError::Timeout) => Err(Error::Transport(format!(
                "timed out waiting for party {from}"
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Transport(format!("party {from} hung up")))
            }
        }
    }

    fn shutdown(&self) {
        self.down.store(true, Ordering::SeqCst);
    }
}

/// How long the TCP acceptor sleeps between polls for new connections.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// TCP mesh: a polling acceptor thread routes each incoming frame to a
/// per-sender inbox; sends dial a fresh connection per message.
pub struct TcpTransport {
    pid: u16,
    addresses: Vec<String>,
    inboxes: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
    io_timeout: Duration,
    quit: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Bind `addresses[pid]` and start the acceptor. `io_timeout` bounds
    /// dials, reads, and writes; the round duration is the natural choice.
    pub fn start(pid: u16, addresses: Vec<String>, io_timeout: Duration) -> Result<Self> {
        let n = addresses.len();
        let listener = TcpListener::bind(&addresses[pid as usize]).map_err(|e| {
            Error::Transport(format!("cannot bind {}: {e}", addresses[pid as usize]))
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::Transport(format!("cannot configure listener: {e}")))?;

        let mut txs: HashMap<u16, Sender<Vec<u8>>> = HashMap::new();
        let mut inboxes: Vec<Option<Mutex<Receiver<Vec<u8>>>>> = (0..n).map(|_| None).collect();
        for peer in 0..n as u16 {
            if peer == pid {
                continue;
            }
            let (tx, rx) = channel();
            txs.insert(peer, tx);
            inboxes[peer as usize] = Some(Mutex::new(rx));
        }

        let quit = Arc::new(AtomicBool::new(false));
        let acceptor_quit = Arc::clone(&quit);
        std::thread::spawn(move || {
            accept_loop(listener, txs, io_timeout, acceptor_quit);
        });

        Ok(Self {
            pid,
            addresses,
            inboxes,
            io_timeout,
            quit,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    txs: HashMap<u16, Sender<Vec<u8>>>,
    io_timeout: Duration,
    quit: Arc<AtomicBool>,
) {
    loop {
        if quit.load(Ordering::SeqCst) {
            debug!("acceptor shutting down");
            return;
        }
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(e) = handle_connection(stream, &txs, io_timeout) {
                    warn!("dropping malformed connection: {e}");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                error!("accept failed: {e}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Read one length-prefixed frame and route it by its leading sender tag.
fn handle_connection(
    mut stream: TcpStream,
    txs: &HashMap<u16, Sender<Vec<u8>>>,
    io_timeout: Duration,
) -> Result<()> {
    stream
        .set_read_timeout(Some(io_timeout))
        .map_err(|e| Error::Transport(format!("cannot set read timeout: {e}")))?;
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .map_err(|e| Error::Transport(format!("short frame header: {e}")))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .map_err(|e| Error::Transport(format!("short frame body: {e}")))?;
    if payload.len() < 2 {
        return Err(Error::Transport("frame too short for a sender tag".into()));
    }
    let sender = u16::from_le_bytes([payload[0], payload[1]]);
    let tx = txs
        .get(&sender)
        .ok_or_else(|| Error::Transport(format!("frame from unknown party {sender}")))?;
    tx.send(payload)
        .map_err(|_| Error::Transport("inbox closed".into()))
}

impl Transport for TcpTransport {
    fn send(&self, to: u16, payload: &[u8]) -> Result<()> {
        if self.quit.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!(
                "transport of party {} is shut down",
                self.pid
            )));
        }
        let address = self
            .addresses
            .get(to as usize)
            .ok_or_else(|| Error::Transport(format!("no address for party {to}")))?;
        let addr = address
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("cannot resolve {address}: {e}")))?
            .next()
            .ok_or_else(|| Error::Transport(format!("cannot resolve {address}")))?;
        let mut stream = TcpStream::connect_timeout(&addr, self.io_timeout)
            .map_err(|e| Error::Transport(format!("cannot dial party {to} at {address}: {e}")))?;
        stream
            .set_write_timeout(Some(self.io_timeout))
            .map_err(|e| Error::Transport(format!("cannot set write timeout: {e}")))?;
        stream
            .write_all(&(payload.len() as u32).to_be_bytes())
            .and_then(|_| stream.write_all(payload))
            .and_then(|_| stream.flush())
            .map_err(|e| Error::Transport(format!("write to party {to} failed: {e}")))
    }

    fn recv(&self, from: u16, timeout: Duration) -> Result<Vec<u8>> {
        let inbox = self
            .inboxes
            .get(from as usize)
            .and_then(|r| r.as_ref())
            .ok_or_else(|| Error::Transport(format!("no connection to party {from}")))?;
        let inbox = inbox
            .lock()
            .map_err(|_| Error::Transport("poisoned inbox lock".into()))?;
        match inbox.recv_timeout(timeout) {
            Ok(payload) => Ok(payload),
            Err(RecvTimeoutError::Timeout) => Err(Error::Transport(format!(
                "timed out waiting for party {from}"
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Transport(format!("party {from} hung up")))
            }
        }
    }

    fn shutdown(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mesh_delivers_in_order() {
        let mesh = LocalTransport::mesh(2);
        mesh[0].send(1, b"first").unwrap();
        mesh[0].send(1, b"second").unwrap();
        assert_eq!(mesh[1].recv(0, Duration::from_millis(100)).unwrap(), b"first");
        assert_eq!(mesh[1].recv(0, Duration::from_millis(100)).unwrap(), b"second");
    }

    #[test]
    fn local_recv_times_out() {
        let mesh = LocalTransport::mesh(2);
        assert!(mesh[1].recv(0, Duration::from_millis(20)).is_err());
    }

    #[test]
    fn local_shutdown_fails_ops() {
        let mesh = LocalTransport::mesh(2);
        mesh[0].shutdown();
        assert!(mesh[0].send(1, b"x").is_err());
        assert!(mesh[0].recv(1, Duration::from_millis(10)).is_err());
    }

    #[test]
    fn tcp_mesh_routes_by_sender_tag() {
        let addresses = vec!["127.0.0.1:29871".to_string(), "127.0.0.1:29872".to_string()];
        let t0 = TcpTransport::start(0, addresses.clone(), Duration::from_secs(2)).unwrap();
        let t1 = TcpTransport::start(1, addresses, Duration::from_secs(2)).unwrap();

        let mut frame = 0u16.to_le_bytes().to_vec();
        frame.extend_from_slice(b"hello");
        t0.send(1, &frame).unwrap();
        let got = t1.recv(0, Duration::from_secs(2)).unwrap();
        assert_eq!(got, frame);

        t0.shutdown();
        t1.shutdown();
    }
}
