//! The synchronous round runner.

use super::RoundError;
use crate::{
    errors::{Error, Result},
    transport::Transport,
    utils::ParseBytes,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, instrument, trace};

/// Minimum gap enforced between two consecutive rounds, so rounds cannot
/// interleave when no explicit synchronization token separates them.
const MIN_ROUND_GAP: Duration = Duration::from_millis(1);

/// What a party contributes to one round.
pub enum RoundPayload {
    /// The same payload goes to every peer.
    Broadcast(Vec<u8>),
    /// One payload per recipient, indexed by pid; the own slot is ignored.
    PerPeer(Vec<Vec<u8>>),
}

struct RoundState {
    round_id: i64,
    prev_round_end: Option<Instant>,
}

/// Synchronous round engine for a fixed committee of `n_proc` parties.
///
/// All parties share the wall-clock `start_time` and the `round_duration`
/// Δ; round k spans `[start_time + kΔ, start_time + (k+1)Δ]`. A round
/// broadcasts the local payload, collects exactly one tagged payload from
/// every peer, and runs a caller-supplied validator over each. Any missing
/// or invalid peer is fatal: the engine never retries.
pub struct SyncServer {
    pid: u16,
    n_proc: u16,
    start_time: SystemTime,
    round_duration: Duration,
    net: Arc<dyn Transport>,
    state: Mutex<RoundState>,
}

impl SyncServer {
    pub fn new(
        pid: u16,
        n_proc: u16,
        start_time: SystemTime,
        round_duration: Duration,
        net: Arc<dyn Transport>,
    ) -> Self {
        Self {
            pid,
            n_proc,
            start_time,
            round_duration,
            net,
            state: Mutex::new(RoundState {
                round_id: -1,
                prev_round_end: None,
            }),
        }
    }

    /// The party driving this server.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Committee size.
    pub fn n_proc(&self) -> u16 {
        self.n_proc
    }

    /// Tear down the underlying transport; in-flight rounds fail.
    pub fn stop(&self) {
        self.net.shutdown();
    }

    /// Run one synchronous round.
    ///
    /// Sends `to_send` to every peer and collects one payload from each,
    /// both under the round deadline, then feeds every received payload to
    /// `check(sender, payload)`. Returns `Ok(())` only if every peer
    /// delivered a payload that passed validation.
    #[instrument(skip_all, fields(pid = self.pid))]
    pub fn round<F>(&self, to_send: &RoundPayload, mut check: F) -> Result<()>
    where
        F: FnMut(u16, &[u8]) -> Result<()>,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Transport("poisoned round state".into()))?;
        state.round_id += 1;
        let round_id = state.round_id;

        if round_id == 0 {
            match self.start_time.duration_since(SystemTime::now()) {
                Ok(wait) => std::thread::sleep(wait),
                Err(e) => {
                    return Err(RoundError::wrap(format!(
                        "the start time has passed {:?} ago",
                        e.duration()
                    ))
                    .into());
                }
            }
        } else if let Some(prev) = state.prev_round_end {
            // Keep consecutive rounds from interleaving.
            let since = prev.elapsed();
            if since < MIN_ROUND_GAP {
                std::thread::sleep(MIN_ROUND_GAP - since);
            }
        }

        trace!("starting round {round_id}");
        let result = self.run_round(round_id, to_send, &mut check);
        state.prev_round_end = Some(Instant::now());
        result
    }

    fn run_round(
        &self,
        round_id: i64,
        to_send: &RoundPayload,
        check: &mut dyn FnMut(u16, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let end_round = Instant::now() + self.round_duration;
        let n = self.n_proc as usize;

        let mut send_errors: Vec<Option<Error>> = (0..n).map(|_| None).collect();
        let mut received: Vec<std::result::Result<Vec<u8>, String>> =
            (0..n).map(|_| Err(String::new())).collect();

        // Fan out: one sender and one receiver task per peer, joined at the
        // end of the scope.
        std::thread::scope(|scope| {
            for (peer, slot) in send_errors.iter_mut().enumerate() {
                let peer = peer as u16;
                if peer == self.pid {
                    continue;
                }
                let payload = match to_send {
                    RoundPayload::Broadcast(data) => data.as_slice(),
                    RoundPayload::PerPeer(per_peer) => per_peer[peer as usize].as_slice(),
                };
                scope.spawn(move || {
                    let frame = self.frame(round_id, payload);
                    if let Err(e) = self.net.send(peer, &frame) {
                        *slot = Some(e);
                    }
                });
            }
            for (peer, slot) in received.iter_mut().enumerate() {
                let peer = peer as u16;
                if peer == self.pid {
                    continue;
                }
                scope.spawn(move || {
                    *slot = self.receive_one(peer, round_id, end_round);
                });
            }
        });

        let mut missing = Vec::new();
        let mut recv_msgs = String::new();
        for (peer, result) in received.iter().enumerate() {
            if peer == self.pid as usize {
                continue;
            }
            if let Err(msg) = result {
                missing.push(peer as u16);
                recv_msgs.push_str(&format!("[receive] pid: {peer}, error: {msg}\n"));
            }
        }
        if !missing.is_empty() {
            return Err(RoundError::new(
                format!("rid:{round_id}: missing data from some parties\n{recv_msgs}"),
                missing,
            )
            .into());
        }

        let mut send_msgs = String::new();
        for (peer, error) in send_errors.iter().enumerate() {
            if let Some(e) = error {
                send_msgs.push_str(&format!("[send] pid: {peer}, error: {e}\n"));
            }
        }
        if !send_msgs.is_empty() {
            return Err(RoundError::wrap(format!("rid:{round_id}: {send_msgs}")).into());
        }

        let mut wrong = Vec::new();
        let mut check_msgs = String::new();
        for (peer, result) in received.iter().enumerate() {
            let peer = peer as u16;
            if peer == self.pid {
                continue;
            }
            if let Ok(data) = result {
                if let Err(e) = check(peer, data) {
                    wrong.push(peer);
                    check_msgs.push_str(&format!("[verify] pid: {peer}, error: {e}\n"));
                }
            }
        }
        if !wrong.is_empty() {
            return Err(RoundError::wrap(format!(
                "rid:{round_id}: data sent by parties {wrong:?} is wrong:\n{check_msgs}"
            ))
            .into());
        }

        if Instant::now() > end_round {
            return Err(
                RoundError::wrap(format!("rid:{round_id}: receiving took too long")).into(),
            );
        }

        debug!("round {round_id} completed");
        Ok(())
    }

    /// Frame a payload as `u16 senderPid ‖ u64 roundId ‖ payload`.
    fn frame(&self, round_id: i64, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(10 + payload.len());
        frame.extend_from_slice(&self.pid.to_le_bytes());
        frame.extend_from_slice(&(round_id as u64).to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Receive and validate one frame from `peer` for `round_id`.
    fn receive_one(
        &self,
        peer: u16,
        round_id: i64,
        end_round: Instant,
    ) -> std::result::Result<Vec<u8>, String> {
        let timeout = end_round.saturating_duration_since(Instant::now());
        let frame = self
            .net
            .recv(peer, timeout)
            .map_err(|e| format!("rid:{round_id}: {e}"))?;
        if frame.len() < 10 {
            return Err(format!("rid:{round_id}: received too short data"));
        }
        let mut parser = ParseBytes::new(frame);
        let sender = parser
            .take_u16_le()
            .map_err(|_| format!("rid:{round_id}: unreadable sender tag"))? as u16;
        if sender != peer {
            return Err(format!(
                "sender tag {sender} does not match the connection from pid:{peer}"
            ));
        }
        let frame_round = parser
            .take_u64_le()
            .map_err(|_| format!("rid:{round_id}: unreadable round id"))?;
        if frame_round != round_id as u64 {
            return Err(format!(
                "received data for wrong round from pid:{peer}. Expected {round_id}, got {frame_round}"
            ));
        }
        parser
            .take_rest()
            .map(|rest| rest.to_vec())
            .map_err(|_| format!("rid:{round_id}: unreadable payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    fn servers(n: u16, round_duration: Duration) -> Vec<Arc<SyncServer>> {
        let start = SystemTime::now() + Duration::from_millis(50);
        LocalTransport::mesh(n)
            .into_iter()
            .enumerate()
            .map(|(pid, net)| {
                Arc::new(SyncServer::new(
                    pid as u16,
                    n,
                    start,
                    round_duration,
                    Arc::new(net),
                ))
            })
            .collect()
    }

    #[test]
    fn broadcast_round_delivers_every_payload() {
        let servers = servers(3, Duration::from_secs(5));
        let handles: Vec<_> = servers
            .iter()
            .map(|server| {
                let server = Arc::clone(server);
                std::thread::spawn(move || {
                    let mine = vec![server.pid() as u8; 4];
                    let mut seen = Vec::new();
                    server
                        .round(&RoundPayload::Broadcast(mine), |from, data| {
                            assert_eq!(data, vec![from as u8; 4]);
                            seen.push(from);
                            Ok(())
                        })
                        .unwrap();
                    seen.sort_unstable();
                    seen
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0], vec![1, 2]);
        assert_eq!(results[1], vec![0, 2]);
        assert_eq!(results[2], vec![0, 1]);
    }

    #[test]
    fn per_peer_round_delivers_distinct_payloads() {
        let servers = servers(3, Duration::from_secs(5));
        let handles: Vec<_> = servers
            .iter()
            .map(|server| {
                let server = Arc::clone(server);
                std::thread::spawn(move || {
                    let pid = server.pid();
                    let to_send: Vec<Vec<u8>> =
                        (0..3).map(|to| vec![pid as u8, to as u8]).collect();
                    server
                        .round(&RoundPayload::PerPeer(to_send), |from, data| {
                            assert_eq!(data, &[from as u8, pid as u8]);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn missing_peer_is_reported() {
        let servers = servers(2, Duration::from_millis(300));
        // Party 1 never participates.
        let err = servers[0]
            .round(&RoundPayload::Broadcast(b"hello".to_vec()), |_, _| Ok(()))
            .unwrap_err();
        match err {
            Error::Round(round_error) => assert_eq!(round_error.missing(), &[1]),
            other => panic!("expected a round error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_round_id_is_rejected() {
        let start = SystemTime::now() + Duration::from_millis(20);
        let mut mesh = LocalTransport::mesh(2).into_iter();
        let net0 = mesh.next().unwrap();
        let net1 = mesh.next().unwrap();
        let server = SyncServer::new(0, 2, start, Duration::from_millis(300), Arc::new(net0));

        // Party 1 sends a frame stamped with a future round id.
        let mut frame = 1u16.to_le_bytes().to_vec();
        frame.extend_from_slice(&7u64.to_le_bytes());
        frame.extend_from_slice(b"payload");
        Transport::send(&net1, 0, &frame).unwrap();

        let err = server
            .round(&RoundPayload::Broadcast(b"x".to_vec()), |_, _| Ok(()))
            .unwrap_err();
        match err {
            Error::Round(round_error) => assert_eq!(round_error.missing(), &[1]),
            other => panic!("expected a round error, got {other:?}"),
        }
    }

    #[test]
    fn failed_verification_is_fatal() {
        let servers = servers(2, Duration::from_secs(2));
        let handles: Vec<_> = servers
            .iter()
            .map(|server| {
                let server = Arc::clone(server);
                std::thread::spawn(move || {
                    server.round(&RoundPayload::Broadcast(b"data".to_vec()), |_, _| {
                        Err(Error::Protocol("rejected".into()))
                    })
                })
            })
            .collect();
        for handle in handles {
            let result = handle.join().unwrap();
            match result {
                Err(Error::Round(round_error)) => assert!(round_error.missing().is_empty()),
                other => panic!("expected a round error, got {other:?}"),
            }
        }
    }

    #[test]
    fn start_time_in_the_past_fails() {
        let net = LocalTransport::mesh(1).pop().unwrap();
        let server = SyncServer::new(
            0,
            1,
            SystemTime::now() - Duration::from_secs(10),
            Duration::from_millis(100),
            Arc::new(net),
        );
        assert!(server
            .round(&RoundPayload::Broadcast(Vec::new()), |_, _| Ok(()))
            .is_err());
    }
}
