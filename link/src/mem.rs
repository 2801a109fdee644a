//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! In-process backend: one crossbeam queue per ordered pair of ranks
//!
//! Queues live in a process-wide registry keyed by session id until every
//! rank of the session claimed its endpoints. A session whose claimants
//! all closed is replaced by the next claim it cannot serve.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam::channel::unbounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::RecvTimeoutError;
use crossbeam::channel::Sender;

use crate::error::LinkError;
use crate::frame::Frame;
use crate::transport::Transport;

struct MemSession {
    world_size: usize,
    endpoints: Vec<Option<MemTransport>>,
    holders: Arc<()>,
}

impl MemSession {
    fn new(world_size: usize) -> MemSession {
        let mut endpoints = (0..world_size)
            .map(|rank| MemTransport {
                rank,
                senders: (0..world_size).map(|_| None).collect(),
                receivers: (0..world_size).map(|_| None).collect(),
                holder: None,
            })
            .collect::<Vec<_>>();
        for src in 0..world_size {
            for dst in 0..world_size {
                if src != dst {
                    let (s, r) = unbounded();
                    endpoints[src].senders[dst] = Some(s);
                    endpoints[dst].receivers[src] = Some(r);
                }
            }
        }
        MemSession {
            world_size,
            endpoints: endpoints.into_iter().map(Some).collect(),
            holders: Arc::new(()),
        }
    }

    fn serves(&self, world_size: usize, rank: usize) -> bool {
        self.world_size == world_size && self.endpoints.get(rank).map_or(false, |e| e.is_some())
    }

    /// Partly claimed and every claimant is gone
    fn is_abandoned(&self) -> bool {
        self.endpoints.iter().any(|e| e.is_none()) && Arc::strong_count(&self.holders) == 1
    }
}

lazy_static! {
    static ref SESSIONS: Mutex<HashMap<String, MemSession>> = Mutex::new(HashMap::new());
}

pub struct MemTransport {
    rank: usize,
    senders: Vec<Option<Sender<Frame>>>,
    receivers: Vec<Option<Receiver<Frame>>>,
    holder: Option<Arc<()>>,
}

impl MemTransport {
    /// Hands out the endpoints of `rank`, each rank can claim them once
    pub fn claim(session_id: &str, world_size: usize, rank: usize) -> Result<MemTransport, LinkError> {
        let mut sessions = SESSIONS.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stale) = sessions.get(session_id) {
            if !stale.serves(world_size, rank) && stale.is_abandoned() {
                debug!("mem session {} was abandoned, starting over", session_id);
                sessions.remove(session_id);
            }
        }
        let session = sessions
            .entry(String::from(session_id))
            .or_insert_with(|| MemSession::new(world_size));
        if session.world_size != world_size {
            return Err(LinkError::Config(format!(
                "session {} has {} parties, not {}",
                session_id, session.world_size, world_size
            )));
        }
        let mut transport = session.endpoints[rank].take().ok_or_else(|| {
            LinkError::Config(format!(
                "rank {} of session {} is already taken",
                rank, session_id
            ))
        })?;
        transport.holder = Some(session.holders.clone());
        if session.endpoints.iter().all(|e| e.is_none()) {
            sessions.remove(session_id);
            debug!("mem session {} fully claimed", session_id);
        }
        Ok(transport)
    }
}

impl Transport for MemTransport {
    fn send_frame(&mut self, dst: usize, frame: Frame) -> Result<(), LinkError> {
        let sender = self.senders[dst].as_ref().ok_or(LinkError::Stopped)?;
        sender
            .send(frame)
            .map_err(|_| LinkError::Disconnected { rank: dst })
    }

    fn recv_frame(&mut self, src: usize, timeout: Duration) -> Result<Frame, LinkError> {
        let receiver = self.receivers[src].as_ref().ok_or(LinkError::Stopped)?;
        receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => LinkError::Timeout {
                rank: src,
                millis: timeout.as_millis() as u64,
            },
            RecvTimeoutError::Disconnected => LinkError::Disconnected { rank: src },
        })
    }

    fn close(&mut self) {
        trace!("rank {} closes mem endpoints", self.rank);
        self.senders.iter_mut().for_each(|s| *s = None);
        self.receivers.iter_mut().for_each(|r| *r = None);
        self.holder = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_once() {
        let a = MemTransport::claim("mem-claim-once", 2, 0).unwrap();
        assert!(matches!(
            MemTransport::claim("mem-claim-once", 2, 0),
            Err(LinkError::Config(_))
        ));
        assert!(matches!(
            MemTransport::claim("mem-claim-once", 3, 1),
            Err(LinkError::Config(_))
        ));
        let b = MemTransport::claim("mem-claim-once", 2, 1).unwrap();
        drop((a, b));

        // fully claimed sessions are forgotten, the id can be reused
        assert!(MemTransport::claim("mem-claim-once", 2, 0).is_ok());
    }

    #[test]
    fn test_abandoned_session_is_replaced() {
        let mut a = MemTransport::claim("mem-abandoned", 2, 0).unwrap();
        assert!(matches!(
            MemTransport::claim("mem-abandoned", 3, 0),
            Err(LinkError::Config(_))
        ));
        a.close();
        let parties = (0..3)
            .map(|rank| MemTransport::claim("mem-abandoned", 3, rank))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(parties.len(), 3);

        let b = MemTransport::claim("mem-abandoned-2", 2, 1).unwrap();
        drop(b);
        assert!(MemTransport::claim("mem-abandoned-2", 2, 1).is_ok());
    }

    #[test]
    fn test_late_claim_sees_closed_peer() {
        let mut a = MemTransport::claim("mem-late", 2, 0).unwrap();
        a.send_frame(1, Frame::Abort(String::from("gone"))).unwrap();
        a.close();
        let mut b = MemTransport::claim("mem-late", 2, 1).unwrap();
        assert!(matches!(
            b.recv_frame(0, Duration::from_millis(50)),
            Ok(Frame::Abort(_))
        ));
        assert!(matches!(
            b.recv_frame(0, Duration::from_millis(50)),
            Err(LinkError::Disconnected { rank: 0 })
        ));
    }

    #[test]
    fn test_fifo_and_disconnect() {
        let mut a = MemTransport::claim("mem-fifo", 2, 0).unwrap();
        let mut b = MemTransport::claim("mem-fifo", 2, 1).unwrap();
        let t = Duration::from_millis(100);

        a.send_frame(1, Frame::Data(vec![1])).unwrap();
        a.send_frame(1, Frame::Data(vec![2])).unwrap();
        a.close();
        assert_eq!(b.recv_frame(0, t).unwrap(), Frame::Data(vec![1]));
        assert_eq!(b.recv_frame(0, t).unwrap(), Frame::Data(vec![2]));
        assert!(matches!(
            b.recv_frame(0, t),
            Err(LinkError::Disconnected { rank: 0 })
        ));
        assert!(matches!(
            a.send_frame(1, Frame::Barrier),
            Err(LinkError::Stopped)
        ));
    }

    #[test]
    fn test_timeout() {
        let _a = MemTransport::claim("mem-timeout", 2, 0).unwrap();
        let mut b = MemTransport::claim("mem-timeout", 2, 1).unwrap();
        assert!(matches!(
            b.recv_frame(0, Duration::from_millis(10)),
            Err(LinkError::Timeout { rank: 0, millis: 10 })
        ));
    }
}
