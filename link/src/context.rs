//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use crate::descriptor::LinkDescriptor;
use crate::error::LinkError;
use crate::frame::Frame;
use crate::mem::MemTransport;
use crate::net::NetTransport;
use crate::transport::LinkStats;
use crate::transport::Transport;

/// Live handle of one rank in a session
///
/// Created once per party, can serve several sequential protocol runs and
/// is released by `stop` or on drop.
pub struct LinkContext {
    desc: LinkDescriptor,
    rank: usize,
    transport: Option<Box<dyn Transport>>,
    stats: LinkStats,
    aborted: bool,
}

impl LinkContext {
    /// In-process backend, all ranks of the session must live in this process
    pub fn create_mem(desc: &LinkDescriptor, rank: usize) -> Result<LinkContext, LinkError> {
        desc.validate(rank)?;
        let transport = MemTransport::claim(&desc.session_id, desc.world_size(), rank)?;
        Ok(LinkContext::with_transport(desc, rank, Box::new(transport)))
    }

    /// TCP backend, blocks until every peer is connected
    pub fn create_net(desc: &LinkDescriptor, rank: usize) -> Result<LinkContext, LinkError> {
        desc.validate(rank)?;
        if let Some(p) = desc.parties.iter().find(|p| p.address.is_empty()) {
            return Err(LinkError::Config(format!("party {} has no address", p.id)));
        }
        let transport = NetTransport::connect(desc, rank)?;
        Ok(LinkContext::with_transport(desc, rank, Box::new(transport)))
    }

    fn with_transport(desc: &LinkDescriptor, rank: usize, transport: Box<dyn Transport>) -> Self {
        LinkContext {
            desc: desc.clone(),
            rank,
            transport: Some(transport),
            stats: LinkStats::default(),
            aborted: false,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.desc.world_size()
    }

    pub fn session_id(&self) -> &str {
        &self.desc.session_id
    }

    pub fn descriptor(&self) -> &LinkDescriptor {
        &self.desc
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.transport.is_none()
    }

    fn check_peer(&self, peer: usize) -> Result<(), LinkError> {
        if peer >= self.world_size() || peer == self.rank {
            return Err(LinkError::Config(format!(
                "rank {} cannot address rank {} in a world of {}",
                self.rank,
                peer,
                self.world_size()
            )));
        }
        Ok(())
    }

    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, LinkError> {
        self.transport.as_mut().ok_or(LinkError::Stopped)
    }

    fn send_frame(&mut self, dst: usize, frame: Frame) -> Result<(), LinkError> {
        self.check_peer(dst)?;
        let data_len = match &frame {
            Frame::Data(d) => Some(d.len() as u64),
            _ => None,
        };
        self.transport()?.send_frame(dst, frame)?;
        if let Some(len) = data_len {
            self.stats.bytes_sent += len;
            self.stats.messages_sent += 1;
        }
        Ok(())
    }

    fn recv_frame(&mut self, src: usize) -> Result<Frame, LinkError> {
        self.check_peer(src)?;
        let timeout = self.desc.options.recv_timeout();
        let frame = self.transport()?.recv_frame(src, timeout)?;
        if let Frame::Data(d) = &frame {
            self.stats.bytes_received += d.len() as u64;
            self.stats.messages_received += 1;
        }
        Ok(frame)
    }

    pub fn send(&mut self, dst: usize, data: Vec<u8>) -> Result<(), LinkError> {
        self.send_frame(dst, Frame::Data(data))
    }

    /// Blocks until the next message of `src` arrives
    pub fn recv(&mut self, src: usize) -> Result<Vec<u8>, LinkError> {
        match self.recv_frame(src)? {
            Frame::Data(d) => Ok(d),
            Frame::Abort(reason) => Err(self.peer_aborted(src, reason)),
            other => Err(LinkError::UnexpectedFrame {
                rank: src,
                expected: "data",
                found: other.kind(),
            }),
        }
    }

    /// Same message to every other rank
    pub fn broadcast(&mut self, data: &[u8]) -> Result<(), LinkError> {
        for dst in self.peers() {
            self.send(dst, data.to_vec())?;
        }
        Ok(())
    }

    /// Returns once every rank reached the barrier
    pub fn barrier(&mut self) -> Result<(), LinkError> {
        let peers = self.peers();
        for &dst in peers.iter() {
            self.send_frame(dst, Frame::Barrier)?;
        }
        for &src in peers.iter() {
            match self.recv_frame(src)? {
                Frame::Barrier => {}
                Frame::Abort(reason) => return Err(self.peer_aborted(src, reason)),
                other => {
                    return Err(LinkError::UnexpectedFrame {
                        rank: src,
                        expected: "barrier",
                        found: other.kind(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Tells every peer this rank gave up, best effort
    pub fn abort(&mut self, reason: &str) {
        warn!("rank {} aborts session {}: {}", self.rank, self.desc.session_id, reason);
        self.aborted = true;
        for dst in self.peers() {
            self.send_abort(dst, reason);
        }
    }

    fn send_abort(&mut self, dst: usize, reason: &str) {
        if let Err(e) = self.send_frame(dst, Frame::Abort(String::from(reason))) {
            debug!("abort not delivered to rank {}: {}", dst, e);
        }
    }

    /// Passes an abort of `src` on to the remaining peers, once per context,
    /// so that ranks blocked on a third party are released as well
    fn peer_aborted(&mut self, src: usize, reason: String) -> LinkError {
        if !self.aborted {
            self.aborted = true;
            warn!("rank {} relays abort of rank {}: {}", self.rank, src, reason);
            let relayed = format!("rank {} aborted: {}", src, reason);
            for dst in self.peers().into_iter().filter(|r| *r != src) {
                self.send_abort(dst, &relayed);
            }
        }
        LinkError::PeerAborted { rank: src, reason }
    }

    /// Releases the backend, later calls are no-ops
    pub fn stop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!(
                "rank {} stopped link of session {}, sent {} bytes, received {} bytes",
                self.rank, self.desc.session_id, self.stats.bytes_sent, self.stats.bytes_received
            );
        }
    }

    pub fn peers(&self) -> Vec<usize> {
        (0..self.world_size()).filter(|r| *r != self.rank).collect()
    }
}

impl Drop for LinkContext {
    fn drop(&mut self) {
        self.stop();
    }
}
