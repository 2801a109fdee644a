//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! TCP backend
//!
//! Every rank listens on its own address and dials every peer, so each
//! ordered pair of ranks gets its own connection: written by the dialer,
//! read by the acceptor. Sockets are driven by a private tokio runtime, the
//! public API stays blocking.

use std::collections::HashMap;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::codec::LengthDelimitedCodec;

use crate::descriptor::LinkDescriptor;
use crate::error::LinkError;
use crate::frame::Frame;
use crate::frame::Hello;
use crate::transport::Transport;

const MAX_FRAME_LENGTH: usize = 1 << 31;

type Sink = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;
type Source = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type Inbox = mpsc::UnboundedReceiver<Result<Frame, LinkError>>;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub struct NetTransport {
    rank: usize,
    runtime: Runtime,
    sinks: Vec<Option<Sink>>,
    inbox: Vec<Option<Inbox>>,
    readers: Vec<JoinHandle<()>>,
}

impl NetTransport {
    pub fn connect(desc: &LinkDescriptor, rank: usize) -> Result<NetTransport, LinkError> {
        let world_size = desc.world_size();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(format!("link-{}-{}", desc.session_id, rank))
            .enable_all()
            .build()?;

        let addr = desc.parties[rank].address.clone();
        let listener = runtime
            .block_on(TcpListener::bind(addr.as_str()))
            .map_err(|source| LinkError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("rank {} listening on {}", rank, addr);

        let accept = runtime.spawn(accept_peers(
            listener,
            desc.session_id.clone(),
            rank,
            world_size,
        ));

        let mut sinks: Vec<Option<Sink>> = (0..world_size).map(|_| None).collect();
        for peer in desc.parties.iter().filter(|p| p.rank != rank) {
            let stream = dial(desc, &peer.address)?;
            let mut sink = {
                let _guard = runtime.enter();
                let (_, write_half) = TcpStream::from_std(stream)?.into_split();
                FramedWrite::new(write_half, codec())
            };
            let hello = Hello {
                session_id: desc.session_id.clone(),
                rank,
            }
            .encode()?;
            runtime
                .block_on(sink.send(hello))
                .map_err(|e| LinkError::Handshake(format!("hello to {}: {}", peer.address, e)))?;
            debug!("rank {} connected to rank {} at {}", rank, peer.rank, peer.address);
            sinks[peer.rank] = Some(sink);
        }

        let wait = desc.options.recv_timeout();
        let sources = runtime
            .block_on(async move { tokio::time::timeout(wait, accept).await })
            .map_err(|_| {
                LinkError::Handshake(format!(
                    "rank {} did not hear from every peer within {} ms",
                    rank, desc.options.recv_timeout_ms
                ))
            })?
            .map_err(|e| LinkError::Handshake(format!("accept task failed: {}", e)))??;

        let mut inbox: Vec<Option<Inbox>> = (0..world_size).map(|_| None).collect();
        let mut readers = Vec::with_capacity(sources.len());
        for (peer, source) in sources {
            let (tx, rx) = mpsc::unbounded_channel();
            readers.push(runtime.spawn(pump(peer, source, tx)));
            inbox[peer] = Some(rx);
        }
        info!("rank {} linked with {} peers", rank, world_size - 1);

        Ok(NetTransport {
            rank,
            runtime,
            sinks,
            inbox,
            readers,
        })
    }
}

/// Blocking dial with exponential backoff
fn dial(desc: &LinkDescriptor, addr: &str) -> Result<std::net::TcpStream, LinkError> {
    let mut attempt: u64 = 0;
    retry::retry(desc.options.backoff(), || {
        attempt += 1;
        if attempt > 1 {
            debug!("connecting to {} [retry: {}]", addr, attempt - 1);
        }
        std::net::TcpStream::connect(addr)
    })
    .map_err(|e| LinkError::Connect {
        addr: String::from(addr),
        attempts: e.tries,
        source: e.error,
    })
    .and_then(|stream| {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    })
}

/// Accepts one connection from every peer and checks its hello
async fn accept_peers(
    listener: TcpListener,
    session_id: String,
    rank: usize,
    world_size: usize,
) -> Result<HashMap<usize, Source>, LinkError> {
    let mut sources = HashMap::new();
    while sources.len() + 1 < world_size {
        let (stream, remote) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let (read_half, _) = stream.into_split();
        let mut source = FramedRead::new(read_half, codec());
        let hello = match source.next().await {
            Some(Ok(buf)) => Hello::decode(&buf)?,
            Some(Err(e)) => return Err(LinkError::Handshake(format!("from {}: {}", remote, e))),
            None => {
                return Err(LinkError::Handshake(format!(
                    "{} closed before hello",
                    remote
                )))
            }
        };
        if hello.session_id != session_id {
            return Err(LinkError::Handshake(format!(
                "{} belongs to session {}, expected {}",
                remote, hello.session_id, session_id
            )));
        }
        if hello.rank >= world_size || hello.rank == rank || sources.contains_key(&hello.rank) {
            return Err(LinkError::Handshake(format!(
                "{} claims unexpected rank {}",
                remote, hello.rank
            )));
        }
        debug!("rank {} accepted rank {} from {}", rank, hello.rank, remote);
        sources.insert(hello.rank, source);
    }
    Ok(sources)
}

/// Forwards decoded frames of one peer until its connection ends
async fn pump(
    peer: usize,
    mut source: Source,
    tx: mpsc::UnboundedSender<Result<Frame, LinkError>>,
) {
    loop {
        let next = match source.next().await {
            Some(Ok(buf)) => Frame::decode(peer, buf.freeze()),
            Some(Err(e)) => {
                debug!("read from rank {} failed: {}", peer, e);
                Err(LinkError::Disconnected { rank: peer })
            }
            None => Err(LinkError::Disconnected { rank: peer }),
        };
        let done = next.is_err();
        if tx.send(next).is_err() || done {
            break;
        }
    }
}

impl Transport for NetTransport {
    fn send_frame(&mut self, dst: usize, frame: Frame) -> Result<(), LinkError> {
        let sink = self.sinks[dst].as_mut().ok_or(LinkError::Stopped)?;
        self.runtime.block_on(sink.send(frame.encode())).map_err(|e| {
            debug!("write to rank {} failed: {}", dst, e);
            LinkError::Disconnected { rank: dst }
        })
    }

    fn recv_frame(&mut self, src: usize, timeout: Duration) -> Result<Frame, LinkError> {
        let rx = self.inbox[src].as_mut().ok_or(LinkError::Stopped)?;
        match self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, rx.recv()).await })
        {
            Ok(Some(frame)) => frame,
            Ok(None) => Err(LinkError::Disconnected { rank: src }),
            Err(_) => Err(LinkError::Timeout {
                rank: src,
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    fn close(&mut self) {
        for (peer, slot) in self.sinks.iter_mut().enumerate() {
            if let Some(mut sink) = slot.take() {
                if let Err(e) = self.runtime.block_on(sink.close()) {
                    debug!("closing link to rank {}: {}", peer, e);
                }
            }
        }
        self.inbox.iter_mut().for_each(|rx| *rx = None);
        self.readers.drain(..).for_each(|h| h.abort());
        debug!("rank {} closed its sockets", self.rank);
    }
}
