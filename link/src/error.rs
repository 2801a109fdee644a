//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid link configuration: {0}")]
    Config(String),
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("malformed frame from peer {rank}: {reason}")]
    InvalidFrame { rank: usize, reason: String },
    #[error("peer {rank} disconnected")]
    Disconnected { rank: usize },
    #[error("no message from peer {rank} after {millis} ms")]
    Timeout { rank: usize, millis: u64 },
    #[error("peer {rank} aborted: {reason}")]
    PeerAborted { rank: usize, reason: String },
    #[error("unexpected frame from peer {rank}: expected {expected}, got {found}")]
    UnexpectedFrame {
        rank: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("link is stopped")]
    Stopped,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
