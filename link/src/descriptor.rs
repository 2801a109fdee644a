//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::LinkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub rank: usize,
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkOptions {
    /// Dial attempts per peer before giving up
    pub connect_retries: usize,
    /// First backoff delay, doubled after each failed attempt
    pub retry_base_ms: u64,
    /// Bound on every blocking receive
    pub recv_timeout_ms: u64,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            connect_retries: 8,
            retry_base_ms: 100,
            recv_timeout_ms: 120_000,
        }
    }
}

impl LinkOptions {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Delays between dial attempts: `base, 2 * base, 4 * base, ...`
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        let base = self.retry_base_ms;
        (0..self.connect_retries.saturating_sub(1))
            .map(move |i| Duration::from_millis(base.saturating_mul(1u64 << i.min(16))))
    }
}

/// Who takes part in a session and where they listen
///
/// Ranks are the positions of the parties, so they are dense and start at 0.
///
/// ```
/// use link::LinkDescriptor;
///
/// let desc = LinkDescriptor::new("session-1")
///     .add_party("alice", "127.0.0.1:10001")
///     .add_party("bob", "127.0.0.1:10002");
/// assert_eq!(desc.world_size(), 2);
/// assert_eq!(desc.parties[1].rank, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub session_id: String,
    pub parties: Vec<Party>,
    #[serde(default)]
    pub options: LinkOptions,
}

impl LinkDescriptor {
    pub fn new(session_id: &str) -> LinkDescriptor {
        LinkDescriptor {
            session_id: String::from(session_id),
            parties: Vec::new(),
            options: LinkOptions::default(),
        }
    }

    pub fn add_party(mut self, id: &str, address: &str) -> LinkDescriptor {
        let rank = self.parties.len();
        self.parties.push(Party {
            rank,
            id: String::from(id),
            address: String::from(address),
        });
        self
    }

    pub fn with_options(mut self, options: LinkOptions) -> LinkDescriptor {
        self.options = options;
        self
    }

    pub fn world_size(&self) -> usize {
        self.parties.len()
    }

    pub(crate) fn validate(&self, rank: usize) -> Result<(), LinkError> {
        if self.session_id.is_empty() {
            return Err(LinkError::Config(String::from("empty session id")));
        }
        if self.parties.is_empty() {
            return Err(LinkError::Config(String::from("no parties")));
        }
        if rank >= self.parties.len() {
            return Err(LinkError::Config(format!(
                "rank {} out of range for {} parties",
                rank,
                self.parties.len()
            )));
        }
        if let Some(p) = self
            .parties
            .iter()
            .enumerate()
            .find(|(i, p)| p.rank != *i)
            .map(|(_, p)| p)
        {
            return Err(LinkError::Config(format!(
                "party {} has rank {} out of position",
                p.id, p.rank
            )));
        }
        if self.options.connect_retries == 0 {
            return Err(LinkError::Config(String::from(
                "connect_retries must be at least 1",
            )));
        }
        Ok(())
    }
}
