//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::LinkError;
use crate::frame::Frame;

/// Backend of a [`crate::LinkContext`]
///
/// Ranks passed in are already validated by the context.
pub trait Transport: Send {
    fn send_frame(&mut self, dst: usize, frame: Frame) -> Result<(), LinkError>;

    fn recv_frame(&mut self, src: usize, timeout: Duration) -> Result<Frame, LinkError>;

    /// Flushes and releases every endpoint, peers see a disconnect once
    /// they drained what was sent
    fn close(&mut self);
}

/// Data payload traffic of one context
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}
