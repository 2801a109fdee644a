//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use serde::Deserialize;
use serde::Serialize;

use crate::error::LinkError;

const TAG_DATA: u8 = 0;
const TAG_BARRIER: u8 = 1;
const TAG_ABORT: u8 = 2;

/// Unit of transfer between two ranks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Vec<u8>),
    Barrier,
    Abort(String),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "data",
            Frame::Barrier => "barrier",
            Frame::Abort(_) => "abort",
        }
    }

    /// Tag byte followed by the payload, the length prefix is added by
    /// the socket codec
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Data(d) => {
                let mut buf = BytesMut::with_capacity(1 + d.len());
                buf.put_u8(TAG_DATA);
                buf.put_slice(d);
                buf.freeze()
            }
            Frame::Barrier => Bytes::from_static(&[TAG_BARRIER]),
            Frame::Abort(reason) => {
                let mut buf = BytesMut::with_capacity(1 + reason.len());
                buf.put_u8(TAG_ABORT);
                buf.put_slice(reason.as_bytes());
                buf.freeze()
            }
        }
    }

    pub fn decode(rank: usize, mut buf: Bytes) -> Result<Frame, LinkError> {
        if !buf.has_remaining() {
            return Err(LinkError::InvalidFrame {
                rank,
                reason: String::from("empty frame"),
            });
        }
        match buf.get_u8() {
            TAG_DATA => Ok(Frame::Data(buf.to_vec())),
            TAG_BARRIER if buf.is_empty() => Ok(Frame::Barrier),
            TAG_ABORT => Ok(Frame::Abort(String::from_utf8_lossy(&buf).into_owned())),
            tag => Err(LinkError::InvalidFrame {
                rank,
                reason: format!("unknown tag {} with {} bytes", tag, buf.len()),
            }),
        }
    }
}

/// First frame on every socket, identifies the dialing rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub session_id: String,
    pub rank: usize,
}

impl Hello {
    pub fn encode(&self) -> Result<Bytes, LinkError> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| LinkError::Handshake(format!("cannot encode hello: {}", e)))
    }

    pub fn decode(buf: &[u8]) -> Result<Hello, LinkError> {
        bincode::deserialize(buf)
            .map_err(|e| LinkError::Handshake(format!("cannot decode hello: {}", e)))
    }
}
