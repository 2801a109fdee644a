//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Protocol messages on top of the link
//!
//! Every message is a bincode encoded [`Envelope`]; the receiver states which
//! bucket and step it expects and anything else is a protocol error.

use crypto::prelude::ByteBuffer;
use crypto::prelude::TPayload;
use link::LinkContext;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PsiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Params,
    EcdhMask,
    EcdhRemask,
    EcdhFinal,
    KkrtSetup,
    KkrtBaseOt,
    KkrtColumns,
    KkrtOutputs,
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub bucket: u64,
    pub step: Step,
    pub payload: TPayload,
}

pub fn send_payload(
    ctx: &mut LinkContext,
    dst: usize,
    bucket: usize,
    step: Step,
    payload: TPayload,
) -> Result<(), PsiError> {
    let envelope = Envelope {
        bucket: bucket as u64,
        step,
        payload,
    };
    let bytes = bincode::serialize(&envelope)?;
    trace!(
        "rank {} -> {}: bucket {} {:?}, {} items, {} bytes",
        ctx.rank(),
        dst,
        bucket,
        step,
        envelope.payload.len(),
        bytes.len()
    );
    ctx.send(dst, bytes)?;
    Ok(())
}

pub fn recv_payload(
    ctx: &mut LinkContext,
    src: usize,
    bucket: usize,
    step: Step,
) -> Result<TPayload, PsiError> {
    let bytes = ctx.recv(src)?;
    let envelope: Envelope = bincode::deserialize(&bytes)?;
    if envelope.bucket != bucket as u64 || envelope.step != step {
        return Err(PsiError::Protocol(format!(
            "rank {} expected bucket {} {:?} from rank {}, got bucket {} {:?}",
            ctx.rank(),
            bucket,
            step,
            src,
            envelope.bucket,
            envelope.step
        )));
    }
    Ok(envelope.payload)
}

/// Receives a payload that must hold exactly `n` items
pub fn recv_exact(
    ctx: &mut LinkContext,
    src: usize,
    bucket: usize,
    step: Step,
    n: usize,
) -> Result<TPayload, PsiError> {
    let payload = recv_payload(ctx, src, bucket, step)?;
    if payload.len() != n {
        return Err(PsiError::Protocol(format!(
            "bucket {} {:?} from rank {}: expected {} items, got {}",
            bucket,
            step,
            src,
            n,
            payload.len()
        )));
    }
    Ok(payload)
}

pub fn u64_to_buffer(v: u64) -> ByteBuffer {
    ByteBuffer::from_slice(&v.to_le_bytes())
}

pub fn buffer_to_u64(b: &ByteBuffer) -> Result<u64, PsiError> {
    let mut bytes = [0u8; 8];
    if b.len() != bytes.len() {
        return Err(PsiError::Protocol(format!(
            "expected an 8 byte integer, got {} bytes",
            b.len()
        )));
    }
    bytes.copy_from_slice(&b.buffer);
    Ok(u64::from_le_bytes(bytes))
}

pub fn strings_to_payload(items: &[String]) -> TPayload {
    items
        .iter()
        .map(|s| ByteBuffer::from_slice(s.as_bytes()))
        .collect()
}

pub fn payload_to_strings(payload: TPayload) -> Result<Vec<String>, PsiError> {
    payload
        .into_iter()
        .map(|b| {
            String::from_utf8(b.buffer)
                .map_err(|e| PsiError::Protocol(format!("identity is not utf-8: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use link::LinkDescriptor;

    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(buffer_to_u64(&u64_to_buffer(1 << 40)).unwrap(), 1 << 40);
        assert!(buffer_to_u64(&ByteBuffer::from_slice(&[1, 2])).is_err());
    }

    #[test]
    fn test_mismatched_step_is_an_error() {
        let desc = LinkDescriptor::new("wire-mismatch")
            .add_party("a", "")
            .add_party("b", "");
        let d = desc.clone();
        let h = thread::spawn(move || {
            let mut ctx = LinkContext::create_mem(&d, 1).unwrap();
            send_payload(&mut ctx, 0, 3, Step::EcdhMask, vec![u64_to_buffer(1)]).unwrap();
            send_payload(&mut ctx, 0, 3, Step::EcdhMask, vec![]).unwrap();
            send_payload(&mut ctx, 0, 4, Step::EcdhRemask, vec![]).unwrap();
        });
        let mut ctx = LinkContext::create_mem(&desc, 0).unwrap();
        assert_eq!(
            recv_payload(&mut ctx, 1, 3, Step::EcdhMask).unwrap(),
            vec![u64_to_buffer(1)]
        );
        assert!(matches!(
            recv_exact(&mut ctx, 1, 3, Step::EcdhMask, 2),
            Err(PsiError::Protocol(_))
        ));
        assert!(matches!(
            recv_payload(&mut ctx, 1, 3, Step::EcdhRemask),
            Err(PsiError::Protocol(_))
        ));
        h.join().unwrap();
    }
}
