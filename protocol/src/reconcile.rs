//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use link::LinkContext;

use crate::bucket::Bucket;
use crate::bucket::Record;
use crate::error::PsiError;
use crate::wire::payload_to_strings;
use crate::wire::recv_payload;
use crate::wire::send_payload;
use crate::wire::strings_to_payload;
use crate::wire::Step;

/// Who ends up holding the matched records of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// The leader sends the matched identities to every other rank
    Broadcast { leader: usize },
    /// Only this rank learns anything
    To { receiver: usize },
}

impl Reveal {
    pub fn new(broadcast: bool, leader: usize) -> Reveal {
        if broadcast {
            Reveal::Broadcast { leader }
        } else {
            Reveal::To { receiver: leader }
        }
    }
}

fn select(records: Vec<Record>, matched: &[usize]) -> Result<Vec<Record>, PsiError> {
    let mut slots = records.into_iter().map(Some).collect::<Vec<_>>();
    let n = slots.len();
    matched
        .iter()
        .map(|&i| {
            slots
                .get_mut(i)
                .and_then(Option::take)
                .ok_or_else(|| PsiError::Protocol(format!("match {} outside a bucket of {}", i, n)))
        })
        .collect()
}

/// Turns the leader's matched indices of a bucket into this rank's records
pub fn reconcile(
    ctx: &mut LinkContext,
    reveal: Reveal,
    bucket: Bucket,
    matched: &[usize],
) -> Result<Vec<Record>, PsiError> {
    let me = ctx.rank();
    match reveal {
        Reveal::Broadcast { leader } if me == leader => {
            let records = select(bucket.records, matched)?;
            let keys = records.iter().map(|r| r.key.clone()).collect::<Vec<_>>();
            for dst in ctx.peers() {
                send_payload(ctx, dst, bucket.index, Step::Reconcile, strings_to_payload(&keys))?;
            }
            Ok(records)
        }
        Reveal::Broadcast { leader } => {
            let keys = payload_to_strings(recv_payload(ctx, leader, bucket.index, Step::Reconcile)?)?
                .into_iter()
                .collect::<HashSet<_>>();
            Ok(bucket
                .records
                .into_iter()
                .filter(|r| keys.contains(&r.key))
                .collect())
        }
        Reveal::To { receiver } if me == receiver => select(bucket.records, matched),
        Reveal::To { .. } => Ok(vec![]),
    }
}
