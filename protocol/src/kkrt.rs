//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Two party PSI from the batched OPRF
//!
//! The leader cuckoo-hashes its set and learns one OPRF value per bin; the
//! peer evaluates the OPRF on each of its items at all of its 3 candidate
//! bins and sends the values shuffled per hash function.
//!
//! ```text
//!  leader                                     peer
//!    KkrtSetup   [hash key, nbins, S]   ->
//!                                       <-   KkrtBaseOt  [peer count, R_0..R_511]
//!    KkrtColumns [u_0..u_511]           ->
//!                                       <-   KkrtOutputs [F(h=0).., F(h=1).., F(h=2)..]
//! ```

use std::collections::HashSet;

use common::permutations::shuffle;
use common::timer;
use crypto::cuckoo::bin;
use crypto::cuckoo::item_digests;
use crypto::cuckoo::CuckooTable;
use crypto::cuckoo::HashKey;
use crypto::cuckoo::NHASHES;
use crypto::oprf::encode;
use crypto::oprf::mask_size;
use crypto::oprf::Codeword;
use crypto::oprf::KkrtReceiver;
use crypto::oprf::KkrtSender;
use crypto::oprf::CODE_BYTES;
use crypto::ot::bytes_to_bits;
use crypto::ot::BaseOtReceiver;
use crypto::ot::BaseOtSender;
use crypto::ot::BASE_OT_COUNT;
use crypto::prelude::*;
use link::LinkContext;
use rand::Rng;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;

use crate::error::PsiError;
use crate::traits::BucketProtocol;
use crate::wire::buffer_to_u64;
use crate::wire::recv_exact;
use crate::wire::send_payload;
use crate::wire::u64_to_buffer;
use crate::wire::Step;

/// Bound on table sizes and item counts announced by the other side
const MAX_BINS: u64 = 1 << 32;

pub struct KkrtTwoParty {
    leader: usize,
}

impl KkrtTwoParty {
    pub fn new(leader: usize) -> KkrtTwoParty {
        KkrtTwoParty { leader }
    }
}

fn as_bytes(items: &[String]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn run_receiver(
    ctx: &mut LinkContext,
    peer: usize,
    bucket: usize,
    items: &[String],
) -> Result<Vec<usize>, PsiError> {
    let mut t = timer::Timer::new_silent(&format!("kkrt-2pc leader, bucket {}", bucket));
    let mut rng = rand::thread_rng();
    let inputs = as_bytes(items);
    let (key, table) = CuckooTable::build(&inputs, &mut rng)?;
    let digests = item_digests(&key, &inputs);
    let nbins = table.nbins();
    t.qps("cuckoo table", inputs.len());

    let ot = BaseOtSender::new();
    let setup = vec![
        ByteBuffer::from_slice(&key),
        u64_to_buffer(nbins as u64),
        ot.first_message(),
    ];
    send_payload(ctx, peer, bucket, Step::KkrtSetup, setup)?;

    let reply = recv_exact(ctx, peer, bucket, Step::KkrtBaseOt, 1 + BASE_OT_COUNT)?;
    let peer_count = buffer_to_u64(&reply[0])?;
    if peer_count > MAX_BINS {
        return Err(PsiError::Protocol(format!("invalid peer item count {}", peer_count)));
    }
    let peer_count = peer_count as usize;
    let seeds = ot.derive_seeds(&reply[1..])?;
    t.qps("base ot", BASE_OT_COUNT);

    let codes = table
        .items()
        .iter()
        .map(|slot| match slot {
            Some(item) => encode(&digests[item.input_index], item.hash_index),
            None => {
                let mut code: Codeword = [0u8; CODE_BYTES];
                rng.fill(&mut code[..]);
                code
            }
        })
        .collect::<Vec<_>>();
    let (receiver, columns) = KkrtReceiver::extend(&seeds, &codes)?;
    send_payload(ctx, peer, bucket, Step::KkrtColumns, columns)?;
    t.qps("extension", nbins);

    let masksize = mask_size(nbins, peer_count);
    let outputs = receiver.outputs(masksize);
    let theirs = recv_exact(
        ctx,
        peer,
        bucket,
        Step::KkrtOutputs,
        NHASHES * peer_count,
    )?;
    if let Some((index, b)) = theirs.iter().enumerate().find(|(_, b)| b.len() != masksize) {
        return Err(CryptoError::InvalidLength {
            index,
            expected: masksize,
            found: b.len(),
        }
        .into());
    }
    let per_hash = (0..NHASHES)
        .map(|h| {
            theirs[h * peer_count..(h + 1) * peer_count]
                .iter()
                .map(|b| b.buffer.as_slice())
                .collect::<HashSet<_>>()
        })
        .collect::<Vec<_>>();

    let mut matched = table
        .items()
        .iter()
        .zip(outputs.iter())
        .filter_map(|(slot, out)| match slot {
            Some(item) if per_hash[item.hash_index].contains(out.buffer.as_slice()) => {
                Some(item.input_index)
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    matched.sort_unstable();
    t.qps("intersection", matched.len());
    Ok(matched)
}

fn run_sender(
    ctx: &mut LinkContext,
    leader: usize,
    bucket: usize,
    items: &[String],
) -> Result<(), PsiError> {
    let mut t = timer::Timer::new_silent(&format!("kkrt-2pc peer, bucket {}", bucket));
    let setup = recv_exact(ctx, leader, bucket, Step::KkrtSetup, 3)?;
    let mut key: HashKey = [0u8; 16];
    if setup[0].len() != key.len() {
        return Err(PsiError::Protocol(format!(
            "hash key of {} bytes, expected {}",
            setup[0].len(),
            key.len()
        )));
    }
    key.copy_from_slice(&setup[0].buffer);
    let nbins = buffer_to_u64(&setup[1])?;
    if nbins == 0 || nbins > MAX_BINS {
        return Err(PsiError::Protocol(format!("invalid bin count {}", nbins)));
    }
    let nbins = nbins as usize;

    let mut s: Codeword = [0u8; CODE_BYTES];
    rand::thread_rng().fill(&mut s[..]);
    let (responses, seeds) = BaseOtReceiver::respond(&setup[2], &bytes_to_bits(&s))?;
    let mut reply = Vec::with_capacity(1 + BASE_OT_COUNT);
    reply.push(u64_to_buffer(items.len() as u64));
    reply.extend(responses);
    send_payload(ctx, leader, bucket, Step::KkrtBaseOt, reply)?;
    t.qps("base ot", BASE_OT_COUNT);

    let columns = recv_exact(ctx, leader, bucket, Step::KkrtColumns, BASE_OT_COUNT)?;
    let sender = KkrtSender::new(s, &seeds, &columns, nbins)?;
    t.qps("extension", nbins);

    let masksize = mask_size(nbins, items.len());
    let digests = item_digests(&key, &as_bytes(items));
    let mut outputs = Vec::with_capacity(NHASHES * digests.len());
    for h in 0..NHASHES {
        let values = digests
            .par_iter()
            .map(|d| sender.evaluate(bin(d, h, nbins), &encode(d, h), masksize))
            .collect::<Vec<_>>();
        outputs.extend(shuffle(values));
    }
    t.qps("oprf outputs", outputs.len());
    send_payload(ctx, leader, bucket, Step::KkrtOutputs, outputs)?;
    Ok(())
}

impl BucketProtocol for KkrtTwoParty {
    fn name(&self) -> &'static str {
        "kkrt-2pc"
    }

    fn run_bucket(
        &mut self,
        ctx: &mut LinkContext,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError> {
        if ctx.rank() == self.leader {
            run_receiver(ctx, 1 - self.leader, bucket, items)
        } else {
            run_sender(ctx, self.leader, bucket, items)?;
            Ok(vec![])
        }
    }
}
