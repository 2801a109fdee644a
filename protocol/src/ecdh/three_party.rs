//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use common::permutations::shuffle;
use common::timer;
use crypto::eccipher::gen_scalar;
use crypto::eccipher::ECCipher;
use crypto::prelude::*;
use link::LinkContext;
use zeroize::Zeroizing;

use super::matched_indices;
use super::ECRistretto;
use crate::error::PsiError;
use crate::traits::BucketProtocol;
use crate::wire::recv_exact;
use crate::wire::recv_payload;
use crate::wire::send_payload;
use crate::wire::Step;

const WORLD: usize = 3;

/// Three party masking PSI over a ring of ranks `r -> r + 1 (mod 3)`
///
/// Every set travels twice around the ring, picking up one key per hop, so
/// after two rounds rank `r` holds the fully masked set of rank `r + 1`.
/// Both non-leaders then hand their fully masked set to the leader, which
/// also computed one itself. The leader's own set is never shuffled, the
/// other two are shuffled before leaving their owner.
pub struct EcdhThreeParty {
    key: Zeroizing<Scalar>,
    ec_cipher: ECRistretto,
    leader: usize,
}

impl EcdhThreeParty {
    pub fn new(leader: usize) -> EcdhThreeParty {
        EcdhThreeParty {
            key: Zeroizing::new(gen_scalar()),
            ec_cipher: ECRistretto::default(),
            leader,
        }
    }
}

impl BucketProtocol for EcdhThreeParty {
    fn name(&self) -> &'static str {
        "ecdh-3pc"
    }

    fn run_bucket(
        &mut self,
        ctx: &mut LinkContext,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError> {
        let me = ctx.rank();
        let succ = (me + 1) % WORLD;
        let pred = (me + WORLD - 1) % WORLD;
        let mut t = timer::Timer::new_silent(&format!("ecdh-3pc rank {}, bucket {}", me, bucket));

        let own = self.ec_cipher.hash_encrypt_to_bytes(items, &self.key);
        let own = if me == self.leader { own } else { shuffle(own) };
        t.qps("mask own", own.len());
        send_payload(ctx, succ, bucket, Step::EcdhMask, own)?;

        let once = recv_payload(ctx, pred, bucket, Step::EcdhMask)?;
        let twice = self.ec_cipher.reencrypt_to_bytes(&once, &self.key)?;
        t.qps("remask", twice.len());
        send_payload(ctx, succ, bucket, Step::EcdhRemask, twice)?;

        let twice = recv_payload(ctx, pred, bucket, Step::EcdhRemask)?;
        let full = self.ec_cipher.reencrypt_to_bytes(&twice, &self.key)?;
        t.qps("final mask", full.len());

        if me != self.leader {
            send_payload(ctx, self.leader, bucket, Step::EcdhFinal, full)?;
            return Ok(vec![]);
        }

        let next = (self.leader + 1) % WORLD;
        let last = (self.leader + 2) % WORLD;
        // `last` completed the leader's set, `next` the set of `last`
        let ours = recv_exact(ctx, last, bucket, Step::EcdhFinal, items.len())?;
        let of_last = recv_payload(ctx, next, bucket, Step::EcdhFinal)?;
        let matched = matched_indices(&ours, &[&full, &of_last]);
        t.qps("intersection", matched.len());
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::run_parties;
    use crate::testing::strings;

    #[test]
    fn test_leader_learns_the_three_way_intersection() {
        let inputs = vec![
            strings(&["a", "b", "c", "d", "e", "f"]),
            strings(&["f", "c", "a", "z"]),
            strings(&["a", "b", "f", "y", "x"]),
        ];
        for leader in 0..3 {
            let expected = inputs[leader]
                .iter()
                .enumerate()
                .filter(|(_, s)| ["a", "f"].contains(&s.as_str()))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            let out = run_parties(&format!("ecdh3-{}", leader), inputs.clone(), move |ctx, items| {
                EcdhThreeParty::new(leader).run_bucket(ctx, 7, &items)
            });
            for (rank, res) in out.iter().enumerate() {
                if rank == leader {
                    assert_eq!(res.as_ref().unwrap(), &expected);
                } else {
                    assert!(res.as_ref().unwrap().is_empty());
                }
            }
        }
    }

    #[test]
    fn test_disjoint_sets() {
        let inputs = vec![strings(&["a"]), strings(&["b"]), strings(&["a", "b"])];
        let out = run_parties("ecdh3-disjoint", inputs, |ctx, items| {
            EcdhThreeParty::new(0).run_bucket(ctx, 0, &items)
        });
        assert!(out[0].as_ref().unwrap().is_empty());
    }
}
