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

/// Two party masking PSI
///
/// Leader `L` with set `X` and key `a`, peer `P` with set `Y` and key `b`:
///
/// 1. `L -> P: H(X)^a` in input order, `P -> L: shuffle(H(Y)^b)`
/// 2. `P -> L: H(X)^ab` in the order received
/// 3. `L` computes `H(Y)^ba` and keeps the `x` whose `H(x)^ab` is in it
pub struct EcdhTwoParty {
    key: Zeroizing<Scalar>,
    ec_cipher: ECRistretto,
    leader: usize,
}

impl EcdhTwoParty {
    pub fn new(leader: usize) -> EcdhTwoParty {
        EcdhTwoParty {
            key: Zeroizing::new(gen_scalar()),
            ec_cipher: ECRistretto::default(),
            leader,
        }
    }

    fn run_leader(
        &self,
        ctx: &mut LinkContext,
        peer: usize,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError> {
        let mut t = timer::Timer::new_silent(&format!("ecdh-2pc leader, bucket {}", bucket));
        let x_a = self.ec_cipher.hash_encrypt_to_bytes(items, &self.key);
        t.qps("mask own", x_a.len());
        send_payload(ctx, peer, bucket, Step::EcdhMask, x_a)?;

        let y_b = recv_payload(ctx, peer, bucket, Step::EcdhMask)?;
        let x_ab = recv_exact(ctx, peer, bucket, Step::EcdhRemask, items.len())?;
        t.qps("exchange", y_b.len() + x_ab.len());

        let y_ba = self.ec_cipher.reencrypt_to_bytes(&y_b, &self.key)?;
        let matched = matched_indices(&x_ab, &[&y_ba]);
        t.qps("intersection", matched.len());
        Ok(matched)
    }

    fn run_peer(
        &self,
        ctx: &mut LinkContext,
        leader: usize,
        bucket: usize,
        items: &[String],
    ) -> Result<(), PsiError> {
        let mut t = timer::Timer::new_silent(&format!("ecdh-2pc peer, bucket {}", bucket));
        let y_b = shuffle(self.ec_cipher.hash_encrypt_to_bytes(items, &self.key));
        t.qps("mask own", y_b.len());
        send_payload(ctx, leader, bucket, Step::EcdhMask, y_b)?;

        let x_a = recv_payload(ctx, leader, bucket, Step::EcdhMask)?;
        let x_ab = self.ec_cipher.reencrypt_to_bytes(&x_a, &self.key)?;
        t.qps("remask leader", x_ab.len());
        send_payload(ctx, leader, bucket, Step::EcdhRemask, x_ab)?;
        Ok(())
    }
}

impl BucketProtocol for EcdhTwoParty {
    fn name(&self) -> &'static str {
        "ecdh-2pc"
    }

    fn run_bucket(
        &mut self,
        ctx: &mut LinkContext,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError> {
        let me = ctx.rank();
        if me == self.leader {
            let peer = 1 - self.leader;
            self.run_leader(ctx, peer, bucket, items)
        } else {
            self.run_peer(ctx, self.leader, bucket, items)?;
            Ok(vec![])
        }
    }
}
