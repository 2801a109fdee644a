//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use link::LinkContext;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::config::DpParams;
use crate::ecdh::two_party::EcdhTwoParty;
use crate::error::PsiError;
use crate::traits::BucketProtocol;

/// Rank whose input is sub-sampled before the exchange
pub const SAMPLED_RANK: usize = 1;

/// Two party masking PSI with sub-sampled inputs
///
/// Rank 1 keeps each of its items with probability `bob_sub_sampling`; the
/// leader keeps each match with probability `e^eps / (1 + e^eps)`. Items are
/// only ever dropped, so the reported intersection never exceeds the exact
/// one. With a `seed` both draws are reproducible.
pub struct DpTwoParty {
    inner: EcdhTwoParty,
    params: DpParams,
    leader: usize,
    rng: Option<StdRng>,
}

impl DpTwoParty {
    pub fn new(leader: usize, params: &DpParams) -> DpTwoParty {
        DpTwoParty {
            inner: EcdhTwoParty::new(leader),
            params: *params,
            leader,
            rng: None,
        }
    }

    /// Probability of keeping a true match
    pub fn keep_probability(epsilon: f64) -> f64 {
        1.0 / (1.0 + (-epsilon).exp())
    }

    fn rng(&mut self, rank: usize) -> &mut StdRng {
        let seed = self.params.seed;
        self.rng.get_or_insert_with(|| match seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(rank as u64)),
            None => StdRng::from_entropy(),
        })
    }
}

impl BucketProtocol for DpTwoParty {
    fn name(&self) -> &'static str {
        "dp-2pc"
    }

    fn run_bucket(
        &mut self,
        ctx: &mut LinkContext,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError> {
        let me = ctx.rank();
        let rate = self.params.bob_sub_sampling;
        let kept = if me == SAMPLED_RANK {
            let rng = self.rng(me);
            (0..items.len())
                .filter(|_| rng.gen_bool(rate))
                .collect::<Vec<_>>()
        } else {
            (0..items.len()).collect::<Vec<_>>()
        };
        let sampled = kept.iter().map(|&i| items[i].clone()).collect::<Vec<_>>();
        debug!(
            "rank {} bucket {}: {} of {} items enter the exchange",
            me,
            bucket,
            sampled.len(),
            items.len()
        );

        let matched = self.inner.run_bucket(ctx, bucket, &sampled)?;
        if me != self.leader {
            return Ok(matched);
        }

        let p = DpTwoParty::keep_probability(self.params.epsilon);
        let rng = self.rng(me);
        Ok(matched
            .into_iter()
            .filter(|_| rng.gen_bool(p))
            .map(|i| kept[i])
            .collect())
    }
}
