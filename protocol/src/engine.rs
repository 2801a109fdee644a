//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Drives one PSI run on one party
//!
//! `Init -> ParamExchange -> Round(0) -> Reconcile(0) -> Round(1) -> ... -> Done`,
//! any error moves to `Failed` and is reported to the peers once.

use common::metrics::Metrics;
use common::timer;
use crypto::prelude::ByteBuffer;
use link::LinkContext;
use serde::Deserialize;
use serde::Serialize;

use crate::bucket::bucket_count;
use crate::bucket::BucketSource;
use crate::config::CurveType;
use crate::config::ProtocolKind;
use crate::config::ProtocolName;
use crate::config::PsiConfig;
use crate::dp::DpTwoParty;
use crate::ecdh::three_party::EcdhThreeParty;
use crate::ecdh::two_party::EcdhTwoParty;
use crate::error::PsiError;
use crate::fileio::ResultSink;
use crate::kkrt::KkrtTwoParty;
use crate::reconcile::reconcile;
use crate::reconcile::Reveal;
use crate::report::Report;
use crate::traits::BucketProtocol;
use crate::wire::recv_exact;
use crate::wire::send_payload;
use crate::wire::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    ParamExchange,
    Round(usize),
    Reconcile(usize),
    Done,
    Failed,
}

/// Settings every party must agree on, plus its own input size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionParams {
    protocol: ProtocolName,
    world_size: u64,
    broadcast_result: bool,
    receiver_rank: Option<u64>,
    curve: CurveType,
    bucket_size: u64,
    bob_sub_sampling: Option<f64>,
    epsilon: Option<f64>,
    item_count: u64,
}

impl SessionParams {
    fn new(config: &PsiConfig, world_size: usize, item_count: usize) -> SessionParams {
        let dp = config.protocol.dp_params();
        SessionParams {
            protocol: config.protocol.name(),
            world_size: world_size as u64,
            broadcast_result: config.broadcast_result,
            receiver_rank: config.receiver_rank.map(|r| r as u64),
            curve: config.curve,
            bucket_size: config.bucket_size as u64,
            bob_sub_sampling: dp.map(|p| p.bob_sub_sampling),
            epsilon: dp.map(|p| p.epsilon),
            item_count: item_count as u64,
        }
    }

    /// First setting that differs, input sizes aside
    fn mismatch(&self, other: &SessionParams) -> Option<String> {
        let diff = |name: &str, a: &dyn std::fmt::Debug, b: &dyn std::fmt::Debug| {
            Some(format!("{}: {:?} here, {:?} there", name, a, b))
        };
        if self.protocol != other.protocol {
            diff("protocol", &self.protocol, &other.protocol)
        } else if self.world_size != other.world_size {
            diff("world_size", &self.world_size, &other.world_size)
        } else if self.broadcast_result != other.broadcast_result {
            diff("broadcast_result", &self.broadcast_result, &other.broadcast_result)
        } else if !self.broadcast_result && self.receiver_rank != other.receiver_rank {
            diff("receiver_rank", &self.receiver_rank, &other.receiver_rank)
        } else if self.curve != other.curve {
            diff("curve", &self.curve, &other.curve)
        } else if self.bucket_size != other.bucket_size {
            diff("bucket_size", &self.bucket_size, &other.bucket_size)
        } else if self.bob_sub_sampling != other.bob_sub_sampling {
            diff("bob_sub_sampling", &self.bob_sub_sampling, &other.bob_sub_sampling)
        } else if self.epsilon != other.epsilon {
            diff("epsilon", &self.epsilon, &other.epsilon)
        } else {
            None
        }
    }
}

fn protocol_for(config: &PsiConfig) -> Box<dyn BucketProtocol> {
    let leader = config.leader();
    match &config.protocol {
        ProtocolKind::Ecdh2pc => Box::new(EcdhTwoParty::new(leader)),
        ProtocolKind::Ecdh3pc => Box::new(EcdhThreeParty::new(leader)),
        ProtocolKind::Kkrt2pc => Box::new(KkrtTwoParty::new(leader)),
        ProtocolKind::Dp2pc(params) => Box::new(DpTwoParty::new(leader, params)),
    }
}

/// Tells the peers about a local failure, hands the error back
///
/// Peer aborts are already relayed to the remaining ranks by the link.
pub(crate) fn abort_on_error(ctx: &mut LinkContext, e: PsiError) -> PsiError {
    if !e.is_peer_abort() && !ctx.is_stopped() {
        ctx.abort(&e.to_string());
    }
    e
}

pub struct PsiEngine<'a> {
    ctx: &'a mut LinkContext,
    config: &'a PsiConfig,
    state: EngineState,
}

impl<'a> PsiEngine<'a> {
    pub fn new(ctx: &'a mut LinkContext, config: &'a PsiConfig) -> PsiEngine<'a> {
        PsiEngine {
            ctx,
            config,
            state: EngineState::Init,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn enter(&mut self, state: EngineState) {
        trace!("rank {}: {:?} -> {:?}", self.ctx.rank(), self.state, state);
        self.state = state;
    }

    /// Runs the whole session over `source`, matched records go to `sink`
    pub fn run(
        &mut self,
        source: &mut dyn BucketSource,
        sink: &mut dyn ResultSink,
    ) -> Result<Report, PsiError> {
        match self.run_all(source, sink) {
            Ok(report) => {
                self.enter(EngineState::Done);
                Ok(report)
            }
            Err(e) => {
                self.enter(EngineState::Failed);
                error!("rank {}: psi run failed: {}", self.ctx.rank(), e);
                Err(abort_on_error(self.ctx, e))
            }
        }
    }

    /// Sends our settings to every peer and checks theirs, returns the
    /// largest input size in the session
    fn exchange_params(&mut self, item_count: usize) -> Result<usize, PsiError> {
        self.enter(EngineState::ParamExchange);
        let ours = SessionParams::new(self.config, self.ctx.world_size(), item_count);
        let bytes = bincode::serialize(&ours)?;
        for dst in self.ctx.peers() {
            send_payload(
                self.ctx,
                dst,
                0,
                Step::Params,
                vec![ByteBuffer::from_slice(&bytes)],
            )?;
        }

        let mut max_items = item_count;
        for src in self.ctx.peers() {
            let payload = recv_exact(self.ctx, src, 0, Step::Params, 1)?;
            let theirs: SessionParams = bincode::deserialize(&payload[0].buffer)?;
            if let Some(diff) = ours.mismatch(&theirs) {
                return Err(PsiError::Config(format!(
                    "rank {} disagrees on {}",
                    src, diff
                )));
            }
            max_items = max_items.max(theirs.item_count as usize);
        }
        Ok(max_items)
    }

    fn run_all(
        &mut self,
        source: &mut dyn BucketSource,
        sink: &mut dyn ResultSink,
    ) -> Result<Report, PsiError> {
        self.config.validate_for_world(self.ctx.world_size())?;
        let me = self.ctx.rank();
        let mut t = timer::Timer::new_silent(&format!("psi rank {}", me));

        let item_count = source.item_count();
        let max_items = self.exchange_params(item_count)?;
        let nbuckets = bucket_count(max_items, self.config.bucket_size);
        source.partition(nbuckets)?;
        t.qps("partition", item_count);

        let mut protocol = protocol_for(self.config);
        let reveal = Reveal::new(self.config.broadcast_result, self.config.leader());
        info!(
            "rank {}: {} over {} buckets, {} local items, {:?}",
            me,
            protocol.name(),
            nbuckets,
            item_count,
            reveal
        );

        for b in 0..nbuckets {
            self.enter(EngineState::Round(b));
            let bucket = source.bucket(b)?;
            let matched = protocol.run_bucket(self.ctx, b, &bucket.keys())?;
            self.enter(EngineState::Reconcile(b));
            let records = reconcile(self.ctx, reveal, bucket, &matched)?;
            debug!("rank {} bucket {}: {} matched records", me, b, records.len());
            sink.write_bucket(records)?;
        }
        let written = sink.finish()?;
        t.qps("buckets", nbuckets);

        let report = Report {
            original_count: item_count,
            intersection_count: written,
        };
        let stats = self.ctx.stats();
        let mut metrics = Metrics::new(protocol.name(), me);
        metrics.set_original_count(report.original_count);
        metrics.set_intersection_count(report.intersection_count);
        metrics.set_bucket_count(nbuckets);
        metrics.set_traffic(stats.bytes_sent, stats.bytes_received);
        metrics.log_metrics();
        Ok(report)
    }
}
