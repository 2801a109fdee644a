//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Bucketized private set intersection between 2 or 3 parties
//!
//! Inputs are hash-partitioned into buckets and one PSI variant runs per
//! bucket over a [`link::LinkContext`]. Depending on the configuration the
//! intersection is revealed to one receiver or broadcast to every party.

#![forbid(unsafe_code)]
#![crate_name = "protocol"]

#[macro_use]
extern crate log;

pub mod api;
pub mod bucket;
pub mod config;
pub mod dp;
pub mod ecdh;
pub mod engine;
pub mod error;
pub mod fileio;
pub mod kkrt;
pub mod reconcile;
pub mod report;
pub mod traits;
pub mod wire;

#[cfg(test)]
mod testing;

pub use api::bucket_psi;
pub use api::mem_psi;
pub use config::PsiConfig;
pub use error::PsiError;
pub use report::Report;
