//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![crate_name = "crypto"]

#[macro_use]
extern crate log;

pub mod cuckoo;
pub mod eccipher;
pub mod error;
pub mod oprf;
pub mod ot;
pub mod prelude;
pub mod spoint;
