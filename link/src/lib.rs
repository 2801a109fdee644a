//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Party-addressed message passing for two and three party protocols
//!
//! A [`LinkContext`] is bound to one rank of a [`LinkDescriptor`] and talks
//! to the other ranks either through in-process queues (`create_mem`) or
//! TCP sockets (`create_net`). Both backends keep every ordered pair of
//! ranks FIFO.

#![forbid(unsafe_code)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod context;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod mem;
pub mod net;
pub mod transport;

pub use context::LinkContext;
pub use descriptor::LinkDescriptor;
pub use descriptor::LinkOptions;
pub use descriptor::Party;
pub use error::LinkError;
pub use transport::LinkStats;
