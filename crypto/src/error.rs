//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("item {index} is not a valid compressed point")]
    InvalidPoint { index: usize },
    #[error("expected {expected} items, found {found}")]
    InvalidCount { expected: usize, found: usize },
    #[error("item {index} has {found} bytes, expected {expected}")]
    InvalidLength {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("cuckoo hashing of {items} items into {bins} bins failed")]
    CuckooFull { items: usize, bins: usize },
}
