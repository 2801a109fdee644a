//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

pub use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar,
    scalar::Scalar,
};

pub use crate::error::CryptoError;
pub use crate::spoint::ByteBuffer;

pub type TPayload = Vec<ByteBuffer>;
pub type TPoint = RistrettoPoint;
pub type TScalar = Scalar;

/// 256-bit seed, used for base OT keys and PRG expansion
pub type Seed = [u8; 32];

/// Size of a compressed Ristretto point
pub const POINT_SIZE: usize = 32;
