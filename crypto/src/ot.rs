//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Chou-Orlandi "simplest OT" (cf. <https://eprint.iacr.org/2015/267>),
//! used as a batch of random base OTs that seed the KKRT extension.
//!
//! The OT sender never transfers messages, both parties hash the shared
//! points into 256-bit seeds: the sender learns `(k0_i, k1_i)`, the receiver
//! learns `k_{c_i}` for its choice bit `c_i`.

use rayon::iter::IndexedParallelIterator;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use sha2::Digest;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::eccipher::compress;
use crate::eccipher::decompress;
use crate::eccipher::gen_scalar;
use crate::prelude::*;

/// Number of base OTs, equal to the width of the pseudorandom code
pub const BASE_OT_COUNT: usize = 512;

fn hash_point(index: usize, p: &RistrettoPoint) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update((index as u64).to_le_bytes());
    hasher.update(p.compress().as_bytes());
    hasher.finalize().into()
}

pub struct BaseOtSender {
    y: Zeroizing<Scalar>,
    s: RistrettoPoint,
}

impl BaseOtSender {
    pub fn new() -> BaseOtSender {
        let y = Zeroizing::new(gen_scalar());
        let s = RistrettoPoint::mul_base(&y);
        BaseOtSender { y, s }
    }

    /// `S = y * G`
    pub fn first_message(&self) -> ByteBuffer {
        compress(&self.s)
    }

    /// Seed pairs `(H(i, yR_i), H(i, y(R_i - S)))` for every response `R_i`
    pub fn derive_seeds(&self, responses: &[ByteBuffer]) -> Result<Vec<(Seed, Seed)>, CryptoError> {
        if responses.len() != BASE_OT_COUNT {
            return Err(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: responses.len(),
            });
        }
        responses
            .par_iter()
            .enumerate()
            .map(|(i, r)| {
                let r = decompress(i, r)?;
                let k0 = hash_point(i, &(r * *self.y));
                let k1 = hash_point(i, &((r - self.s) * *self.y));
                Ok((k0, k1))
            })
            .collect()
    }
}

impl Default for BaseOtSender {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BaseOtReceiver {}

impl BaseOtReceiver {
    /// Answers the sender's `S` for every choice bit
    ///
    /// Returns the points `R_i = c_i * S + x_i * G` to send back and the
    /// chosen seeds `H(i, x_i * S)`.
    pub fn respond(
        first_message: &ByteBuffer,
        choices: &[bool],
    ) -> Result<(TPayload, Vec<Seed>), CryptoError> {
        if choices.len() != BASE_OT_COUNT {
            return Err(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: choices.len(),
            });
        }
        let s = decompress(0, first_message)?;

        let (responses, seeds): (Vec<_>, Vec<_>) = choices
            .par_iter()
            .enumerate()
            .map(|(i, &c)| {
                let x = Zeroizing::new(gen_scalar());
                let xg = RistrettoPoint::mul_base(&x);
                let r = if c { s + xg } else { xg };
                (compress(&r), hash_point(i, &(s * *x)))
            })
            .unzip();
        Ok((responses, seeds))
    }
}

/// Unpacks `bytes` into bits, least significant bit first
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|b| (0..8).map(move |i| (b >> i) & 1 == 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn receiver_gets_the_chosen_seed() {
        let mut rng = rand::thread_rng();
        let choices = (0..BASE_OT_COUNT).map(|_| rng.gen()).collect::<Vec<bool>>();

        let sender = BaseOtSender::new();
        let (responses, chosen) =
            BaseOtReceiver::respond(&sender.first_message(), &choices).unwrap();
        let pairs = sender.derive_seeds(&responses).unwrap();

        for (i, c) in choices.iter().enumerate() {
            let (k0, k1) = pairs[i];
            assert_ne!(k0, k1);
            if *c {
                assert_eq!(chosen[i], k1);
            } else {
                assert_eq!(chosen[i], k0);
            }
        }
    }

    #[test]
    fn wrong_counts_are_rejected() {
        let sender = BaseOtSender::new();
        assert_eq!(
            BaseOtReceiver::respond(&sender.first_message(), &[true; 3]).err(),
            Some(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: 3
            })
        );
        assert!(sender.derive_seeds(&[]).is_err());
    }

    #[test]
    fn bits_are_lsb_first() {
        assert_eq!(
            bytes_to_bits(&[0b0000_0101]),
            vec![true, false, true, false, false, false, false, false]
        );
    }
}
