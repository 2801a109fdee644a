//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Commutative masking PSI: `H(x)^(ab) == H(x)^(ba)`

#[cfg(not(target_arch = "wasm32"))]
pub(crate) use crypto::eccipher::ECRistrettoParallel as ECRistretto;
#[cfg(target_arch = "wasm32")]
pub(crate) use crypto::eccipher::ECRistrettoSequential as ECRistretto;
use common::vectors::mask_to_indices;
use common::vectors::vec_intersection_mask;
use crypto::prelude::ByteBuffer;

pub mod three_party;
pub mod two_party;

/// Indices of `ours` present in every one of `others`
pub(crate) fn matched_indices(ours: &[ByteBuffer], others: &[&[ByteBuffer]]) -> Vec<usize> {
    let mut mask = vec![true; ours.len()];
    for other in others {
        for (m, hit) in mask.iter_mut().zip(vec_intersection_mask(ours, other)) {
            *m &= hit;
        }
    }
    mask_to_indices(&mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_indices() {
        let b = |v: u8| ByteBuffer::from_slice(&[v]);
        let ours = vec![b(1), b(2), b(3), b(4)];
        let y = vec![b(4), b(2), b(9)];
        let z = vec![b(2), b(3)];
        assert_eq!(matched_indices(&ours, &[&y[..]]), vec![1, 3]);
        assert_eq!(matched_indices(&ours, &[&y[..], &z[..]]), vec![1]);
        assert!(matched_indices(&[], &[&y[..]]).is_empty());
    }
}
