//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::hash::Hash;

/// Mask of 0 or 1 if item of a is in b
pub fn vec_intersection_mask<T>(a: &[T], b: &[T]) -> Vec<bool>
where
    T: Hash + Eq,
{
    let s: HashSet<&T> = b.iter().collect();
    a.iter().map(|e| s.contains(e)).collect::<Vec<bool>>()
}

/// Returns a vector with indices for which the corresponding element
/// is set in the mask
pub fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, &e)| e)
        .map(|(i, _)| i)
        .collect::<Vec<usize>>()
}

/// Indices of the first occurrence of every distinct item, in input order,
/// together with the number of dropped duplicates
///
/// ## Example
///
/// ```
/// use common::vectors;
///
/// let (idx, dups) = vectors::first_occurrences(&["a", "b", "a", "c", "b"]);
/// assert_eq!(idx, vec![0, 1, 3]);
/// assert_eq!(dups, 2);
/// ```
pub fn first_occurrences<T>(items: &[T]) -> (Vec<usize>, usize)
where
    T: Hash + Eq,
{
    let mut seen: HashSet<&T> = HashSet::with_capacity(items.len());
    let idx = items
        .iter()
        .enumerate()
        .filter(|(_, item)| seen.insert(*item))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let dups = items.len() - idx.len();
    if dups > 0 {
        debug!("Dropped {} duplicated items", dups);
    }
    (idx, dups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_mask() {
        let a = vec![1, 2, 3];
        let b = vec![2, 3];
        assert_eq!(vec_intersection_mask(&a, &b), vec![false, true, true]);
        assert_eq!(vec_intersection_mask(&b, &a), vec![true, true]);

        let ind = mask_to_indices(vec_intersection_mask(&a, &b).as_slice());
        assert_eq!(ind, vec![1, 2]);

        let ind2 = mask_to_indices(vec_intersection_mask(&b, &a).as_slice());
        assert_eq!(ind2, vec![0, 1]);
    }

    #[test]
    fn test_mask_empty() {
        let a: Vec<u8> = vec![];
        assert!(vec_intersection_mask(&a, &[1u8]).is_empty());
        assert!(mask_to_indices(&[]).is_empty());
    }

    #[test]
    fn test_first_occurrences() {
        let (idx, dups) = first_occurrences(&[5, 5, 5]);
        assert_eq!(idx, vec![0]);
        assert_eq!(dups, 2);

        let empty: Vec<u8> = vec![];
        assert_eq!(first_occurrences(&empty), (vec![], 0));
    }
}
