//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use rand::Rng;

/// Returns a uniformly random permutation of `0..n`
///
/// `(0 1 2 3) -> (2 3 0 1)`
/// From https://en.wikipedia.org/wiki/Fisher%E2%80%93Yates_shuffle
pub fn gen_permute_pattern<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut res: Vec<usize> = (0..n).collect::<Vec<usize>>();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        res.swap(i, j);
    }
    res
}

/// Applies the permutation: element at `i` moves to `permutation[i]`
///
/// # Example
///
/// ```
/// use common::permutations;
/// let p = vec![2, 0, 1];
/// let v = permutations::permute(&p, vec!['a', 'b', 'c']);
/// assert_eq!(v, vec!['b', 'c', 'a']);
/// ```
pub fn permute<T>(permutation: &[usize], items: Vec<T>) -> Vec<T> {
    assert_eq!(
        permutation.len(),
        items.len(),
        "permutation and items should have the same length"
    );
    let mut output: Vec<Option<T>> = (0..items.len()).map(|_| None).collect();
    for (item, &target) in items.into_iter().zip(permutation.iter()) {
        output[target] = Some(item);
    }
    output.into_iter().flatten().collect::<Vec<T>>()
}

/// Random shuffle of a vector, using a fresh permutation pattern
pub fn shuffle<T>(items: Vec<T>) -> Vec<T> {
    let mut rng = rand::thread_rng();
    let p = gen_permute_pattern(items.len(), &mut rng);
    permute(&p, items)
}
