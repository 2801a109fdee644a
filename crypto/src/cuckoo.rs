//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use rand::Rng;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use sha2::Digest;
use sha2::Sha256;

use crate::prelude::CryptoError;

/// Number of hash functions, each item can live in one of 3 bins
pub const NHASHES: usize = 3;

/// The number of evictions before giving up on a key
const NITERS: usize = 1000;

/// Keys tried before the table is declared full
const MAX_KEY_ATTEMPTS: usize = 16;

pub type HashKey = [u8; 16];
pub type ItemDigest = [u8; 32];

/// Keyed digest of an item, the 3 bin choices are read from it
pub fn item_digest(key: &HashKey, item: &[u8]) -> ItemDigest {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(item);
    hasher.finalize().into()
}

pub fn item_digests(key: &HashKey, items: &[Vec<u8>]) -> Vec<ItemDigest> {
    items
        .par_iter()
        .map(|item| item_digest(key, item))
        .collect::<Vec<_>>()
}

/// Bin of `digest` under hash function `hidx`
///
/// Uses the `hidx`th 32 bits of the digest.
pub fn bin(digest: &ItemDigest, hidx: usize, nbins: usize) -> usize {
    let mut array = [0u8; 4];
    array.copy_from_slice(&digest[4 * hidx..4 * (hidx + 1)]);
    (u32::from_le_bytes(array) as usize) % nbins
}

/// Table size for `n` items without a stash
pub fn compute_nbins(n: usize) -> usize {
    n + n / 2 + 8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CuckooItem {
    pub input_index: usize,
    pub hash_index: usize,
}

#[derive(Clone, Debug)]
pub struct CuckooTable {
    items: Vec<Option<CuckooItem>>,
    nbins: usize,
}

impl CuckooTable {
    /// Places every digest, fails if some item keeps getting evicted
    pub fn new(digests: &[ItemDigest], nbins: usize) -> Result<CuckooTable, CryptoError> {
        let mut tbl = CuckooTable {
            items: vec![None; nbins],
            nbins,
        };
        for j in 0..digests.len() {
            tbl.hash(digests, j)?;
        }
        Ok(tbl)
    }

    /// Picks fresh keys until every item fits
    pub fn build<R: Rng + ?Sized>(
        items: &[Vec<u8>],
        rng: &mut R,
    ) -> Result<(HashKey, CuckooTable), CryptoError> {
        let nbins = compute_nbins(items.len());
        let mut last_err = CryptoError::CuckooFull {
            items: items.len(),
            bins: nbins,
        };
        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key: HashKey = rng.gen();
            match CuckooTable::new(&item_digests(&key, items), nbins) {
                Ok(tbl) => return Ok((key, tbl)),
                Err(e) => {
                    debug!("cuckoo key attempt {} failed: {}", attempt, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn hash(&mut self, digests: &[ItemDigest], idx: usize) -> Result<(), CryptoError> {
        let mut item = CuckooItem {
            input_index: idx,
            hash_index: 0,
        };
        for _ in 0..NITERS {
            let i = bin(&digests[item.input_index], item.hash_index, self.nbins);
            match self.items[i].replace(item) {
                Some(evicted) => {
                    item = evicted;
                    item.hash_index = (item.hash_index + 1) % NHASHES;
                }
                None => return Ok(()),
            }
        }
        Err(CryptoError::CuckooFull {
            items: digests.len(),
            bins: self.nbins,
        })
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn items(&self) -> &[Option<CuckooItem>] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn inputs(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("item-{}", i).into_bytes()).collect()
    }

    #[test]
    fn every_item_is_placed_in_one_of_its_bins() {
        let items = inputs(1000);
        let mut rng = rand::thread_rng();
        let (key, tbl) = CuckooTable::build(&items, &mut rng).unwrap();
        assert_eq!(tbl.nbins(), compute_nbins(1000));

        let digests = item_digests(&key, &items);
        let mut seen = HashSet::new();
        for (j, slot) in tbl.items().iter().enumerate() {
            if let Some(item) = slot {
                assert_eq!(bin(&digests[item.input_index], item.hash_index, tbl.nbins()), j);
                assert!(seen.insert(item.input_index));
            }
        }
        assert_eq!(seen.len(), items.len());
    }

    #[test]
    fn empty_and_single_inputs() {
        let mut rng = rand::thread_rng();
        let (_, tbl) = CuckooTable::build(&[], &mut rng).unwrap();
        assert!(tbl.items().iter().all(|x| x.is_none()));

        let (_, tbl) = CuckooTable::build(&inputs(1), &mut rng).unwrap();
        assert_eq!(tbl.items().iter().filter(|x| x.is_some()).count(), 1);
    }

    #[test]
    fn overfull_table_fails() {
        let key = [7u8; 16];
        let digests = item_digests(&key, &inputs(10));
        assert_eq!(
            CuckooTable::new(&digests, 4).err(),
            Some(CryptoError::CuckooFull { items: 10, bins: 4 })
        );
    }
}
