//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Batched related-key OPRF of Kolesnikov, Kumaresan, Rosulek and Trieu
//! (cf. <https://eprint.iacr.org/2016/799>, Figure 2).
//!
//! The OPRF receiver holds one input per row (a cuckoo bin) and acts as the
//! base OT sender; the OPRF sender holds the secret choice bits `s` and can
//! evaluate `F(j, x)` for any row `j` and any input `x`. For the receiver's
//! own input at row `j` both sides get the same value.

use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;
use rand_core::SeedableRng;
use rayon::iter::IndexedParallelIterator;
use rayon::iter::IntoParallelIterator;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha512;

use crate::ot::bytes_to_bits;
use crate::ot::BASE_OT_COUNT;
use crate::prelude::*;

pub const CODE_BYTES: usize = BASE_OT_COUNT / 8;

/// Row of the code matrix, one bit per base OT
pub type Codeword = [u8; CODE_BYTES];

/// Statistical security parameter of the tag comparison
const STAT_SECURITY_BITS: usize = 40;

/// Pseudorandom code `C(x || hidx)`, SHA-512 of the input
pub fn encode(input: &[u8], hidx: usize) -> Codeword {
    let mut hasher = Sha512::new();
    hasher.update(input);
    hasher.update([hidx as u8]);
    let mut out = [0u8; CODE_BYTES];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Tag length in bytes so that a false match happens with probability
/// about 2^-40 over all `nbins * 3 * sender_items` comparisons
pub fn mask_size(nbins: usize, sender_items: usize) -> usize {
    let log2 = |n: usize| (usize::BITS - n.leading_zeros()) as usize;
    let bits = STAT_SECURITY_BITS + log2(nbins) + log2(sender_items.saturating_mul(3));
    ((bits + 7) / 8).min(32)
}

pub fn column_bytes(nrows: usize) -> usize {
    (nrows + 7) / 8
}

fn prg(seed: &Seed, len: usize) -> Vec<u8> {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

fn get_bit(bytes: &[u8], i: usize) -> bool {
    (bytes[i / 8] >> (i % 8)) & 1 == 1
}

fn xor_inplace(a: &mut [u8], b: &[u8]) {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x ^= *y;
    }
}

fn rows_to_columns(rows: &[Codeword]) -> Vec<Vec<u8>> {
    let nbytes = column_bytes(rows.len());
    (0..BASE_OT_COUNT)
        .into_par_iter()
        .map(|i| {
            let mut col = vec![0u8; nbytes];
            for (j, row) in rows.iter().enumerate() {
                if get_bit(row, i) {
                    col[j / 8] |= 1 << (j % 8);
                }
            }
            col
        })
        .collect()
}

fn columns_to_rows(cols: &[Vec<u8>], nrows: usize) -> Vec<Codeword> {
    (0..nrows)
        .into_par_iter()
        .map(|j| {
            let mut row = [0u8; CODE_BYTES];
            for (i, col) in cols.iter().enumerate() {
                if get_bit(col, j) {
                    row[i / 8] |= 1 << (i % 8);
                }
            }
            row
        })
        .collect()
}

/// `H(j || row)` truncated to `masksize`
fn tag(j: usize, row: &Codeword, masksize: usize) -> ByteBuffer {
    let mut hasher = Sha256::new();
    hasher.update((j as u64).to_le_bytes());
    hasher.update(row);
    ByteBuffer::from_slice(&hasher.finalize()[..masksize])
}

pub struct KkrtReceiver {
    t_rows: Vec<Codeword>,
}

impl KkrtReceiver {
    /// Expands the base OT seed pairs over the codewords of every row
    ///
    /// Returns the receiver and the `u_i = G(k0_i) ^ G(k1_i) ^ c^i` columns
    /// for the sender.
    pub fn extend(
        seeds: &[(Seed, Seed)],
        codes: &[Codeword],
    ) -> Result<(KkrtReceiver, TPayload), CryptoError> {
        if seeds.len() != BASE_OT_COUNT {
            return Err(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: seeds.len(),
            });
        }
        let nrows = codes.len();
        let nbytes = column_bytes(nrows);
        let code_cols = rows_to_columns(codes);

        let (t_cols, u_cols): (Vec<_>, Vec<_>) = seeds
            .par_iter()
            .zip(code_cols.par_iter())
            .map(|((k0, k1), c)| {
                let t = prg(k0, nbytes);
                let mut u = prg(k1, nbytes);
                xor_inplace(&mut u, &t);
                xor_inplace(&mut u, c);
                (t, ByteBuffer::from(u))
            })
            .unzip();

        let t_rows = columns_to_rows(&t_cols, nrows);
        Ok((KkrtReceiver { t_rows }, u_cols))
    }

    /// OPRF value of every row's own input
    pub fn outputs(&self, masksize: usize) -> Vec<ByteBuffer> {
        self.t_rows
            .par_iter()
            .enumerate()
            .map(|(j, t)| tag(j, t, masksize))
            .collect()
    }
}

pub struct KkrtSender {
    s: Codeword,
    q_rows: Vec<Codeword>,
}

impl KkrtSender {
    /// Rebuilds `q_i = G(k_{s_i}) ^ s_i * u_i` and keeps it row-wise
    pub fn new(
        s: Codeword,
        seeds: &[Seed],
        columns: &[ByteBuffer],
        nrows: usize,
    ) -> Result<KkrtSender, CryptoError> {
        if seeds.len() != BASE_OT_COUNT {
            return Err(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: seeds.len(),
            });
        }
        if columns.len() != BASE_OT_COUNT {
            return Err(CryptoError::InvalidCount {
                expected: BASE_OT_COUNT,
                found: columns.len(),
            });
        }
        let nbytes = column_bytes(nrows);
        if let Some((index, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != nbytes) {
            return Err(CryptoError::InvalidLength {
                index,
                expected: nbytes,
                found: col.len(),
            });
        }

        let choices = bytes_to_bits(&s);
        let q_cols = seeds
            .par_iter()
            .zip(columns.par_iter())
            .zip(choices.par_iter())
            .map(|((k, u), &si)| {
                let mut q = prg(k, nbytes);
                if si {
                    xor_inplace(&mut q, &u.buffer);
                }
                q
            })
            .collect::<Vec<_>>();

        Ok(KkrtSender {
            s,
            q_rows: columns_to_rows(&q_cols, nrows),
        })
    }

    pub fn nrows(&self) -> usize {
        self.q_rows.len()
    }

    /// `F(j, x) = H(j || q_j ^ (C(x) & s))`
    pub fn evaluate(&self, row: usize, code: &Codeword, masksize: usize) -> ByteBuffer {
        let mut x = self.q_rows[row];
        for ((a, c), s) in x.iter_mut().zip(code.iter()).zip(self.s.iter()) {
            *a ^= c & s;
        }
        tag(row, &x, masksize)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::ot::BaseOtReceiver;
    use crate::ot::BaseOtSender;

    fn run_extension(codes: &[Codeword]) -> (KkrtReceiver, KkrtSender) {
        let mut rng = rand::thread_rng();
        let mut s = [0u8; CODE_BYTES];
        rng.fill(&mut s[..]);

        let ot_sender = BaseOtSender::new();
        let (responses, chosen) =
            BaseOtReceiver::respond(&ot_sender.first_message(), &bytes_to_bits(&s)).unwrap();
        let pairs = ot_sender.derive_seeds(&responses).unwrap();

        let (receiver, columns) = KkrtReceiver::extend(&pairs, codes).unwrap();
        let sender = KkrtSender::new(s, &chosen, &columns, codes.len()).unwrap();
        (receiver, sender)
    }

    #[test]
    fn transpose_round_trip() {
        let mut rng = rand::thread_rng();
        let rows = (0..13)
            .map(|_| {
                let mut r = [0u8; CODE_BYTES];
                rng.fill(&mut r[..]);
                r
            })
            .collect::<Vec<Codeword>>();
        let cols = rows_to_columns(&rows);
        assert_eq!(cols.len(), BASE_OT_COUNT);
        assert_eq!(cols[0].len(), 2);
        assert_eq!(columns_to_rows(&cols, rows.len()), rows);
    }

    #[test]
    fn oprf_matches_on_own_inputs_only() {
        let inputs = (0..37).map(|i| format!("x{}", i)).collect::<Vec<_>>();
        let codes = inputs
            .iter()
            .map(|x| encode(x.as_bytes(), 1))
            .collect::<Vec<_>>();
        let (receiver, sender) = run_extension(&codes);
        assert_eq!(sender.nrows(), 37);

        let masksize = mask_size(codes.len(), codes.len());
        let outputs = receiver.outputs(masksize);
        for (j, x) in inputs.iter().enumerate() {
            assert_eq!(outputs[j].len(), masksize);
            assert_eq!(sender.evaluate(j, &encode(x.as_bytes(), 1), masksize), outputs[j]);
            assert_ne!(sender.evaluate(j, &encode(x.as_bytes(), 2), masksize), outputs[j]);
            assert_ne!(sender.evaluate(j, &encode(b"other", 1), masksize), outputs[j]);
        }
    }

    #[test]
    fn short_columns_are_rejected() {
        let seeds = vec![[0u8; 32]; BASE_OT_COUNT];
        let mut columns = vec![ByteBuffer::from_slice(&[0u8; 2]); BASE_OT_COUNT];
        columns[5] = ByteBuffer::from_slice(&[0u8; 1]);
        assert_eq!(
            KkrtSender::new([0u8; CODE_BYTES], &seeds, &columns, 16).err(),
            Some(CryptoError::InvalidLength {
                index: 5,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn mask_size_grows_with_sets() {
        assert_eq!(mask_size(16, 10), 7);
        assert!(mask_size(1 << 20, 1 << 20) > mask_size(1 << 8, 1 << 8));
        assert!(mask_size(usize::MAX, usize::MAX / 3) <= 32);
    }
}
