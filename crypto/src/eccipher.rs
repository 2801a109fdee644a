//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::fmt::Error;
use std::fmt::Formatter;

use rand::rngs::OsRng;
use rand::RngCore;
use rayon::iter::IndexedParallelIterator;
use rayon::iter::IntoParallelIterator;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use sha2::Sha512;

use crate::prelude::ByteBuffer;
use crate::prelude::CompressedRistretto;
use crate::prelude::CryptoError;
use crate::prelude::RistrettoPoint;
use crate::prelude::Scalar;
use crate::prelude::POINT_SIZE;

/// Curve operations behind the ECDH-masking protocols
///
/// "Encrypt" means multiplying a point by a secret scalar (masking). Masking
/// commutes, so `(H(x) * a) * b == (H(x) * b) * a` and two items are equal
/// after every party masked them iff the plaintexts were equal.
///
/// The trait aims to interface sequential and parallel implementations.
/// Curve arithmetic is [Dalek](https://doc.dalek.rs) Ristretto255.
pub trait ECCipher {
    type Item;

    /// Mapping plain text to the curve using Sha512
    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item>;

    /// Masks every point with `pow`
    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item>;

    /// Hash to curve, mask with `key`, serialize
    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer>;

    /// Serializes the points to bytes representation
    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer>;

    /// Deserializes the points, fails on the first malformed item
    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CryptoError>;

    /// Deserializes the points and masks them with `pow`
    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CryptoError>;

    /// Deserialize, mask and serialize again, order preserved
    fn reencrypt_to_bytes(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<ByteBuffer>, CryptoError>;
}

pub(crate) fn decompress(index: usize, b: &ByteBuffer) -> Result<RistrettoPoint, CryptoError> {
    if b.len() != POINT_SIZE {
        return Err(CryptoError::InvalidLength {
            index,
            expected: POINT_SIZE,
            found: b.len(),
        });
    }
    CompressedRistretto::from_slice(&b.buffer)
        .ok()
        .and_then(|c| c.decompress())
        .ok_or(CryptoError::InvalidPoint { index })
}

pub(crate) fn compress(p: &RistrettoPoint) -> ByteBuffer {
    ByteBuffer::from_slice(p.compress().as_bytes())
}

fn hash_to_point(text: &str) -> RistrettoPoint {
    RistrettoPoint::hash_from_bytes::<Sha512>(text.as_bytes())
}

/// Sequential impl of `ECCipher`
///
/// All transformations are single-threaded
#[derive(Default)]
pub struct ECRistrettoSequential {}

impl ECRistrettoSequential {
    pub fn new() -> ECRistrettoSequential {
        ECRistrettoSequential {}
    }
}

impl ECCipher for ECRistrettoSequential {
    type Item = RistrettoPoint;

    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item> {
        plaintext.iter().map(|text| hash_to_point(text)).collect()
    }

    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item> {
        points.iter().map(|p| p * pow).collect()
    }

    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer> {
        plaintext
            .iter()
            .map(|text| compress(&(hash_to_point(text) * key)))
            .collect()
    }

    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer> {
        points.iter().map(compress).collect()
    }

    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CryptoError> {
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b))
            .collect()
    }

    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CryptoError> {
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b).map(|p| p * pow))
            .collect()
    }

    fn reencrypt_to_bytes(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<ByteBuffer>, CryptoError> {
        payload
            .iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b).map(|p| compress(&(p * pow))))
            .collect()
    }
}

/// Parallel impl of `ECCipher`
///
/// Multithreaded component happens via `rayon` crate, results keep the
/// order of the inputs.
///
/// # Example
///
/// ```
/// use crypto::eccipher::{gen_scalar, ECCipher, ECRistrettoParallel};
///
/// let (a, b) = (gen_scalar(), gen_scalar());
/// let eccipher = ECRistrettoParallel::default();
/// let text = vec![String::from("a"), String::from("b")];
///
/// let once = eccipher.hash_encrypt_to_bytes(&text, &a);
/// let twice = eccipher.reencrypt_to_bytes(&once, &b).unwrap();
/// let other_way = eccipher
///     .reencrypt_to_bytes(&eccipher.hash_encrypt_to_bytes(&text, &b), &a)
///     .unwrap();
/// assert_eq!(twice, other_way);
/// ```
#[derive(Default)]
pub struct ECRistrettoParallel {}

impl ECRistrettoParallel {
    pub fn new() -> ECRistrettoParallel {
        ECRistrettoParallel {}
    }
}

impl ECCipher for ECRistrettoParallel {
    type Item = RistrettoPoint;

    fn hash(&self, plaintext: &[String]) -> Vec<Self::Item> {
        plaintext
            .par_iter()
            .map(|item| hash_to_point(item))
            .collect::<Vec<Self::Item>>()
    }

    fn encrypt(&self, points: &[Self::Item], pow: &Scalar) -> Vec<Self::Item> {
        points
            .into_par_iter()
            .map_with(pow, |ctx, item| item * (*ctx))
            .collect::<Vec<_>>()
    }

    fn hash_encrypt_to_bytes(&self, plaintext: &[String], key: &Scalar) -> Vec<ByteBuffer> {
        plaintext
            .par_iter()
            .map_with(key, |ctx, item| compress(&(hash_to_point(item) * (*ctx))))
            .collect::<Vec<ByteBuffer>>()
    }

    fn to_bytes(&self, points: &[Self::Item]) -> Vec<ByteBuffer> {
        points.par_iter().map(compress).collect::<Vec<_>>()
    }

    fn to_points(&self, payload: &[ByteBuffer]) -> Result<Vec<Self::Item>, CryptoError> {
        payload
            .par_iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b))
            .collect()
    }

    fn to_points_encrypt(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<Self::Item>, CryptoError> {
        payload
            .par_iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b).map(|p| p * pow))
            .collect()
    }

    fn reencrypt_to_bytes(
        &self,
        payload: &[ByteBuffer],
        pow: &Scalar,
    ) -> Result<Vec<ByteBuffer>, CryptoError> {
        payload
            .par_iter()
            .enumerate()
            .map(|(i, b)| decompress(i, b).map(|p| compress(&(p * pow))))
            .collect()
    }
}

impl Debug for ECRistrettoSequential {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Ristretto EC ops sequential implementation")
    }
}

impl Debug for ECRistrettoParallel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Ristretto EC ops parallel implementation")
    }
}

/// Generates random Scalar
///
/// the method is used to get masking keys and base OT secrets, it uses
/// the operating system CSPRNG.
pub fn gen_scalar() -> Scalar {
    let mut rng = OsRng;
    let mut scalar_bytes = [0u8; 64];
    rng.fill_bytes(&mut scalar_bytes);
    Scalar::from_bytes_mod_order_wide(&scalar_bytes)
}

#[cfg(test)]
mod tests {
    use rand::distributions;
    use rand::thread_rng;
    use rand::Rng;

    use super::*;

    fn random_string(size: usize) -> String {
        thread_rng()
            .sample_iter(&distributions::Alphanumeric)
            .take(size)
            .map(char::from)
            .collect()
    }

    fn gen_points(n: usize) -> Vec<RistrettoPoint> {
        let mut rng = OsRng;
        (0..n)
            .map(|_| {
                let mut uniform_bytes = [0u8; 64];
                rng.fill_bytes(&mut uniform_bytes);
                RistrettoPoint::from_uniform_bytes(&uniform_bytes)
            })
            .collect::<Vec<RistrettoPoint>>()
    }

    #[test]
    fn compress_decompress_works() {
        let key = gen_scalar();
        let items = gen_points(100);
        let seq = ECRistrettoSequential::new();
        let parr = ECRistrettoParallel::new();

        let srlz_seq = seq.to_bytes(&seq.encrypt(&items, &key));
        let srlz_parr = parr.to_bytes(&parr.encrypt(&items, &key));
        assert_eq!(srlz_seq, srlz_parr);

        let dcmp_seq = seq.to_points(&srlz_seq).unwrap();
        let dcmp_parr = parr.to_points(&srlz_parr).unwrap();
        assert_eq!(dcmp_seq, dcmp_parr);
    }

    #[test]
    fn hash_enc_is_identical_for_serial_and_parallel() {
        let key = gen_scalar();
        let text = (0..100).map(|_| random_string(16)).collect::<Vec<String>>();

        let seq = ECRistrettoSequential::default();
        let parr = ECRistrettoParallel::new();
        assert_eq!(
            parr.hash_encrypt_to_bytes(&text, &key),
            seq.hash_encrypt_to_bytes(&text, &key)
        );
        assert_eq!(
            parr.to_bytes(&parr.hash(&text)),
            seq.to_bytes(&seq.hash(&text))
        );
    }

    #[test]
    fn masking_commutes() {
        let (a, b, c) = (gen_scalar(), gen_scalar(), gen_scalar());
        let text = (0..20).map(|i| format!("r{}", i)).collect::<Vec<String>>();
        let parr = ECRistrettoParallel::new();

        let abc = parr
            .reencrypt_to_bytes(
                &parr
                    .reencrypt_to_bytes(&parr.hash_encrypt_to_bytes(&text, &a), &b)
                    .unwrap(),
                &c,
            )
            .unwrap();
        let cab = parr.to_bytes(
            &parr
                .to_points_encrypt(
                    &parr
                        .reencrypt_to_bytes(&parr.hash_encrypt_to_bytes(&text, &c), &a)
                        .unwrap(),
                    &b,
                )
                .unwrap(),
        );
        assert_eq!(abc, cab);
    }

    #[test]
    fn different_text_never_collides() {
        let key = gen_scalar();
        let parr = ECRistrettoParallel::new();
        let a = parr.hash_encrypt_to_bytes(&[String::from("r3")], &key);
        let b = parr.hash_encrypt_to_bytes(&[String::from("r7")], &key);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_points_are_rejected() {
        let seq = ECRistrettoSequential::new();
        let parr = ECRistrettoParallel::new();
        let good = seq.to_bytes(&gen_points(2));

        let short = vec![good[0].clone(), ByteBuffer::from_slice(&[1, 2, 3])];
        assert_eq!(
            parr.to_points(&short),
            Err(CryptoError::InvalidLength {
                index: 1,
                expected: POINT_SIZE,
                found: 3
            })
        );

        // all-ones is not a canonical field element encoding
        let bad = vec![ByteBuffer::from_slice(&[0xff; 32]), good[1].clone()];
        assert_eq!(
            seq.reencrypt_to_bytes(&bad, &gen_scalar()),
            Err(CryptoError::InvalidPoint { index: 0 })
        );
    }

    #[test]
    fn test_debug() {
        assert_eq!(
            format!("{:?}", ECRistrettoParallel::new()),
            "Ristretto EC ops parallel implementation"
        );
        assert_eq!(
            format!("{:?}", ECRistrettoSequential::new()),
            "Ristretto EC ops sequential implementation"
        );
    }
}
