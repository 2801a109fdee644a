//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Hash partitioning of the input into buckets
//!
//! Every party computes the same bucket for the same identity, so the
//! protocols only ever compare items of equal bucket index.

use std::fs::File;
use std::path::PathBuf;

use common::files::count_data_rows;
use common::files::CsvRecordReader;
use common::timer;
use common::vectors::first_occurrences;
use rayon::iter::IntoParallelRefIterator;
use rayon::iter::ParallelIterator;
use sha2::Digest;
use sha2::Sha256;
use tempfile::TempDir;

use crate::config::InputParams;
use crate::error::PsiError;

/// Stable bucket of an identity: first 8 bytes of its SHA-256, little
/// endian, modulo the bucket count
pub fn bucket_index(identity: &str, bucket_count: usize) -> usize {
    let digest = Sha256::digest(identity.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(prefix) % bucket_count as u64) as usize
}

/// `max(1, ceil(max_items / bucket_size))`
pub fn bucket_count(max_items: usize, bucket_size: usize) -> usize {
    (max_items / bucket_size + usize::from(max_items % bucket_size != 0)).max(1)
}

/// One input row: position in the input, identity, full row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub ordinal: usize,
    pub key: String,
    pub row: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Bucket {
    pub index: usize,
    pub records: Vec<Record>,
}

impl Bucket {
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key.clone()).collect()
    }

    /// Keeps the first record of every identity
    fn dedup(&mut self) {
        let (idx, dups) = first_occurrences(
            &self
                .records
                .iter()
                .map(|r| r.key.as_str())
                .collect::<Vec<&str>>(),
        );
        if dups > 0 {
            warn!(
                "bucket {}: {} rows repeat an earlier identity, keeping the first one",
                self.index, dups
            );
            let mut keep = idx.into_iter().peekable();
            let records = std::mem::take(&mut self.records);
            self.records = records
                .into_iter()
                .enumerate()
                .filter(|(i, _)| {
                    if keep.peek() == Some(i) {
                        keep.next();
                        true
                    } else {
                        false
                    }
                })
                .map(|(_, r)| r)
                .collect();
        }
    }
}

/// Input of one party, handed out one bucket at a time
pub trait BucketSource {
    /// Rows in the input, duplicates included
    fn item_count(&self) -> usize;

    /// Column names of the rows
    fn headers(&self) -> Vec<String>;

    fn partition(&mut self, bucket_count: usize) -> Result<(), PsiError>;

    /// Deduplicated records of bucket `index`, in input order
    fn bucket(&mut self, index: usize) -> Result<Bucket, PsiError>;
}

/// Identities held in memory
pub struct MemoryBuckets {
    items: Vec<String>,
    buckets: Vec<Vec<usize>>,
}

impl MemoryBuckets {
    pub fn new(items: &[String]) -> MemoryBuckets {
        MemoryBuckets {
            items: items.to_vec(),
            buckets: Vec::new(),
        }
    }
}

impl BucketSource for MemoryBuckets {
    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn headers(&self) -> Vec<String> {
        Vec::new()
    }

    fn partition(&mut self, bucket_count: usize) -> Result<(), PsiError> {
        let assignment = self
            .items
            .par_iter()
            .map(|item| bucket_index(item, bucket_count))
            .collect::<Vec<usize>>();
        self.buckets = vec![Vec::new(); bucket_count];
        for (ordinal, b) in assignment.into_iter().enumerate() {
            self.buckets[b].push(ordinal);
        }
        Ok(())
    }

    fn bucket(&mut self, index: usize) -> Result<Bucket, PsiError> {
        let ordinals = self.buckets.get(index).ok_or_else(|| {
            PsiError::Data(format!("bucket {} out of {}", index, self.buckets.len()))
        })?;
        let mut bucket = Bucket {
            index,
            records: ordinals
                .iter()
                .map(|&ordinal| Record {
                    ordinal,
                    key: self.items[ordinal].clone(),
                    row: Vec::new(),
                })
                .collect(),
        };
        bucket.dedup();
        Ok(bucket)
    }
}

/// Rows of a CSV file, spilled into one temporary CSV per bucket
///
/// The header and the selected fields are checked and the rows counted on
/// creation, `partition` does the second pass over the file.
pub struct FileBuckets {
    path: PathBuf,
    select_fields: Vec<String>,
    headers: Vec<String>,
    item_count: usize,
    spill: Option<TempDir>,
    bucket_count: usize,
}

impl FileBuckets {
    pub fn open(input: &InputParams) -> Result<FileBuckets, PsiError> {
        let reader = CsvRecordReader::open(&input.path, &input.select_fields)?;
        let headers = reader.headers().to_vec();
        let item_count = count_data_rows(&input.path)?;
        info!(
            "input {}: {} rows, {} columns, identity {:?}",
            input.path,
            item_count,
            headers.len(),
            input.select_fields
        );
        Ok(FileBuckets {
            path: PathBuf::from(&input.path),
            select_fields: input.select_fields.clone(),
            headers,
            item_count,
            spill: None,
            bucket_count: 0,
        })
    }

    fn spill_path(&self, index: usize) -> Result<PathBuf, PsiError> {
        let dir = self
            .spill
            .as_ref()
            .ok_or_else(|| PsiError::Data(String::from("input is not partitioned")))?;
        Ok(dir.path().join(format!("bucket_{}.csv", index)))
    }
}

impl BucketSource for FileBuckets {
    fn item_count(&self) -> usize {
        self.item_count
    }

    fn headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn partition(&mut self, bucket_count: usize) -> Result<(), PsiError> {
        let mut t = timer::Timer::new_silent("partition");
        let dir = tempfile::Builder::new().prefix("psi-buckets").tempdir()?;
        let mut writers = (0..bucket_count)
            .map(|i| {
                csv::WriterBuilder::new()
                    .has_headers(false)
                    .buffer_capacity(8 * 1024)
                    .from_path(dir.path().join(format!("bucket_{}.csv", i)))
            })
            .collect::<Result<Vec<csv::Writer<File>>, csv::Error>>()?;

        let mut rows = 0;
        for (ordinal, record) in CsvRecordReader::open(&self.path, &self.select_fields)?.enumerate() {
            let record = record?;
            let b = bucket_index(&record.key, bucket_count);
            let ordinal = ordinal.to_string();
            writers[b].write_record(
                std::iter::once(ordinal.as_str())
                    .chain(std::iter::once(record.key.as_str()))
                    .chain(record.row.iter().map(|s| s.as_str())),
            )?;
            rows += 1;
        }
        for w in writers.iter_mut() {
            w.flush()?;
        }
        if rows != self.item_count {
            return Err(PsiError::Data(format!(
                "{} changed while reading: {} rows counted, {} read",
                self.path.display(),
                self.item_count,
                rows
            )));
        }
        t.qps(&format!("{} buckets", bucket_count), rows);

        self.spill = Some(dir);
        self.bucket_count = bucket_count;
        Ok(())
    }

    fn bucket(&mut self, index: usize) -> Result<Bucket, PsiError> {
        if index >= self.bucket_count {
            return Err(PsiError::Data(format!(
                "bucket {} out of {}",
                index, self.bucket_count
            )));
        }
        let path = self.spill_path(index)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let mut records = Vec::new();
        for r in reader.records() {
            let r = r?;
            let mut fields = r.iter();
            let ordinal = fields
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| PsiError::Data(format!("corrupt spill file {}", path.display())))?;
            let key = fields
                .next()
                .map(String::from)
                .ok_or_else(|| PsiError::Data(format!("corrupt spill file {}", path.display())))?;
            records.push(Record {
                ordinal,
                key,
                row: fields.map(String::from).collect(),
            });
        }
        let mut bucket = Bucket { index, records };
        bucket.dedup();
        Ok(bucket)
    }
}
