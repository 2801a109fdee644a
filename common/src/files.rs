//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

extern crate csv;

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use rayon::prelude::ParallelSliceMut;
use thiserror::Error;

/// Separator used to join the selected fields into one identity string.
/// ASCII unit separator never shows up in regular CSV content.
pub const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Error)]
pub enum FileError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("field `{field}` not found in header of {path}")]
    MissingField { field: String, path: String },
    #[error("{path}:{line}: expected {expected} fields, found {found}")]
    RowWidth {
        path: String,
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// One data row of an input file together with its identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRow {
    pub key: String,
    pub row: Vec<String>,
}

/// Joins the identity-forming values into a single key, values are taken
/// verbatim
pub fn join_key<S: AsRef<str>>(values: &[S]) -> String {
    let mut key = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(v.as_ref());
    }
    key
}

/// Lazy, non-restartable reader over the data rows of a CSV file
///
/// The header row names the columns, `select_fields` picks and orders
/// the columns forming the identity of a row.
///
/// ```no_run
/// use common::files::CsvRecordReader;
/// let fields = vec![String::from("id")];
/// let reader = CsvRecordReader::open("input.csv", &fields).unwrap();
/// for row in reader {
///     println!("{}", row.unwrap().key);
/// }
/// ```
pub struct CsvRecordReader {
    path: PathBuf,
    headers: Vec<String>,
    key_indices: Vec<usize>,
    records: csv::StringRecordsIntoIter<File>,
}

impl CsvRecordReader {
    pub fn open<T>(path: T, select_fields: &[String]) -> Result<CsvRecordReader, FileError>
    where
        T: AsRef<Path>,
    {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_path(path.as_ref())?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| String::from(h.trim()))
            .collect::<Vec<String>>();

        let key_indices = select_fields
            .iter()
            .map(|field| {
                headers
                    .iter()
                    .position(|h| h == field)
                    .ok_or_else(|| FileError::MissingField {
                        field: field.clone(),
                        path: path.as_ref().display().to_string(),
                    })
            })
            .collect::<Result<Vec<usize>, FileError>>()?;

        Ok(CsvRecordReader {
            path: path.as_ref().to_path_buf(),
            headers,
            key_indices,
            records: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn keyed(&self, record: csv::StringRecord) -> Result<KeyedRow, FileError> {
        if record.len() != self.headers.len() {
            return Err(FileError::RowWidth {
                path: self.path.display().to_string(),
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: self.headers.len(),
                found: record.len(),
            });
        }
        let row = record.iter().map(String::from).collect::<Vec<String>>();
        let key = join_key(
            &self
                .key_indices
                .iter()
                .map(|&i| row[i].as_str())
                .collect::<Vec<&str>>(),
        );
        Ok(KeyedRow { key, row })
    }
}

impl Iterator for CsvRecordReader {
    type Item = Result<KeyedRow, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.map_err(FileError::from).and_then(|r| self.keyed(r)))
    }
}

/// Counts data rows, header excluded
pub fn count_data_rows<T>(path: T) -> Result<usize, FileError>
where
    T: AsRef<Path>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut record = csv::ByteRecord::new();
    let mut n = 0;
    while reader.read_byte_record(&mut record)? {
        n += 1;
    }
    Ok(n)
}

/// Appends rows to a CSV file that starts with a header row
pub struct CsvRowWriter {
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvRowWriter {
    pub fn create<T>(path: T, headers: &[String]) -> Result<CsvRowWriter, FileError>
    where
        T: AsRef<Path>,
    {
        let mut writer = csv::WriterBuilder::new()
            .buffer_capacity(1024)
            .flexible(true)
            .from_path(path)?;
        writer.write_record(headers)?;
        Ok(CsvRowWriter { writer, rows: 0 })
    }

    pub fn write_row(&mut self, row: &[String]) -> Result<(), FileError> {
        self.writer.write_record(row)?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes the file and returns the number of data rows written
    pub fn finish(mut self) -> Result<usize, FileError> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

/// Sorts rows by their full content and writes them after the header.
/// Returns the number of data rows written.
pub fn write_rows_sorted<T>(
    path: T,
    headers: &[String],
    rows: &mut Vec<Vec<String>>,
) -> Result<usize, FileError>
where
    T: AsRef<Path>,
{
    rows.par_sort_unstable();
    let mut wr = CsvRowWriter::create(path, headers)?;
    for row in rows.drain(..) {
        wr.write_row(&row)?;
    }
    wr.finish()
}
