//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use common::files::write_rows_sorted;
use common::files::CsvRowWriter;
use common::timer;

use crate::bucket::Record;
use crate::config::OutputParams;
use crate::error::PsiError;

/// Destination of the matched records of one party
pub trait ResultSink {
    fn write_bucket(&mut self, records: Vec<Record>) -> Result<(), PsiError>;

    /// Completes the output, returns the number of records written
    fn finish(&mut self) -> Result<usize, PsiError>;
}

/// Keeps matched identities, handed back in input order
#[derive(Default, Debug)]
pub struct MemorySink {
    matched: Vec<(usize, String)>,
}

impl MemorySink {
    pub fn into_items(mut self) -> Vec<String> {
        self.matched.sort_unstable_by_key(|(ordinal, _)| *ordinal);
        self.matched.into_iter().map(|(_, key)| key).collect()
    }
}

impl ResultSink for MemorySink {
    fn write_bucket(&mut self, records: Vec<Record>) -> Result<(), PsiError> {
        self.matched
            .extend(records.into_iter().map(|r| (r.ordinal, r.key)));
        Ok(())
    }

    fn finish(&mut self) -> Result<usize, PsiError> {
        Ok(self.matched.len())
    }
}

/// Writes matched rows as CSV under the input header
///
/// Without `need_sort` rows are streamed bucket by bucket. With it they are
/// collected and written once, sorted by full row content, so the file is
/// byte-identical across runs.
pub struct CsvSink {
    path: String,
    headers: Vec<String>,
    writer: Option<CsvRowWriter>,
    pending: Option<Vec<Vec<String>>>,
}

impl CsvSink {
    pub fn create(output: &OutputParams, headers: &[String]) -> Result<CsvSink, PsiError> {
        let (writer, pending) = if output.need_sort {
            (None, Some(Vec::new()))
        } else {
            (Some(CsvRowWriter::create(&output.path, headers)?), None)
        };
        Ok(CsvSink {
            path: output.path.clone(),
            headers: headers.to_vec(),
            writer,
            pending,
        })
    }
}

impl ResultSink for CsvSink {
    fn write_bucket(&mut self, records: Vec<Record>) -> Result<(), PsiError> {
        if let Some(pending) = self.pending.as_mut() {
            pending.extend(records.into_iter().map(|r| r.row));
        } else if let Some(writer) = self.writer.as_mut() {
            for r in records {
                writer.write_row(&r.row)?;
            }
        } else {
            return Err(PsiError::Data(format!("{} is already finished", self.path)));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<usize, PsiError> {
        let mut t = timer::Timer::new_silent("output");
        let rows = match (self.pending.take(), self.writer.take()) {
            (Some(mut rows), _) => write_rows_sorted(&self.path, &self.headers, &mut rows)?,
            (None, Some(writer)) => writer.finish()?,
            (None, None) => {
                return Err(PsiError::Data(format!("{} is already finished", self.path)))
            }
        };
        t.qps(&format!("wrote {}", self.path), rows);
        Ok(rows)
    }
}
