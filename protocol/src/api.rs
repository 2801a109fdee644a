//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use link::LinkContext;

use crate::bucket::BucketSource;
use crate::bucket::FileBuckets;
use crate::bucket::MemoryBuckets;
use crate::config::PsiConfig;
use crate::engine::abort_on_error;
use crate::engine::PsiEngine;
use crate::error::PsiError;
use crate::fileio::CsvSink;
use crate::fileio::MemorySink;
use crate::report::Report;

/// PSI over identities held in memory
///
/// Returns this party's share of the intersection in input order: the
/// matched identities when it learns them, an empty vector otherwise.
pub fn mem_psi(
    ctx: &mut LinkContext,
    config: &PsiConfig,
    items: &[String],
) -> Result<Vec<String>, PsiError> {
    let mut source = MemoryBuckets::new(items);
    let mut sink = MemorySink::default();
    PsiEngine::new(ctx, config).run(&mut source, &mut sink)?;
    Ok(sink.into_items())
}

/// PSI between CSV files, every party writes its output file
///
/// Parties that do not learn the intersection get a file with the header
/// only.
pub fn bucket_psi(ctx: &mut LinkContext, config: &PsiConfig) -> Result<Report, PsiError> {
    let opened = match (&config.input, &config.output) {
        (Some(input), Some(output)) => FileBuckets::open(input)
            .and_then(|source| CsvSink::create(output, &source.headers()).map(|sink| (source, sink))),
        (None, _) => Err(PsiError::Config(String::from("input is required"))),
        (_, None) => Err(PsiError::Config(String::from("output is required"))),
    };
    let (mut source, mut sink) = opened.map_err(|e| abort_on_error(ctx, e))?;
    PsiEngine::new(ctx, config).run(&mut source, &mut sink)
}
