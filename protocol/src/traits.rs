//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use link::LinkContext;

use crate::error::PsiError;

/// One PSI variant, run to completion on one bucket at a time
pub trait BucketProtocol {
    fn name(&self) -> &'static str;

    /// Indices into `items` of the identities found on every party
    ///
    /// Only the leader learns them, every other rank gets an empty vector.
    fn run_bucket(
        &mut self,
        ctx: &mut LinkContext,
        bucket: usize,
        items: &[String],
    ) -> Result<Vec<usize>, PsiError>;
}
