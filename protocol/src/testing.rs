//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::thread;

use link::LinkContext;
use link::LinkDescriptor;

use crate::error::PsiError;

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| String::from(*s)).collect()
}

/// Runs `f` on one thread per input over an in-memory link
pub fn run_parties<F>(
    session: &str,
    inputs: Vec<Vec<String>>,
    f: F,
) -> Vec<Result<Vec<usize>, PsiError>>
where
    F: Fn(&mut LinkContext, Vec<String>) -> Result<Vec<usize>, PsiError>
        + Send
        + Clone
        + 'static,
{
    let desc = (0..inputs.len()).fold(LinkDescriptor::new(session), |d, r| {
        d.add_party(&format!("party-{}", r), "")
    });
    let handles = inputs
        .into_iter()
        .enumerate()
        .map(|(rank, items)| {
            let desc = desc.clone();
            let f = f.clone();
            thread::spawn(move || {
                let mut ctx = LinkContext::create_mem(&desc, rank)?;
                let res = f(&mut ctx, items);
                if let Err(e) = &res {
                    if !e.is_peer_abort() {
                        ctx.abort(&e.to_string());
                    }
                }
                res
            })
        })
        .collect::<Vec<_>>();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}
