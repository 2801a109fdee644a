//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use link::LinkContext;
use link::LinkDescriptor;
use link::LinkError;
use link::LinkOptions;
use protocol::bucket_psi;
use protocol::config::ProtocolKind;
use protocol::PsiConfig;
use protocol::PsiError;
use protocol::Report;
use tempfile::TempDir;

/// `id,value` rows for every multiple of `k` below 1000, shuffled a bit so
/// that sorted output differs from input order
fn write_input(dir: &Path, name: &str, k: usize) -> String {
    let path = dir.join(name);
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "id,value").unwrap();
    let mut ids = (0..1000).filter(|i| i % k == 0).collect::<Vec<_>>();
    ids.reverse();
    for i in ids {
        writeln!(f, "u{},{}", i, i * k).unwrap();
    }
    path.display().to_string()
}

fn data_rows(path: &str) -> usize {
    fs::read_to_string(path).unwrap().lines().count() - 1
}

fn run(session: &str, configs: Vec<PsiConfig>) -> Vec<Result<Report, PsiError>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let desc = (0..configs.len()).fold(LinkDescriptor::new(session), |d, r| {
        d.add_party(&format!("party-{}", r), "")
    });
    let handles = configs
        .into_iter()
        .enumerate()
        .map(|(rank, config)| {
            let desc = desc.clone();
            thread::spawn(move || {
                let mut ctx = LinkContext::create_mem(&desc, rank)?;
                bucket_psi(&mut ctx, &config)
            })
        })
        .collect::<Vec<_>>();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

struct Party {
    input: String,
    output: String,
}

fn parties(dir: &Path, ks: &[usize]) -> Vec<Party> {
    ks.iter()
        .enumerate()
        .map(|(rank, &k)| Party {
            input: write_input(dir, &format!("in_{}.csv", rank), k),
            output: dir.join(format!("out_{}.csv", rank)).display().to_string(),
        })
        .collect()
}

fn configs(
    kind: ProtocolKind,
    parties: &[Party],
    receiver: Option<usize>,
    need_sort: bool,
) -> Vec<PsiConfig> {
    parties
        .iter()
        .map(|p| {
            let b = PsiConfig::builder(kind)
                .input(&p.input, &["id"])
                .output(&p.output, need_sort)
                .bucket_size(100);
            let b = match receiver {
                Some(r) => b.receiver_rank(r),
                None => b.broadcast_result(true),
            };
            b.build().unwrap()
        })
        .collect()
}

#[test]
fn test_counts_match_files() {
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[3, 7]);
    for kind in [ProtocolKind::Ecdh2pc, ProtocolKind::Kkrt2pc] {
        let out = run(
            &format!("files-{}", kind.name()),
            configs(kind, &ps, Some(1), false),
        );
        let reports = out.into_iter().map(|r| r.unwrap()).collect::<Vec<_>>();
        assert_eq!(reports[0].original_count, 334);
        assert_eq!(reports[1].original_count, 143);
        assert_eq!(reports[0].intersection_count, 0);
        assert_eq!(reports[1].intersection_count, 48);
        for (p, r) in ps.iter().zip(reports.iter()) {
            assert_eq!(r.original_count, data_rows(&p.input));
            assert_eq!(r.intersection_count, data_rows(&p.output));
        }
        assert_eq!(fs::read_to_string(&ps[0].output).unwrap(), "id,value\n");
    }
}

#[test]
fn test_sorted_output_is_stable() {
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[2, 3, 5]);
    let first = run("sorted-1", configs(ProtocolKind::Ecdh3pc, &ps, None, true));
    let contents = ps
        .iter()
        .map(|p| fs::read(&p.output).unwrap())
        .collect::<Vec<_>>();
    let second = run("sorted-2", configs(ProtocolKind::Ecdh3pc, &ps, None, true));

    for (a, b) in first.into_iter().zip(second.into_iter()) {
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(a.intersection_count, 34);
    }
    for (p, before) in ps.iter().zip(contents.iter()) {
        assert_eq!(&fs::read(&p.output).unwrap(), before);
    }

    let text = String::from_utf8(contents[0].clone()).unwrap();
    let rows = text.lines().skip(1).collect::<Vec<_>>();
    let mut sorted = rows.clone();
    sorted.sort_unstable();
    assert_eq!(rows, sorted);
    assert!(rows.contains(&"u0,0") && rows.contains(&"u990,1980"));
}

#[test]
fn test_repeated_runs_give_same_reports() {
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[4, 6]);
    let a = run("repeat-1", configs(ProtocolKind::Kkrt2pc, &ps, None, false));
    let b = run("repeat-2", configs(ProtocolKind::Kkrt2pc, &ps, None, false));
    for (a, b) in a.into_iter().zip(b.into_iter()) {
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(a.intersection_count, 84);
    }
}

#[test]
fn test_json_config_file() {
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[3, 7]);
    let cfgs = ps
        .iter()
        .enumerate()
        .map(|(rank, p)| {
            let path = dir.path().join(format!("config_{}.json", rank));
            let json = format!(
                r#"{{
                    "protocol": "DP_2PC",
                    "broadcast_result": false,
                    "receiver_rank": 0,
                    "curve": "CURVE_25519",
                    "input": {{"path": "{}", "select_fields": ["id"]}},
                    "output": {{"path": "{}", "need_sort": true}},
                    "bucket_size": 100,
                    "extra": {{"bob_sub_sampling": 0.9, "epsilon": 3.0}}
                }}"#,
                p.input, p.output
            );
            fs::write(&path, json).unwrap();
            PsiConfig::from_json_file(&path).unwrap()
        })
        .collect::<Vec<_>>();
    let out = run("json-dp", cfgs);
    let leader = out[0].as_ref().unwrap();
    assert_eq!(leader.original_count, 334);
    assert!(leader.intersection_count <= 48);
    assert_eq!(leader.intersection_count, data_rows(&ps[0].output));
    assert_eq!(out[1].as_ref().unwrap().intersection_count, 0);
}

#[test]
fn test_missing_field_fails_both_parties() {
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[3, 7]);
    let mut cfgs = configs(ProtocolKind::Ecdh2pc, &ps, Some(0), false);
    cfgs[1] = PsiConfig::builder(ProtocolKind::Ecdh2pc)
        .input(&ps[1].input, &["email"])
        .output(&ps[1].output, false)
        .receiver_rank(0)
        .bucket_size(100)
        .build()
        .unwrap();
    let out = run("missing-field", cfgs);
    assert!(matches!(out[1], Err(PsiError::Data(_))));
    match &out[0] {
        Err(e) => assert!(
            e.is_peer_abort() || matches!(e, PsiError::Link(LinkError::Disconnected { .. })),
            "{}",
            e
        ),
        Ok(_) => panic!("run succeeded without a peer"),
    }
}

#[test]
fn test_input_and_output_are_required() {
    let config = PsiConfig::builder(ProtocolKind::Ecdh2pc)
        .receiver_rank(0)
        .build()
        .unwrap();
    let out = run("no-files", vec![config.clone(), config]);
    assert!(out.iter().all(|r| matches!(r, Err(PsiError::Config(_)))));
}

#[test]
fn test_bad_row_aborts_every_party() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let ps = parties(dir.path(), &[2, 3, 5]);
    let mut f = fs::OpenOptions::new().append(true).open(&ps[2].input).unwrap();
    writeln!(f, "u1,2,3").unwrap();
    drop(f);

    let desc = (0..3)
        .fold(LinkDescriptor::new("bad-row-3pc"), |d, r| {
            d.add_party(&format!("party-{}", r), "")
        })
        .with_options(LinkOptions {
            recv_timeout_ms: 20_000,
            ..Default::default()
        });
    // contexts stay open until every party is done, so only abort frames
    // can release a blocked rank
    let done = Arc::new(Barrier::new(3));
    let handles = configs(ProtocolKind::Ecdh3pc, &ps, None, false)
        .into_iter()
        .enumerate()
        .map(|(rank, config)| {
            let desc = desc.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut ctx = LinkContext::create_mem(&desc, rank).unwrap();
                let start = Instant::now();
                let res = bucket_psi(&mut ctx, &config);
                let elapsed = start.elapsed();
                done.wait();
                (res, elapsed)
            })
        })
        .collect::<Vec<_>>();
    let out = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>();

    match &out[2].0 {
        Err(e) => assert!(!e.is_peer_abort(), "{}", e),
        Ok(_) => panic!("malformed input accepted"),
    }
    for (res, elapsed) in out[..2].iter() {
        match res {
            Err(e) => assert!(e.is_peer_abort(), "{}", e),
            Ok(_) => panic!("run succeeded next to a failed party"),
        }
        assert!(*elapsed < Duration::from_secs(10));
    }
}
