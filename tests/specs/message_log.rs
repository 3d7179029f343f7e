// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message log specs
//!
//! Verify cross-process append ordering, crash tolerance and lock timeouts.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use conductor_core::Message;
use conductor_storage::{lock_exclusive, unlock, MessageLog, MessageLogError, MessageLogOptions};

use crate::prelude::*;

const WRITERS: usize = 10;
const PER_WRITER: usize = 100;

fn open(path: &Path) -> MessageLog {
    MessageLog::open(path, MessageLogOptions::default()).unwrap()
}

/// Appends `PER_WRITER` messages numbered 1.. tagged with this writer's run id.
#[test]
#[ignore = "spawned by ten_processes_append_without_interleaving"]
fn writer_helper() {
    let Some(args) = helper_args() else { return };
    let log = open(Path::new(arg(&args, "path")));
    let run_id = arg(&args, "run_id");
    for n in 1..=PER_WRITER {
        log.append(Message::new("FACT", "proj", n.to_string()).run_id(run_id)).unwrap();
    }
}

/// Writes half a record and dies without unwinding.
#[test]
#[ignore = "spawned by ten_processes_append_without_interleaving"]
fn crashing_writer_helper() {
    let Some(args) = helper_args() else { return };
    let mut file =
        std::fs::OpenOptions::new().append(true).create(true).open(arg(&args, "path")).unwrap();
    file.write_all(b"---\nmsg_id: MSG-torn\nts: 2026-01-02T03:04:05Z\ntype: FA").unwrap();
    std::process::abort();
}

/// Holds the exclusive lock for `hold_ms`, touching `ready` once it has it.
#[test]
#[ignore = "spawned by append_gives_up_at_the_lock_timeout"]
fn lock_holder_helper() {
    let Some(args) = helper_args() else { return };
    let file =
        std::fs::OpenOptions::new().append(true).create(true).open(arg(&args, "path")).unwrap();
    lock_exclusive(&file, Duration::from_secs(5)).unwrap();
    std::fs::write(arg(&args, "ready"), b"").unwrap();
    std::thread::sleep(Duration::from_millis(arg(&args, "hold_ms").parse().unwrap()));
    unlock(&file).unwrap();
}

#[test]
fn ten_processes_append_without_interleaving() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("TASK-MESSAGE-BUS.md");
    let path_arg = path.display().to_string();

    let crashing = helper("message_log::crashing_writer_helper", &[("path", &path_arg)]);
    assert_cmd::Command::from_std(crashing).assert().failure();

    let run_ids: Vec<String> = (0..WRITERS).map(|w| format!("writer-{w}")).collect();
    let children: Vec<_> = run_ids
        .iter()
        .map(|run_id| {
            helper("message_log::writer_helper", &[("path", &path_arg), ("run_id", run_id)])
                .spawn()
                .unwrap()
        })
        .collect();
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    let messages = open(&path).read("").unwrap();
    assert_eq!(messages.len(), WRITERS * PER_WRITER);

    let ids: HashSet<&str> = messages.iter().map(|m| m.msg_id.as_str()).collect();
    assert_eq!(ids.len(), messages.len(), "message ids must be unique");
    assert!(!ids.contains("MSG-torn"));

    let mut by_writer: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for msg in &messages {
        by_writer.entry(msg.run_id.as_str()).or_default().push(msg.body.parse().unwrap());
    }
    assert_eq!(by_writer.len(), WRITERS);
    let expected: Vec<usize> = (1..=PER_WRITER).collect();
    for (run_id, numbers) in by_writer {
        similar_asserts::assert_eq!(numbers, expected, "{run_id} out of order");
    }
}

#[test]
fn append_gives_up_at_the_lock_timeout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("PROJECT-MESSAGE-BUS.md");
    let ready = dir.path().join("locked");
    let mut holder = helper(
        "message_log::lock_holder_helper",
        &[
            ("path", &path.display().to_string()),
            ("ready", &ready.display().to_string()),
            ("hold_ms", "500"),
        ],
    )
    .spawn()
    .unwrap();
    assert!(wait_for(SPEC_WAIT_MAX_MS, || ready.exists()), "holder never locked the file");

    let options = MessageLogOptions::default()
        .lock_timeout(Duration::from_millis(100))
        .max_retries(1);
    let log = MessageLog::open(&path, options).unwrap();
    let start = Instant::now();
    let err = log.append(Message::new("FACT", "proj", "blocked")).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, MessageLogError::LockTimeout { attempts: 1, .. }), "{err}");
    assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");

    assert!(holder.wait().unwrap().success());
    log.append(Message::new("FACT", "proj", "after")).unwrap();
    assert_eq!(log.read("").unwrap().len(), 1);
}
