// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for specs.

#![allow(dead_code)]

pub use std::path::{Path, PathBuf};
pub use std::time::{Duration, Instant};

pub use tempfile::{tempdir, TempDir};

/// Upper bound for polling waits.
pub const SPEC_WAIT_MAX_MS: u64 = 10_000;

/// Env var carrying a helper's arguments, as `key=value;...`.
pub const HELPER_ARGS: &str = "CONDUCTOR_SPEC_HELPER";

/// Poll `check` every 20ms until it holds or `max_ms` elapses.
pub fn wait_for(max_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Re-run this test binary so that only the ignored helper `name` executes.
pub fn helper(name: &str, args: &[(&str, &str)]) -> std::process::Command {
    let encoded: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let mut cmd = std::process::Command::new(std::env::current_exe().unwrap());
    cmd.args([name, "--exact", "--ignored", "--nocapture", "--test-threads=1"])
        .env(HELPER_ARGS, encoded.join(";"))
        .stdout(std::process::Stdio::null());
    cmd
}

/// Arguments passed to a helper, or `None` when run outside [`helper`].
pub fn helper_args() -> Option<Vec<(String, String)>> {
    let raw = std::env::var(HELPER_ARGS).ok()?;
    Some(
        raw.split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

pub fn arg<'a>(args: &'a [(String, String)], key: &str) -> &'a str {
    args.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).unwrap()
}
