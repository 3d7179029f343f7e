// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear(names: &[&str]) {
    for name in names {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn root_dir_prefers_explicit_override() {
    std::env::set_var("CONDUCTOR_ROOT", "/srv/conductor");
    assert_eq!(root_dir().unwrap(), PathBuf::from("/srv/conductor"));
    clear(&["CONDUCTOR_ROOT"]);
}

#[test]
#[serial]
fn root_dir_falls_back_to_xdg_state_home() {
    clear(&["CONDUCTOR_ROOT"]);
    let previous = std::env::var("XDG_STATE_HOME").ok();
    std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-state");
    assert_eq!(root_dir().unwrap(), PathBuf::from("/tmp/xdg-state/conductor/runs"));
    match previous {
        Some(v) => std::env::set_var("XDG_STATE_HOME", v),
        None => std::env::remove_var("XDG_STATE_HOME"),
    }
}

#[test]
#[serial]
fn durations_parse_millis_and_ignore_garbage() {
    std::env::set_var("CONDUCTOR_STREAM_POLL_MS", "25");
    std::env::set_var("CONDUCTOR_HEARTBEAT_MS", "soon");
    assert_eq!(stream_poll_interval(), Duration::from_millis(25));
    assert_eq!(heartbeat_interval(), Duration::from_secs(30));
    clear(&["CONDUCTOR_STREAM_POLL_MS", "CONDUCTOR_HEARTBEAT_MS"]);
}

#[test]
#[serial]
fn zero_max_clients_keeps_the_default() {
    std::env::set_var("CONDUCTOR_MAX_CLIENTS", "0");
    assert_eq!(max_clients_per_run(), 10);
    std::env::set_var("CONDUCTOR_MAX_CLIENTS", "3");
    assert_eq!(max_clients_per_run(), 3);
    clear(&["CONDUCTOR_MAX_CLIENTS"]);
}

#[test]
#[serial]
fn message_log_options_layer_over_defaults() {
    std::env::set_var("CONDUCTOR_BUS_LOCK_TIMEOUT_MS", "250");
    std::env::set_var("CONDUCTOR_BUS_FSYNC", "true");
    std::env::set_var("CONDUCTOR_BUS_ROTATE_BYTES", "4096");
    let opts = message_log_options();
    assert_eq!(opts.lock_timeout, Duration::from_millis(250));
    assert!(opts.fsync);
    assert_eq!(opts.auto_rotate_bytes, Some(4096));
    assert_eq!(opts.max_retries, MessageLogOptions::default().max_retries);
    clear(&[
        "CONDUCTOR_BUS_LOCK_TIMEOUT_MS",
        "CONDUCTOR_BUS_FSYNC",
        "CONDUCTOR_BUS_ROTATE_BYTES",
    ]);
}
