// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn lock_failure_names_the_other_daemon() {
    let err = LifecycleError::LockFailed(std::io::Error::from(std::io::ErrorKind::WouldBlock));
    assert_eq!(err.to_string(), "storage root is locked by another daemon");
}

#[tokio::test]
async fn app_state_shares_the_shutdown_token() {
    let dir = tempdir().unwrap();
    let StartupResult { daemon, .. } = startup(Config::for_root(dir.path())).await.unwrap();

    let app = daemon.app_state();
    assert!(!app.shutdown.is_cancelled());
    assert_eq!(app.config.root_dir, dir.path());

    daemon.shutdown().await;
    assert!(app.shutdown.is_cancelled());
}
