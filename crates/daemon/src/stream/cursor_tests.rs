// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    canonical = { "s=12;e=3", 12, 3 },
    spaced = { " s = 4 ; e = 9 ", 4, 9 },
    long_names = { "stdout:5,stderr:6", 5, 6 },
    piped = { "out=1|err=2", 1, 2 },
    only_stderr = { "e=7", 0, 7 },
    bare_integer = { "42", 42, 42 },
    empty = { "", 0, 0 },
    garbage = { "not-a-cursor", 0, 0 },
    bad_number = { "s=x;e=2", 0, 2 },
    unknown_key = { "q=5;s=1", 1, 0 },
)]
fn parses_last_event_id(raw: &str, stdout: u64, stderr: u64) {
    assert_eq!(Cursor::parse(raw), Cursor::new(stdout, stderr));
}

#[test]
fn displays_in_event_id_form() {
    assert_eq!(Cursor::new(10, 0).to_string(), "s=10;e=0");
    assert_eq!(Cursor::parse(&Cursor::new(3, 8).to_string()), Cursor::new(3, 8));
}

#[test]
fn advance_counts_per_stream() {
    let mut cursor = Cursor::default();
    assert!(cursor.is_zero());
    cursor.advance(LogStream::Stdout);
    cursor.advance(LogStream::Stdout);
    cursor.advance(LogStream::Stderr);
    assert_eq!(cursor.get(LogStream::Stdout), 2);
    assert_eq!(cursor.get(LogStream::Stderr), 1);
}
