// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-count cursor carried in SSE event ids.

use std::fmt;

use super::LogStream;

/// Lines seen so far on each stream of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub stdout: u64,
    pub stderr: u64,
}

impl Cursor {
    pub fn new(stdout: u64, stderr: u64) -> Self {
        Self { stdout, stderr }
    }

    pub fn is_zero(&self) -> bool {
        self.stdout == 0 && self.stderr == 0
    }

    /// Lines counted on `stream`.
    pub fn get(&self, stream: LogStream) -> u64 {
        match stream {
            LogStream::Stdout => self.stdout,
            LogStream::Stderr => self.stderr,
        }
    }

    /// Count one more line on `stream`.
    pub fn advance(&mut self, stream: LogStream) {
        match stream {
            LogStream::Stdout => self.stdout += 1,
            LogStream::Stderr => self.stderr += 1,
        }
    }

    /// Parse a `Last-Event-ID` value.
    ///
    /// Accepts `s=N;e=M` (also `stdout:N,stderr:M` and `|` separators) and a
    /// bare integer, which applies to both streams. Anything unreadable is
    /// the zero cursor.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }
        if let Ok(n) = raw.parse::<u64>() {
            return Self::new(n, n);
        }
        let mut cursor = Self::default();
        for part in raw.split([';', ',', '|']).map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=').or_else(|| part.split_once(':')) else {
                continue;
            };
            let Ok(n) = value.trim().parse::<u64>() else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "s" | "stdout" | "out" => cursor.stdout = n,
                "e" | "stderr" | "err" => cursor.stderr = n,
                _ => {}
            }
        }
        cursor
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s={};e={}", self.stdout, self.stderr)
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
