// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-run output handling.

use conductor_adapters::Agent;
use std::io;
use std::path::Path;

/// Where `output.md` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// The backend recognised its stream and extracted the answer.
    Normalized,
    /// Raw stdout, copied byte for byte.
    Raw,
}

/// Write `output.md` from the captured stdout.
///
/// A missing stdout file produces an empty output file.
pub fn write_output(
    agent: &dyn Agent,
    stdout_path: &Path,
    output_path: &Path,
) -> io::Result<OutputSource> {
    let raw = match std::fs::read(stdout_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    match agent.normalize_output(&String::from_utf8_lossy(&raw)) {
        Some(text) => {
            std::fs::write(output_path, format!("{text}\n"))?;
            Ok(OutputSource::Normalized)
        }
        None => {
            std::fs::write(output_path, &raw)?;
            Ok(OutputSource::Raw)
        }
    }
}

/// The last `n` lines of a text file, or `""` when it is missing or empty.
pub fn tail_lines(path: &Path, n: usize) -> String {
    let Ok(raw) = std::fs::read(path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&raw);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n").trim_end().to_string()
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
