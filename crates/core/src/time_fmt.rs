// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time formatting helpers.

use chrono::{DateTime, Utc};

/// Compact `YYYYMMDD-HHMMSS` stamp used in file names.
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}
