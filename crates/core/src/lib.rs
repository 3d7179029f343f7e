// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-core: shared data model for the run orchestration core

pub mod macros;

pub mod clock;
pub mod id;
pub mod message;
pub mod paths;
pub mod run;
pub mod task;
pub mod time_fmt;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::{generate_message_id, generate_run_id};
pub use message::{Link, Message, MessageType, Parent};
#[cfg(any(test, feature = "test-support"))]
pub use run::RunInfoBuilder;
pub use run::{classify_exit_code, RunInfo, RunStatus, EXIT_CODE_PENDING, RUN_INFO_VERSION};
pub use task::{generate_task_id, validate_project_id, validate_task_id, IdError, TaskStatus};
pub use time_fmt::format_stamp;
