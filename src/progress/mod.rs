// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

//! Progress-tracked long-running operation engine.
//!
//! A start request creates a session in the registry, launches a runner task,
//! and returns immediately; any number of streaming transports can attach to
//! the session's event channel and observe a snapshot followed by live
//! events, ending with the terminal event. Runners and transports never wait
//! for each other.

pub mod event;
pub mod registry;
pub mod runner;
pub mod session;
pub mod stream;

pub use event::ProgressEvent;
pub use registry::{
    AuthOutcome, ProgressRegistry, RegistrySettings, SubscribeError, Subscription,
};
pub use runner::{run_to_completion, BatchJob, BatchReport, OperationRunner, RunnerSettings};
pub use session::{
    ExportMetadata, ExportPayload, ImportOutcome, OperationError, OperationKind, OperationResult,
    SessionStatus,
};
pub use stream::sse_response;
