// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Most recent log lines retained per session. Older lines are discarded and
/// never replayed to late subscribers.
pub const MAX_LOG_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Import,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub record_count: u64,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub records: serde_json::Value,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Import(ImportOutcome),
    Export(ExportPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: String,
    pub message: String,
}

impl OperationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn stalled(timeout: Duration) -> Self {
        Self::new(
            "stall_timeout",
            format!("No progress update for {} seconds", timeout.as_secs()),
        )
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for OperationError {}

/// One trackable long-running operation. Mutated exclusively through the
/// registry actor; transitions are monotonic and terminal states are final.
#[derive(Debug)]
pub struct ProgressSession {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: OperationKind,
    pub status: SessionStatus,
    pub processed: u64,
    pub total: u64,
    pub started_at: Instant,
    pub last_update: Instant,
    pub log: VecDeque<String>,
    pub current_operation: Option<String>,
    pub result: Option<OperationResult>,
    pub error: Option<OperationError>,
}

impl ProgressSession {
    pub fn new(owner_id: String, kind: OperationKind) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            status: SessionStatus::Pending,
            processed: 0,
            total: 0,
            started_at: now,
            last_update: now,
            log: VecDeque::new(),
            current_operation: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Percentage of completed work, always in [0, 100]. A session with an
    /// unknown total reports 0.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Linear estimate of the remaining seconds, present only once at least
    /// one item is processed and the total is known.
    pub fn eta_seconds(&self) -> Option<u64> {
        if self.status != SessionStatus::Running || self.processed == 0 || self.total == 0 {
            return None;
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let remaining = self.total.saturating_sub(self.processed) as f64;
        Some((elapsed * remaining / self.processed.max(1) as f64).round() as u64)
    }

    /// Pending -> Running. Returns false (and changes nothing) from any other
    /// state.
    pub fn start(&mut self, total: u64) -> bool {
        if self.status != SessionStatus::Pending {
            log::debug!(
                "Ignoring start() on session {} in state {:?}",
                self.id,
                self.status
            );
            return false;
        }
        self.status = SessionStatus::Running;
        self.total = total;
        let now = Instant::now();
        self.started_at = now;
        self.last_update = now;
        true
    }

    /// Records a progress increment. Only valid while Running; calls in any
    /// other state are logged no-ops.
    pub fn update(&mut self, delta: u64, total: Option<u64>, log_line: Option<String>) -> bool {
        if self.status != SessionStatus::Running {
            log::debug!(
                "Ignoring update() on session {} in state {:?}",
                self.id,
                self.status
            );
            return false;
        }
        if let Some(total) = total {
            self.total = total;
        }
        self.processed = self.processed.saturating_add(delta);
        if self.total > 0 && self.processed > self.total {
            self.processed = self.total;
        }
        if let Some(line) = log_line {
            self.push_log(line);
        }
        self.last_update = Instant::now();
        true
    }

    /// Running -> Completed. Terminal.
    pub fn complete(&mut self, result: OperationResult) -> bool {
        if self.status != SessionStatus::Running {
            log::debug!(
                "Ignoring complete() on session {} in state {:?}",
                self.id,
                self.status
            );
            return false;
        }
        // A completed operation accounts for all of its work.
        if self.total > 0 {
            self.processed = self.total;
        }
        self.status = SessionStatus::Completed;
        self.result = Some(result);
        self.last_update = Instant::now();
        true
    }

    /// Pending|Running -> Failed. Terminal. Covers setup failures before the
    /// first batch as well as mid-run errors.
    pub fn fail(&mut self, error: OperationError) -> bool {
        if self.is_terminal() {
            log::debug!(
                "Ignoring fail() on session {} in state {:?}",
                self.id,
                self.status
            );
            return false;
        }
        self.status = SessionStatus::Failed;
        self.error = Some(error);
        self.last_update = Instant::now();
        true
    }

    fn push_log(&mut self, line: String) {
        self.current_operation = Some(line.clone());
        self.log.push_back(line);
        while self.log.len() > MAX_LOG_LINES {
            self.log.pop_front();
        }
    }
}
