// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use serde::Serialize;

use super::session::{OperationError, OperationResult, ProgressSession, SessionStatus};

/// One progress event as it crosses the wire. The same shape serves as the
/// snapshot sent to a newly attached subscriber and as every live update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: SessionStatus,
    pub processed: u64,
    pub total: u64,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl ProgressEvent {
    /// Builds the wire view of a session's current state. A Pending session
    /// is reported as running: the runner is launched in the same request
    /// that created the session, so from the client's perspective the
    /// operation is already underway.
    pub fn from_session(session: &ProgressSession) -> Self {
        let status = match session.status {
            SessionStatus::Pending => SessionStatus::Running,
            other => other,
        };
        let log = if session.log.is_empty() {
            None
        } else {
            Some(session.log.iter().cloned().collect())
        };
        let mut event = Self {
            status,
            processed: session.processed,
            total: session.total,
            percentage: session.percentage(),
            estimated_time_remaining: session.eta_seconds(),
            current_operation: session.current_operation.clone(),
            log,
            imported: None,
            skipped: None,
            failed: None,
            errors: None,
            export_data: None,
            error: None,
        };
        match &session.result {
            Some(OperationResult::Import(outcome)) => {
                event.imported = Some(outcome.imported);
                event.skipped = Some(outcome.skipped);
                event.failed = Some(outcome.failed);
                if !outcome.errors.is_empty() {
                    event.errors = Some(outcome.errors.clone());
                }
            }
            Some(OperationResult::Export(payload)) => {
                event.export_data = Some(payload.records.clone());
            }
            None => {}
        }
        event.error = session.error.clone();
        event
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Encodes the event as a self-delimited SSE frame.
    pub fn frame(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(err) => {
                // Serialize failures cannot happen for this shape; keep the
                // stream alive regardless.
                log::error!("Failed to serialize progress event: {}", err);
                String::new()
            }
        }
    }
}

/// SSE comment frame emitted when no real event has been written for the
/// heartbeat interval, keeping idle connections open through intermediaries.
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";
