// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use futures_util::future::BoxFuture;
use std::pin::pin;
use std::time::Duration;
use uuid::Uuid;

use super::registry::ProgressRegistry;
use super::session::{OperationError, OperationResult};

/// The external batch computation driven by the runner. Implementations own
/// the business work (parsing, validating, persisting); the runner owns
/// chunking, pacing, and progress reporting. Partial effects committed by a
/// failing batch are not undone here.
pub trait BatchJob: Send + 'static {
    /// Total number of work items, known before the first batch.
    fn total_items(&self) -> u64;

    /// Processes items `[offset, offset + len)` and reports how many were
    /// handled, optionally with a short log line for observers.
    fn run_batch(&mut self, offset: u64, len: u64)
        -> BoxFuture<'_, Result<BatchReport, OperationError>>;

    /// Consumes the job and produces the final result payload.
    fn finish(self: Box<Self>) -> Result<OperationResult, OperationError>;
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub processed: u64,
    pub log_line: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Items per batch; the runner yields to the scheduler between batches.
    pub batch_size: u64,
    /// Wall-clock bound on observer staleness: the session snapshot is
    /// republished at this interval even in the middle of a long batch.
    pub update_interval: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            update_interval: Duration::from_millis(250),
        }
    }
}

/// Drives one batch job against one session as an independent tokio task.
/// The runner never waits for subscribers; it publishes through the registry
/// whether or not anyone is listening.
pub struct OperationRunner;

impl OperationRunner {
    pub fn spawn(
        registry: ProgressRegistry,
        session_id: Uuid,
        job: Box<dyn BatchJob>,
        settings: RunnerSettings,
    ) {
        tokio::spawn(async move {
            drive(registry, session_id, job, settings).await;
        });
    }
}

async fn drive(
    registry: ProgressRegistry,
    session_id: Uuid,
    mut job: Box<dyn BatchJob>,
    settings: RunnerSettings,
) {
    let total = job.total_items();
    registry.start_session(session_id, total).await;
    log::debug!("Runner started for session {} ({} items)", session_id, total);

    let mut ticker = tokio::time::interval(settings.update_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Consume the immediate first tick so the first touch is a full interval
    // after the start event.
    ticker.tick().await;

    let mut offset = 0;
    while offset < total {
        let len = settings.batch_size.min(total - offset);
        let report = {
            let mut batch = pin!(job.run_batch(offset, len));
            loop {
                tokio::select! {
                    result = &mut batch => break result,
                    _ = ticker.tick() => registry.touch(session_id).await,
                }
            }
        };
        match report {
            Ok(report) => {
                // The slice is consumed whether or not every item in it was
                // usable; the report says how many counted as progress.
                offset += len;
                registry
                    .update(session_id, report.processed, None, report.log_line)
                    .await;
            }
            Err(error) => {
                log::warn!("Session {} batch failed: {}", session_id, error);
                registry.fail(session_id, error).await;
                return;
            }
        }
        // Stay cooperative between batches so other sessions and incoming
        // requests are not starved.
        tokio::task::yield_now().await;
    }

    match job.finish() {
        Ok(result) => {
            registry.complete(session_id, result).await;
            log::debug!("Runner completed session {}", session_id);
        }
        Err(error) => {
            log::warn!("Session {} failed to finalize: {}", session_id, error);
            registry.fail(session_id, error).await;
        }
    }
}

/// Backward-compatible synchronous path: runs the same batch loop with no
/// session and no event channel, returning the result directly.
pub async fn run_to_completion(
    mut job: Box<dyn BatchJob>,
    settings: &RunnerSettings,
) -> Result<OperationResult, OperationError> {
    let total = job.total_items();
    let mut offset = 0;
    while offset < total {
        let len = settings.batch_size.min(total - offset);
        job.run_batch(offset, len).await?;
        offset += len;
        tokio::task::yield_now().await;
    }
    job.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::registry::{ProgressRegistry, RegistrySettings};
    use crate::progress::session::{ImportOutcome, OperationKind, SessionStatus};

    /// Counts items in batches, optionally failing partway through.
    struct CountingJob {
        total: u64,
        counted: u64,
        fail_at: Option<u64>,
        batch_delay: Duration,
    }

    impl CountingJob {
        fn new(total: u64) -> Self {
            Self {
                total,
                counted: 0,
                fail_at: None,
                batch_delay: Duration::ZERO,
            }
        }
    }

    impl BatchJob for CountingJob {
        fn total_items(&self) -> u64 {
            self.total
        }

        fn run_batch(
            &mut self,
            offset: u64,
            len: u64,
        ) -> BoxFuture<'_, Result<BatchReport, OperationError>> {
            Box::pin(async move {
                if let Some(fail_at) = self.fail_at {
                    if offset >= fail_at {
                        return Err(OperationError::new("boom", "batch exploded"));
                    }
                }
                if !self.batch_delay.is_zero() {
                    tokio::time::sleep(self.batch_delay).await;
                }
                self.counted += len;
                Ok(BatchReport {
                    processed: len,
                    log_line: Some(format!("counted through {}", offset + len)),
                })
            })
        }

        fn finish(self: Box<Self>) -> Result<OperationResult, OperationError> {
            Ok(OperationResult::Import(ImportOutcome {
                imported: self.counted,
                skipped: 0,
                failed: 0,
                errors: vec![],
            }))
        }
    }

    fn small_batches() -> RunnerSettings {
        RunnerSettings {
            batch_size: 10,
            update_interval: Duration::from_millis(250),
        }
    }

    async fn collect_terminal(
        registry: &ProgressRegistry,
        id: uuid::Uuid,
    ) -> crate::progress::event::ProgressEvent {
        let mut subscription = registry.subscribe(id, "alice").await.unwrap();
        if subscription.snapshot.is_terminal() {
            return subscription.snapshot;
        }
        loop {
            match subscription.receiver.recv().await {
                Ok(event) if event.is_terminal() => return event,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("channel closed before terminal event: {}", err),
            }
        }
    }

    #[tokio::test]
    async fn runner_completes_job_in_batches() {
        let registry = ProgressRegistry::start(RegistrySettings::default());
        let id = registry.create("alice", OperationKind::Import).await.unwrap();

        OperationRunner::spawn(
            registry.clone(),
            id,
            Box::new(CountingJob::new(100)),
            small_batches(),
        );

        let terminal = collect_terminal(&registry, id).await;
        assert_eq!(terminal.status, SessionStatus::Completed);
        assert_eq!(terminal.total, 100);
        assert_eq!(terminal.processed, 100);
        assert_eq!(terminal.imported, Some(100));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn runner_fails_session_on_batch_error() {
        let registry = ProgressRegistry::start(RegistrySettings::default());
        let id = registry.create("alice", OperationKind::Import).await.unwrap();

        let mut job = CountingJob::new(100);
        job.fail_at = Some(50);
        OperationRunner::spawn(registry.clone(), id, Box::new(job), small_batches());

        let terminal = collect_terminal(&registry, id).await;
        assert_eq!(terminal.status, SessionStatus::Failed);
        assert_eq!(
            terminal.error.as_ref().map(|e| e.code.as_str()),
            Some("boom")
        );
        // Progress made before the failure is preserved on the terminal event.
        assert_eq!(terminal.processed, 50);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn runner_touches_session_across_a_long_batch() {
        let registry = ProgressRegistry::start(RegistrySettings::default());
        let id = registry.create("alice", OperationKind::Import).await.unwrap();

        let mut job = CountingJob::new(10);
        job.batch_delay = Duration::from_millis(150);
        let settings = RunnerSettings {
            batch_size: 10, // one long batch
            update_interval: Duration::from_millis(40),
        };
        let mut subscription = registry.subscribe(id, "alice").await.unwrap();
        OperationRunner::spawn(registry.clone(), id, Box::new(job), settings);

        let mut interim = 0;
        loop {
            let event = subscription.receiver.recv().await.unwrap();
            if event.is_terminal() {
                break;
            }
            if event.processed == 0 && event.status == SessionStatus::Running {
                interim += 1;
            }
        }
        // At least one touch frame arrived while the single batch was
        // in flight (plus the initial start event).
        assert!(interim >= 2, "expected touch frames, saw {}", interim);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn zero_item_job_completes_immediately() {
        let registry = ProgressRegistry::start(RegistrySettings::default());
        let id = registry.create("alice", OperationKind::Import).await.unwrap();
        OperationRunner::spawn(
            registry.clone(),
            id,
            Box::new(CountingJob::new(0)),
            small_batches(),
        );

        let terminal = collect_terminal(&registry, id).await;
        assert_eq!(terminal.status, SessionStatus::Completed);
        assert_eq!(terminal.imported, Some(0));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn run_to_completion_returns_result_directly() {
        let result = run_to_completion(Box::new(CountingJob::new(42)), &small_batches())
            .await
            .unwrap();
        match result {
            OperationResult::Import(outcome) => assert_eq!(outcome.imported, 42),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_to_completion_propagates_errors() {
        let mut job = CountingJob::new(42);
        job.fail_at = Some(0);
        let error = run_to_completion(Box::new(job), &small_batches())
            .await
            .unwrap_err();
        assert_eq!(error.code, "boom");
    }
}
