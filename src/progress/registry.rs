// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use super::event::ProgressEvent;
use super::session::{OperationError, OperationKind, OperationResult, ProgressSession};

const REGISTRY_CHANNEL_DEPTH: usize = 64;

/// Tuning for the registry actor. Durations rather than raw config integers
/// so tests can run the sweeper on a millisecond clock.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Force-fail a session with no update for this long.
    pub stall_timeout: Duration,
    /// Keep terminal sessions around this long so late subscribers can still
    /// collect the terminal event.
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// Broadcast buffer per session; slow subscribers lag and lose
    /// intermediate progress events, never the terminal one.
    pub subscriber_buffer: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(300),
            retention: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            subscriber_buffer: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    Forbidden,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    NotFound,
    Forbidden,
}

/// The registry actor has shut down and can no longer allocate sessions.
#[derive(Debug)]
pub struct RegistryClosed;

impl fmt::Display for RegistryClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Progress registry is unavailable")
    }
}

impl std::error::Error for RegistryClosed {}

/// Snapshot plus live receiver handed to a newly attached subscriber.
#[derive(Debug)]
pub struct Subscription {
    pub snapshot: ProgressEvent,
    pub receiver: broadcast::Receiver<ProgressEvent>,
}

/// Process-wide store of progress sessions. All state lives inside one actor
/// task; commands are serialized through a single queue, which is what
/// guarantees per-session event ordering and keeps critical sections away
/// from I/O. The handle is cheap to clone.
#[derive(Clone)]
pub struct ProgressRegistry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl ProgressRegistry {
    pub fn start(settings: RegistrySettings) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_DEPTH);
        tokio::spawn(async move {
            let mut state = RegistryState::new(settings);
            state.run(receiver).await;
            log::debug!("Progress registry stopped");
        });
        Self { sender }
    }

    /// Stops the actor. Every session entry and its channel is dropped,
    /// which ends all subscriber streams.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(RegistryCommand::Shutdown).await;
    }

    /// Allocates a fresh Pending session owned by `owner_id`.
    pub async fn create(
        &self,
        owner_id: impl Into<String>,
        kind: OperationKind,
    ) -> Result<Uuid, RegistryClosed> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Create {
                owner_id: owner_id.into(),
                kind,
                reply,
            })
            .await
            .map_err(|_| RegistryClosed)?;
        response.await.map_err(|_| RegistryClosed)
    }

    /// Current wire view of a session, if it is still live.
    pub async fn snapshot(&self, id: Uuid) -> Option<ProgressEvent> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Snapshot { id, reply })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    /// Distinguishes "not found" from "forbidden" for a caller.
    pub async fn authorize(&self, id: Uuid, owner_id: &str) -> AuthOutcome {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Authorize {
                id,
                owner_id: owner_id.to_string(),
                reply,
            })
            .await
            .is_err()
        {
            return AuthOutcome::NotFound;
        }
        response.await.unwrap_or(AuthOutcome::NotFound)
    }

    /// Attaches a subscriber: authorization, snapshot, and live receiver in
    /// one serialized step so no event can fall between snapshot and attach.
    pub async fn subscribe(&self, id: Uuid, owner_id: &str) -> Result<Subscription, SubscribeError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Subscribe {
                id,
                owner_id: owner_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| SubscribeError::NotFound)?;
        response.await.unwrap_or(Err(SubscribeError::NotFound))
    }

    pub async fn start_session(&self, id: Uuid, total: u64) {
        let _ = self.sender.send(RegistryCommand::Start { id, total }).await;
    }

    pub async fn update(&self, id: Uuid, delta: u64, total: Option<u64>, log_line: Option<String>) {
        let _ = self
            .sender
            .send(RegistryCommand::Update {
                id,
                delta,
                total,
                log_line,
            })
            .await;
    }

    pub async fn complete(&self, id: Uuid, result: OperationResult) {
        let _ = self
            .sender
            .send(RegistryCommand::Complete { id, result })
            .await;
    }

    pub async fn fail(&self, id: Uuid, error: OperationError) {
        let _ = self.sender.send(RegistryCommand::Fail { id, error }).await;
    }

    /// Republishes the current snapshot (with a refreshed ETA) without
    /// mutating the session. Used by the runner's interval tick so observers
    /// never wait longer than the update interval for a frame.
    pub async fn touch(&self, id: Uuid) {
        let _ = self.sender.send(RegistryCommand::Touch { id }).await;
    }

    /// Idempotent deletion.
    pub async fn remove(&self, id: Uuid) {
        let _ = self.sender.send(RegistryCommand::Remove { id }).await;
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Count { reply })
            .await
            .is_err()
        {
            return 0;
        }
        response.await.unwrap_or(0)
    }
}

enum RegistryCommand {
    Create {
        owner_id: String,
        kind: OperationKind,
        reply: oneshot::Sender<Uuid>,
    },
    Snapshot {
        id: Uuid,
        reply: oneshot::Sender<Option<ProgressEvent>>,
    },
    Authorize {
        id: Uuid,
        owner_id: String,
        reply: oneshot::Sender<AuthOutcome>,
    },
    Subscribe {
        id: Uuid,
        owner_id: String,
        reply: oneshot::Sender<Result<Subscription, SubscribeError>>,
    },
    Start {
        id: Uuid,
        total: u64,
    },
    Update {
        id: Uuid,
        delta: u64,
        total: Option<u64>,
        log_line: Option<String>,
    },
    Complete {
        id: Uuid,
        result: OperationResult,
    },
    Fail {
        id: Uuid,
        error: OperationError,
    },
    Touch {
        id: Uuid,
    },
    Remove {
        id: Uuid,
    },
    Shutdown,
    #[cfg(test)]
    Count {
        reply: oneshot::Sender<usize>,
    },
}

struct SessionEntry {
    session: ProgressSession,
    channel: broadcast::Sender<ProgressEvent>,
    terminal_at: Option<Instant>,
}

struct RegistryState {
    settings: RegistrySettings,
    sessions: HashMap<Uuid, SessionEntry>,
}

impl RegistryState {
    fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            sessions: HashMap::new(),
        }
    }

    async fn run(&mut self, mut receiver: mpsc::Receiver<RegistryCommand>) {
        let mut sweeper = tokio::time::interval(self.settings.sweep_interval);
        sweeper.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(RegistryCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = sweeper.tick() => self.sweep(Instant::now()),
            }
        }
    }

    fn handle(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Create {
                owner_id,
                kind,
                reply,
            } => {
                let _ = reply.send(self.create(owner_id, kind));
            }
            RegistryCommand::Snapshot { id, reply } => {
                let snapshot = self
                    .sessions
                    .get(&id)
                    .map(|entry| ProgressEvent::from_session(&entry.session));
                let _ = reply.send(snapshot);
            }
            RegistryCommand::Authorize {
                id,
                owner_id,
                reply,
            } => {
                let _ = reply.send(self.authorize(id, &owner_id));
            }
            RegistryCommand::Subscribe {
                id,
                owner_id,
                reply,
            } => {
                let _ = reply.send(self.subscribe(id, &owner_id));
            }
            RegistryCommand::Start { id, total } => {
                self.mutate(id, |session| session.start(total));
            }
            RegistryCommand::Update {
                id,
                delta,
                total,
                log_line,
            } => {
                self.mutate(id, |session| session.update(delta, total, log_line));
            }
            RegistryCommand::Complete { id, result } => {
                self.mutate(id, |session| session.complete(result));
            }
            RegistryCommand::Fail { id, error } => {
                self.mutate(id, |session| session.fail(error));
            }
            RegistryCommand::Touch { id } => {
                if let Some(entry) = self.sessions.get(&id) {
                    if !entry.session.is_terminal() {
                        let _ = entry
                            .channel
                            .send(ProgressEvent::from_session(&entry.session));
                    }
                }
            }
            RegistryCommand::Remove { id } => {
                if self.sessions.remove(&id).is_some() {
                    log::debug!("Removed progress session {}", id);
                }
            }
            RegistryCommand::Shutdown => unreachable!("handled in run()"),
            #[cfg(test)]
            RegistryCommand::Count { reply } => {
                let _ = reply.send(self.sessions.len());
            }
        }
    }

    fn create(&mut self, owner_id: String, kind: OperationKind) -> Uuid {
        let mut session = ProgressSession::new(owner_id.clone(), kind);
        // A v4 collision with a live id is practically impossible, but the
        // registry must never hand out a duplicate.
        while self.sessions.contains_key(&session.id) {
            session = ProgressSession::new(owner_id.clone(), kind);
        }
        let id = session.id;
        let (channel, _) = broadcast::channel(self.settings.subscriber_buffer);
        self.sessions.insert(
            id,
            SessionEntry {
                session,
                channel,
                terminal_at: None,
            },
        );
        log::debug!("Created progress session {} for owner {}", id, owner_id);
        id
    }

    fn authorize(&self, id: Uuid, owner_id: &str) -> AuthOutcome {
        match self.sessions.get(&id) {
            None => AuthOutcome::NotFound,
            Some(entry) if entry.session.owner_id != owner_id => AuthOutcome::Forbidden,
            Some(_) => AuthOutcome::Ok,
        }
    }

    fn subscribe(&self, id: Uuid, owner_id: &str) -> Result<Subscription, SubscribeError> {
        let entry = self.sessions.get(&id).ok_or(SubscribeError::NotFound)?;
        if entry.session.owner_id != owner_id {
            return Err(SubscribeError::Forbidden);
        }
        Ok(Subscription {
            snapshot: ProgressEvent::from_session(&entry.session),
            receiver: entry.channel.subscribe(),
        })
    }

    /// Applies a mutation and publishes the resulting event. Terminal no-ops
    /// change nothing and publish nothing, so the terminal event is always
    /// the last one a subscriber can observe.
    fn mutate<F>(&mut self, id: Uuid, apply: F)
    where
        F: FnOnce(&mut ProgressSession) -> bool,
    {
        let Some(entry) = self.sessions.get_mut(&id) else {
            log::debug!("Ignoring mutation for unknown session {}", id);
            return;
        };
        if !apply(&mut entry.session) {
            return;
        }
        if entry.session.is_terminal() && entry.terminal_at.is_none() {
            entry.terminal_at = Some(Instant::now());
        }
        let _ = entry
            .channel
            .send(ProgressEvent::from_session(&entry.session));
    }

    fn sweep(&mut self, now: Instant) {
        let stall_timeout = self.settings.stall_timeout;
        let retention = self.settings.retention;
        let mut expired = Vec::new();
        for (id, entry) in self.sessions.iter_mut() {
            if entry.session.is_terminal() {
                if let Some(terminal_at) = entry.terminal_at {
                    if now.duration_since(terminal_at) >= retention {
                        expired.push(*id);
                    }
                }
            } else if now.duration_since(entry.session.last_update) >= stall_timeout {
                log::warn!(
                    "Force-failing session {} after {}s without progress",
                    id,
                    stall_timeout.as_secs()
                );
                if entry.session.fail(OperationError::stalled(stall_timeout)) {
                    entry.terminal_at = Some(now);
                    let _ = entry
                        .channel
                        .send(ProgressEvent::from_session(&entry.session));
                }
            }
        }
        for id in expired {
            self.sessions.remove(&id);
            log::debug!("Expired progress session {}", id);
        }
    }
}

impl fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressRegistry").finish_non_exhaustive()
    }
}
