// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use actix_web::web::Bytes;
use actix_web::HttpResponse;
use futures_util::stream::{self, Stream};
use std::time::Duration;
use tokio::sync::broadcast;

use super::event::{ProgressEvent, HEARTBEAT_FRAME};
use super::registry::Subscription;

/// Bridges one subscriber to one client connection. The snapshot frame goes
/// out first so a client attaching mid-operation sees meaningful state; the
/// stream ends after a terminal frame has been written. Dropping the
/// response (client disconnect) drops the broadcast receiver, which detaches
/// the subscription without touching the running operation.
pub fn sse_response(subscription: Subscription, heartbeat: Duration) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(event_stream(subscription, heartbeat))
}

struct StreamState {
    receiver: broadcast::Receiver<ProgressEvent>,
    heartbeat: Duration,
    pending_snapshot: Option<ProgressEvent>,
    done: bool,
}

/// Lazy, finite frame sequence for one subscriber. Suspends on the channel
/// or the heartbeat timeout, whichever fires first; a lagged receiver skips
/// dropped progress frames and picks up with the newest event.
fn event_stream(
    subscription: Subscription,
    heartbeat: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let state = StreamState {
        receiver: subscription.receiver,
        heartbeat,
        pending_snapshot: Some(subscription.snapshot),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        if let Some(snapshot) = state.pending_snapshot.take() {
            state.done = snapshot.is_terminal();
            return Some((Ok(Bytes::from(snapshot.frame())), state));
        }
        loop {
            match tokio::time::timeout(state.heartbeat, state.receiver.recv()).await {
                Ok(Ok(event)) => {
                    state.done = event.is_terminal();
                    return Some((Ok(Bytes::from(event.frame())), state));
                }
                Ok(Err(broadcast::error::RecvError::Lagged(dropped))) => {
                    log::debug!("Progress subscriber lagged, skipping {} frames", dropped);
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    // Session removed from the registry; nothing more will
                    // ever arrive.
                    return None;
                }
                Err(_) => {
                    return Some((Ok(Bytes::from_static(HEARTBEAT_FRAME.as_bytes())), state));
                }
            }
        }
    })
}
