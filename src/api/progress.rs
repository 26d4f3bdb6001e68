// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use actix_web::http::header;
use actix_web::web::{Data, Path};
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use super::{forbidden, not_found, unauthorized};
use crate::app_state::AppState;
use crate::iam::AuthRequest;
use crate::progress::{sse_response, SubscribeError};

/// Attaches the caller to a session's event stream. An unknown or malformed
/// id is a plain "not found": session ids are unguessable, so there is
/// nothing to leak by folding the two cases together.
pub async fn stream_progress(
    req: HttpRequest,
    state: Data<AppState>,
    path: Path<String>,
) -> HttpResponse {
    if !accepts_event_stream(&req) {
        return HttpResponse::NotAcceptable()
            .json(json!({"error": "only text/event-stream is available"}));
    }
    let Some(user) = req.user_info() else {
        return unauthorized();
    };
    let Ok(session_id) = Uuid::parse_str(&path) else {
        return not_found();
    };

    match state.progress.subscribe(session_id, &user.id).await {
        Ok(subscription) => {
            log::debug!("User {} attached to session {}", user.id, session_id);
            sse_response(subscription, state.heartbeat)
        }
        Err(SubscribeError::Forbidden) => {
            log::debug!(
                "User {} denied access to session {} owned by someone else",
                user.id,
                session_id
            );
            forbidden()
        }
        Err(SubscribeError::NotFound) => not_found(),
    }
}

/// The subscriber must ask for an event stream; this endpoint has no other
/// representation to offer.
fn accepts_event_stream(req: &HttpRequest) -> bool {
    match req.headers().get(header::ACCEPT).map(|v| v.to_str()) {
        None => false,
        Some(Ok(value)) => {
            value.contains("text/event-stream") || value.contains("*/*") || value.contains("text/*")
        }
        Some(Err(_)) => false,
    }
}
