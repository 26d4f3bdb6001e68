// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use actix_web::web::{Data, Json};
use actix_web::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{bad_request, unauthorized};
use crate::app_state::AppState;
use crate::iam::AuthRequest;
use crate::progress::{
    run_to_completion, BatchJob, OperationKind, OperationResult, OperationRunner,
};
use crate::records::{ExportJob, ImportJob, RecordDraft};

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub records: Vec<RecordDraft>,
    /// When set, the operation runs in the background and the response
    /// carries a session id instead of the result.
    #[serde(default)]
    pub progress: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub progress: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedResponse {
    session_id: Uuid,
    progress_url: String,
}

pub async fn import_records(
    req: HttpRequest,
    state: Data<AppState>,
    body: Json<ImportRequest>,
) -> HttpResponse {
    let Some(user) = req.user_info() else {
        return unauthorized();
    };
    let body = body.into_inner();
    if body.records.is_empty() {
        return bad_request("records must not be empty");
    }
    if body.records.len() > state.max_import_items {
        return bad_request(format!(
            "records exceeds the import limit of {}",
            state.max_import_items
        ));
    }

    log::info!(
        "User {} importing {} records (progress: {})",
        user.id,
        body.records.len(),
        body.progress
    );
    let job = Box::new(ImportJob::new(state.records.clone(), body.records));
    run(state, &user.id, OperationKind::Import, job, body.progress).await
}

pub async fn export_records(
    req: HttpRequest,
    state: Data<AppState>,
    body: Json<ExportRequest>,
) -> HttpResponse {
    let Some(user) = req.user_info() else {
        return unauthorized();
    };
    let body = body.into_inner();

    log::info!(
        "User {} exporting records (tag: {:?}, progress: {})",
        user.id,
        body.tag,
        body.progress
    );
    let job = Box::new(ExportJob::new(&state.records, body.tag.as_deref()));
    run(state, &user.id, OperationKind::Export, job, body.progress).await
}

/// Either launches a tracked background run and answers 202, or runs the job
/// inline and answers with the result.
async fn run(
    state: Data<AppState>,
    owner_id: &str,
    kind: OperationKind,
    job: Box<dyn BatchJob>,
    progress: bool,
) -> HttpResponse {
    if progress {
        let session_id = match state.progress.create(owner_id, kind).await {
            Ok(id) => id,
            Err(err) => {
                log::error!("Cannot allocate progress session: {}", err);
                return HttpResponse::ServiceUnavailable()
                    .json(json!({"error": "progress tracking unavailable"}));
            }
        };
        OperationRunner::spawn(
            state.progress.clone(),
            session_id,
            job,
            state.runner.clone(),
        );
        return HttpResponse::Accepted().json(StartedResponse {
            session_id,
            progress_url: format!("/api/records/progress/{}", session_id),
        });
    }

    match run_to_completion(job, &state.runner).await {
        Ok(OperationResult::Import(outcome)) => HttpResponse::Ok().json(outcome),
        Ok(OperationResult::Export(payload)) => HttpResponse::Ok().json(payload),
        Err(error) => {
            log::warn!("Inline operation failed: {}", error);
            HttpResponse::InternalServerError().json(json!({"error": error.message}))
        }
    }
}
