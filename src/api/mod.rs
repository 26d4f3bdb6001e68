// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

pub mod progress;
pub mod records;

use actix_web::{web, HttpResponse};
use serde_json::json;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/records/import", web::post().to(records::import_records))
            .route("/records/export", web::post().to(records::export_records))
            .route(
                "/records/progress/{id}",
                web::get().to(progress::stream_progress),
            ),
    );
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({"error": "access denied"}))
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(json!({"error": "forbidden"}))
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({"error": "not found"}))
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({"error": message.into()}))
}
