// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

#![allow(dead_code)]

use actix_web::web;
use serde_json::Value;
use std::sync::Arc;
use tagledger::app_state::AppState;
use tagledger::config::{
    AppConfig, LoggingConfig, ProgressConfig, ServerConfig, UserConfig, ValidatedConfig,
};
use tagledger::iam::{StaticTokenVerifier, TokenVerifier};

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

pub struct TestHarness {
    pub config: ValidatedConfig,
    pub state: web::Data<AppState>,
    pub verifier: web::Data<Arc<dyn TokenVerifier>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_progress(ProgressConfig {
            batch_size: 25,
            update_interval_ms: 50,
            ..ProgressConfig::default()
        })
    }

    pub fn with_progress(progress: ProgressConfig) -> Self {
        let config = ValidatedConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                workers: 1,
            },
            app: AppConfig {
                name: "TagLedger Test".to_string(),
                description: "Integration fixture".to_string(),
            },
            logging: LoggingConfig::default(),
            users: vec![
                UserConfig {
                    token: ALICE_TOKEN.to_string(),
                    id: "alice".to_string(),
                    name: "Alice".to_string(),
                    roles: vec!["admin".to_string()],
                },
                UserConfig {
                    token: BOB_TOKEN.to_string(),
                    id: "bob".to_string(),
                    name: "Bob".to_string(),
                    roles: vec![],
                },
            ],
            progress,
        };
        let state = web::Data::new(AppState::new(&config));
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(StaticTokenVerifier::from_config(&config.users));
        Self {
            config,
            state,
            verifier: web::Data::new(verifier),
        }
    }

    pub async fn shutdown(&self) {
        self.state.shutdown().await;
    }
}

/// Splits an SSE body into its parsed `data:` payloads, skipping heartbeat
/// comments.
pub fn sse_events(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|json| serde_json::from_str(json).expect("valid event JSON"))
        .collect()
}

pub fn import_body(count: usize) -> Value {
    let records: Vec<Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "title": format!("Record {}", i),
                "tags": ["bulk"],
                "body": format!("payload {}", i)
            })
        })
        .collect();
    serde_json::json!({ "records": records })
}
