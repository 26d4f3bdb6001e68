// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use std::time::Duration;

use crate::config::ValidatedConfig;
use crate::progress::{ProgressRegistry, RunnerSettings};
use crate::records::RecordStore;

/// Shared application state handed to every worker. The registry handle and
/// the record store are both cheap clones over shared backing state.
pub struct AppState {
    pub progress: ProgressRegistry,
    pub records: RecordStore,
    pub runner: RunnerSettings,
    pub heartbeat: Duration,
    pub max_import_items: usize,
}

impl AppState {
    pub fn new(config: &ValidatedConfig) -> Self {
        Self {
            progress: ProgressRegistry::start(config.progress.registry_settings()),
            records: RecordStore::new(),
            runner: config.progress.runner_settings(),
            heartbeat: config.progress.heartbeat(),
            max_import_items: config.progress.max_import_items,
        }
    }

    #[cfg(test)]
    pub fn new_for_tests() -> Self {
        Self::new(&crate::config::test_config())
    }

    /// Stops the progress registry, ending all live event streams.
    pub async fn shutdown(&self) {
        self.progress.shutdown().await;
    }
}
