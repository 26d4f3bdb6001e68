// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

pub mod export;
pub mod import;

pub use export::ExportJob;
pub use import::ImportJob;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 256;
pub const MAX_TAG_CHARS: usize = 128;
pub const MAX_TAGS_PER_RECORD: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedRecord {
    pub id: Uuid,
    pub title: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// An unvalidated record as submitted in an import request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// In-memory record store. Stands in for the durable persistence layer; the
/// lock is held only for synchronous map operations, never across an await.
#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<RwLock<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<Uuid, TaggedRecord>,
    titles: HashSet<String>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless one with the same title already exists.
    pub fn insert_new(&self, record: TaggedRecord) -> bool {
        let mut state = self.inner.write().expect("record store lock");
        let title_key = record.title.to_lowercase();
        if !state.titles.insert(title_key) {
            return false;
        }
        state.records.insert(record.id, record);
        true
    }

    pub fn by_tag(&self, tag: Option<&str>) -> Vec<TaggedRecord> {
        let state = self.inner.read().expect("record store lock");
        let mut records: Vec<TaggedRecord> = state
            .records
            .values()
            .filter(|record| match tag {
                Some(tag) => record.tags.iter().any(|t| t == tag),
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.title.cmp(&b.title));
        records
    }

    pub fn count(&self) -> usize {
        self.inner.read().expect("record store lock").records.len()
    }
}
