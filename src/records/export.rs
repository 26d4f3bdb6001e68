// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use futures_util::future::BoxFuture;

use super::{RecordStore, TaggedRecord};
use crate::progress::{
    BatchJob, BatchReport, ExportMetadata, ExportPayload, OperationError, OperationResult,
};

/// Serializes a tag-filtered view of the store into a JSON payload. The set
/// of records is fixed when the job is built, so writes that land during a
/// long export do not shift the item count mid-run.
pub struct ExportJob {
    records: Vec<TaggedRecord>,
    rows: Vec<serde_json::Value>,
}

impl ExportJob {
    pub fn new(store: &RecordStore, tag: Option<&str>) -> Self {
        let records = store.by_tag(tag);
        Self {
            rows: Vec::with_capacity(records.len()),
            records,
        }
    }
}

impl BatchJob for ExportJob {
    fn total_items(&self) -> u64 {
        self.records.len() as u64
    }

    fn run_batch(
        &mut self,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'_, Result<BatchReport, OperationError>> {
        Box::pin(async move {
            let start = offset as usize;
            let end = (offset + len) as usize;
            for record in &self.records[start..end] {
                let row = serde_json::to_value(record)
                    .map_err(|err| OperationError::new("serialize", err.to_string()))?;
                self.rows.push(row);
            }
            Ok(BatchReport {
                processed: len,
                log_line: Some(format!(
                    "Serialized {} of {} records",
                    end,
                    self.records.len()
                )),
            })
        })
    }

    fn finish(self: Box<Self>) -> Result<OperationResult, OperationError> {
        let record_count = self.rows.len() as u64;
        Ok(OperationResult::Export(ExportPayload {
            records: serde_json::Value::Array(self.rows),
            metadata: ExportMetadata {
                record_count,
                format: "json".to_string(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{run_to_completion, RunnerSettings};
    use uuid::Uuid;

    fn seeded_store() -> RecordStore {
        let store = RecordStore::new();
        for (title, tags) in [
            ("Invoice March", vec!["finance"]),
            ("Invoice April", vec!["finance", "open"]),
            ("Packing list", vec!["travel"]),
        ] {
            store.insert_new(TaggedRecord {
                id: Uuid::new_v4(),
                title: title.to_string(),
                tags: tags.into_iter().map(String::from).collect(),
                body: None,
            });
        }
        store
    }

    #[tokio::test]
    async fn exports_tag_filtered_records() {
        let store = seeded_store();
        let job = Box::new(ExportJob::new(&store, Some("finance")));
        let result = run_to_completion(job, &RunnerSettings::default())
            .await
            .unwrap();

        match result {
            OperationResult::Export(payload) => {
                assert_eq!(payload.metadata.record_count, 2);
                assert_eq!(payload.metadata.format, "json");
                let rows = payload.records.as_array().unwrap();
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0]["title"], "Invoice April");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn export_without_tag_takes_everything() {
        let store = seeded_store();
        let job = Box::new(ExportJob::new(&store, None));
        let result = run_to_completion(job, &RunnerSettings::default())
            .await
            .unwrap();

        match result {
            OperationResult::Export(payload) => {
                assert_eq!(payload.metadata.record_count, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
