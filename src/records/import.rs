// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use futures_util::future::BoxFuture;

use super::{RecordDraft, RecordStore, TaggedRecord, MAX_TAGS_PER_RECORD, MAX_TAG_CHARS, MAX_TITLE_CHARS};
use crate::progress::{BatchJob, BatchReport, ImportOutcome, OperationError, OperationResult};
use uuid::Uuid;

/// Error strings reported back to the caller; further failures are counted
/// but not listed.
const MAX_REPORTED_ERRORS: usize = 50;

/// Validates and stores a set of submitted record drafts. One draft is one
/// work item; a draft that fails validation counts as processed and never
/// aborts the run.
pub struct ImportJob {
    store: RecordStore,
    drafts: Vec<RecordDraft>,
    imported: u64,
    skipped: u64,
    failed: u64,
    errors: Vec<String>,
}

impl ImportJob {
    pub fn new(store: RecordStore, drafts: Vec<RecordDraft>) -> Self {
        Self {
            store,
            drafts,
            imported: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    fn record_error(&mut self, index: usize, reason: &str) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("item {}: {}", index, reason));
        }
    }
}

impl BatchJob for ImportJob {
    fn total_items(&self) -> u64 {
        self.drafts.len() as u64
    }

    fn run_batch(
        &mut self,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'_, Result<BatchReport, OperationError>> {
        Box::pin(async move {
            let start = offset as usize;
            let end = (offset + len) as usize;
            for index in start..end {
                let draft = self.drafts[index].clone();
                if let Err(reason) = validate_draft(&draft) {
                    self.record_error(index, &reason);
                    continue;
                }
                let record = TaggedRecord {
                    id: Uuid::new_v4(),
                    title: draft.title.trim().to_string(),
                    tags: draft.tags,
                    body: draft.body,
                };
                if self.store.insert_new(record) {
                    self.imported += 1;
                } else {
                    self.skipped += 1;
                }
            }
            Ok(BatchReport {
                processed: len,
                log_line: Some(format!(
                    "Processed {} of {} drafts",
                    end,
                    self.drafts.len()
                )),
            })
        })
    }

    fn finish(self: Box<Self>) -> Result<OperationResult, OperationError> {
        Ok(OperationResult::Import(ImportOutcome {
            imported: self.imported,
            skipped: self.skipped,
            failed: self.failed,
            errors: self.errors,
        }))
    }
}

fn validate_draft(draft: &RecordDraft) -> Result<(), String> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err("title must not be empty".to_string());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(format!("title exceeds {} characters", MAX_TITLE_CHARS));
    }
    if draft.tags.len() > MAX_TAGS_PER_RECORD {
        return Err(format!("more than {} tags", MAX_TAGS_PER_RECORD));
    }
    for tag in &draft.tags {
        if tag.trim().is_empty() {
            return Err("tags must not be empty".to_string());
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(format!("tag exceeds {} characters", MAX_TAG_CHARS));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{run_to_completion, RunnerSettings};

    fn draft(title: &str, tags: &[&str]) -> RecordDraft {
        RecordDraft {
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            body: None,
        }
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            batch_size: 3,
            ..RunnerSettings::default()
        }
    }

    #[tokio::test]
    async fn imports_valid_drafts() {
        let store = RecordStore::new();
        let drafts = (0..10).map(|i| draft(&format!("Note {}", i), &["inbox"])).collect();
        let job = Box::new(ImportJob::new(store.clone(), drafts));

        let result = run_to_completion(job, &settings()).await.unwrap();
        match result {
            OperationResult::Import(outcome) => {
                assert_eq!(outcome.imported, 10);
                assert_eq!(outcome.skipped, 0);
                assert_eq!(outcome.failed, 0);
                assert!(outcome.errors.is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.count(), 10);
    }

    #[tokio::test]
    async fn counts_invalid_and_duplicate_drafts() {
        let store = RecordStore::new();
        let drafts = vec![
            draft("Groceries", &["home"]),
            draft("", &["home"]),          // invalid
            draft("Groceries", &["home"]), // duplicate title
            draft("Utilities", &["  "]),   // blank tag
        ];
        let job = Box::new(ImportJob::new(store.clone(), drafts));

        let result = run_to_completion(job, &settings()).await.unwrap();
        match result {
            OperationResult::Import(outcome) => {
                assert_eq!(outcome.imported, 1);
                assert_eq!(outcome.skipped, 1);
                assert_eq!(outcome.failed, 2);
                assert_eq!(outcome.errors.len(), 2);
                assert!(outcome.errors[0].starts_with("item 1:"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn error_list_is_capped() {
        let store = RecordStore::new();
        let drafts = (0..80).map(|_| draft("", &[])).collect();
        let job = Box::new(ImportJob::new(store, drafts));

        let result = run_to_completion(job, &settings()).await.unwrap();
        match result {
            OperationResult::Import(outcome) => {
                assert_eq!(outcome.failed, 80);
                assert_eq!(outcome.errors.len(), MAX_REPORTED_ERRORS);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
