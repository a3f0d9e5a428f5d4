use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use helpdesk_core::domain::allowance::AllowanceLedger;
use helpdesk_core::domain::feedback::FeedbackRecord;
use helpdesk_core::domain::ticket::TicketRecord;

/// Whole-file JSON document. Keys missing from older files default to empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,
    #[serde(default)]
    pub allowances: AllowanceLedger,
    #[serde(default)]
    pub tickets: Vec<TicketRecord>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read store file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse store file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not encode store document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not write store file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Single owner of the store file.
///
/// Every read and every load-mutate-save cycle runs under one async mutex, so
/// concurrent handlers inside the process never lose each other's updates.
/// There is no cross-process locking.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, falling back to an empty one on any failure.
    pub async fn load(&self) -> StoreDocument {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Strict load used by diagnostics; a missing file is still an empty store.
    pub async fn inspect(&self) -> Result<StoreDocument, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_document().await
    }

    pub async fn save(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_document(document).await
    }

    pub async fn read<T>(&self, project: impl FnOnce(&StoreDocument) -> T) -> T {
        let _guard = self.lock.lock().await;
        let document = self.load_unlocked().await;
        project(&document)
    }

    pub async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoreDocument) -> T,
    ) -> Result<T, StoreError> {
        self.try_mutate(|document| Ok::<T, StoreError>(apply(document))).await
    }

    /// Like [`JsonStore::mutate`] but nothing is written when `apply` fails.
    pub async fn try_mutate<T, E>(
        &self,
        apply: impl FnOnce(&mut StoreDocument) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.load_unlocked().await;
        let output = apply(&mut document)?;
        self.write_document(&document).await?;
        Ok(output)
    }

    async fn load_unlocked(&self) -> StoreDocument {
        match self.read_document().await {
            Ok(mut document) => {
                self.backfill_feedback_ids(&mut document).await;
                document
            }
            Err(error) => {
                warn!(
                    event_name = "store.load.failed",
                    path = %self.path.display(),
                    error = %error,
                    "store could not be loaded; continuing with an empty document"
                );
                StoreDocument::default()
            }
        }
    }

    /// Older files carry feedback without ids. Ids are assigned once and
    /// written back so every later load sees the same ones.
    async fn backfill_feedback_ids(&self, document: &mut StoreDocument) {
        let assigned = document
            .feedback
            .iter_mut()
            .map(FeedbackRecord::ensure_id)
            .filter(|assigned| *assigned)
            .count();
        if assigned == 0 {
            return;
        }

        match self.write_document(document).await {
            Ok(()) => info!(
                event_name = "store.feedback_ids.backfilled",
                path = %self.path.display(),
                assigned,
                "assigned ids to legacy feedback records"
            ),
            Err(error) => warn!(
                event_name = "store.feedback_ids.backfill_failed",
                path = %self.path.display(),
                error = %error,
                "legacy feedback ids could not be persisted"
            ),
        }
    }

    async fn read_document(&self) -> Result<StoreDocument, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                debug!(
                    event_name = "store.load.missing",
                    path = %self.path.display(),
                    "store file does not exist yet"
                );
                return Ok(StoreDocument::default());
            }
            Err(source) => return Err(StoreError::Read { path: self.path.clone(), source }),
        };

        if raw.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_json::from_str(&raw)
            .map_err(|source| StoreError::Parse { path: self.path.clone(), source })
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write { path: parent.to_path_buf(), source })?;
        }

        let encoded = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })
    }
}
