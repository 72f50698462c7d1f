use camino::Utf8Path;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{error, info};

use forge_utils::error::StoreError;
use forge_utils::types::DocumentId;

use crate::artifact::Artifact;
use crate::log::{ArtifactLog, LogRecord};

#[derive(Debug, Clone)]
struct DocumentHistory {
    /// Insertion order; never pruned or reordered.
    history: Vec<Artifact>,
    current: Artifact,
    name: Option<String>,
}

impl DocumentHistory {
    fn seeded(seed: Artifact, name: Option<String>) -> Self {
        Self {
            history: vec![seed.clone()],
            current: seed,
            name,
        }
    }

    fn find(&self, version: u64) -> Option<&Artifact> {
        self.history.iter().find(|a| a.version == version)
    }

    fn latest_version(&self) -> u64 {
        self.history.iter().map(|a| a.version).max().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DocumentId, DocumentHistory>,
    log: Option<ArtifactLog>,
}

impl Inner {
    fn record(&mut self, record: &LogRecord) -> Result<(), StoreError> {
        match self.log.as_mut() {
            Some(log) => log.append(record),
            None => Ok(()),
        }
    }

    fn history(&self, document: &DocumentId) -> Result<&DocumentHistory, StoreError> {
        self.documents
            .get(document)
            .ok_or_else(|| StoreError::DocumentNotFound {
                document: document.to_string(),
            })
    }

    fn apply_commit(
        &mut self,
        document: &DocumentId,
        artifact: Artifact,
        name: Option<String>,
    ) -> Result<(), StoreError> {
        let Some(doc) = self.documents.get_mut(document) else {
            if artifact.version != 0 {
                return Err(StoreError::DocumentNotFound {
                    document: document.to_string(),
                });
            }
            self.documents
                .insert(document.clone(), DocumentHistory::seeded(artifact, name));
            return Ok(());
        };
        if doc.find(artifact.version).is_some() {
            return Err(StoreError::VersionExists {
                document: document.to_string(),
                version: artifact.version,
            });
        }
        doc.history.push(artifact.clone());
        doc.current = artifact;
        Ok(())
    }

    fn apply_restore(&mut self, document: &DocumentId, version: u64) -> Result<Artifact, StoreError> {
        let doc = self
            .documents
            .get_mut(document)
            .ok_or_else(|| StoreError::DocumentNotFound {
                document: document.to_string(),
            })?;
        let Some(artifact) = doc.find(version).cloned() else {
            return Err(StoreError::VersionNotFound {
                document: document.to_string(),
                version,
                latest: doc.latest_version(),
            });
        };
        doc.current = artifact.clone();
        Ok(artifact)
    }
}

/// Append-only version history per document.
///
/// All mutations take the write lock, so readers never observe a partially
/// appended entry. When opened with a log, every mutation is written to the
/// log before it becomes visible in memory.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: RwLock<Inner>,
}

impl ArtifactStore {
    /// In-memory store with no log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by the JSON-lines log at `path`, replaying existing records.
    /// A torn final record left by an interrupted write is dropped and cut
    /// from the file before appending resumes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogCorrupt` when the log cannot be replayed and
    /// `StoreError::LogWrite` when it cannot be repaired or opened for appending.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        let mut inner = Inner::default();
        let replay = ArtifactLog::read(path)?;
        ArtifactLog::repair(path, &replay)?;
        let replayed = replay.records.len();

        for (index, record) in replay.records.into_iter().enumerate() {
            let result = match record {
                LogRecord::Commit {
                    document,
                    artifact,
                    name,
                    ..
                } => inner.apply_commit(&DocumentId::new(document), artifact, name),
                LogRecord::Restore {
                    document, version, ..
                } => inner
                    .apply_restore(&DocumentId::new(document), version)
                    .map(|_| ()),
            };
            result.map_err(|e| StoreError::LogCorrupt {
                path: path.to_string(),
                line: index + 1,
                reason: e.to_string(),
            })?;
        }

        inner.log = Some(ArtifactLog::open(path)?);
        info!(
            path = %path,
            records = replayed,
            documents = inner.documents.len(),
            "Artifact log replayed"
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Make sure `document` has a history, seeding it with version 0 under
    /// the display name `name`. Returns the document's current artifact.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogWrite` when the seed cannot be logged.
    pub fn ensure_document(
        &self,
        document: &DocumentId,
        name: &str,
    ) -> Result<Artifact, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = inner.documents.get(document) {
            return Ok(doc.current.clone());
        }
        let seed = Artifact::seed();
        inner.record(&LogRecord::seed(document.as_str(), name, &seed))?;
        inner.apply_commit(document, seed.clone(), Some(name.to_string()))?;
        Ok(seed)
    }

    /// Display name recorded when the document was seeded.
    #[must_use]
    pub fn name(&self, document: &DocumentId) -> Option<String> {
        self.read()
            .documents
            .get(document)
            .and_then(|doc| doc.name.clone())
    }

    #[must_use]
    pub fn contains(&self, document: &DocumentId) -> bool {
        self.read().documents.contains_key(document)
    }

    /// Append `artifact` to the history and make it current.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionExists` when the version is already in the
    /// history (an internal defect), `StoreError::DocumentNotFound` for an
    /// unknown document, and `StoreError::LogWrite` when logging fails.
    pub fn commit(&self, document: &DocumentId, artifact: Artifact) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let doc = inner.history(document)?;
        if doc.find(artifact.version).is_some() {
            error!(
                document_id = %document,
                version = artifact.version,
                "Refusing to commit a version that already exists"
            );
            return Err(StoreError::VersionExists {
                document: document.to_string(),
                version: artifact.version,
            });
        }
        inner.record(&LogRecord::commit(document.as_str(), &artifact))?;
        let version = artifact.version;
        inner.apply_commit(document, artifact, None)?;
        info!(document_id = %document, version, "Artifact committed");
        Ok(())
    }

    /// Commit `code` as version `max(history) + 1` in one step.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    pub fn commit_next(
        &self,
        document: &DocumentId,
        code: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Result<Artifact, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let version = inner.history(document)?.latest_version() + 1;
        let artifact = Artifact::new(code, version, commit_message);
        inner.record(&LogRecord::commit(document.as_str(), &artifact))?;
        inner.apply_commit(document, artifact.clone(), None)?;
        info!(document_id = %document, version, "Artifact committed");
        Ok(artifact)
    }

    /// Make an existing version current again. History is left untouched and
    /// no version number is minted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionNotFound` when `version` is absent; the
    /// current artifact is unchanged in that case.
    pub fn restore(&self, document: &DocumentId, version: u64) -> Result<Artifact, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let doc = inner.history(document)?;
        if doc.find(version).is_none() {
            return Err(StoreError::VersionNotFound {
                document: document.to_string(),
                version,
                latest: doc.latest_version(),
            });
        }
        inner.record(&LogRecord::restore(document.as_str(), version))?;
        let artifact = inner.apply_restore(document, version)?;
        info!(document_id = %document, version, "Artifact restored");
        Ok(artifact)
    }

    #[must_use]
    pub fn get(&self, document: &DocumentId, version: u64) -> Option<Artifact> {
        self.read()
            .documents
            .get(document)
            .and_then(|doc| doc.find(version).cloned())
    }

    #[must_use]
    pub fn current(&self, document: &DocumentId) -> Option<Artifact> {
        self.read()
            .documents
            .get(document)
            .map(|doc| doc.current.clone())
    }

    /// History ordered by version, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DocumentNotFound` for an unknown document.
    pub fn list_history(&self, document: &DocumentId) -> Result<Vec<Artifact>, StoreError> {
        let inner = self.read();
        let mut history = inner.history(document)?.history.clone();
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(history)
    }

    /// Version the next commit will receive.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DocumentNotFound` for an unknown document.
    pub fn next_version(&self, document: &DocumentId) -> Result<u64, StoreError> {
        Ok(self.read().history(document)?.latest_version() + 1)
    }

    /// Known documents in id order.
    #[must_use]
    pub fn documents(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self.read().documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
