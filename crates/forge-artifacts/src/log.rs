//! Append-only JSON-lines log of store mutations.
//!
//! Each line is one [`LogRecord`]. Commit records carry the BLAKE3 hash of
//! the committed code, checked on replay. A final line without a newline
//! that does not parse is a torn write and is dropped on replay; an
//! unparseable line anywhere else is corruption.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use tracing::{error, warn};

use forge_utils::error::StoreError;

use crate::artifact::Artifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogRecord {
    Commit {
        document: String,
        artifact: Artifact,
        blake3: String,
        /// Display name, present on the seed commit of a named document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Restore {
        document: String,
        version: u64,
        at: DateTime<Utc>,
    },
}

impl LogRecord {
    #[must_use]
    pub fn commit(document: &str, artifact: &Artifact) -> Self {
        Self::Commit {
            document: document.to_string(),
            blake3: artifact.content_hash(),
            artifact: artifact.clone(),
            name: None,
        }
    }

    /// Seed commit (version 0) that also records the document's display name.
    #[must_use]
    pub fn seed(document: &str, name: &str, artifact: &Artifact) -> Self {
        Self::Commit {
            document: document.to_string(),
            blake3: artifact.content_hash(),
            artifact: artifact.clone(),
            name: Some(name.to_string()),
        }
    }

    #[must_use]
    pub fn restore(document: &str, version: u64) -> Self {
        Self::Restore {
            document: document.to_string(),
            version,
            at: Utc::now(),
        }
    }
}

/// Records read back from a log, plus what replay had to repair.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<LogRecord>,
    /// Byte length of the intact prefix of the file.
    pub intact_len: u64,
    /// Why the final unterminated line was discarded.
    pub torn_tail: Option<String>,
    /// The last record parsed but its newline never made it to disk.
    pub unterminated: bool,
}

#[derive(Debug)]
pub struct ArtifactLog {
    path: Utf8PathBuf,
    file: File,
}

impl ArtifactLog {
    /// Open `path` for appending, creating it and its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogWrite` when the file cannot be opened.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| write_error(path, &e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_error(path, &e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Append one record as a single line and flush it. On failure the file
    /// is cut back to its previous length so no half record remains.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogWrite` on serialization or I/O failure.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record).map_err(|e| StoreError::LogWrite {
            path: self.path.to_string(),
            reason: e.to_string(),
        })?;
        line.push('\n');

        let len_before = self
            .file
            .metadata()
            .map_err(|e| write_error(&self.path, &e))?
            .len();
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush());
        if let Err(e) = written {
            if let Err(rollback) = self.file.set_len(len_before) {
                error!(
                    path = %self.path,
                    error = %rollback,
                    "Could not roll back partial artifact log record"
                );
            }
            return Err(write_error(&self.path, &e));
        }
        Ok(())
    }

    /// Read every record in `path`. A missing file yields an empty replay.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogCorrupt` for an unparseable terminated line or
    /// a commit whose hash does not match its code.
    pub fn read(path: &Utf8Path) -> Result<Replay, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => {
                return Err(StoreError::LogCorrupt {
                    path: path.to_string(),
                    line: 0,
                    reason: e.to_string(),
                });
            }
        };
        let corrupt = |line: usize, reason: String| StoreError::LogCorrupt {
            path: path.to_string(),
            line,
            reason,
        };

        let mut replay = Replay::default();
        let mut offset = 0;
        let mut number = 0;
        while offset < bytes.len() {
            number += 1;
            let rest = &bytes[offset..];
            let (raw, terminated) = match rest.iter().position(|b| *b == b'\n') {
                Some(end) => (&rest[..end], true),
                None => (rest, false),
            };

            match parse_line(raw) {
                Ok(Some(record)) => {
                    if let LogRecord::Commit {
                        artifact, blake3, ..
                    } = &record
                        && artifact.content_hash() != *blake3
                    {
                        return Err(corrupt(
                            number,
                            format!("content hash mismatch for version {}", artifact.version),
                        ));
                    }
                    replay.records.push(record);
                    replay.unterminated = !terminated;
                }
                Ok(None) => {}
                Err(reason) if !terminated => {
                    replay.torn_tail = Some(format!("line {number}: {reason}"));
                    break;
                }
                Err(reason) => return Err(corrupt(number, reason)),
            }
            offset += raw.len() + usize::from(terminated);
        }
        replay.intact_len = offset as u64;
        Ok(replay)
    }

    /// Make `path` safe to append to after `replay`: cut a torn tail and
    /// terminate a final record that lost its newline.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LogWrite` when the file cannot be repaired.
    pub fn repair(path: &Utf8Path, replay: &Replay) -> Result<(), StoreError> {
        if let Some(reason) = &replay.torn_tail {
            warn!(
                path = %path,
                kept_bytes = replay.intact_len,
                reason = %reason,
                "Discarding torn final record in artifact log"
            );
            OpenOptions::new()
                .write(true)
                .open(path)
                .and_then(|file| file.set_len(replay.intact_len))
                .map_err(|e| write_error(path, &e))?;
        } else if replay.unterminated {
            warn!(path = %path, "Terminating final artifact log record");
            OpenOptions::new()
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(b"\n"))
                .map_err(|e| write_error(path, &e))?;
        }
        Ok(())
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<LogRecord>, String> {
    let line = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some).map_err(|e| e.to_string())
}

fn write_error(path: &Utf8Path, e: &std::io::Error) -> StoreError {
    StoreError::LogWrite {
        path: path.to_string(),
        reason: e.to_string(),
    }
}
