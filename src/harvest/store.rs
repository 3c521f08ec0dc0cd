//! Per-run result accumulation and the append-only sink.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Display name recorded when no name could be resolved for a candidate.
pub const UNKNOWN_NAME: &str = "(unknown)";

/// One discovered contact. Identity is structural: two records are the same
/// only when both the display name and the identifier match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    pub identifier: String,
}

impl ContactRecord {
    /// Build a record, substituting the unknown-name sentinel for a missing
    /// or blank display name.
    pub fn new(name: Option<String>, identifier: impl Into<String>) -> Self {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        Self {
            name,
            identifier: identifier.into(),
        }
    }

    pub fn is_named(&self) -> bool {
        self.name != UNKNOWN_NAME
    }

    /// Render the sink line for this record: `name - identifier`, or the bare
    /// identifier when the name is unknown.
    pub fn sink_line(&self) -> String {
        if self.is_named() {
            format!("{} - {}", self.name, self.identifier)
        } else {
            self.identifier.clone()
        }
    }
}

/// Append-only, deduplicated accumulation of one run's records.
///
/// Records keep insertion order. Flushing writes only the suffix that has not
/// been flushed yet, so the sink file grows strictly by appends and a flush
/// never rewrites earlier lines.
pub struct ResultStore {
    sink: PathBuf,
    records: Vec<ContactRecord>,
    seen: HashSet<ContactRecord>,
    flushed: usize,
}

impl ResultStore {
    pub fn new(sink: impl Into<PathBuf>) -> Self {
        Self {
            sink: sink.into(),
            records: Vec::new(),
            seen: HashSet::new(),
            flushed: 0,
        }
    }

    /// Clear all accumulated state for a fresh run against the same sink.
    pub fn reset(&mut self) {
        self.records.clear();
        self.seen.clear();
        self.flushed = 0;
    }

    pub fn sink(&self) -> &Path {
        &self.sink
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Absorb a batch of candidate records, appending the ones not already
    /// present. Returns the size of the delta that was actually added.
    pub fn absorb(&mut self, batch: impl IntoIterator<Item = ContactRecord>) -> usize {
        let before = self.records.len();
        for record in batch {
            if self.seen.insert(record.clone()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    /// Insertion-ordered snapshot of everything accumulated so far.
    pub fn snapshot(&self) -> Vec<ContactRecord> {
        self.records.clone()
    }

    /// Append all not-yet-flushed records to the sink file.
    ///
    /// The file (and its parent directory) is created lazily on the first
    /// non-empty flush, so a run that never finds anything leaves no artifact.
    pub async fn flush(&mut self) -> anyhow::Result<usize> {
        let pending = &self.records[self.flushed..];
        if pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.sink.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sink)
            .await?;

        let mut chunk = String::new();
        for record in pending {
            chunk.push_str(&record.sink_line());
            chunk.push('\n');
        }
        file.write_all(chunk.as_bytes()).await?;
        file.flush().await?;

        let written = pending.len();
        self.flushed = self.records.len();
        debug!(
            written,
            sink = %self.sink.display(),
            "flushed delta to result sink"
        );
        if self.flushed == written {
            info!(sink = %self.sink.display(), "result sink created");
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: Option<&str>, id: &str) -> ContactRecord {
        ContactRecord::new(name.map(str::to_string), id)
    }

    #[test]
    fn blank_names_collapse_to_sentinel() {
        assert_eq!(rec(None, "a@b.co").name, UNKNOWN_NAME);
        assert_eq!(rec(Some("   "), "a@b.co").name, UNKNOWN_NAME);
        assert_eq!(rec(Some(" Ada "), "a@b.co").name, "Ada");
    }

    #[test]
    fn sink_line_formats() {
        assert_eq!(rec(Some("Ada"), "a@b.co").sink_line(), "Ada - a@b.co");
        assert_eq!(rec(None, "a@b.co").sink_line(), "a@b.co");
    }

    #[test]
    fn absorb_dedups_structurally_and_keeps_order() {
        let mut store = ResultStore::new("unused.txt");
        assert_eq!(store.absorb([rec(Some("Ada"), "a@b.co"), rec(None, "x@y.com")]), 2);
        // Same identifier twice in a row is one record.
        assert_eq!(store.absorb([rec(None, "x@y.com")]), 0);
        // Same identifier under a different name is a distinct record.
        assert_eq!(store.absorb([rec(Some("Bob"), "x@y.com")]), 1);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].name, "Ada");
        assert_eq!(snap[1].identifier, "x@y.com");
        assert_eq!(snap[2].name, "Bob");
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = ResultStore::new("unused.txt");
        store.absorb([rec(None, "x@y.com")]);
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.absorb([rec(None, "x@y.com")]), 1);
    }

    #[tokio::test]
    async fn flush_is_strictly_additive() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("run.txt");
        let mut store = ResultStore::new(&sink);

        store.absorb([rec(Some("Ada"), "a@b.co")]);
        assert_eq!(store.flush().await.unwrap(), 1);
        let first = tokio::fs::read_to_string(&sink).await.unwrap();
        assert_eq!(first, "Ada - a@b.co\n");

        // Nothing new: flush is a no-op and does not touch the file.
        assert_eq!(store.flush().await.unwrap(), 0);

        store.absorb([rec(None, "x@y.com")]);
        assert_eq!(store.flush().await.unwrap(), 1);
        let second = tokio::fs::read_to_string(&sink).await.unwrap();
        assert_eq!(second, "Ada - a@b.co\nx@y.com\n");
        assert!(second.starts_with(&first), "earlier lines must be untouched");
    }

    #[tokio::test]
    async fn empty_store_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("never.txt");
        let mut store = ResultStore::new(&sink);
        assert_eq!(store.flush().await.unwrap(), 0);
        assert!(!sink.exists());
    }
}
