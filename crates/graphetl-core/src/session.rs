//! # Session Module
//!
//! Scoped ownership of one graph sink backend.
//!
//! A `Session` is created per command, owns its sink, and releases it when
//! dropped, on success and error paths alike. There is no process-wide
//! sink handle.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses `MemoryGraph` (fast, volatile)
//! - `Persistent`: uses `RedbGraph` for disk-backed ACID storage

use crate::analytics::Analytics;
use crate::graph::{GraphSink, MemoryGraph};
use crate::pipeline::{PipelineOptions, RunReport, run_pipeline};
use crate::storage::RedbGraph;
use crate::store::RecordStore;
use crate::types::EtlError;
use std::path::Path;

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory graph (fast, volatile).
    InMemory(MemoryGraph),
    /// Disk-backed graph using redb (ACID, persistent).
    Persistent(RedbGraph),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryGraph::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbGraph (database handle) cannot be safely cloned.

/// A Session owns the sink a pipeline run writes to.
#[derive(Debug, Default)]
pub struct Session {
    /// The storage backend (in-memory or persistent).
    backend: StorageBackend,
}

impl Session {
    /// Create a new session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, EtlError> {
        let redb = RedbGraph::open(path)?;
        Ok(Self {
            backend: StorageBackend::Persistent(redb),
        })
    }

    /// Check if this session uses persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Read access to the sink, whichever backend it is.
    #[must_use]
    pub fn sink(&self) -> &dyn GraphSink {
        match &self.backend {
            StorageBackend::InMemory(graph) => graph,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    /// Write access to the sink, whichever backend it is.
    pub fn sink_mut(&mut self) -> &mut dyn GraphSink {
        match &mut self.backend {
            StorageBackend::InMemory(graph) => graph,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    /// Run the pipeline over `store` into this session's sink.
    pub fn run(
        &mut self,
        store: &RecordStore,
        analytics: &mut dyn Analytics,
        options: &PipelineOptions,
    ) -> Result<RunReport, EtlError> {
        run_pipeline(store, self.sink_mut(), analytics, options)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{NodeLabel, NodeRecord};
    use tempfile::tempdir;

    #[test]
    fn default_session_is_in_memory() {
        let session = Session::new();
        assert!(!session.is_persistent());
        assert!(matches!(session.backend(), StorageBackend::InMemory(_)));
        assert_eq!(session.sink().node_count().unwrap(), 0);
    }

    #[test]
    fn redb_session_persists_across_sessions() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("session.redb");
        {
            let mut session = Session::with_redb(&path).expect("open");
            assert!(session.is_persistent());
            session
                .sink_mut()
                .write_nodes(&[NodeRecord::new(NodeLabel::Category, 1)])
                .expect("write");
        }
        let session = Session::with_redb(&path).expect("reopen");
        assert_eq!(session.sink().node_count().expect("count"), 1);
    }
}
