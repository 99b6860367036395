//! # redb-backed Graph Sink
//!
//! A disk-backed graph sink using the redb embedded database.
//!
//! - ACID transactions: every `GraphSink` write call is one write
//!   transaction, so a failed batch leaves the database unchanged
//! - Crash safety (copy-on-write B-trees)
//! - MVCC: readers see the last committed state, never a batch in progress
//!
//! `replace_derived` deletes and re-inserts both derived labels and merges
//! the customer metrics inside a single write transaction.

use crate::graph::{
    DerivedWrite, GraphSink, check_edge_labels, check_endpoints, check_unique_nodes,
};
use crate::types::{
    EdgeLabel, EdgeRecord, EtlError, NodeKey, NodeLabel, NodeRecord, Properties,
};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for nodes: (label code, id) -> serialized Properties
const NODES: TableDefinition<(u8, u64), &[u8]> = TableDefinition::new("nodes");

/// Table for edges: (label code, from id, to id) -> serialized Properties
const EDGES: TableDefinition<(u8, u64, u64), &[u8]> = TableDefinition::new("edges");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Metadata key holding 1 once uniqueness constraints are enabled.
const CONSTRAINTS_KEY: &str = "constraints";

fn encode(properties: &Properties) -> Result<Vec<u8>, EtlError> {
    postcard::to_allocvec(properties).map_err(|e| EtlError::SerializationError(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Properties, EtlError> {
    postcard::from_bytes(bytes).map_err(|e| EtlError::SerializationError(e.to_string()))
}

fn node_label(code: u8) -> Result<NodeLabel, EtlError> {
    NodeLabel::from_code(code)
        .ok_or_else(|| EtlError::SerializationError(format!("unknown node label code {}", code)))
}

fn edge_label(code: u8) -> Result<EdgeLabel, EtlError> {
    EdgeLabel::from_code(code)
        .ok_or_else(|| EtlError::SerializationError(format!("unknown edge label code {}", code)))
}

/// A disk-backed graph sink using redb.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EtlError> {
        let db = Database::create(path.as_ref()).map_err(|e| EtlError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(NODES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(EDGES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| EtlError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }
}

// =============================================================================
// TRANSACTION STEPS
// =============================================================================

/// Delete every edge of `label` and insert `edges`, inside `write_txn`.
fn replace_label(
    write_txn: &WriteTransaction,
    label: EdgeLabel,
    edges: &[EdgeRecord],
) -> Result<(), EtlError> {
    check_edge_labels(label, edges)?;
    let code = label.code();

    let nodes_table = write_txn
        .open_table(NODES)
        .map_err(|e| EtlError::IoError(e.to_string()))?;
    check_endpoints(edges, |key| {
        let found = nodes_table
            .get((key.label.code(), key.id))
            .map_err(|e| EtlError::IoError(e.to_string()))?
            .is_some();
        Ok(found)
    })?;

    let mut edges_table = write_txn
        .open_table(EDGES)
        .map_err(|e| EtlError::IoError(e.to_string()))?;

    // Range query for every edge of this label
    let mut stale = Vec::new();
    for entry in edges_table
        .range((code, 0u64, 0u64)..=(code, u64::MAX, u64::MAX))
        .map_err(|e| EtlError::IoError(e.to_string()))?
    {
        let (key, _) = entry.map_err(|e| EtlError::IoError(e.to_string()))?;
        stale.push(key.value());
    }
    for key in stale {
        edges_table
            .remove(key)
            .map_err(|e| EtlError::IoError(e.to_string()))?;
    }

    for edge in edges {
        let bytes = encode(&edge.properties)?;
        edges_table
            .insert((code, edge.from, edge.to), bytes.as_slice())
            .map_err(|e| EtlError::IoError(e.to_string()))?;
    }
    Ok(())
}

/// Merge property updates into existing nodes, inside `write_txn`.
fn merge_properties(
    write_txn: &WriteTransaction,
    updates: &[(NodeKey, Properties)],
) -> Result<(), EtlError> {
    let mut nodes_table = write_txn
        .open_table(NODES)
        .map_err(|e| EtlError::IoError(e.to_string()))?;

    // Merge every update before the first insert.
    let mut merged: BTreeMap<NodeKey, Properties> = BTreeMap::new();
    for (key, properties) in updates {
        if !merged.contains_key(key) {
            let existing = nodes_table
                .get((key.label.code(), key.id))
                .map_err(|e| EtlError::IoError(e.to_string()))?
                .map(|data| decode(data.value()))
                .transpose()?
                .ok_or(EtlError::NodeNotFound {
                    label: key.label,
                    id: key.id,
                })?;
            merged.insert(*key, existing);
        }
        if let Some(target) = merged.get_mut(key) {
            target.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    for (key, properties) in &merged {
        let bytes = encode(properties)?;
        nodes_table
            .insert((key.label.code(), key.id), bytes.as_slice())
            .map_err(|e| EtlError::IoError(e.to_string()))?;
    }
    Ok(())
}

// =============================================================================
// GRAPHSINK TRAIT IMPLEMENTATION
// =============================================================================

impl GraphSink for RedbGraph {
    fn ensure_constraints(&mut self) -> Result<(), EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        {
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            meta_table
                .insert(CONSTRAINTS_KEY, 1u64)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(())
    }

    fn has_constraints(&self) -> Result<bool, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let meta_table = read_txn
            .open_table(METADATA)
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let flag = meta_table
            .get(CONSTRAINTS_KEY)
            .map_err(|e| EtlError::IoError(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(flag == 1)
    }

    fn clear(&mut self) -> Result<(), EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        {
            let mut nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            let mut node_keys = Vec::new();
            for entry in nodes_table
                .iter()
                .map_err(|e| EtlError::IoError(e.to_string()))?
            {
                let (key, _) = entry.map_err(|e| EtlError::IoError(e.to_string()))?;
                node_keys.push(key.value());
            }
            for key in node_keys {
                nodes_table
                    .remove(key)
                    .map_err(|e| EtlError::IoError(e.to_string()))?;
            }

            let mut edges_table = write_txn
                .open_table(EDGES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            let mut edge_keys = Vec::new();
            for entry in edges_table
                .iter()
                .map_err(|e| EtlError::IoError(e.to_string()))?
            {
                let (key, _) = entry.map_err(|e| EtlError::IoError(e.to_string()))?;
                edge_keys.push(key.value());
            }
            for key in edge_keys {
                edges_table
                    .remove(key)
                    .map_err(|e| EtlError::IoError(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(())
    }

    fn write_nodes(&mut self, nodes: &[NodeRecord]) -> Result<usize, EtlError> {
        let constrained = self.has_constraints()?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        {
            let mut nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            if constrained {
                check_unique_nodes(nodes, |key| {
                    let found = nodes_table
                        .get((key.label.code(), key.id))
                        .map_err(|e| EtlError::IoError(e.to_string()))?
                        .is_some();
                    Ok(found)
                })?;
            }
            for node in nodes {
                let bytes = encode(&node.properties)?;
                nodes_table
                    .insert((node.key.label.code(), node.key.id), bytes.as_slice())
                    .map_err(|e| EtlError::IoError(e.to_string()))?;
            }
        }
        // Dropping an uncommitted transaction above aborts the batch.
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(nodes.len())
    }

    fn write_edges(&mut self, edges: &[EdgeRecord]) -> Result<usize, EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        {
            let nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            check_endpoints(edges, |key| {
                let found = nodes_table
                    .get((key.label.code(), key.id))
                    .map_err(|e| EtlError::IoError(e.to_string()))?
                    .is_some();
                Ok(found)
            })?;

            let mut edges_table = write_txn
                .open_table(EDGES)
                .map_err(|e| EtlError::IoError(e.to_string()))?;
            for edge in edges {
                let bytes = encode(&edge.properties)?;
                edges_table
                    .insert((edge.label.code(), edge.from, edge.to), bytes.as_slice())
                    .map_err(|e| EtlError::IoError(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(edges.len())
    }

    fn replace_edges(&mut self, label: EdgeLabel, edges: &[EdgeRecord]) -> Result<usize, EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        replace_label(&write_txn, label, edges)?;
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(edges.len())
    }

    fn set_properties(&mut self, updates: &[(NodeKey, Properties)]) -> Result<usize, EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        merge_properties(&write_txn, updates)?;
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(updates.len())
    }

    fn replace_derived(&mut self, write: DerivedWrite<'_>) -> Result<(), EtlError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        // An error returns before commit, which aborts all three steps.
        replace_label(&write_txn, EdgeLabel::SimilarTo, write.similarity)?;
        replace_label(&write_txn, EdgeLabel::CoPurchased, write.co_purchase)?;
        merge_properties(&write_txn, write.metrics)?;
        write_txn
            .commit()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(())
    }

    fn node(&self, key: NodeKey) -> Result<Option<NodeRecord>, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| EtlError::IoError(e.to_string()))?;

        match nodes_table
            .get((key.label.code(), key.id))
            .map_err(|e| EtlError::IoError(e.to_string()))?
        {
            Some(data) => Ok(Some(NodeRecord {
                key,
                properties: decode(data.value())?,
            })),
            None => Ok(None),
        }
    }

    fn nodes(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| EtlError::IoError(e.to_string()))?;

        let code = label.code();
        let mut nodes = Vec::new();
        for entry in nodes_table
            .range((code, 0u64)..=(code, u64::MAX))
            .map_err(|e| EtlError::IoError(e.to_string()))?
        {
            let (key, data) = entry.map_err(|e| EtlError::IoError(e.to_string()))?;
            let (code, id) = key.value();
            nodes.push(NodeRecord {
                key: NodeKey::new(node_label(code)?, id),
                properties: decode(data.value())?,
            });
        }
        Ok(nodes)
    }

    fn edges(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let edges_table = read_txn
            .open_table(EDGES)
            .map_err(|e| EtlError::IoError(e.to_string()))?;

        let code = label.code();
        let mut edges = Vec::new();
        for entry in edges_table
            .range((code, 0u64, 0u64)..=(code, u64::MAX, u64::MAX))
            .map_err(|e| EtlError::IoError(e.to_string()))?
        {
            let (key, data) = entry.map_err(|e| EtlError::IoError(e.to_string()))?;
            let (code, from, to) = key.value();
            edges.push(EdgeRecord {
                label: edge_label(code)?,
                from,
                to,
                properties: decode(data.value())?,
            });
        }
        Ok(edges)
    }

    fn node_count(&self) -> Result<usize, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let count = nodes_table
            .len()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(count as usize)
    }

    fn edge_count(&self) -> Result<usize, EtlError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let edges_table = read_txn
            .open_table(EDGES)
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        let count = edges_table
            .len()
            .map_err(|e| EtlError::IoError(e.to_string()))?;
        Ok(count as usize)
    }
}
