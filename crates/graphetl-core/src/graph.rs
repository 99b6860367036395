//! # Graph Sink
//!
//! The persistence collaborator for the pipeline.
//!
//! This module defines the `GraphSink` trait and its in-memory
//! implementation, `MemoryGraph`. The persistent implementation lives in
//! [`crate::storage::RedbGraph`].
//!
//! Nodes are keyed by (label, id) and edges by (label, from, to). All
//! collections use `BTreeMap` for deterministic ordering.
//!
//! Every write call is one batch: it either fully applies or leaves the
//! sink unchanged.

use crate::types::{EdgeLabel, EdgeRecord, EtlError, NodeKey, NodeLabel, NodeRecord, Properties};
use std::collections::{BTreeMap, BTreeSet};

/// Storage key of an edge: label, source id, target id.
pub type EdgeKey = (EdgeLabel, u64, u64);

/// The derived state of one run: both derived relationship sets and the
/// customer metric updates. Applied by [`GraphSink::replace_derived`].
#[derive(Debug, Clone, Copy)]
pub struct DerivedWrite<'a> {
    pub similarity: &'a [EdgeRecord],
    pub co_purchase: &'a [EdgeRecord],
    pub metrics: &'a [(NodeKey, Properties)],
}

// =============================================================================
// GRAPHSINK TRAIT
// =============================================================================

/// The GraphSink trait defines the write and read operations the pipeline
/// needs from a labeled property graph.
///
/// All fallible operations return `Result<T, EtlError>` so the in-memory
/// and persistent backends are used uniformly.
pub trait GraphSink {
    /// Enable (label, id) uniqueness for nodes. Idempotent.
    fn ensure_constraints(&mut self) -> Result<(), EtlError>;

    /// Check whether uniqueness constraints are enabled.
    fn has_constraints(&self) -> Result<bool, EtlError>;

    /// Remove every node and edge. Constraints are kept.
    fn clear(&mut self) -> Result<(), EtlError>;

    /// Write a batch of nodes.
    ///
    /// With constraints enabled, a node whose key already exists (in the
    /// sink or earlier in the batch) fails the batch with
    /// `ConstraintViolation`. Without constraints the property map is
    /// replaced.
    fn write_nodes(&mut self, nodes: &[NodeRecord]) -> Result<usize, EtlError>;

    /// Write a batch of edges. Existing edges have their properties
    /// replaced. Fails with `NodeNotFound` if an endpoint is missing.
    fn write_edges(&mut self, edges: &[EdgeRecord]) -> Result<usize, EtlError>;

    /// Atomically replace every edge of `label` with `edges`.
    ///
    /// Readers observe either the old set or the new set, never a mix.
    /// Fails with `LabelMismatch` if a record carries another label.
    fn replace_edges(&mut self, label: EdgeLabel, edges: &[EdgeRecord]) -> Result<usize, EtlError>;

    /// Merge properties into existing nodes. Fails with `NodeNotFound` if
    /// any node is missing; nothing is written in that case.
    fn set_properties(&mut self, updates: &[(NodeKey, Properties)]) -> Result<usize, EtlError>;

    /// Replace `SIMILAR_TO` and `CO_PURCHASED` and merge the metric updates
    /// as one unit.
    ///
    /// Readers observe the previous derived state or the new one, never a
    /// mix. Any failure (`LabelMismatch`, `NodeNotFound`) leaves both
    /// labels and every node untouched.
    fn replace_derived(&mut self, write: DerivedWrite<'_>) -> Result<(), EtlError>;

    /// Lookup a node by key.
    fn node(&self, key: NodeKey) -> Result<Option<NodeRecord>, EtlError>;

    /// All nodes of a label in ascending id order.
    fn nodes(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, EtlError>;

    /// All edges of a label in ascending (from, to) order.
    fn edges(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, EtlError>;

    /// Get the total number of nodes.
    fn node_count(&self) -> Result<usize, EtlError>;

    /// Get the total number of edges.
    fn edge_count(&self) -> Result<usize, EtlError>;
}

// =============================================================================
// SHARED BATCH CHECKS
// =============================================================================

/// Reject a replacement batch containing a record of another label.
pub(crate) fn check_edge_labels(label: EdgeLabel, edges: &[EdgeRecord]) -> Result<(), EtlError> {
    match edges.iter().find(|e| e.label != label) {
        Some(edge) => Err(EtlError::LabelMismatch {
            expected: label,
            found: edge.label,
        }),
        None => Ok(()),
    }
}

/// Reject a node batch under constraints if any key is already taken.
pub(crate) fn check_unique_nodes<F>(nodes: &[NodeRecord], exists: F) -> Result<(), EtlError>
where
    F: Fn(NodeKey) -> Result<bool, EtlError>,
{
    let mut seen = BTreeSet::new();
    for node in nodes {
        if !seen.insert(node.key) || exists(node.key)? {
            return Err(EtlError::ConstraintViolation {
                label: node.key.label,
                id: node.key.id,
            });
        }
    }
    Ok(())
}

/// Reject an edge batch if any endpoint is missing.
pub(crate) fn check_endpoints<F>(edges: &[EdgeRecord], exists: F) -> Result<(), EtlError>
where
    F: Fn(NodeKey) -> Result<bool, EtlError>,
{
    for edge in edges {
        for key in [edge.source(), edge.target()] {
            if !exists(key)? {
                return Err(EtlError::NodeNotFound {
                    label: key.label,
                    id: key.id,
                });
            }
        }
    }
    Ok(())
}

fn edge_key(edge: &EdgeRecord) -> EdgeKey {
    (edge.label, edge.from, edge.to)
}

// =============================================================================
// MEMORY GRAPH
// =============================================================================

/// In-memory graph sink.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryGraph {
    /// Node storage: (label, id) -> properties
    nodes: BTreeMap<NodeKey, Properties>,

    /// Edge storage: (label, from, to) -> properties
    edges: BTreeMap<EdgeKey, Properties>,

    constrained: bool,
}

impl MemoryGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }
}

impl GraphSink for MemoryGraph {
    fn ensure_constraints(&mut self) -> Result<(), EtlError> {
        self.constrained = true;
        Ok(())
    }

    fn has_constraints(&self) -> Result<bool, EtlError> {
        Ok(self.constrained)
    }

    fn clear(&mut self) -> Result<(), EtlError> {
        self.nodes.clear();
        self.edges.clear();
        Ok(())
    }

    fn write_nodes(&mut self, nodes: &[NodeRecord]) -> Result<usize, EtlError> {
        if self.constrained {
            check_unique_nodes(nodes, |key| Ok(self.contains(key)))?;
        }
        for node in nodes {
            self.nodes.insert(node.key, node.properties.clone());
        }
        Ok(nodes.len())
    }

    fn write_edges(&mut self, edges: &[EdgeRecord]) -> Result<usize, EtlError> {
        check_endpoints(edges, |key| Ok(self.contains(key)))?;
        for edge in edges {
            self.edges.insert(edge_key(edge), edge.properties.clone());
        }
        Ok(edges.len())
    }

    fn replace_edges(&mut self, label: EdgeLabel, edges: &[EdgeRecord]) -> Result<usize, EtlError> {
        check_edge_labels(label, edges)?;
        check_endpoints(edges, |key| Ok(self.contains(key)))?;

        let mut replaced: BTreeMap<EdgeKey, Properties> = self
            .edges
            .iter()
            .filter(|((l, _, _), _)| *l != label)
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        for edge in edges {
            replaced.insert(edge_key(edge), edge.properties.clone());
        }
        self.edges = replaced;
        Ok(edges.len())
    }

    fn set_properties(&mut self, updates: &[(NodeKey, Properties)]) -> Result<usize, EtlError> {
        if let Some((key, _)) = updates.iter().find(|(key, _)| !self.contains(*key)) {
            return Err(EtlError::NodeNotFound {
                label: key.label,
                id: key.id,
            });
        }
        for (key, properties) in updates {
            if let Some(existing) = self.nodes.get_mut(key) {
                existing.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Ok(updates.len())
    }

    fn replace_derived(&mut self, write: DerivedWrite<'_>) -> Result<(), EtlError> {
        // Staged on a copy, swapped in only once every step succeeded.
        let mut next = self.clone();
        next.replace_edges(EdgeLabel::SimilarTo, write.similarity)?;
        next.replace_edges(EdgeLabel::CoPurchased, write.co_purchase)?;
        next.set_properties(write.metrics)?;
        *self = next;
        Ok(())
    }

    fn node(&self, key: NodeKey) -> Result<Option<NodeRecord>, EtlError> {
        Ok(self.nodes.get(&key).map(|properties| NodeRecord {
            key,
            properties: properties.clone(),
        }))
    }

    fn nodes(&self, label: NodeLabel) -> Result<Vec<NodeRecord>, EtlError> {
        Ok(self
            .nodes
            .range(NodeKey::new(label, 0)..=NodeKey::new(label, u64::MAX))
            .map(|(key, properties)| NodeRecord {
                key: *key,
                properties: properties.clone(),
            })
            .collect())
    }

    fn edges(&self, label: EdgeLabel) -> Result<Vec<EdgeRecord>, EtlError> {
        Ok(self
            .edges
            .range((label, 0, 0)..=(label, u64::MAX, u64::MAX))
            .map(|((label, from, to), properties)| EdgeRecord {
                label: *label,
                from: *from,
                to: *to,
                properties: properties.clone(),
            })
            .collect())
    }

    fn node_count(&self) -> Result<usize, EtlError> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize, EtlError> {
        Ok(self.edges.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
