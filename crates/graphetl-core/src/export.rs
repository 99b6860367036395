//! # Canonical Export Module
//!
//! `redb` files are not bit-identical across runs, even for identical
//! contents. `export_canonical()` serializes a sink into a sorted,
//! bit-exact `postcard` stream; two sinks holding the same graph always
//! export the same bytes. This export is what verification and hashing
//! operate on.

use crate::graph::GraphSink;
use crate::primitives::{CANONICAL_MAGIC, CANONICAL_VERSION};
use crate::types::{EdgeLabel, EdgeRecord, EtlError, NodeLabel, NodeRecord};
use serde::{Deserialize, Serialize};

/// Maximum allowed node count in canonical imports.
///
/// Checked against the header before the payload is decoded.
pub const MAX_IMPORT_NODE_COUNT: u64 = 10_000_000;

/// Maximum allowed edge count in canonical imports.
pub const MAX_IMPORT_EDGE_COUNT: u64 = 100_000_000;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over a byte slice.
#[must_use]
pub fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of nodes in the export.
    pub node_count: u64,

    /// Number of edges in the export.
    pub edge_count: u64,

    /// FNV-1a checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a new header with the given counts.
    #[must_use]
    pub fn new(node_count: u64, edge_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            node_count,
            edge_count,
            checksum,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), EtlError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(EtlError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(EtlError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

/// A graph in canonical format for bit-exact serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalGraph {
    /// Nodes sorted by (label, id).
    pub nodes: Vec<NodeRecord>,

    /// Edges sorted by (label, from, to).
    pub edges: Vec<EdgeRecord>,
}

impl CanonicalGraph {
    /// Read every node and edge of a sink in canonical order.
    ///
    /// Sinks return each label's records in id order, so walking the labels
    /// in code order yields the global sort.
    pub fn from_sink(sink: &dyn GraphSink) -> Result<Self, EtlError> {
        let mut nodes = Vec::new();
        for label in NodeLabel::ALL {
            nodes.extend(sink.nodes(label)?);
        }
        let mut edges = Vec::new();
        for label in EdgeLabel::ALL {
            edges.extend(sink.edges(label)?);
        }
        Ok(Self { nodes, edges })
    }

    /// Postcard encoding of the graph (the data section).
    pub fn to_bytes(&self) -> Result<Vec<u8>, EtlError> {
        postcard::to_allocvec(self).map_err(|e| EtlError::SerializationError(format!("Data: {}", e)))
    }

    /// Deterministic checksum of the data section.
    ///
    /// This is NOT a cryptographic hash. Use the `crypto-hash` feature for
    /// collision resistance.
    pub fn checksum(&self) -> Result<u64, EtlError> {
        Ok(fnv1a(&self.to_bytes()?))
    }

    /// Write the graph into a sink: all nodes, then all edges.
    pub fn load_into(&self, sink: &mut dyn GraphSink) -> Result<(), EtlError> {
        sink.write_nodes(&self.nodes)?;
        sink.write_edges(&self.edges)?;
        Ok(())
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a sink to canonical postcard format.
///
/// Format:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalGraph (postcard)]
/// ```
pub fn export_canonical(sink: &dyn GraphSink) -> Result<Vec<u8>, EtlError> {
    let canonical = CanonicalGraph::from_sink(sink)?;
    let data_bytes = canonical.to_bytes()?;

    let header = CanonicalHeader::new(
        canonical.nodes.len() as u64,
        canonical.edges.len() as u64,
        fnv1a(&data_bytes),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| EtlError::SerializationError(format!("Header: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Decode and verify a canonical export.
///
/// # Errors
/// `SerializationError` on a bad header, size limit breach, checksum
/// mismatch or count mismatch.
pub fn import_canonical(data: &[u8]) -> Result<CanonicalGraph, EtlError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(EtlError::SerializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(EtlError::SerializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| EtlError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    // Validate size limits before decoding the payload
    if header.node_count > MAX_IMPORT_NODE_COUNT {
        return Err(EtlError::SerializationError(format!(
            "Node count {} exceeds maximum allowed {}",
            header.node_count, MAX_IMPORT_NODE_COUNT
        )));
    }
    if header.edge_count > MAX_IMPORT_EDGE_COUNT {
        return Err(EtlError::SerializationError(format!(
            "Edge count {} exceeds maximum allowed {}",
            header.edge_count, MAX_IMPORT_EDGE_COUNT
        )));
    }

    let computed = fnv1a(data_bytes);
    if computed != header.checksum {
        return Err(EtlError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let canonical: CanonicalGraph = postcard::from_bytes(data_bytes)
        .map_err(|e| EtlError::SerializationError(format!("Data: {}", e)))?;

    if canonical.nodes.len() as u64 != header.node_count {
        return Err(EtlError::SerializationError(
            "Node count mismatch".to_string(),
        ));
    }
    if canonical.edges.len() as u64 != header.edge_count {
        return Err(EtlError::SerializationError(
            "Edge count mismatch".to_string(),
        ));
    }
    Ok(canonical)
}

/// Check that a sink holds exactly the graph of a canonical export.
pub fn verify_canonical(sink: &dyn GraphSink, canonical_data: &[u8]) -> Result<bool, EtlError> {
    let imported = import_canonical(canonical_data)?;
    Ok(CanonicalGraph::from_sink(sink)? == imported)
}

/// Compute the canonical checksum of a sink.
pub fn canonical_checksum(sink: &dyn GraphSink) -> Result<u64, EtlError> {
    CanonicalGraph::from_sink(sink)?.checksum()
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 hash of the canonical export, as 64 hex characters.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(sink: &dyn GraphSink) -> Result<String, EtlError> {
    Ok(compute_blake3_hash(&export_canonical(sink)?))
}

/// Compute a BLAKE3 hash of raw bytes.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
