//! # Persistent Storage
//!
//! Disk-backed implementations of [`crate::graph::GraphSink`].

mod redb_graph;

pub use redb_graph::RedbGraph;
