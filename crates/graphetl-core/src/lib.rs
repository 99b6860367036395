//! # graphetl-core
//!
//! The deterministic ETL engine for graphetl.
//!
//! This crate loads tabular business records (customers, products,
//! orders), derives secondary relationships (customer similarity, product
//! co-purchase) and per-customer metrics, and writes the result to a
//! labeled property graph sink.
//!
//! ## Architectural Constraints
//!
//! - Pure and synchronous: NO async, NO network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only, integer arithmetic only
//!   (money in cents, ratios in basis points)
//! - Derived state is recomputed wholesale per run and replaced atomically
//! - Graph algorithms (PageRank, Louvain, betweenness) are delegated to an
//!   external collaborator behind the [`Analytics`] trait

// =============================================================================
// MODULES
// =============================================================================

pub mod analytics;
pub mod derive;
pub mod export;
pub mod graph;
pub mod ingestor;
pub mod materialize;
pub mod metrics;
pub mod pipeline;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Customer, CustomerId, EdgeLabel, EdgeRecord, EntityKind, EtlError, Money, NodeKey, NodeLabel,
    NodeRecord, Order, OrderId, Product, ProductId, Properties, PropertyValue, Ratio,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use analytics::{
    Algorithm, AlgorithmOutcome, Analytics, AnalyticsPolicy, AnalyticsStatus,
    SimilarityProjection, Unavailable,
};
pub use derive::{CoPurchase, DerivedEdges, PairCounts, Similarity};
pub use export::{
    CanonicalGraph, CanonicalHeader, canonical_checksum, export_canonical, import_canonical,
    verify_canonical,
};
pub use graph::{DerivedWrite, GraphSink, MemoryGraph};
pub use ingestor::{Ingestor, Validate};
pub use metrics::{CustomerMetrics, CustomerTier, TierSummary};
pub use pipeline::{PipelineOptions, RunReport, run_pipeline};
pub use session::{Session, StorageBackend};
pub use storage::RedbGraph;
pub use store::{PurchaseFact, Record, RecordStore};
