//! # Pipeline
//!
//! Sequences one ETL run:
//!
//! 1. Resolve foreign keys, derive relationships and aggregate metrics
//!    over the store snapshot. Nothing is written if any of this fails.
//! 2. Optionally clear the sink, then enable uniqueness constraints.
//! 3. Write base nodes and edges in batches of [`WRITE_BATCH_SIZE`].
//! 4. Replace both derived relationship labels and merge customer metrics
//!    in one atomic sink call.
//! 5. Run analytics under the configured policy.

use crate::analytics::{Algorithm, Analytics, AnalyticsPolicy, AnalyticsStatus, run_analytics};
use crate::derive::DerivedEdges;
use crate::graph::{DerivedWrite, GraphSink};
use crate::materialize::{BaseGraph, co_purchase_edges, metrics_update, similarity_edges};
use crate::metrics::{CustomerMetrics, TierSummary, aggregate};
use crate::primitives::WRITE_BATCH_SIZE;
use crate::store::RecordStore;
use crate::types::{CustomerId, EntityKind, EtlError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Orchestration switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Remove every node and edge before loading.
    pub clear_before_load: bool,
    /// Analytics step behaviour.
    pub analytics: AnalyticsPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            clear_before_load: true,
            analytics: AnalyticsPolicy::Skip,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub customers: usize,
    pub products: usize,
    pub orders: usize,
    pub categories: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub similarity_edges: usize,
    pub co_purchase_edges: usize,
    pub tiers: TierSummary,
    pub analytics: BTreeMap<Algorithm, AnalyticsStatus>,
}

/// Call `write` once per batch of at most [`WRITE_BATCH_SIZE`] items.
fn write_batched<T, F>(items: &[T], what: &str, mut write: F) -> Result<usize, EtlError>
where
    F: FnMut(&[T]) -> Result<usize, EtlError>,
{
    let mut written = 0;
    for (index, batch) in items.chunks(WRITE_BATCH_SIZE).enumerate() {
        written += write(batch)?;
        debug!(what, batch = index, size = batch.len(), "batch written");
    }
    Ok(written)
}

/// Replace derived edges and write metrics for an already loaded base graph.
///
/// Derivation and aggregation complete before the sink is touched, and the
/// sink applies the result as one unit: on failure the previous derived
/// edges and metrics stay in place.
pub fn refresh_derived(
    store: &RecordStore,
    sink: &mut dyn GraphSink,
) -> Result<(DerivedEdges, BTreeMap<CustomerId, CustomerMetrics>), EtlError> {
    let derived = DerivedEdges::derive(store)?;
    let metrics = aggregate(store)?;
    write_derived(sink, &derived, &metrics)?;
    Ok((derived, metrics))
}

fn write_derived(
    sink: &mut dyn GraphSink,
    derived: &DerivedEdges,
    metrics: &BTreeMap<CustomerId, CustomerMetrics>,
) -> Result<(), EtlError> {
    let similarity = similarity_edges(&derived.similarity);
    let co_purchase = co_purchase_edges(&derived.co_purchase);
    let updates: Vec<_> = metrics.values().map(metrics_update).collect();
    sink.replace_derived(DerivedWrite {
        similarity: &similarity,
        co_purchase: &co_purchase,
        metrics: &updates,
    })?;
    info!(
        similar_to = similarity.len(),
        co_purchased = co_purchase.len(),
        customers = updates.len(),
        "derived state replaced"
    );
    Ok(())
}

/// Run the full pipeline over `store` into `sink`.
pub fn run_pipeline(
    store: &RecordStore,
    sink: &mut dyn GraphSink,
    analytics: &mut dyn Analytics,
    options: &PipelineOptions,
) -> Result<RunReport, EtlError> {
    // Compute everything before touching the sink.
    let facts = store.join()?;
    debug!(facts = facts.len(), "orders joined");
    let derived = DerivedEdges::from_facts(&facts);
    let metrics = aggregate(store)?;
    let base = BaseGraph::from_store(store);
    info!(
        similarity = derived.similarity.len(),
        co_purchase = derived.co_purchase.len(),
        customers = metrics.len(),
        "derivation complete"
    );

    if options.clear_before_load {
        sink.clear()?;
        info!("sink cleared");
    }
    sink.ensure_constraints()?;

    let nodes_written = write_batched(&base.nodes, "nodes", |batch| sink.write_nodes(batch))?;
    let edges_written = write_batched(&base.edges, "edges", |batch| sink.write_edges(batch))?;
    info!(nodes = nodes_written, edges = edges_written, "base graph loaded");

    write_derived(sink, &derived, &metrics)?;

    let analytics = run_analytics(sink, analytics, options.analytics)?;

    Ok(RunReport {
        customers: store.count(EntityKind::Customer),
        products: store.count(EntityKind::Product),
        orders: store.count(EntityKind::Order),
        categories: store.categories().len(),
        nodes_written,
        edges_written,
        similarity_edges: derived.similarity.len(),
        co_purchase_edges: derived.co_purchase.len(),
        tiers: TierSummary::from_metrics(metrics.values()),
        analytics,
    })
}

// =============================================================================
// TESTS
// =============================================================================
