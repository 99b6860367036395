//! # Analytics Seam
//!
//! Interface to an external graph-analytics collaborator (PageRank, Louvain
//! community detection, betweenness centrality) run over the customer
//! similarity projection. No algorithm is implemented here.
//!
//! Results are written back as customer node properties. The core does not
//! validate them beyond checking that the nodes exist.

use crate::graph::GraphSink;
use crate::types::{
    EdgeLabel, EdgeRecord, EtlError, NodeKey, NodeLabel, NodeRecord, Properties, PropertyValue,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Algorithms requested from the collaborator, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    PageRank,
    Louvain,
    Betweenness,
}

impl Algorithm {
    /// All algorithms in run order.
    pub const ALL: [Self; 3] = [Self::PageRank, Self::Louvain, Self::Betweenness];

    /// Customer property the algorithm's result is written to.
    #[must_use]
    pub const fn write_property(self) -> &'static str {
        match self {
            Self::PageRank => "pagerank",
            Self::Louvain => "community",
            Self::Betweenness => "betweenness",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PageRank => "PageRank",
            Self::Louvain => "Louvain",
            Self::Betweenness => "Betweenness",
        })
    }
}

/// What the orchestrator does with the analytics step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsPolicy {
    /// Do not run analytics.
    #[default]
    Skip,
    /// Run; record failures in the run report and continue.
    Report,
    /// Run; the first failure fails the run.
    Abort,
}

/// Customer nodes plus similarity edges, in the node/edge write format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityProjection {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl SimilarityProjection {
    /// Read the projection from a sink.
    pub fn from_sink(sink: &dyn GraphSink) -> Result<Self, EtlError> {
        Ok(Self {
            nodes: sink.nodes(NodeLabel::Customer)?,
            edges: sink.edges(EdgeLabel::SimilarTo)?,
        })
    }
}

/// Per-customer result of one algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmOutcome {
    pub algorithm: Algorithm,
    /// Customer id -> score or community id.
    pub scores: BTreeMap<u64, PropertyValue>,
}

impl AlgorithmOutcome {
    /// Customer property updates writing each score under the algorithm's
    /// property name.
    #[must_use]
    pub fn updates(&self) -> Vec<(NodeKey, Properties)> {
        self.scores
            .iter()
            .map(|(id, value)| {
                let mut properties = Properties::new();
                properties.insert(self.algorithm.write_property().to_string(), value.clone());
                (NodeKey::new(NodeLabel::Customer, *id), properties)
            })
            .collect()
    }
}

/// The external analytics collaborator.
pub trait Analytics {
    /// Run one algorithm over the projection.
    fn run(
        &mut self,
        algorithm: Algorithm,
        projection: &SimilarityProjection,
    ) -> Result<AlgorithmOutcome, EtlError>;
}

/// Collaborator used when none is configured: every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl Analytics for Unavailable {
    fn run(
        &mut self,
        algorithm: Algorithm,
        _projection: &SimilarityProjection,
    ) -> Result<AlgorithmOutcome, EtlError> {
        Err(EtlError::Analytics {
            algorithm,
            message: "no analytics collaborator configured".to_string(),
        })
    }
}

/// Result of one algorithm in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalyticsStatus {
    Completed { nodes_written: usize },
    Failed { message: String },
}

/// Run every algorithm under `policy` and write results back to the sink.
///
/// Under `Report` each failure is logged and recorded; under `Abort` the
/// first failure is returned. Writes made by earlier algorithms stay.
pub fn run_analytics(
    sink: &mut dyn GraphSink,
    analytics: &mut dyn Analytics,
    policy: AnalyticsPolicy,
) -> Result<BTreeMap<Algorithm, AnalyticsStatus>, EtlError> {
    let mut statuses = BTreeMap::new();
    if policy == AnalyticsPolicy::Skip {
        info!("analytics skipped");
        return Ok(statuses);
    }

    let projection = SimilarityProjection::from_sink(sink)?;
    info!(
        nodes = projection.nodes.len(),
        edges = projection.edges.len(),
        "similarity projection built"
    );

    for algorithm in Algorithm::ALL {
        let result = analytics
            .run(algorithm, &projection)
            .and_then(|outcome| sink.set_properties(&outcome.updates()));
        match result {
            Ok(nodes_written) => {
                info!(%algorithm, nodes_written, "analytics completed");
                statuses.insert(algorithm, AnalyticsStatus::Completed { nodes_written });
            }
            Err(e) if policy == AnalyticsPolicy::Abort => return Err(e),
            Err(e) => {
                warn!(%algorithm, error = %e, "analytics failed");
                statuses.insert(
                    algorithm,
                    AnalyticsStatus::Failed {
                        message: e.to_string(),
                    },
                );
            }
        }
    }
    Ok(statuses)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;

    /// Scores every projected customer with its edge degree; fails Louvain.
    struct DegreeAnalytics;

    impl Analytics for DegreeAnalytics {
        fn run(
            &mut self,
            algorithm: Algorithm,
            projection: &SimilarityProjection,
        ) -> Result<AlgorithmOutcome, EtlError> {
            if algorithm == Algorithm::Louvain {
                return Err(EtlError::Analytics {
                    algorithm,
                    message: "projection missing".into(),
                });
            }
            let scores = projection
                .nodes
                .iter()
                .map(|n| {
                    let degree = projection
                        .edges
                        .iter()
                        .filter(|e| e.from == n.key.id || e.to == n.key.id)
                        .count();
                    (n.key.id, PropertyValue::Int(degree as i64))
                })
                .collect();
            Ok(AlgorithmOutcome { algorithm, scores })
        }
    }

    fn sink() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph
            .write_nodes(&[
                NodeRecord::new(NodeLabel::Customer, 1),
                NodeRecord::new(NodeLabel::Customer, 2),
                NodeRecord::new(NodeLabel::Customer, 3),
            ])
            .unwrap();
        graph
            .replace_edges(
                EdgeLabel::SimilarTo,
                &[EdgeRecord::new(EdgeLabel::SimilarTo, 1, 2)
                    .with("strength", PropertyValue::Int(2))],
            )
            .unwrap();
        graph
    }

    #[test]
    fn skip_runs_nothing() {
        let mut graph = sink();
        let statuses =
            run_analytics(&mut graph, &mut Unavailable, AnalyticsPolicy::Skip).unwrap();
        assert!(statuses.is_empty());
    }

    #[test]
    fn report_records_failures_and_writes_successes() {
        let mut graph = sink();
        let statuses =
            run_analytics(&mut graph, &mut DegreeAnalytics, AnalyticsPolicy::Report).unwrap();

        assert_eq!(
            statuses[&Algorithm::PageRank],
            AnalyticsStatus::Completed { nodes_written: 3 }
        );
        assert!(matches!(
            statuses[&Algorithm::Louvain],
            AnalyticsStatus::Failed { .. }
        ));

        let node = graph
            .node(NodeKey::new(NodeLabel::Customer, 1))
            .unwrap()
            .unwrap();
        assert_eq!(node.properties["pagerank"], PropertyValue::Int(1));
        assert_eq!(node.properties["betweenness"], PropertyValue::Int(1));
        assert!(!node.properties.contains_key("community"));
    }

    #[test]
    fn abort_returns_first_failure() {
        let mut graph = sink();
        match run_analytics(&mut graph, &mut DegreeAnalytics, AnalyticsPolicy::Abort) {
            Err(EtlError::Analytics { algorithm, .. }) => {
                assert_eq!(algorithm, Algorithm::Louvain);
            }
            other => panic!("expected analytics failure, got {:?}", other),
        }
        // PageRank ran before the failure and its results stay.
        let node = graph
            .node(NodeKey::new(NodeLabel::Customer, 3))
            .unwrap()
            .unwrap();
        assert_eq!(node.properties["pagerank"], PropertyValue::Int(0));
    }

    #[test]
    fn projection_holds_customers_and_similarity_only() {
        let mut graph = sink();
        graph
            .write_nodes(&[NodeRecord::new(NodeLabel::Product, 1)])
            .unwrap();
        let projection = SimilarityProjection::from_sink(&graph).unwrap();
        assert_eq!(projection.nodes.len(), 3);
        assert_eq!(projection.edges.len(), 1);
    }

    #[test]
    fn policy_parses_lowercase() {
        let policy: AnalyticsPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, AnalyticsPolicy::Abort);
    }
}
