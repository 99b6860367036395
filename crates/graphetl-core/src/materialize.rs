//! # Materializer
//!
//! Turns Record Store contents, derived relationships and metrics into the
//! node/edge write format accepted by a [`crate::graph::GraphSink`].
//!
//! Node property names follow the source column names. Category nodes get
//! ids in ascending order of their names, starting at 1, so the same store
//! always materializes to the same graph.

use crate::derive::{CoPurchase, Similarity};
use crate::metrics::CustomerMetrics;
use crate::store::RecordStore;
use crate::types::{
    Customer, EdgeLabel, EdgeRecord, NodeKey, NodeLabel, NodeRecord, Order, Product, Properties,
    PropertyValue,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// NODES
// =============================================================================

/// Customer node with its source attributes.
#[must_use]
pub fn customer_node(customer: &Customer) -> NodeRecord {
    NodeRecord::new(NodeLabel::Customer, customer.id.0)
        .with("name", PropertyValue::Text(customer.name.clone()))
        .with("email", PropertyValue::Text(customer.email.clone()))
        .with("city", PropertyValue::Text(customer.city.clone()))
        .with("country", PropertyValue::Text(customer.country.clone()))
        .with("segment", PropertyValue::Text(customer.segment.clone()))
        .with(
            "registration_date",
            PropertyValue::Date(customer.registration_date),
        )
        .with(
            "lifetime_value",
            PropertyValue::Money(customer.lifetime_value),
        )
}

/// Product node. `margin` is the supplied margin or the one derived from
/// price and cost; it is omitted when neither is available.
#[must_use]
pub fn product_node(product: &Product) -> NodeRecord {
    let node = NodeRecord::new(NodeLabel::Product, product.id.0)
        .with("name", PropertyValue::Text(product.name.clone()))
        .with("category", PropertyValue::Text(product.category.clone()))
        .with("price", PropertyValue::Money(product.price))
        .with("cost", PropertyValue::Money(product.cost))
        .with("launch_date", PropertyValue::Date(product.launch_date));
    match product.effective_margin() {
        Some(margin) => node.with("margin", PropertyValue::Ratio(margin)),
        None => node,
    }
}

/// Order node. A missing `total_amount` is omitted, not written as zero.
#[must_use]
pub fn order_node(order: &Order) -> NodeRecord {
    let node = NodeRecord::new(NodeLabel::Order, order.id.0)
        .with("order_date", PropertyValue::Date(order.order_date))
        .with("quantity", PropertyValue::Int(i64::from(order.quantity)))
        .with("unit_price", PropertyValue::Money(order.unit_price))
        .with("discount", PropertyValue::Ratio(order.discount));
    match order.total_amount {
        Some(total) => node.with("total_amount", PropertyValue::Money(total)),
        None => node,
    }
}

/// Category ids by name: ascending names numbered from 1.
#[must_use]
pub fn category_ids(store: &RecordStore) -> BTreeMap<&str, u64> {
    store.categories().into_iter().zip(1u64..).collect()
}

// =============================================================================
// BASE GRAPH
// =============================================================================

/// The base graph of one store: every node plus PLACED, CONTAINS and
/// BELONGS_TO edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseGraph {
    /// Nodes in (label, id) order.
    pub nodes: Vec<NodeRecord>,
    /// Edges in (label, from, to) order.
    pub edges: Vec<EdgeRecord>,
}

impl BaseGraph {
    /// Materialize the store.
    ///
    /// Orders naming a missing customer or product produce edges to absent
    /// nodes; callers run [`RecordStore::join`] first to reject them.
    #[must_use]
    pub fn from_store(store: &RecordStore) -> Self {
        let categories = category_ids(store);

        let mut nodes: Vec<NodeRecord> = Vec::new();
        nodes.extend(store.customers().map(customer_node));
        nodes.extend(store.products().map(product_node));
        nodes.extend(store.orders().map(order_node));
        nodes.extend(categories.iter().map(|(name, id)| {
            NodeRecord::new(NodeLabel::Category, *id)
                .with("name", PropertyValue::Text((*name).to_string()))
        }));

        let mut edges: BTreeSet<(EdgeLabel, u64, u64)> = BTreeSet::new();
        for order in store.orders() {
            edges.insert((EdgeLabel::Placed, order.customer_id.0, order.id.0));
            edges.insert((EdgeLabel::Contains, order.id.0, order.product_id.0));
        }
        for product in store.products() {
            if let Some(category) = categories.get(product.category.as_str()) {
                edges.insert((EdgeLabel::BelongsTo, product.id.0, *category));
            }
        }

        Self {
            nodes,
            edges: edges
                .into_iter()
                .map(|(label, from, to)| EdgeRecord::new(label, from, to))
                .collect(),
        }
    }
}

// =============================================================================
// DERIVED EDGES AND METRICS
// =============================================================================

/// SIMILAR_TO edges carrying `strength`.
#[must_use]
pub fn similarity_edges(similarity: &BTreeSet<Similarity>) -> Vec<EdgeRecord> {
    similarity
        .iter()
        .map(|s| {
            EdgeRecord::new(EdgeLabel::SimilarTo, s.a.0, s.b.0)
                .with("strength", PropertyValue::Int(s.strength as i64))
        })
        .collect()
}

/// CO_PURCHASED edges carrying `frequency`.
#[must_use]
pub fn co_purchase_edges(co_purchase: &BTreeSet<CoPurchase>) -> Vec<EdgeRecord> {
    co_purchase
        .iter()
        .map(|c| {
            EdgeRecord::new(EdgeLabel::CoPurchased, c.a.0, c.b.0)
                .with("frequency", PropertyValue::Int(c.frequency as i64))
        })
        .collect()
}

/// Customer property update for one metrics row. Absent values are not
/// written.
#[must_use]
pub fn metrics_update(metrics: &CustomerMetrics) -> (NodeKey, Properties) {
    let mut properties = Properties::new();
    properties.insert(
        "total_orders".into(),
        PropertyValue::Int(metrics.total_orders as i64),
    );
    properties.insert(
        "total_spent".into(),
        PropertyValue::Money(metrics.total_spent),
    );
    if let Some(avg) = metrics.avg_order_value {
        properties.insert("avg_order_value".into(), PropertyValue::Money(avg));
    }
    if let Some(date) = metrics.last_order_date {
        properties.insert("last_order_date".into(), PropertyValue::Date(date));
    }
    properties.insert(
        "customer_tier".into(),
        PropertyValue::Text(metrics.tier.to_string()),
    );
    (
        NodeKey::new(NodeLabel::Customer, metrics.customer.0),
        properties,
    )
}

// =============================================================================
// TESTS
// =============================================================================
