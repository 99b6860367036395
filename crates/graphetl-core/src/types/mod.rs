//! # Core Type Definitions
//!
//! This module contains all core types for the graphetl pipeline:
//! - Entity identifiers (`CustomerId`, `ProductId`, `OrderId`)
//! - Source records (`Customer`, `Product`, `Order`)
//! - Fixed-point values (`Money`, `Ratio`)
//! - Graph labels and property values used by the sink
//! - Error types (`EtlError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they key a `BTreeMap`/`BTreeSet`

mod decimal;

pub use decimal::{Money, Ratio, parse_scaled};

use crate::analytics::Algorithm;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// ENTITY IDENTIFIERS
// =============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw identity value.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identity of a customer.
    CustomerId
);
entity_id!(
    /// Unique identity of a product.
    ProductId
);
entity_id!(
    /// Unique identity of an order.
    OrderId
);

/// The three kinds of source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Customer,
    Product,
    Order,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::Product => "product",
            Self::Order => "order",
        })
    }
}

// =============================================================================
// SOURCE RECORDS
// =============================================================================

/// A customer as loaded from the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub city: String,
    pub country: String,
    pub segment: String,
    pub registration_date: NaiveDate,
    pub lifetime_value: Money,
}

/// A product as loaded from the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub cost: Money,
    /// Supplied margin. When absent it is derived from price and cost.
    #[serde(default)]
    pub margin: Option<Ratio>,
    pub launch_date: NaiveDate,
}

impl Product {
    /// The supplied margin, or `(price - cost) / price` when none was given.
    #[must_use]
    pub fn effective_margin(&self) -> Option<Ratio> {
        self.margin.or_else(|| Ratio::margin(self.price, self.cost))
    }
}

/// A single-product order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub order_date: NaiveDate,
    pub quantity: u32,
    pub unit_price: Money,
    /// Realized (post-discount) amount. May be missing in the source;
    /// aggregation refuses to treat a missing amount as zero.
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub discount: Ratio,
}

// =============================================================================
// GRAPH LABELS
// =============================================================================

/// Node labels written to the graph sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Customer,
    Product,
    Order,
    Category,
}

impl NodeLabel {
    /// All labels in storage order.
    pub const ALL: [Self; 4] = [Self::Customer, Self::Product, Self::Order, Self::Category];

    /// Stable one-byte code used in storage keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Customer => 1,
            Self::Product => 2,
            Self::Order => 3,
            Self::Category => 4,
        }
    }

    /// Inverse of [`NodeLabel::code`].
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "Customer",
            Self::Product => "Product",
            Self::Order => "Order",
            Self::Category => "Category",
        })
    }
}

/// Relationship labels written to the graph sink.
///
/// `Placed`, `Contains` and `BelongsTo` mirror the source tables.
/// `SimilarTo` and `CoPurchased` are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    Placed,
    Contains,
    BelongsTo,
    SimilarTo,
    CoPurchased,
}

impl EdgeLabel {
    /// All labels in storage order.
    pub const ALL: [Self; 5] = [
        Self::Placed,
        Self::Contains,
        Self::BelongsTo,
        Self::SimilarTo,
        Self::CoPurchased,
    ];

    /// Stable one-byte code used in storage keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Placed => 1,
            Self::Contains => 2,
            Self::BelongsTo => 3,
            Self::SimilarTo => 4,
            Self::CoPurchased => 5,
        }
    }

    /// Inverse of [`EdgeLabel::code`].
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// The (source, target) node labels this relationship connects.
    #[must_use]
    pub const fn endpoints(self) -> (NodeLabel, NodeLabel) {
        match self {
            Self::Placed => (NodeLabel::Customer, NodeLabel::Order),
            Self::Contains => (NodeLabel::Order, NodeLabel::Product),
            Self::BelongsTo => (NodeLabel::Product, NodeLabel::Category),
            Self::SimilarTo => (NodeLabel::Customer, NodeLabel::Customer),
            Self::CoPurchased => (NodeLabel::Product, NodeLabel::Product),
        }
    }

    /// Derived relationships are replaced wholesale on every run.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        matches!(self, Self::SimilarTo | Self::CoPurchased)
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Placed => "PLACED",
            Self::Contains => "CONTAINS",
            Self::BelongsTo => "BELONGS_TO",
            Self::SimilarTo => "SIMILAR_TO",
            Self::CoPurchased => "CO_PURCHASED",
        })
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// A typed property value on a node or relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Text(String),
    Money(Money),
    Ratio(Ratio),
    Date(NaiveDate),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
            Self::Money(v) => write!(f, "{}", v),
            Self::Ratio(v) => write!(f, "{}", v),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

/// Property map of a node or relationship, ordered by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Identity of a node in the sink: label plus numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub id: u64,
}

impl NodeKey {
    /// Create a new node key.
    #[must_use]
    pub const fn new(label: NodeLabel, id: u64) -> Self {
        Self { label, id }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.id)
    }
}

/// A node in the write format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: NodeKey,
    pub properties: Properties,
}

impl NodeRecord {
    /// Create a node with no properties.
    #[must_use]
    pub fn new(label: NodeLabel, id: u64) -> Self {
        Self {
            key: NodeKey::new(label, id),
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }
}

/// A relationship in the write format. Endpoint labels follow from `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub label: EdgeLabel,
    pub from: u64,
    pub to: u64,
    pub properties: Properties,
}

impl EdgeRecord {
    /// Create a relationship with no properties.
    #[must_use]
    pub fn new(label: EdgeLabel, from: u64, to: u64) -> Self {
        Self {
            label,
            from,
            to,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Source node key.
    #[must_use]
    pub fn source(&self) -> NodeKey {
        NodeKey::new(self.label.endpoints().0, self.from)
    }

    /// Target node key.
    #[must_use]
    pub fn target(&self) -> NodeKey {
        NodeKey::new(self.label.endpoints().1, self.to)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the graphetl pipeline.
///
/// - No silent failures
/// - Use `Result<T, EtlError>` for fallible operations
/// - Nothing is retried: every error is a property of the input data or
///   the sink, and repeating the call reproduces it
#[derive(Debug, Error)]
pub enum EtlError {
    /// A record's id collides with an existing record of the same kind.
    #[error("Duplicate {kind} identity: {id}")]
    DuplicateIdentity { kind: EntityKind, id: u64 },

    /// An order references a customer or product that is not loaded.
    #[error("Order {order} references missing {kind} {id}")]
    DanglingReference {
        order: OrderId,
        kind: EntityKind,
        id: u64,
    },

    /// A field required for a computation is absent.
    #[error("Missing required field '{field}' on {kind} {id}")]
    MissingRequiredField {
        kind: EntityKind,
        id: u64,
        field: &'static str,
    },

    /// A record failed validation before load.
    #[error("Invalid {kind} record {id}: {reason}")]
    InvalidRecord {
        kind: EntityKind,
        id: u64,
        reason: String,
    },

    /// Decimal text could not be parsed into a fixed-point value.
    #[error("Invalid decimal value: {0}")]
    InvalidDecimal(String),

    /// A node write collided with an existing node under a uniqueness constraint.
    #[error("Uniqueness constraint violated: {label} {id}")]
    ConstraintViolation { label: NodeLabel, id: u64 },

    /// The requested node was not found in the sink.
    #[error("Node not found: {label} {id}")]
    NodeNotFound { label: NodeLabel, id: u64 },

    /// A relationship batch contained a record of a different label.
    #[error("Edge label mismatch: expected {expected}, found {found}")]
    LabelMismatch { expected: EdgeLabel, found: EdgeLabel },

    /// The external analytics collaborator reported a failure.
    #[error("Analytics {algorithm} failed: {message}")]
    Analytics { algorithm: Algorithm, message: String },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
