//! # Relationship Derivation Engine
//!
//! Derives customer similarity and product co-purchase relationships from
//! joined purchase facts.
//!
//! ## Algorithm
//!
//! 1. Build an inverted index (product -> distinct customers, or
//!    customer -> distinct products).
//! 2. For every group, count each unordered member pair once.
//! 3. Emit canonical pairs (lower id first) whose count reaches the threshold.
//!
//! Repeated orders of the same product by the same customer count once.
//! Outputs are `BTreeSet`s, so re-running over an unchanged store is
//! identical pair for pair and score for score.
//!
//! Accumulators ([`PairCounts`]) merge by summation, so the grouping may be
//! split into partitions, counted separately, and merged.

use crate::graph::GraphSink;
use crate::primitives::{MIN_CO_PURCHASE_FREQUENCY, MIN_SIMILARITY_STRENGTH};
use crate::store::{PurchaseFact, RecordStore};
use crate::types::{CustomerId, EdgeLabel, EdgeRecord, EtlError, ProductId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// DERIVED RELATIONSHIPS
// =============================================================================

/// Two customers who bought at least [`MIN_SIMILARITY_STRENGTH`] common
/// products. `a < b` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Similarity {
    pub a: CustomerId,
    pub b: CustomerId,
    /// Number of distinct products both customers bought.
    pub strength: u64,
}

/// Two products bought by at least [`MIN_CO_PURCHASE_FREQUENCY`] common
/// customers. `a < b` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoPurchase {
    pub a: ProductId,
    pub b: ProductId,
    /// Number of distinct customers who bought both products.
    pub frequency: u64,
}

// =============================================================================
// PAIR ACCUMULATOR
// =============================================================================

/// Co-occurrence counts over canonical (lower, higher) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairCounts<K: Ord> {
    counts: BTreeMap<(K, K), u64>,
}

impl<K: Ord> Default for PairCounts<K> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> PairCounts<K> {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every unordered pair of a group once.
    ///
    /// The set iterates in ascending order, so `(members[i], members[j])`
    /// with `i < j` is already canonical.
    pub fn add_group(&mut self, members: &BTreeSet<K>) {
        let members: Vec<K> = members.iter().copied().collect();
        for (i, first) in members.iter().enumerate() {
            for second in &members[i + 1..] {
                *self.counts.entry((*first, *second)).or_insert(0) += 1;
            }
        }
    }

    /// Accumulate a whole grouping.
    pub fn from_groups<'a, I>(groups: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeSet<K>>,
        K: 'a,
    {
        let mut counts = Self::new();
        for group in groups {
            counts.add_group(group);
        }
        counts
    }

    /// Sum another accumulator into this one.
    pub fn merge(&mut self, other: Self) {
        for (pair, count) in other.counts {
            *self.counts.entry(pair).or_insert(0) += count;
        }
    }

    /// Count for a pair in either order.
    #[must_use]
    pub fn get(&self, x: K, y: K) -> u64 {
        let pair = if x <= y { (x, y) } else { (y, x) };
        self.counts.get(&pair).copied().unwrap_or(0)
    }

    /// Pairs whose count is at least `min`, in canonical order.
    pub fn at_least(&self, min: u64) -> impl Iterator<Item = (K, K, u64)> + '_ {
        self.counts
            .iter()
            .filter(move |(_, count)| **count >= min)
            .map(|((a, b), count)| (*a, *b, *count))
    }

    /// Number of distinct pairs seen (before thresholding).
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no pair has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// =============================================================================
// INVERTED INDICES
// =============================================================================

/// product -> distinct customers who ordered it.
#[must_use]
pub fn customers_by_product(facts: &[PurchaseFact<'_>]) -> BTreeMap<ProductId, BTreeSet<CustomerId>> {
    let mut index: BTreeMap<ProductId, BTreeSet<CustomerId>> = BTreeMap::new();
    for fact in facts {
        index
            .entry(fact.product.id)
            .or_default()
            .insert(fact.customer.id);
    }
    index
}

/// customer -> distinct products they ordered.
#[must_use]
pub fn products_by_customer(facts: &[PurchaseFact<'_>]) -> BTreeMap<CustomerId, BTreeSet<ProductId>> {
    let mut index: BTreeMap<CustomerId, BTreeSet<ProductId>> = BTreeMap::new();
    for fact in facts {
        index
            .entry(fact.customer.id)
            .or_default()
            .insert(fact.product.id);
    }
    index
}

/// Thresholded similarity edges from accumulated customer pair counts.
#[must_use]
pub fn similarities(counts: &PairCounts<CustomerId>) -> BTreeSet<Similarity> {
    counts
        .at_least(MIN_SIMILARITY_STRENGTH)
        .map(|(a, b, strength)| Similarity { a, b, strength })
        .collect()
}

/// Thresholded co-purchase edges from accumulated product pair counts.
#[must_use]
pub fn co_purchases(counts: &PairCounts<ProductId>) -> BTreeSet<CoPurchase> {
    counts
        .at_least(MIN_CO_PURCHASE_FREQUENCY)
        .map(|(a, b, frequency)| CoPurchase { a, b, frequency })
        .collect()
}

// =============================================================================
// DERIVATION
// =============================================================================

/// Customer pairs sharing at least two distinct products.
///
/// # Errors
/// `DanglingReference` if any order names a missing customer or product.
pub fn derive_similarity(store: &RecordStore) -> Result<BTreeSet<Similarity>, EtlError> {
    let facts = store.join()?;
    let index = customers_by_product(&facts);
    Ok(similarities(&PairCounts::from_groups(index.values())))
}

/// Product pairs bought together by at least two distinct customers.
///
/// # Errors
/// `DanglingReference` if any order names a missing customer or product.
pub fn derive_co_purchase(store: &RecordStore) -> Result<BTreeSet<CoPurchase>, EtlError> {
    let facts = store.join()?;
    let index = products_by_customer(&facts);
    Ok(co_purchases(&PairCounts::from_groups(index.values())))
}

/// Both derived relationship sets of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedEdges {
    pub similarity: BTreeSet<Similarity>,
    pub co_purchase: BTreeSet<CoPurchase>,
}

impl DerivedEdges {
    /// Derive both sets from one join of the store.
    ///
    /// # Errors
    /// `DanglingReference` if any order names a missing customer or product.
    pub fn derive(store: &RecordStore) -> Result<Self, EtlError> {
        Ok(Self::from_facts(&store.join()?))
    }

    /// Derive both sets from already joined purchase facts.
    #[must_use]
    pub fn from_facts(facts: &[PurchaseFact<'_>]) -> Self {
        let by_product = customers_by_product(facts);
        let by_customer = products_by_customer(facts);
        Self {
            similarity: similarities(&PairCounts::from_groups(by_product.values())),
            co_purchase: co_purchases(&PairCounts::from_groups(by_customer.values())),
        }
    }

    /// Similarity edges involving `customer`, strongest first.
    #[must_use]
    pub fn similar_to(&self, customer: CustomerId) -> Vec<(CustomerId, u64)> {
        let mut found: Vec<(CustomerId, u64)> = self
            .similarity
            .iter()
            .filter_map(|s| {
                if s.a == customer {
                    Some((s.b, s.strength))
                } else if s.b == customer {
                    Some((s.a, s.strength))
                } else {
                    None
                }
            })
            .collect();
        found.sort_by(|x, y| y.1.cmp(&x.1).then(x.0.cmp(&y.0)));
        found
    }

    /// Read back the derived edges a previous run wrote to `sink`.
    pub fn from_sink(sink: &dyn GraphSink) -> Result<Self, EtlError> {
        let mut derived = Self::default();
        for edge in sink.edges(EdgeLabel::SimilarTo)? {
            derived.similarity.insert(Similarity {
                a: CustomerId(edge.from),
                b: CustomerId(edge.to),
                strength: edge_count(&edge, "strength")?,
            });
        }
        for edge in sink.edges(EdgeLabel::CoPurchased)? {
            derived.co_purchase.insert(CoPurchase {
                a: ProductId(edge.from),
                b: ProductId(edge.to),
                frequency: edge_count(&edge, "frequency")?,
            });
        }
        Ok(derived)
    }
}

fn edge_count(edge: &EdgeRecord, property: &str) -> Result<u64, EtlError> {
    match edge.properties.get(property) {
        Some(PropertyValue::Int(v)) if *v >= 0 => Ok(*v as u64),
        _ => Err(EtlError::SerializationError(format!(
            "{} edge {}->{} has no valid '{}'",
            edge.label, edge.from, edge.to, property
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
