//! # Metrics Aggregator
//!
//! Per-customer order metrics and tier classification.
//!
//! Every loaded customer gets a metrics row, including customers with no
//! orders. A missing `total_amount` is never treated as zero: the
//! customer's aggregation fails with `MissingRequiredField`.

use crate::primitives::{PREMIUM_SPEND_THRESHOLD, VIP_SPEND_THRESHOLD};
use crate::store::RecordStore;
use crate::types::{CustomerId, EntityKind, EtlError, Money, Order};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Spend-based customer classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CustomerTier {
    Standard,
    Premium,
    #[serde(rename = "VIP")]
    Vip,
}

impl CustomerTier {
    /// Classify a total spend. Both thresholds are strict.
    #[must_use]
    pub fn from_spent(total_spent: Money) -> Self {
        if total_spent > VIP_SPEND_THRESHOLD {
            Self::Vip
        } else if total_spent > PREMIUM_SPEND_THRESHOLD {
            Self::Premium
        } else {
            Self::Standard
        }
    }
}

impl fmt::Display for CustomerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "Standard",
            Self::Premium => "Premium",
            Self::Vip => "VIP",
        })
    }
}

impl FromStr for CustomerTier {
    type Err = EtlError;

    /// Parse the stored `customer_tier` text. Unknown names are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Premium" => Ok(Self::Premium),
            "VIP" => Ok(Self::Vip),
            other => Err(EtlError::SerializationError(format!(
                "unknown customer tier '{}'",
                other
            ))),
        }
    }
}

/// Aggregated order metrics of one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer: CustomerId,
    pub total_orders: u64,
    pub total_spent: Money,
    /// Absent when the customer has no orders.
    pub avg_order_value: Option<Money>,
    /// Absent when the customer has no orders.
    pub last_order_date: Option<NaiveDate>,
    pub tier: CustomerTier,
}

impl CustomerMetrics {
    /// Metrics of a customer with no orders.
    #[must_use]
    pub fn empty(customer: CustomerId) -> Self {
        Self {
            customer,
            total_orders: 0,
            total_spent: Money::ZERO,
            avg_order_value: None,
            last_order_date: None,
            tier: CustomerTier::Standard,
        }
    }

    /// Aggregate one customer's orders.
    ///
    /// # Errors
    /// - `MissingRequiredField` if any order has no `total_amount`
    /// - `InvalidRecord` if the spend total overflows
    pub fn from_orders(customer: CustomerId, orders: &[&Order]) -> Result<Self, EtlError> {
        if orders.is_empty() {
            return Ok(Self::empty(customer));
        }

        let mut total_spent = Money::ZERO;
        let mut last_order_date: Option<NaiveDate> = None;
        for order in orders {
            let amount = order.total_amount.ok_or(EtlError::MissingRequiredField {
                kind: EntityKind::Order,
                id: order.id.0,
                field: "total_amount",
            })?;
            total_spent = total_spent
                .checked_add(amount)
                .ok_or_else(|| EtlError::InvalidRecord {
                    kind: EntityKind::Customer,
                    id: customer.0,
                    reason: "total_spent overflows".to_string(),
                })?;
            last_order_date = last_order_date.max(Some(order.order_date));
        }

        let total_orders = orders.len() as u64;
        Ok(Self {
            customer,
            total_orders,
            total_spent,
            avg_order_value: total_spent.div_round(total_orders),
            last_order_date,
            tier: CustomerTier::from_spent(total_spent),
        })
    }
}

/// Metrics for every loaded customer, keyed by id.
///
/// # Errors
/// `MissingRequiredField` from the first customer with an order lacking
/// `total_amount`. No partial result is returned.
pub fn aggregate(store: &RecordStore) -> Result<BTreeMap<CustomerId, CustomerMetrics>, EtlError> {
    store
        .orders_by_customer()
        .into_iter()
        .map(|(customer, orders)| Ok((customer, CustomerMetrics::from_orders(customer, &orders)?)))
        .collect()
}

/// Number of customers in each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub standard: usize,
    pub premium: usize,
    pub vip: usize,
}

impl TierSummary {
    /// Count tiers over a metrics table.
    #[must_use]
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a CustomerMetrics>) -> Self {
        let mut summary = Self::default();
        for m in metrics {
            summary.count(m.tier);
        }
        summary
    }

    /// Add one customer of `tier`.
    pub fn count(&mut self, tier: CustomerTier) {
        match tier {
            CustomerTier::Standard => self.standard += 1,
            CustomerTier::Premium => self.premium += 1,
            CustomerTier::Vip => self.vip += 1,
        }
    }

    /// Total customers counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.standard + self.premium + self.vip
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::store::tests::{customer, date, order, product};

    #[test]
    fn tier_boundaries_are_strict() {
        assert_eq!(
            CustomerTier::from_spent(Money::from_cents(500_000)),
            CustomerTier::Premium
        );
        assert_eq!(
            CustomerTier::from_spent(Money::from_cents(500_001)),
            CustomerTier::Vip
        );
        assert_eq!(
            CustomerTier::from_spent(Money::from_cents(200_000)),
            CustomerTier::Standard
        );
        assert_eq!(
            CustomerTier::from_spent(Money::from_cents(200_001)),
            CustomerTier::Premium
        );
    }

    #[test]
    fn three_orders_aggregate() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();
        store.load(vec![product(1, "Books")]).unwrap();
        let mut last = order(3, 1, 1, 65_000);
        last.order_date = date(2023, 6, 30);
        store
            .load(vec![order(1, 1, 1, 10_000), order(2, 1, 1, 25_000), last])
            .unwrap();

        let metrics = aggregate(&store).unwrap();
        let m = &metrics[&CustomerId(1)];
        assert_eq!(m.total_orders, 3);
        assert_eq!(m.total_spent, Money::from_cents(100_000));
        assert_eq!(m.avg_order_value, Some(Money::from_cents(33_333)));
        assert_eq!(m.last_order_date, Some(date(2023, 6, 30)));
        assert_eq!(m.tier, CustomerTier::Standard);
    }

    #[test]
    fn zero_order_customer_is_standard() {
        let mut store = RecordStore::new();
        store.load(vec![customer(7)]).unwrap();
        let metrics = aggregate(&store).unwrap();
        assert_eq!(metrics[&CustomerId(7)], CustomerMetrics::empty(CustomerId(7)));
    }

    #[test]
    fn missing_total_amount_is_fatal() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();
        store.load(vec![product(1, "Books")]).unwrap();
        let mut o = order(5, 1, 1, 100);
        o.total_amount = None;
        store.load(vec![o]).unwrap();

        match aggregate(&store) {
            Err(EtlError::MissingRequiredField { kind, id, field }) => {
                assert_eq!(kind, EntityKind::Order);
                assert_eq!(id, 5);
                assert_eq!(field, "total_amount");
            }
            other => panic!("expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn tier_summary_counts() {
        let mut vip = CustomerMetrics::empty(CustomerId(2));
        vip.tier = CustomerTier::Vip;
        let rows = [CustomerMetrics::empty(CustomerId(1)), vip];
        let summary = TierSummary::from_metrics(&rows);
        assert_eq!(summary.standard, 1);
        assert_eq!(summary.vip, 1);
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn tier_parses_its_display_name() {
        for tier in [CustomerTier::Standard, CustomerTier::Premium, CustomerTier::Vip] {
            assert_eq!(tier.to_string().parse::<CustomerTier>().unwrap(), tier);
        }
    }

    #[test]
    fn unknown_tier_name_is_rejected() {
        for name in ["Gold", "vip", ""] {
            assert!(matches!(
                name.parse::<CustomerTier>(),
                Err(EtlError::SerializationError(_))
            ));
        }
    }

    #[test]
    fn tier_serializes_as_vip() {
        assert_eq!(
            serde_json::to_string(&CustomerTier::Vip).unwrap(),
            "\"VIP\""
        );
    }
}
