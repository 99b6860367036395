//! # Record Store
//!
//! Holds the loaded customers, products and orders for one pipeline run,
//! keyed by identity, and resolves the order foreign keys.
//!
//! All collections are `BTreeMap`s so every iteration is in ascending id
//! order. The store is read-only while derivation and metrics run.

use crate::types::{Customer, CustomerId, EntityKind, EtlError, Order, OrderId, Product, ProductId};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A source record that can be loaded into the [`RecordStore`].
///
/// Each implementor knows its entity kind and which collection of the
/// store holds it, so `load` is one generic operation for all three kinds.
pub trait Record: Clone {
    /// Identity type, ordered so the collection iterates deterministically.
    type Id: Copy + Ord + Into<u64>;

    /// The entity kind, reported in errors.
    const KIND: EntityKind;

    /// This record's identity.
    fn id(&self) -> Self::Id;

    /// The collection holding records of this kind.
    fn table(store: &RecordStore) -> &BTreeMap<Self::Id, Self>;

    /// Mutable access to the collection holding records of this kind.
    fn table_mut(store: &mut RecordStore) -> &mut BTreeMap<Self::Id, Self>;
}

impl Record for Customer {
    type Id = CustomerId;
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> CustomerId {
        self.id
    }

    fn table(store: &RecordStore) -> &BTreeMap<CustomerId, Self> {
        &store.customers
    }

    fn table_mut(store: &mut RecordStore) -> &mut BTreeMap<CustomerId, Self> {
        &mut store.customers
    }
}

impl Record for Product {
    type Id = ProductId;
    const KIND: EntityKind = EntityKind::Product;

    fn id(&self) -> ProductId {
        self.id
    }

    fn table(store: &RecordStore) -> &BTreeMap<ProductId, Self> {
        &store.products
    }

    fn table_mut(store: &mut RecordStore) -> &mut BTreeMap<ProductId, Self> {
        &mut store.products
    }
}

impl Record for Order {
    type Id = OrderId;
    const KIND: EntityKind = EntityKind::Order;

    fn id(&self) -> OrderId {
        self.id
    }

    fn table(store: &RecordStore) -> &BTreeMap<OrderId, Self> {
        &store.orders
    }

    fn table_mut(store: &mut RecordStore) -> &mut BTreeMap<OrderId, Self> {
        &mut store.orders
    }
}

// =============================================================================
// PURCHASE FACT
// =============================================================================

/// One order resolved through its foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseFact<'a> {
    pub customer: &'a Customer,
    pub order: &'a Order,
    pub product: &'a Product,
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// In-memory collections of source records.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    customers: BTreeMap<CustomerId, Customer>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch of records of one kind.
    ///
    /// Fails with `DuplicateIdentity` if any id already exists in the store
    /// or appears twice in the batch. Nothing is inserted on failure.
    pub fn load<R: Record>(&mut self, records: Vec<R>) -> Result<usize, EtlError> {
        {
            let existing = R::table(self);
            let mut batch_ids = BTreeSet::new();
            for record in &records {
                let id = record.id();
                if existing.contains_key(&id) || !batch_ids.insert(id) {
                    return Err(EtlError::DuplicateIdentity {
                        kind: R::KIND,
                        id: id.into(),
                    });
                }
            }
        }

        let count = records.len();
        let table = R::table_mut(self);
        for record in records {
            table.insert(record.id(), record);
        }
        Ok(count)
    }

    /// Resolve every order to its (customer, order, product) triple.
    ///
    /// Facts are returned in ascending order id. Fails with
    /// `DanglingReference` on the first order naming a missing customer or
    /// product; no partial result is returned.
    pub fn join(&self) -> Result<Vec<PurchaseFact<'_>>, EtlError> {
        let mut facts = Vec::with_capacity(self.orders.len());
        for order in self.orders.values() {
            let customer = self.customers.get(&order.customer_id).ok_or(
                EtlError::DanglingReference {
                    order: order.id,
                    kind: EntityKind::Customer,
                    id: order.customer_id.0,
                },
            )?;
            let product = self.products.get(&order.product_id).ok_or(
                EtlError::DanglingReference {
                    order: order.id,
                    kind: EntityKind::Product,
                    id: order.product_id.0,
                },
            )?;
            facts.push(PurchaseFact {
                customer,
                order,
                product,
            });
        }
        Ok(facts)
    }

    /// Group orders by customer. Every loaded customer appears, including
    /// those with no orders. Orders naming an unknown customer are skipped;
    /// use [`RecordStore::join`] to detect them.
    #[must_use]
    pub fn orders_by_customer(&self) -> BTreeMap<CustomerId, Vec<&Order>> {
        let mut grouped: BTreeMap<CustomerId, Vec<&Order>> =
            self.customers.keys().map(|id| (*id, Vec::new())).collect();
        for order in self.orders.values() {
            if let Some(orders) = grouped.get_mut(&order.customer_id) {
                orders.push(order);
            }
        }
        grouped
    }

    /// Distinct product categories in ascending order.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<&str> {
        self.products.values().map(|p| p.category.as_str()).collect()
    }

    /// Lookup a customer by id.
    #[must_use]
    pub fn customer(&self, id: CustomerId) -> Option<&Customer> {
        self.customers.get(&id)
    }

    /// Lookup a product by id.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    /// Lookup an order by id.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// All customers in id order.
    pub fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.values()
    }

    /// All products in id order.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    /// All orders in id order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Number of records of one kind.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Customer => self.customers.len(),
            EntityKind::Product => self.products.len(),
            EntityKind::Order => self.orders.len(),
        }
    }

    /// Check if the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty() && self.products.is_empty() && self.orders.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.customers.clear();
        self.products.clear();
        self.orders.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Money, Ratio};
    use chrono::NaiveDate;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn customer(id: u64) -> Customer {
        Customer {
            id: CustomerId(id),
            name: format!("Customer {}", id),
            email: format!("customer{}@example.com", id),
            city: "London".into(),
            country: "UK".into(),
            segment: "SMB".into(),
            registration_date: date(2020, 1, 1),
            lifetime_value: Money::from_cents(100_000),
        }
    }

    pub(crate) fn product(id: u64, category: &str) -> Product {
        Product {
            id: ProductId(id),
            name: format!("Product {}", id),
            category: category.into(),
            price: Money::from_cents(10_000),
            cost: Money::from_cents(6_000),
            margin: None,
            launch_date: date(2019, 1, 31),
        }
    }

    pub(crate) fn order(id: u64, customer: u64, product: u64, cents: i64) -> Order {
        Order {
            id: OrderId(id),
            customer_id: CustomerId(customer),
            product_id: ProductId(product),
            order_date: date(2023, 1, 1),
            quantity: 1,
            unit_price: Money::from_cents(cents),
            total_amount: Some(Money::from_cents(cents)),
            discount: Ratio::default(),
        }
    }

    #[test]
    fn load_counts_records() {
        let mut store = RecordStore::new();
        let n = store.load(vec![customer(1), customer(2)]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.count(EntityKind::Customer), 2);
        assert!(store.customer(CustomerId(2)).is_some());
    }

    #[test]
    fn load_rejects_existing_id_without_partial_insert() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();

        let result = store.load(vec![customer(2), customer(1)]);
        assert!(matches!(
            result,
            Err(EtlError::DuplicateIdentity {
                kind: EntityKind::Customer,
                id: 1
            })
        ));
        assert_eq!(store.count(EntityKind::Customer), 1);
        assert!(store.customer(CustomerId(2)).is_none());
    }

    #[test]
    fn load_rejects_duplicate_within_batch() {
        let mut store = RecordStore::new();
        let result = store.load(vec![product(5, "Books"), product(5, "Home")]);
        assert!(matches!(
            result,
            Err(EtlError::DuplicateIdentity {
                kind: EntityKind::Product,
                id: 5
            })
        ));
        assert_eq!(store.count(EntityKind::Product), 0);
    }

    #[test]
    fn same_id_allowed_across_kinds() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();
        store.load(vec![product(1, "Books")]).unwrap();
        store.load(vec![order(1, 1, 1, 500)]).unwrap();
        assert_eq!(store.join().unwrap().len(), 1);
    }

    #[test]
    fn join_resolves_foreign_keys() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1), customer(2)]).unwrap();
        store.load(vec![product(10, "Books")]).unwrap();
        store
            .load(vec![order(101, 2, 10, 500), order(100, 1, 10, 700)])
            .unwrap();

        let facts = store.join().unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].order.id, OrderId(100));
        assert_eq!(facts[0].customer.id, CustomerId(1));
        assert_eq!(facts[1].customer.id, CustomerId(2));
        assert_eq!(facts[1].product.id, ProductId(10));
    }

    #[test]
    fn join_fails_on_missing_customer() {
        let mut store = RecordStore::new();
        store.load(vec![product(10, "Books")]).unwrap();
        store.load(vec![order(1, 99, 10, 500)]).unwrap();

        match store.join() {
            Err(EtlError::DanglingReference { order, kind, id }) => {
                assert_eq!(order, OrderId(1));
                assert_eq!(kind, EntityKind::Customer);
                assert_eq!(id, 99);
            }
            other => panic!("expected dangling reference, got {:?}", other),
        }
    }

    #[test]
    fn join_fails_on_missing_product() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();
        store
            .load(vec![order(1, 1, 1, 0), order(2, 1, 77, 0)])
            .unwrap();
        let result = store.join();
        assert!(matches!(
            result,
            Err(EtlError::DanglingReference {
                kind: EntityKind::Product,
                ..
            })
        ));
    }

    #[test]
    fn orders_by_customer_includes_customers_without_orders() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1), customer(2)]).unwrap();
        store.load(vec![product(10, "Books")]).unwrap();
        store.load(vec![order(1, 1, 10, 500)]).unwrap();

        let grouped = store.orders_by_customer();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&CustomerId(1)].len(), 1);
        assert!(grouped[&CustomerId(2)].is_empty());
    }

    #[test]
    fn categories_are_distinct_and_sorted() {
        let mut store = RecordStore::new();
        store
            .load(vec![
                product(1, "Home"),
                product(2, "Books"),
                product(3, "Home"),
            ])
            .unwrap();
        let categories: Vec<_> = store.categories().into_iter().collect();
        assert_eq!(categories, vec!["Books", "Home"]);
    }

    #[test]
    fn clear_empties_store() {
        let mut store = RecordStore::new();
        store.load(vec![customer(1)]).unwrap();
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
