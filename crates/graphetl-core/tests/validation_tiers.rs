//! # Validation Tier Tests (T0-T3)
//!
//! If ANY tier fails, the pipeline output cannot be trusted.
//!
//! ## Tiers
//! - T0: Record Integrity
//! - T1: Relationship Derivation
//! - T2: Customer Metrics
//! - T3: Sink Writes and Re-runs

use chrono::NaiveDate;
use graphetl_core::{
    Customer, CustomerId, CustomerTier, DerivedEdges, EdgeLabel, EntityKind, EtlError, Ingestor,
    Money, NodeKey, NodeLabel, Order, OrderId, PipelineOptions, Product, ProductId,
    PropertyValue, Ratio, RecordStore, Similarity, Unavailable,
};
use std::collections::BTreeSet;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn customer(id: u64) -> Customer {
    Customer {
        id: CustomerId(id),
        name: format!("Customer {}", id),
        email: format!("customer{}@example.com", id),
        city: "Tokyo".into(),
        country: "Japan".into(),
        segment: "Consumer".into(),
        registration_date: date(2020, 1, 1),
        lifetime_value: Money::from_cents(50_000),
    }
}

fn product(id: u64) -> Product {
    Product {
        id: ProductId(id),
        name: format!("Product {}", id),
        category: if id % 2 == 0 { "Books" } else { "Electronics" }.into(),
        price: Money::from_cents(9_900),
        cost: Money::from_cents(4_000),
        margin: Some(Ratio::from_basis_points(2_500)),
        launch_date: date(2019, 3, 31),
    }
}

fn order(id: u64, customer: u64, product: u64, amount: &str) -> Order {
    let amount: Money = amount.parse().expect("amount");
    Order {
        id: OrderId(id),
        customer_id: CustomerId(customer),
        product_id: ProductId(product),
        order_date: date(2023, 1, 1 + (id % 28) as u32),
        quantity: 1,
        unit_price: amount,
        total_amount: Some(amount),
        discount: Ratio::default(),
    }
}

fn load(customers: &[u64], products: &[u64], orders: Vec<Order>) -> RecordStore {
    let mut store = RecordStore::new();
    Ingestor::load(&mut store, customers.iter().map(|id| customer(*id)).collect())
        .expect("customers");
    Ingestor::load(&mut store, products.iter().map(|id| product(*id)).collect())
        .expect("products");
    Ingestor::load(&mut store, orders).expect("orders");
    store
}

/// C1 {A,B}, C2 {A,B,C}, C3 {C} with A=1, B=2, C=3.
fn scenario_store() -> RecordStore {
    load(
        &[1, 2, 3],
        &[1, 2, 3],
        vec![
            order(1, 1, 1, "10.00"),
            order(2, 1, 2, "10.00"),
            order(3, 2, 1, "10.00"),
            order(4, 2, 2, "10.00"),
            order(5, 2, 3, "10.00"),
            order(6, 3, 3, "10.00"),
        ],
    )
}

// =============================================================================
// TIER T0: RECORD INTEGRITY
// =============================================================================

mod t0_record_integrity {
    use super::*;

    /// T0.1: A batch containing one duplicate leaves the store unchanged.
    #[test]
    fn duplicate_batch_is_all_or_nothing() {
        let mut store = load(&[1], &[], Vec::new());
        let result = Ingestor::load(&mut store, vec![customer(2), customer(3), customer(1)]);

        assert!(matches!(
            result,
            Err(EtlError::DuplicateIdentity {
                kind: EntityKind::Customer,
                id: 1
            })
        ));
        assert_eq!(store.count(EntityKind::Customer), 1);
    }

    /// T0.2: Invalid records are rejected before load.
    #[test]
    fn invalid_record_rejected() {
        let mut store = RecordStore::new();
        let mut bad = order(1, 1, 1, "5.00");
        bad.quantity = 0;
        assert!(matches!(
            Ingestor::load(&mut store, vec![bad]),
            Err(EtlError::InvalidRecord {
                kind: EntityKind::Order,
                id: 1,
                ..
            })
        ));
    }

    /// T0.3: Join fails on a dangling product reference.
    #[test]
    fn dangling_product_reference() {
        let store = load(&[1], &[1], vec![order(1, 1, 1, "1.00"), order(2, 1, 9, "1.00")]);
        assert!(matches!(
            store.join(),
            Err(EtlError::DanglingReference {
                order: OrderId(2),
                kind: EntityKind::Product,
                id: 9
            })
        ));
    }

    /// T0.4: Money parses exactly from decimal text.
    #[test]
    fn money_parsing_is_exact() {
        let parsed: Money = "5000.01".parse().expect("parse");
        assert_eq!(parsed.cents(), 500_001);
        assert!("1.001".parse::<Money>().is_err());
    }
}

// =============================================================================
// TIER T1: RELATIONSHIP DERIVATION
// =============================================================================

mod t1_derivation {
    use super::*;

    /// T1.1: The three-customer scenario yields exactly one similarity edge.
    #[test]
    fn scenario_single_similarity() {
        let derived = DerivedEdges::derive(&scenario_store()).expect("derive");
        let expected: BTreeSet<Similarity> = [Similarity {
            a: CustomerId(1),
            b: CustomerId(2),
            strength: 2,
        }]
        .into_iter()
        .collect();
        assert_eq!(derived.similarity, expected);
    }

    /// T1.2: Sharing exactly one product never produces an edge; two does.
    #[test]
    fn threshold_boundary() {
        let one = load(&[1, 2], &[1], vec![order(1, 1, 1, "1.00"), order(2, 2, 1, "1.00")]);
        assert!(DerivedEdges::derive(&one).expect("derive").similarity.is_empty());

        let two = load(
            &[1, 2],
            &[1, 2],
            vec![
                order(1, 1, 1, "1.00"),
                order(2, 2, 1, "1.00"),
                order(3, 1, 2, "1.00"),
                order(4, 2, 2, "1.00"),
            ],
        );
        let derived = DerivedEdges::derive(&two).expect("derive");
        assert_eq!(derived.similarity.len(), 1);
        assert_eq!(derived.similarity.iter().next().map(|s| s.strength), Some(2));
    }

    /// T1.3: No pair appears in both orientations; lower id comes first.
    #[test]
    fn canonical_orientation() {
        let derived = DerivedEdges::derive(&scenario_store()).expect("derive");
        for s in &derived.similarity {
            assert!(s.a < s.b);
            assert!(!derived.similarity.iter().any(|t| t.a == s.b && t.b == s.a));
        }
        for c in &derived.co_purchase {
            assert!(c.a < c.b);
        }
    }

    /// T1.4: Two derivations over an unchanged store are byte-identical.
    #[test]
    fn derivation_idempotent() {
        let store = scenario_store();
        let first = DerivedEdges::derive(&store).expect("first");
        let second = DerivedEdges::derive(&store).expect("second");
        assert_eq!(
            postcard::to_allocvec(&first).expect("encode"),
            postcard::to_allocvec(&second).expect("encode")
        );
    }
}

// =============================================================================
// TIER T2: CUSTOMER METRICS
// =============================================================================

mod t2_metrics {
    use super::*;
    use graphetl_core::metrics::aggregate;

    /// T2.1: Orders [100, 250, 650] aggregate to 3 / 1000.00 / 333.33 / Standard.
    #[test]
    fn aggregation_correctness() {
        let store = load(
            &[1],
            &[1],
            vec![
                order(1, 1, 1, "100"),
                order(2, 1, 1, "250"),
                order(3, 1, 1, "650"),
            ],
        );
        let metrics = aggregate(&store).expect("aggregate");
        let m = &metrics[&CustomerId(1)];
        assert_eq!(m.total_orders, 3);
        assert_eq!(m.total_spent, "1000".parse().expect("money"));
        assert_eq!(m.avg_order_value, Some("333.33".parse().expect("money")));
        assert_eq!(m.tier, CustomerTier::Standard);
    }

    /// T2.2: Exactly 5000 is Premium, 5000.01 is VIP.
    #[test]
    fn tier_boundary() {
        let store = load(
            &[1, 2],
            &[1],
            vec![order(1, 1, 1, "5000"), order(2, 2, 1, "5000.01")],
        );
        let metrics = aggregate(&store).expect("aggregate");
        assert_eq!(metrics[&CustomerId(1)].tier, CustomerTier::Premium);
        assert_eq!(metrics[&CustomerId(2)].tier, CustomerTier::Vip);
    }

    /// T2.3: A customer with no orders is Standard with absent averages.
    #[test]
    fn zero_order_customer() {
        let store = load(&[1, 2], &[1], vec![order(1, 1, 1, "10")]);
        let metrics = aggregate(&store).expect("aggregate");
        let m = &metrics[&CustomerId(2)];
        assert_eq!(m.total_orders, 0);
        assert_eq!(m.avg_order_value, None);
        assert_eq!(m.last_order_date, None);
        assert_eq!(m.tier, CustomerTier::Standard);
    }

    /// T2.4: A missing total_amount fails aggregation instead of counting as zero.
    #[test]
    fn missing_amount_fails() {
        let mut o = order(1, 1, 1, "10");
        o.total_amount = None;
        let store = load(&[1], &[1], vec![o]);
        assert!(matches!(
            aggregate(&store),
            Err(EtlError::MissingRequiredField {
                field: "total_amount",
                ..
            })
        ));
    }
}

// =============================================================================
// TIER T3: SINK WRITES AND RE-RUNS
// =============================================================================

mod t3_sink {
    use super::*;
    use graphetl_core::{Session, canonical_checksum, export_canonical};
    use tempfile::tempdir;

    /// T3.1: Re-running into redb replaces derived edges and yields an
    /// identical canonical checksum.
    #[test]
    fn redb_rerun_is_identical() {
        let temp = tempdir().expect("temp dir");
        let store = scenario_store();
        let options = PipelineOptions::default();

        let mut session = Session::with_redb(temp.path().join("etl.redb")).expect("open");
        session.run(&store, &mut Unavailable, &options).expect("first run");
        let first = canonical_checksum(session.sink()).expect("checksum");
        let edges = session.sink().edge_count().expect("count");

        session.run(&store, &mut Unavailable, &options).expect("second run");
        assert_eq!(canonical_checksum(session.sink()).expect("checksum"), first);
        assert_eq!(session.sink().edge_count().expect("count"), edges);
        assert_eq!(
            session
                .sink()
                .edges(EdgeLabel::SimilarTo)
                .expect("edges")
                .len(),
            1
        );
    }

    /// T3.2: Memory and redb sinks export the same bytes for the same run.
    #[test]
    fn backends_export_identically() {
        let temp = tempdir().expect("temp dir");
        let store = scenario_store();
        let options = PipelineOptions::default();

        let mut memory = Session::new();
        memory.run(&store, &mut Unavailable, &options).expect("memory run");
        let mut redb = Session::with_redb(temp.path().join("etl.redb")).expect("open");
        redb.run(&store, &mut Unavailable, &options).expect("redb run");

        assert_eq!(
            export_canonical(memory.sink()).expect("export"),
            export_canonical(redb.sink()).expect("export")
        );
    }

    /// T3.3: Metrics land on customer nodes.
    #[test]
    fn metrics_written_to_customers() {
        let mut session = Session::new();
        session
            .run(&scenario_store(), &mut Unavailable, &PipelineOptions::default())
            .expect("run");
        let node = session
            .sink()
            .node(NodeKey::new(NodeLabel::Customer, 2))
            .expect("lookup")
            .expect("present");
        assert_eq!(node.properties["total_orders"], PropertyValue::Int(3));
        assert_eq!(
            node.properties["total_spent"],
            PropertyValue::Money(Money::from_cents(3_000))
        );
    }
}
