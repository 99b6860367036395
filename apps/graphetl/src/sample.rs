//! # Sample Data
//!
//! Deterministic sample records for trying the pipeline without real data.
//!
//! Each table draws from its own PCG stream derived from the master seed,
//! so changing the number of customers never changes the products drawn.
//! All draws are integers: money in cents, ratios in basis points.

use crate::records::RecordSet;
use chrono::{Days, NaiveDate};
use graphetl_core::{
    Customer, CustomerId, EntityKind, EtlError, Money, Order, OrderId, Product, ProductId, Ratio,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const CITIES: [&str; 4] = ["New York", "London", "Tokyo", "Sydney"];
const COUNTRIES: [&str; 4] = ["USA", "UK", "Japan", "Australia"];
const SEGMENTS: [&str; 3] = ["Enterprise", "SMB", "Consumer"];
const CATEGORIES: [&str; 4] = ["Electronics", "Clothing", "Books", "Home"];

/// Stable stream slots. Append only.
#[derive(Clone, Copy)]
#[repr(u64)]
enum Stream {
    Customers = 1,
    Products = 2,
    Orders = 3,
}

fn stream(seed: u64, slot: Stream) -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(seed ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

/// Size and seed of a generated data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub seed: u64,
    pub customers: u64,
    pub products: u64,
    pub orders: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            customers: 100,
            products: 20,
            orders: 200,
        }
    }
}

fn pick<'a, R: Rng>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values[rng.gen_range(0..values.len())]
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, EtlError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EtlError::SerializationError(format!("invalid date {}-{}-{}", year, month, day)))
}

fn plus_days(start: NaiveDate, days: u64) -> Result<NaiveDate, EtlError> {
    start
        .checked_add_days(Days::new(days))
        .ok_or_else(|| EtlError::SerializationError(format!("date overflow: {} + {} days", start, days)))
}

/// Last day of the `index`-th month after January 2019.
fn month_end(index: u64) -> Result<NaiveDate, EtlError> {
    let months = index + 1;
    let year = 2019 + (months / 12) as i32;
    let month = (months % 12) as u32 + 1;
    let next_first = date(year, month, 1)?;
    next_first
        .pred_opt()
        .ok_or_else(|| EtlError::SerializationError(format!("no day before {}", next_first)))
}

fn customers(spec: &SampleSpec) -> Result<Vec<Customer>, EtlError> {
    let mut rng = stream(spec.seed, Stream::Customers);
    let first = date(2020, 1, 1)?;
    (1..=spec.customers)
        .map(|id| {
            Ok(Customer {
                id: CustomerId(id),
                name: format!("Customer {}", id),
                email: format!("customer{}@example.com", id),
                city: pick(&mut rng, &CITIES).to_string(),
                country: pick(&mut rng, &COUNTRIES).to_string(),
                segment: pick(&mut rng, &SEGMENTS).to_string(),
                registration_date: plus_days(first, id - 1)?,
                lifetime_value: Money::from_cents(rng.gen_range(10_000..=1_000_000)),
            })
        })
        .collect()
}

fn products(spec: &SampleSpec) -> Result<Vec<Product>, EtlError> {
    let mut rng = stream(spec.seed, Stream::Products);
    (1..=spec.products)
        .map(|id| {
            let price: i64 = rng.gen_range(1_000..=100_000);
            let margin: i64 = rng.gen_range(1_000..=5_000);
            let cost = price - price * margin / Ratio::ONE.basis_points();
            Ok(Product {
                id: ProductId(id),
                name: format!("Product {}", id),
                category: pick(&mut rng, &CATEGORIES).to_string(),
                price: Money::from_cents(price),
                cost: Money::from_cents(cost),
                margin: Some(Ratio::from_basis_points(margin)),
                launch_date: month_end(id - 1)?,
            })
        })
        .collect()
}

fn orders(spec: &SampleSpec, products: &[Product]) -> Result<Vec<Order>, EtlError> {
    let mut rng = stream(spec.seed, Stream::Orders);
    let first = date(2023, 1, 1)?;
    (1..=spec.orders)
        .map(|id| {
            let customer = rng.gen_range(1..=spec.customers);
            let product = &products[rng.gen_range(0..products.len())];
            let quantity: u32 = rng.gen_range(1..=4);
            let discount: i64 = rng.gen_range(0..=3_000);
            let gross = product.price.cents() * quantity as i64;
            let total = gross * (Ratio::ONE.basis_points() - discount) / Ratio::ONE.basis_points();
            Ok(Order {
                id: OrderId(id),
                customer_id: CustomerId(customer),
                product_id: product.id,
                order_date: plus_days(first, rng.gen_range(0..365))?,
                quantity,
                unit_price: product.price,
                total_amount: Some(Money::from_cents(total)),
                discount: Ratio::from_basis_points(discount),
            })
        })
        .collect()
}

/// Generate a record set. The same spec always yields the same records.
pub fn generate(spec: &SampleSpec) -> Result<RecordSet, EtlError> {
    if spec.orders > 0 && (spec.customers == 0 || spec.products == 0) {
        return Err(EtlError::InvalidRecord {
            kind: EntityKind::Order,
            id: 0,
            reason: "orders need at least one customer and one product".to_string(),
        });
    }
    let products = products(spec)?;
    let set = RecordSet {
        customers: customers(spec)?,
        orders: orders(spec, &products)?,
        products,
    };
    tracing::debug!(
        seed = spec.seed,
        customers = set.customers.len(),
        products = set.products.len(),
        orders = set.orders.len(),
        "sample generated"
    );
    Ok(set)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_records() {
        let spec = SampleSpec::default();
        assert_eq!(generate(&spec).unwrap(), generate(&spec).unwrap());
    }

    #[test]
    fn different_seed_different_orders() {
        let a = generate(&SampleSpec::default()).unwrap();
        let b = generate(&SampleSpec {
            seed: 7,
            ..SampleSpec::default()
        })
        .unwrap();
        assert_ne!(a.orders, b.orders);
    }

    #[test]
    fn default_sizes() {
        let set = generate(&SampleSpec::default()).unwrap();
        assert_eq!(set.customers.len(), 100);
        assert_eq!(set.products.len(), 20);
        assert_eq!(set.orders.len(), 200);
    }

    #[test]
    fn product_stream_independent_of_customer_count() {
        let a = generate(&SampleSpec::default()).unwrap();
        let b = generate(&SampleSpec {
            customers: 5,
            ..SampleSpec::default()
        })
        .unwrap();
        assert_eq!(a.products, b.products);
    }

    #[test]
    fn values_within_ranges() {
        let set = generate(&SampleSpec::default()).unwrap();
        for p in &set.products {
            assert!(CATEGORIES.contains(&p.category.as_str()));
            assert!(p.cost <= p.price);
        }
        for o in &set.orders {
            assert!((1..=4).contains(&o.quantity));
            assert!(o.discount <= Ratio::from_basis_points(3_000));
            assert!(o.total_amount.unwrap().cents() <= o.unit_price.cents() * 4);
        }
        assert_eq!(set.products[0].launch_date, date(2019, 1, 31).unwrap());
        assert_eq!(set.products[1].launch_date, date(2019, 2, 28).unwrap());
        assert_eq!(set.products[11].launch_date, date(2019, 12, 31).unwrap());
    }

    #[test]
    fn loads_and_joins_cleanly() {
        let store = generate(&SampleSpec::default())
            .unwrap()
            .into_store()
            .unwrap();
        assert_eq!(store.join().unwrap().len(), 200);
    }

    #[test]
    fn orders_without_customers_rejected() {
        let spec = SampleSpec {
            customers: 0,
            ..SampleSpec::default()
        };
        assert!(generate(&spec).is_err());
    }
}
