//! # Ingestor Module
//!
//! Record validation and load protocol for the Record Store.
//!
//! - Validate records before they enter the store
//! - Reject malformed input with the offending field named
//! - Load batches all-or-nothing
//! - No enrichment: records are stored exactly as given

use crate::primitives::{MAX_BATCH_SIZE, MAX_TEXT_LENGTH};
use crate::store::{Record, RecordStore};
use crate::types::{Customer, EntityKind, EtlError, Money, Order, Product, Ratio};

/// Per-kind validation rules.
pub trait Validate: Record {
    /// Check a single record. Returns `EtlError::InvalidRecord` on failure.
    fn validate(&self) -> Result<(), EtlError>;
}

/// The Ingestor validates record batches and loads them into a store.
pub struct Ingestor;

impl Ingestor {
    /// Validate every record of a batch, then load it.
    ///
    /// Nothing is inserted unless the whole batch is valid and free of
    /// duplicate identities.
    ///
    /// # Errors
    /// - `InvalidRecord` if the batch is too large or any record is invalid
    /// - `DuplicateIdentity` from [`RecordStore::load`]
    pub fn load<R: Validate>(store: &mut RecordStore, records: Vec<R>) -> Result<usize, EtlError> {
        if records.len() > MAX_BATCH_SIZE {
            return Err(EtlError::InvalidRecord {
                kind: R::KIND,
                id: 0,
                reason: format!(
                    "batch of {} records exceeds maximum {}",
                    records.len(),
                    MAX_BATCH_SIZE
                ),
            });
        }
        for record in &records {
            record.validate()?;
        }
        store.load(records)
    }
}

fn invalid(kind: EntityKind, id: u64, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidRecord {
        kind,
        id,
        reason: reason.into(),
    }
}

fn check_text(kind: EntityKind, id: u64, field: &str, value: &str) -> Result<(), EtlError> {
    if value.trim().is_empty() {
        return Err(invalid(kind, id, format!("{} is empty", field)));
    }
    if value.len() > MAX_TEXT_LENGTH {
        return Err(invalid(
            kind,
            id,
            format!("{} exceeds {} bytes", field, MAX_TEXT_LENGTH),
        ));
    }
    Ok(())
}

fn check_amount(kind: EntityKind, id: u64, field: &str, value: Money) -> Result<(), EtlError> {
    if value.is_negative() {
        return Err(invalid(kind, id, format!("{} is negative", field)));
    }
    Ok(())
}

impl Validate for Customer {
    fn validate(&self) -> Result<(), EtlError> {
        let (kind, id) = (EntityKind::Customer, self.id.0);
        check_text(kind, id, "name", &self.name)?;
        check_text(kind, id, "email", &self.email)?;
        if !self.email.contains('@') {
            return Err(invalid(kind, id, "email has no '@'"));
        }
        check_text(kind, id, "city", &self.city)?;
        check_text(kind, id, "country", &self.country)?;
        check_text(kind, id, "segment", &self.segment)?;
        check_amount(kind, id, "lifetime_value", self.lifetime_value)
    }
}

impl Validate for Product {
    fn validate(&self) -> Result<(), EtlError> {
        let (kind, id) = (EntityKind::Product, self.id.0);
        check_text(kind, id, "name", &self.name)?;
        check_text(kind, id, "category", &self.category)?;
        check_amount(kind, id, "price", self.price)?;
        check_amount(kind, id, "cost", self.cost)?;
        if let Some(margin) = self.margin
            && margin > Ratio::ONE
        {
            return Err(invalid(kind, id, "margin exceeds 1.0"));
        }
        Ok(())
    }
}

impl Validate for Order {
    fn validate(&self) -> Result<(), EtlError> {
        let (kind, id) = (EntityKind::Order, self.id.0);
        if self.quantity == 0 {
            return Err(invalid(kind, id, "quantity is zero"));
        }
        check_amount(kind, id, "unit_price", self.unit_price)?;
        // A missing total is accepted here; aggregation reports it.
        if let Some(total) = self.total_amount {
            check_amount(kind, id, "total_amount", total)?;
        }
        if self.discount.basis_points() < 0 || self.discount > Ratio::ONE {
            return Err(invalid(kind, id, "discount outside 0..=1"));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::tests::{customer, order, product};

    #[test]
    fn valid_records_load() {
        let mut store = RecordStore::new();
        assert_eq!(Ingestor::load(&mut store, vec![customer(1)]).unwrap(), 1);
        assert_eq!(
            Ingestor::load(&mut store, vec![product(1, "Books")]).unwrap(),
            1
        );
        assert_eq!(
            Ingestor::load(&mut store, vec![order(1, 1, 1, 100)]).unwrap(),
            1
        );
    }

    #[test]
    fn rejects_empty_name() {
        let mut c = customer(1);
        c.name = "  ".into();
        assert!(matches!(
            c.validate(),
            Err(EtlError::InvalidRecord {
                kind: EntityKind::Customer,
                id: 1,
                ..
            })
        ));
    }

    #[test]
    fn rejects_email_without_at() {
        let mut c = customer(1);
        c.email = "nobody.example.com".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_overlong_text() {
        let mut p = product(1, "Books");
        p.name = "x".repeat(MAX_TEXT_LENGTH + 1);
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_zero_quantity_and_bad_discount() {
        let mut o = order(1, 1, 1, 100);
        o.quantity = 0;
        assert!(o.validate().is_err());

        let mut o = order(1, 1, 1, 100);
        o.discount = Ratio::from_basis_points(10_001);
        assert!(o.validate().is_err());
    }

    #[test]
    fn accepts_missing_total_amount() {
        let mut o = order(1, 1, 1, 100);
        o.total_amount = None;
        assert!(o.validate().is_ok());
    }

    #[test]
    fn invalid_record_blocks_whole_batch() {
        let mut store = RecordStore::new();
        let mut bad = customer(2);
        bad.lifetime_value = Money::from_cents(-1);

        assert!(Ingestor::load(&mut store, vec![customer(1), bad]).is_err());
        assert_eq!(store.count(EntityKind::Customer), 0);
    }
}
