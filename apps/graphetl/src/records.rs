//! # Record Files
//!
//! Reading and writing the three JSON record arrays (`customers.json`,
//! `products.json`, `orders.json`) and loading them into a store.

use crate::config::InputConfig;
use graphetl_core::{Customer, EtlError, Ingestor, Order, Product, RecordStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a single record file (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
pub const MAX_RECORD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a canonical graph file (500 MB).
pub const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<(), EtlError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EtlError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(EtlError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to a canonical regular file.
///
/// Canonicalizing resolves ".." and symlinks and fails on missing files.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, EtlError> {
    let canonical = path.canonicalize().map_err(|e| {
        EtlError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(EtlError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
pub fn validate_output_path(path: &Path) -> Result<PathBuf, EtlError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        EtlError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(EtlError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| EtlError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// JSON ARRAYS
// =============================================================================

/// Read one JSON array of records.
pub fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, EtlError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_RECORD_FILE_SIZE)?;

    let data = std::fs::read(&validated)
        .map_err(|e| EtlError::IoError(format!("Read file '{}': {}", path.display(), e)))?;
    serde_json::from_slice(&data).map_err(|e| {
        EtlError::SerializationError(format!("Parse '{}': {}", path.display(), e))
    })
}

/// Write one JSON array of records.
pub fn write_records<R: Serialize>(path: &Path, records: &[R]) -> Result<(), EtlError> {
    let validated = validate_output_path(path)?;
    let data = serde_json::to_vec_pretty(records)
        .map_err(|e| EtlError::SerializationError(e.to_string()))?;
    std::fs::write(&validated, data)
        .map_err(|e| EtlError::IoError(format!("Write file '{}': {}", path.display(), e)))
}

// =============================================================================
// RECORD SET
// =============================================================================

/// The three source tables of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub customers: Vec<Customer>,
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
}

impl RecordSet {
    /// Read all three files named by `input`.
    pub fn read(input: &InputConfig) -> Result<Self, EtlError> {
        let set = Self {
            customers: read_records(&input.customers)?,
            products: read_records(&input.products)?,
            orders: read_records(&input.orders)?,
        };
        tracing::info!(
            customers = set.customers.len(),
            products = set.products.len(),
            orders = set.orders.len(),
            "record files read"
        );
        Ok(set)
    }

    /// Write all three files to the locations named by `output`.
    pub fn write(&self, output: &InputConfig) -> Result<(), EtlError> {
        write_records(&output.customers, &self.customers)?;
        write_records(&output.products, &self.products)?;
        write_records(&output.orders, &self.orders)
    }

    /// Validate and load every table into a fresh store.
    pub fn into_store(self) -> Result<RecordStore, EtlError> {
        let mut store = RecordStore::new();
        Ingestor::load(&mut store, self.customers)?;
        Ingestor::load(&mut store, self.products)?;
        Ingestor::load(&mut store, self.orders)?;
        Ok(store)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use graphetl_core::{CustomerId, EntityKind};
    use tempfile::tempdir;

    const CUSTOMERS: &str = r#"[
        {"id": 1, "name": "Ada", "email": "ada@example.com", "city": "London",
         "country": "UK", "segment": "SMB", "registration_date": "2020-01-01",
         "lifetime_value": 1500.5}
    ]"#;

    #[test]
    fn reads_customer_array() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("customers.json");
        std::fs::write(&path, CUSTOMERS).unwrap();

        let customers: Vec<Customer> = read_records(&path).unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].id, CustomerId(1));
        assert_eq!(customers[0].lifetime_value.cents(), 150_050);
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = tempdir().unwrap();
        let result: Result<Vec<Customer>, _> = read_records(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(EtlError::IoError(_))));
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("orders.json");
        std::fs::write(&path, "[{\"id\": 1}]").unwrap();
        let result: Result<Vec<Order>, _> = read_records(&path);
        assert!(matches!(result, Err(EtlError::SerializationError(_))));
    }

    #[test]
    fn directory_is_not_a_record_file() {
        let temp = tempdir().unwrap();
        assert!(validate_file_path(temp.path()).is_err());
    }

    #[test]
    fn output_parent_must_exist() {
        let temp = tempdir().unwrap();
        assert!(validate_output_path(&temp.path().join("missing/out.json")).is_err());
        assert!(validate_output_path(&temp.path().join("out.json")).is_ok());
    }

    #[test]
    fn duplicate_ids_rejected_on_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("customers.json");
        std::fs::write(&path, CUSTOMERS).unwrap();
        let mut customers: Vec<Customer> = read_records(&path).unwrap();
        customers.push(customers[0].clone());

        let set = RecordSet {
            customers,
            ..RecordSet::default()
        };
        assert!(matches!(
            set.into_store(),
            Err(EtlError::DuplicateIdentity {
                kind: EntityKind::Customer,
                id: 1
            })
        ));
    }
}
