//! # Fixed Primitives
//!
//! Hardcoded thresholds and limits for the graphetl CORE.
//!
//! These values are compiled into the binary and are not configurable.
//! Business rules (pair thresholds, tier boundaries) live here so the
//! derivation and metrics modules share a single source.

use crate::types::Money;

/// Minimum number of distinct shared products for a `SIMILAR_TO` edge.
///
/// A customer pair sharing exactly one product never produces an edge.
pub const MIN_SIMILARITY_STRENGTH: u64 = 2;

/// Minimum number of distinct shared customers for a `CO_PURCHASED` edge.
pub const MIN_CO_PURCHASE_FREQUENCY: u64 = 2;

/// Spend strictly above this is "VIP" (5000.00).
pub const VIP_SPEND_THRESHOLD: Money = Money::from_cents(500_000);

/// Spend strictly above this (and not VIP) is "Premium" (2000.00).
pub const PREMIUM_SPEND_THRESHOLD: Money = Money::from_cents(200_000);

/// Fractional digits carried by [`Money`].
pub const MONEY_SCALE: u32 = 2;

/// Fractional digits carried by [`crate::types::Ratio`] (basis points).
pub const RATIO_SCALE: u32 = 4;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for any text field on a record.
///
/// Longer values are rejected by the Ingestor.
pub const MAX_TEXT_LENGTH: usize = 256;

/// Maximum number of records in a single load batch.
pub const MAX_BATCH_SIZE: usize = 1_000_000;

/// Number of records per sink write call.
///
/// The sink reports failures per batch, so this is also the failure granularity.
pub const WRITE_BATCH_SIZE: usize = 500;

/// Magic bytes for the canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"GETX";

/// Current canonical export format version.
pub const CANONICAL_VERSION: u8 = 1;
