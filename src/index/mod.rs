//! Secondary Index Module
//!
//! Alternate-key lookups over the row store.
//!
//! ## Variants
//! - [`UniqueIndex`]: key → exactly one row id, rejects duplicates
//! - [`MultiIndex`]: key → every row id that ever held the key, in
//!   insertion order, never shrinks
//!
//! Neither type synchronizes internally. The table store keeps them under
//! the same lock as the rows they point into.

mod multi;
mod unique;

pub use multi::MultiIndex;
pub use unique::UniqueIndex;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
