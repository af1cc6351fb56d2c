//! Core types for the `StockCore` inventory engine.
//!
//! Every value that crosses a module boundary is wrapped in a smart
//! constructor so that invalid zip codes, non-positive quantities or blank
//! product names are rejected once, at the edge, and never re-checked deeper
//! in the engine.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a warehouse.
///
/// Generated identifiers are UUIDv7, so ordering by id follows creation order.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct WarehouseId(Uuid);

impl WarehouseId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of a product.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct ProductId(Uuid);

impl ProductId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of the customer receiving a move-out.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct UserId(Uuid);

impl UserId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of a ledger entry.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct MovementId(Uuid);

impl MovementId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of a single (warehouse, product) stock row.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct StockRowId(Uuid);

impl StockRowId {
    /// Generates a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// A postal code made of ASCII digits.
///
/// Leading zeros are kept as written; distance only looks at the numeric
/// value, so `"01234"` and `"1234"` are distinct codes at distance zero.
#[nutype(
    sanitize(trim),
    validate(
        not_empty,
        len_char_max = 10,
        predicate = |zip: &str| zip.bytes().all(|b| b.is_ascii_digit())
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ZipCode(String);

impl ZipCode {
    /// Numeric value of the code. At most ten digits always fits in a `u64`.
    pub fn numeric(&self) -> u64 {
        self.as_ref()
            .bytes()
            .fold(0_u64, |acc, b| acc * 10 + u64::from(b - b'0'))
    }

    /// Absolute numeric difference between two codes.
    pub fn distance_to(&self, other: &Self) -> Distance {
        Distance::new(self.numeric().abs_diff(other.numeric()))
    }
}

/// Proximity score between two zip codes. Smaller is closer.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct Distance(u64);

/// A strictly positive number of units requested or moved.
///
/// On-hand stock levels are plain `i64` because the store reports whatever
/// it holds; `Quantity` is only for amounts that flow through a transfer.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(i64);

impl Quantity {
    /// The quantity as a signed stock delta.
    pub fn get(self) -> i64 {
        self.into_inner()
    }
}

/// Display name of a product, copied into every ledger entry.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ProductName(String);

/// A point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wraps an existing instant.
    pub const fn new(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    /// The current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// The wrapped instant.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unwraps the instant.
    pub const fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zip_code_trims_surrounding_whitespace() {
        let zip = ZipCode::try_new("  40115 ").unwrap();
        assert_eq!(zip.as_ref(), "40115");
    }

    #[test]
    fn zip_code_rejects_letters() {
        assert!(ZipCode::try_new("40a15").is_err());
    }

    #[test]
    fn zip_code_rejects_empty_input() {
        assert!(ZipCode::try_new("   ").is_err());
    }

    #[test]
    fn zip_code_rejects_more_than_ten_digits() {
        assert!(ZipCode::try_new("12345678901").is_err());
    }

    #[test]
    fn leading_zeros_keep_the_numeric_value() {
        let padded = ZipCode::try_new("00042").unwrap();
        let plain = ZipCode::try_new("42").unwrap();
        assert_eq!(padded.numeric(), 42);
        assert_ne!(padded, plain);
        assert_eq!(padded.distance_to(&plain), Distance::new(0));
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(Quantity::try_new(0).is_err());
        assert!(Quantity::try_new(-3).is_err());
        assert_eq!(Quantity::try_new(7).unwrap().get(), 7);
    }

    #[test]
    fn product_name_rejects_blank_names() {
        assert!(ProductName::try_new("   ").is_err());
        assert_eq!(ProductName::try_new(" Widget ").unwrap().as_ref(), "Widget");
    }

    proptest! {
        #[test]
        fn any_digit_string_is_a_zip_code(digits in "[0-9]{1,10}") {
            let zip = ZipCode::try_new(digits.clone()).unwrap();
            prop_assert_eq!(zip.numeric(), digits.parse::<u64>().unwrap());
        }

        #[test]
        fn distance_is_symmetric(a in "[0-9]{1,10}", b in "[0-9]{1,10}") {
            let a = ZipCode::try_new(a).unwrap();
            let b = ZipCode::try_new(b).unwrap();
            prop_assert_eq!(a.distance_to(&b), b.distance_to(&a));
        }
    }
}
