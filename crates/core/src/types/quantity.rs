//! Line quantity type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative quantity.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// Above the per-line limit.
    #[error("quantity {got} exceeds the maximum of {max} per line")]
    TooLarge {
        /// Requested quantity.
        got: i64,
        /// Maximum allowed.
        max: u32,
    },
}

/// A positive line quantity.
///
/// ## Constraints
///
/// - At least 1 (a line with no units is removed, never stored)
/// - At most [`Quantity::MAX`] units per line
///
/// ## Examples
///
/// ```
/// use yedek_core::Quantity;
///
/// assert!(Quantity::new(1).is_ok());
/// assert!(Quantity::new(0).is_err());
/// assert!(Quantity::try_from_i64(-3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Maximum units allowed on a single line.
    pub const MAX: u32 = 999;

    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Parse a quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero or above [`Quantity::MAX`].
    pub fn new(n: u32) -> Result<Self, QuantityError> {
        Self::try_from_i64(i64::from(n))
    }

    /// Parse a quantity from a signed value, as received from clients.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is below 1 or above [`Quantity::MAX`].
    pub fn try_from_i64(n: i64) -> Result<Self, QuantityError> {
        if n <= 0 {
            return Err(QuantityError::NotPositive(n));
        }
        u32::try_from(n)
            .ok()
            .filter(|&q| q <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge {
                got: n,
                max: Self::MAX,
            })
    }

    /// The number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add two quantities, failing if the sum exceeds the per-line limit.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] when the sum is above [`Quantity::MAX`].
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::try_from_i64(i64::from(self.0) + i64::from(other.0))
    }

    /// Add two quantities, capping at [`Quantity::MAX`].
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0).min(Self::MAX))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        Self::try_from_i64(n)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
