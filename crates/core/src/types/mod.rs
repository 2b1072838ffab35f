//! Core types for the Yedek storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod quantity;

pub use id::*;
pub use money::{CurrencyCode, Money, MoneyError, round_currency};
pub use quantity::{Quantity, QuantityError};
