//! Yedek Core - Cart and pricing domain.
//!
//! This crate provides the domain model shared by the Yedek components:
//! - `storefront` - JSON cart API for the parts storefront
//! - `cli` - Command-line tools for migrations and offline quotes
//!
//! # Architecture
//!
//! The core crate contains only types, pure functions and traits - no I/O, no
//! database access, no HTTP. Carts are mutated in memory and priced on read;
//! where a cart is stored is the storefront's concern.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money and quantities
//! - [`cart`] - Cart state, line mutation and guest/account merging
//! - [`pricing`] - Subtotal, tax, shipping and total derivation
//! - [`discount`] - Discount code policies

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod discount;
pub mod pricing;
pub mod types;

pub use cart::{
    Cart, CartChange, CartError, CartItem, CartOwner, MergeStrategy, ProductSnapshot,
    merge_carts, normalize_code,
};
pub use discount::{AppliedDiscount, CodeTable, DiscountPolicy, DiscountRule, NoDiscounts};
pub use pricing::{CartSummary, PricingConfig, PricingError, summarize};
pub use types::*;
