//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Cart mutations, pricing and guest-to-account merge
//! - `locks` - Per-cart write locks

pub mod cart;
pub mod locks;

pub use cart::{CartService, CartServiceError, CartView};
