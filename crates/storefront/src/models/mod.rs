//! Domain models for storefront.
//!
//! Cart, pricing and discount types live in `yedek_core`; this module only
//! holds what the storefront keeps in the session.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
