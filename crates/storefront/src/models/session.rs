//! Session-related types.
//!
//! Types stored in the session for authentication and guest cart state.

use serde::{Deserialize, Serialize};

use yedek_core::UserId;

/// Session-stored user identity.
///
/// Written by the external sign-in flow; the storefront only reads it to
/// decide whose cart a request operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's account ID.
    pub id: UserId,
    /// Display name, if the sign-in flow provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the anonymous visitor's guest ID.
    pub const GUEST_ID: &str = "guest_id";

    /// Key for the ID of the guest cart's own record in the session backend.
    pub const GUEST_CART: &str = "guest_cart";
}
