//! Offline cart quotes.
//!
//! Prices a cart described in a JSON file with the same service and pricing
//! settings the storefront uses, without touching a database.
//!
//! # Usage
//!
//! ```bash
//! yedek quote cart.json
//! yedek quote cart.json --json
//! ```
//!
//! # File Format
//!
//! ```json
//! {
//!   "discount_code": "WELCOME10",
//!   "items": [
//!     {
//!       "product": {
//!         "id": "7f1c2b9e-1d7a-4c59-9a53-2f1f1c3d4e5f",
//!         "name": "Ön fren balatası",
//!         "part_number": "1763915",
//!         "unit_price": { "amount": "100.00", "currency": "TRY" }
//!       },
//!       "quantity": 2
//!     }
//!   ]
//! }
//! ```
//!
//! Pricing settings come from the `CART_*` environment variables.

use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use yedek_core::{CartOwner, GuestId, ProductSnapshot};
use yedek_storefront::config::{CartConfig, ConfigError};
use yedek_storefront::services::{CartService, CartServiceError, CartView};
use yedek_storefront::store::{MemoryCarts, MemoryCatalog};

/// Errors that can occur while quoting.
#[derive(Debug, Error)]
pub enum QuoteError {
    /// The input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The quote could not be parsed or written as JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pricing settings are invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A line or discount code was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),
}

/// A cart to price.
#[derive(Debug, Deserialize)]
pub struct QuoteInput {
    #[serde(default)]
    pub discount_code: Option<String>,
    pub items: Vec<QuoteLine>,
}

/// One line of a quote.
#[derive(Debug, Deserialize)]
pub struct QuoteLine {
    pub product: ProductSnapshot,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

const fn default_quantity() -> i64 {
    1
}

/// Price `input` through an in-memory cart.
///
/// Lines are added in file order, so repeated products merge exactly as
/// they would in the storefront.
///
/// # Errors
///
/// Returns `QuoteError::Cart` if a quantity is out of range, the merged
/// quantity exceeds the per-line limit, or the discount code is unknown.
pub async fn quote_cart(input: &QuoteInput, config: &CartConfig) -> Result<CartView, QuoteError> {
    let catalog = MemoryCatalog::new(input.items.iter().map(|line| line.product.clone()));
    let service = CartService::from_config(catalog, config);

    let carts = MemoryCarts::new();
    let store = carts.store(CartOwner::Guest(GuestId::generate()));

    let mut view = service.get_cart(&store).await?;
    for line in &input.items {
        view = service
            .add_item(&store, line.product.id, line.quantity)
            .await?;
    }
    if let Some(code) = &input.discount_code {
        view = service.apply_discount(&store, code).await?;
    }

    Ok(view)
}

/// Read, price and print a quote file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the pricing
/// settings are invalid, or the cart rejects a line.
pub async fn run(path: &Path, json: bool) -> Result<(), QuoteError> {
    let _ = dotenvy::dotenv();

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| QuoteError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let input: QuoteInput = serde_json::from_str(&raw)?;
    let config = CartConfig::from_env()?;

    let view = quote_cart(&input, &config).await?;
    tracing::debug!(lines = view.summary.line_count, "quote priced");

    let output = if json {
        serde_json::to_string_pretty(&view)?
    } else {
        render(&view)
    };

    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}

/// Plain-text receipt.
fn render(view: &CartView) -> String {
    let mut out = String::new();
    for item in view.cart.items() {
        let line_total = item
            .line_total()
            .map_or_else(|_| "-".to_owned(), |m| m.display());
        let _ = writeln!(
            out,
            "{:>3} x {} ({})  {}",
            item.quantity, item.product.name, item.product.part_number, line_total
        );
    }

    let s = &view.summary;
    let _ = writeln!(out, "Subtotal:  {}", s.subtotal);
    let _ = writeln!(out, "Tax:       {}", s.tax);
    let _ = writeln!(out, "Shipping:  {}", s.shipping);
    if let Some(discount) = &s.applied_discount {
        let _ = writeln!(out, "Discount:  -{} ({})", s.discount, discount.code);
    }
    let _ = write!(out, "Total:     {}", s.total);

    if s.item_count > 0 && !s.remaining_for_free_shipping.is_zero() {
        let _ = write!(
            out,
            "\nAdd {} more for free shipping.",
            s.remaining_for_free_shipping
        );
    }
    out
}
