//! Cart repository for database operations.
//!
//! Account carts are stored as one `carts` row per user and one
//! `cart_items` row per line. Writes touch only the rows named by the
//! [`CartChange`] that produced them, inside a single transaction.
//!
//! Queries are built at runtime with `query_as` so the crate builds without
//! a live database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use yedek_core::{
    Cart, CartChange, CartId, CartItem, CartOwner, CurrencyCode, LineItemId, Money, ProductId,
    ProductSnapshot, Quantity, UserId,
};

use super::RepositoryError;
use crate::store::{CartKey, CartStore, StoreError};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    discount_code: Option<String>,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    product_snapshot: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartItemRow {
    fn into_item(self, currency: CurrencyCode) -> Result<CartItem, RepositoryError> {
        let mut product: ProductSnapshot = serde_json::from_value(self.product_snapshot)
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid product snapshot: {e}"))
            })?;

        // Columns win over the snapshot copy.
        product.id = ProductId::new(self.product_id);
        product.unit_price = Money::new(self.unit_price, currency).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid unit price in database: {e}"))
        })?;

        let quantity = Quantity::try_from_i64(i64::from(self.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid quantity in database: {e}"))
        })?;

        Ok(CartItem {
            id: LineItemId::new(self.id),
            product,
            quantity,
            added_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's cart with its lines in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a row cannot be decoded.
    pub async fn get_by_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT id, discount_code, currency, created_at, updated_at
            FROM carts
            WHERE user_id = $1
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let currency: CurrencyCode = row
            .currency
            .parse()
            .map_err(RepositoryError::DataCorruption)?;

        let items = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT id, product_id, quantity, unit_price, product_snapshot,
                   created_at, updated_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(row.id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|item| item.into_item(currency))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Cart::from_parts(
            CartId::new(row.id),
            CartOwner::User(user_id),
            currency,
            items,
            row.discount_code,
            row.created_at,
            row.updated_at,
        )))
    }

    /// Write the rows affected by `change`.
    ///
    /// The cart row is upserted on every call so the first write creates it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart has no user owner.
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn save(&self, cart: &Cart, change: &CartChange) -> Result<(), RepositoryError> {
        let user_id = cart.owner.user_id().ok_or_else(|| {
            RepositoryError::Conflict("guest carts are not stored in the database".to_owned())
        })?;

        let mut tx = self.pool.begin().await?;

        let cart_id: Uuid = sqlx::query_scalar(
            r"
            INSERT INTO carts (id, user_id, discount_code, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
               SET discount_code = EXCLUDED.discount_code,
                   currency = EXCLUDED.currency,
                   updated_at = EXCLUDED.updated_at
            RETURNING id
            ",
        )
        .bind(cart.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(cart.discount_code())
        .bind(cart.currency.code())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        let mut changes = Vec::new();
        flatten(change, &mut changes);

        for change in changes {
            match change {
                CartChange::LineAdded(line_id) | CartChange::LineUpdated(line_id) => {
                    let Some(item) = cart.get_item(*line_id) else {
                        continue;
                    };
                    sqlx::query(
                        r"
                        INSERT INTO cart_items
                            (id, cart_id, product_id, quantity, unit_price, product_snapshot,
                             created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        ON CONFLICT (cart_id, product_id) DO UPDATE
                           SET quantity = EXCLUDED.quantity,
                               unit_price = EXCLUDED.unit_price,
                               product_snapshot = EXCLUDED.product_snapshot,
                               updated_at = EXCLUDED.updated_at
                        ",
                    )
                    .bind(item.id.as_uuid())
                    .bind(cart_id)
                    .bind(item.product.id.as_uuid())
                    .bind(quantity_column(item.quantity))
                    .bind(item.unit_price().amount())
                    .bind(Json(&item.product))
                    .bind(item.added_at)
                    .bind(item.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                CartChange::LineRemoved(line_id) => {
                    sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
                        .bind(line_id.as_uuid())
                        .bind(cart_id)
                        .execute(&mut *tx)
                        .await?;
                }
                CartChange::Cleared => {
                    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                        .bind(cart_id)
                        .execute(&mut *tx)
                        .await?;
                }
                CartChange::DiscountCodeChanged
                | CartChange::Unchanged
                | CartChange::Batch(_) => {}
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a user's cart and its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_by_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

fn flatten<'c>(change: &'c CartChange, out: &mut Vec<&'c CartChange>) {
    if let CartChange::Batch(changes) = change {
        for change in changes {
            flatten(change, out);
        }
    } else {
        out.push(change);
    }
}

fn quantity_column(quantity: Quantity) -> i32 {
    i32::try_from(quantity.get()).unwrap_or(i32::MAX)
}

/// [`CartStore`] for a signed-in user's cart.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
    user_id: UserId,
}

impl PgCartStore {
    /// Bind to a user's cart.
    #[must_use]
    pub const fn new(pool: PgPool, user_id: UserId) -> Self {
        Self { pool, user_id }
    }
}

impl CartStore for PgCartStore {
    fn key(&self) -> CartKey {
        CartOwner::User(self.user_id)
    }

    async fn load(&self) -> Result<Option<Cart>, StoreError> {
        Ok(CartRepository::new(&self.pool)
            .get_by_user(self.user_id)
            .await?)
    }

    async fn persist(&self, cart: &Cart, change: &CartChange) -> Result<(), StoreError> {
        Ok(CartRepository::new(&self.pool).save(cart, change).await?)
    }

    async fn discard(&self) -> Result<(), StoreError> {
        Ok(CartRepository::new(&self.pool)
            .delete_by_user(self.user_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_nested_batches() {
        let a = LineItemId::generate();
        let b = LineItemId::generate();
        let change = CartChange::Batch(vec![
            CartChange::LineAdded(a),
            CartChange::Batch(vec![
                CartChange::LineUpdated(b),
                CartChange::DiscountCodeChanged,
            ]),
        ]);

        let mut out = Vec::new();
        flatten(&change, &mut out);

        assert_eq!(
            out,
            vec![
                &CartChange::LineAdded(a),
                &CartChange::LineUpdated(b),
                &CartChange::DiscountCodeChanged,
            ]
        );
    }

    #[test]
    fn test_row_columns_override_snapshot() {
        let snapshot = serde_json::json!({
            "id": Uuid::nil(),
            "name": "Debriyaj seti",
            "part_number": "XS4R-7540-AA",
            "unit_price": { "amount": "1.00", "currency": "TRY" }
        });
        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let row = CartItemRow {
            id: Uuid::new_v4(),
            product_id,
            quantity: 2,
            unit_price: Decimal::new(245_000, 2),
            product_snapshot: snapshot,
            created_at: now,
            updated_at: now,
        };

        let Ok(item) = row.into_item(CurrencyCode::TRY) else {
            panic!("row should decode");
        };
        assert_eq!(item.product.id.as_uuid(), product_id);
        assert_eq!(item.unit_price().amount(), Decimal::new(245_000, 2));
        assert_eq!(item.quantity.get(), 2);
    }

    #[test]
    fn test_zero_quantity_row_is_corrupt() {
        let now = Utc::now();
        let row = CartItemRow {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 0,
            unit_price: Decimal::ONE,
            product_snapshot: serde_json::json!({
                "id": Uuid::nil(),
                "name": "x",
                "part_number": "x",
                "unit_price": { "amount": "1", "currency": "TRY" }
            }),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            row.into_item(CurrencyCode::TRY),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
