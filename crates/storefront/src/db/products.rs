//! Read-only access to the parts catalog.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use yedek_core::{CurrencyCode, Money, ProductId, ProductSnapshot};

use super::RepositoryError;
use crate::store::{ProductCatalog, StoreError};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    part_number: String,
    price: Decimal,
    discounted_price: Option<Decimal>,
    main_image: Option<String>,
    model_fitment: Vec<String>,
}

impl ProductRow {
    /// The price a customer pays: the discounted price when one is set.
    fn effective_price(&self) -> Decimal {
        self.discounted_price
            .filter(|p| *p >= Decimal::ZERO)
            .unwrap_or(self.price)
    }

    fn into_snapshot(self, currency: CurrencyCode) -> Result<ProductSnapshot, RepositoryError> {
        let unit_price = Money::new(self.effective_price(), currency).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {}: {e}", self.id))
        })?;

        Ok(ProductSnapshot {
            id: ProductId::new(self.id),
            name: self.name,
            part_number: self.part_number,
            unit_price,
            image_url: self.main_image,
            model_fitment: self.model_fitment,
        })
    }
}

/// [`ProductCatalog`] over the `products` table.
#[derive(Clone)]
pub struct PgProductCatalog {
    pool: PgPool,
    currency: CurrencyCode,
}

impl PgProductCatalog {
    /// Create a catalog. Prices are read in `currency`.
    #[must_use]
    pub const fn new(pool: PgPool, currency: CurrencyCode) -> Self {
        Self { pool, currency }
    }

    /// Get an active product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored price is negative.
    pub async fn get_active(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductSnapshot>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, part_number, price, discounted_price, main_image, model_fitment
            FROM products
            WHERE id = $1 AND is_active
            ",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_snapshot(self.currency)).transpose()
    }
}

impl ProductCatalog for PgProductCatalog {
    async fn find(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self.get_active(product_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(price: i64, discounted: Option<i64>) -> ProductRow {
        ProductRow {
            id: Uuid::new_v4(),
            name: "Ön fren diski".to_string(),
            part_number: "DG9C-1125-AA".to_string(),
            price: Decimal::new(price, 2),
            discounted_price: discounted.map(|d| Decimal::new(d, 2)),
            main_image: Some("https://cdn.example.com/disk.jpg".to_string()),
            model_fitment: vec!["Mondeo 2016".to_string()],
        }
    }

    #[test]
    fn test_discounted_price_preferred() {
        assert_eq!(row(120_000, Some(99_900)).effective_price(), Decimal::new(99_900, 2));
        assert_eq!(row(120_000, None).effective_price(), Decimal::new(120_000, 2));
    }

    #[test]
    fn test_negative_price_is_corrupt() {
        assert!(matches!(
            row(-100, None).into_snapshot(CurrencyCode::TRY),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_snapshot_carries_display_fields() {
        let Ok(snapshot) = row(5_000, None).into_snapshot(CurrencyCode::TRY) else {
            panic!("row should convert");
        };
        assert_eq!(snapshot.part_number, "DG9C-1125-AA");
        assert_eq!(snapshot.model_fitment, vec!["Mondeo 2016".to_string()]);
        assert!(snapshot.image_url.is_some());
    }
}
