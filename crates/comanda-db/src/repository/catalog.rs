//! # Catalog Repository
//!
//! Menu lookups (products, configurable products) and ingredient stock.
//!
//! ## Recipe Consumption
//! ```text
//! order_items ──► recipe_lines ──► ingredients
//!   qty 2           pan 1.0           stock 10.0
//!                   carne 0.2         stock  1.0
//!
//! requirements_for_order() → [pan: 2.0 of 10.0, carne: 0.4 of 1.0]
//! consume()                → stock -= required, per ingredient
//! ```
//!
//! Requirements are aggregated per ingredient across all live items, so two
//! lines of the same product are checked against stock once.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use comanda_core::{ConfigurableProduct, IngredientRequirement, Product};

use crate::codec;
use crate::error::DbResult;

fn product_from_row(row: &SqliteRow) -> DbResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        price: codec::money(row, "price_cents")?,
        is_beverage: codec::flag(row, "is_beverage")?,
        active: codec::flag(row, "active")?,
    })
}

fn configurable_from_row(row: &SqliteRow) -> DbResult<ConfigurableProduct> {
    Ok(ConfigurableProduct {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        base_price: codec::money(row, "base_price_cents")?,
        active: codec::flag(row, "active")?,
    })
}

pub struct CatalogRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CatalogRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        CatalogRepository { conn }
    }

    /// Product by ID, including inactive ones (callers decide).
    pub async fn find_product(&mut self, id: &str, tenant_id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.tenant_id, p.name, p.price_cents, p.active,
                   COALESCE(c.is_beverage, 0) AS is_beverage
            FROM products p
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE p.id = ?1 AND p.tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn find_configurable(
        &mut self,
        id: &str,
        tenant_id: &str,
    ) -> DbResult<Option<ConfigurableProduct>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name, base_price_cents, active
            FROM configurable_products
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(configurable_from_row).transpose()
    }

    /// Ingredient demand of every non-canceled item of the order.
    pub async fn requirements_for_order(
        &mut self,
        order_id: &str,
    ) -> DbResult<Vec<IngredientRequirement>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS ingredient_id, i.name AS name,
                   SUM(r.quantity * oi.quantity) AS required,
                   i.stock AS available
            FROM order_items oi
            JOIN recipe_lines r ON r.product_id = oi.product_id
            JOIN ingredients i ON i.id = r.ingredient_id
            WHERE oi.order_id = ?1 AND oi.kitchen_status <> 'CANCELADO'
            GROUP BY i.id, i.name, i.stock
            ORDER BY i.name
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(IngredientRequirement {
                    ingredient_id: row.try_get("ingredient_id")?,
                    name: row.try_get("name")?,
                    required: row.try_get("required")?,
                    available: row.try_get("available")?,
                })
            })
            .collect()
    }

    /// Decrements stock by each requirement.
    pub async fn consume(&mut self, requirements: &[IngredientRequirement]) -> DbResult<()> {
        for req in requirements {
            debug!(ingredient = %req.ingredient_id, quantity = req.required, "Consuming stock");
            sqlx::query("UPDATE ingredients SET stock = stock - ?2 WHERE id = ?1")
                .bind(&req.ingredient_id)
                .bind(req.required)
                .execute(&mut *self.conn)
                .await?;
        }
        Ok(())
    }

    /// Returns stock taken by [`consume`](Self::consume).
    pub async fn restock(&mut self, requirements: &[IngredientRequirement]) -> DbResult<()> {
        for req in requirements {
            debug!(ingredient = %req.ingredient_id, quantity = req.required, "Returning stock");
            sqlx::query("UPDATE ingredients SET stock = stock + ?2 WHERE id = ?1")
                .bind(&req.ingredient_id)
                .bind(req.required)
                .execute(&mut *self.conn)
                .await?;
        }
        Ok(())
    }

    pub async fn ingredient_stock(&mut self, ingredient_id: &str) -> DbResult<Option<f64>> {
        let stock = sqlx::query_scalar("SELECT stock FROM ingredients WHERE id = ?1")
            .bind(ingredient_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(stock)
    }
}
