//! # Order Repository
//!
//! Orders ("pedidos") and their line items.
//!
//! ## Order Lifecycle (storage view)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── next_number() → insert() → insert_item() × N                   │
//! │                                                                         │
//! │  2. MUTATE (inside a unit of work)                                     │
//! │     └── claim()         ← write lock on the order row first            │
//! │     └── find() / items()                                               │
//! │     └── update_item() / delete_item() / insert_item()                  │
//! │     └── update_header() ← status, totals, timestamps                   │
//! │                                                                         │
//! │  3. STATUS SIDE EFFECTS                                                │
//! │     └── mark_pending_sent()  ENVIADO_A_COCINA                          │
//! │     └── mark_all_ready()     LISTO_PARA_ENTREGAR                       │
//! │     └── cancel_all_items()   CANCELADO                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use comanda_core::time;
use comanda_core::{KitchenStatus, Order, OrderDetail, OrderItem};

use crate::codec;
use crate::error::DbResult;

const ORDER_COLUMNS: &str = "id, tenant_id, number, table_id, created_by, delivery_driver_id, \
     cancelled_by, status, kind, customer_name, customer_phone, customer_address, \
     estimated_total_cents, discount_cents, notes, cancel_reason, cash_shift_id, \
     created_at, kitchen_updated_at, closed_at, cancelled_at, updated_at";

const ITEM_SELECT: &str = "SELECT oi.id, oi.order_id, oi.product_id, oi.configurable_product_id, \
     oi.configuration, oi.quantity, oi.unit_price_cents, oi.note, oi.kitchen_status, \
     oi.kitchen_status_at, COALESCE(c.is_beverage, 0) AS is_beverage \
     FROM order_items oi \
     LEFT JOIN products p ON p.id = oi.product_id \
     LEFT JOIN categories c ON c.id = p.category_id";

fn order_from_row(row: &SqliteRow) -> DbResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        number: row.try_get("number")?,
        table_id: row.try_get("table_id")?,
        created_by: row.try_get("created_by")?,
        delivery_driver_id: row.try_get("delivery_driver_id")?,
        cancelled_by: row.try_get("cancelled_by")?,
        status: row.try_get("status")?,
        kind: row.try_get("kind")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_address: row.try_get("customer_address")?,
        estimated_total: codec::money(row, "estimated_total_cents")?,
        discount: codec::money(row, "discount_cents")?,
        notes: row.try_get("notes")?,
        cancel_reason: row.try_get("cancel_reason")?,
        cash_shift_id: row.try_get("cash_shift_id")?,
        created_at: codec::ts(row, "created_at")?,
        kitchen_updated_at: codec::ts(row, "kitchen_updated_at")?,
        closed_at: codec::opt_ts(row, "closed_at")?,
        cancelled_at: codec::opt_ts(row, "cancelled_at")?,
        updated_at: codec::ts(row, "updated_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> DbResult<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        configurable_product_id: row.try_get("configurable_product_id")?,
        configuration: codec::opt_json(row, "configuration")?,
        quantity: row.try_get("quantity")?,
        unit_price: codec::money(row, "unit_price_cents")?,
        note: row.try_get("note")?,
        kitchen_status: row.try_get("kitchen_status")?,
        kitchen_status_at: codec::ts(row, "kitchen_status_at")?,
        is_beverage: codec::flag(row, "is_beverage")?,
    })
}

/// Repository for orders and order items.
pub struct OrderRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OrderRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        OrderRepository { conn }
    }

    /// Takes the write lock on the order row. `false` if the order does not
    /// exist for this tenant.
    pub async fn claim(&mut self, id: &str, tenant_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET updated_at = updated_at WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Gets an order header by ID, scoped to the tenant.
    pub async fn find(&mut self, id: &str, tenant_id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND tenant_id = ?2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    /// Gets all items of an order, oldest first.
    pub async fn items(&mut self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let sql = format!("{ITEM_SELECT} WHERE oi.order_id = ?1 ORDER BY oi.created_at, oi.id");
        let rows = sqlx::query(&sql)
            .bind(order_id)
            .fetch_all(&mut *self.conn)
            .await?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn find_item(&mut self, order_id: &str, item_id: &str) -> DbResult<Option<OrderItem>> {
        let sql = format!("{ITEM_SELECT} WHERE oi.order_id = ?1 AND oi.id = ?2");
        let row = sqlx::query(&sql)
            .bind(order_id)
            .bind(item_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    /// Order header plus items.
    pub async fn detail(&mut self, id: &str, tenant_id: &str) -> DbResult<Option<OrderDetail>> {
        let Some(order) = self.find(id, tenant_id).await? else {
            return Ok(None);
        };
        let items = self.items(&order.id).await?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// Next per-tenant number for the given local day.
    ///
    /// Callers hold the tenant claim, so two creates cannot read the same MAX.
    pub async fn next_number(&mut self, tenant_id: &str, day: NaiveDate) -> DbResult<i64> {
        let next: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(number), 0) + 1
            FROM orders
            WHERE tenant_id = ?1 AND substr(created_at, 1, 10) = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(time::date_prefix(day))
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(next)
    }

    pub async fn insert(&mut self, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, number = order.number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, number, table_id, created_by, delivery_driver_id,
                cancelled_by, status, kind, customer_name, customer_phone, customer_address,
                estimated_total_cents, discount_cents, notes, cancel_reason, cash_shift_id,
                created_at, kitchen_updated_at, closed_at, cancelled_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(order.number)
        .bind(&order.table_id)
        .bind(&order.created_by)
        .bind(&order.delivery_driver_id)
        .bind(&order.cancelled_by)
        .bind(order.status)
        .bind(order.kind)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_address)
        .bind(order.estimated_total.cents())
        .bind(order.discount.cents())
        .bind(&order.notes)
        .bind(&order.cancel_reason)
        .bind(&order.cash_shift_id)
        .bind(codec::encode_ts(order.created_at))
        .bind(codec::encode_ts(order.kitchen_updated_at))
        .bind(codec::encode_opt_ts(order.closed_at))
        .bind(codec::encode_opt_ts(order.cancelled_at))
        .bind(codec::encode_ts(order.updated_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Writes every mutable header column.
    pub async fn update_header(&mut self, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, status = %order.status.as_str(), "Updating order");

        sqlx::query(
            r#"
            UPDATE orders SET
                table_id = ?3,
                delivery_driver_id = ?4,
                cancelled_by = ?5,
                status = ?6,
                kind = ?7,
                customer_name = ?8,
                customer_phone = ?9,
                customer_address = ?10,
                estimated_total_cents = ?11,
                discount_cents = ?12,
                notes = ?13,
                cancel_reason = ?14,
                cash_shift_id = ?15,
                kitchen_updated_at = ?16,
                closed_at = ?17,
                cancelled_at = ?18,
                updated_at = ?19
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.table_id)
        .bind(&order.delivery_driver_id)
        .bind(&order.cancelled_by)
        .bind(order.status)
        .bind(order.kind)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_address)
        .bind(order.estimated_total.cents())
        .bind(order.discount.cents())
        .bind(&order.notes)
        .bind(&order.cancel_reason)
        .bind(&order.cash_shift_id)
        .bind(codec::encode_ts(order.kitchen_updated_at))
        .bind(codec::encode_opt_ts(order.closed_at))
        .bind(codec::encode_opt_ts(order.cancelled_at))
        .bind(codec::encode_ts(order.updated_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Inserts a line item. The price is whatever the caller captured from
    /// the catalog; it is never recomputed afterwards.
    pub async fn insert_item(&mut self, item: &OrderItem) -> DbResult<()> {
        debug!(order_id = %item.order_id, id = %item.id, "Adding order item");

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, configurable_product_id, configuration,
                quantity, unit_price_cents, note, kitchen_status, kitchen_status_at,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.configurable_product_id)
        .bind(codec::to_opt_json(item.configuration.as_ref())?)
        .bind(item.quantity)
        .bind(item.unit_price.cents())
        .bind(&item.note)
        .bind(item.kitchen_status)
        .bind(codec::encode_ts(item.kitchen_status_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Writes quantity, note and kitchen status of an existing item.
    pub async fn update_item(&mut self, item: &OrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE order_items SET
                quantity = ?3,
                note = ?4,
                kitchen_status = ?5,
                kitchen_status_at = ?6
            WHERE id = ?1 AND order_id = ?2
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(item.quantity)
        .bind(&item.note)
        .bind(item.kitchen_status)
        .bind(codec::encode_ts(item.kitchen_status_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn delete_item(&mut self, order_id: &str, item_id: &str) -> DbResult<()> {
        debug!(order_id, item_id, "Deleting order item");

        sqlx::query("DELETE FROM order_items WHERE id = ?1 AND order_id = ?2")
            .bind(item_id)
            .bind(order_id)
            .execute(&mut *self.conn)
            .await?;

        Ok(())
    }

    /// PENDIENTE → ENVIADO_A_COCINA for every item of the order.
    pub async fn mark_pending_sent(&mut self, order_id: &str, at: DateTime<Utc>) -> DbResult<u64> {
        self.move_items(
            order_id,
            KitchenStatus::SentToKitchen,
            "kitchen_status = 'PENDIENTE'",
            at,
        )
        .await
    }

    /// Every non-canceled item → LISTO.
    pub async fn mark_all_ready(&mut self, order_id: &str, at: DateTime<Utc>) -> DbResult<u64> {
        self.move_items(
            order_id,
            KitchenStatus::Ready,
            "kitchen_status NOT IN ('LISTO', 'CANCELADO')",
            at,
        )
        .await
    }

    /// Every item → CANCELADO.
    pub async fn cancel_all_items(&mut self, order_id: &str, at: DateTime<Utc>) -> DbResult<u64> {
        self.move_items(
            order_id,
            KitchenStatus::Cancelled,
            "kitchen_status <> 'CANCELADO'",
            at,
        )
        .await
    }

    async fn move_items(
        &mut self,
        order_id: &str,
        to: KitchenStatus,
        filter: &str,
        at: DateTime<Utc>,
    ) -> DbResult<u64> {
        let sql = format!(
            "UPDATE order_items SET kitchen_status = ?2, kitchen_status_at = ?3 \
             WHERE order_id = ?1 AND {filter}"
        );
        let result = sqlx::query(&sql)
            .bind(order_id)
            .bind(to)
            .bind(codec::encode_ts(at))
            .execute(&mut *self.conn)
            .await?;

        debug!(order_id, to = to.as_str(), moved = result.rows_affected(), "Items moved");
        Ok(result.rows_affected())
    }

    /// Orders other than `excluding` still holding the table (anything not
    /// CANCELADO or PAGADO).
    pub async fn count_active_on_table(
        &mut self,
        tenant_id: &str,
        table_id: &str,
        excluding: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM orders
            WHERE tenant_id = ?1 AND table_id = ?2 AND id <> ?3
              AND status NOT IN ('CANCELADO', 'PAGADO')
            "#,
        )
        .bind(tenant_id)
        .bind(table_id)
        .bind(excluding)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count)
    }

    /// Orders a cashier opened inside `[from, to]` that are neither terminal
    /// nor awaiting payment (CERRADO), i.e. the automatic close cancels them.
    pub async fn unresolved_for_cashier(
        &mut self,
        tenant_id: &str,
        cashier_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE tenant_id = ?1 AND created_by = ?2 \
               AND created_at >= ?3 AND created_at <= ?4 \
               AND status NOT IN ('CANCELADO', 'PAGADO', 'CERRADO') \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(cashier_id)
            .bind(codec::encode_ts(from))
            .bind(codec::encode_ts(to))
            .fetch_all(&mut *self.conn)
            .await?;

        rows.iter().map(order_from_row).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
