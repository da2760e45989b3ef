//! # Order Engine
//!
//! Creation, edits, status transitions and kitchen moves of orders
//! ("pedidos"), each inside one unit of work.
//!
//! ## Status Transition Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_status(order, tenant, user, estado)                             │
//! │                                                                         │
//! │  1. role_of(user, tenant)           ── before any lock                  │
//! │  2. role_may_set(role, estado)      ── PermissionError, no mutation     │
//! │  ─────────────────────── unit of work ───────────────────────────────   │
//! │  3. claim order row                 ── serializes concurrent writers    │
//! │  4. authorize_transition            ── finalized / pending items /      │
//! │                                        structural edge                  │
//! │  5. side effects                                                        │
//! │       CANCELADO         window check, every item CANCELADO              │
//! │       ENVIADO_A_COCINA  PENDIENTE items sent                            │
//! │       LISTO_PARA_ENTR.  every live item LISTO                           │
//! │       CERRADO           stock check + recipe consumption                │
//! │  6. header write, table release (CANCELADO / PAGADO)                    │
//! │  7. outbox: pedido.estado (+ mesa.estado)                               │
//! │  ─────────────────────── commit ─────────────────────────────────────   │
//! │  8. notifications published                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Table occupancy is only ever changed inside the same unit of work as the
//! order write that causes it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use comanda_core::event::ItemDiff;
use comanda_core::items::{self, ItemInput, NewLine, ProductRef};
use comanda_core::validation::{self, OrderFields};
use comanda_core::window::{self, WindowAction};
use comanda_core::{inventory, status, time};
use comanda_core::{
    CoreError, DiningTable, KitchenStatus, Money, Notification, Order, OrderDetail, OrderItem,
    OrderKind, OrderStatus, Role, TableState, ValidationError,
};
use comanda_db::{new_id, OrderRepository, UnitOfWork};

use crate::context::EngineContext;
use crate::error::EngineResult;

/// Roles that take orders and edit them.
const ORDER_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Cashier, Role::Waiter];

// =============================================================================
// Commands
// =============================================================================

/// `POST /pedidos` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrder {
    #[serde(rename = "mesa_id", default)]
    pub table_id: Option<String>,

    #[serde(rename = "tipo_pedido")]
    pub kind: OrderKind,

    #[serde(rename = "cliente_nombre", default)]
    pub customer_name: Option<String>,

    #[serde(rename = "cliente_telefono", default)]
    pub customer_phone: Option<String>,

    #[serde(rename = "cliente_direccion", default)]
    pub customer_address: Option<String>,

    #[serde(rename = "notas", default)]
    pub notes: Option<String>,

    /// Minor units.
    #[serde(rename = "descuento", default)]
    pub discount: Money,

    #[serde(rename = "pedidoItems")]
    pub items: Vec<ItemInput>,
}

/// `PATCH /pedidos/{id}` body. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPatch {
    /// Full desired item list; omitted existing items are deleted.
    #[serde(rename = "pedidoItems", default)]
    pub items: Option<Vec<ItemInput>>,

    #[serde(rename = "mesa_id", default)]
    pub table_id: Option<String>,

    #[serde(rename = "tipo_pedido", default)]
    pub kind: Option<OrderKind>,

    #[serde(rename = "cliente_nombre", default)]
    pub customer_name: Option<String>,

    #[serde(rename = "cliente_telefono", default)]
    pub customer_phone: Option<String>,

    #[serde(rename = "cliente_direccion", default)]
    pub customer_address: Option<String>,

    #[serde(rename = "notas", default)]
    pub notes: Option<String>,

    #[serde(rename = "domiciliario_id", default)]
    pub delivery_driver_id: Option<String>,
}

/// `PATCH /pedidos/{id}/status` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusChange {
    #[serde(rename = "estado")]
    pub status: OrderStatus,

    /// Cancellation reason.
    #[serde(rename = "razon", default)]
    pub reason: Option<String>,
}

/// `PATCH /pedidos/{id}/items/{item_id}/status` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemStatusChange {
    #[serde(rename = "estado")]
    pub status: KitchenStatus,
}

// =============================================================================
// Shared Table Helpers
// =============================================================================

/// Marks the table OCUPADA for a new holder.
///
/// Fails with `mesa_ocupada` if it is already occupied; callers skip this
/// when the order already holds the table.
async fn occupy_table(
    uow: &mut UnitOfWork,
    tenant_id: &str,
    table_id: &str,
) -> EngineResult<DiningTable> {
    if !uow.tables().claim(table_id, tenant_id).await? {
        return Err(CoreError::not_found("mesa", table_id).into());
    }
    let table = uow
        .tables()
        .get(table_id, tenant_id)
        .await?
        .ok_or_else(|| CoreError::not_found("mesa", table_id))?;
    if table.state == TableState::Occupied {
        return Err(CoreError::conflict(
            "mesa_ocupada",
            format!("la mesa {} está ocupada", table.label),
        )
        .into());
    }

    let table = uow
        .tables()
        .set_state(table_id, tenant_id, TableState::Occupied)
        .await?
        .ok_or_else(|| CoreError::not_found("mesa", table_id))?;
    uow.record(Notification::table_state(&table));
    Ok(table)
}

/// Frees the table unless another live order still holds it.
pub(crate) async fn release_table_if_idle(
    uow: &mut UnitOfWork,
    tenant_id: &str,
    table_id: &str,
    order_id: &str,
) -> EngineResult<()> {
    let others = uow
        .orders()
        .count_active_on_table(tenant_id, table_id, order_id)
        .await?;
    if others > 0 {
        debug!(table_id, others, "Table still in use");
        return Ok(());
    }

    if let Some(table) = uow
        .tables()
        .set_state(table_id, tenant_id, TableState::Free)
        .await?
    {
        uow.record(Notification::table_state(&table));
    }
    Ok(())
}

/// Resolves a new line against the catalog, capturing today's price.
async fn price_line(
    uow: &mut UnitOfWork,
    tenant_id: &str,
    order_id: &str,
    line: &NewLine,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<OrderItem> {
    let mut item = OrderItem {
        id: new_id(),
        order_id: order_id.to_string(),
        product_id: None,
        configurable_product_id: None,
        configuration: None,
        quantity: line.quantity,
        unit_price: Money::zero(),
        note: line.note.clone(),
        kitchen_status: KitchenStatus::Pending,
        kitchen_status_at: now,
        is_beverage: false,
    };

    match &line.product {
        ProductRef::Product(id) => {
            let product = uow
                .catalog()
                .find_product(id, tenant_id)
                .await?
                .ok_or_else(|| CoreError::not_found("producto", id.as_str()))?;
            if !product.active {
                return Err(ValidationError::Inactive {
                    entity: "producto",
                    id: id.clone(),
                }
                .into());
            }
            item.product_id = Some(product.id);
            item.unit_price = product.price;
            item.is_beverage = product.is_beverage;
        }
        ProductRef::Configurable { id, configuration } => {
            let product = uow
                .catalog()
                .find_configurable(id, tenant_id)
                .await?
                .ok_or_else(|| CoreError::not_found("producto configurable", id.as_str()))?;
            if !product.active {
                return Err(ValidationError::Inactive {
                    entity: "producto configurable",
                    id: id.clone(),
                }
                .into());
            }
            item.configurable_product_id = Some(product.id);
            item.configuration = configuration.clone();
            item.unit_price = product.base_price;
        }
    }
    Ok(item)
}

fn estimated_total(items: &[OrderItem]) -> Money {
    items.iter().map(OrderItem::line_total).sum()
}

fn merged<'a>(incoming: &'a Option<String>, current: &'a Option<String>) -> Option<&'a str> {
    incoming.as_deref().or(current.as_deref())
}

async fn claim_order(uow: &mut UnitOfWork, order_id: &str, tenant_id: &str) -> EngineResult<Order> {
    if !uow.orders().claim(order_id, tenant_id).await? {
        return Err(CoreError::not_found("pedido", order_id).into());
    }
    uow.orders()
        .find(order_id, tenant_id)
        .await?
        .ok_or_else(|| CoreError::not_found("pedido", order_id).into())
}

// =============================================================================
// Order Engine
// =============================================================================

#[derive(Clone)]
pub struct OrderEngine {
    ctx: EngineContext,
}

impl OrderEngine {
    pub fn new(ctx: EngineContext) -> Self {
        OrderEngine { ctx }
    }

    async fn order_role(&self, acting_user: &str, tenant_id: &str, action: &str) -> EngineResult<Role> {
        let role = self.ctx.role_of(acting_user, tenant_id).await?;
        if !ORDER_ROLES.contains(&role) {
            return Err(CoreError::permission(role, action).into());
        }
        Ok(role)
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get(&self, order_id: &str, tenant_id: &str, acting_user: &str) -> EngineResult<OrderDetail> {
        self.ctx.role_of(acting_user, tenant_id).await?;
        let mut conn = self.ctx.db().acquire().await?;
        OrderRepository::new(&mut conn)
            .detail(order_id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("pedido", order_id).into())
    }

    // =========================================================================
    // Create
    // =========================================================================

    pub async fn create(
        &self,
        tenant_id: &str,
        acting_user: &str,
        cmd: &NewOrder,
    ) -> EngineResult<OrderDetail> {
        self.order_role(acting_user, tenant_id, "crear pedidos").await?;

        validation::validate_order_fields(&OrderFields {
            kind: cmd.kind,
            table_id: cmd.table_id.as_deref(),
            customer_name: cmd.customer_name.as_deref(),
            customer_phone: cmd.customer_phone.as_deref(),
            customer_address: cmd.customer_address.as_deref(),
        })?;
        validation::validate_optional_text("notas", cmd.notes.as_deref())?;
        validation::validate_non_negative("descuento", cmd.discount)?;
        let lines = items::validate_new_lines(&cmd.items)?;
        let lines = lines.as_slice();

        let detail = self
            .ctx
            .transact("pedido.crear", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = self.create_in(&mut uow, tenant_id, acting_user, cmd, lines).await;
                uow.finish(result).await
            })
            .await?;

        info!(
            order_id = %detail.order.id,
            number = detail.order.number,
            kind = detail.order.kind.as_str(),
            total = detail.order.estimated_total.cents(),
            "Order created"
        );
        Ok(detail)
    }

    async fn create_in(
        &self,
        uow: &mut UnitOfWork,
        tenant_id: &str,
        acting_user: &str,
        cmd: &NewOrder,
        lines: &[NewLine],
    ) -> EngineResult<OrderDetail> {
        // Serializes the daily number sequence.
        if !uow.identity().claim_tenant(tenant_id).await? {
            return Err(CoreError::not_found("establecimiento", tenant_id).into());
        }

        let now = time::now();
        let order_id = new_id();
        let table_id = match cmd.kind {
            OrderKind::Table => cmd.table_id.clone(),
            _ => None,
        };

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            items.push(price_line(uow, tenant_id, &order_id, line, now).await?);
        }

        let order = Order {
            id: order_id,
            tenant_id: tenant_id.to_string(),
            number: uow.orders().next_number(tenant_id, time::local_date(now)).await?,
            table_id,
            created_by: acting_user.to_string(),
            delivery_driver_id: None,
            cancelled_by: None,
            status: OrderStatus::Open,
            kind: cmd.kind,
            customer_name: cmd.customer_name.clone(),
            customer_phone: cmd.customer_phone.clone(),
            customer_address: cmd.customer_address.clone(),
            estimated_total: estimated_total(&items),
            discount: cmd.discount,
            notes: cmd.notes.clone(),
            cancel_reason: None,
            cash_shift_id: None,
            created_at: now,
            kitchen_updated_at: now,
            closed_at: None,
            cancelled_at: None,
            updated_at: now,
        };

        uow.orders().insert(&order).await?;
        for item in &items {
            uow.orders().insert_item(item).await?;
        }
        uow.record(Notification::order_created(&order));

        if let Some(table_id) = &order.table_id {
            occupy_table(uow, tenant_id, table_id).await?;
        }

        Ok(OrderDetail { order, items })
    }

    // =========================================================================
    // Edit
    // =========================================================================

    pub async fn update(
        &self,
        order_id: &str,
        tenant_id: &str,
        acting_user: &str,
        patch: &OrderPatch,
    ) -> EngineResult<OrderDetail> {
        let role = self.order_role(acting_user, tenant_id, "editar pedidos").await?;

        if matches!(&patch.items, Some(items) if items.is_empty()) {
            return Err(ValidationError::NoItems.into());
        }
        validation::validate_optional_text("notas", patch.notes.as_deref())?;
        validation::validate_optional_text("cliente_nombre", patch.customer_name.as_deref())?;
        validation::validate_optional_text("cliente_direccion", patch.customer_address.as_deref())?;

        let detail = self
            .ctx
            .transact("pedido.actualizar", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = self.update_in(&mut uow, order_id, tenant_id, role, patch).await;
                uow.finish(result).await
            })
            .await?;

        info!(order_id, total = detail.order.estimated_total.cents(), "Order updated");
        Ok(detail)
    }

    async fn update_in(
        &self,
        uow: &mut UnitOfWork,
        order_id: &str,
        tenant_id: &str,
        role: Role,
        patch: &OrderPatch,
    ) -> EngineResult<OrderDetail> {
        let mut order = claim_order(uow, order_id, tenant_id).await?;
        status::ensure_editable(order.status)?;

        let now = time::now();
        let settings = uow.identity().settings(tenant_id).await?;
        window::check_window(
            WindowAction::Edit,
            role,
            order.status,
            order.kitchen_updated_at,
            now,
            settings.as_ref(),
        )?;

        // Items
        let mut diff = ItemDiff::default();
        if let Some(incoming) = &patch.items {
            let current = uow.orders().items(order_id).await?;
            let plan = items::plan_item_changes(&current, incoming, role, order.status)?;

            for item_id in &plan.delete {
                uow.orders().delete_item(order_id, item_id).await?;
                diff.removed.push(item_id.clone());
            }
            for change in &plan.update {
                let Some(mut item) = current.iter().find(|i| i.id == change.item_id).cloned() else {
                    continue;
                };
                item.quantity = change.quantity;
                item.note = change.note.clone();
                if change.revert_to_pending {
                    item.kitchen_status = KitchenStatus::Pending;
                    item.kitchen_status_at = now;
                }
                uow.orders().update_item(&item).await?;
                diff.updated.push(item.id);
            }
            for line in &plan.create {
                let item = price_line(uow, tenant_id, order_id, line, now).await?;
                uow.orders().insert_item(&item).await?;
                diff.added.push(item.id);
            }

            if !diff.is_empty() {
                order.kitchen_updated_at = now;
            }
        }

        // Kind, table and customer fields
        let kind = patch.kind.unwrap_or(order.kind);
        let table_id = match kind {
            OrderKind::Table => patch.table_id.clone().or_else(|| order.table_id.clone()),
            _ => None,
        };
        validation::validate_order_fields(&OrderFields {
            kind,
            table_id: table_id.as_deref(),
            customer_name: merged(&patch.customer_name, &order.customer_name),
            customer_phone: merged(&patch.customer_phone, &order.customer_phone),
            customer_address: merged(&patch.customer_address, &order.customer_address),
        })?;

        if table_id != order.table_id {
            if let Some(destination) = &table_id {
                occupy_table(uow, tenant_id, destination).await?;
            }
            if let Some(previous) = order.table_id.take() {
                release_table_if_idle(uow, tenant_id, &previous, order_id).await?;
            }
            debug!(order_id, table_id = ?table_id, "Order moved");
            order.table_id = table_id;
        }

        if let Some(driver_id) = &patch.delivery_driver_id {
            if kind != OrderKind::Delivery {
                return Err(ValidationError::NotAllowed {
                    field: "domiciliario_id",
                    reason: "solo los pedidos a domicilio tienen domiciliario".into(),
                }
                .into());
            }
            let driver = uow
                .identity()
                .find_user(driver_id, tenant_id)
                .await?
                .filter(|u| u.active)
                .ok_or_else(|| CoreError::not_found("domiciliario", driver_id.as_str()))?;
            if driver.role != Role::DeliveryDriver {
                return Err(ValidationError::NotAllowed {
                    field: "domiciliario_id",
                    reason: format!("{} no es domiciliario", driver.name),
                }
                .into());
            }
            order.delivery_driver_id = Some(driver.id);
        }

        order.kind = kind;
        if patch.customer_name.is_some() {
            order.customer_name = patch.customer_name.clone();
        }
        if patch.customer_phone.is_some() {
            order.customer_phone = patch.customer_phone.clone();
        }
        if patch.customer_address.is_some() {
            order.customer_address = patch.customer_address.clone();
        }
        if patch.notes.is_some() {
            order.notes = patch.notes.clone();
        }

        let items = uow.orders().items(order_id).await?;
        order.estimated_total = estimated_total(&items);
        order.updated_at = now;
        uow.orders().update_header(&order).await?;
        uow.record(Notification::order_updated(&order, &diff));

        Ok(OrderDetail { order, items })
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub async fn update_status(
        &self,
        order_id: &str,
        tenant_id: &str,
        acting_user: &str,
        change: &StatusChange,
    ) -> EngineResult<OrderDetail> {
        let role = self.ctx.role_of(acting_user, tenant_id).await?;
        if !status::role_may_set(role, change.status) {
            return Err(CoreError::permission(role, format!("pasar pedidos a {}", change.status)).into());
        }
        validation::validate_optional_text("razon", change.reason.as_deref())?;

        let (detail, previous) = self
            .ctx
            .transact("pedido.estado", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = self
                    .update_status_in(&mut uow, order_id, tenant_id, acting_user, role, change)
                    .await;
                uow.finish(result).await
            })
            .await?;

        info!(
            order_id,
            from = previous.as_str(),
            to = detail.order.status.as_str(),
            role = role.as_str(),
            "Order status changed"
        );
        Ok(detail)
    }

    async fn update_status_in(
        &self,
        uow: &mut UnitOfWork,
        order_id: &str,
        tenant_id: &str,
        acting_user: &str,
        role: Role,
        change: &StatusChange,
    ) -> EngineResult<(OrderDetail, OrderStatus)> {
        let mut order = claim_order(uow, order_id, tenant_id).await?;
        let items = uow.orders().items(order_id).await?;
        let to = change.status;
        status::authorize_transition(role, order.kind, order.status, to, &items)?;

        let previous = order.status;
        let now = time::now();

        match to {
            OrderStatus::Cancelled => {
                let settings = uow.identity().settings(tenant_id).await?;
                window::check_window(
                    WindowAction::Cancel,
                    role,
                    previous,
                    order.kitchen_updated_at,
                    now,
                    settings.as_ref(),
                )?;
                uow.orders().cancel_all_items(order_id, now).await?;
                order.cancelled_at = Some(now);
                order.cancelled_by = Some(acting_user.to_string());
                order.cancel_reason = change.reason.clone();
            }
            OrderStatus::SentToKitchen => {
                uow.orders().mark_pending_sent(order_id, now).await?;
            }
            OrderStatus::ReadyToServe => {
                uow.orders().mark_all_ready(order_id, now).await?;
            }
            OrderStatus::Closed => {
                let requirements = uow.catalog().requirements_for_order(order_id).await?;
                inventory::ensure_stock(&requirements)?;
                uow.catalog().consume(&requirements).await?;
                order.closed_at = Some(now);
            }
            OrderStatus::Open if previous == OrderStatus::Closed => {
                let requirements = uow.catalog().requirements_for_order(order_id).await?;
                uow.catalog().restock(&requirements).await?;
                order.closed_at = None;
            }
            _ => {}
        }

        if to.is_kitchen_stage() {
            order.kitchen_updated_at = now;
        }
        order.status = to;
        order.updated_at = now;
        uow.orders().update_header(&order).await?;
        uow.record(Notification::order_status(&order, previous));

        if to.is_terminal() {
            if let Some(table_id) = order.table_id.clone() {
                release_table_if_idle(uow, tenant_id, &table_id, order_id).await?;
            }
        }

        let items = uow.orders().items(order_id).await?;
        Ok((OrderDetail { order, items }, previous))
    }

    // =========================================================================
    // Kitchen
    // =========================================================================

    pub async fn update_item_status(
        &self,
        order_id: &str,
        item_id: &str,
        tenant_id: &str,
        acting_user: &str,
        to: KitchenStatus,
    ) -> EngineResult<OrderDetail> {
        let role = self.ctx.role_of(acting_user, tenant_id).await?;
        if !status::role_may_move_items(role) {
            return Err(CoreError::permission(role, "cambiar el estado de cocina de un ítem").into());
        }

        let detail = self
            .ctx
            .transact("pedido.item_estado", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = self
                    .update_item_status_in(&mut uow, order_id, item_id, tenant_id, role, to)
                    .await;
                uow.finish(result).await
            })
            .await?;

        info!(order_id, item_id, to = to.as_str(), "Item kitchen status changed");
        Ok(detail)
    }

    async fn update_item_status_in(
        &self,
        uow: &mut UnitOfWork,
        order_id: &str,
        item_id: &str,
        tenant_id: &str,
        role: Role,
        to: KitchenStatus,
    ) -> EngineResult<OrderDetail> {
        let mut order = claim_order(uow, order_id, tenant_id).await?;
        status::ensure_editable(order.status)?;

        let mut item = uow
            .orders()
            .find_item(order_id, item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ítem", item_id))?;
        status::authorize_item_move(role, &item, to)?;

        let now = time::now();
        let previous = item.kitchen_status;
        item.kitchen_status = to;
        item.kitchen_status_at = now;
        uow.orders().update_item(&item).await?;

        order.kitchen_updated_at = now;
        order.updated_at = now;
        uow.orders().update_header(&order).await?;
        uow.record(Notification::item_status(&order, &item, previous));

        let items = uow.orders().items(order_id).await?;
        Ok(OrderDetail { order, items })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use comanda_core::event::{ORDER_CREATED, TABLE_STATE};
    use comanda_core::ErrorKind;
    use comanda_db::test_support::{self, ids, BEEF_STOCK};
    use comanda_db::{CatalogRepository, Database, DbConfig, RetryPolicy, TableRepository};

    use crate::error::EngineError;
    use crate::notify::TracingSink;
    use crate::testkit::{self, close_order, keep, line, table_order, takeaway_order, to};

    async fn table_state(db: &Database, table_id: &str) -> TableState {
        let mut conn = db.acquire().await.unwrap();
        TableRepository::new(&mut conn)
            .get(table_id, ids::TENANT)
            .await
            .unwrap()
            .unwrap()
            .state
    }

    #[tokio::test]
    async fn test_create_table_order_occupies_table() {
        let (services, db) = testkit::services().await;

        let detail = services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::BURGER, 2)]))
            .await
            .unwrap();

        assert_eq!(detail.order.estimated_total, Money::from_cents(2000));
        assert_eq!(detail.order.status, OrderStatus::Open);
        assert_eq!(detail.order.number, 1);
        assert_eq!(detail.items[0].kitchen_status, KitchenStatus::Pending);
        assert_eq!(table_state(&db, ids::TABLE_1).await, TableState::Occupied);

        let err = services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "mesa_ocupada");
    }

    #[tokio::test]
    async fn test_delivery_without_phone_persists_nothing() {
        let (services, _db) = testkit::services().await;
        let cmd = NewOrder {
            kind: OrderKind::Delivery,
            table_id: None,
            customer_name: Some("Rosa".into()),
            customer_address: Some("Calle 10 #4-20".into()),
            customer_phone: None,
            ..table_order(ids::TABLE_1, vec![line(ids::BURGER, 1)])
        };

        let err = services.orders.create(ids::TENANT, ids::CASHIER, &cmd).await.unwrap_err();
        assert_eq!(err.to_string(), "el teléfono del cliente es obligatorio");
        assert_eq!(err.kind(), Some(ErrorKind::Validation));

        // Nothing consumed the daily sequence.
        let next = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
        assert_eq!(next.order.number, 1);
    }

    #[tokio::test]
    async fn test_close_with_pending_items_is_rejected() {
        let (services, _db) = testkit::services().await;
        let detail = services
            .orders
            .create(
                ids::TENANT,
                ids::WAITER,
                &takeaway_order(vec![line(ids::BURGER, 1), line(ids::LEMONADE, 1)]),
            )
            .await
            .unwrap();
        let order_id = detail.order.id.as_str();

        for status in [OrderStatus::SentToKitchen, OrderStatus::InPreparation] {
            services
                .orders
                .update_status(order_id, ids::TENANT, ids::COOK, &to(status))
                .await
                .unwrap();
        }
        let lemonade = detail.items.iter().find(|i| i.is_beverage).unwrap();
        services
            .orders
            .update_item_status(order_id, &lemonade.id, ids::TENANT, ids::COOK, KitchenStatus::Ready)
            .await
            .unwrap();

        let err = services
            .orders
            .update_status(order_id, ids::TENANT, ids::CASHIER, &to(OrderStatus::Closed))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "items_pendientes");

        let after = services.orders.get(order_id, ids::TENANT, ids::CASHIER).await.unwrap();
        assert_eq!(after.order.status, OrderStatus::InPreparation);
        assert!(after.order.closed_at.is_none());
    }

    #[tokio::test]
    async fn test_role_gate() {
        let (services, _db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();

        let err = services
            .orders
            .update_status(order_id, ids::TENANT, ids::WAITER, &to(OrderStatus::SentToKitchen))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Permission));

        let err = services
            .orders
            .update_status(order_id, ids::TENANT, ids::COOK, &to(OrderStatus::Cancelled))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Permission));

        let err = services
            .orders
            .create(ids::TENANT, ids::DRIVER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Permission));

        // Inactive users and users of another tenant are unknown here.
        let err = services.orders.get(order_id, ids::TENANT, ids::INACTIVE).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        let err = services.orders.get(order_id, ids::TENANT, ids::OTHER_ADMIN).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        let err = services
            .orders
            .get(order_id, ids::OTHER_TENANT, ids::OTHER_ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_cancel_window_binds_waiter_not_admin() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_2, vec![line(ids::BURGER, 1)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        for status in [OrderStatus::SentToKitchen, OrderStatus::InPreparation] {
            services
                .orders
                .update_status(order_id, ids::TENANT, ids::COOK, &to(status))
                .await
                .unwrap();
        }

        test_support::backdate_kitchen_update(&db, order_id, 11).await;
        let err = services
            .orders
            .update_status(order_id, ids::TENANT, ids::WAITER, &to(OrderStatus::Cancelled))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "plazo_vencido");

        test_support::backdate_kitchen_update(&db, order_id, 20).await;
        let cancel = StatusChange {
            status: OrderStatus::Cancelled,
            reason: Some("cliente se retiró".into()),
        };
        let detail = services
            .orders
            .update_status(order_id, ids::TENANT, ids::ADMIN, &cancel)
            .await
            .unwrap();

        assert_eq!(detail.order.status, OrderStatus::Cancelled);
        assert_eq!(detail.order.cancelled_by.as_deref(), Some(ids::ADMIN));
        assert_eq!(detail.order.cancel_reason.as_deref(), Some("cliente se retiró"));
        assert!(detail.items.iter().all(|i| i.kitchen_status == KitchenStatus::Cancelled));
        assert_eq!(table_state(&db, ids::TABLE_2).await, TableState::Free);
    }

    #[tokio::test]
    async fn test_edit_window_and_unbounded_tenant() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        services
            .orders
            .update_status(order_id, ids::TENANT, ids::COOK, &to(OrderStatus::SentToKitchen))
            .await
            .unwrap();
        test_support::backdate_kitchen_update(&db, order_id, 16).await;

        let patch = OrderPatch {
            notes: Some("sin hielo".into()),
            ..OrderPatch::default()
        };
        let err = services
            .orders
            .update(order_id, ids::TENANT, ids::WAITER, &patch)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "plazo_vencido");

        test_support::set_settings(&db, ids::TENANT, None, None, None).await;
        let detail = services
            .orders
            .update(order_id, ids::TENANT, ids::WAITER, &patch)
            .await
            .unwrap();
        assert_eq!(detail.order.notes.as_deref(), Some("sin hielo"));
    }

    #[tokio::test]
    async fn test_edit_items_keeps_at_least_one() {
        let (services, _db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::BURGER, 1)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        let item_id = order.items[0].id.as_str();

        let empty = OrderPatch {
            items: Some(Vec::new()),
            ..OrderPatch::default()
        };
        let err = services.orders.update(order_id, ids::TENANT, ids::WAITER, &empty).await.unwrap_err();
        assert_eq!(err.reason(), "sin_items");

        let remove_all = OrderPatch {
            items: Some(vec![keep(item_id, 0)]),
            ..OrderPatch::default()
        };
        let err = services
            .orders
            .update(order_id, ids::TENANT, ids::WAITER, &remove_all)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "sin_items");

        let swap = OrderPatch {
            items: Some(vec![keep(item_id, 3), line(ids::LEMONADE, 2)]),
            ..OrderPatch::default()
        };
        let detail = services.orders.update(order_id, ids::TENANT, ids::WAITER, &swap).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.order.estimated_total, Money::from_cents(4000));
    }

    #[tokio::test]
    async fn test_ready_item_is_locked_for_waiter() {
        let (services, _db) = testkit::services().await;
        let order = services
            .orders
            .create(
                ids::TENANT,
                ids::WAITER,
                &takeaway_order(vec![line(ids::BURGER, 1), line(ids::LEMONADE, 1)]),
            )
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        let burger = order.items.iter().find(|i| !i.is_beverage).unwrap().id.clone();
        let lemonade = order.items.iter().find(|i| i.is_beverage).unwrap().id.clone();

        services
            .orders
            .update_status(order_id, ids::TENANT, ids::COOK, &to(OrderStatus::SentToKitchen))
            .await
            .unwrap();
        services
            .orders
            .update_item_status(order_id, &burger, ids::TENANT, ids::COOK, KitchenStatus::Ready)
            .await
            .unwrap();

        let bump = OrderPatch {
            items: Some(vec![keep(&burger, 2), keep(&lemonade, 1)]),
            ..OrderPatch::default()
        };
        let err = services.orders.update(order_id, ids::TENANT, ids::WAITER, &bump).await.unwrap_err();
        assert_eq!(err.reason(), "item_bloqueado");

        let detail = services.orders.update(order_id, ids::TENANT, ids::SUPERVISOR, &bump).await.unwrap();
        let edited = detail.items.iter().find(|i| i.id == burger).unwrap();
        assert_eq!(edited.quantity, 2);
        assert_eq!(edited.kitchen_status, KitchenStatus::Pending);
    }

    #[tokio::test]
    async fn test_table_transfer_frees_previous_table() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();

        let patch = OrderPatch {
            table_id: Some(ids::TABLE_3.into()),
            ..OrderPatch::default()
        };
        let detail = services
            .orders
            .update(&order.order.id, ids::TENANT, ids::WAITER, &patch)
            .await
            .unwrap();

        assert_eq!(detail.order.table_id.as_deref(), Some(ids::TABLE_3));
        assert_eq!(table_state(&db, ids::TABLE_1).await, TableState::Free);
        assert_eq!(table_state(&db, ids::TABLE_3).await, TableState::Occupied);
    }

    #[tokio::test]
    async fn test_driver_only_on_delivery_orders() {
        let (services, _db) = testkit::services().await;
        let takeaway = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();

        let assign = OrderPatch {
            delivery_driver_id: Some(ids::DRIVER.into()),
            ..OrderPatch::default()
        };
        let err = services
            .orders
            .update(&takeaway.order.id, ids::TENANT, ids::CASHIER, &assign)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "valor_no_permitido");

        let delivery = OrderPatch {
            kind: Some(OrderKind::Delivery),
            customer_phone: Some("3001234567".into()),
            customer_address: Some("Calle 10 #4-20".into()),
            ..assign
        };
        let detail = services
            .orders
            .update(&takeaway.order.id, ids::TENANT, ids::CASHIER, &delivery)
            .await
            .unwrap();
        assert_eq!(detail.order.kind, OrderKind::Delivery);
        assert_eq!(detail.order.delivery_driver_id.as_deref(), Some(ids::DRIVER));
    }

    #[tokio::test]
    async fn test_transfer_to_occupied_table_conflicts() {
        let (services, db) = testkit::services().await;
        let first = services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
        services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_2, vec![line(ids::BURGER, 1)]))
            .await
            .unwrap();

        let patch = OrderPatch {
            table_id: Some(ids::TABLE_2.into()),
            ..OrderPatch::default()
        };
        let err = services
            .orders
            .update(&first.order.id, ids::TENANT, ids::WAITER, &patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
        assert_eq!(err.reason(), "mesa_ocupada");

        let after = services.orders.get(&first.order.id, ids::TENANT, ids::WAITER).await.unwrap();
        assert_eq!(after.order.table_id.as_deref(), Some(ids::TABLE_1));
        assert_eq!(table_state(&db, ids::TABLE_1).await, TableState::Occupied);
        assert_eq!(table_state(&db, ids::TABLE_2).await, TableState::Occupied);
    }

    #[tokio::test]
    async fn test_leaving_table_kind_frees_table() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();

        let patch = OrderPatch {
            kind: Some(OrderKind::Delivery),
            customer_name: Some("Rosa".into()),
            customer_phone: Some("3001234567".into()),
            customer_address: Some("Calle 10 #4-20".into()),
            ..OrderPatch::default()
        };
        let detail = services
            .orders
            .update(&order.order.id, ids::TENANT, ids::CASHIER, &patch)
            .await
            .unwrap();

        assert_eq!(detail.order.kind, OrderKind::Delivery);
        assert_eq!(detail.order.table_id, None);
        assert_eq!(table_state(&db, ids::TABLE_1).await, TableState::Free);
    }

    #[tokio::test]
    async fn test_closed_order_rejects_edits() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::BURGER, 1)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        let item_id = order.items[0].id.clone();
        close_order(&services, order_id).await;

        let patch = OrderPatch {
            items: Some(vec![keep(&item_id, 1), line(ids::BURGER, 3)]),
            ..OrderPatch::default()
        };
        let err = services
            .orders
            .update(order_id, ids::TENANT, ids::ADMIN, &patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
        assert_eq!(err.reason(), "pedido_por_cobrar");

        let err = services
            .orders
            .update_item_status(order_id, &item_id, ids::TENANT, ids::ADMIN, KitchenStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "pedido_por_cobrar");

        let after = services.orders.get(order_id, ids::TENANT, ids::ADMIN).await.unwrap();
        assert_eq!(after.order.status, OrderStatus::Closed);
        assert_eq!(after.items.len(), 1);
        assert_eq!(after.order.estimated_total, Money::from_cents(1000));
        let mut conn = db.acquire().await.unwrap();
        let bread = CatalogRepository::new(&mut conn).ingredient_stock(ids::BREAD).await.unwrap();
        assert_eq!(bread, Some(test_support::BREAD_STOCK - 1.0));
    }

    #[tokio::test]
    async fn test_reopen_returns_stock_before_closing_again() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::BURGER, 2)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        close_order(&services, order_id).await;

        let reopened = services
            .orders
            .update_status(order_id, ids::TENANT, ids::ADMIN, &to(OrderStatus::Open))
            .await
            .unwrap();
        assert_eq!(reopened.order.status, OrderStatus::Open);
        assert_eq!(reopened.order.closed_at, None);
        {
            let mut conn = db.acquire().await.unwrap();
            let bread = CatalogRepository::new(&mut conn).ingredient_stock(ids::BREAD).await.unwrap();
            assert_eq!(bread, Some(test_support::BREAD_STOCK));
        }

        close_order(&services, order_id).await;
        let mut conn = db.acquire().await.unwrap();
        let bread = CatalogRepository::new(&mut conn).ingredient_stock(ids::BREAD).await.unwrap();
        assert_eq!(bread, Some(test_support::BREAD_STOCK - 2.0));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_close() {
        let (services, db) = testkit::services().await;
        // 6 × 0.2 kg of beef against 1.0 kg in stock.
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::BURGER, 6)]))
            .await
            .unwrap();
        let order_id = order.order.id.as_str();
        for status in [
            OrderStatus::SentToKitchen,
            OrderStatus::InPreparation,
            OrderStatus::ReadyToServe,
        ] {
            services
                .orders
                .update_status(order_id, ids::TENANT, ids::ADMIN, &to(status))
                .await
                .unwrap();
        }

        let err = services
            .orders
            .update_status(order_id, ids::TENANT, ids::CASHIER, &to(OrderStatus::Closed))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "stock_insuficiente");

        let after = services.orders.get(order_id, ids::TENANT, ids::CASHIER).await.unwrap();
        assert_eq!(after.order.status, OrderStatus::ReadyToServe);
        let mut conn = db.acquire().await.unwrap();
        let beef = CatalogRepository::new(&mut conn).ingredient_stock(ids::BEEF).await.unwrap();
        assert_eq!(beef, Some(BEEF_STOCK));
    }

    #[tokio::test]
    async fn test_close_consumes_stock() {
        let (services, db) = testkit::services().await;
        let order = services
            .orders
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::BURGER, 2)]))
            .await
            .unwrap();
        close_order(&services, &order.order.id).await;

        let mut conn = db.acquire().await.unwrap();
        let bread = CatalogRepository::new(&mut conn).ingredient_stock(ids::BREAD).await.unwrap();
        assert_eq!(bread, Some(test_support::BREAD_STOCK - 2.0));
    }

    #[tokio::test]
    async fn test_notifications_only_after_commit() {
        let (services, _db) = testkit::services().await;
        let mut rx = services.hub.subscribe();

        services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().event, ORDER_CREATED);
        assert_eq!(rx.recv().await.unwrap().event, TABLE_STATE);

        // The rolled-back attempt queued pedido.creado before failing.
        services
            .orders
            .create(ids::TENANT, ids::WAITER, &table_order(ids::TABLE_1, vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap_err();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lock_contention_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("comanda.db")).busy_timeout(Duration::from_millis(50));
        let db = test_support::seeded_database_with(config).await;
        let engine = OrderEngine::new(EngineContext::new(
            db.clone(),
            RetryPolicy::immediate(3),
            Arc::new(TracingSink),
        ));

        // Hold the write lock on the tenant row.
        let mut holder = db.begin().await.unwrap();
        assert!(holder.identity().claim_tenant(ids::TENANT).await.unwrap());

        let err = engine
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyExhausted { attempts: 3 }));
        assert_eq!(err.reason(), "modificacion_concurrente");

        holder.rollback().await.unwrap();
        engine
            .create(ids::TENANT, ids::WAITER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();
    }
}
