//! State-change notifications.
//!
//! Engines queue these on the unit of work; they are handed to the
//! notification sink only after the transaction commits.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{CashShift, DiningTable, KitchenStatus, Order, OrderItem, OrderStatus};

pub const ORDER_CREATED: &str = "pedido.creado";
pub const ORDER_UPDATED: &str = "pedido.actualizado";
pub const ORDER_STATUS: &str = "pedido.estado";
pub const ORDER_ITEM_STATUS: &str = "pedido.item_estado";
pub const TABLE_STATE: &str = "mesa.estado";
pub const SHIFT_OPENED: &str = "cierre_caja.abierto";
pub const SHIFT_STATUS: &str = "cierre_caja.estado";

/// One event for the real-time fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub tenant_id: String,
    pub payload: Value,
}

/// Item ids touched by an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
}

impl ItemDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl Notification {
    pub fn new(event: &str, tenant_id: impl Into<String>, payload: Value) -> Self {
        Notification {
            event: event.to_string(),
            tenant_id: tenant_id.into(),
            payload,
        }
    }

    pub fn order_created(order: &Order) -> Self {
        Self::new(
            ORDER_CREATED,
            &order.tenant_id,
            json!({
                "pedidoId": order.id,
                "numero": order.number,
                "tipo": order.kind,
                "mesaId": order.table_id,
                "estado": order.status,
            }),
        )
    }

    pub fn order_updated(order: &Order, diff: &ItemDiff) -> Self {
        Self::new(
            ORDER_UPDATED,
            &order.tenant_id,
            json!({
                "pedidoId": order.id,
                "totalEstimado": order.estimated_total,
                "itemsAgregados": diff.added,
                "itemsEliminados": diff.removed,
                "itemsActualizados": diff.updated,
            }),
        )
    }

    pub fn order_status(order: &Order, previous: OrderStatus) -> Self {
        Self::new(
            ORDER_STATUS,
            &order.tenant_id,
            json!({
                "pedidoId": order.id,
                "estadoAnterior": previous,
                "estado": order.status,
            }),
        )
    }

    pub fn item_status(order: &Order, item: &OrderItem, previous: KitchenStatus) -> Self {
        Self::new(
            ORDER_ITEM_STATUS,
            &order.tenant_id,
            json!({
                "pedidoId": order.id,
                "itemId": item.id,
                "estadoAnterior": previous,
                "estado": item.kitchen_status,
            }),
        )
    }

    pub fn table_state(table: &DiningTable) -> Self {
        Self::new(
            TABLE_STATE,
            &table.tenant_id,
            json!({ "mesaId": table.id, "estado": table.state }),
        )
    }

    pub fn shift_opened(shift: &CashShift) -> Self {
        Self::new(
            SHIFT_OPENED,
            &shift.tenant_id,
            json!({
                "cierreCajaId": shift.id,
                "usuarioCajeroId": shift.cashier_id,
                "saldoInicial": shift.opening_balance,
            }),
        )
    }

    pub fn shift_status(shift: &CashShift) -> Self {
        Self::new(
            SHIFT_STATUS,
            &shift.tenant_id,
            json!({
                "cierreCajaId": shift.id,
                "usuarioCajeroId": shift.cashier_id,
                "cerrado": shift.closed,
                "diferenciaCaja": shift.cash_difference,
            }),
        )
    }
}
