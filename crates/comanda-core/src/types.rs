//! # Domain Types
//!
//! Core domain types shared by every layer of Comanda.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   OrderItem     │   │   CashShift     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │ 1─N  order_id (FK) │   │  id (UUID)      │       │
//! │  │  number (daily) │   │  unit_price     │   │  cashier_id     │       │
//! │  │  status         │   │  kitchen_status │   │  totals...      │       │
//! │  │  kind           │   │  quantity       │   │  closed         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Invoice      │ 1─N    Payment      │   │ Expense /       │       │
//! │  │  tip, totals    │   │  bank_account   │   │ ExtraIncome     │       │
//! │  │  cash_shift_id? │   │  cash_shift_id? │   │  cash_shift_id  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Names
//! Enum variants are English in code; on the wire and in the database they
//! use the restaurant's vocabulary (`ABIERTO`, `MESA`, `CAJERO`, ...).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::denominations::Denominations;
use crate::money::Money;

// =============================================================================
// Role
// =============================================================================

/// Staff role, resolved per (user, tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum Role {
    #[serde(rename = "ADMIN")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ADMIN"))]
    Admin,
    #[serde(rename = "SUPERVISOR")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "SUPERVISOR"))]
    Supervisor,
    #[serde(rename = "CAJERO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "CAJERO"))]
    Cashier,
    #[serde(rename = "MESERO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "MESERO"))]
    Waiter,
    #[serde(rename = "COCINERO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "COCINERO"))]
    Cook,
    #[serde(rename = "DOMICILIARIO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DOMICILIARIO"))]
    DeliveryDriver,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Supervisor,
        Role::Cashier,
        Role::Waiter,
        Role::Cook,
        Role::DeliveryDriver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::Cashier => "CAJERO",
            Role::Waiter => "MESERO",
            Role::Cook => "COCINERO",
            Role::DeliveryDriver => "DOMICILIARIO",
        }
    }

    /// ADMIN and SUPERVISOR bypass time windows and item locks.
    #[inline]
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle state of an order.
///
/// ## State Machine
/// ```text
/// ABIERTO ──► ENVIADO_A_COCINA ──► EN_PREPARACION ──► LISTO_PARA_ENTREGAR
///                                                        │         │
///                                      (DOMICILIO) EN_REPARTO      │
///                                                        │         ▼
///                                                        └──► ENTREGADO
///                                                                  │
///                                                       CERRADO ◄──┘
///                                                          │
///                                                          ▼
///                                                       PAGADO  (terminal)
///
/// CANCELADO (terminal) is reachable from every non-terminal state.
/// ABIERTO can be re-entered by ADMIN only.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum OrderStatus {
    #[serde(rename = "ABIERTO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ABIERTO"))]
    Open,
    #[serde(rename = "ENVIADO_A_COCINA")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ENVIADO_A_COCINA"))]
    SentToKitchen,
    #[serde(rename = "EN_PREPARACION")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "EN_PREPARACION"))]
    InPreparation,
    #[serde(rename = "LISTO_PARA_ENTREGAR")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "LISTO_PARA_ENTREGAR"))]
    ReadyToServe,
    #[serde(rename = "EN_REPARTO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "EN_REPARTO"))]
    OutForDelivery,
    #[serde(rename = "ENTREGADO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ENTREGADO"))]
    Delivered,
    #[serde(rename = "CERRADO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "CERRADO"))]
    Closed,
    #[serde(rename = "PAGADO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PAGADO"))]
    Paid,
    #[serde(rename = "CANCELADO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "CANCELADO"))]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Open,
        OrderStatus::SentToKitchen,
        OrderStatus::InPreparation,
        OrderStatus::ReadyToServe,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Closed,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "ABIERTO",
            OrderStatus::SentToKitchen => "ENVIADO_A_COCINA",
            OrderStatus::InPreparation => "EN_PREPARACION",
            OrderStatus::ReadyToServe => "LISTO_PARA_ENTREGAR",
            OrderStatus::OutForDelivery => "EN_REPARTO",
            OrderStatus::Delivered => "ENTREGADO",
            OrderStatus::Closed => "CERRADO",
            OrderStatus::Paid => "PAGADO",
            OrderStatus::Cancelled => "CANCELADO",
        }
    }

    /// CANCELADO and PAGADO are immutable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Paid)
    }

    /// States the kitchen drives.
    #[inline]
    pub fn is_kitchen_stage(&self) -> bool {
        matches!(
            self,
            OrderStatus::SentToKitchen | OrderStatus::InPreparation | OrderStatus::ReadyToServe
        )
    }

    /// ENVIADO_A_COCINA or any later non-terminal state.
    ///
    /// Edits and cancellations in these states are subject to the tenant's
    /// time windows.
    #[inline]
    pub fn is_past_kitchen_send(&self) -> bool {
        !self.is_terminal() && *self != OrderStatus::Open
    }

    /// Orders the automatic shift close leaves untouched: terminal ones and
    /// CERRADO, which is waiting for payment.
    #[inline]
    pub fn is_settled_or_awaiting_payment(&self) -> bool {
        self.is_terminal() || *self == OrderStatus::Closed
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Kind
// =============================================================================

/// How the order is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum OrderKind {
    #[serde(rename = "MESA")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "MESA"))]
    Table,
    #[serde(rename = "PARA_LLEVAR")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PARA_LLEVAR"))]
    Takeaway,
    #[serde(rename = "DOMICILIO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DOMICILIO"))]
    Delivery,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Table => "MESA",
            OrderKind::Takeaway => "PARA_LLEVAR",
            OrderKind::Delivery => "DOMICILIO",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Kitchen Status
// =============================================================================

/// Per-item preparation state, independent of the order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum KitchenStatus {
    #[serde(rename = "PENDIENTE")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PENDIENTE"))]
    Pending,
    #[serde(rename = "ENVIADO_A_COCINA")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ENVIADO_A_COCINA"))]
    SentToKitchen,
    #[serde(rename = "EN_PREPARACION")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "EN_PREPARACION"))]
    InPreparation,
    #[serde(rename = "LISTO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "LISTO"))]
    Ready,
    #[serde(rename = "CANCELADO")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "CANCELADO"))]
    Cancelled,
}

impl KitchenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitchenStatus::Pending => "PENDIENTE",
            KitchenStatus::SentToKitchen => "ENVIADO_A_COCINA",
            KitchenStatus::InPreparation => "EN_PREPARACION",
            KitchenStatus::Ready => "LISTO",
            KitchenStatus::Cancelled => "CANCELADO",
        }
    }
}

impl fmt::Display for KitchenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Table State
// =============================================================================

/// Occupancy flag of a dining table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum TableState {
    #[serde(rename = "LIBRE")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "LIBRE"))]
    Free,
    #[serde(rename = "OCUPADA")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "OCUPADA"))]
    Occupied,
}

impl TableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableState::Free => "LIBRE",
            TableState::Occupied => "OCUPADA",
        }
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tenant, Users, Tables
// =============================================================================

/// Per-tenant business limits, all in minutes. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenantSettings {
    pub tenant_id: String,

    /// `limite_edicion_pedido_minutos`
    pub edit_limit_minutes: Option<i64>,

    /// `limite_cancelacion_preparacion_minutos`
    pub cancel_prep_limit_minutes: Option<i64>,

    /// `limite_cancelacion_enviado_cocina_minutos`
    pub cancel_sent_limit_minutes: Option<i64>,
}

/// A staff member of one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

/// A dining table.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiningTable {
    pub id: String,
    pub tenant_id: String,
    pub label: String,
    pub state: TableState,
}

// =============================================================================
// Menu / Inventory
// =============================================================================

/// A fixed-price menu product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub price: Money,

    /// Products in a beverage category lock once they are LISTO.
    pub is_beverage: bool,

    pub active: bool,
}

/// A product assembled from a JSON configuration (e.g. build-your-own bowl).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConfigurableProduct {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub base_price: Money,
    pub active: bool,
}

/// Aggregated ingredient demand of an order against current stock.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientRequirement {
    pub ingredient_id: String,
    pub name: String,
    pub required: f64,
    pub available: f64,
}

// =============================================================================
// Orders
// =============================================================================

/// One customer visit / ticket ("pedido").
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,

    /// Sequential per tenant and local (UTC−5) day, starting at 1.
    pub number: i64,

    pub table_id: Option<String>,
    pub created_by: String,
    pub delivery_driver_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub status: OrderStatus,
    pub kind: OrderKind,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,

    /// Σ quantity × captured unit price over the order's items.
    pub estimated_total: Money,
    pub discount: Money,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,

    /// Set when an automatic shift close force-cancels the order.
    pub cash_shift_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// `fecha_ultima_actualizacion_relevante_cocina`: anchor of the edit and
    /// cancellation windows.
    #[ts(as = "String")]
    pub kitchen_updated_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One product line within an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    pub configurable_product_id: Option<String>,
    #[ts(type = "unknown")]
    pub configuration: Option<serde_json::Value>,
    pub quantity: i64,

    /// Price captured when the line was added; never re-read from the menu.
    pub unit_price: Money,

    pub note: Option<String>,
    pub kitchen_status: KitchenStatus,

    #[ts(as = "String")]
    pub kitchen_status_at: DateTime<Utc>,

    /// Derived from the product's category when loaded.
    pub is_beverage: bool,
}

impl OrderItem {
    /// Line total.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Full order graph returned by every order operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Cash Shift
// =============================================================================

/// A cashier's working period ("cierre de caja").
///
/// At most one row with `closed = false` exists per (tenant, cashier).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashShift {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    #[ts(type = "Record<string, number>")]
    pub opening_denominations: Denominations,
    pub opening_balance: Money,
    #[ts(type = "Record<string, number> | null")]
    pub closing_denominations: Option<Denominations>,
    pub counted_balance: Money,

    pub gross_sales: Money,
    pub discounts: Money,
    pub taxes: Money,
    pub tips: Money,
    pub net_sales: Money,
    pub cash_payments: Money,
    pub card_payments: Money,
    pub other_payments: Money,
    pub total_collected: Money,
    pub expenses: Money,
    pub extra_income: Money,

    /// `diferencia_caja`: counted − expected.
    pub cash_difference: Money,

    pub notes: Option<String>,
    pub closed: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// A payment method as configured by the tenant (cash, card brands, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentMethod {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub is_cash: bool,
}

/// Where money lands; each account belongs to one payment method.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BankAccount {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub payment_method_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub tip: Money,

    /// subtotal − discount + tax + tip
    pub total: Money,

    pub cash_shift_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Amount the payments must cover before the tip.
    #[inline]
    pub fn net_due(&self) -> Money {
        self.subtotal - self.discount + self.tax
    }
}

/// Per-order amount an invoice applies (supports split/partial invoicing).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceOrder {
    pub invoice_id: String,
    pub order_id: String,
    pub applied: Money,
}

/// One money-received event against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub invoice_id: String,
    pub bank_account_id: Option<String>,

    /// Base amount, tip excluded.
    pub amount: Money,

    pub reference: Option<String>,
    #[ts(type = "Record<string, number> | null")]
    pub denominations: Option<Denominations>,

    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,

    /// Null until a shift close allocates the payment.
    pub cash_shift_id: Option<String>,
    pub payment_split_id: Option<String>,
}

/// Operating expense paid out of the drawer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,
    pub cash_shift_id: String,
    pub amount: Money,
    pub concept: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Cash put into the drawer that is not a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExtraIncome {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,
    pub cash_shift_id: String,
    pub amount: Money,
    pub concept: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::ReadyToServe).unwrap(),
            "\"LISTO_PARA_ENTREGAR\""
        );
        assert_eq!(serde_json::to_string(&Role::DeliveryDriver).unwrap(), "\"DOMICILIARIO\"");
        let kind: OrderKind = serde_json::from_str("\"PARA_LLEVAR\"").unwrap();
        assert_eq!(kind, OrderKind::Takeaway);
    }

    #[test]
    fn test_display_matches_wire_name() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn test_status_classes() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Closed.is_terminal());
        assert!(OrderStatus::Closed.is_settled_or_awaiting_payment());
        assert!(!OrderStatus::Open.is_past_kitchen_send());
        assert!(OrderStatus::Delivered.is_past_kitchen_send());
        assert!(Role::Supervisor.is_elevated());
        assert!(!Role::Cashier.is_elevated());
    }

    #[test]
    fn test_line_total_uses_captured_price() {
        let item = OrderItem {
            id: "i".into(),
            order_id: "o".into(),
            product_id: Some("p".into()),
            configurable_product_id: None,
            configuration: None,
            quantity: 3,
            unit_price: Money::from_cents(1250),
            note: None,
            kitchen_status: KitchenStatus::Pending,
            kitchen_status_at: Utc::now(),
            is_beverage: false,
        };
        assert_eq!(item.line_total(), Money::from_cents(3750));
    }
}
