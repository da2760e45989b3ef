//! # Error Types
//!
//! Domain error taxonomy for comanda-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  comanda-core (this file)                                              │
//! │  ├── CoreError        - Validation / NotFound / Permission / Conflict  │
//! │  └── ValidationError  - Malformed or inconsistent input                │
//! │                                                                         │
//! │  comanda-db                                                            │
//! │  └── DbError          - Database failures (lock timeouts are transient)│
//! │                                                                         │
//! │  comanda-engine                                                        │
//! │  └── EngineError      - Core | Database | ConcurrencyExhausted         │
//! │                                                                         │
//! │  apps/api                                                              │
//! │  └── ApiError         - { code, message } + HTTP status                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error exposes a stable machine-readable reason (`reason()`) that
//! the API returns verbatim as `code`. Human messages are in Spanish.

use thiserror::Error;

use crate::types::{KitchenStatus, OrderStatus, Role};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse class of a domain error, mapped 1:1 to an HTTP status at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400
    Validation,
    /// 404
    NotFound,
    /// 403
    Permission,
    /// 409
    Conflict,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed a domain rule.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Referenced entity does not exist for this tenant.
    ///
    /// ## When This Occurs
    /// - Order, item, table, product or user id unknown to the tenant
    /// - Closing a shift when the cashier has none open
    #[error("{entity} no encontrado: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The acting role may not perform the action.
    #[error("el rol {role} no puede {action}")]
    Permission { role: Role, action: String },

    /// State conflict with another aggregate.
    ///
    /// ## When This Occurs
    /// - Destination table already occupied (`mesa_ocupada`)
    /// - Second open shift for the same cashier (`cierre_abierto_existente`)
    #[error("{message}")]
    Conflict { reason: &'static str, message: String },

    /// Closing an order would drive an ingredient below zero.
    ///
    /// Classified as a validation failure; the whole transition reverts.
    #[error(
        "stock insuficiente de {ingredient}: requerido {required:.3}, disponible {available:.3}"
    )]
    InsufficientStock {
        ingredient: String,
        required: f64,
        available: f64,
    },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn permission(role: Role, action: impl Into<String>) -> Self {
        CoreError::Permission {
            role,
            action: action.into(),
        }
    }

    pub fn conflict(reason: &'static str, message: impl Into<String>) -> Self {
        CoreError::Conflict {
            reason,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::InsufficientStock { .. } => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Permission { .. } => ErrorKind::Permission,
            CoreError::Conflict { .. } => ErrorKind::Conflict,
        }
    }

    /// Stable reason string for clients.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::Validation(v) => v.reason(),
            CoreError::NotFound { .. } => "no_encontrado",
            CoreError::Permission { .. } => "permiso_denegado",
            CoreError::Conflict { reason, .. } => *reason,
            CoreError::InsufficientStock { .. } => "stock_insuficiente",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input that is malformed or inconsistent with the aggregate's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("{field} es obligatorio")]
    Required { field: &'static str },

    #[error("{field} tiene un formato inválido: {reason}")]
    InvalidFormat { field: &'static str, reason: String },

    #[error("{field} debe ser mayor que cero")]
    MustBePositive { field: &'static str },

    #[error("{field} no puede superar {max} caracteres")]
    TooLong { field: &'static str, max: usize },

    /// Order created or edited with an empty item list.
    #[error("el pedido debe tener al menos un ítem")]
    NoItems,

    /// Edit would remove every remaining item.
    #[error("el pedido debe conservar al menos un ítem")]
    WouldRemoveAllItems,

    #[error("cantidad inválida: {quantity} (debe estar entre 1 y {max})")]
    InvalidQuantity { quantity: i64, max: i64 },

    /// Line must reference exactly one of product / configurable product.
    #[error("cada ítem debe referir un producto o un producto configurable, no ambos")]
    AmbiguousProduct,

    #[error("{entity} {id} está inactivo")]
    Inactive { entity: &'static str, id: String },

    /// CERRADO requested while items are still in the kitchen.
    #[error("ítems pendientes de entrega ({pending})")]
    PendingItems { pending: usize },

    #[error("no se puede pasar el pedido de {from} a {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("no se puede pasar el ítem de {from} a {to}")]
    InvalidKitchenTransition {
        from: KitchenStatus,
        to: KitchenStatus,
    },

    #[error("el pedido está {status} y no admite cambios")]
    OrderFinalized { status: OrderStatus },

    /// CERRADO orders wait for payment; an ADMIN reopen is the way back.
    #[error("el pedido está CERRADO y pendiente de cobro")]
    AwaitingPayment,

    /// Time window for the action elapsed (non-elevated roles only).
    #[error("el plazo para {action} venció: {elapsed_minutes} min transcurridos, límite {limit_minutes} min")]
    WindowExpired {
        action: &'static str,
        limit_minutes: i64,
        elapsed_minutes: i64,
    },

    /// Item already LISTO; only elevated roles may touch it.
    #[error("el ítem {item_id} ya está listo y no puede modificarse")]
    ItemLocked { item_id: String },

    #[error("un pedido entregado solo admite agregar ítems")]
    DeliveredAppendOnly,

    #[error("el pedido {order_id} no está CERRADO ({status})")]
    NotInvoiceable { order_id: String, status: OrderStatus },

    #[error("el monto aplicado al pedido {order_id} supera su saldo pendiente")]
    OverApplied { order_id: String },

    #[error("los pagos ({received}) no cubren el total de la factura ({expected})")]
    PaymentMismatch { expected: String, received: String },

    #[error("{field} no es válido: {reason}")]
    NotAllowed { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Required { .. } => "campo_obligatorio",
            ValidationError::InvalidFormat { .. } => "formato_invalido",
            ValidationError::MustBePositive { .. } => "monto_invalido",
            ValidationError::TooLong { .. } => "texto_demasiado_largo",
            ValidationError::NoItems | ValidationError::WouldRemoveAllItems => "sin_items",
            ValidationError::InvalidQuantity { .. } => "cantidad_invalida",
            ValidationError::AmbiguousProduct => "producto_ambiguo",
            ValidationError::Inactive { .. } => "inactivo",
            ValidationError::PendingItems { .. } => "items_pendientes",
            ValidationError::InvalidTransition { .. }
            | ValidationError::InvalidKitchenTransition { .. } => "transicion_invalida",
            ValidationError::OrderFinalized { .. } => "pedido_finalizado",
            ValidationError::AwaitingPayment => "pedido_por_cobrar",
            ValidationError::WindowExpired { .. } => "plazo_vencido",
            ValidationError::ItemLocked { .. } => "item_bloqueado",
            ValidationError::DeliveredAppendOnly => "pedido_entregado",
            ValidationError::NotInvoiceable { .. } => "pedido_no_facturable",
            ValidationError::OverApplied { .. } => "monto_excedido",
            ValidationError::PaymentMismatch { .. } => "pagos_descuadrados",
            ValidationError::NotAllowed { .. } => "valor_no_permitido",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_phone_message() {
        let err = ValidationError::Required {
            field: "el teléfono del cliente",
        };
        assert_eq!(err.to_string(), "el teléfono del cliente es obligatorio");
    }

    #[test]
    fn test_pending_items_message() {
        let err: CoreError = ValidationError::PendingItems { pending: 1 }.into();
        assert!(err.to_string().contains("ítems pendientes de entrega"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.reason(), "items_pendientes");
    }

    #[test]
    fn test_insufficient_stock_is_validation() {
        let err = CoreError::InsufficientStock {
            ingredient: "Queso".into(),
            required: 2.5,
            available: 1.0,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "stock insuficiente de Queso: requerido 2.500, disponible 1.000"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CoreError::not_found("pedido", "x").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::permission(Role::Cook, "cancelar").kind(),
            ErrorKind::Permission
        );
        let conflict = CoreError::conflict("mesa_ocupada", "la mesa 4 está ocupada");
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(conflict.reason(), "mesa_ocupada");
    }
}
