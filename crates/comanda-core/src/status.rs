//! # Order Transition Table
//!
//! Declarative rules for order status changes, split in two independent
//! layers that are unit-testable without a database:
//!
//! 1. **Role gate**: which roles may set a given target status.
//! 2. **Structure**: which `(kind, from, to)` moves the state machine has.
//!
//! ```text
//! ┌────────────────────────────────────────┬──────────────────────────────┐
//! │ Target                                 │ Roles                        │
//! ├────────────────────────────────────────┼──────────────────────────────┤
//! │ CANCELADO, CERRADO, PAGADO             │ ADMIN CAJERO SUPERVISOR MESERO│
//! │ ENVIADO_A_COCINA, EN_PREPARACION,      │ ADMIN SUPERVISOR COCINERO    │
//! │ LISTO_PARA_ENTREGAR                    │                              │
//! │ ENTREGADO                              │ ADMIN SUPERVISOR DOMICILIARIO│
//! │                                        │ MESERO                       │
//! │ EN_REPARTO                             │ ADMIN SUPERVISOR DOMICILIARIO│
//! │                                        │ CAJERO                       │
//! │ ABIERTO (reopen)                       │ ADMIN                        │
//! └────────────────────────────────────────┴──────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{KitchenStatus, OrderItem, OrderKind, OrderStatus, Role};

const SETTLEMENT_ROLES: &[Role] = &[Role::Admin, Role::Cashier, Role::Supervisor, Role::Waiter];
const KITCHEN_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Cook];
const DELIVERED_ROLES: &[Role] = &[
    Role::Admin,
    Role::Supervisor,
    Role::DeliveryDriver,
    Role::Waiter,
];
const DISPATCH_ROLES: &[Role] = &[
    Role::Admin,
    Role::Supervisor,
    Role::DeliveryDriver,
    Role::Cashier,
];
const REOPEN_ROLES: &[Role] = &[Role::Admin];

// =============================================================================
// Role Gate
// =============================================================================

/// Roles allowed to set `target`.
pub fn allowed_roles(target: OrderStatus) -> &'static [Role] {
    match target {
        OrderStatus::Cancelled | OrderStatus::Closed | OrderStatus::Paid => SETTLEMENT_ROLES,
        OrderStatus::SentToKitchen | OrderStatus::InPreparation | OrderStatus::ReadyToServe => {
            KITCHEN_ROLES
        }
        OrderStatus::Delivered => DELIVERED_ROLES,
        OrderStatus::OutForDelivery => DISPATCH_ROLES,
        OrderStatus::Open => REOPEN_ROLES,
    }
}

#[inline]
pub fn role_may_set(role: Role, target: OrderStatus) -> bool {
    allowed_roles(target).contains(&role)
}

/// Roles that may move an item's kitchen status.
#[inline]
pub fn role_may_move_items(role: Role) -> bool {
    KITCHEN_ROLES.contains(&role)
}

// =============================================================================
// Structure
// =============================================================================

/// Whether the state machine has the edge `from → to` for an order of
/// `kind`, regardless of who asks.
pub fn structurally_allowed(kind: OrderKind, from: OrderStatus, to: OrderStatus) -> bool {
    if from.is_terminal() || from == to {
        return false;
    }
    match to {
        OrderStatus::Open | OrderStatus::Cancelled => true,
        OrderStatus::SentToKitchen | OrderStatus::InPreparation | OrderStatus::ReadyToServe => {
            from != OrderStatus::Closed
        }
        OrderStatus::OutForDelivery => {
            kind == OrderKind::Delivery && from == OrderStatus::ReadyToServe
        }
        OrderStatus::Delivered => match kind {
            OrderKind::Delivery => from == OrderStatus::OutForDelivery,
            OrderKind::Table | OrderKind::Takeaway => from == OrderStatus::ReadyToServe,
        },
        OrderStatus::Closed => matches!(
            from,
            OrderStatus::InPreparation
                | OrderStatus::ReadyToServe
                | OrderStatus::Delivered
                | OrderStatus::OutForDelivery
        ),
        OrderStatus::Paid => from == OrderStatus::Closed,
    }
}

/// `(role, from, to) → allowed` for an order of `kind`.
pub fn can_transition(role: Role, kind: OrderKind, from: OrderStatus, to: OrderStatus) -> bool {
    role_may_set(role, to) && structurally_allowed(kind, from, to)
}

/// Whether item edits and kitchen moves are accepted on an order in
/// `status`. CERRADO has already consumed its stock, so new items would
/// never be charged.
pub fn ensure_editable(status: OrderStatus) -> CoreResult<()> {
    if status.is_terminal() {
        return Err(ValidationError::OrderFinalized { status }.into());
    }
    if status == OrderStatus::Closed {
        return Err(ValidationError::AwaitingPayment.into());
    }
    Ok(())
}

/// Non-cancelled items that are not yet LISTO.
pub fn pending_items(items: &[OrderItem]) -> usize {
    items
        .iter()
        .filter(|i| !matches!(i.kitchen_status, KitchenStatus::Ready | KitchenStatus::Cancelled))
        .count()
}

/// Full check for a status change, in the order callers observe errors:
/// permission, finalized order, pending items (for CERRADO), structure.
pub fn authorize_transition(
    role: Role,
    kind: OrderKind,
    from: OrderStatus,
    to: OrderStatus,
    items: &[OrderItem],
) -> CoreResult<()> {
    if !role_may_set(role, to) {
        return Err(CoreError::permission(role, format!("pasar pedidos a {to}")));
    }
    if from.is_terminal() {
        return Err(ValidationError::OrderFinalized { status: from }.into());
    }
    if to == OrderStatus::Closed {
        let pending = pending_items(items);
        if pending > 0 {
            return Err(ValidationError::PendingItems { pending }.into());
        }
    }
    if !structurally_allowed(kind, from, to) {
        return Err(ValidationError::InvalidTransition { from, to }.into());
    }
    Ok(())
}

// =============================================================================
// Item Kitchen Moves
// =============================================================================

/// Checks a kitchen-status change on a single item.
///
/// LISTO items are locked: only ADMIN/SUPERVISOR may move them, and only
/// back to PENDIENTE. CANCELADO is reached through order edits, never here.
pub fn authorize_item_move(role: Role, item: &OrderItem, to: KitchenStatus) -> CoreResult<()> {
    if !role_may_move_items(role) {
        return Err(CoreError::permission(role, "cambiar el estado de cocina de un ítem"));
    }
    let from = item.kitchen_status;
    if from == KitchenStatus::Ready && to != KitchenStatus::Ready {
        if !role.is_elevated() {
            return Err(ValidationError::ItemLocked {
                item_id: item.id.clone(),
            }
            .into());
        }
        if to != KitchenStatus::Pending {
            return Err(ValidationError::InvalidKitchenTransition { from, to }.into());
        }
        return Ok(());
    }
    if from == to || from == KitchenStatus::Cancelled || to == KitchenStatus::Cancelled {
        return Err(ValidationError::InvalidKitchenTransition { from, to }.into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::money::Money;
    use chrono::Utc;

    fn item(status: KitchenStatus) -> OrderItem {
        OrderItem {
            id: "item-1".into(),
            order_id: "o".into(),
            product_id: Some("p".into()),
            configurable_product_id: None,
            configuration: None,
            quantity: 1,
            unit_price: Money::from_cents(1000),
            note: None,
            kitchen_status: status,
            kitchen_status_at: Utc::now(),
            is_beverage: false,
        }
    }

    #[test]
    fn test_role_gate_matrix() {
        for role in Role::ALL {
            for to in OrderStatus::ALL {
                let expected = match to {
                    OrderStatus::Cancelled | OrderStatus::Closed | OrderStatus::Paid => matches!(
                        role,
                        Role::Admin | Role::Cashier | Role::Supervisor | Role::Waiter
                    ),
                    OrderStatus::SentToKitchen
                    | OrderStatus::InPreparation
                    | OrderStatus::ReadyToServe => {
                        matches!(role, Role::Admin | Role::Supervisor | Role::Cook)
                    }
                    OrderStatus::Delivered => matches!(
                        role,
                        Role::Admin | Role::Supervisor | Role::DeliveryDriver | Role::Waiter
                    ),
                    OrderStatus::OutForDelivery => matches!(
                        role,
                        Role::Admin | Role::Supervisor | Role::DeliveryDriver | Role::Cashier
                    ),
                    OrderStatus::Open => role == Role::Admin,
                };
                assert_eq!(role_may_set(role, to), expected, "{role} → {to}");
            }
        }
    }

    #[test]
    fn test_denied_role_is_permission_error_even_on_bad_edge() {
        let err = authorize_transition(
            Role::Cook,
            OrderKind::Table,
            OrderStatus::Open,
            OrderStatus::Paid,
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_close_requires_ready_items() {
        let items = [item(KitchenStatus::InPreparation), item(KitchenStatus::Ready)];
        let err = authorize_transition(
            Role::Cashier,
            OrderKind::Table,
            OrderStatus::InPreparation,
            OrderStatus::Closed,
            &items,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::PendingItems { pending: 1 })
        ));

        let items = [item(KitchenStatus::Ready), item(KitchenStatus::Cancelled)];
        assert!(authorize_transition(
            Role::Cashier,
            OrderKind::Table,
            OrderStatus::Delivered,
            OrderStatus::Closed,
            &items,
        )
        .is_ok());
    }

    #[test]
    fn test_paid_only_from_closed() {
        assert!(structurally_allowed(OrderKind::Table, OrderStatus::Closed, OrderStatus::Paid));
        assert!(!structurally_allowed(OrderKind::Table, OrderStatus::Delivered, OrderStatus::Paid));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for to in OrderStatus::ALL {
            assert!(!structurally_allowed(OrderKind::Table, OrderStatus::Paid, to));
            assert!(!structurally_allowed(OrderKind::Table, OrderStatus::Cancelled, to));
        }
    }

    #[test]
    fn test_closed_orders_are_not_editable() {
        let err = ensure_editable(OrderStatus::Closed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.reason(), "pedido_por_cobrar");
        assert_eq!(ensure_editable(OrderStatus::Paid).unwrap_err().reason(), "pedido_finalizado");
        assert!(ensure_editable(OrderStatus::Delivered).is_ok());
        assert!(ensure_editable(OrderStatus::Open).is_ok());
    }

    #[test]
    fn test_delivery_route() {
        let k = OrderKind::Delivery;
        assert!(structurally_allowed(k, OrderStatus::ReadyToServe, OrderStatus::OutForDelivery));
        assert!(structurally_allowed(k, OrderStatus::OutForDelivery, OrderStatus::Delivered));
        assert!(!structurally_allowed(k, OrderStatus::ReadyToServe, OrderStatus::Delivered));
        assert!(!structurally_allowed(
            OrderKind::Table,
            OrderStatus::ReadyToServe,
            OrderStatus::OutForDelivery
        ));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for from in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(can_transition(Role::Waiter, OrderKind::Takeaway, from, OrderStatus::Cancelled));
        }
    }

    #[test]
    fn test_item_moves() {
        let ready = item(KitchenStatus::Ready);
        assert!(matches!(
            authorize_item_move(Role::Cook, &ready, KitchenStatus::Pending),
            Err(CoreError::Validation(ValidationError::ItemLocked { .. }))
        ));
        assert!(authorize_item_move(Role::Supervisor, &ready, KitchenStatus::Pending).is_ok());
        assert!(authorize_item_move(Role::Admin, &ready, KitchenStatus::InPreparation).is_err());

        let pending = item(KitchenStatus::Pending);
        assert!(authorize_item_move(Role::Cook, &pending, KitchenStatus::InPreparation).is_ok());
        assert_eq!(
            authorize_item_move(Role::Waiter, &pending, KitchenStatus::Ready)
                .unwrap_err()
                .kind(),
            ErrorKind::Permission
        );
        assert!(authorize_item_move(Role::Cook, &pending, KitchenStatus::Cancelled).is_err());
    }
}
