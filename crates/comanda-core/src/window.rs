//! # Time Windows
//!
//! Edits and cancellations are time-boxed per tenant, measured from the
//! order's last kitchen-relevant update.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────────┐
//! │ Order status         │ Limit applied                                │
//! ├──────────────────────┼──────────────────────────────────────────────┤
//! │ ABIERTO              │ none (edit and cancel freely)                │
//! │ ENVIADO_A_COCINA     │ edit: edit_limit                             │
//! │                      │ cancel: cancel_sent_limit                    │
//! │ later, non-terminal  │ edit: edit_limit                             │
//! │                      │ cancel: cancel_prep_limit                    │
//! └──────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ADMIN and SUPERVISOR are never bounded. A tenant without a settings row,
//! or a `None` limit, means unbounded. Elapsed time equal to the limit is
//! still inside the window.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::time::elapsed_minutes;
use crate::types::{OrderStatus, Role, TenantSettings};

/// The time-boxed actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Edit,
    Cancel,
}

impl WindowAction {
    fn label(&self) -> &'static str {
        match self {
            WindowAction::Edit => "editar el pedido",
            WindowAction::Cancel => "cancelar el pedido",
        }
    }
}

/// Limit in minutes for `action` on an order in `status`, if any.
pub fn applicable_limit(
    action: WindowAction,
    status: OrderStatus,
    settings: Option<&TenantSettings>,
) -> Option<i64> {
    let settings = settings?;
    if !status.is_past_kitchen_send() {
        return None;
    }
    match action {
        WindowAction::Edit => settings.edit_limit_minutes,
        WindowAction::Cancel if status == OrderStatus::SentToKitchen => {
            settings.cancel_sent_limit_minutes
        }
        WindowAction::Cancel => settings.cancel_prep_limit_minutes,
    }
}

/// Pure predicate: may `role` still act, given the anchor and the limit?
pub fn within_window(
    role: Role,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    limit_minutes: Option<i64>,
) -> bool {
    if role.is_elevated() {
        return true;
    }
    match limit_minutes {
        None => true,
        Some(limit) => now - anchor <= chrono::Duration::minutes(limit),
    }
}

/// Checks the window for an action on an order.
pub fn check_window(
    action: WindowAction,
    role: Role,
    status: OrderStatus,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: Option<&TenantSettings>,
) -> Result<(), ValidationError> {
    let limit = applicable_limit(action, status, settings);
    if within_window(role, anchor, now, limit) {
        return Ok(());
    }
    Err(ValidationError::WindowExpired {
        action: action.label(),
        limit_minutes: limit.unwrap_or_default(),
        elapsed_minutes: elapsed_minutes(anchor, now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn settings() -> TenantSettings {
        TenantSettings {
            tenant_id: "t".into(),
            edit_limit_minutes: Some(5),
            cancel_prep_limit_minutes: Some(10),
            cancel_sent_limit_minutes: Some(3),
        }
    }

    #[test]
    fn test_waiter_cannot_cancel_after_prep_limit() {
        let now = Utc::now();
        let s = settings();
        let result = check_window(
            WindowAction::Cancel,
            Role::Waiter,
            OrderStatus::InPreparation,
            now - Duration::minutes(11),
            now,
            Some(&s),
        );
        assert!(matches!(result, Err(ValidationError::WindowExpired { limit_minutes: 10, .. })));
    }

    #[test]
    fn test_admin_is_unbounded() {
        let now = Utc::now();
        let s = settings();
        assert!(check_window(
            WindowAction::Cancel,
            Role::Admin,
            OrderStatus::InPreparation,
            now - Duration::minutes(20),
            now,
            Some(&s),
        )
        .is_ok());
    }

    #[test]
    fn test_limit_selection() {
        let s = settings();
        assert_eq!(
            applicable_limit(WindowAction::Cancel, OrderStatus::SentToKitchen, Some(&s)),
            Some(3)
        );
        assert_eq!(
            applicable_limit(WindowAction::Cancel, OrderStatus::ReadyToServe, Some(&s)),
            Some(10)
        );
        assert_eq!(
            applicable_limit(WindowAction::Edit, OrderStatus::Delivered, Some(&s)),
            Some(5)
        );
        assert_eq!(applicable_limit(WindowAction::Cancel, OrderStatus::Open, Some(&s)), None);
        assert_eq!(
            applicable_limit(WindowAction::Cancel, OrderStatus::InPreparation, None),
            None
        );
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(within_window(Role::Cashier, now - Duration::minutes(10), now, Some(10)));
        assert!(!within_window(
            Role::Cashier,
            now - Duration::minutes(10) - Duration::seconds(1),
            now,
            Some(10)
        ));
    }
}
