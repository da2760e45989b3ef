//! # Item Reconciliation
//!
//! Turns an incoming item list into a plan of creates, updates and deletes
//! against the order's current items. The plan is computed purely; the
//! engine applies it inside the order's transaction.
//!
//! ## Diff Rules
//! ```text
//! incoming item            current item     → action
//! ───────────────────────  ───────────────  ─────────────────────────────
//! no id                    -                → create (price captured later)
//! id, quantity ≤ 0         present          → delete
//! id, quantity/note diff   present          → update
//! id                       absent           → NotFound
//! (omitted)                present          → delete
//! empty list                                → rejected (never "delete all")
//! ```
//!
//! LISTO items are locked for non-elevated roles. ENTREGADO orders only grow.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{KitchenStatus, OrderItem, OrderStatus, Role};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Inputs
// =============================================================================

/// One line of an incoming item list (create or edit).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemInput {
    /// Existing item id; `None` for a new line.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "producto_id", default)]
    pub product_id: Option<String>,
    #[serde(rename = "producto_configurable_id", default)]
    pub configurable_product_id: Option<String>,
    #[serde(rename = "configuracion_json", default)]
    #[ts(type = "unknown")]
    pub configuration: Option<Value>,
    #[serde(rename = "cantidad")]
    pub quantity: i64,
    #[serde(rename = "notas_item", default)]
    pub note: Option<String>,
}

/// What a new line is made of.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductRef {
    Product(String),
    Configurable {
        id: String,
        configuration: Option<Value>,
    },
}

/// A validated new line, price not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLine {
    pub product: ProductRef,
    pub quantity: i64,
    pub note: Option<String>,
}

/// Change to an existing line.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub item_id: String,
    pub quantity: i64,
    pub note: Option<String>,

    /// Elevated edit of a LISTO item sends it back to the kitchen.
    pub revert_to_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPlan {
    pub create: Vec<NewLine>,
    pub update: Vec<ItemChange>,
    pub delete: Vec<String>,
}

impl ItemPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

// =============================================================================
// Validation
// =============================================================================

fn check_quantity(quantity: i64) -> Result<(), ValidationError> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ValidationError::InvalidQuantity {
            quantity,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a new line: quantity in range and exactly one product reference.
pub fn validate_new_line(input: &ItemInput) -> Result<NewLine, ValidationError> {
    check_quantity(input.quantity)?;
    let product = match (&input.product_id, &input.configurable_product_id) {
        (Some(id), None) => ProductRef::Product(id.clone()),
        (None, Some(id)) => ProductRef::Configurable {
            id: id.clone(),
            configuration: input.configuration.clone(),
        },
        _ => return Err(ValidationError::AmbiguousProduct),
    };
    Ok(NewLine {
        product,
        quantity: input.quantity,
        note: input.note.clone(),
    })
}

/// Validates a create-time item list.
pub fn validate_new_lines(inputs: &[ItemInput]) -> Result<Vec<NewLine>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoItems);
    }
    inputs.iter().map(validate_new_line).collect()
}

// =============================================================================
// Planning
// =============================================================================

fn guard_locked(item: &OrderItem, role: Role) -> CoreResult<()> {
    if item.kitchen_status == KitchenStatus::Ready && !role.is_elevated() {
        return Err(ValidationError::ItemLocked {
            item_id: item.id.clone(),
        }
        .into());
    }
    Ok(())
}

/// Diffs `incoming` against `current` for an edit by `role` on an order in
/// `status`.
pub fn plan_item_changes(
    current: &[OrderItem],
    incoming: &[ItemInput],
    role: Role,
    status: OrderStatus,
) -> CoreResult<ItemPlan> {
    if incoming.is_empty() {
        return Err(ValidationError::NoItems.into());
    }

    let delivered = status == OrderStatus::Delivered;
    let by_id: HashMap<&str, &OrderItem> = current.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut plan = ItemPlan::default();

    for input in incoming {
        let Some(id) = input.id.as_deref() else {
            plan.create.push(validate_new_line(input)?);
            continue;
        };

        let item = by_id
            .get(id)
            .copied()
            .ok_or_else(|| CoreError::not_found("ítem", id))?;
        if !seen.insert(item.id.as_str()) {
            return Err(ValidationError::NotAllowed {
                field: "items",
                reason: format!("el ítem {id} aparece más de una vez"),
            }
            .into());
        }

        if input.quantity <= 0 {
            guard_locked(item, role)?;
            if delivered {
                return Err(ValidationError::DeliveredAppendOnly.into());
            }
            plan.delete.push(item.id.clone());
            continue;
        }

        check_quantity(input.quantity)?;
        let note_changed = input.note.is_some() && input.note != item.note;
        if input.quantity == item.quantity && !note_changed {
            continue;
        }

        guard_locked(item, role)?;
        if delivered && input.quantity < item.quantity {
            return Err(ValidationError::DeliveredAppendOnly.into());
        }
        plan.update.push(ItemChange {
            item_id: item.id.clone(),
            quantity: input.quantity,
            note: if note_changed {
                input.note.clone()
            } else {
                item.note.clone()
            },
            revert_to_pending: item.kitchen_status == KitchenStatus::Ready,
        });
    }

    for item in current {
        if seen.contains(item.id.as_str()) {
            continue;
        }
        guard_locked(item, role)?;
        if delivered {
            return Err(ValidationError::DeliveredAppendOnly.into());
        }
        plan.delete.push(item.id.clone());
    }

    let remaining = current.len() - plan.delete.len() + plan.create.len();
    if remaining == 0 {
        return Err(ValidationError::WouldRemoveAllItems.into());
    }

    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================
