//! Builders shared by the engine tests.

use comanda_core::items::ItemInput;
use comanda_core::{Money, OrderKind, OrderStatus};
use comanda_db::test_support::{ids, seeded_database};
use comanda_db::Database;

use crate::ledger::{InvoiceLine, InvoiceRequest, PaymentInput};
use crate::orders::{NewOrder, StatusChange};
use crate::{EngineConfig, Services};

pub async fn services() -> (Services, Database) {
    let db = seeded_database().await;
    let services = Services::new(db.clone(), &EngineConfig::default());
    (services, db)
}

pub fn line(product_id: &str, quantity: i64) -> ItemInput {
    ItemInput {
        id: None,
        product_id: Some(product_id.to_string()),
        configurable_product_id: None,
        configuration: None,
        quantity,
        note: None,
    }
}

/// Existing item kept as is.
pub fn keep(item_id: &str, quantity: i64) -> ItemInput {
    ItemInput {
        id: Some(item_id.to_string()),
        product_id: None,
        ..line("", quantity)
    }
}

pub fn table_order(table_id: &str, items: Vec<ItemInput>) -> NewOrder {
    NewOrder {
        table_id: Some(table_id.to_string()),
        kind: OrderKind::Table,
        customer_name: None,
        customer_phone: None,
        customer_address: None,
        notes: None,
        discount: Money::zero(),
        items,
    }
}

pub fn takeaway_order(items: Vec<ItemInput>) -> NewOrder {
    NewOrder {
        table_id: None,
        kind: OrderKind::Takeaway,
        customer_name: Some("Rosa".into()),
        ..table_order("", items)
    }
}

pub fn to(status: OrderStatus) -> StatusChange {
    StatusChange { status, reason: None }
}

/// Walks an open order through the kitchen and closes it.
pub async fn close_order(services: &Services, order_id: &str) {
    for status in [
        OrderStatus::SentToKitchen,
        OrderStatus::InPreparation,
        OrderStatus::ReadyToServe,
        OrderStatus::Closed,
    ] {
        services
            .orders
            .update_status(order_id, ids::TENANT, ids::ADMIN, &to(status))
            .await
            .unwrap();
    }
}

/// Single-order invoice paid in full with one payment on `account`.
pub fn invoice(order_id: &str, amount: i64, tip: i64, account: &str) -> InvoiceRequest {
    InvoiceRequest {
        orders: vec![InvoiceLine {
            order_id: order_id.to_string(),
            amount: Money::from_cents(amount),
        }],
        discount: Money::zero(),
        tax: Money::zero(),
        tip: Money::from_cents(tip),
        payments: vec![PaymentInput {
            bank_account_id: Some(account.to_string()),
            amount: Money::from_cents(amount),
            reference: None,
            denominations: None,
            payment_split_id: None,
        }],
    }
}
