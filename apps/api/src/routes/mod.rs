//! Route table.
//!
//! ```text
//! GET    /health
//! POST   /pedidos
//! GET    /pedidos/{id}
//! PATCH  /pedidos/{id}
//! PATCH  /pedidos/{id}/status
//! PATCH  /pedidos/{id}/items/{item_id}/status
//! POST   /cierres-caja/apertura
//! POST   /cierres-caja/cierre
//! GET    /cierres-caja/activo
//! POST   /facturas
//! POST   /gastos
//! POST   /ingresos-extra
//! ```

use axum::routing::{get, patch, post};
use axum::Router;

use crate::AppState;

mod health;
mod ledger;
mod orders;
mod shifts;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/pedidos", post(orders::create))
        .route("/pedidos/{id}", get(orders::get).patch(orders::update))
        .route("/pedidos/{id}/status", patch(orders::update_status))
        .route(
            "/pedidos/{id}/items/{item_id}/status",
            patch(orders::update_item_status),
        )
        .route("/cierres-caja/apertura", post(shifts::open))
        .route("/cierres-caja/cierre", post(shifts::close))
        .route("/cierres-caja/activo", get(shifts::active))
        .route("/facturas", post(ledger::create_invoice))
        .route("/gastos", post(ledger::record_expense))
        .route("/ingresos-extra", post(ledger::record_extra_income))
}
