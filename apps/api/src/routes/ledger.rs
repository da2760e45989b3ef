use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use comanda_core::{Expense, ExtraIncome};
use comanda_engine::{CashMovement, InvoiceReceipt, InvoiceRequest};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<InvoiceRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceReceipt>)> {
    let receipt = state
        .services
        .ledger
        .create_invoice_and_payment(&user.tenant_id, &user.user_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn record_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Json(movement): Json<CashMovement>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    let expense = state
        .services
        .ledger
        .record_expense(&user.tenant_id, &user.user_id, &movement)
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn record_extra_income(
    State(state): State<AppState>,
    user: AuthUser,
    Json(movement): Json<CashMovement>,
) -> ApiResult<(StatusCode, Json<ExtraIncome>)> {
    let income = state
        .services
        .ledger
        .record_extra_income(&user.tenant_id, &user.user_id, &movement)
        .await?;
    Ok((StatusCode::CREATED, Json(income)))
}
