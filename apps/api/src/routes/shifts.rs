use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use comanda_core::CashShift;
use comanda_engine::{ActiveShift, CloseShift, OpenShift};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    #[serde(rename = "usuarioCajeroId")]
    cashier_id: Option<String>,
}

pub async fn open(
    State(state): State<AppState>,
    user: AuthUser,
    Json(cmd): Json<OpenShift>,
) -> ApiResult<(StatusCode, Json<CashShift>)> {
    let shift = state
        .services
        .shifts
        .open(&user.tenant_id, &user.user_id, &cmd)
        .await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

pub async fn close(
    State(state): State<AppState>,
    user: AuthUser,
    Json(cmd): Json<CloseShift>,
) -> ApiResult<Json<CashShift>> {
    let shift = state
        .services
        .shifts
        .close(&user.tenant_id, &user.user_id, &cmd)
        .await?;
    Ok(Json(shift))
}

pub async fn active(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ActiveQuery>,
) -> ApiResult<Json<ActiveShift>> {
    let active = state
        .services
        .shifts
        .active(&user.tenant_id, &user.user_id, query.cashier_id.as_deref())
        .await?;
    Ok(Json(active))
}
