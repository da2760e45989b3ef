use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use comanda_core::OrderDetail;
use comanda_engine::{ItemStatusChange, NewOrder, OrderPatch, StatusChange};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::AppState;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(cmd): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    let detail = state
        .services
        .orders
        .create(&user.tenant_id, &user.user_id, &cmd)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .services
        .orders
        .get(&id, &user.tenant_id, &user.user_id)
        .await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .services
        .orders
        .update(&id, &user.tenant_id, &user.user_id, &patch)
        .await?;
    Ok(Json(detail))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .services
        .orders
        .update_status(&id, &user.tenant_id, &user.user_id, &change)
        .await?;
    Ok(Json(detail))
}

pub async fn update_item_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(String, String)>,
    Json(change): Json<ItemStatusChange>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .services
        .orders
        .update_item_status(&id, &item_id, &user.tenant_id, &user.user_id, change.status)
        .await?;
    Ok(Json(detail))
}
