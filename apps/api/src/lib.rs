//! # Comanda API
//!
//! REST surface over the Comanda engines.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Request Pipeline                               │
//! │                                                                         │
//! │  HTTP ──► TraceLayer ──► AuthUser (Bearer JWT) ──► handler             │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │                              Services { orders, shifts, ledger, .. }    │
//! │                                                      │                  │
//! │                 Ok ──► JSON body         Err ──► ApiError              │
//! │                                                  { code, message }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `HTTP_PORT` - listen port (default 8080)
//! - `DATABASE_PATH` - SQLite file (default `comanda.db`)
//! - `JWT_SECRET` - HS256 secret
//! - `DB_MAX_CONNECTIONS` - pool size (default 5)
//! - `COMANDA_CONFIG` - engine TOML file
//! - `RUST_LOG` - log filter (default `info,comanda=debug`)

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use comanda_engine::Services;

pub mod auth;
pub mod config;
pub mod error;
mod routes;

use crate::auth::JwtManager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub jwt: Arc<JwtManager>,
}

pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::Duration;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use comanda_core::Role;
    use comanda_db::test_support::{ids, seeded_database};
    use comanda_engine::EngineConfig;

    async fn test_app() -> (Router, Arc<JwtManager>) {
        let db = seeded_database().await;
        let jwt = Arc::new(JwtManager::new("test-secret"));
        let state = AppState {
            services: Services::new(db, &EngineConfig::default()),
            jwt: jwt.clone(),
        };
        (app(state), jwt)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(request(Method::GET, "/cierres-caja/activo", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "no_autenticado");
    }

    #[tokio::test]
    async fn test_create_and_fetch_order() {
        let (app, jwt) = test_app().await;
        let token = jwt
            .issue(ids::WAITER, Role::Waiter, ids::TENANT, Duration::minutes(5))
            .unwrap();

        let body = json!({
            "tipo_pedido": "MESA",
            "mesa_id": ids::TABLE_1,
            "pedidoItems": [{ "producto_id": ids::BURGER, "cantidad": 2 }]
        });
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/pedidos", Some(&token), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["estimated_total"], 2000);
        assert_eq!(created["status"], "ABIERTO");

        let uri = format!("/pedidos/{}", created["id"].as_str().unwrap());
        let response = app
            .oneshot(request(Method::GET, &uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["items"][0]["quantity"], 2);
    }

    #[tokio::test]
    async fn test_domain_errors_carry_code() {
        let (app, jwt) = test_app().await;
        let cashier = jwt
            .issue(ids::CASHIER, Role::Cashier, ids::TENANT, Duration::minutes(5))
            .unwrap();

        let body = json!({
            "tipo_pedido": "DOMICILIO",
            "cliente_nombre": "Rosa",
            "cliente_direccion": "Calle 10 #4-20",
            "pedidoItems": [{ "producto_id": ids::LEMONADE, "cantidad": 1 }]
        });
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/pedidos", Some(&cashier), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = json_body(response).await;
        assert_eq!(error["code"], "campo_obligatorio");
        assert_eq!(error["message"], "el teléfono del cliente es obligatorio");

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/cierres-caja/cierre", Some(&cashier), Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let cook = jwt
            .issue(ids::COOK, Role::Cook, ids::TENANT, Duration::minutes(5))
            .unwrap();
        let response = app
            .oneshot(request(Method::POST, "/cierres-caja/apertura", Some(&cook), Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_shift_open_and_active() {
        let (app, jwt) = test_app().await;
        let token = jwt
            .issue(ids::CASHIER, Role::Cashier, ids::TENANT, Duration::minutes(5))
            .unwrap();

        let open = json!({ "denominaciones_apertura": { "50": 2, "10": 5 } });
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/cierres-caja/apertura", Some(&token), Some(open.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["opening_balance"], 15_000);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/cierres-caja/apertura", Some(&token), Some(open)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["code"], "cierre_abierto_existente");

        let response = app
            .oneshot(request(Method::GET, "/cierres-caja/activo", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["expected_balance"], 15_000);
    }
}
