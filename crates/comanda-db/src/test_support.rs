//! Seeded in-memory fixture shared by this crate's tests and by
//! `comanda-engine` (feature `test-support`).
//!
//! ```text
//! TENANT ("La Esquina")                      OTHER_TENANT ("El Otro")
//!   settings: edit 15 / prep 10 / sent 5       no settings row (no limits)
//!   users: ADMIN, SUPERVISOR, CASHIER,         users: OTHER_ADMIN
//!          CASHIER_2, WAITER, COOK, DRIVER,
//!          INACTIVE (waiter, active = 0)
//!   tables: TABLE_1..3 (LIBRE)
//!   menu:  BURGER     $10.00  food      recipe: BREAD 1.0, BEEF 0.2
//!          LEMONADE   $5.00   beverage
//!          INACTIVE_PRODUCT   food, active = 0
//!          BOWL       $12.00  configurable
//!   ledger: CASH_ACCOUNT (EFECTIVO, cash)
//!           CARD_ACCOUNT (TARJETA CRÉDITO)
//!           TRANSFER_ACCOUNT (TRANSFERENCIA)
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use comanda_core::time;

use crate::codec;
use crate::pool::{Database, DbConfig};

pub mod ids {
    pub const TENANT: &str = "t-esquina";
    pub const OTHER_TENANT: &str = "t-otro";

    pub const ADMIN: &str = "u-admin";
    pub const SUPERVISOR: &str = "u-supervisor";
    pub const CASHIER: &str = "u-cajero";
    pub const CASHIER_2: &str = "u-cajero-2";
    pub const WAITER: &str = "u-mesero";
    pub const COOK: &str = "u-cocinero";
    pub const DRIVER: &str = "u-domiciliario";
    pub const INACTIVE: &str = "u-inactivo";
    pub const OTHER_ADMIN: &str = "u-otro-admin";

    pub const TABLE_1: &str = "m-1";
    pub const TABLE_2: &str = "m-2";
    pub const TABLE_3: &str = "m-3";

    pub const BURGER: &str = "p-hamburguesa";
    pub const LEMONADE: &str = "p-limonada";
    pub const INACTIVE_PRODUCT: &str = "p-descontinuado";
    pub const BOWL: &str = "pc-bowl";

    pub const BREAD: &str = "ing-pan";
    pub const BEEF: &str = "ing-carne";

    pub const CASH_ACCOUNT: &str = "cb-caja";
    pub const CARD_ACCOUNT: &str = "cb-datafono";
    pub const TRANSFER_ACCOUNT: &str = "cb-banco";
}

pub const BREAD_STOCK: f64 = 10.0;
pub const BEEF_STOCK: f64 = 1.0;

const SEED_SQL: &str = r#"
INSERT INTO tenants (id, name, created_at) VALUES
    ('t-esquina', 'La Esquina', '2026-01-01 00:00:00.000000-05:00'),
    ('t-otro',    'El Otro',    '2026-01-01 00:00:00.000000-05:00');

INSERT INTO tenant_settings (tenant_id, edit_limit_minutes, cancel_prep_limit_minutes,
                             cancel_sent_limit_minutes)
VALUES ('t-esquina', 15, 10, 5);

INSERT INTO users (id, tenant_id, name, role, active) VALUES
    ('u-admin',        't-esquina', 'Ana',     'ADMIN',        1),
    ('u-supervisor',   't-esquina', 'Sergio',  'SUPERVISOR',   1),
    ('u-cajero',       't-esquina', 'Carla',   'CAJERO',       1),
    ('u-cajero-2',     't-esquina', 'Camilo',  'CAJERO',       1),
    ('u-mesero',       't-esquina', 'Mateo',   'MESERO',       1),
    ('u-cocinero',     't-esquina', 'Lucía',   'COCINERO',     1),
    ('u-domiciliario', 't-esquina', 'Diego',   'DOMICILIARIO', 1),
    ('u-inactivo',     't-esquina', 'Ismael',  'MESERO',       0),
    ('u-otro-admin',   't-otro',    'Olga',    'ADMIN',        1);

INSERT INTO dining_tables (id, tenant_id, label, state) VALUES
    ('m-1', 't-esquina', 'Mesa 1', 'LIBRE'),
    ('m-2', 't-esquina', 'Mesa 2', 'LIBRE'),
    ('m-3', 't-esquina', 'Mesa 3', 'LIBRE');

INSERT INTO categories (id, tenant_id, name, is_beverage) VALUES
    ('c-comida',  't-esquina', 'Comida',  0),
    ('c-bebidas', 't-esquina', 'Bebidas', 1);

INSERT INTO products (id, tenant_id, category_id, name, price_cents, active) VALUES
    ('p-hamburguesa',   't-esquina', 'c-comida',  'Hamburguesa',  1000, 1),
    ('p-limonada',      't-esquina', 'c-bebidas', 'Limonada',      500, 1),
    ('p-descontinuado', 't-esquina', 'c-comida',  'Descontinuado', 800, 0);

INSERT INTO configurable_products (id, tenant_id, name, base_price_cents, active) VALUES
    ('pc-bowl', 't-esquina', 'Bowl', 1200, 1);

INSERT INTO ingredients (id, tenant_id, name, unit, stock) VALUES
    ('ing-pan',   't-esquina', 'Pan',   'unidad', 10.0),
    ('ing-carne', 't-esquina', 'Carne', 'kg',      1.0);

INSERT INTO recipe_lines (product_id, ingredient_id, quantity) VALUES
    ('p-hamburguesa', 'ing-pan',   1.0),
    ('p-hamburguesa', 'ing-carne', 0.2);

INSERT INTO payment_methods (id, tenant_id, name, is_cash) VALUES
    ('mp-efectivo',      't-esquina', 'EFECTIVO',        1),
    ('mp-tarjeta',       't-esquina', 'TARJETA CRÉDITO', 0),
    ('mp-transferencia', 't-esquina', 'TRANSFERENCIA',   0);

INSERT INTO bank_accounts (id, tenant_id, name, payment_method_id) VALUES
    ('cb-caja',     't-esquina', 'Caja principal', 'mp-efectivo'),
    ('cb-datafono', 't-esquina', 'Datáfono',       'mp-tarjeta'),
    ('cb-banco',    't-esquina', 'Cuenta banco',   'mp-transferencia');
"#;

/// Fresh in-memory database, migrated and seeded.
pub async fn seeded_database() -> Database {
    seeded_database_with(DbConfig::in_memory()).await
}

/// Migrated and seeded database for an arbitrary configuration (file-backed
/// databases for lock-contention tests).
pub async fn seeded_database_with(config: DbConfig) -> Database {
    let db = Database::new(config).await.expect("test database");
    sqlx::raw_sql(SEED_SQL)
        .execute(db.pool())
        .await
        .expect("seed fixture");
    db
}

/// Replaces the tenant's minute limits.
pub async fn set_settings(
    db: &Database,
    tenant_id: &str,
    edit: Option<i64>,
    cancel_prep: Option<i64>,
    cancel_sent: Option<i64>,
) {
    sqlx::query(
        r#"
        INSERT INTO tenant_settings (tenant_id, edit_limit_minutes, cancel_prep_limit_minutes,
                                     cancel_sent_limit_minutes)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (tenant_id) DO UPDATE SET
            edit_limit_minutes = excluded.edit_limit_minutes,
            cancel_prep_limit_minutes = excluded.cancel_prep_limit_minutes,
            cancel_sent_limit_minutes = excluded.cancel_sent_limit_minutes
        "#,
    )
    .bind(tenant_id)
    .bind(edit)
    .bind(cancel_prep)
    .bind(cancel_sent)
    .execute(db.pool())
    .await
    .expect("set tenant settings");
}

/// Moves the order's kitchen anchor `minutes` into the past.
pub async fn backdate_kitchen_update(db: &Database, order_id: &str, minutes: i64) {
    let at = time::now() - Duration::minutes(minutes);
    sqlx::query("UPDATE orders SET kitchen_updated_at = ?2 WHERE id = ?1")
        .bind(order_id)
        .bind(codec::encode_ts(at))
        .execute(db.pool())
        .await
        .expect("backdate order");
}

/// Moves an open shift's start `minutes` into the past.
pub async fn backdate_shift(db: &Database, shift_id: &str, minutes: i64) {
    let at = time::now() - Duration::minutes(minutes);
    sqlx::query("UPDATE cash_shifts SET opened_at = ?2 WHERE id = ?1")
        .bind(shift_id)
        .bind(codec::encode_ts(at))
        .execute(db.pool())
        .await
        .expect("backdate shift");
}

/// Inserts an empty open shift for the cashier and returns its id.
pub async fn insert_open_shift(
    conn: &mut SqliteConnection,
    cashier_id: &str,
    opened_at: DateTime<Utc>,
) -> String {
    let id = codec::new_id();
    sqlx::query(
        "INSERT INTO cash_shifts (id, tenant_id, cashier_id, opened_at, closed) \
         VALUES (?1, ?2, ?3, ?4, 0)",
    )
    .bind(&id)
    .bind(ids::TENANT)
    .bind(cashier_id)
    .bind(codec::encode_ts(opened_at))
    .execute(&mut *conn)
    .await
    .expect("insert open shift");
    id
}
