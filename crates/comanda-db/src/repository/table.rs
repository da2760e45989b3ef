//! Table registry: occupancy flag per dining table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use comanda_core::{DiningTable, TableState};

use crate::error::DbResult;

fn table_from_row(row: &SqliteRow) -> DbResult<DiningTable> {
    Ok(DiningTable {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        label: row.try_get("label")?,
        state: row.try_get("state")?,
    })
}

pub struct TableRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TableRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        TableRepository { conn }
    }

    /// Write lock on the table row; `false` if unknown for the tenant.
    pub async fn claim(&mut self, id: &str, tenant_id: &str) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE dining_tables SET state = state WHERE id = ?1 AND tenant_id = ?2")
                .bind(id)
                .bind(tenant_id)
                .execute(&mut *self.conn)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&mut self, id: &str, tenant_id: &str) -> DbResult<Option<DiningTable>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, label, state FROM dining_tables WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(table_from_row).transpose()
    }

    /// Sets the occupancy flag and returns the updated row.
    pub async fn set_state(
        &mut self,
        id: &str,
        tenant_id: &str,
        state: TableState,
    ) -> DbResult<Option<DiningTable>> {
        debug!(id, state = state.as_str(), "Setting table state");

        let row = sqlx::query(
            r#"
            UPDATE dining_tables SET state = ?3
            WHERE id = ?1 AND tenant_id = ?2
            RETURNING id, tenant_id, label, state
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(state)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(table_from_row).transpose()
    }
}
