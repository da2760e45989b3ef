//! Identity/role reference and per-tenant business settings.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use comanda_core::{Role, TenantSettings, User};

use crate::codec;
use crate::error::DbResult;

fn user_from_row(row: &SqliteRow) -> DbResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        active: codec::flag(row, "active")?,
    })
}

pub struct IdentityRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> IdentityRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        IdentityRepository { conn }
    }

    /// Role of an active user of the tenant.
    pub async fn role_of(&mut self, user_id: &str, tenant_id: &str) -> DbResult<Option<Role>> {
        let role = sqlx::query_scalar(
            "SELECT role FROM users WHERE id = ?1 AND tenant_id = ?2 AND active = 1",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(role)
    }

    pub async fn find_user(&mut self, user_id: &str, tenant_id: &str) -> DbResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, role, active FROM users WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Minute limits for the tenant; `None` means no limits at all.
    pub async fn settings(&mut self, tenant_id: &str) -> DbResult<Option<TenantSettings>> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, edit_limit_minutes, cancel_prep_limit_minutes,
                   cancel_sent_limit_minutes
            FROM tenant_settings WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(|row| {
            Ok(TenantSettings {
                tenant_id: row.try_get("tenant_id")?,
                edit_limit_minutes: row.try_get("edit_limit_minutes")?,
                cancel_prep_limit_minutes: row.try_get("cancel_prep_limit_minutes")?,
                cancel_sent_limit_minutes: row.try_get("cancel_sent_limit_minutes")?,
            })
        })
        .transpose()
    }

    /// Write lock on the tenant row. Serializes per-tenant sequences (daily
    /// order numbers); `false` if the tenant does not exist.
    pub async fn claim_tenant(&mut self, tenant_id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE tenants SET name = name WHERE id = ?1")
            .bind(tenant_id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ids};

    #[tokio::test]
    async fn test_role_of_active_users_only() {
        let db = test_support::seeded_database().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = IdentityRepository::new(&mut conn);

        assert_eq!(repo.role_of(ids::WAITER, ids::TENANT).await.unwrap(), Some(Role::Waiter));
        assert_eq!(repo.role_of(ids::DRIVER, ids::TENANT).await.unwrap(), Some(Role::DeliveryDriver));
        assert_eq!(repo.role_of(ids::WAITER, ids::OTHER_TENANT).await.unwrap(), None);
        assert_eq!(repo.role_of(ids::INACTIVE, ids::TENANT).await.unwrap(), None);

        let inactive = repo.find_user(ids::INACTIVE, ids::TENANT).await.unwrap().unwrap();
        assert!(!inactive.active);
    }

    #[tokio::test]
    async fn test_settings_and_tenant_claim() {
        let db = test_support::seeded_database().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = IdentityRepository::new(&mut conn);

        let settings = repo.settings(ids::TENANT).await.unwrap().unwrap();
        assert_eq!(settings.cancel_prep_limit_minutes, Some(10));
        assert!(repo.settings(ids::OTHER_TENANT).await.unwrap().is_none());

        assert!(repo.claim_tenant(ids::TENANT).await.unwrap());
        assert!(!repo.claim_tenant("missing").await.unwrap());
    }
}
