//! # Cash Shift Repository
//!
//! Cash shifts ("cierres de caja").
//!
//! ## Shift Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert()            closed = 0, every aggregate 0                      │
//! │       │                                                                 │
//! │       │   (payments/invoices stay unlinked while the shift is open)     │
//! │       ▼                                                                 │
//! │  claim_open() / claim()   write lock, re-checks closed = 0              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  seal()              aggregates + difference written, closed = 1        │
//! │                      (WHERE closed = 0: a second seal changes nothing)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The partial unique index `idx_cash_shifts_one_open` enforces at most one
//! open shift per (tenant, cashier) even if two opens race.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use comanda_core::{CashShift, Denominations};

use crate::codec;
use crate::error::{DbError, DbResult};

const SHIFT_COLUMNS: &str = "id, tenant_id, cashier_id, opened_at, closed_at, \
     opening_denominations, opening_balance_cents, closing_denominations, counted_balance_cents, \
     gross_sales_cents, discounts_cents, taxes_cents, tips_cents, net_sales_cents, \
     cash_payments_cents, card_payments_cents, other_payments_cents, total_collected_cents, \
     expenses_cents, extra_income_cents, cash_difference_cents, notes, closed";

fn shift_from_row(row: &SqliteRow) -> DbResult<CashShift> {
    Ok(CashShift {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        cashier_id: row.try_get("cashier_id")?,
        opened_at: codec::ts(row, "opened_at")?,
        closed_at: codec::opt_ts(row, "closed_at")?,
        opening_denominations: codec::json::<Denominations>(row, "opening_denominations")?,
        opening_balance: codec::money(row, "opening_balance_cents")?,
        closing_denominations: codec::opt_json(row, "closing_denominations")?,
        counted_balance: codec::money(row, "counted_balance_cents")?,
        gross_sales: codec::money(row, "gross_sales_cents")?,
        discounts: codec::money(row, "discounts_cents")?,
        taxes: codec::money(row, "taxes_cents")?,
        tips: codec::money(row, "tips_cents")?,
        net_sales: codec::money(row, "net_sales_cents")?,
        cash_payments: codec::money(row, "cash_payments_cents")?,
        card_payments: codec::money(row, "card_payments_cents")?,
        other_payments: codec::money(row, "other_payments_cents")?,
        total_collected: codec::money(row, "total_collected_cents")?,
        expenses: codec::money(row, "expenses_cents")?,
        extra_income: codec::money(row, "extra_income_cents")?,
        cash_difference: codec::money(row, "cash_difference_cents")?,
        notes: row.try_get("notes")?,
        closed: codec::flag(row, "closed")?,
    })
}

pub struct ShiftRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ShiftRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        ShiftRepository { conn }
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<CashShift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM cash_shifts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref().map(shift_from_row).transpose()
    }

    /// The cashier's open shift, if any.
    pub async fn find_open(&mut self, tenant_id: &str, cashier_id: &str) -> DbResult<Option<CashShift>> {
        let sql = format!(
            "SELECT {SHIFT_COLUMNS} FROM cash_shifts \
             WHERE tenant_id = ?1 AND cashier_id = ?2 AND closed = 0"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(cashier_id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref().map(shift_from_row).transpose()
    }

    /// Write lock on the cashier's open shift; `false` if none is open.
    pub async fn claim_open(&mut self, tenant_id: &str, cashier_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE cash_shifts SET closed = closed \
             WHERE tenant_id = ?1 AND cashier_id = ?2 AND closed = 0",
        )
        .bind(tenant_id)
        .bind(cashier_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write lock on a shift by id; `false` if it is unknown or already closed.
    pub async fn claim(&mut self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE cash_shifts SET closed = closed WHERE id = ?1 AND closed = 0")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn insert(&mut self, shift: &CashShift) -> DbResult<()> {
        debug!(id = %shift.id, cashier_id = %shift.cashier_id, "Inserting cash shift");

        let result = sqlx::query(
            r#"
            INSERT INTO cash_shifts (
                id, tenant_id, cashier_id, opened_at, opening_denominations,
                opening_balance_cents, closed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.tenant_id)
        .bind(&shift.cashier_id)
        .bind(codec::encode_ts(shift.opened_at))
        .bind(codec::to_json(&shift.opening_denominations)?)
        .bind(shift.opening_balance.cents())
        .execute(&mut *self.conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match DbError::from(err) {
                DbError::UniqueViolation { field, .. } => {
                    Err(DbError::duplicate(field, shift.cashier_id.clone()))
                }
                other => Err(other),
            },
        }
    }

    /// Persists the closing figures and marks the shift closed.
    pub async fn seal(&mut self, shift: &CashShift) -> DbResult<()> {
        debug!(
            id = %shift.id,
            difference = shift.cash_difference.cents(),
            "Sealing cash shift"
        );

        let result = sqlx::query(
            r#"
            UPDATE cash_shifts SET
                closed_at = ?2,
                closing_denominations = ?3,
                counted_balance_cents = ?4,
                gross_sales_cents = ?5,
                discounts_cents = ?6,
                taxes_cents = ?7,
                tips_cents = ?8,
                net_sales_cents = ?9,
                cash_payments_cents = ?10,
                card_payments_cents = ?11,
                other_payments_cents = ?12,
                total_collected_cents = ?13,
                expenses_cents = ?14,
                extra_income_cents = ?15,
                cash_difference_cents = ?16,
                notes = ?17,
                closed = 1
            WHERE id = ?1 AND closed = 0
            "#,
        )
        .bind(&shift.id)
        .bind(codec::encode_opt_ts(shift.closed_at))
        .bind(codec::to_opt_json(shift.closing_denominations.as_ref())?)
        .bind(shift.counted_balance.cents())
        .bind(shift.gross_sales.cents())
        .bind(shift.discounts.cents())
        .bind(shift.taxes.cents())
        .bind(shift.tips.cents())
        .bind(shift.net_sales.cents())
        .bind(shift.cash_payments.cents())
        .bind(shift.card_payments.cents())
        .bind(shift.other_payments.cents())
        .bind(shift.total_collected.cents())
        .bind(shift.expenses.cents())
        .bind(shift.extra_income.cents())
        .bind(shift.cash_difference.cents())
        .bind(&shift.notes)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CashShift (open)", &shift.id));
        }
        Ok(())
    }

    /// Every open shift across all tenants, oldest first.
    pub async fn list_open(&mut self) -> DbResult<Vec<CashShift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM cash_shifts WHERE closed = 0 ORDER BY opened_at, id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;

        rows.iter().map(shift_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ids};
    use comanda_core::{time, Money};

    fn shift(id: &str, cashier: &str) -> CashShift {
        let denominations: Denominations =
            [("50000".to_string(), serde_json::json!(2))].into_iter().collect();
        CashShift {
            id: id.into(),
            tenant_id: ids::TENANT.into(),
            cashier_id: cashier.into(),
            opened_at: time::now(),
            closed_at: None,
            opening_balance: denominations.balance(),
            opening_denominations: denominations,
            closing_denominations: None,
            counted_balance: Money::zero(),
            gross_sales: Money::zero(),
            discounts: Money::zero(),
            taxes: Money::zero(),
            tips: Money::zero(),
            net_sales: Money::zero(),
            cash_payments: Money::zero(),
            card_payments: Money::zero(),
            other_payments: Money::zero(),
            total_collected: Money::zero(),
            expenses: Money::zero(),
            extra_income: Money::zero(),
            cash_difference: Money::zero(),
            notes: None,
            closed: false,
        }
    }

    #[tokio::test]
    async fn test_one_open_shift_per_cashier() {
        let db = test_support::seeded_database().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = ShiftRepository::new(&mut conn);

        repo.insert(&shift("s1", ids::CASHIER)).await.unwrap();
        let err = repo.insert(&shift("s2", ids::CASHIER)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // A different cashier is independent.
        repo.insert(&shift("s3", ids::CASHIER_2)).await.unwrap();
        assert_eq!(repo.list_open().await.unwrap().len(), 2);

        let open = repo.find_open(ids::TENANT, ids::CASHIER).await.unwrap().unwrap();
        assert_eq!(open.id, "s1");
        assert_eq!(open.opening_balance, Money::from_major(100_000));
    }

    #[tokio::test]
    async fn test_seal_is_single_shot() {
        let db = test_support::seeded_database().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = ShiftRepository::new(&mut conn);

        let mut s = shift("s1", ids::CASHIER);
        repo.insert(&s).await.unwrap();
        assert!(repo.claim("s1").await.unwrap());

        s.closed_at = Some(time::now());
        s.cash_payments = Money::from_cents(11_000);
        s.closed = true;
        repo.seal(&s).await.unwrap();

        let sealed = repo.get("s1").await.unwrap().unwrap();
        assert!(sealed.closed);
        assert_eq!(sealed.cash_payments, Money::from_cents(11_000));
        assert!(!repo.claim("s1").await.unwrap());
        assert!(!repo.claim_open(ids::TENANT, ids::CASHIER).await.unwrap());
        assert!(matches!(repo.seal(&s).await, Err(DbError::NotFound { .. })));

        // Closed shift no longer blocks a new one.
        repo.insert(&shift("s2", ids::CASHIER)).await.unwrap();
    }
}
