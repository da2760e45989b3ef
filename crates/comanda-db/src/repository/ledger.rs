//! # Ledger Repository
//!
//! Invoices, payments, expenses and extra income.
//!
//! ## Shift Linking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  While a shift is open, its cashier's invoices and payments carry       │
//! │  cash_shift_id = NULL ("pending allocation").                           │
//! │                                                                         │
//! │  Shift window W = [opened_at, closed_at] for cashier C                  │
//! │                                                                         │
//! │  window invoice  : cashier_id = C AND (                                 │
//! │                      cash_shift_id = S                                  │
//! │                      OR cash_shift_id IS NULL AND created_at ∈ W)       │
//! │  window payment  : invoice is a window invoice AND (                    │
//! │                      cash_shift_id = S                                  │
//! │                      OR cash_shift_id IS NULL AND paid_at ∈ W)          │
//! │                                                                         │
//! │  link_window() stamps S on every unlinked row of the window; the same   │
//! │  predicates drive window_invoices() / window_payments(), so what a      │
//! │  close sums is exactly what it links.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expenses and extra income are linked to the open shift when recorded.

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::debug;

use comanda_core::money::Money;
use comanda_core::reconciliation::{bucket_for, LedgerPayment};
use comanda_core::{BankAccount, Expense, ExtraIncome, Invoice, InvoiceOrder, Payment};

use crate::codec;
use crate::error::DbResult;

const INVOICE_COLUMNS: &str = "i.id, i.tenant_id, i.cashier_id, i.subtotal_cents, i.discount_cents, \
     i.tax_cents, i.tip_cents, i.total_cents, i.cash_shift_id, i.created_at";

/// `?1` tenant, `?2` cashier, `?3`/`?4` window bounds, `?5` shift id.
const WINDOW_INVOICE: &str = "i.tenant_id = ?1 AND i.cashier_id = ?2 \
     AND (i.cash_shift_id = ?5 \
          OR (i.cash_shift_id IS NULL AND i.created_at >= ?3 AND i.created_at <= ?4))";

const WINDOW_PAYMENT: &str = "(p.cash_shift_id = ?5 \
     OR (p.cash_shift_id IS NULL AND p.paid_at >= ?3 AND p.paid_at <= ?4))";

fn invoice_from_row(row: &SqliteRow) -> DbResult<Invoice> {
    Ok(Invoice {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        cashier_id: row.try_get("cashier_id")?,
        subtotal: codec::money(row, "subtotal_cents")?,
        discount: codec::money(row, "discount_cents")?,
        tax: codec::money(row, "tax_cents")?,
        tip: codec::money(row, "tip_cents")?,
        total: codec::money(row, "total_cents")?,
        cash_shift_id: row.try_get("cash_shift_id")?,
        created_at: codec::ts(row, "created_at")?,
    })
}

fn ledger_payment_from_row(row: &SqliteRow) -> DbResult<LedgerPayment> {
    let method_name: Option<String> = row.try_get("method_name")?;
    let is_cash: Option<i64> = row.try_get("is_cash")?;
    let method = method_name
        .as_deref()
        .map(|name| (name, is_cash.unwrap_or(0) != 0));

    Ok(LedgerPayment {
        invoice_id: row.try_get("invoice_id")?,
        base: codec::money(row, "amount_cents")?,
        bucket: bucket_for(method),
    })
}

fn window_query<'q>(sql: &'q str, w: &ShiftWindow<'_>) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(sql)
        .bind(w.tenant_id.to_string())
        .bind(w.cashier_id.to_string())
        .bind(codec::encode_ts(w.from))
        .bind(codec::encode_ts(w.to))
        .bind(w.shift_id.to_string())
}

/// Inclusive shift window `[from, to]` for one cashier.
#[derive(Debug, Clone, Copy)]
pub struct ShiftWindow<'a> {
    pub tenant_id: &'a str,
    pub cashier_id: &'a str,
    pub shift_id: &'a str,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub struct LedgerRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LedgerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LedgerRepository { conn }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn find_bank_account(&mut self, id: &str, tenant_id: &str) -> DbResult<Option<BankAccount>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, payment_method_id FROM bank_accounts \
             WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(|row| {
            Ok(BankAccount {
                id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                name: row.try_get("name")?,
                payment_method_id: row.try_get("payment_method_id")?,
            })
        })
        .transpose()
    }

    pub async fn insert_invoice(&mut self, invoice: &Invoice) -> DbResult<()> {
        debug!(id = %invoice.id, total = invoice.total.cents(), "Inserting invoice");

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, tenant_id, cashier_id, subtotal_cents, discount_cents, tax_cents,
                tip_cents, total_cents, cash_shift_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.tenant_id)
        .bind(&invoice.cashier_id)
        .bind(invoice.subtotal.cents())
        .bind(invoice.discount.cents())
        .bind(invoice.tax.cents())
        .bind(invoice.tip.cents())
        .bind(invoice.total.cents())
        .bind(&invoice.cash_shift_id)
        .bind(codec::encode_ts(invoice.created_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_invoice_order(&mut self, link: &InvoiceOrder) -> DbResult<()> {
        sqlx::query("INSERT INTO invoice_orders (invoice_id, order_id, applied_cents) VALUES (?1, ?2, ?3)")
            .bind(&link.invoice_id)
            .bind(&link.order_id)
            .bind(link.applied.cents())
            .execute(&mut *self.conn)
            .await?;

        Ok(())
    }

    pub async fn insert_payment(&mut self, payment: &Payment) -> DbResult<()> {
        debug!(id = %payment.id, invoice_id = %payment.invoice_id, amount = payment.amount.cents(), "Recording payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, tenant_id, invoice_id, bank_account_id, amount_cents, reference,
                denominations, paid_at, cash_shift_id, payment_split_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.tenant_id)
        .bind(&payment.invoice_id)
        .bind(&payment.bank_account_id)
        .bind(payment.amount.cents())
        .bind(&payment.reference)
        .bind(codec::to_opt_json(payment.denominations.as_ref())?)
        .bind(codec::encode_ts(payment.paid_at))
        .bind(&payment.cash_shift_id)
        .bind(&payment.payment_split_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Sum applied to an order across all invoices.
    pub async fn applied_total_for_order(&mut self, order_id: &str) -> DbResult<Money> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT SUM(applied_cents) FROM invoice_orders WHERE order_id = ?1")
                .bind(order_id)
                .fetch_one(&mut *self.conn)
                .await?;

        Ok(Money::from_cents(cents.unwrap_or(0)))
    }

    pub async fn insert_expense(&mut self, expense: &Expense) -> DbResult<()> {
        debug!(id = %expense.id, shift = %expense.cash_shift_id, "Recording expense");

        sqlx::query(
            r#"
            INSERT INTO expenses (id, tenant_id, cashier_id, cash_shift_id, amount_cents, concept, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.tenant_id)
        .bind(&expense.cashier_id)
        .bind(&expense.cash_shift_id)
        .bind(expense.amount.cents())
        .bind(&expense.concept)
        .bind(codec::encode_ts(expense.created_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_extra_income(&mut self, income: &ExtraIncome) -> DbResult<()> {
        debug!(id = %income.id, shift = %income.cash_shift_id, "Recording extra income");

        sqlx::query(
            r#"
            INSERT INTO extra_income (id, tenant_id, cashier_id, cash_shift_id, amount_cents, concept, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&income.id)
        .bind(&income.tenant_id)
        .bind(&income.cashier_id)
        .bind(&income.cash_shift_id)
        .bind(income.amount.cents())
        .bind(&income.concept)
        .bind(codec::encode_ts(income.created_at))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Shift window
    // =========================================================================

    pub async fn window_invoices(&mut self, w: &ShiftWindow<'_>) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices i WHERE {WINDOW_INVOICE} ORDER BY i.created_at, i.id"
        );
        let rows = window_query(&sql, w).fetch_all(&mut *self.conn).await?;

        rows.iter().map(invoice_from_row).collect()
    }

    pub async fn window_payments(&mut self, w: &ShiftWindow<'_>) -> DbResult<Vec<LedgerPayment>> {
        let sql = format!(
            "SELECT p.invoice_id, p.amount_cents, pm.name AS method_name, pm.is_cash \
             FROM payments p \
             JOIN invoices i ON i.id = p.invoice_id \
             LEFT JOIN bank_accounts b ON b.id = p.bank_account_id \
             LEFT JOIN payment_methods pm ON pm.id = b.payment_method_id \
             WHERE {WINDOW_INVOICE} AND {WINDOW_PAYMENT} \
             ORDER BY p.paid_at, p.id"
        );
        let rows = window_query(&sql, w).fetch_all(&mut *self.conn).await?;

        rows.iter().map(ledger_payment_from_row).collect()
    }

    /// Stamps the shift on every unlinked invoice and payment of the window.
    /// Returns `(invoices, payments)` linked.
    pub async fn link_window(&mut self, w: &ShiftWindow<'_>) -> DbResult<(u64, u64)> {
        // Payments first: their predicate reads the invoices' link state.
        let payments_sql = format!(
            "UPDATE payments SET cash_shift_id = ?5 \
             WHERE id IN (SELECT p.id FROM payments p \
                          JOIN invoices i ON i.id = p.invoice_id \
                          WHERE p.cash_shift_id IS NULL AND {WINDOW_INVOICE} AND {WINDOW_PAYMENT})"
        );
        let payments = window_query(&payments_sql, w)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();

        let invoices_sql = format!(
            "UPDATE invoices SET cash_shift_id = ?5 \
             WHERE id IN (SELECT i.id FROM invoices i \
                          WHERE i.cash_shift_id IS NULL AND {WINDOW_INVOICE})"
        );
        let invoices = window_query(&invoices_sql, w)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();

        debug!(shift_id = w.shift_id, invoices, payments, "Linked window to shift");
        Ok((invoices, payments))
    }

    // =========================================================================
    // Linked to a shift
    // =========================================================================

    pub async fn shift_invoices(&mut self, shift_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.cash_shift_id = ?1 ORDER BY i.created_at, i.id"
        );
        let rows = sqlx::query(&sql)
            .bind(shift_id)
            .fetch_all(&mut *self.conn)
            .await?;

        rows.iter().map(invoice_from_row).collect()
    }

    pub async fn shift_payments(&mut self, shift_id: &str) -> DbResult<Vec<LedgerPayment>> {
        let rows = sqlx::query(
            r#"
            SELECT p.invoice_id, p.amount_cents, pm.name AS method_name, pm.is_cash
            FROM payments p
            LEFT JOIN bank_accounts b ON b.id = p.bank_account_id
            LEFT JOIN payment_methods pm ON pm.id = b.payment_method_id
            WHERE p.cash_shift_id = ?1
            ORDER BY p.paid_at, p.id
            "#,
        )
        .bind(shift_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(ledger_payment_from_row).collect()
    }

    pub async fn sum_expenses_for_shift(&mut self, shift_id: &str) -> DbResult<Money> {
        self.sum_for_shift("expenses", shift_id).await
    }

    pub async fn sum_extra_income_for_shift(&mut self, shift_id: &str) -> DbResult<Money> {
        self.sum_for_shift("extra_income", shift_id).await
    }

    async fn sum_for_shift(&mut self, table: &str, shift_id: &str) -> DbResult<Money> {
        let sql = format!("SELECT SUM(amount_cents) FROM {table} WHERE cash_shift_id = ?1");
        let cents: Option<i64> = sqlx::query_scalar(&sql)
            .bind(shift_id)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(Money::from_cents(cents.unwrap_or(0)))
    }
}
