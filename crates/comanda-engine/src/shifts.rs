//! # Cash Shift Engine
//!
//! Opening and closing of cashier shifts ("cierres de caja").
//!
//! ## Close Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 explicit close            automatic close (sweep)       │
//! │                 ──────────────            ───────────────────────       │
//! │  lock           claim_open(cashier)       claim(shift id)               │
//! │  orders         untouched                 force-cancel unresolved ones  │
//! │                                           of the cashier in the window  │
//! │  link           invoices + payments of the window → shift               │
//! │  totals         recomputed from the linked rows (both paths)            │
//! │  counted        Σ closing denominations   0 (no drawer count)           │
//! │  difference     counted − expected        0                             │
//! │  seal           closed = 1, closed_at = now                             │
//! │  outbox         cierre_caja.estado (+ pedido.estado, mesa.estado)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! expected = opening + cash payments + extra income − expenses
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use comanda_core::reconciliation::{cash_difference, ShiftSummary};
use comanda_core::{time, validation, AUTO_CANCEL_NOTE};
use comanda_core::{
    CashShift, CoreError, Denominations, Money, Notification, OrderStatus, Role,
};
use comanda_db::{new_id, Database, DbError, LedgerRepository, ShiftRepository, ShiftWindow, UnitOfWork};

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::ledger::{claim_open_shift, window_summary, CASH_ROLES};
use crate::orders::release_table_if_idle;

// =============================================================================
// Commands
// =============================================================================

/// `POST /cierres-caja/apertura` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenShift {
    #[serde(rename = "denominaciones_apertura", default)]
    #[ts(type = "Record<string, number>")]
    pub opening_denominations: Denominations,

    /// Another cashier's id (ADMIN/SUPERVISOR only).
    #[serde(rename = "usuarioCajeroId", default)]
    pub cashier_id: Option<String>,
}

/// `POST /cierres-caja/cierre` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseShift {
    #[serde(rename = "denominaciones_cierre", default)]
    #[ts(type = "Record<string, number>")]
    pub closing_denominations: Denominations,

    #[serde(rename = "observaciones", default)]
    pub notes: Option<String>,

    #[serde(rename = "usuarioCajeroId", default)]
    pub cashier_id: Option<String>,
}

/// The open shift with its live totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActiveShift {
    pub shift: CashShift,
    pub summary: ShiftSummary,
    pub expected_balance: Money,
}

/// Fresh open shift, every aggregate zero.
fn opened_shift(tenant_id: &str, cashier_id: &str, denominations: &Denominations) -> CashShift {
    CashShift {
        id: new_id(),
        tenant_id: tenant_id.to_string(),
        cashier_id: cashier_id.to_string(),
        opened_at: time::now(),
        closed_at: None,
        opening_balance: denominations.balance(),
        opening_denominations: denominations.clone(),
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

fn already_open() -> CoreError {
    CoreError::conflict(
        "cierre_abierto_existente",
        "el cajero ya tiene un cierre de caja abierto",
    )
}

/// Links the shift's window and writes the recomputed totals onto it.
async fn settle(
    uow: &mut UnitOfWork,
    shift: &mut CashShift,
    now: DateTime<Utc>,
) -> EngineResult<ShiftSummary> {
    {
        let window = ShiftWindow {
            tenant_id: &shift.tenant_id,
            cashier_id: &shift.cashier_id,
            shift_id: &shift.id,
            from: shift.opened_at,
            to: now,
        };
        uow.ledger().link_window(&window).await?;
    }

    let invoices = uow.ledger().shift_invoices(&shift.id).await?;
    let payments = uow.ledger().shift_payments(&shift.id).await?;
    let expenses = uow.ledger().sum_expenses_for_shift(&shift.id).await?;
    let extra_income = uow.ledger().sum_extra_income_for_shift(&shift.id).await?;

    let summary = ShiftSummary::compute(&invoices, &payments, expenses, extra_income);
    summary.apply_to(shift);
    shift.closed_at = Some(now);
    Ok(summary)
}

// =============================================================================
// Cash Shift Engine
// =============================================================================

#[derive(Clone)]
pub struct CashShiftEngine {
    ctx: EngineContext,
}

impl CashShiftEngine {
    pub fn new(ctx: EngineContext) -> Self {
        CashShiftEngine { ctx }
    }

    pub(crate) fn db(&self) -> &Database {
        self.ctx.db()
    }

    /// Whose shift the acting user may touch.
    ///
    /// A CAJERO only their own; ADMIN/SUPERVISOR may name any active user
    /// of the tenant.
    async fn target_cashier(
        &self,
        tenant_id: &str,
        acting_user: &str,
        requested: Option<&str>,
        action: &str,
    ) -> EngineResult<String> {
        let role = self.ctx.role_of(acting_user, tenant_id).await?;
        if !CASH_ROLES.contains(&role) {
            return Err(CoreError::permission(role, action).into());
        }

        match requested {
            None => Ok(acting_user.to_string()),
            Some(cashier) if cashier == acting_user => Ok(cashier.to_string()),
            Some(_) if role == Role::Cashier => Err(CoreError::permission(
                role,
                format!("{action} de otro cajero"),
            )
            .into()),
            Some(cashier) => {
                self.ctx.role_of(cashier, tenant_id).await?;
                Ok(cashier.to_string())
            }
        }
    }

    // =========================================================================
    // Open
    // =========================================================================

    pub async fn open(
        &self,
        tenant_id: &str,
        acting_user: &str,
        cmd: &OpenShift,
    ) -> EngineResult<CashShift> {
        let cashier = self
            .target_cashier(tenant_id, acting_user, cmd.cashier_id.as_deref(), "abrir caja")
            .await?;
        let cashier = cashier.as_str();

        let shift = self
            .ctx
            .transact("cierre_caja.abrir", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = Self::open_in(&mut uow, tenant_id, cashier, cmd).await;
                uow.finish(result).await
            })
            .await?;

        info!(
            shift_id = %shift.id,
            cashier_id = %shift.cashier_id,
            opening_balance = shift.opening_balance.cents(),
            "Cash shift opened"
        );
        Ok(shift)
    }

    async fn open_in(
        uow: &mut UnitOfWork,
        tenant_id: &str,
        cashier_id: &str,
        cmd: &OpenShift,
    ) -> EngineResult<CashShift> {
        if uow.shifts().claim_open(tenant_id, cashier_id).await? {
            return Err(already_open().into());
        }

        let shift = opened_shift(tenant_id, cashier_id, &cmd.opening_denominations);
        match uow.shifts().insert(&shift).await {
            Ok(()) => {}
            // Lost a race with a concurrent open.
            Err(DbError::UniqueViolation { .. }) => return Err(already_open().into()),
            Err(err) => return Err(err.into()),
        }

        uow.record(Notification::shift_opened(&shift));
        Ok(shift)
    }

    // =========================================================================
    // Explicit close
    // =========================================================================

    pub async fn close(
        &self,
        tenant_id: &str,
        acting_user: &str,
        cmd: &CloseShift,
    ) -> EngineResult<CashShift> {
        let cashier = self
            .target_cashier(tenant_id, acting_user, cmd.cashier_id.as_deref(), "cerrar caja")
            .await?;
        let cashier = cashier.as_str();
        validation::validate_optional_text("observaciones", cmd.notes.as_deref())?;

        let shift = self
            .ctx
            .transact("cierre_caja.cerrar", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = Self::close_in(&mut uow, tenant_id, cashier, cmd).await;
                uow.finish(result).await
            })
            .await?;

        info!(
            shift_id = %shift.id,
            counted = shift.counted_balance.cents(),
            cash = shift.cash_payments.cents(),
            difference = shift.cash_difference.cents(),
            "Cash shift closed"
        );
        Ok(shift)
    }

    async fn close_in(
        uow: &mut UnitOfWork,
        tenant_id: &str,
        cashier_id: &str,
        cmd: &CloseShift,
    ) -> EngineResult<CashShift> {
        let mut shift = claim_open_shift(uow, tenant_id, cashier_id).await?;
        let now = time::now();
        let summary = settle(uow, &mut shift, now).await?;

        shift.closing_denominations = Some(cmd.closing_denominations.clone());
        shift.counted_balance = cmd.closing_denominations.balance();
        shift.cash_difference = cash_difference(
            shift.counted_balance,
            summary.expected_balance(shift.opening_balance),
        );
        shift.notes = cmd.notes.clone();
        shift.closed = true;

        uow.shifts().seal(&shift).await?;
        uow.record(Notification::shift_status(&shift));
        Ok(shift)
    }

    // =========================================================================
    // Automatic close
    // =========================================================================

    /// Automatic close of the cashier's open shift.
    pub async fn close_automatically(&self, tenant_id: &str, cashier_id: &str) -> EngineResult<CashShift> {
        self.ctx
            .transact("cierre_caja.cierre_automatico", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result: EngineResult<CashShift> = async {
                    let shift = claim_open_shift(&mut uow, tenant_id, cashier_id).await?;
                    Self::auto_close_in(&mut uow, shift).await
                }
                .await;
                uow.finish(result).await
            })
            .await
    }

    /// Automatic close of one shift by id, as the sweep runs it.
    pub async fn close_automatically_by_id(&self, shift_id: &str) -> EngineResult<CashShift> {
        self.ctx
            .transact("cierre_caja.cierre_automatico", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result: EngineResult<CashShift> = async {
                    if !uow.shifts().claim(shift_id).await? {
                        return Err(CoreError::not_found("cierre de caja abierto", shift_id).into());
                    }
                    let shift = uow
                        .shifts()
                        .get(shift_id)
                        .await?
                        .ok_or_else(|| CoreError::not_found("cierre de caja", shift_id))?;
                    Self::auto_close_in(&mut uow, shift).await
                }
                .await;
                uow.finish(result).await
            })
            .await
    }

    async fn auto_close_in(uow: &mut UnitOfWork, mut shift: CashShift) -> EngineResult<CashShift> {
        let now = time::now();

        let stale = uow
            .orders()
            .unresolved_for_cashier(&shift.tenant_id, &shift.cashier_id, shift.opened_at, now)
            .await?;
        for mut order in stale {
            let previous = order.status;
            uow.orders().cancel_all_items(&order.id, now).await?;
            order.status = OrderStatus::Cancelled;
            order.cancelled_at = Some(now);
            order.cancel_reason = Some(AUTO_CANCEL_NOTE.to_string());
            order.cash_shift_id = Some(shift.id.clone());
            order.updated_at = now;
            uow.orders().update_header(&order).await?;
            uow.record(Notification::order_status(&order, previous));

            if let Some(table_id) = order.table_id.clone() {
                release_table_if_idle(uow, &shift.tenant_id, &table_id, &order.id).await?;
            }
            debug!(order_id = %order.id, shift_id = %shift.id, "Order force-cancelled");
        }

        settle(uow, &mut shift, now).await?;
        shift.counted_balance = Money::zero();
        shift.cash_difference = Money::zero();
        shift.closed = true;

        uow.shifts().seal(&shift).await?;
        uow.record(Notification::shift_status(&shift));

        info!(
            shift_id = %shift.id,
            cashier_id = %shift.cashier_id,
            cash = shift.cash_payments.cents(),
            "Cash shift closed automatically"
        );
        Ok(shift)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// The cashier's open shift with totals recomputed up to now.
    pub async fn active(
        &self,
        tenant_id: &str,
        acting_user: &str,
        cashier_id: Option<&str>,
    ) -> EngineResult<ActiveShift> {
        let cashier = self
            .target_cashier(tenant_id, acting_user, cashier_id, "consultar caja")
            .await?;

        let mut conn = self.ctx.db().acquire().await?;
        let shift = ShiftRepository::new(&mut conn)
            .find_open(tenant_id, &cashier)
            .await?
            .ok_or_else(|| CoreError::not_found("cierre de caja abierto", cashier.as_str()))?;

        let summary = window_summary(&mut LedgerRepository::new(&mut conn), &shift, time::now()).await?;
        let expected_balance = summary.expected_balance(shift.opening_balance);
        Ok(ActiveShift {
            shift,
            summary,
            expected_balance,
        })
    }
}
