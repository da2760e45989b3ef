//! # Ledger Engine
//!
//! Invoices, payments, expenses and extra income, plus the per-shift sums the
//! cash shift engine and the reports read.
//!
//! ## Invoice Flow
//! ```text
//! InvoiceRequest
//!   pedidos: [{pedido_id, monto}]    ──► every order CERRADO, monto ≤ saldo
//!   descuento, impuesto, propina
//!   pagos:   [{cuenta, monto, ..}]   ──► Σ monto == subtotal − descuento + impuesto
//!        │
//!        ▼  one unit of work
//!   invoice + invoice_orders + payments   (cash_shift_id = NULL)
//!   orders whose saldo reaches 0 ──► PAGADO, table released
//! ```
//!
//! Payments stay unlinked until a shift close stamps them; expenses and
//! extra income are linked to the cashier's open shift when recorded.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use comanda_core::reconciliation::{tally_payments, PaymentTotals, ShiftSummary};
use comanda_core::{time, validation};
use comanda_core::{
    CashShift, CoreError, Denominations, Expense, ExtraIncome, Invoice, InvoiceOrder, Money,
    Notification, OrderStatus, Payment, Role, ValidationError,
};
use comanda_db::{new_id, LedgerRepository, ShiftRepository, ShiftWindow, UnitOfWork};

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::orders::release_table_if_idle;

/// Roles that handle money.
pub(crate) const CASH_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Cashier];

// =============================================================================
// Commands
// =============================================================================

/// Amount of one order an invoice settles.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLine {
    #[serde(rename = "pedido_id")]
    pub order_id: String,

    #[serde(rename = "monto")]
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInput {
    #[serde(rename = "cuenta_bancaria_id", default)]
    pub bank_account_id: Option<String>,

    /// Base amount, tip excluded.
    #[serde(rename = "monto")]
    pub amount: Money,

    #[serde(rename = "referencia", default)]
    pub reference: Option<String>,

    #[serde(rename = "denominaciones", default)]
    #[ts(type = "Record<string, number> | null")]
    pub denominations: Option<Denominations>,

    #[serde(rename = "division_pago_id", default)]
    pub payment_split_id: Option<String>,
}

/// `POST /facturas` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceRequest {
    #[serde(rename = "pedidos")]
    pub orders: Vec<InvoiceLine>,

    #[serde(rename = "descuento", default)]
    pub discount: Money,

    #[serde(rename = "impuesto", default)]
    pub tax: Money,

    #[serde(rename = "propina", default)]
    pub tip: Money,

    #[serde(rename = "pagos")]
    pub payments: Vec<PaymentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceReceipt {
    pub invoice: Invoice,
    pub orders: Vec<InvoiceOrder>,
    pub payments: Vec<Payment>,

    /// Orders this invoice moved to PAGADO.
    pub paid_orders: Vec<String>,
}

/// `POST /gastos` and `POST /ingresos-extra` body.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    #[serde(rename = "monto")]
    pub amount: Money,

    #[serde(rename = "concepto")]
    pub concept: String,
}

// =============================================================================
// Window Summary
// =============================================================================

/// Live totals of a shift from raw rows: linked ones plus the unlinked rows
/// of its window up to `to`.
pub(crate) async fn window_summary(
    ledger: &mut LedgerRepository<'_>,
    shift: &CashShift,
    to: DateTime<Utc>,
) -> EngineResult<ShiftSummary> {
    let window = ShiftWindow {
        tenant_id: &shift.tenant_id,
        cashier_id: &shift.cashier_id,
        shift_id: &shift.id,
        from: shift.opened_at,
        to,
    };
    let invoices = ledger.window_invoices(&window).await?;
    let payments = ledger.window_payments(&window).await?;
    let expenses = ledger.sum_expenses_for_shift(&shift.id).await?;
    let extra_income = ledger.sum_extra_income_for_shift(&shift.id).await?;

    Ok(ShiftSummary::compute(&invoices, &payments, expenses, extra_income))
}

fn check_request(req: &InvoiceRequest) -> Result<Money, ValidationError> {
    if req.orders.is_empty() {
        return Err(ValidationError::Required { field: "pedidos" });
    }
    if req.payments.is_empty() {
        return Err(ValidationError::Required { field: "pagos" });
    }

    let mut seen = HashSet::new();
    for line in &req.orders {
        validation::validate_positive("monto", line.amount)?;
        if !seen.insert(line.order_id.as_str()) {
            return Err(ValidationError::NotAllowed {
                field: "pedidos",
                reason: format!("el pedido {} aparece más de una vez", line.order_id),
            });
        }
    }
    for payment in &req.payments {
        validation::validate_positive("monto", payment.amount)?;
        validation::validate_optional_text("referencia", payment.reference.as_deref())?;
    }
    validation::validate_non_negative("descuento", req.discount)?;
    validation::validate_non_negative("impuesto", req.tax)?;
    validation::validate_non_negative("propina", req.tip)?;

    let subtotal: Money = req.orders.iter().map(|l| l.amount).sum();
    let net_due = subtotal - req.discount + req.tax;
    if net_due.is_negative() {
        return Err(ValidationError::NotAllowed {
            field: "descuento",
            reason: "el descuento supera el subtotal".into(),
        });
    }

    let received: Money = req.payments.iter().map(|p| p.amount).sum();
    if received != net_due {
        return Err(ValidationError::PaymentMismatch {
            expected: net_due.to_string(),
            received: received.to_string(),
        });
    }
    Ok(subtotal)
}

// =============================================================================
// Ledger Engine
// =============================================================================

#[derive(Clone)]
pub struct LedgerEngine {
    ctx: EngineContext,
}

impl LedgerEngine {
    pub fn new(ctx: EngineContext) -> Self {
        LedgerEngine { ctx }
    }

    async fn cash_role(&self, acting_user: &str, tenant_id: &str, action: &str) -> EngineResult<Role> {
        let role = self.ctx.role_of(acting_user, tenant_id).await?;
        if !CASH_ROLES.contains(&role) {
            return Err(CoreError::permission(role, action).into());
        }
        Ok(role)
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    pub async fn create_invoice_and_payment(
        &self,
        tenant_id: &str,
        acting_user: &str,
        req: &InvoiceRequest,
    ) -> EngineResult<InvoiceReceipt> {
        self.cash_role(acting_user, tenant_id, "facturar pedidos").await?;
        let subtotal = check_request(req)?;

        let receipt = self
            .ctx
            .transact("factura.crear", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result = self
                    .invoice_in(&mut uow, tenant_id, acting_user, req, subtotal)
                    .await;
                uow.finish(result).await
            })
            .await?;

        info!(
            invoice_id = %receipt.invoice.id,
            total = receipt.invoice.total.cents(),
            paid_orders = receipt.paid_orders.len(),
            "Invoice recorded"
        );
        Ok(receipt)
    }

    async fn invoice_in(
        &self,
        uow: &mut UnitOfWork,
        tenant_id: &str,
        cashier_id: &str,
        req: &InvoiceRequest,
        subtotal: Money,
    ) -> EngineResult<InvoiceReceipt> {
        let now = time::now();
        let invoice_id = new_id();

        let mut orders = Vec::with_capacity(req.orders.len());
        let mut settled = Vec::new();
        for line in &req.orders {
            if !uow.orders().claim(&line.order_id, tenant_id).await? {
                return Err(CoreError::not_found("pedido", line.order_id.as_str()).into());
            }
            let order = uow
                .orders()
                .find(&line.order_id, tenant_id)
                .await?
                .ok_or_else(|| CoreError::not_found("pedido", line.order_id.as_str()))?;
            if order.status != OrderStatus::Closed {
                return Err(ValidationError::NotInvoiceable {
                    order_id: order.id,
                    status: order.status,
                }
                .into());
            }

            let already = uow.ledger().applied_total_for_order(&order.id).await?;
            let outstanding = order.estimated_total - order.discount - already;
            if line.amount > outstanding {
                return Err(ValidationError::OverApplied { order_id: order.id }.into());
            }
            if line.amount == outstanding {
                settled.push(order);
            }
            orders.push(InvoiceOrder {
                invoice_id: invoice_id.clone(),
                order_id: line.order_id.clone(),
                applied: line.amount,
            });
        }

        for payment in &req.payments {
            if let Some(account_id) = &payment.bank_account_id {
                uow.ledger()
                    .find_bank_account(account_id, tenant_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("cuenta bancaria", account_id.as_str()))?;
            }
        }

        let net_due = subtotal - req.discount + req.tax;
        let invoice = Invoice {
            id: invoice_id.clone(),
            tenant_id: tenant_id.to_string(),
            cashier_id: cashier_id.to_string(),
            subtotal,
            discount: req.discount,
            tax: req.tax,
            tip: req.tip,
            total: net_due + req.tip,
            cash_shift_id: None,
            created_at: now,
        };
        uow.ledger().insert_invoice(&invoice).await?;
        for link in &orders {
            uow.ledger().insert_invoice_order(link).await?;
        }

        let mut payments = Vec::with_capacity(req.payments.len());
        for input in &req.payments {
            let payment = Payment {
                id: new_id(),
                tenant_id: tenant_id.to_string(),
                invoice_id: invoice_id.clone(),
                bank_account_id: input.bank_account_id.clone(),
                amount: input.amount,
                reference: input.reference.clone(),
                denominations: input.denominations.clone(),
                paid_at: now,
                cash_shift_id: None,
                payment_split_id: input.payment_split_id.clone(),
            };
            uow.ledger().insert_payment(&payment).await?;
            payments.push(payment);
        }

        let mut paid_orders = Vec::with_capacity(settled.len());
        for mut order in settled {
            let previous = order.status;
            order.status = OrderStatus::Paid;
            order.updated_at = now;
            uow.orders().update_header(&order).await?;
            uow.record(Notification::order_status(&order, previous));
            if let Some(table_id) = order.table_id.clone() {
                release_table_if_idle(uow, tenant_id, &table_id, &order.id).await?;
            }
            debug!(order_id = %order.id, "Order fully paid");
            paid_orders.push(order.id);
        }

        Ok(InvoiceReceipt {
            invoice,
            orders,
            payments,
            paid_orders,
        })
    }

    // =========================================================================
    // Drawer movements
    // =========================================================================

    pub async fn record_expense(
        &self,
        tenant_id: &str,
        acting_user: &str,
        movement: &CashMovement,
    ) -> EngineResult<Expense> {
        self.cash_role(acting_user, tenant_id, "registrar gastos").await?;
        validation::validate_positive("monto", movement.amount)?;
        validation::validate_text("concepto", &movement.concept)?;

        let expense = self
            .ctx
            .transact("gasto.crear", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result: EngineResult<Expense> = async {
                    let shift = claim_open_shift(&mut uow, tenant_id, acting_user).await?;
                    let expense = Expense {
                        id: new_id(),
                        tenant_id: tenant_id.to_string(),
                        cashier_id: acting_user.to_string(),
                        cash_shift_id: shift.id,
                        amount: movement.amount,
                        concept: movement.concept.trim().to_string(),
                        created_at: time::now(),
                    };
                    uow.ledger().insert_expense(&expense).await?;
                    Ok(expense)
                }
                .await;
                uow.finish(result).await
            })
            .await?;

        info!(shift_id = %expense.cash_shift_id, amount = expense.amount.cents(), "Expense recorded");
        Ok(expense)
    }

    pub async fn record_extra_income(
        &self,
        tenant_id: &str,
        acting_user: &str,
        movement: &CashMovement,
    ) -> EngineResult<ExtraIncome> {
        self.cash_role(acting_user, tenant_id, "registrar ingresos extra").await?;
        validation::validate_positive("monto", movement.amount)?;
        validation::validate_text("concepto", &movement.concept)?;

        let income = self
            .ctx
            .transact("ingreso_extra.crear", move |_| async move {
                let mut uow = self.ctx.db().begin().await?;
                let result: EngineResult<ExtraIncome> = async {
                    let shift = claim_open_shift(&mut uow, tenant_id, acting_user).await?;
                    let income = ExtraIncome {
                        id: new_id(),
                        tenant_id: tenant_id.to_string(),
                        cashier_id: acting_user.to_string(),
                        cash_shift_id: shift.id,
                        amount: movement.amount,
                        concept: movement.concept.trim().to_string(),
                        created_at: time::now(),
                    };
                    uow.ledger().insert_extra_income(&income).await?;
                    Ok(income)
                }
                .await;
                uow.finish(result).await
            })
            .await?;

        info!(shift_id = %income.cash_shift_id, amount = income.amount.cents(), "Extra income recorded");
        Ok(income)
    }

    // =========================================================================
    // Per-shift sums
    // =========================================================================

    /// Cash/card/other totals of the shift, tips apportioned.
    pub async fn sum_payments_for_shift(&self, shift_id: &str) -> EngineResult<PaymentTotals> {
        let mut conn = self.ctx.db().acquire().await?;
        let shift = ShiftRepository::new(&mut conn)
            .get(shift_id)
            .await?
            .ok_or_else(|| CoreError::not_found("cierre de caja", shift_id))?;

        let mut ledger = LedgerRepository::new(&mut conn);
        if shift.closed {
            let invoices = ledger.shift_invoices(shift_id).await?;
            let payments = ledger.shift_payments(shift_id).await?;
            return Ok(tally_payments(&invoices, &payments));
        }
        let summary = window_summary(&mut ledger, &shift, time::now()).await?;
        Ok(summary.payments)
    }

    pub async fn sum_expenses_for_shift(&self, shift_id: &str) -> EngineResult<Money> {
        let mut conn = self.ctx.db().acquire().await?;
        Ok(LedgerRepository::new(&mut conn).sum_expenses_for_shift(shift_id).await?)
    }

    pub async fn sum_extra_income_for_shift(&self, shift_id: &str) -> EngineResult<Money> {
        let mut conn = self.ctx.db().acquire().await?;
        Ok(LedgerRepository::new(&mut conn)
            .sum_extra_income_for_shift(shift_id)
            .await?)
    }
}

/// Write lock on the cashier's open shift; NotFound if there is none.
pub(crate) async fn claim_open_shift(
    uow: &mut UnitOfWork,
    tenant_id: &str,
    cashier_id: &str,
) -> EngineResult<CashShift> {
    if !uow.shifts().claim_open(tenant_id, cashier_id).await? {
        return Err(CoreError::not_found("cierre de caja abierto", cashier_id).into());
    }
    uow.shifts()
        .find_open(tenant_id, cashier_id)
        .await?
        .ok_or_else(|| CoreError::not_found("cierre de caja abierto", cashier_id).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use comanda_core::{ErrorKind, TableState};
    use comanda_db::test_support::ids;
    use comanda_db::TableRepository;

    use crate::orders::NewOrder;
    use crate::shifts::OpenShift;
    use crate::testkit::{self, close_order, invoice, line, table_order, takeaway_order};

    async fn closed_order(services: &crate::Services, cmd: &NewOrder) -> String {
        let detail = services.orders.create(ids::TENANT, ids::CASHIER, cmd).await.unwrap();
        close_order(services, &detail.order.id).await;
        detail.order.id
    }

    #[tokio::test]
    async fn test_payments_must_match_net_due() {
        let (services, _db) = testkit::services().await;
        let order_id = closed_order(&services, &takeaway_order(vec![line(ids::LEMONADE, 2)])).await;

        let mut req = invoice(&order_id, 1_000, 0, ids::CASH_ACCOUNT);
        req.tax = Money::from_cents(190);
        let err = services
            .ledger
            .create_invoice_and_payment(ids::TENANT, ids::CASHIER, &req)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "pagos_descuadrados");

        req.payments[0].amount = Money::from_cents(1_190);
        let receipt = services
            .ledger
            .create_invoice_and_payment(ids::TENANT, ids::CASHIER, &req)
            .await
            .unwrap();
        assert_eq!(receipt.invoice.total, Money::from_cents(1_190));
        assert!(receipt.invoice.cash_shift_id.is_none());
        assert_eq!(receipt.paid_orders, vec![order_id]);
    }

    #[tokio::test]
    async fn test_partial_payments_settle_order_and_free_table() {
        let (services, db) = testkit::services().await;
        let order_id = closed_order(&services, &table_order(ids::TABLE_1, vec![line(ids::BURGER, 1)])).await;

        let first = services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::CASHIER,
                &invoice(&order_id, 600, 0, ids::CARD_ACCOUNT),
            )
            .await
            .unwrap();
        assert!(first.paid_orders.is_empty());

        let err = services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::CASHIER,
                &invoice(&order_id, 500, 0, ids::CASH_ACCOUNT),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "monto_excedido");

        let second = services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::CASHIER,
                &invoice(&order_id, 400, 0, ids::CASH_ACCOUNT),
            )
            .await
            .unwrap();
        assert_eq!(second.paid_orders, vec![order_id.clone()]);

        let detail = services.orders.get(&order_id, ids::TENANT, ids::CASHIER).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::Paid);
        let mut conn = db.acquire().await.unwrap();
        let table = TableRepository::new(&mut conn).get(ids::TABLE_1, ids::TENANT).await.unwrap().unwrap();
        assert_eq!(table.state, TableState::Free);
    }

    #[tokio::test]
    async fn test_only_closed_orders_are_invoiceable() {
        let (services, _db) = testkit::services().await;
        let open = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &takeaway_order(vec![line(ids::LEMONADE, 1)]))
            .await
            .unwrap();

        let err = services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::CASHIER,
                &invoice(&open.order.id, 500, 0, ids::CASH_ACCOUNT),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "pedido_no_facturable");

        let err = services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::WAITER,
                &invoice(&open.order.id, 500, 0, ids::CASH_ACCOUNT),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Permission));
    }

    #[tokio::test]
    async fn test_unknown_bank_account_rolls_back() {
        let (services, _db) = testkit::services().await;
        let order_id = closed_order(&services, &takeaway_order(vec![line(ids::LEMONADE, 1)])).await;

        let err = services
            .ledger
            .create_invoice_and_payment(ids::TENANT, ids::CASHIER, &invoice(&order_id, 500, 0, "cb-nada"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));

        let detail = services.orders.get(&order_id, ids::TENANT, ids::CASHIER).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn test_drawer_movements_need_open_shift() {
        let (services, _db) = testkit::services().await;
        let movement = CashMovement {
            amount: Money::from_cents(1_500),
            concept: "  gas  ".into(),
        };

        let err = services
            .ledger
            .record_expense(ids::TENANT, ids::CASHIER, &movement)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));

        let shift = services
            .shifts
            .open(ids::TENANT, ids::CASHIER, &OpenShift::default())
            .await
            .unwrap();
        let expense = services
            .ledger
            .record_expense(ids::TENANT, ids::CASHIER, &movement)
            .await
            .unwrap();
        assert_eq!(expense.cash_shift_id, shift.id);
        assert_eq!(expense.concept, "gas");

        let blank = CashMovement {
            amount: Money::from_cents(100),
            concept: " ".into(),
        };
        let err = services
            .ledger
            .record_extra_income(ids::TENANT, ids::CASHIER, &blank)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));

        assert_eq!(
            services.ledger.sum_expenses_for_shift(&shift.id).await.unwrap(),
            Money::from_cents(1_500)
        );
        assert_eq!(
            services.ledger.sum_extra_income_for_shift(&shift.id).await.unwrap(),
            Money::zero()
        );
    }
}
