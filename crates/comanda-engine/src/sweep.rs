//! # Shift Sweep
//!
//! End-of-day automatic close of every shift still open.
//!
//! ```text
//! ShiftSweepScheduler::run()
//!   loop
//!     ├─ shutdown.cancelled() ─────────────────────► return
//!     └─ sleep until next local `cutoff` (04:00)
//!          └─ ShiftSweeper::sweep_all_open()
//!               for each open shift (own transaction):
//!                 close_automatically_by_id ── Ok ──► Closed
//!                                           └─ Err ─► Failed, keep going
//! ```

use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use comanda_core::time;
use comanda_db::ShiftRepository;

use crate::error::EngineResult;
use crate::shifts::CashShiftEngine;

/// Result of closing one shift in a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resultado", rename_all = "snake_case")]
pub enum SweepOutcome {
    Closed { shift_id: String },
    Failed { shift_id: String, reason: String },
}

impl SweepOutcome {
    pub fn is_closed(&self) -> bool {
        matches!(self, SweepOutcome::Closed { .. })
    }
}

#[derive(Clone)]
pub struct ShiftSweeper {
    shifts: CashShiftEngine,
}

impl ShiftSweeper {
    pub fn new(shifts: CashShiftEngine) -> Self {
        ShiftSweeper { shifts }
    }

    /// Closes each listed shift in its own transaction. One failure never
    /// stops or rolls back the others.
    pub async fn sweep(&self, shift_ids: &[String]) -> Vec<SweepOutcome> {
        let mut outcomes = Vec::with_capacity(shift_ids.len());
        for shift_id in shift_ids {
            let outcome = match self.shifts.close_automatically_by_id(shift_id).await {
                Ok(shift) => SweepOutcome::Closed { shift_id: shift.id },
                Err(err) => {
                    warn!(shift_id = %shift_id, error = %err, "Automatic close failed");
                    SweepOutcome::Failed {
                        shift_id: shift_id.clone(),
                        reason: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Sweeps every open shift of every tenant.
    pub async fn sweep_all_open(&self) -> EngineResult<Vec<SweepOutcome>> {
        let open: Vec<String> = {
            let mut conn = self.shifts.db().acquire().await?;
            ShiftRepository::new(&mut conn)
                .list_open()
                .await?
                .into_iter()
                .map(|shift| shift.id)
                .collect()
        };

        let outcomes = self.sweep(&open).await;
        let closed = outcomes.iter().filter(|o| o.is_closed()).count();
        info!(open = open.len(), closed, failed = open.len() - closed, "Shift sweep finished");
        Ok(outcomes)
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs the sweep once a day at a local wall-clock time.
pub struct ShiftSweepScheduler {
    sweeper: ShiftSweeper,
    cutoff: NaiveTime,
    shutdown: CancellationToken,
}

impl ShiftSweepScheduler {
    pub fn new(sweeper: ShiftSweeper, cutoff: NaiveTime, shutdown: CancellationToken) -> Self {
        ShiftSweepScheduler {
            sweeper,
            cutoff,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!(cutoff = %self.cutoff, "Shift sweep scheduler started");
        loop {
            let now = time::now();
            let next = time::next_local_time(now, self.cutoff);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shift sweep scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(err) = self.sweeper.sweep_all_open().await {
                        warn!(error = %err, "Shift sweep could not list open shifts");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comanda_core::{ErrorKind, Money, OrderStatus, TableState, AUTO_CANCEL_NOTE};
    use comanda_db::test_support::ids;
    use comanda_db::TableRepository;

    use crate::shifts::OpenShift;
    use crate::testkit::{self, close_order, invoice, line, table_order, takeaway_order};

    #[tokio::test]
    async fn test_sweep_closes_without_drawer_count() {
        let (services, db) = testkit::services().await;
        let opened = services
            .shifts
            .open(ids::TENANT, ids::CASHIER, &OpenShift::default())
            .await
            .unwrap();

        let paid = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &takeaway_order(vec![line(ids::LEMONADE, 20)]))
            .await
            .unwrap();
        close_order(&services, &paid.order.id).await;
        services
            .ledger
            .create_invoice_and_payment(
                ids::TENANT,
                ids::CASHIER,
                &invoice(&paid.order.id, 10_000, 1_000, ids::CASH_ACCOUNT),
            )
            .await
            .unwrap();

        let stale = services
            .orders
            .create(ids::TENANT, ids::CASHIER, &table_order(ids::TABLE_2, vec![line(ids::BURGER, 1)]))
            .await
            .unwrap();

        let outcomes = services.sweeper.sweep_all_open().await.unwrap();
        assert_eq!(
            outcomes,
            vec![SweepOutcome::Closed {
                shift_id: opened.id.clone()
            }]
        );

        let shift = {
            let mut conn = db.acquire().await.unwrap();
            ShiftRepository::new(&mut conn).get(&opened.id).await.unwrap().unwrap()
        };
        assert!(shift.closed);
        assert_eq!(shift.cash_payments, Money::from_cents(11_000));
        assert_eq!(shift.tips, Money::from_cents(1_000));
        assert_eq!(shift.counted_balance, Money::zero());
        assert_eq!(shift.cash_difference, Money::zero());
        assert!(shift.closing_denominations.is_none());

        let cancelled = services.orders.get(&stale.order.id, ids::TENANT, ids::ADMIN).await.unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.order.cancel_reason.as_deref(), Some(AUTO_CANCEL_NOTE));
        assert_eq!(cancelled.order.cash_shift_id.as_deref(), Some(opened.id.as_str()));

        let settled = services.orders.get(&paid.order.id, ids::TENANT, ids::ADMIN).await.unwrap();
        assert_eq!(settled.order.status, OrderStatus::Paid);

        let mut conn = db.acquire().await.unwrap();
        let table = TableRepository::new(&mut conn).get(ids::TABLE_2, ids::TENANT).await.unwrap().unwrap();
        assert_eq!(table.state, TableState::Free);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_sweep() {
        let (services, _db) = testkit::services().await;
        let shift = services
            .shifts
            .open(ids::TENANT, ids::CASHIER_2, &OpenShift::default())
            .await
            .unwrap();

        let outcomes = services
            .sweeper
            .sweep(&["cc-desconocido".to_string(), shift.id.clone()])
            .await;

        assert!(matches!(&outcomes[0], SweepOutcome::Failed { shift_id, .. } if shift_id == "cc-desconocido"));
        assert_eq!(outcomes[1], SweepOutcome::Closed { shift_id: shift.id });
        assert!(services.sweeper.sweep_all_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_automatic_close_needs_open_shift() {
        let (services, _db) = testkit::services().await;
        let err = services
            .shifts
            .close_automatically(ids::TENANT, ids::CASHIER)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let (services, _db) = testkit::services().await;
        let shutdown = CancellationToken::new();
        let scheduler = ShiftSweepScheduler::new(
            services.sweeper.clone(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            shutdown.clone(),
        );

        let handle = tokio::spawn(scheduler.run());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
