//! # comanda-engine: Transactional Services for Comanda
//!
//! Every mutating operation runs as one unit of work: rules from
//! comanda-core, rows through comanda-db, notifications published only after
//! commit, lock timeouts retried under a bounded policy.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comanda Request Flow                             │
//! │                                                                         │
//! │  apps/api (axum handler)                                                │
//! │       │  Services::orders.update_status(..)                             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  comanda-engine (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   role_of ─► transact(op) ─► begin ─► rules + repos ─► finish  │   │
//! │  │                   │                                     │       │   │
//! │  │                   └── retry on LockTimeout              │       │   │
//! │  │                                                         ▼       │   │
//! │  │                                 NotificationSink (hub, logs)   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  comanda-db (SQLite)                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`orders`] - Order creation, edits, status and item status
//! - [`shifts`] - Cash shift open, close and automatic close
//! - [`ledger`] - Invoices, payments, expenses and extra income
//! - [`sweep`] - End-of-day sweep and its scheduler
//! - [`context`] - Retry and outbox plumbing shared by the engines
//! - [`notify`] - Notification sinks
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error type

use std::sync::Arc;

use comanda_db::Database;

pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod orders;
pub mod shifts;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use error::{EngineError, EngineResult};
pub use ledger::{CashMovement, InvoiceLine, InvoiceReceipt, InvoiceRequest, LedgerEngine, PaymentInput};
pub use notify::{BroadcastHub, FanOut, NotificationSink, TracingSink};
pub use orders::{ItemStatusChange, NewOrder, OrderEngine, OrderPatch, StatusChange};
pub use shifts::{ActiveShift, CashShiftEngine, CloseShift, OpenShift};
pub use sweep::{ShiftSweepScheduler, ShiftSweeper, SweepOutcome};

/// The engines wired over one database and one sink.
#[derive(Clone)]
pub struct Services {
    pub orders: OrderEngine,
    pub shifts: CashShiftEngine,
    pub ledger: LedgerEngine,
    pub sweeper: ShiftSweeper,
    pub hub: BroadcastHub,
}

impl Services {
    /// Publishes to an in-process hub and to the log.
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self::with_sink(db, config, Arc::new(TracingSink))
    }

    /// Publishes to an in-process hub and to `sink`.
    pub fn with_sink(db: Database, config: &EngineConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let hub = BroadcastHub::new(config.notifications.channel_capacity);
        let fan_out = FanOut::new().with(Arc::new(hub.clone())).with(sink);
        let ctx = EngineContext::new(db, config.retry_policy(), Arc::new(fan_out));

        let shifts = CashShiftEngine::new(ctx.clone());
        Services {
            orders: OrderEngine::new(ctx.clone()),
            ledger: LedgerEngine::new(ctx),
            sweeper: ShiftSweeper::new(shifts.clone()),
            shifts,
            hub,
        }
    }
}
