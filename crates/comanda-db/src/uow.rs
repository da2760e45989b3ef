//! # Unit of Work
//!
//! One database transaction plus the list of notifications to publish once
//! it commits.
//!
//! ## The Post-Commit Outbox
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Unit of Work Lifecycle                               │
//! │                                                                         │
//! │  db.begin()                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  uow.orders().claim(..)       ← takes the write lock            │   │
//! │  │  uow.tables().set_state(..)   ← same transaction                │   │
//! │  │  uow.record(Notification)     ← queued in memory only           │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ├── Ok  → COMMIT   → Vec<Notification> handed to the sink        │
//! │       └── Err → ROLLBACK → queued notifications dropped                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every repository handed out here borrows the transaction's connection, so
//! cross-aggregate writes (order + table + shift) share one commit.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use comanda_core::Notification;

use crate::error::{DbError, DbResult};
use crate::repository::catalog::CatalogRepository;
use crate::repository::identity::IdentityRepository;
use crate::repository::ledger::LedgerRepository;
use crate::repository::order::OrderRepository;
use crate::repository::shift::ShiftRepository;
use crate::repository::table::TableRepository;

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    outbox: Vec<Notification>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        UnitOfWork {
            tx,
            outbox: Vec::new(),
        }
    }

    /// Raw access for statements no repository covers.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub fn orders(&mut self) -> OrderRepository<'_> {
        OrderRepository::new(&mut self.tx)
    }

    pub fn tables(&mut self) -> TableRepository<'_> {
        TableRepository::new(&mut self.tx)
    }

    pub fn catalog(&mut self) -> CatalogRepository<'_> {
        CatalogRepository::new(&mut self.tx)
    }

    pub fn identity(&mut self) -> IdentityRepository<'_> {
        IdentityRepository::new(&mut self.tx)
    }

    pub fn shifts(&mut self) -> ShiftRepository<'_> {
        ShiftRepository::new(&mut self.tx)
    }

    pub fn ledger(&mut self) -> LedgerRepository<'_> {
        LedgerRepository::new(&mut self.tx)
    }

    /// Queues a notification for after commit.
    pub fn record(&mut self, notification: Notification) {
        self.outbox.push(notification);
    }

    /// Notifications queued so far.
    pub fn pending(&self) -> &[Notification] {
        &self.outbox
    }

    /// Commits and returns the queued notifications.
    pub async fn commit(self) -> DbResult<Vec<Notification>> {
        let UnitOfWork { tx, outbox } = self;
        tx.commit().await.map_err(DbError::from)?;
        debug!(events = outbox.len(), "Transaction committed");
        Ok(outbox)
    }

    /// Rolls back and discards the queued notifications.
    pub async fn rollback(self) -> DbResult<()> {
        let discarded = self.outbox.len();
        self.tx.rollback().await.map_err(DbError::from)?;
        debug!(discarded, "Transaction rolled back");
        Ok(())
    }

    /// Ends the unit of work according to the body's result: commit on `Ok`,
    /// explicit rollback on `Err` (the original error is returned either way
    /// the rollback goes).
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<(T, Vec<Notification>), E>
    where
        E: From<DbError>,
    {
        match result {
            Ok(value) => {
                let events = self.commit().await?;
                Ok((value, events))
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
