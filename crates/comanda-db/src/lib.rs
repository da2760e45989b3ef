//! # comanda-db: Database Layer for Comanda
//!
//! SQLite storage for orders, tables, cash shifts and the invoicing ledger,
//! with sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comanda Data Flow                                │
//! │                                                                         │
//! │  comanda-engine (OrderEngine::update_status)                           │
//! │       │                                                                 │
//! │       │  with_retry(policy, || async { db.begin() ... uow.finish() })  │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     comanda-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  UnitOfWork   │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │───►│   (uow.rs)    │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ Transaction   │    │ 001_initial  │  │   │
//! │  │   │ WAL + busy    │    │ Repositories  │    │ 002_ledger   │  │   │
//! │  │   │ timeout       │    │ Outbox        │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   retry.rs: lock timeouts are the only transient error         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`uow`] - Transaction wrapper with post-commit notification outbox
//! - [`retry`] - Bounded retry of transient failures
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comanda_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("comanda.db")).await?;
//!
//! let mut uow = db.begin().await?;
//! if uow.tables().claim(table_id, tenant_id).await? {
//!     uow.tables().set_state(table_id, tenant_id, TableState::Occupied).await?;
//! }
//! let notifications = uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

mod codec;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;
pub mod uow;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::{with_retry, RetryError, RetryPolicy, Transient};
pub use uow::UnitOfWork;

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::identity::IdentityRepository;
pub use repository::ledger::{LedgerRepository, ShiftWindow};
pub use repository::order::OrderRepository;
pub use repository::shift::ShiftRepository;
pub use repository::table::TableRepository;

/// Generates a new UUID v4 string identifier.
pub fn new_id() -> String {
    codec::new_id()
}
