//! # comanda-core: Pure Domain Logic for Comanda
//!
//! Order lifecycle and cash-shift rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comanda Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api (axum REST)                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │       comanda-engine (orders, shifts, ledger, sweep)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ comanda-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  status   │  │  window   │  │   items   │  │reconcilia-│  │   │
//! │  │   │ (role,    │  │ edit/     │  │ diff plan │  │tion       │  │   │
//! │  │   │ from, to) │  │ cancel    │  │           │  │ tips, cash│  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 comanda-db (SQLite, unit of work)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, OrderItem, CashShift, Invoice, ...)
//! - [`money`] - Integer minor-unit money
//! - [`error`] - Error taxonomy with stable reason codes
//! - [`status`] - Declarative order transition table
//! - [`window`] - Edit/cancel time-window predicates
//! - [`items`] - Item-list reconciliation planning
//! - [`denominations`] - Drawer breakdown → balance
//! - [`reconciliation`] - Tip apportionment, buckets, expected balance
//! - [`inventory`] - Stock sufficiency for recipe consumption
//! - [`time`] - UTC−5 microsecond timestamp codec
//! - [`event`] - Post-commit notifications
//! - [`validation`] - Request checks that need no database

// =============================================================================
// Module Declarations
// =============================================================================

pub mod denominations;
pub mod error;
pub mod event;
pub mod inventory;
pub mod items;
pub mod money;
pub mod reconciliation;
pub mod status;
pub mod time;
pub mod types;
pub mod validation;
pub mod window;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use denominations::Denominations;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use event::Notification;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Upper bound for a single line's quantity (catches typos like 100 for 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Note stamped on orders force-cancelled by the automatic shift close.
pub const AUTO_CANCEL_NOTE: &str = "Cancelado automáticamente por cierre de caja";
