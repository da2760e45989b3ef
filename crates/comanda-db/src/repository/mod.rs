//! # Repository Module
//!
//! One repository per aggregate, each borrowing a `&mut SqliteConnection`.
//!
//! ## Borrowing Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Inside a transaction                 Plain read                        │
//! │  ────────────────────                 ──────────                        │
//! │  let mut uow = db.begin().await?;     let mut conn = db.acquire()?;     │
//! │  uow.orders().claim(id, tenant)       OrderRepository::new(&mut conn)   │
//! │  uow.tables().set_state(..)               .detail(id, tenant)           │
//! │  uow.commit()                                                           │
//! │                                                                         │
//! │  Both hand the repository the same &mut SqliteConnection type, so every │
//! │  statement runs on whichever connection the caller owns.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Orders, items, daily numbering
//! - [`TableRepository`](table::TableRepository) - Table occupancy
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, recipes, stock
//! - [`IdentityRepository`](identity::IdentityRepository) - Roles and tenant settings
//! - [`ShiftRepository`](shift::ShiftRepository) - Cash shifts
//! - [`LedgerRepository`](ledger::LedgerRepository) - Invoices, payments, drawer movements

pub mod catalog;
pub mod identity;
pub mod ledger;
pub mod order;
pub mod shift;
pub mod table;
