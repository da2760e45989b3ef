//! # Engine Context
//!
//! What every engine shares: the database, the retry policy and the sink.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transact("pedido.estado", |attempt| op_once(..))                       │
//! │                                                                         │
//! │   attempt 1 ── begin ── body ── commit ──► Ok((value, outbox))          │
//! │                           │                                             │
//! │                           └── Err ── rollback ──┐                       │
//! │                                                 │                       │
//! │          LockTimeout? ── yes, attempts left ────┴──► attempt n+1        │
//! │               │                                                         │
//! │               ├── yes, bound reached ──► ConcurrencyExhausted           │
//! │               └── no ──────────────────► error unchanged                │
//! │                                                                         │
//! │  Ok ──► sink.emit(each outbox entry) ──► value                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each attempt opens a fresh unit of work, so a retried body never sees
//! the writes or queued notifications of a failed attempt.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use comanda_core::{CoreError, Notification, Role};
use comanda_db::{with_retry, Database, IdentityRepository, RetryError, RetryPolicy};

use crate::error::{EngineError, EngineResult};
use crate::notify::NotificationSink;

#[derive(Clone)]
pub struct EngineContext {
    db: Database,
    retry: RetryPolicy,
    sink: Arc<dyn NotificationSink>,
}

impl EngineContext {
    pub fn new(db: Database, retry: RetryPolicy, sink: Arc<dyn NotificationSink>) -> Self {
        EngineContext { db, retry, sink }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Role of an active user of the tenant.
    ///
    /// Unknown users, inactive users and users of another tenant are all
    /// NotFound; the bearer token alone is never trusted for the tenant.
    pub async fn role_of(&self, user_id: &str, tenant_id: &str) -> EngineResult<Role> {
        let mut conn = self.db.acquire().await?;
        IdentityRepository::new(&mut conn)
            .role_of(user_id, tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("usuario", user_id).into())
    }

    /// Runs a unit-of-work body under the retry policy and publishes its
    /// outbox once it has committed.
    pub async fn transact<T, F, Fut>(&self, operation: &'static str, op: F) -> EngineResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = EngineResult<(T, Vec<Notification>)>>,
    {
        match with_retry(&self.retry, op).await {
            Ok((value, events)) => {
                self.publish(&events);
                Ok(value)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(operation, attempts, error = %last, "Giving up on contended transaction");
                Err(EngineError::ConcurrencyExhausted { attempts })
            }
            Err(RetryError::Failed(err)) => Err(err),
        }
    }

    pub fn publish(&self, events: &[Notification]) {
        for event in events {
            self.sink.emit(event);
        }
    }
}
