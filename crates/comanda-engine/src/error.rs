//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │    Database     │  │      Concurrency        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(..)       │  │  Database(..)   │  │  ConcurrencyExhausted   │ │
//! │  │  validation     │  │  LockTimeout is │  │  (lock contention       │ │
//! │  │  not found      │  │  the transient  │  │   outlasted every       │ │
//! │  │  permission     │  │  class          │  │   retry attempt)        │ │
//! │  │  conflict       │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  Configuration  │                                                   │
//! │  │  InvalidConfig  │                                                   │
//! │  │  ConfigLoad..   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use comanda_core::{CoreError, ErrorKind, ValidationError};
use comanda_db::{DbError, RetryError, Transient};

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Business rule violation; carries the stable reason code.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error(transparent)]
    Database(#[from] DbError),

    /// Lock contention persisted through every retry attempt.
    ///
    /// ## When This Occurs
    /// - Two writers hammer the same order/shift and SQLite keeps reporting
    ///   "database is locked" after the busy timeout
    #[error("modificación concurrente: se agotaron {attempts} intentos")]
    ConcurrencyExhausted { attempts: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),
}

impl EngineError {
    /// Domain class of the error; `None` for infrastructure failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Core(e) => Some(e.kind()),
            EngineError::Database(DbError::NotFound { .. }) => Some(ErrorKind::NotFound),
            EngineError::ConcurrencyExhausted { .. } => Some(ErrorKind::Conflict),
            _ => None,
        }
    }

    /// Stable reason string for clients.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Core(e) => e.reason(),
            EngineError::Database(DbError::NotFound { .. }) => "no_encontrado",
            EngineError::Database(_) => "error_base_de_datos",
            EngineError::ConcurrencyExhausted { .. } => "modificacion_concurrente",
            EngineError::InvalidConfig(_) | EngineError::ConfigLoadFailed(_) => {
                "configuracion_invalida"
            }
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<RetryError<EngineError>> for EngineError {
    fn from(err: RetryError<EngineError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, .. } => EngineError::ConcurrencyExhausted { attempts },
            RetryError::Failed(e) => e,
        }
    }
}

impl Transient for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, EngineError::Database(db) if db.is_transient())
    }
}
