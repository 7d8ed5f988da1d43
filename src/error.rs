//! Error types for every component boundary in the crate.
//!
//! Each component (bus, clock, source, store) gets its own `thiserror` enum
//! rather than one crate-wide error, so callers can match on exactly the
//! failures their component can produce.

use thiserror::Error;

/// Errors a handler or middleware can return.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by [`crate::bus::SignalBus`] operations.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("store save failed: {0}")]
    StoreSave(String),

    #[error("store ack failed: {0}")]
    StoreAck(String),

    #[error("store replay failed: {0}")]
    StoreReplay(String),

    #[error("transport emit failed: {0}")]
    Transport(String),

    #[error("middleware failed: {0}")]
    Middleware(String),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl BusError {
    pub fn store_save(message: impl Into<String>) -> Self {
        Self::StoreSave(message.into())
    }

    pub fn store_ack(message: impl Into<String>) -> Self {
        Self::StoreAck(message.into())
    }

    pub fn store_replay(message: impl Into<String>) -> Self {
        Self::StoreReplay(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn middleware(message: impl Into<String>) -> Self {
        Self::Middleware(message.into())
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

/// Errors surfaced by [`crate::clock`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("intervalMs must be positive")]
    InvalidInterval,

    #[error("Clock already running")]
    AlreadyRunning,

    #[error("Clock not running")]
    NotRunning,

    /// Rethrown by [`crate::clock::TestClock::tick`] only: every other clock
    /// swallows handler failures into its stats, but the test clock
    /// propagates them so assertions can observe a failing handler directly.
    #[error("handler failed: {0}")]
    Handler(String),
}

/// Errors surfaced by [`crate::source::Source`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source already started")]
    AlreadyStarted,

    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
}

/// Errors surfaced by [`crate::store::SignalStore`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    #[cfg(feature = "sqlite-store")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    #[cfg(feature = "sqlite-store")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
