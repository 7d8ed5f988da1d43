//! Signal data model.

use std::fmt;

use uuid::Uuid;

/// Opaque unique identifier for a signal: a random 128-bit value encoded
/// textually (a UUIDv4), unique across the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(Uuid);

impl SignalId {
    /// Generate a new random signal id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a signal id from its textual encoding (round-trip of `Display`).
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(text)?))
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Implemented by the host program's closed, user-defined payload enum.
///
/// The `(type, payload)` pair is rendered as a single Rust sum type:
/// `type_name()` is the discriminator, and the variant itself carries
/// whatever fields that type's payload needs. This makes "payload shape is
/// a function of type" a compile-time guarantee instead of a runtime check.
pub trait SignalPayload: Clone + fmt::Debug {
    /// Short, non-empty string discriminator for this payload's variant.
    fn type_name(&self) -> &'static str;
}

/// An immutable signal record.
#[derive(Debug, Clone)]
pub struct BaseSignal<P: SignalPayload> {
    pub id: SignalId,
    pub ts: i64,
    pub source: Option<String>,
    pub payload: P,
}

impl<P: SignalPayload> BaseSignal<P> {
    /// Construct a new signal with a fresh id and the given timestamp.
    pub fn new(ts: i64, payload: P) -> Self {
        Self {
            id: SignalId::new(),
            ts,
            source: None,
            payload,
        }
    }

    /// Attach an origin tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The closed-set type discriminator, derived from the payload.
    pub fn signal_type(&self) -> &'static str {
        self.payload.type_name()
    }
}
