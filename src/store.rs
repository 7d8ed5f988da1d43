//! Signal persistence: save/ack/replay hooks plugged into the bus.

use std::sync::Mutex;

use crate::error::StoreError;
use crate::signal::{BaseSignal, SignalId, SignalPayload};

/// Durability hooks used by the bus's emit pipeline and `replay`.
pub trait SignalStore<P: SignalPayload>: Send + Sync {
    fn save(&self, signal: &BaseSignal<P>) -> Result<(), StoreError>;
    fn mark_acked(&self, id: SignalId) -> Result<(), StoreError>;
    /// Ordered (by original save order) list of signals not yet acked.
    fn get_unacked(&self) -> Result<Vec<BaseSignal<P>>, StoreError>;
}

/// Default store: all three operations are no-ops, `get_unacked` always
/// returns empty.
#[derive(Debug, Default)]
pub struct NoopStore;

impl<P: SignalPayload> SignalStore<P> for NoopStore {
    fn save(&self, _signal: &BaseSignal<P>) -> Result<(), StoreError> {
        Ok(())
    }

    fn mark_acked(&self, _id: SignalId) -> Result<(), StoreError> {
        Ok(())
    }

    fn get_unacked(&self) -> Result<Vec<BaseSignal<P>>, StoreError> {
        Ok(Vec::new())
    }
}

/// In-memory store useful for tests that exercise `replay` without a real
/// database. Preserves insertion order for `get_unacked`.
#[derive(Debug, Default)]
pub struct InMemoryStore<P: SignalPayload> {
    records: Mutex<Vec<(BaseSignal<P>, bool)>>,
}

impl<P: SignalPayload> InMemoryStore<P> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<P: SignalPayload> SignalStore<P> for InMemoryStore<P> {
    fn save(&self, signal: &BaseSignal<P>) -> Result<(), StoreError> {
        self.records.lock().unwrap().push((signal.clone(), false));
        Ok(())
    }

    fn mark_acked(&self, id: SignalId) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(entry) = records.iter_mut().find(|(s, _)| s.id == id) {
            entry.1 = true;
        }
        Ok(())
    }

    fn get_unacked(&self) -> Result<Vec<BaseSignal<P>>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, acked)| !acked)
            .map(|(s, _)| s.clone())
            .collect())
    }
}

#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;

#[cfg(feature = "sqlite-store")]
mod sqlite {
    //! SQLite-backed store, grounded in the teacher's `persistence.rs`
    //! (`PersistenceManager`): one table, created eagerly, with typed
    //! columns for the fixed fields and a JSON text column for the
    //! type-specific payload.

    use std::path::Path;

    use rusqlite::{params, Connection, OptionalExtension};
    use serde::{de::DeserializeOwned, Serialize};

    use super::*;

    /// SQLite-backed [`SignalStore`]. Requires `P: Serialize +
    /// DeserializeOwned` so the payload can round-trip through a JSON text
    /// column, preserving the signal record's fields and values exactly.
    pub struct SqliteStore<P> {
        conn: Mutex<Connection>,
        _marker: std::marker::PhantomData<P>,
    }

    impl<P> SqliteStore<P>
    where
        P: SignalPayload + Serialize + DeserializeOwned,
    {
        pub fn open<Q: AsRef<Path>>(db_path: Q) -> Result<Self, StoreError> {
            let conn = Connection::open(db_path)?;
            Self::from_connection(conn)
        }

        pub fn in_memory() -> Result<Self, StoreError> {
            let conn = Connection::open_in_memory()?;
            Self::from_connection(conn)
        }

        fn from_connection(conn: Connection) -> Result<Self, StoreError> {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS signals (
                    id TEXT PRIMARY KEY,
                    ts INTEGER NOT NULL,
                    source TEXT,
                    type TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    acked INTEGER NOT NULL DEFAULT 0,
                    seq INTEGER NOT NULL
                )",
                [],
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
                _marker: std::marker::PhantomData,
            })
        }
    }

    impl<P> SignalStore<P> for SqliteStore<P>
    where
        P: SignalPayload + Serialize + DeserializeOwned + Send + Sync,
    {
        fn save(&self, signal: &BaseSignal<P>) -> Result<(), StoreError> {
            let payload_json = serde_json::to_string(&signal.payload)?;
            let conn = self.conn.lock().unwrap();
            let seq: i64 = conn
                .query_row("SELECT COALESCE(MAX(seq), -1) + 1 FROM signals", [], |row| {
                    row.get(0)
                })
                .optional()?
                .unwrap_or(0);
            conn.execute(
                "INSERT INTO signals (id, ts, source, type, payload, acked, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    signal.id.to_string(),
                    signal.ts,
                    signal.source,
                    signal.signal_type(),
                    payload_json,
                    seq,
                ],
            )?;
            Ok(())
        }

        fn mark_acked(&self, id: SignalId) -> Result<(), StoreError> {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE signals SET acked = 1 WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(())
        }

        fn get_unacked(&self) -> Result<Vec<BaseSignal<P>>, StoreError> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, ts, source, payload FROM signals WHERE acked = 0 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let ts: i64 = row.get(1)?;
                let source: Option<String> = row.get(2)?;
                let payload_json: String = row.get(3)?;
                Ok((id, ts, source, payload_json))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (id, ts, source, payload_json) = row?;
                let payload: P = serde_json::from_str(&payload_json)?;
                out.push(BaseSignal {
                    id: SignalId::parse(&id)
                        .map_err(|e| StoreError::other(format!("bad stored id: {e}")))?,
                    ts,
                    source,
                    payload,
                });
            }
            Ok(out)
        }
    }

}
