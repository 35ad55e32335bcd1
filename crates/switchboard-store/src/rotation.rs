use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};

/// Persistent round-robin cursor per (caller key, gateway model)
///
/// The cursor advances on every rotated request, regardless of which
/// candidate ends up serving it, so repeated requests from the same caller
/// start from successive candidates. Rows are upserted on first use and
/// never deleted.
#[derive(Clone)]
pub struct RotationStore {
    conn: Arc<Mutex<Connection>>,
}

impl RotationStore {
    /// Open (or create) the rotation database at `path`
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests
    ///
    /// # Errors
    ///
    /// Returns an error when the schema cannot be created.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS model_rotation (
                api_key TEXT,
                gateway_model TEXT,
                last_model_index INTEGER,
                PRIMARY KEY (api_key, gateway_model)
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Next starting index for the given caller and gateway model
    ///
    /// First use of a key inserts index 0 and returns 0; afterwards the
    /// stored index advances by one with wraparound over `total`. Storage
    /// failures degrade to fixed ordering (index 0) rather than failing the
    /// request.
    pub async fn next_index(&self, caller_key: &str, gateway_model: &str, total: usize) -> usize {
        if total == 0 {
            return 0;
        }

        let conn = Arc::clone(&self.conn);
        let caller_key = caller_key.to_owned();
        let gateway_model = gateway_model.to_owned();

        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            advance(&conn, &caller_key, &gateway_model, total)
        })
        .await;

        match result {
            Ok(Ok(index)) => index,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "rotation store failed, falling back to index 0");
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "rotation task panicked, falling back to index 0");
                0
            }
        }
    }
}

/// Read-modify-write of one cursor row inside a transaction
fn advance(conn: &Connection, caller_key: &str, gateway_model: &str, total: usize) -> rusqlite::Result<usize> {
    let last: Option<usize> = conn
        .query_row(
            "SELECT last_model_index FROM model_rotation WHERE api_key = ?1 AND gateway_model = ?2",
            params![caller_key, gateway_model],
            |row| row.get(0),
        )
        .optional()?;

    match last {
        None => {
            conn.execute(
                "INSERT INTO model_rotation (api_key, gateway_model, last_model_index) VALUES (?1, ?2, 0)",
                params![caller_key, gateway_model],
            )?;
            Ok(0)
        }
        Some(last) => {
            let next = (last + 1) % total;
            conn.execute(
                "UPDATE model_rotation SET last_model_index = ?1 WHERE api_key = ?2 AND gateway_model = ?3",
                params![next, caller_key, gateway_model],
            )?;
            Ok(next)
        }
    }
}
