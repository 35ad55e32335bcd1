use std::path::Path;
use std::sync::{Arc, Mutex};

use jiff::{SignedDuration, Timestamp};
use rusqlite::{Connection, params};
use serde::Serialize;
use tokio::sync::mpsc;

/// One token-usage observation, produced once per completed request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    /// Completion tokens excluding reasoning output
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    /// Provider-reported cost in USD, forwarded as-is
    pub cost: f64,
    /// Provider model that actually served the request
    pub model: String,
    pub provider: String,
}

/// A persisted usage row
#[derive(Debug, Clone, Serialize)]
pub struct UsageRow {
    pub id: i64,
    pub timestamp: String,
    #[serde(flatten)]
    pub record: UsageRecord,
}

/// Aggregated usage for one period bucket and model
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedUsage {
    pub time_period: String,
    pub model: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub reasoning_tokens: u64,
    pub cached_tokens: u64,
    pub cost: f64,
}

/// Aggregation bucket for the stats API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl UsagePeriod {
    /// Parse the URL path segment used by the stats API
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    const fn date_format(self) -> &'static str {
        match self {
            Self::Hour => "%Y-%m-%d %H:00:00",
            Self::Day => "%Y-%m-%d",
            Self::Week => "%Y-W%W",
            Self::Month => "%Y-%m",
        }
    }

    /// How far back the aggregation looks
    const fn lookback(self) -> SignedDuration {
        match self {
            Self::Hour => SignedDuration::from_hours(24),
            Self::Day => SignedDuration::from_hours(2 * 7 * 24),
            Self::Week => SignedDuration::from_hours(15 * 7 * 24),
            Self::Month => SignedDuration::from_hours(365 * 24),
        }
    }
}

/// Append-only token-usage log backed by SQLite
#[derive(Clone)]
pub struct UsageStore {
    conn: Arc<Mutex<Connection>>,
}

impl UsageStore {
    /// Open (or create) the usage database at `path`
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
            "CREATE TABLE IF NOT EXISTS tokens_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                prompt_tokens INTEGER DEFAULT 0,
                completion_tokens INTEGER DEFAULT 0,
                total_tokens INTEGER DEFAULT 0,
                reasoning_tokens INTEGER DEFAULT 0,
                cached_tokens INTEGER DEFAULT 0,
                cost REAL DEFAULT 0.0,
                model TEXT,
                provider TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tokens_usage_timestamp ON tokens_usage (timestamp);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert one usage record, stamped with the current time
    pub async fn insert(&self, record: UsageRecord) {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let timestamp = Timestamp::now().strftime("%Y-%m-%dT%H:%M:%SZ").to_string();
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            conn.execute(
                "INSERT INTO tokens_usage
                 (timestamp, prompt_tokens, completion_tokens, total_tokens,
                  reasoning_tokens, cached_tokens, cost, model, provider)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    timestamp,
                    to_sql_count(record.prompt_tokens),
                    to_sql_count(record.completion_tokens),
                    to_sql_count(record.total_tokens),
                    to_sql_count(record.reasoning_tokens),
                    to_sql_count(record.cached_tokens),
                    record.cost,
                    record.model,
                    record.provider,
                ],
            )
        })
        .await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "failed to insert usage record"),
            Err(e) => tracing::error!(error = %e, "usage insert task panicked"),
        }
    }

    /// Latest usage rows, newest first
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn latest(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<UsageRow>> {
        let conn = Arc::clone(&self.conn);
        let rows = tokio::task::spawn_blocking(move || -> rusqlite::Result<Vec<UsageRow>> {
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, prompt_tokens, completion_tokens, total_tokens,
                        reasoning_tokens, cached_tokens, cost, model, provider
                 FROM tokens_usage
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit, offset], |row| {
                    Ok(UsageRow {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        record: UsageRecord {
                            prompt_tokens: from_sql_count(row.get(2)?),
                            completion_tokens: from_sql_count(row.get(3)?),
                            total_tokens: from_sql_count(row.get(4)?),
                            reasoning_tokens: from_sql_count(row.get(5)?),
                            cached_tokens: from_sql_count(row.get(6)?),
                            cost: row.get(7)?,
                            model: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                            provider: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                        },
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await??;

        Ok(rows)
    }

    /// Total number of persisted usage rows
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn count(&self) -> anyhow::Result<u64> {
        let conn = Arc::clone(&self.conn);
        let count: i64 = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            conn.query_row("SELECT COUNT(*) FROM tokens_usage", [], |row| row.get(0))
        })
        .await??;
        Ok(from_sql_count(count))
    }

    /// Usage summed per period bucket and model within the period's lookback
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn aggregated(&self, period: UsagePeriod) -> anyhow::Result<Vec<AggregatedUsage>> {
        let conn = Arc::clone(&self.conn);
        let cutoff = (Timestamp::now() - period.lookback())
            .strftime("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let rows = tokio::task::spawn_blocking(move || -> rusqlite::Result<Vec<AggregatedUsage>> {
            let conn = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let sql = format!(
                "SELECT strftime('{}', timestamp) AS time_period, model,
                        SUM(prompt_tokens), SUM(completion_tokens), SUM(total_tokens),
                        SUM(reasoning_tokens), SUM(cached_tokens), SUM(cost)
                 FROM tokens_usage
                 WHERE timestamp >= ?1
                 GROUP BY time_period, model
                 ORDER BY time_period DESC, model ASC",
                period.date_format()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![cutoff], |row| {
                    Ok(AggregatedUsage {
                        time_period: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        model: row.get(1)?,
                        prompt_tokens: from_sql_count(row.get(2)?),
                        completion_tokens: from_sql_count(row.get(3)?),
                        total_tokens: from_sql_count(row.get(4)?),
                        reasoning_tokens: from_sql_count(row.get(5)?),
                        cached_tokens: from_sql_count(row.get(6)?),
                        cost: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await??;

        Ok(rows)
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Handle the request path uses to emit usage records without blocking
///
/// Records are queued onto an unbounded channel drained by a background
/// writer task, so emission is safe from synchronous contexts (stream drops
/// included).
#[derive(Clone)]
pub struct UsageSink {
    tx: mpsc::UnboundedSender<UsageRecord>,
}

impl UsageSink {
    /// Spawn the writer task and return the sink feeding it
    pub fn spawn(store: UsageStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageRecord>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                store.insert(record).await;
            }
        });
        Self { tx }
    }

    /// Sink plus the raw receiver, for tests observing emitted records
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UsageRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one record; never blocks, never fails the request
    pub fn record(&self, record: UsageRecord) {
        if self.tx.send(record).is_err() {
            tracing::warn!("usage writer stopped, dropping usage record");
        }
    }
}
