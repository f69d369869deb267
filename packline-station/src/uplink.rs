//! Central database collaborators: reference lookup and remote writer
//!
//! Both calls are single round trips bounded by short timeouts so an
//! unreachable database degrades the scan path to "cache locally" instead
//! of stalling the operator. Retry policy lives in the reconciler, never
//! here.

use async_trait::async_trait;
use packline_common::config::DbConfig;
use packline_common::record::{BatchReference, OutputRecord};
use packline_common::Result;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single uplink round trip
#[derive(Error, Debug)]
pub enum UplinkError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out")]
    Timeout,
}

/// Resolve a batch code to batch metadata
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// One bounded round trip; `Ok(None)` means the code is unknown.
    async fn lookup_batch(&self, code: &str)
        -> std::result::Result<Option<BatchReference>, UplinkError>;
}

/// Persist records to the central event log
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Insert one record. No internal retries.
    async fn write_record(&self, record: &OutputRecord) -> std::result::Result<(), UplinkError>;

    /// Insert a batch of records in one transaction, all-or-nothing.
    async fn write_batch(&self, records: &[OutputRecord]) -> std::result::Result<(), UplinkError>;
}

/// Production database uplink over MySQL
pub struct MySqlUplink {
    pool: MySqlPool,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl MySqlUplink {
    /// Create a lazy pool; no connection is attempted until first use.
    pub fn connect_lazy(cfg: &DbConfig) -> Result<MySqlUplink> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(cfg.connect_timeout())
            .connect_lazy(&cfg.url)?;
        Ok(MySqlUplink {
            pool,
            read_timeout: cfg.read_timeout(),
            write_timeout: cfg.write_timeout(),
        })
    }
}

const INSERT_OUTPUT_LOG: &str = "INSERT INTO output_log (\
     muf_no, line, fg_no, pack_per_ctn, pack_per_hr, actual_pack, \
     ctn_count, scanned_code, scanned_count, scanned_at, scanned_by, remarks\
     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

#[async_trait]
impl ReferenceLookup for MySqlUplink {
    async fn lookup_batch(
        &self,
        code: &str,
    ) -> std::result::Result<Option<BatchReference>, UplinkError> {
        debug!(muf_no = code, "querying reference table");
        let row = bounded(
            self.read_timeout,
            sqlx::query_as::<_, (String, String, Option<i64>, Option<i64>, Option<i64>)>(
                "SELECT muf_no, fg_no, pack_per_ctn, pack_per_hr, qty_done \
                 FROM main WHERE muf_no = ?",
            )
            .bind(code)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|(muf_no, fg_no, pack_per_ctn, pack_per_hr, qty_done)| {
            BatchReference {
                muf_no,
                fg_no,
                pack_per_ctn,
                pack_per_hr,
                qty_done: qty_done.unwrap_or(0),
            }
        }))
    }
}

#[async_trait]
impl RecordWriter for MySqlUplink {
    async fn write_record(&self, record: &OutputRecord) -> std::result::Result<(), UplinkError> {
        bounded(
            self.write_timeout,
            bind_record(sqlx::query(INSERT_OUTPUT_LOG), record).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn write_batch(&self, records: &[OutputRecord]) -> std::result::Result<(), UplinkError> {
        // The reconciler does not block the operator, so the bound scales
        // with the batch instead of staying at the scan-path timeout.
        let budget = self
            .write_timeout
            .saturating_mul(records.len().max(1) as u32);
        bounded(budget, async {
            let mut tx = self.pool.begin().await?;
            for record in records {
                bind_record(sqlx::query(INSERT_OUTPUT_LOG), record)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await
        })
        .await?;
        Ok(())
    }
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    record: &'q OutputRecord,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    query
        .bind(&record.muf_no)
        .bind(&record.line)
        .bind(&record.fg_no)
        .bind(record.pack_per_ctn)
        .bind(record.pack_per_hr)
        .bind(record.actual_pack)
        .bind(record.ctn_count)
        .bind(&record.scanned_code)
        .bind(record.scanned_count)
        .bind(record.scanned_at)
        .bind(&record.scanned_by)
        .bind(record.remarks.as_str())
}

/// Bound a database future by `dur`, folding both failure shapes into UplinkError.
async fn bounded<T, F>(dur: Duration, fut: F) -> std::result::Result<T, UplinkError>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(UplinkError::Connection(e.to_string())),
        Err(_) => Err(UplinkError::Timeout),
    }
}
