//! Production database queries backing the summary figures
//!
//! All queries are read-only against `output_log` (the scan event log)
//! and `main` (the batch reference table). TEMPLATE-tagged rows mark the
//! first carton of a session, not produced output, so the aggregation
//! queries exclude them unless the service is configured otherwise.

use chrono::NaiveDateTime;
use sqlx::MySqlPool;

/// Filter clause excluding TEMPLATE-tagged rows from output sums
const EXCLUDE_TEMPLATE_SQL: &str =
    " AND (remarks IS NULL OR LOWER(remarks) NOT LIKE '%template%')";

fn template_filter(include_template: bool) -> &'static str {
    if include_template {
        ""
    } else {
        EXCLUDE_TEMPLATE_SQL
    }
}

/// Latest non-empty batch code recorded for `line`, by insertion order.
pub async fn latest_muf(pool: &MySqlPool, line: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT muf_no FROM output_log \
         WHERE muf_no IS NOT NULL AND muf_no <> '' AND line = ? \
         ORDER BY id DESC LIMIT 1",
    )
    .bind(line)
    .fetch_optional(pool)
    .await
}

/// Total cartons required for the batch, from the reference table.
pub async fn total_carton_needed(pool: &MySqlPool, muf_no: &str) -> Result<i64, sqlx::Error> {
    let qty: Option<Option<i64>> =
        sqlx::query_scalar("SELECT qty_done FROM main WHERE muf_no = ? LIMIT 1")
            .bind(muf_no)
            .fetch_optional(pool)
            .await?;
    Ok(qty.flatten().unwrap_or(0))
}

/// Rate columns from the most recent record of the batch.
pub async fn latest_rates(
    pool: &MySqlPool,
    muf_no: &str,
) -> Result<(Option<i64>, Option<i64>), sqlx::Error> {
    let row: Option<(Option<i64>, Option<i64>)> = sqlx::query_as(
        "SELECT pack_per_ctn, pack_per_hr FROM output_log \
         WHERE muf_no = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(muf_no)
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or((None, None)))
}

/// Cartons recorded for the batch on `line` within `[hour_start, hour_end)`.
pub async fn hourly_output(
    pool: &MySqlPool,
    muf_no: &str,
    line: &str,
    hour_start: NaiveDateTime,
    hour_end: NaiveDateTime,
    include_template: bool,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "SELECT SUM(ctn_count) FROM output_log \
         WHERE muf_no = ? AND line = ? AND scanned_at >= ? AND scanned_at < ?{}",
        template_filter(include_template)
    );
    let sum: Option<Option<i64>> = sqlx::query_scalar(&sql)
        .bind(muf_no)
        .bind(line)
        .bind(hour_start)
        .bind(hour_end)
        .fetch_optional(pool)
        .await?;
    Ok(sum.flatten().unwrap_or(0))
}

/// Total cartons recorded for the batch across all time.
pub async fn total_done(
    pool: &MySqlPool,
    muf_no: &str,
    include_template: bool,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "SELECT SUM(ctn_count) FROM output_log WHERE muf_no = ?{}",
        template_filter(include_template)
    );
    let sum: Option<Option<i64>> = sqlx::query_scalar(&sql)
        .bind(muf_no)
        .fetch_optional(pool)
        .await?;
    Ok(sum.flatten().unwrap_or(0))
}
