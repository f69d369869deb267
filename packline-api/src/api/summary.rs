//! Line summary endpoint
//!
//! `GET /summary/:line` aggregates the six figures the display panel
//! renders: the work-in-progress batch, total and balance carton counts,
//! the hourly target and the measured output of the current clock hour.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Local, Timelike};
use serde::Serialize;
use tracing::{debug, error};

use crate::{db, AppState};

/// Summary figures for one production line
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub muf_no: String,
    pub total_carton_needed: i64,
    pub target_hour: i64,
    pub avg_hourly_output: i64,
    pub balance_carton: i64,
    pub balance_hours: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /summary/:line
pub async fn get_summary(
    State(state): State<AppState>,
    Path(line): Path<String>,
) -> Result<Json<SummaryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let muf_no = db::latest_muf(&state.db, &line)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "No WIP muf_no found".to_string(),
                }),
            )
        })?;

    let include_template = state.include_template_in_balance;
    let now = Local::now().naive_local();
    let hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let hour_end = hour_start + Duration::hours(1);

    let total_needed = db::total_carton_needed(&state.db, &muf_no)
        .await
        .map_err(internal)?;
    let (pack_per_ctn, pack_per_hr) = db::latest_rates(&state.db, &muf_no)
        .await
        .map_err(internal)?;
    let hourly = db::hourly_output(&state.db, &muf_no, &line, hour_start, hour_end, include_template)
        .await
        .map_err(internal)?;
    let total_done = db::total_done(&state.db, &muf_no, include_template)
        .await
        .map_err(internal)?;

    let balance = total_needed - total_done;
    let response = SummaryResponse {
        muf_no,
        total_carton_needed: total_needed,
        target_hour: target_per_hour(pack_per_ctn, pack_per_hr),
        avg_hourly_output: hourly,
        balance_carton: balance,
        balance_hours: balance_hours(balance, pack_per_ctn, pack_per_hr),
    };
    debug!(line = %line, ?response, "summary served");
    Ok(Json(response))
}

fn internal(e: sqlx::Error) -> (StatusCode, Json<ErrorResponse>) {
    error!("summary query failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "database unavailable".to_string(),
        }),
    )
}

/// Hourly carton target: units-per-hour over units-per-carton, rounded to
/// the nearest whole carton. Zero when either rate is missing or zero.
pub fn target_per_hour(pack_per_ctn: Option<i64>, pack_per_hr: Option<i64>) -> i64 {
    match (pack_per_ctn, pack_per_hr) {
        (Some(ctn), Some(hr)) if ctn > 0 && hr > 0 => {
            (hr as f64 / ctn as f64).round() as i64
        }
        _ => 0,
    }
}

/// Hours of work left in the batch at the target rate, one decimal place.
/// Zero when rate data is missing or non-positive.
pub fn balance_hours(balance_cartons: i64, pack_per_ctn: Option<i64>, pack_per_hr: Option<i64>) -> f64 {
    let ctn = pack_per_ctn.unwrap_or(0);
    let hr = pack_per_hr.unwrap_or(0);
    if ctn <= 0 || hr <= 0 {
        return 0.0;
    }
    let hours = (balance_cartons as f64 * ctn as f64) / hr as f64;
    (hours * 10.0).round() / 10.0
}
