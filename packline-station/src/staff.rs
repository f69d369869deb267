//! Staff identity collaborator
//!
//! Badge scans are a side-channel: they validate an operator id against the
//! staff directory and toggle the operator IN/OUT on this line. The main
//! scan session is never touched by this flow beyond the `operator` field.
//! Attendance and shift bookkeeping belong to the allocation system, not
//! this station.

use async_trait::async_trait;
use packline_common::config::DbConfig;
use packline_common::Result;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::debug;

use crate::uplink::UplinkError;

/// Directory row for one staff member
#[derive(Debug, Clone)]
pub struct StaffProfile {
    pub staff_id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    pub factory: String,
}

/// Clock state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffStatus {
    In,
    Out,
}

/// Validate and toggle operator identities
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    /// `Ok(None)` means the id is unknown (or ambiguous under the
    /// duplicate-id policy); both are ordinary rejections.
    async fn validate(&self, staff_id: &str)
        -> std::result::Result<Option<StaffProfile>, UplinkError>;

    /// Flip the operator IN/OUT on `line`.
    async fn toggle(
        &self,
        profile: &StaffProfile,
        line: &str,
    ) -> std::result::Result<StaffStatus, UplinkError>;
}

/// Staff directory over the allocation MySQL database
pub struct MySqlStaffDirectory {
    pool: MySqlPool,
    home_factory: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl MySqlStaffDirectory {
    pub fn connect_lazy(cfg: &DbConfig, home_factory: &str) -> Result<MySqlStaffDirectory> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(cfg.connect_timeout())
            .connect_lazy(&cfg.url)?;
        Ok(MySqlStaffDirectory {
            pool,
            home_factory: home_factory.to_string(),
            read_timeout: cfg.read_timeout(),
            write_timeout: cfg.write_timeout(),
        })
    }
}

#[async_trait]
impl StaffDirectory for MySqlStaffDirectory {
    async fn validate(
        &self,
        staff_id: &str,
    ) -> std::result::Result<Option<StaffProfile>, UplinkError> {
        let rows = bounded(
            self.read_timeout,
            sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<String>)>(
                "SELECT staffid, staffname, staffpos, staffdept, factory \
                 FROM staff_list WHERE UPPER(staffid) = ?",
            )
            .bind(staff_id)
            .fetch_all(&self.pool),
        )
        .await?;

        debug!(staff_id, rows = rows.len(), "staff directory lookup");

        let profiles: Vec<StaffProfile> = rows
            .into_iter()
            .map(|(staff_id, name, position, department, factory)| StaffProfile {
                staff_id,
                name,
                position: position.unwrap_or_default(),
                department: department.unwrap_or_default(),
                factory: factory.unwrap_or_default(),
            })
            .collect();

        match profiles.len() {
            0 => Ok(None),
            1 => Ok(profiles.into_iter().next()),
            // Duplicate ids exist in the directory; accept only the row
            // belonging to this station's home factory.
            _ => Ok(profiles
                .into_iter()
                .find(|p| p.factory.trim().eq_ignore_ascii_case(&self.home_factory))),
        }
    }

    async fn toggle(
        &self,
        profile: &StaffProfile,
        line: &str,
    ) -> std::result::Result<StaffStatus, UplinkError> {
        let staff_id = profile.staff_id.to_uppercase();
        let prev: Option<(Option<String>,)> = bounded(
            self.read_timeout,
            sqlx::query_as("SELECT status FROM allocation_temp WHERE staffid = ? LIMIT 1")
                .bind(&staff_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        let exists = prev.is_some();
        let was_in = prev
            .and_then(|(status,)| status)
            .map(|s| s.trim().eq_ignore_ascii_case("IN"))
            .unwrap_or(false);
        let next = if was_in { StaffStatus::Out } else { StaffStatus::In };
        let status = match next {
            StaffStatus::In => "IN",
            StaffStatus::Out => "OUT",
        };

        if exists {
            bounded(
                self.write_timeout,
                sqlx::query(
                    "UPDATE allocation_temp \
                     SET line = ?, staffname = ?, staffpos = ?, staffdept = ?, \
                         status = ?, remark = '', created_date = CURDATE() \
                     WHERE staffid = ?",
                )
                .bind(line)
                .bind(&profile.name)
                .bind(&profile.position)
                .bind(&profile.department)
                .bind(status)
                .bind(&staff_id)
                .execute(&self.pool),
            )
            .await?;
        } else {
            bounded(
                self.write_timeout,
                sqlx::query(
                    "INSERT INTO allocation_temp (\
                     staffid, line, staffname, staffpos, staffdept, \
                     status, remark, created_date\
                     ) VALUES (?, ?, ?, ?, ?, ?, '', CURDATE())",
                )
                .bind(&staff_id)
                .bind(line)
                .bind(&profile.name)
                .bind(&profile.position)
                .bind(&profile.department)
                .bind(status)
                .execute(&self.pool),
            )
            .await?;
        }

        debug!(staff_id = %staff_id, status, "staff toggled");
        Ok(next)
    }
}

async fn bounded<T, F>(dur: Duration, fut: F) -> std::result::Result<T, UplinkError>
where
    F: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(UplinkError::Connection(e.to_string())),
        Err(_) => Err(UplinkError::Timeout),
    }
}
