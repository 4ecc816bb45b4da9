use crate::session::{SessionController, SessionError};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use rollcall_core::export::ExportView;
use rollcall_core::{RecordPatch, RosterEntry};
use uuid::Uuid;
use zbus::interface;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.campus.Rollcall1
/// Object path: /org/campus/Rollcall1
pub struct RollcallService {
    controller: SessionController,
}

impl RollcallService {
    pub fn new(controller: SessionController) -> Self {
        Self { controller }
    }
}

fn failed(e: SessionError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn invalid(msg: impl Into<String>) -> zbus::fdo::Error {
    zbus::fdo::Error::InvalidArgs(msg.into())
}

fn parse_uuid(id: &str) -> zbus::fdo::Result<Uuid> {
    id.parse().map_err(|_| invalid(format!("bad record id {id:?}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.campus.Rollcall1")]
impl RollcallService {
    /// Start a detection session. `schedule_id` 0 auto-resolves the
    /// current class; an empty `tardy` uses the configured rule.
    /// Returns the session status as JSON.
    async fn start(&self, schedule_id: i64, tardy: &str) -> zbus::fdo::Result<String> {
        let schedule = (schedule_id != 0).then_some(schedule_id);
        let rule = if tardy.is_empty() {
            None
        } else {
            Some(tardy.parse().map_err(|_| invalid(format!("bad tardy rule {tardy:?}")))?)
        };
        let status = self.controller.start(schedule, rule).await.map_err(failed)?;
        to_json(&status)
    }

    async fn pause(&self) -> zbus::fdo::Result<()> {
        self.controller.pause().await.map_err(failed)
    }

    async fn resume(&self) -> zbus::fdo::Result<()> {
        self.controller.resume().await.map_err(failed)
    }

    /// Stop the session and persist the ledger. Returns the final
    /// status as JSON.
    async fn stop(&self) -> zbus::fdo::Result<String> {
        let status = self.controller.stop().await.map_err(failed)?;
        to_json(&status)
    }

    /// Session status as JSON: phase, schedule, counters, summary.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.controller.status().await)
    }

    /// Ledger records matching a free-text query (empty = all), JSON.
    async fn records(&self, query: &str) -> zbus::fdo::Result<String> {
        let records = self.controller.records(query).await.map_err(failed)?;
        to_json(&records)
    }

    /// Apply a JSON [`RecordPatch`] to a record.
    async fn edit_record(&self, id: &str, patch: &str) -> zbus::fdo::Result<bool> {
        let id = parse_uuid(id)?;
        let patch: RecordPatch =
            serde_json::from_str(patch).map_err(|e| invalid(format!("bad patch: {e}")))?;
        self.controller.edit_record(id, patch).await.map_err(failed)?;
        Ok(true)
    }

    async fn delete_record(&self, id: &str) -> zbus::fdo::Result<bool> {
        let id = parse_uuid(id)?;
        self.controller.delete_record(id).await.map_err(failed)?;
        Ok(true)
    }

    /// Pre-allocate ledger records from a JSON roster
    /// (`[{"name": ..., "student_id": ...}]`). Returns how many were
    /// seeded.
    async fn seed_roster(&self, roster: &str) -> zbus::fdo::Result<u32> {
        let entries: Vec<RosterEntry> =
            serde_json::from_str(roster).map_err(|e| invalid(format!("bad roster: {e}")))?;
        let seeded = self.controller.seed_roster(entries).await.map_err(failed)?;
        Ok(seeded as u32)
    }

    /// Export the ledger as CSV. `view` is "uniform" or "timelog".
    /// Returns JSON `{"filename": ..., "content": ...}`.
    async fn export_csv(&self, view: &str) -> zbus::fdo::Result<String> {
        let view: ExportView = view.parse().map_err(|_| invalid(format!("bad view {view:?}")))?;
        let (filename, content) = self.controller.export(view).await.map_err(failed)?;
        to_json(&serde_json::json!({ "filename": filename, "content": content }))
    }

    /// Latest overlay snapshot as base64 JPEG; empty before the first
    /// successful tick.
    async fn snapshot(&self) -> zbus::fdo::Result<String> {
        Ok(self
            .controller
            .snapshot()
            .await
            .map(|jpeg| BASE64_STANDARD.encode(jpeg))
            .unwrap_or_default())
    }
}
