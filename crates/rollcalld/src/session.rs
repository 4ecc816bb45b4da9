//! The live-detection session controller.
//!
//! Owns the attendance ledger for the current run and drives two timers
//! while a session is active: the detection tick loop (grab frame, post
//! to the service, apply the result) and the absence sweep. Each tick
//! awaits its own request to completion, so requests never overlap and
//! cancellation drops any in-flight response before the ledger closes.

use crate::capture::{spawn_capture, CaptureError, CaptureHandle, JpegFrame};
use crate::config::Config;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use rollcall_client::{ClientError, DetectOutcome, DetectionClient};
use rollcall_core::export::{export_csv, export_filename, ExportError, ExportView};
use rollcall_core::{
    resolve_current, AttendanceRecord, LedgerError, LedgerSummary, RecognitionOutcome,
    RecordPatch, RosterEntry, Schedule, SessionLedger, TardyRule,
};
use rollcall_store::{SessionRecord, Store};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("no session has been started")]
    NotActive,
    #[error("session is not running")]
    NotRunning,
    #[error("session is not paused")]
    NotPaused,
    #[error("no schedule is in session right now; pass a schedule id")]
    NoScheduleMatch,
    #[error("unknown schedule id {0}")]
    UnknownSchedule(i64),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Run phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Starting,
    Running,
    Paused,
    Stopped,
}

/// Status snapshot returned over the bus.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub schedule: Option<Schedule>,
    pub tardy_rule: Option<TardyRule>,
    pub started_at: Option<String>,
    pub ticks: u64,
    pub detect_failures: u64,
    pub recognitions: u64,
    pub summary: Option<LedgerSummary>,
    pub last_error: Option<String>,
}

struct SessionState {
    phase: SessionPhase,
    ledger: Option<SessionLedger>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Local>>,
    ticks: u64,
    detect_failures: u64,
    recognitions: u64,
    last_error: Option<String>,
    /// Latest frame with the overlay composited, JPEG-encoded.
    snapshot: Option<Vec<u8>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            ledger: None,
            session_id: None,
            started_at: None,
            ticks: 0,
            detect_failures: 0,
            recognitions: 0,
            last_error: None,
            snapshot: None,
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            schedule: self.ledger.as_ref().map(|l| l.schedule().clone()),
            tardy_rule: self.ledger.as_ref().map(|l| l.rule()),
            started_at: self.started_at.map(|t| t.to_rfc3339()),
            ticks: self.ticks,
            detect_failures: self.detect_failures,
            recognitions: self.recognitions,
            summary: self.ledger.as_ref().map(|l| l.summary()),
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionController {
    cfg: Arc<Config>,
    client: Arc<DetectionClient>,
    store: Store,
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    capture: Arc<Mutex<Option<CaptureHandle>>>,
}

impl SessionController {
    pub fn new(cfg: Config, client: DetectionClient, store: Store) -> Self {
        Self {
            cfg: Arc::new(cfg),
            client: Arc::new(client),
            store,
            state: Arc::new(Mutex::new(SessionState::new())),
            cancel: Arc::new(Mutex::new(None)),
            capture: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a session: fetch schedules, resolve or look up the class,
    /// acquire the camera, then launch the tick and sweep loops.
    pub async fn start(
        &self,
        schedule_id: Option<i64>,
        rule: Option<TardyRule>,
    ) -> Result<SessionStatus, SessionError> {
        {
            let mut st = self.state.lock().await;
            if matches!(
                st.phase,
                SessionPhase::Starting | SessionPhase::Running | SessionPhase::Paused
            ) {
                return Err(SessionError::AlreadyActive);
            }
            st.phase = SessionPhase::Starting;
        }

        match self.do_start(schedule_id, rule).await {
            Ok(status) => Ok(status),
            Err(e) => {
                let mut st = self.state.lock().await;
                st.phase = SessionPhase::Idle;
                st.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn do_start(
        &self,
        schedule_id: Option<i64>,
        rule: Option<TardyRule>,
    ) -> Result<SessionStatus, SessionError> {
        let schedules = self.client.fetch_schedules().await?;
        let now = Local::now();
        let schedule = match schedule_id {
            Some(id) => schedules
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or(SessionError::UnknownSchedule(id))?,
            None => resolve_current(&schedules, &now)
                .cloned()
                .ok_or(SessionError::NoScheduleMatch)?,
        };

        let capture = spawn_capture(
            &self.cfg.camera_device,
            self.cfg.warmup_frames,
            self.cfg.jpeg_quality,
        )?;

        let rule = rule.unwrap_or(self.cfg.tardy_rule);
        let token = CancellationToken::new();
        let session_id = Uuid::new_v4();

        let status = {
            let mut st = self.state.lock().await;
            st.phase = SessionPhase::Running;
            st.ledger = Some(SessionLedger::new(schedule.clone(), rule));
            st.session_id = Some(session_id);
            st.started_at = Some(now);
            st.ticks = 0;
            st.detect_failures = 0;
            st.recognitions = 0;
            st.last_error = None;
            st.snapshot = None;
            st.status()
        };

        *self.cancel.lock().await = Some(token.clone());
        *self.capture.lock().await = Some(capture.clone());

        tokio::spawn(detection_loop(
            self.state.clone(),
            capture,
            self.client.clone(),
            self.cfg.capture_interval_ms,
            token.clone(),
        ));
        tokio::spawn(sweep_loop(
            self.state.clone(),
            self.cfg.sweep_interval_secs,
            token,
        ));

        info!(
            session = %session_id,
            schedule = %schedule.label(),
            tardy = %rule,
            "session started"
        );
        Ok(status)
    }

    /// Pause: ticks keep firing but perform no capture and no fetch.
    pub async fn pause(&self) -> Result<(), SessionError> {
        let mut st = self.state.lock().await;
        if st.phase != SessionPhase::Running {
            return Err(SessionError::NotRunning);
        }
        st.phase = SessionPhase::Paused;
        info!("session paused");
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        let mut st = self.state.lock().await;
        if st.phase != SessionPhase::Paused {
            return Err(SessionError::NotPaused);
        }
        st.phase = SessionPhase::Running;
        info!("session resumed");
        Ok(())
    }

    /// Stop the session: cancel both loops, release the camera, stamp
    /// time-outs, and persist the ledger. Records stay available for
    /// edit and export until the next start.
    pub async fn stop(&self) -> Result<SessionStatus, SessionError> {
        {
            let mut st = self.state.lock().await;
            if !matches!(st.phase, SessionPhase::Running | SessionPhase::Paused) {
                return Err(SessionError::NotActive);
            }
            st.phase = SessionPhase::Stopped;
        }

        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        // Dropping the handle closes the channel and releases the camera.
        self.capture.lock().await.take();

        let stopped_at = Local::now();
        let (status, session, records) = {
            let mut st = self.state.lock().await;
            let stamped = match st.ledger.as_mut() {
                Some(ledger) => ledger.close(stopped_at.time()),
                None => 0,
            };
            info!(stamped, "session closed; time-outs stamped");

            let session_id = st.session_id.unwrap_or_else(Uuid::new_v4);
            let started_at = st.started_at;
            let (session, records) = match st.ledger.as_ref() {
                Some(ledger) => {
                    let schedule = ledger.schedule();
                    let session = SessionRecord {
                        id: session_id,
                        date: started_at
                            .map(|t| t.date_naive())
                            .unwrap_or_else(|| stopped_at.date_naive()),
                        subject_code: schedule.subject_code.clone(),
                        subject_name: schedule.subject_name.clone(),
                        block: schedule.block.clone(),
                        started_at: started_at.unwrap_or(stopped_at),
                        stopped_at: Some(stopped_at),
                    };
                    (Some(session), ledger.records().to_vec())
                }
                None => (None, Vec::new()),
            };
            (st.status(), session, records)
        };

        match session {
            Some(session) if !records.is_empty() => {
                if let Err(e) = self.store.save_session(session, records).await {
                    // Persistence failure degrades; the ledger is still in memory.
                    warn!(error = %e, "failed to persist session");
                }
            }
            _ => debug!("empty ledger; nothing persisted"),
        }

        info!("session stopped");
        Ok(status)
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status()
    }

    pub async fn records(&self, query: &str) -> Result<Vec<AttendanceRecord>, SessionError> {
        let st = self.state.lock().await;
        let ledger = st.ledger.as_ref().ok_or(SessionError::NotActive)?;
        Ok(ledger.search(query).into_iter().cloned().collect())
    }

    pub async fn edit_record(&self, id: Uuid, patch: RecordPatch) -> Result<(), SessionError> {
        let mut st = self.state.lock().await;
        let ledger = st.ledger.as_mut().ok_or(SessionError::NotActive)?;
        ledger.edit(id, patch)?;
        info!(record = %id, "record edited");
        Ok(())
    }

    pub async fn delete_record(&self, id: Uuid) -> Result<(), SessionError> {
        let mut st = self.state.lock().await;
        let ledger = st.ledger.as_mut().ok_or(SessionError::NotActive)?;
        let record = ledger.delete(id)?;
        info!(record = %id, student = %record.student_name, "record deleted");
        Ok(())
    }

    pub async fn seed_roster(&self, entries: Vec<RosterEntry>) -> Result<usize, SessionError> {
        let mut st = self.state.lock().await;
        let ledger = st.ledger.as_mut().ok_or(SessionError::NotActive)?;
        let seeded = ledger.seed_roster(entries);
        info!(seeded, "roster seeded");
        Ok(seeded)
    }

    /// Export the ledger; returns `(filename, csv)`.
    pub async fn export(&self, view: ExportView) -> Result<(String, String), SessionError> {
        let st = self.state.lock().await;
        let ledger = st.ledger.as_ref().ok_or(SessionError::NotActive)?;
        let csv = export_csv(ledger.records(), view)?;
        let filename = export_filename(view, Local::now().date_naive());
        Ok((filename, csv))
    }

    pub async fn snapshot(&self) -> Option<Vec<u8>> {
        self.state.lock().await.snapshot.clone()
    }
}

/// The detection tick loop. Ticks are wall-clock spaced but coalesced
/// (MissedTickBehavior::Delay) and each awaits its request, so a slow
/// service stretches the effective period instead of piling up
/// requests.
async fn detection_loop(
    state: Arc<Mutex<SessionState>>,
    capture: CaptureHandle,
    client: Arc<DetectionClient>,
    interval_ms: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(100)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("detection loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let schedule_id = {
                    let st = state.lock().await;
                    match st.phase {
                        SessionPhase::Paused => continue,
                        SessionPhase::Running => {}
                        _ => break,
                    }
                    st.ledger.as_ref().map(|l| l.schedule().id)
                };

                let frame = match capture.grab().await {
                    Ok(frame) => {
                        debug!(
                            bytes = frame.jpeg.len(),
                            width = frame.width,
                            height = frame.height,
                            "frame captured"
                        );
                        frame
                    }
                    Err(e) => {
                        warn!(error = %e, "frame grab failed; skipping tick");
                        let mut st = state.lock().await;
                        st.ticks += 1;
                        st.detect_failures += 1;
                        st.last_error = Some(e.to_string());
                        continue;
                    }
                };

                match client.detect(&frame.jpeg, schedule_id).await {
                    Ok(outcome) => {
                        let snapshot = render_snapshot(&frame, &outcome);
                        apply_outcome(&state, outcome, snapshot).await;
                    }
                    Err(e) => {
                        match &e {
                            ClientError::Timeout => {
                                warn!("detection request timed out; skipping tick")
                            }
                            other => warn!(error = %other, "detection request failed; skipping tick"),
                        }
                        let mut st = state.lock().await;
                        st.ticks += 1;
                        st.detect_failures += 1;
                        st.last_error = Some(e.to_string());
                    }
                }
            }
        }
    }
}

/// Fold one successful tick into the session state. A session that was
/// paused or stopped while the request was in flight discards the
/// result.
async fn apply_outcome(
    state: &Arc<Mutex<SessionState>>,
    outcome: DetectOutcome,
    snapshot: Option<Vec<u8>>,
) {
    let mut guard = state.lock().await;
    let st = &mut *guard;
    if st.phase != SessionPhase::Running {
        return;
    }
    st.ticks += 1;

    if let (Some(ledger), Some(student)) = (st.ledger.as_mut(), outcome.recognized.as_ref()) {
        let uniform = outcome.uniform_status.clone().unwrap_or_default();
        let result = ledger.record_recognition(
            &student.name,
            student.student_id.as_deref().unwrap_or(""),
            &uniform,
            Local::now().time(),
        );
        match result {
            RecognitionOutcome::Recorded(id) => {
                st.recognitions += 1;
                info!(student = %student.name, record = %id, "attendance recorded");
            }
            RecognitionOutcome::AlreadyRecorded => {
                debug!(student = %student.name, "already recorded this session");
            }
            RecognitionOutcome::Ignored => {}
        }
    }

    if snapshot.is_some() {
        st.snapshot = snapshot;
    }
}

/// Decode the frame, draw the overlay, and re-encode for the snapshot.
fn render_snapshot(frame: &JpegFrame, outcome: &DetectOutcome) -> Option<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(&frame.jpeg, ImageFormat::Jpeg)
        .ok()?
        .to_rgb8();
    let face = outcome
        .recognized
        .as_ref()
        .and_then(|s| s.face_bbox.as_ref().map(|b| (b, s.name.as_str())));
    let canvas = rollcall_core::overlay::render_overlay(
        decoded.width(),
        decoded.height(),
        &outcome.detections,
        face,
    );
    let mut composed = decoded;
    rollcall_core::overlay::composite(&mut composed, &canvas);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 80)
        .encode(
            composed.as_raw(),
            composed.width(),
            composed.height(),
            ExtendedColorType::Rgb8,
        )
        .ok()?;
    Some(out)
}

/// Periodic absence sweep: flip seeded records past the tardy cutoff.
async fn sweep_loop(state: Arc<Mutex<SessionState>>, interval_secs: u64, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("absence sweep shutting down");
                break;
            }
            _ = ticker.tick() => {
                let mut st = state.lock().await;
                if !matches!(st.phase, SessionPhase::Running | SessionPhase::Paused) {
                    break;
                }
                if let Some(ledger) = st.ledger.as_mut() {
                    let flipped = ledger.sweep_absent(Local::now().time());
                    if flipped > 0 {
                        info!(flipped, "absence sweep marked students absent");
                    }
                }
            }
        }
    }
}
