//! rollcall-store — SQLite persistence for finished sessions.
//!
//! When a detection session stops, its ledger is written here so
//! attendance survives the daemon. History is queryable by date,
//! subject, and student id.

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use rollcall_core::{AttendanceRecord, AttendanceStatus};
use rusqlite::params;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("failed to create data directory {0}")]
    DataDir(PathBuf),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Metadata for one finished detection session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub subject_code: String,
    pub subject_name: String,
    pub block: String,
    pub started_at: DateTime<Local>,
    pub stopped_at: Option<DateTime<Local>>,
}

/// One attendance row from history.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub session_id: Uuid,
    pub date: NaiveDate,
    pub student_id: String,
    pub student_name: String,
    pub subject_code: String,
    pub subject_name: String,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    pub status: AttendanceStatus,
    pub uniform: String,
    pub professor: String,
}

/// Optional filters for a history query, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub date: Option<NaiveDate>,
    pub subject_code: Option<String>,
    pub student_id: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    date          TEXT NOT NULL,
    subject_code  TEXT NOT NULL,
    subject_name  TEXT NOT NULL,
    block         TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    stopped_at    TEXT
);
CREATE TABLE IF NOT EXISTS attendance (
    id            TEXT PRIMARY KEY,
    session_id    TEXT NOT NULL REFERENCES sessions(id),
    date          TEXT NOT NULL,
    student_id    TEXT NOT NULL,
    student_name  TEXT NOT NULL,
    subject_code  TEXT NOT NULL,
    subject_name  TEXT NOT NULL,
    time_in       TEXT,
    time_out      TEXT,
    status        TEXT NOT NULL,
    uniform       TEXT NOT NULL,
    professor     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);
CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id);
";

fn status_from_str(s: &str) -> Result<AttendanceStatus, StoreError> {
    match s {
        "present" => Ok(AttendanceStatus::Present),
        "tardy" => Ok(AttendanceStatus::Tardy),
        "absent" => Ok(AttendanceStatus::Absent),
        other => Err(StoreError::CorruptRow(format!("unknown status {other:?}"))),
    }
}

fn parse_time(s: Option<String>, field: &str) -> Result<Option<NaiveTime>, StoreError> {
    s.map(|s| {
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .map_err(|_| StoreError::CorruptRow(format!("bad {field} {s:?}")))
    })
    .transpose()
}

fn fmt_time(t: Option<NaiveTime>) -> Option<String> {
    t.map(|t| t.format("%H:%M:%S").to_string())
}

/// Default database location under the user's data directory.
pub fn default_db_path() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall");
    data_dir.join("attendance.db")
}

/// Async handle to the attendance database.
#[derive(Clone)]
pub struct Store {
    conn: tokio_rusqlite::Connection,
}

impl Store {
    /// Open (creating directories and schema as needed).
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|_| StoreError::DataDir(parent.to_path_buf()))?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init().await?;
        tracing::info!(path = %path.display(), "attendance store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Persist one finished session and its ledger in a transaction.
    pub async fn save_session(
        &self,
        session: SessionRecord,
        records: Vec<AttendanceRecord>,
    ) -> Result<(), StoreError> {
        let count = records.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO sessions (id, date, subject_code, subject_name, block, started_at, stopped_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        session.id.to_string(),
                        session.date.to_string(),
                        session.subject_code,
                        session.subject_name,
                        session.block,
                        session.started_at.to_rfc3339(),
                        session.stopped_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                for r in &records {
                    tx.execute(
                        "INSERT INTO attendance
                         (id, session_id, date, student_id, student_name, subject_code,
                          subject_name, time_in, time_out, status, uniform, professor)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            r.id.to_string(),
                            session.id.to_string(),
                            session.date.to_string(),
                            r.student_id,
                            r.student_name,
                            r.subject_code,
                            r.subject_name,
                            fmt_time(r.time_in),
                            fmt_time(r.time_out),
                            r.status.as_str(),
                            r.uniform,
                            r.professor,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        tracing::info!(records = count, "session persisted");
        Ok(())
    }

    /// Query attendance history; filters combine with AND.
    pub async fn history(&self, filter: HistoryFilter) -> Result<Vec<HistoryRow>, StoreError> {
        type RawRow = (
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
            String,
        );

        let raw: Vec<RawRow> = self
            .conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT session_id, date, student_id, student_name, subject_code,
                            subject_name, time_in, time_out, status, uniform, professor
                     FROM attendance WHERE 1=1",
                );
                let mut args: Vec<String> = Vec::new();
                if let Some(date) = filter.date {
                    sql.push_str(" AND date = ?");
                    args.push(date.to_string());
                }
                if let Some(code) = &filter.subject_code {
                    sql.push_str(" AND subject_code = ?");
                    args.push(code.clone());
                }
                if let Some(id) = &filter.student_id {
                    sql.push_str(" AND student_id = ?");
                    args.push(id.clone());
                }
                sql.push_str(" ORDER BY date, time_in");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                            row.get(9)?,
                            row.get(10)?,
                        ))
                    })?
                    .collect::<Result<Vec<RawRow>, _>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter()
            .map(|row| {
                let (
                    session_id,
                    date,
                    student_id,
                    student_name,
                    subject_code,
                    subject_name,
                    time_in,
                    time_out,
                    status,
                    uniform,
                    professor,
                ) = row;
                Ok(HistoryRow {
                    session_id: session_id
                        .parse()
                        .map_err(|_| StoreError::CorruptRow(format!("bad uuid {session_id:?}")))?,
                    date: date
                        .parse()
                        .map_err(|_| StoreError::CorruptRow(format!("bad date {date:?}")))?,
                    student_id,
                    student_name,
                    subject_code,
                    subject_name,
                    time_in: parse_time(time_in, "time_in")?,
                    time_out: parse_time(time_out, "time_out")?,
                    status: status_from_str(&status)?,
                    uniform,
                    professor,
                })
            })
            .collect()
    }
}
