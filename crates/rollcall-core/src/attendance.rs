//! Attendance status, tardiness rules, and the per-student record.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Attendance classification for one student in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Tardy,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Tardy => "tardy",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the tardy cutoff is derived from the class start time.
///
/// Parsed from and rendered as a short string: a bare number of minutes
/// ("15"), the literal "none", or a clock time ("08:30").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TardyRule {
    /// Tardy after `start + minutes`.
    AfterMinutes(u32),
    /// No tardy marking is ever applied.
    Never,
    /// Custom clock-time target, applied as a minute offset from start.
    AtTime(NaiveTime),
}

impl TardyRule {
    /// The cutoff instant for this rule, or `None` when tardiness is
    /// never marked. An `AtTime` target earlier than start yields a
    /// cutoff already in the past (everything after start is tardy).
    pub fn cutoff(&self, start: NaiveTime) -> Option<NaiveTime> {
        match self {
            TardyRule::Never => None,
            TardyRule::AfterMinutes(m) => Some(start + Duration::minutes(i64::from(*m))),
            TardyRule::AtTime(t) => {
                let offset = t.signed_duration_since(start);
                Some(start + offset)
            }
        }
    }

    /// Classify a recognition at `now` against a class starting at
    /// `start`. Exactly at the cutoff still counts as present.
    pub fn classify(&self, now: NaiveTime, start: NaiveTime) -> AttendanceStatus {
        match self.cutoff(start) {
            None => AttendanceStatus::Present,
            Some(cutoff) if now > cutoff => AttendanceStatus::Tardy,
            Some(_) => AttendanceStatus::Present,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid tardy rule {0:?}: expected minutes, \"none\", or HH:MM")]
pub struct ParseTardyRuleError(String);

impl FromStr for TardyRule {
    type Err = ParseTardyRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(TardyRule::Never);
        }
        if let Ok(minutes) = s.parse::<u32>() {
            return Ok(TardyRule::AfterMinutes(minutes));
        }
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(TardyRule::AtTime)
            .map_err(|_| ParseTardyRuleError(s.to_string()))
    }
}

impl TryFrom<String> for TardyRule {
    type Error = ParseTardyRuleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TardyRule> for String {
    fn from(rule: TardyRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for TardyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TardyRule::AfterMinutes(m) => write!(f, "{m}"),
            TardyRule::Never => f.write_str("none"),
            TardyRule::AtTime(t) => write!(f, "{}", t.format("%H:%M")),
        }
    }
}

/// One student's attendance row for the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub subject_code: String,
    pub subject_name: String,
    /// Set on first recognition; immutable afterwards.
    pub time_in: Option<NaiveTime>,
    /// Set when the session stops (present/tardy records only).
    pub time_out: Option<NaiveTime>,
    pub status: AttendanceStatus,
    /// Uniform compliance as reported by the detection service,
    /// e.g. "Complete" or "Missing ID card".
    pub uniform: String,
    pub professor: String,
}

/// Partial update applied to a record through the edit form.
///
/// Absent fields are left untouched. `time_in` only applies to a record
/// that does not have one yet; a set time-in is immutable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub subject_code: Option<String>,
    pub subject_name: Option<String>,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    pub status: Option<AttendanceStatus>,
    pub uniform: Option<String>,
    pub professor: Option<String>,
}
