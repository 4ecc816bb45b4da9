//! CSV export of the session ledger.
//!
//! Two fixed column layouts: the uniform-compliance view and the
//! time-in/out view. Every field is quoted; an empty ledger is rejected
//! rather than producing an empty file.

use crate::attendance::AttendanceRecord;
use chrono::{NaiveDate, NaiveTime};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no records to export")]
    NoRecords,
}

/// Which of the two fixed column layouts to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportView {
    /// Student id, name, subject, uniform status, professor.
    Uniform,
    /// Student id, name, subject, time in, time out, status.
    TimeLog,
}

impl ExportView {
    /// Tag used in the export filename.
    pub fn tag(&self) -> &'static str {
        match self {
            ExportView::Uniform => "uniform",
            ExportView::TimeLog => "timelog",
        }
    }
}

#[derive(Error, Debug)]
#[error("unknown export view {0:?}: expected \"uniform\" or \"timelog\"")]
pub struct ParseExportViewError(String);

impl FromStr for ExportView {
    type Err = ParseExportViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(ExportView::Uniform),
            "timelog" | "time" => Ok(ExportView::TimeLog),
            other => Err(ParseExportViewError(other.to_string())),
        }
    }
}

impl fmt::Display for ExportView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Quote one CSV field, doubling embedded quotes.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn row(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| quote(f)).collect();
    quoted.join(",")
}

fn fmt_time(t: Option<NaiveTime>) -> String {
    t.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_default()
}

fn subject(record: &AttendanceRecord) -> String {
    format!("{} {}", record.subject_code, record.subject_name)
}

/// Render the ledger as CSV in the requested view.
///
/// Fails with [`ExportError::NoRecords`] on an empty ledger so the
/// caller surfaces a "no records" message instead of an empty file.
pub fn export_csv(records: &[AttendanceRecord], view: ExportView) -> Result<String, ExportError> {
    if records.is_empty() {
        return Err(ExportError::NoRecords);
    }

    let mut out = String::new();
    match view {
        ExportView::Uniform => {
            out.push_str(&row(&[
                "Student ID",
                "Student Name",
                "Subject",
                "Uniform Status",
                "Professor",
            ]));
            out.push_str("\r\n");
            for r in records {
                out.push_str(&row(&[
                    &r.student_id,
                    &r.student_name,
                    &subject(r),
                    &r.uniform,
                    &r.professor,
                ]));
                out.push_str("\r\n");
            }
        }
        ExportView::TimeLog => {
            out.push_str(&row(&[
                "Student ID",
                "Student Name",
                "Subject",
                "Time In",
                "Time Out",
                "Status",
            ]));
            out.push_str("\r\n");
            for r in records {
                out.push_str(&row(&[
                    &r.student_id,
                    &r.student_name,
                    &subject(r),
                    &fmt_time(r.time_in),
                    &fmt_time(r.time_out),
                    r.status.as_str(),
                ]));
                out.push_str("\r\n");
            }
        }
    }
    Ok(out)
}

/// Export filename: view tag plus the current date.
pub fn export_filename(view: ExportView, date: NaiveDate) -> String {
    format!("attendance_{}_{}.csv", view.tag(), date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceStatus;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn record(name: &str, uniform: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: "2021-00042".into(),
            student_name: name.into(),
            subject_code: "CS101".into(),
            subject_name: "Intro to Computing".into(),
            time_in: Some(t(8, 5)),
            time_out: Some(t(10, 0)),
            status: AttendanceStatus::Present,
            uniform: uniform.into(),
            professor: "Dela Cruz".into(),
        }
    }

    #[test]
    fn test_empty_ledger_rejected() {
        assert!(matches!(
            export_csv(&[], ExportView::TimeLog),
            Err(ExportError::NoRecords)
        ));
    }

    #[test]
    fn test_timelog_layout() {
        let csv = export_csv(&[record("Juan Santos", "Complete")], ExportView::TimeLog).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"Student ID\",\"Student Name\",\"Subject\",\"Time In\",\"Time Out\",\"Status\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"2021-00042\",\"Juan Santos\",\"CS101 Intro to Computing\",\"08:05:00\",\"10:00:00\",\"present\""
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_uniform_layout() {
        let csv = export_csv(&[record("Juan Santos", "Missing ID card")], ExportView::Uniform)
            .unwrap();
        let body = csv.lines().nth(1).unwrap();
        assert_eq!(
            body,
            "\"2021-00042\",\"Juan Santos\",\"CS101 Intro to Computing\",\"Missing ID card\",\"Dela Cruz\""
        );
    }

    #[test]
    fn test_embedded_quotes_doubled() {
        let mut r = record("Juan \"JJ\" Santos", "Complete");
        r.time_out = None;
        let csv = export_csv(&[r], ExportView::TimeLog).unwrap();
        assert!(csv.contains("\"Juan \"\"JJ\"\" Santos\""));
        // Unset time-out renders as an empty quoted field.
        assert!(csv.contains(",\"\",\"present\""));
    }

    #[test]
    fn test_filename_has_view_tag_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(
            export_filename(ExportView::Uniform, date),
            "attendance_uniform_2026-08-06.csv"
        );
        assert_eq!(
            export_filename(ExportView::TimeLog, date),
            "attendance_timelog_2026-08-06.csv"
        );
    }

    #[test]
    fn test_view_parsing() {
        assert_eq!("uniform".parse::<ExportView>().unwrap(), ExportView::Uniform);
        assert_eq!("TimeLog".parse::<ExportView>().unwrap(), ExportView::TimeLog);
        assert!("pdf".parse::<ExportView>().is_err());
    }
}
