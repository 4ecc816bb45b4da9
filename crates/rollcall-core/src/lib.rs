//! rollcall-core — Attendance domain logic.
//!
//! Schedule resolution, present/tardy/absent classification against a
//! configurable tardiness rule, the per-session attendance ledger, CSV
//! export, and detection overlay rendering.

pub mod attendance;
pub mod export;
mod font;
pub mod ledger;
pub mod overlay;
pub mod schedule;

pub use attendance::{AttendanceRecord, AttendanceStatus, RecordPatch, TardyRule};
pub use ledger::{LedgerError, LedgerSummary, RecognitionOutcome, RosterEntry, SessionLedger};
pub use overlay::{BBox, Detection};
pub use schedule::{resolve_current, Schedule};
