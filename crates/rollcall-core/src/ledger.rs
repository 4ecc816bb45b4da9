//! The in-memory attendance ledger for one detection session.
//!
//! Records are keyed by the lowercased, trimmed student name; the first
//! recognition of a key wins the time-in. The ledger supports roster
//! pre-seeding so the periodic absence sweep has records to act on.

use crate::attendance::{AttendanceRecord, AttendanceStatus, RecordPatch, TardyRule};
use crate::schedule::Schedule;
use chrono::NaiveTime;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("no record with id {0}")]
    UnknownRecord(Uuid),
    #[error("a record for student {0:?} already exists")]
    DuplicateStudent(String),
}

/// Result of feeding one recognized identity into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// A record was created, or a seeded record received its time-in.
    Recorded(Uuid),
    /// The student already holds a time-in this session; nothing changed.
    AlreadyRecorded,
    /// Blank name; nothing to key on.
    Ignored,
}

/// Roster entry used to pre-allocate records before anyone is seen.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RosterEntry {
    pub name: String,
    #[serde(default)]
    pub student_id: String,
}

/// Aggregate counts over the ledger.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub present: usize,
    pub tardy: usize,
    pub absent: usize,
    pub uniform_violations: usize,
}

/// Dedup key: lowercased, trimmed student name.
pub fn student_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_uniform_violation(record: &AttendanceRecord) -> bool {
    !record.uniform.is_empty() && !record.uniform.eq_ignore_ascii_case("complete")
}

pub struct SessionLedger {
    schedule: Schedule,
    rule: TardyRule,
    records: Vec<AttendanceRecord>,
    seen: HashMap<String, Uuid>,
}

impl SessionLedger {
    pub fn new(schedule: Schedule, rule: TardyRule) -> Self {
        Self {
            schedule,
            rule,
            records: Vec::new(),
            seen: HashMap::new(),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn rule(&self) -> TardyRule {
        self.rule
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_mut(&mut self, id: Uuid) -> Option<&mut AttendanceRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Apply one recognized identity at wall-clock time `now`.
    ///
    /// First recognition wins: a key that already holds a time-in is
    /// never reclassified. A seeded record (no time-in yet) receives its
    /// time-in and a status from the tardy rule, even if the absence
    /// sweep flipped it to absent in the meantime; once the time-in is
    /// set the sweep can no longer touch it.
    pub fn record_recognition(
        &mut self,
        name: &str,
        student_id: &str,
        uniform: &str,
        now: NaiveTime,
    ) -> RecognitionOutcome {
        let key = student_key(name);
        if key.is_empty() {
            return RecognitionOutcome::Ignored;
        }

        if let Some(&id) = self.seen.get(&key) {
            let rule = self.rule;
            let start = self.schedule.start_time;
            let record = self.record_mut(id).expect("seen map points at live record");
            if record.time_in.is_some() {
                return RecognitionOutcome::AlreadyRecorded;
            }
            record.time_in = Some(now);
            record.status = rule.classify(now, start);
            if record.student_id.is_empty() {
                record.student_id = student_id.to_string();
            }
            if !uniform.is_empty() {
                record.uniform = uniform.to_string();
            }
            return RecognitionOutcome::Recorded(id);
        }

        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            student_name: name.trim().to_string(),
            subject_code: self.schedule.subject_code.clone(),
            subject_name: self.schedule.subject_name.clone(),
            time_in: Some(now),
            time_out: None,
            status: self.rule.classify(now, self.schedule.start_time),
            uniform: uniform.to_string(),
            professor: self.schedule.instructor.clone().unwrap_or_default(),
        };
        let id = record.id;
        self.seen.insert(key, id);
        self.records.push(record);
        RecognitionOutcome::Recorded(id)
    }

    /// Pre-allocate records for an expected roster, so students who never
    /// show up can be swept to absent. Entries whose key is already in
    /// the ledger (or blank) are skipped. Returns the number seeded.
    pub fn seed_roster<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = RosterEntry>,
    {
        let mut seeded = 0;
        for entry in entries {
            let key = student_key(&entry.name);
            if key.is_empty() || self.seen.contains_key(&key) {
                continue;
            }
            let record = AttendanceRecord {
                id: Uuid::new_v4(),
                student_id: entry.student_id,
                student_name: entry.name.trim().to_string(),
                subject_code: self.schedule.subject_code.clone(),
                subject_name: self.schedule.subject_name.clone(),
                time_in: None,
                time_out: None,
                status: AttendanceStatus::Present,
                uniform: String::new(),
                professor: self.schedule.instructor.clone().unwrap_or_default(),
            };
            self.seen.insert(key, record.id);
            self.records.push(record);
            seeded += 1;
        }
        seeded
    }

    /// Flip every record still lacking a time-in past the tardy cutoff
    /// to absent. Returns the number of records flipped. A `Never` rule
    /// has no cutoff, so the sweep does nothing.
    pub fn sweep_absent(&mut self, now: NaiveTime) -> usize {
        let Some(cutoff) = self.rule.cutoff(self.schedule.start_time) else {
            return 0;
        };
        if now <= cutoff {
            return 0;
        }
        let mut flipped = 0;
        for record in &mut self.records {
            if record.time_in.is_none() && record.status != AttendanceStatus::Absent {
                record.status = AttendanceStatus::Absent;
                flipped += 1;
            }
        }
        flipped
    }

    /// Stamp `now` as the time-out on every present or tardy record that
    /// does not have one; absent records are left untouched. Returns the
    /// number of records stamped.
    pub fn close(&mut self, now: NaiveTime) -> usize {
        let mut stamped = 0;
        for record in &mut self.records {
            let open = matches!(
                record.status,
                AttendanceStatus::Present | AttendanceStatus::Tardy
            );
            if open && record.time_out.is_none() {
                record.time_out = Some(now);
                stamped += 1;
            }
        }
        stamped
    }

    /// Apply a manual edit. A set time-in is immutable; renaming re-keys
    /// the record and fails on a collision with another record's key.
    pub fn edit(&mut self, id: Uuid, patch: RecordPatch) -> Result<(), LedgerError> {
        if let Some(new_name) = &patch.student_name {
            let new_key = student_key(new_name);
            match self.seen.get(&new_key) {
                Some(&other) if other != id => {
                    return Err(LedgerError::DuplicateStudent(new_name.clone()))
                }
                _ => {}
            }
        }

        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(LedgerError::UnknownRecord(id))?;

        if let Some(new_name) = patch.student_name {
            let old_key = student_key(&record.student_name);
            let new_key = student_key(&new_name);
            if new_key != old_key && !new_key.is_empty() {
                self.seen.remove(&old_key);
                self.seen.insert(new_key, id);
            }
            record.student_name = new_name.trim().to_string();
        }
        if let Some(v) = patch.student_id {
            record.student_id = v;
        }
        if let Some(v) = patch.subject_code {
            record.subject_code = v;
        }
        if let Some(v) = patch.subject_name {
            record.subject_name = v;
        }
        if let Some(t) = patch.time_in {
            if record.time_in.is_none() {
                record.time_in = Some(t);
            }
        }
        if let Some(t) = patch.time_out {
            record.time_out = Some(t);
        }
        if let Some(s) = patch.status {
            record.status = s;
        }
        if let Some(v) = patch.uniform {
            record.uniform = v;
        }
        if let Some(v) = patch.professor {
            record.professor = v;
        }
        Ok(())
    }

    /// Remove a record. Its key becomes free, so the student could be
    /// re-recorded by a later recognition.
    pub fn delete(&mut self, id: Uuid) -> Result<AttendanceRecord, LedgerError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(LedgerError::UnknownRecord(id))?;
        let record = self.records.remove(idx);
        self.seen.remove(&student_key(&record.student_name));
        Ok(record)
    }

    /// Case-insensitive free-text filter across name, student id, and
    /// subject. An empty query returns everything.
    pub fn search(&self, query: &str) -> Vec<&AttendanceRecord> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return self.records.iter().collect();
        }
        self.records
            .iter()
            .filter(|r| {
                r.student_name.to_lowercase().contains(&q)
                    || r.student_id.to_lowercase().contains(&q)
                    || r.subject_code.to_lowercase().contains(&q)
                    || r.subject_name.to_lowercase().contains(&q)
            })
            .collect()
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            total: self.records.len(),
            present: 0,
            tardy: 0,
            absent: 0,
            uniform_violations: 0,
        };
        for record in &self.records {
            match record.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Tardy => summary.tardy += 1,
                AttendanceStatus::Absent => summary.absent += 1,
            }
            if is_uniform_violation(record) {
                summary.uniform_violations += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule() -> Schedule {
        Schedule {
            id: 1,
            subject_code: "CS101".into(),
            subject_name: "Intro to Computing".into(),
            block: "A".into(),
            year_level: Some(1),
            room: Some("301".into()),
            instructor: Some("Dela Cruz".into()),
            day_of_week: Weekday::Thu,
            start_time: t(8, 0),
            end_time: t(10, 0),
        }
    }

    fn ledger() -> SessionLedger {
        SessionLedger::new(schedule(), TardyRule::AfterMinutes(15))
    }

    #[test]
    fn test_first_recognition_creates_record() {
        let mut l = ledger();
        let outcome = l.record_recognition("Juan Santos", "2021-00042", "Complete", t(8, 10));
        assert!(matches!(outcome, RecognitionOutcome::Recorded(_)));
        let r = &l.records()[0];
        assert_eq!(r.time_in, Some(t(8, 10)));
        assert_eq!(r.status, AttendanceStatus::Present);
        assert_eq!(r.professor, "Dela Cruz");
        assert_eq!(r.subject_code, "CS101");
    }

    #[test]
    fn test_second_recognition_does_not_alter_first() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "2021-00042", "Complete", t(8, 10));
        let outcome = l.record_recognition("  juan santos ", "x", "Missing ID", t(8, 40));
        assert_eq!(outcome, RecognitionOutcome::AlreadyRecorded);
        let r = &l.records()[0];
        assert_eq!(r.time_in, Some(t(8, 10)));
        assert_eq!(r.status, AttendanceStatus::Present);
        assert_eq!(r.uniform, "Complete");
        assert_eq!(l.records().len(), 1);
    }

    #[test]
    fn test_tardy_classification_on_creation() {
        let mut l = ledger();
        l.record_recognition("Maria Reyes", "", "", t(8, 16));
        assert_eq!(l.records()[0].status, AttendanceStatus::Tardy);
    }

    #[test]
    fn test_never_rule_session_has_no_tardies() {
        let mut l = SessionLedger::new(schedule(), TardyRule::Never);
        l.record_recognition("Maria Reyes", "", "", t(9, 59));
        assert_eq!(l.records()[0].status, AttendanceStatus::Present);
    }

    #[test]
    fn test_blank_name_ignored() {
        let mut l = ledger();
        assert_eq!(
            l.record_recognition("   ", "id", "", t(8, 5)),
            RecognitionOutcome::Ignored
        );
        assert!(l.is_empty());
    }

    #[test]
    fn test_seed_then_recognize_sets_time_in_once() {
        let mut l = ledger();
        let seeded = l.seed_roster(vec![
            RosterEntry {
                name: "Juan Santos".into(),
                student_id: "2021-00042".into(),
            },
            RosterEntry {
                name: "Maria Reyes".into(),
                student_id: String::new(),
            },
        ]);
        assert_eq!(seeded, 2);
        assert!(l.records().iter().all(|r| r.time_in.is_none()));

        let outcome = l.record_recognition("juan santos", "", "Complete", t(8, 20));
        assert!(matches!(outcome, RecognitionOutcome::Recorded(_)));
        let r = l
            .records()
            .iter()
            .find(|r| r.student_name == "Juan Santos")
            .unwrap();
        assert_eq!(r.time_in, Some(t(8, 20)));
        assert_eq!(r.status, AttendanceStatus::Tardy);
        // Existing id is kept when the recognition carries none.
        assert_eq!(r.student_id, "2021-00042");
    }

    #[test]
    fn test_seed_skips_existing_keys() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "", t(8, 0));
        let seeded = l.seed_roster(vec![RosterEntry {
            name: "JUAN SANTOS".into(),
            student_id: String::new(),
        }]);
        assert_eq!(seeded, 0);
    }

    #[test]
    fn test_sweep_flips_only_no_time_in_past_cutoff() {
        let mut l = ledger();
        l.seed_roster(vec![
            RosterEntry {
                name: "Juan Santos".into(),
                student_id: String::new(),
            },
            RosterEntry {
                name: "Maria Reyes".into(),
                student_id: String::new(),
            },
        ]);
        l.record_recognition("Maria Reyes", "", "", t(8, 5));

        // Before the cutoff nothing happens.
        assert_eq!(l.sweep_absent(t(8, 10)), 0);

        // Past the cutoff only the unseen record flips.
        assert_eq!(l.sweep_absent(t(8, 20)), 1);
        let juan = l
            .records()
            .iter()
            .find(|r| r.student_name == "Juan Santos")
            .unwrap();
        assert_eq!(juan.status, AttendanceStatus::Absent);
        let maria = l
            .records()
            .iter()
            .find(|r| r.student_name == "Maria Reyes")
            .unwrap();
        assert_eq!(maria.status, AttendanceStatus::Present);

        // Re-running the sweep is idempotent.
        assert_eq!(l.sweep_absent(t(8, 25)), 0);
    }

    #[test]
    fn test_sweep_noop_under_never_rule() {
        let mut l = SessionLedger::new(schedule(), TardyRule::Never);
        l.seed_roster(vec![RosterEntry {
            name: "Juan Santos".into(),
            student_id: String::new(),
        }]);
        assert_eq!(l.sweep_absent(t(23, 0)), 0);
    }

    #[test]
    fn test_recognition_after_sweep_still_gets_time_in() {
        let mut l = ledger();
        l.seed_roster(vec![RosterEntry {
            name: "Juan Santos".into(),
            student_id: String::new(),
        }]);
        l.sweep_absent(t(8, 30));
        let outcome = l.record_recognition("Juan Santos", "", "", t(8, 45));
        assert!(matches!(outcome, RecognitionOutcome::Recorded(_)));
        let r = &l.records()[0];
        assert_eq!(r.time_in, Some(t(8, 45)));
        assert_eq!(r.status, AttendanceStatus::Tardy);
        // Once a time-in exists the sweep can no longer touch it.
        assert_eq!(l.sweep_absent(t(9, 0)), 0);
    }

    #[test]
    fn test_close_stamps_open_records_only() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "", t(8, 5));
        l.record_recognition("Maria Reyes", "", "", t(8, 30));
        l.seed_roster(vec![RosterEntry {
            name: "Pedro Cruz".into(),
            student_id: String::new(),
        }]);
        l.sweep_absent(t(8, 30));

        assert_eq!(l.close(t(10, 0)), 2);
        for r in l.records() {
            match r.status {
                AttendanceStatus::Absent => assert_eq!(r.time_out, None),
                _ => assert_eq!(r.time_out, Some(t(10, 0))),
            }
        }

        // Closing again stamps nothing new.
        assert_eq!(l.close(t(10, 5)), 0);
    }

    #[test]
    fn test_edit_cannot_overwrite_time_in() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "", t(8, 5));
        let id = l.records()[0].id;
        l.edit(
            id,
            RecordPatch {
                time_in: Some(t(9, 0)),
                uniform: Some("Missing ID card".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let r = &l.records()[0];
        assert_eq!(r.time_in, Some(t(8, 5)));
        assert_eq!(r.uniform, "Missing ID card");
    }

    #[test]
    fn test_edit_rename_rekeys_and_rejects_collisions() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "", t(8, 5));
        l.record_recognition("Maria Reyes", "", "", t(8, 6));
        let juan = l.records()[0].id;

        let err = l.edit(
            juan,
            RecordPatch {
                student_name: Some("maria reyes".into()),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(LedgerError::DuplicateStudent(_))));

        l.edit(
            juan,
            RecordPatch {
                student_name: Some("Juan A. Santos".into()),
                ..Default::default()
            },
        )
        .unwrap();
        // The old key is free again; a new recognition creates a new record.
        let outcome = l.record_recognition("Juan Santos", "", "", t(8, 50));
        assert!(matches!(outcome, RecognitionOutcome::Recorded(_)));
        assert_eq!(l.records().len(), 3);
    }

    #[test]
    fn test_delete_frees_key() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "", t(8, 5));
        let id = l.records()[0].id;
        l.delete(id).unwrap();
        assert!(l.is_empty());
        let outcome = l.record_recognition("Juan Santos", "", "", t(8, 6));
        assert!(matches!(outcome, RecognitionOutcome::Recorded(_)));
    }

    #[test]
    fn test_delete_unknown_id() {
        let mut l = ledger();
        assert!(matches!(
            l.delete(Uuid::new_v4()),
            Err(LedgerError::UnknownRecord(_))
        ));
    }

    #[test]
    fn test_search_across_fields() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "2021-00042", "", t(8, 5));
        l.record_recognition("Maria Reyes", "2021-00077", "", t(8, 6));

        assert_eq!(l.search("santos").len(), 1);
        assert_eq!(l.search("00077").len(), 1);
        assert_eq!(l.search("cs101").len(), 2);
        assert_eq!(l.search("").len(), 2);
        assert_eq!(l.search("zzz").len(), 0);
    }

    #[test]
    fn test_summary_counts() {
        let mut l = ledger();
        l.record_recognition("Juan Santos", "", "Complete", t(8, 5));
        l.record_recognition("Maria Reyes", "", "Missing ID card", t(8, 30));
        l.seed_roster(vec![RosterEntry {
            name: "Pedro Cruz".into(),
            student_id: String::new(),
        }]);
        l.sweep_absent(t(8, 30));

        let s = l.summary();
        assert_eq!(s.total, 3);
        assert_eq!(s.present, 1);
        assert_eq!(s.tardy, 1);
        assert_eq!(s.absent, 1);
        assert_eq!(s.uniform_violations, 1);
    }
}
