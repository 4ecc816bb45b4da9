//! Class schedules and resolution of the currently active session.

use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// A class schedule entry as fetched from the schedule endpoint.
///
/// Immutable per fetch; identifies the "current class" for a detection
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub subject_code: String,
    pub subject_name: String,
    pub block: String,
    pub year_level: Option<u8>,
    pub room: Option<String>,
    pub instructor: Option<String>,
    #[serde(with = "weekday_name")]
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl Schedule {
    /// True if `t` falls inside the `[start_time, end_time)` window.
    ///
    /// A schedule whose end does not lie after its start has an empty
    /// window and is never active.
    pub fn window_contains(&self, t: NaiveTime) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// True if this schedule is in session at the given wall-clock time.
    pub fn is_active_at(&self, now: &DateTime<Local>) -> bool {
        self.day_of_week == now.weekday() && self.window_contains(now.time())
    }

    /// Human-readable label, e.g. "CS101 Intro to Computing (A)".
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.subject_code, self.subject_name, self.block)
    }
}

/// Pick the schedule in session right now.
///
/// Selects the first entry (in list order) whose day-of-week matches
/// today and whose `[start, end)` window contains the current time.
/// Returns `None` when nothing matches; the caller must then select a
/// schedule manually.
pub fn resolve_current<'a>(
    schedules: &'a [Schedule],
    now: &DateTime<Local>,
) -> Option<&'a Schedule> {
    schedules.iter().find(|s| s.is_active_at(now))
}

/// Serialize `Weekday` as the full English day name ("Monday"), the
/// format the schedule endpoint uses.
mod weekday_name {
    use chrono::Weekday;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn day_name(day: Weekday) -> &'static str {
        match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    pub fn serialize<S: Serializer>(day: &Weekday, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(day_name(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Weekday, D::Error> {
        let s = String::deserialize(de)?;
        s.parse()
            .map_err(|_| de::Error::custom(format!("invalid day of week: {s:?}")))
    }
}

pub use weekday_name::day_name;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sched(id: i64, day: Weekday, start: (u32, u32), end: (u32, u32)) -> Schedule {
        Schedule {
            id,
            subject_code: format!("CS{id}"),
            subject_name: "Test Subject".into(),
            block: "A".into(),
            year_level: Some(2),
            room: Some("301".into()),
            instructor: Some("Dela Cruz".into()),
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    // 2026-08-06 is a Thursday.
    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 6, h, m, 0).unwrap()
    }

    #[test]
    fn test_resolve_matching_day_and_window() {
        let schedules = vec![
            sched(1, Weekday::Mon, (8, 0), (10, 0)),
            sched(2, Weekday::Thu, (8, 0), (10, 0)),
        ];
        let found = resolve_current(&schedules, &at(9, 0)).unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn test_resolve_no_match_wrong_day() {
        let schedules = vec![sched(1, Weekday::Mon, (8, 0), (10, 0))];
        assert!(resolve_current(&schedules, &at(9, 0)).is_none());
    }

    #[test]
    fn test_resolve_no_match_outside_window() {
        let schedules = vec![sched(1, Weekday::Thu, (8, 0), (10, 0))];
        assert!(resolve_current(&schedules, &at(10, 30)).is_none());
    }

    #[test]
    fn test_window_is_half_open() {
        let s = sched(1, Weekday::Thu, (8, 0), (10, 0));
        assert!(s.window_contains(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(!s.window_contains(NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
    }

    #[test]
    fn test_ties_broken_by_list_order() {
        let schedules = vec![
            sched(7, Weekday::Thu, (8, 0), (10, 0)),
            sched(8, Weekday::Thu, (8, 0), (10, 0)),
        ];
        assert_eq!(resolve_current(&schedules, &at(8, 30)).unwrap().id, 7);
    }

    #[test]
    fn test_empty_window_never_active() {
        let s = sched(1, Weekday::Thu, (10, 0), (10, 0));
        assert!(!s.is_active_at(&at(10, 0)));
    }

    #[test]
    fn test_weekday_roundtrip_through_json() {
        let s = sched(1, Weekday::Wed, (8, 0), (10, 0));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"Wednesday\""));
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.day_of_week, Weekday::Wed);
    }
}
