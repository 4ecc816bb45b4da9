//! Wire types for the detection and schedule endpoints.

use chrono::{NaiveTime, Weekday};
use rollcall_core::{BBox, Detection, Schedule};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("invalid day of week {0:?}")]
    BadDay(String),
    #[error("invalid time {0:?}: expected HH:MM or HH:MM:SS")]
    BadTime(String),
}

/// `POST /detect` request body.
#[derive(Debug, Serialize)]
pub struct DetectRequest<'a> {
    /// Data-URL base64 JPEG ("data:image/jpeg;base64,...").
    pub image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<i64>,
}

/// One detection as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct WireDetection {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in frame pixels.
    pub bbox: [f32; 4],
}

impl From<WireDetection> for Detection {
    fn from(d: WireDetection) -> Self {
        Detection {
            label: d.label,
            confidence: d.confidence,
            bbox: bbox_from_array(d.bbox),
        }
    }
}

fn bbox_from_array(b: [f32; 4]) -> BBox {
    BBox {
        x1: b[0],
        y1: b[1],
        x2: b[2],
        y2: b[3],
    }
}

/// `POST /detect` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<WireDetection>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub face_bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub uniform_status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The identity the service recognized in this frame, if any.
#[derive(Debug, Clone)]
pub struct RecognizedStudent {
    pub name: String,
    pub student_id: Option<String>,
    pub face_bbox: Option<BBox>,
}

/// Typed result of one detection call.
#[derive(Debug, Clone, Default)]
pub struct DetectOutcome {
    pub detections: Vec<Detection>,
    pub recognized: Option<RecognizedStudent>,
    pub uniform_status: Option<String>,
}

impl From<DetectResponse> for DetectOutcome {
    fn from(resp: DetectResponse) -> Self {
        let recognized = resp.student_name.filter(|n| !n.trim().is_empty()).map(|name| {
            RecognizedStudent {
                name,
                student_id: resp.student_id,
                face_bbox: resp.face_bbox.map(bbox_from_array),
            }
        });
        DetectOutcome {
            detections: resp.detections.into_iter().map(Detection::from).collect(),
            recognized,
            uniform_status: resp.uniform_status,
        }
    }
}

/// `GET /schedules/` response body.
#[derive(Debug, Deserialize)]
pub struct SchedulesResponse {
    pub success: bool,
    #[serde(default)]
    pub schedules: Vec<WireSchedule>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One schedule row as the backend stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct WireSchedule {
    pub schedule_id: i64,
    pub subject_code: String,
    pub subject_name: String,
    #[serde(default)]
    pub block: String,
    #[serde(default)]
    pub year_level: Option<u8>,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub instructor_name: Option<String>,
}

fn parse_time(s: &str) -> Result<NaiveTime, WireError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| WireError::BadTime(s.to_string()))
}

impl TryFrom<WireSchedule> for Schedule {
    type Error = WireError;

    fn try_from(w: WireSchedule) -> Result<Self, Self::Error> {
        let day_of_week: Weekday = w
            .day_of_week
            .parse()
            .map_err(|_| WireError::BadDay(w.day_of_week.clone()))?;
        Ok(Schedule {
            id: w.schedule_id,
            subject_code: w.subject_code,
            subject_name: w.subject_name,
            block: w.block,
            year_level: w.year_level,
            room: w.room_code,
            instructor: w.instructor_name,
            day_of_week,
            start_time: parse_time(&w.start_time)?,
            end_time: parse_time(&w.end_time)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_response_full() {
        let json = r#"{
            "success": true,
            "detections": [
                {"class": "blue_polo", "confidence": 0.91, "bbox": [10.0, 20.0, 110.0, 220.0]},
                {"class": "id_card", "confidence": 0.67, "bbox": [40.0, 120.0, 80.0, 160.0]}
            ],
            "student_name": "Juan Santos",
            "student_id": "2021-00042",
            "face_bbox": [30.0, 10.0, 90.0, 80.0],
            "uniform_status": "Complete"
        }"#;
        let resp: DetectResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        let outcome = DetectOutcome::from(resp);
        assert_eq!(outcome.detections.len(), 2);
        assert_eq!(outcome.detections[0].label, "blue_polo");
        let student = outcome.recognized.unwrap();
        assert_eq!(student.name, "Juan Santos");
        assert_eq!(student.student_id.as_deref(), Some("2021-00042"));
        assert_eq!(student.face_bbox.unwrap().x2, 90.0);
        assert_eq!(outcome.uniform_status.as_deref(), Some("Complete"));
    }

    #[test]
    fn test_detect_response_no_recognition() {
        let json = r#"{"success": false, "error": "No face matched"}"#;
        let resp: DetectResponse = serde_json::from_str(json).unwrap();
        let outcome = DetectOutcome::from(resp);
        assert!(outcome.detections.is_empty());
        assert!(outcome.recognized.is_none());
    }

    #[test]
    fn test_blank_student_name_is_not_a_recognition() {
        let json = r#"{"success": true, "student_name": "  "}"#;
        let resp: DetectResponse = serde_json::from_str(json).unwrap();
        assert!(DetectOutcome::from(resp).recognized.is_none());
    }

    #[test]
    fn test_wire_schedule_converts() {
        let json = r#"{
            "schedule_id": 7,
            "subject_code": "CS101",
            "subject_name": "Intro to Computing",
            "block": "A",
            "year_level": 1,
            "day_of_week": "Thursday",
            "start_time": "08:00:00",
            "end_time": "10:00",
            "room_code": "301",
            "instructor_name": "Dela Cruz"
        }"#;
        let wire: WireSchedule = serde_json::from_str(json).unwrap();
        let schedule = Schedule::try_from(wire).unwrap();
        assert_eq!(schedule.id, 7);
        assert_eq!(schedule.day_of_week, Weekday::Thu);
        assert_eq!(
            schedule.start_time,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(schedule.end_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(schedule.room.as_deref(), Some("301"));
    }

    #[test]
    fn test_wire_schedule_bad_day_rejected() {
        let wire = WireSchedule {
            schedule_id: 1,
            subject_code: "CS101".into(),
            subject_name: "X".into(),
            block: String::new(),
            year_level: None,
            day_of_week: "Funday".into(),
            start_time: "08:00".into(),
            end_time: "10:00".into(),
            room_code: None,
            instructor_name: None,
        };
        assert!(matches!(
            Schedule::try_from(wire),
            Err(WireError::BadDay(_))
        ));
    }

    #[test]
    fn test_wire_schedule_bad_time_rejected() {
        let wire = WireSchedule {
            schedule_id: 1,
            subject_code: "CS101".into(),
            subject_name: "X".into(),
            block: String::new(),
            year_level: None,
            day_of_week: "Monday".into(),
            start_time: "8 o'clock".into(),
            end_time: "10:00".into(),
            room_code: None,
            instructor_name: None,
        };
        assert!(matches!(
            Schedule::try_from(wire),
            Err(WireError::BadTime(_))
        ));
    }

    #[test]
    fn test_detect_request_omits_missing_schedule() {
        let req = DetectRequest {
            image: "data:image/jpeg;base64,AAAA",
            schedule_id: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("schedule_id"));
    }
}
