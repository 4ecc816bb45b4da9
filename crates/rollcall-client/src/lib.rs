//! rollcall-client — HTTP client for the detection/recognition service.
//!
//! The service is a black box: `POST /detect` takes a base64 JPEG and
//! returns per-frame detections plus an optional recognized identity;
//! `GET /schedules/` returns the class schedule list.

pub mod client;
pub mod models;

pub use client::{ClientError, DetectionClient};
pub use models::{DetectOutcome, RecognizedStudent};
