//! HTTP client for the detection and schedule endpoints.

use crate::models::{
    DetectOutcome, DetectRequest, DetectResponse, SchedulesResponse, WireError,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::Client;
use rollcall_core::Schedule;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    /// The request hit its deadline and was aborted.
    #[error("detection request timed out")]
    Timeout,
    /// Could not reach the service at all.
    #[error("service unreachable: {0}")]
    Network(String),
    /// The service answered with a non-success status.
    #[error("service error {status}: {message}")]
    Api { status: u16, message: String },
    /// The response body did not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    BadSchedule(#[from] WireError),
}

fn classify(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(e.to_string())
    }
}

/// Client for the detection service, with a fixed per-request timeout.
pub struct DetectionClient {
    client: Client,
    base_url: String,
}

impl DetectionClient {
    /// Build a client. `base_url` has no trailing slash
    /// (e.g. "http://127.0.0.1:5000").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Submit one JPEG frame for detection.
    ///
    /// A `success: false` answer (no face matched, attendance already
    /// recorded server-side) is a normal empty outcome, not an error —
    /// the service signals those with 4xx statuses and a parseable body.
    pub async fn detect(
        &self,
        jpeg: &[u8],
        schedule_id: Option<i64>,
    ) -> Result<DetectOutcome, ClientError> {
        let encoded = BASE64_STANDARD.encode(jpeg);
        let image = format!("data:image/jpeg;base64,{encoded}");
        let body = DetectRequest {
            image: &image,
            schedule_id,
        };

        let url = format!("{}/detect", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let text = response.text().await.map_err(classify)?;

        match serde_json::from_str::<DetectResponse>(&text) {
            Ok(resp) => {
                if !resp.success {
                    debug!(
                        status = status.as_u16(),
                        error = resp.error.as_deref().unwrap_or("unknown"),
                        "detection tick returned no result"
                    );
                    return Ok(DetectOutcome::from(resp));
                }
                Ok(DetectOutcome::from(resp))
            }
            Err(e) if status.is_success() => Err(ClientError::InvalidResponse(e.to_string())),
            Err(_) => Err(ClientError::Api {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            }),
        }
    }

    /// Fetch and validate the schedule list.
    ///
    /// Rows that fail validation are skipped with a warning rather than
    /// failing the whole fetch.
    pub async fn fetch_schedules(&self) -> Result<Vec<Schedule>, ClientError> {
        let url = format!("{}/schedules/", self.base_url);
        let response = self.client.get(&url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: SchedulesResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        if !body.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| "success=false".into()),
            });
        }

        let mut schedules = Vec::with_capacity(body.schedules.len());
        for wire in body.schedules {
            let id = wire.schedule_id;
            match Schedule::try_from(wire) {
                Ok(s) => schedules.push(s),
                Err(e) => warn!(schedule_id = id, error = %e, "skipping malformed schedule"),
            }
        }

        info!(count = schedules.len(), "fetched schedules");
        Ok(schedules)
    }
}
