//! Capture engine: a dedicated OS thread owning the camera.
//!
//! The V4L2 handle never crosses threads; grab requests are served over
//! an mpsc channel with oneshot replies. Dropping every handle closes
//! the channel, the thread exits, and the camera is released.

use rollcall_hw::{Camera, CameraError, FrameError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("capture thread exited")]
    ChannelClosed,
}

/// One encoded frame off the camera.
pub struct JpegFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

enum CaptureRequest {
    Grab {
        reply: oneshot::Sender<Result<JpegFrame, CaptureError>>,
    },
}

/// Clone-safe handle to the capture thread.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<CaptureRequest>,
}

impl CaptureHandle {
    /// Grab the next frame as JPEG.
    pub async fn grab(&self) -> Result<JpegFrame, CaptureError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CaptureRequest::Grab { reply: reply_tx })
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CaptureError::ChannelClosed)?
    }
}

/// Spawn the capture engine on a dedicated OS thread.
///
/// Opens the camera and discards warmup frames before returning; fails
/// fast if the device is unavailable.
pub fn spawn_capture(
    device: &str,
    warmup_frames: usize,
    jpeg_quality: u8,
) -> Result<CaptureHandle, CaptureError> {
    let camera = Camera::open(device)?;
    tracing::info!(
        device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    // Discard warmup frames for camera AGC/AE stabilization
    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        for _ in 0..warmup_frames {
            let _ = camera.capture_frame();
        }
    }

    let (tx, mut rx) = mpsc::channel::<CaptureRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-capture".into())
        .spawn(move || {
            tracing::info!("capture thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    CaptureRequest::Grab { reply } => {
                        let _ = reply.send(grab_jpeg(&camera, jpeg_quality));
                    }
                }
            }
            tracing::info!("capture thread exiting; camera released");
        })
        .expect("failed to spawn capture thread");

    Ok(CaptureHandle { tx })
}

fn grab_jpeg(camera: &Camera, quality: u8) -> Result<JpegFrame, CaptureError> {
    let frame = camera.capture_lit_frame(3)?;
    let jpeg = frame.to_jpeg(quality)?;
    Ok(JpegFrame {
        jpeg,
        width: frame.width,
        height: frame.height,
    })
}
