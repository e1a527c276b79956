// =============================================================================
// CAPTURE PIPELINE - ENCODING AND UPLOAD ON A WORKER THREAD
// =============================================================================
//
// Capturing a frame is a two-step exchange with this worker. The GUI first
// submits the raw frame for encoding; the worker scales it down, compresses
// it to JPEG and hands back the bytes together with the preview pixels. Once
// the GUI has assigned a slot it submits the upload, and the worker posts the
// JPEG to the identify endpoint and reports the outcome.
//
// Every job and event carries the generation counter it was issued under, so
// results arriving after the grid was cleared can be recognized and dropped.
//
// =============================================================================

use std::sync::mpsc;
use std::time::Duration;

use crate::core::slots::{PreviewImage, SlotId};
use crate::identify::client::{IdentifyClient, IdentifyError};

/// Captures wider than this are scaled down before encoding; the preview
/// shares the scaled pixels.
pub const MAX_CAPTURE_WIDTH: u32 = 960;

const JPEG_QUALITY: u8 = 90;

/// Raw RGBA frame handed over for encoding.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Jobs sent to the capture thread
#[derive(Debug)]
enum CaptureJob {
    Encode {
        generation: u64,
        frame: CaptureFrame,
    },
    Upload {
        generation: u64,
        slot: SlotId,
        jpeg: Vec<u8>,
    },
    Shutdown,
}

/// Results reported back by the capture thread
#[derive(Debug)]
pub enum CaptureEvent {
    Encoded {
        generation: u64,
        jpeg: Vec<u8>,
        preview: PreviewImage,
    },
    EncodeFailed {
        generation: u64,
        reason: String,
    },
    Uploaded {
        generation: u64,
        slot: SlotId,
        result: Result<String, IdentifyError>,
    },
}

/// Handle to the capture worker. The GUI submits jobs and pumps events from
/// its update loop; nothing here blocks.
pub struct CapturePipeline {
    job_sender: mpsc::Sender<CaptureJob>,
    event_receiver: mpsc::Receiver<CaptureEvent>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CapturePipeline {
    pub fn new(endpoint: String) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let handle = std::thread::spawn(move || {
            capture_thread(job_rx, event_tx, endpoint);
        });

        Self {
            job_sender: job_tx,
            event_receiver: event_rx,
            thread_handle: Some(handle),
        }
    }

    pub fn submit_encode(&self, generation: u64, frame: CaptureFrame) {
        let _ = self.job_sender.send(CaptureJob::Encode { generation, frame });
    }

    pub fn submit_upload(&self, generation: u64, slot: SlotId, jpeg: Vec<u8>) {
        let _ = self.job_sender.send(CaptureJob::Upload {
            generation,
            slot,
            jpeg,
        });
    }

    pub fn try_recv_event(&self) -> Option<CaptureEvent> {
        self.event_receiver.try_recv().ok()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        log::debug!("CapturePipeline::drop() - sending shutdown command");
        let _ = self.job_sender.send(CaptureJob::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            // Try to join with a reasonable timeout by attempting multiple times
            for attempt in 1..=5 {
                if handle.is_finished() {
                    log::debug!("CapturePipeline::drop() - thread finished, joining");
                    let _ = handle.join();
                    return;
                }
                log::debug!(
                    "CapturePipeline::drop() - attempt {} - waiting for thread to finish",
                    attempt
                );
                std::thread::sleep(Duration::from_millis(200));
            }

            log::warn!(
                "CapturePipeline::drop() - thread did not finish after 1 second, abandoning join"
            );
        }
    }
}

fn capture_thread(
    job_rx: mpsc::Receiver<CaptureJob>,
    event_tx: mpsc::Sender<CaptureEvent>,
    endpoint: String,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Capture thread: failed to build async runtime: {}", e);
            return;
        }
    };
    let client = IdentifyClient::new(endpoint);
    log::info!("Capture thread started (endpoint: {})", client.endpoint());

    for job in job_rx {
        match job {
            CaptureJob::Encode { generation, frame } => {
                log::debug!(
                    "Capture thread: encoding {}x{} frame (generation {})",
                    frame.width,
                    frame.height,
                    generation
                );
                match encode_frame(&frame) {
                    Ok((jpeg, preview)) => {
                        let _ = event_tx.send(CaptureEvent::Encoded {
                            generation,
                            jpeg,
                            preview,
                        });
                    }
                    Err(reason) => {
                        log::error!("Capture thread: encoding failed: {}", reason);
                        let _ = event_tx.send(CaptureEvent::EncodeFailed { generation, reason });
                    }
                }
            }
            CaptureJob::Upload {
                generation,
                slot,
                jpeg,
            } => {
                log::debug!(
                    "Capture thread: uploading {} bytes for {} (generation {})",
                    jpeg.len(),
                    slot,
                    generation
                );
                let result = runtime.block_on(client.identify(&slot.element_id(), jpeg));
                let _ = event_tx.send(CaptureEvent::Uploaded {
                    generation,
                    slot,
                    result,
                });
            }
            CaptureJob::Shutdown => {
                log::info!("Capture thread: received shutdown command, terminating");
                break;
            }
        }
    }
    log::info!("Capture thread exiting");
}

/// Scales a source resolution down to the capture width, preserving aspect
/// ratio. Frames at or below the limit pass through unchanged.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width <= MAX_CAPTURE_WIDTH {
        return (width, height);
    }
    let scale = MAX_CAPTURE_WIDTH as f64 / width as f64;
    let scaled_height = (height as f64 * scale).round() as u32;
    (MAX_CAPTURE_WIDTH, scaled_height.max(1))
}

/// Scales the frame if needed and encodes it to JPEG, returning the bytes
/// together with the scaled preview pixels.
fn encode_frame(frame: &CaptureFrame) -> Result<(Vec<u8>, PreviewImage), String> {
    if frame.width == 0 || frame.height == 0 {
        return Err("Frame has zero dimensions".to_string());
    }
    let expected = (frame.width as usize) * (frame.height as usize) * 4;
    if frame.rgba.len() != expected {
        return Err(format!(
            "Frame buffer size {} does not match {}x{}",
            frame.rgba.len(),
            frame.width,
            frame.height
        ));
    }

    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| "Frame buffer rejected by image container".to_string())?;

    let (target_width, target_height) = scaled_dimensions(frame.width, frame.height);
    let scaled = if (target_width, target_height) == (frame.width, frame.height) {
        image
    } else {
        image::imageops::resize(
            &image,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        )
    };

    // JPEG has no alpha channel
    let mut rgb = Vec::with_capacity((target_width as usize) * (target_height as usize) * 3);
    for pixel in scaled.as_raw().chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
    }

    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(
            &rgb,
            target_width,
            target_height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;

    if jpeg.is_empty() {
        return Err("JPEG encoder produced no data".to_string());
    }

    let preview = PreviewImage {
        rgba: scaled.into_raw(),
        width: target_width,
        height: target_height,
    };
    Ok((jpeg, preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> CaptureFrame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[120, 80, 200, 255]);
        }
        CaptureFrame {
            rgba,
            width,
            height,
        }
    }

    #[test]
    fn test_scaled_dimensions_below_limit_unchanged() {
        assert_eq!(scaled_dimensions(640, 480), (640, 480));
        assert_eq!(scaled_dimensions(960, 540), (960, 540));
    }

    #[test]
    fn test_scaled_dimensions_720p_source() {
        assert_eq!(scaled_dimensions(1280, 720), (960, 540));
    }

    #[test]
    fn test_scaled_dimensions_rounds_height() {
        // 1920x1081 -> height 1081 * 0.5 = 540.5, rounds to 541
        assert_eq!(scaled_dimensions(1920, 1081), (960, 541));
    }

    #[test]
    fn test_encode_produces_jpeg_and_scaled_preview() {
        let frame = solid_frame(1280, 720);
        let (jpeg, preview) = encode_frame(&frame).unwrap();
        assert!(!jpeg.is_empty());
        // JPEG magic bytes
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(preview.width, 960);
        assert_eq!(preview.height, 540);
        assert_eq!(preview.rgba.len(), 960 * 540 * 4);
    }

    #[test]
    fn test_encode_small_frame_keeps_resolution() {
        let frame = solid_frame(320, 240);
        let (_, preview) = encode_frame(&frame).unwrap();
        assert_eq!(preview.width, 320);
        assert_eq!(preview.height, 240);
    }

    #[test]
    fn test_encode_rejects_mismatched_buffer() {
        let frame = CaptureFrame {
            rgba: vec![0; 16],
            width: 100,
            height: 100,
        };
        assert!(encode_frame(&frame).is_err());
    }

    #[test]
    fn test_encode_rejects_zero_dimensions() {
        let frame = CaptureFrame {
            rgba: Vec::new(),
            width: 0,
            height: 0,
        };
        assert!(encode_frame(&frame).is_err());
    }
}
