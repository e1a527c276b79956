//! The capture/upload controller: owns the grid, the circular slot pointer,
//! the single-in-flight phase flag and the grid generation counter. All of it
//! lives on the UI thread; worker outcomes arrive as method calls made while
//! pumping the pipeline's events.

use crate::core::slots::{PreviewImage, SlotCursor, SlotGrid, SlotId};
use crate::identify::client::IdentifyError;
use crate::identify::fragment::{self, Element};

/// Status line texts shown in the application shell.
pub mod status {
    pub const CHOOSE_FILE: &str = "Please choose a video file first.";
    pub const VIDEO_LOADED: &str = "Video loaded. Seek to a frame, then press Capture (or C).";
    pub const GRID_CLEARED: &str = "Grid cleared.";
    pub const VIDEO_NOT_READY: &str = "Video not ready yet.";
    pub const CAPTURE_FAILED: &str = "Failed to capture frame.";
    pub const IDENTIFYING: &str = "Identifying…";
    pub const DONE: &str = "Done. Capture another frame when ready.";
    pub const IDENTIFY_ERROR: &str = "Error during identification.";
}

/// Capture workflow phase. Capturing spans the whole exchange, from the
/// encode job until its upload outcome lands, and blocks re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Capturing,
}

/// Replaces a tile's content with the fragment the endpoint returned.
/// Injected so tests can observe the replacement.
pub trait TileSwap {
    fn swap(&mut self, grid: &mut SlotGrid, slot: SlotId, fragment: Element);
}

/// Production strategy: in-place fill of the grid slot.
pub struct GridTileSwap;

impl TileSwap for GridTileSwap {
    fn swap(&mut self, grid: &mut SlotGrid, slot: SlotId, fragment: Element) {
        grid.fill(slot, fragment);
    }
}

pub struct CaptureController {
    grid: SlotGrid,
    cursor: SlotCursor,
    phase: CapturePhase,
    /// Bumped on every grid clear; events stamped with an older value are
    /// outcomes of exchanges the clear disowned.
    generation: u64,
    swap: Box<dyn TileSwap>,
}

impl CaptureController {
    pub fn new(swap: Box<dyn TileSwap>) -> Self {
        Self {
            grid: SlotGrid::new(),
            cursor: SlotCursor::new(),
            phase: CapturePhase::Idle,
            generation: 0,
            swap,
        }
    }

    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn is_capturing(&self) -> bool {
        self.phase == CapturePhase::Capturing
    }

    /// The slot the next capture will target.
    pub fn next_slot(&self) -> SlotId {
        self.cursor.peek()
    }

    /// Starts a capture, returning the generation to stamp its jobs with.
    /// Returns None while another capture is in flight; that trigger is
    /// dropped, not queued.
    pub fn begin_capture(&mut self) -> Option<u64> {
        if self.phase == CapturePhase::Capturing {
            log::debug!("Capture trigger ignored, an exchange is already in flight");
            return None;
        }
        self.phase = CapturePhase::Capturing;
        Some(self.generation)
    }

    /// The frame was encoded: selects the target slot, advances the pointer
    /// and puts the slot into its uploading display. Returns the slot the
    /// upload must be issued for, or None when the grid was cleared since
    /// the capture started (the payload is dropped and the phase released).
    pub fn on_encoded(&mut self, generation: u64, preview: PreviewImage) -> Option<SlotId> {
        if generation != self.generation {
            log::debug!(
                "Discarding encoded frame from generation {} (current {})",
                generation,
                self.generation
            );
            self.phase = CapturePhase::Idle;
            return None;
        }
        let slot = self.cursor.take_next();
        log::info!("Captured frame assigned to {}", slot);
        self.grid.set_uploading(slot, preview);
        Some(slot)
    }

    /// Encoding produced no usable image. The phase is released and the slot
    /// pointer stays where it was; no slot had been selected yet.
    pub fn on_encode_failed(&mut self, generation: u64, reason: &str) -> Option<&'static str> {
        self.phase = CapturePhase::Idle;
        if generation != self.generation {
            return None;
        }
        log::error!("Frame capture failed: {}", reason);
        Some(status::CAPTURE_FAILED)
    }

    /// The exchange finished. Returns the status line to show, or None when
    /// the outcome belongs to a cleared generation and is ignored.
    pub fn on_uploaded(
        &mut self,
        generation: u64,
        slot: SlotId,
        result: Result<String, IdentifyError>,
    ) -> Option<&'static str> {
        self.phase = CapturePhase::Idle;
        if generation != self.generation {
            log::debug!(
                "Discarding upload outcome for {} from generation {} (current {})",
                slot,
                generation,
                self.generation
            );
            return None;
        }

        let outcome = result.and_then(|body| Ok(fragment::parse(&body)?));
        match outcome {
            Ok(root) => {
                let expected = slot.element_id();
                if root.id() != Some(expected.as_str()) {
                    log::warn!(
                        "Fragment root id {:?} does not match target {}, swapping anyway",
                        root.id(),
                        slot
                    );
                }
                self.swap.swap(&mut self.grid, slot, root);
                Some(status::DONE)
            }
            Err(e) => {
                log::error!("Identification failed for {}: {}", slot, e);
                self.grid.mark_failed(slot);
                Some(status::IDENTIFY_ERROR)
            }
        }
    }

    /// Resets every slot to empty and the pointer to slot 1. An in-flight
    /// exchange keeps the phase until its outcome lands, where the bumped
    /// generation disowns it.
    pub fn clear_grid(&mut self) -> &'static str {
        self.generation += 1;
        self.grid.clear_all();
        self.cursor.reset();
        log::info!("Grid cleared (generation {})", self.generation);
        status::GRID_CLEARED
    }
}
