pub mod client;
pub mod controller;
pub mod fragment;
pub mod pipeline;

pub use client::{IdentifyClient, IdentifyError};
pub use controller::{CaptureController, CapturePhase, GridTileSwap, TileSwap};
pub use pipeline::{CaptureEvent, CaptureFrame, CapturePipeline};
