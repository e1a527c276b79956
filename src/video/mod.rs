pub mod player;
pub mod probe;

pub use player::{PlayerState, VideoFrame, VideoPlayer};
pub use probe::{VideoInfo, VideoProbe};
