// =============================================================================
// VIDEO PLAYER - WORKER-THREAD FFMPEG PIPELINE WITH A UI-SIDE HANDLE
// =============================================================================
//
// The player decodes the loaded file with an ffmpeg child process streaming
// raw RGB24 frames at the video's native resolution. Decoding runs on a worker
// thread; the GUI talks to it exclusively through channels and keeps the most
// recent decoded frame, which is what a capture operates on.
//
// Loading a new video kills the previous decode process before starting the
// next one, so at most one pipeline is ever alive.
//
// =============================================================================

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use egui::{Context, TextureHandle};

use crate::video::probe::VideoInfo;

/// Raw decoded frame, RGBA, native resolution.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
}

/// Commands sent to the decode thread
#[derive(Debug)]
enum PlayerCommand {
    Load(PathBuf, VideoInfo),
    Play,
    Pause,
    Seek(f64),
    Shutdown,
}

/// Status updates from the decode thread
#[derive(Debug, Clone)]
enum PlayerStatus {
    Loaded,
    Playing,
    Paused,
    Position(f64),
    Ended,
    Error(String),
}

/// UI-visible playback state, gating the transport controls.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    Unloaded,
    Loading,
    Ready,
    Playing,
    Paused,
    Error(String),
}

impl PlayerState {
    pub fn can_play(&self) -> bool {
        matches!(self, PlayerState::Ready | PlayerState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    pub fn can_seek(&self) -> bool {
        matches!(
            self,
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused
        )
    }

    /// True once a video is loaded, whatever the transport is doing.
    pub fn is_loaded(&self) -> bool {
        matches!(
            self,
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused
        )
    }

    pub fn display_text(&self) -> &str {
        match self {
            PlayerState::Unloaded => "No video loaded",
            PlayerState::Loading => "Loading video...",
            PlayerState::Ready => "Ready",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Error(msg) => msg,
        }
    }
}

/// Video player handle owned by the GUI. All playback work happens on the
/// worker thread; this side sends commands, polls status and keeps the
/// latest decoded frame plus its texture.
pub struct VideoPlayer {
    command_sender: mpsc::Sender<PlayerCommand>,
    status_receiver: mpsc::Receiver<PlayerStatus>,
    frame_receiver: mpsc::Receiver<VideoFrame>,
    thread_handle: Option<std::thread::JoinHandle<()>>,

    state: PlayerState,
    info: Option<VideoInfo>,
    position: f64,
    latest_frame: Option<VideoFrame>,
    texture_handle: Option<TextureHandle>,
}

impl VideoPlayer {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (status_tx, status_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();

        let handle = std::thread::spawn(move || {
            decode_thread(cmd_rx, status_tx, frame_tx);
        });

        Self {
            command_sender: cmd_tx,
            status_receiver: status_rx,
            frame_receiver: frame_rx,
            thread_handle: Some(handle),
            state: PlayerState::Unloaded,
            info: None,
            position: 0.0,
            latest_frame: None,
            texture_handle: None,
        }
    }

    /// Binds a probed file to the decode pipeline, releasing any previous
    /// one, and starts playback. Playback failing to start is tolerated;
    /// the worker reports Paused and the video stays seekable.
    pub fn load(&mut self, path: PathBuf, info: VideoInfo) {
        log::info!(
            "Loading video {:?} ({}x{}, {:.2}s)",
            path,
            info.width,
            info.height,
            info.duration
        );
        self.state = PlayerState::Loading;
        self.position = 0.0;
        self.latest_frame = None;
        self.texture_handle = None;
        self.info = Some(info.clone());
        self.send(PlayerCommand::Load(path, info));
        self.send(PlayerCommand::Play);
    }

    pub fn play(&mut self) {
        if !self.state.can_play() {
            log::warn!("Cannot play in current state: {:?}", self.state);
            return;
        }
        self.state = PlayerState::Playing;
        self.send(PlayerCommand::Play);
    }

    pub fn pause(&mut self) {
        if !self.state.can_pause() {
            log::warn!("Cannot pause in current state: {:?}", self.state);
            return;
        }
        self.state = PlayerState::Paused;
        self.send(PlayerCommand::Pause);
    }

    pub fn toggle_playback(&mut self) {
        if self.state.can_pause() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&mut self, timestamp: f64) {
        if !self.state.can_seek() {
            log::warn!("Cannot seek in current state: {:?}", self.state);
            return;
        }
        let clamped = if timestamp.is_finite() {
            timestamp.clamp(0.0, self.duration())
        } else {
            log::warn!("Invalid seek timestamp: {}", timestamp);
            0.0
        };
        self.position = clamped;
        self.send(PlayerCommand::Seek(clamped));
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.info.as_ref().map(|i| i.duration).unwrap_or(0.0)
    }

    /// The most recent decoded frame; this is what a capture clones.
    pub fn latest_frame(&self) -> Option<&VideoFrame> {
        self.latest_frame.as_ref()
    }

    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture_handle.as_ref()
    }

    /// Drains worker status and frames. Called once per GUI frame.
    pub fn update(&mut self, ctx: &Context) {
        while let Ok(status) = self.status_receiver.try_recv() {
            match status {
                PlayerStatus::Loaded => {
                    self.state = PlayerState::Ready;
                }
                PlayerStatus::Playing => {
                    self.state = PlayerState::Playing;
                }
                PlayerStatus::Paused => {
                    if self.state != PlayerState::Loading {
                        self.state = PlayerState::Paused;
                    }
                }
                PlayerStatus::Position(position) => {
                    self.position = position;
                }
                PlayerStatus::Ended => {
                    self.state = PlayerState::Paused;
                    self.position = self.duration();
                }
                PlayerStatus::Error(msg) => {
                    log::error!("Video player error: {}", msg);
                    self.state = PlayerState::Error(msg);
                }
            }
        }

        // Keep only the newest frame when the worker got ahead of the GUI
        let mut newest: Option<VideoFrame> = None;
        while let Ok(frame) = self.frame_receiver.try_recv() {
            newest = Some(frame);
        }
        if let Some(frame) = newest {
            if frame.rgba.len() == (frame.width * frame.height * 4) as usize {
                let color_image = egui::ColorImage::from_rgba_unmultiplied(
                    [frame.width as usize, frame.height as usize],
                    &frame.rgba,
                );
                self.texture_handle = Some(ctx.load_texture(
                    "video_frame",
                    color_image,
                    egui::TextureOptions::LINEAR,
                ));
                self.latest_frame = Some(frame);
            } else {
                log::warn!(
                    "Dropping frame with bad data size: expected {}, got {}",
                    frame.width * frame.height * 4,
                    frame.rgba.len()
                );
            }
        }
    }

    fn send(&self, command: PlayerCommand) {
        let _ = self.command_sender.send(command);
    }
}

impl Default for VideoPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        log::debug!("VideoPlayer::drop() - sending shutdown command");
        let _ = self.command_sender.send(PlayerCommand::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            // Try to join with a reasonable timeout by attempting multiple times
            for attempt in 1..=5 {
                if handle.is_finished() {
                    log::debug!("VideoPlayer::drop() - thread finished, joining");
                    let _ = handle.join();
                    return;
                }
                log::debug!(
                    "VideoPlayer::drop() - attempt {} - waiting for thread to finish",
                    attempt
                );
                std::thread::sleep(Duration::from_millis(200));
            }

            log::warn!(
                "VideoPlayer::drop() - thread did not finish after 1 second, abandoning join"
            );
        }
    }
}

// =============================================================================
// DECODE THREAD
// =============================================================================

struct DecodeState {
    path: Option<PathBuf>,
    info: Option<VideoInfo>,
    position: f64,
    playing: bool,
    process: Option<Child>,
    last_frame_at: Option<Instant>,
}

impl DecodeState {
    fn new() -> Self {
        Self {
            path: None,
            info: None,
            position: 0.0,
            playing: false,
            process: None,
            last_frame_at: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        let rate = self.info.as_ref().map(|i| i.frame_rate).unwrap_or(30.0);
        Duration::from_secs_f64(1.0 / rate)
    }

    fn duration(&self) -> f64 {
        self.info.as_ref().map(|i| i.duration).unwrap_or(0.0)
    }

    fn kill_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
            log::debug!("Decode thread: killed ffmpeg process");
        }
    }
}

fn decode_thread(
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    status_tx: mpsc::Sender<PlayerStatus>,
    frame_tx: mpsc::Sender<VideoFrame>,
) {
    let mut state = DecodeState::new();

    'outer: loop {
        // Drain all pending commands, coalescing a burst of seeks (slider
        // drags) into the last position so we restart ffmpeg at most once.
        let mut pending_seek: Option<f64> = None;
        loop {
            let command = if state.playing {
                match cmd_rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break 'outer,
                }
            } else if pending_seek.is_some() {
                // Finish draining before acting on the queued seek
                match cmd_rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break 'outer,
                }
            } else {
                // Paused and idle: block briefly instead of spinning
                match cmd_rx.recv_timeout(Duration::from_millis(15)) {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::RecvTimeoutError::Timeout) => None,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break 'outer,
                }
            };

            let Some(command) = command else { break };
            match command {
                PlayerCommand::Load(path, info) => {
                    log::info!("Decode thread: loading {:?}", path);
                    state.kill_process();
                    state.path = Some(path);
                    state.info = Some(info);
                    state.position = 0.0;
                    state.playing = false;
                    pending_seek = None;
                    let _ = status_tx.send(PlayerStatus::Loaded);

                    // Show the first frame right away
                    extract_and_send(&state, 0.0, &frame_tx);
                }
                PlayerCommand::Play => {
                    if state.path.is_none() {
                        continue;
                    }
                    match start_stream(&state) {
                        Ok(process) => {
                            state.kill_process();
                            state.process = Some(process);
                            state.playing = true;
                            state.last_frame_at = None;
                            let _ = status_tx.send(PlayerStatus::Playing);
                        }
                        Err(e) => {
                            // Tolerated: the video stays loaded and seekable
                            log::warn!("Decode thread: playback failed to start: {}", e);
                            state.playing = false;
                            let _ = status_tx.send(PlayerStatus::Paused);
                        }
                    }
                }
                PlayerCommand::Pause => {
                    state.playing = false;
                    state.kill_process();
                    let _ = status_tx.send(PlayerStatus::Paused);
                    let _ = status_tx.send(PlayerStatus::Position(state.position));
                }
                PlayerCommand::Seek(position) => {
                    pending_seek = Some(position.max(0.0).min(state.duration()));
                }
                PlayerCommand::Shutdown => {
                    log::info!("Decode thread: received shutdown command, terminating");
                    break 'outer;
                }
            }
        }

        if let Some(position) = pending_seek {
            state.position = position;
            if state.playing {
                // Restart the stream at the new position
                state.kill_process();
                match start_stream(&state) {
                    Ok(process) => {
                        state.process = Some(process);
                        state.last_frame_at = None;
                    }
                    Err(e) => {
                        log::error!("Decode thread: failed to restart after seek: {}", e);
                        state.playing = false;
                        let _ = status_tx.send(PlayerStatus::Paused);
                    }
                }
            } else {
                // While paused the displayed frame tracks the slider
                extract_and_send(&state, position, &frame_tx);
            }
            let _ = status_tx.send(PlayerStatus::Position(state.position));
        }

        if !state.playing {
            continue;
        }

        // Paced streaming: one frame per interval, commands checked between
        let interval = state.frame_interval();
        if let Some(last) = state.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }

        match read_stream_frame(&mut state) {
            Ok(Some(frame)) => {
                state.last_frame_at = Some(Instant::now());
                state.position = (state.position + interval.as_secs_f64()).min(state.duration());
                let timestamp = state.position;
                let _ = frame_tx.send(VideoFrame { timestamp, ..frame });
                let _ = status_tx.send(PlayerStatus::Position(state.position));
            }
            Ok(None) => {
                // End of stream: pause at the final position
                log::info!("Decode thread: stream ended at {:.2}s", state.position);
                state.playing = false;
                state.kill_process();
                let _ = status_tx.send(PlayerStatus::Ended);
            }
            Err(e) => {
                log::error!("Decode thread: frame read failed: {}", e);
                state.playing = false;
                state.kill_process();
                let _ = status_tx.send(PlayerStatus::Error(e));
            }
        }
    }

    state.kill_process();
    log::info!("Decode thread exiting");
}

/// Spawns ffmpeg streaming raw RGB24 at native resolution from the current
/// position.
fn start_stream(state: &DecodeState) -> Result<Child, String> {
    let path = state.path.as_ref().ok_or("No video loaded")?;
    let path_str = path.to_str().ok_or("Invalid path")?;

    Command::new("ffmpeg")
        .args([
            "-ss",
            &format!("{:.6}", state.position),
            "-i",
            path_str,
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-v",
            "quiet",
            "-",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to spawn ffmpeg: {}", e))
}

/// Reads one frame from the streaming process. Ok(None) means end of stream.
fn read_stream_frame(state: &mut DecodeState) -> Result<Option<VideoFrame>, String> {
    let info = state.info.clone().ok_or("No video loaded")?;
    let Some(process) = state.process.as_mut() else {
        return Ok(None);
    };
    let stdout = process.stdout.as_mut().ok_or("ffmpeg stdout not piped")?;

    let frame_size = (info.width * info.height * 3) as usize;
    let mut buffer = vec![0u8; frame_size];
    match stdout.read_exact(&mut buffer) {
        Ok(()) => Ok(Some(VideoFrame {
            rgba: rgb24_to_rgba(&buffer),
            width: info.width,
            height: info.height,
            timestamp: state.position,
        })),
        // EOF mid-frame counts as end of stream too
        Err(_) => Ok(None),
    }
}

/// One-shot extraction of the frame at `timestamp`, used while paused.
fn extract_and_send(state: &DecodeState, timestamp: f64, frame_tx: &mpsc::Sender<VideoFrame>) {
    match extract_frame(state, timestamp) {
        Ok(frame) => {
            let _ = frame_tx.send(frame);
        }
        Err(e) => {
            log::warn!(
                "Decode thread: failed to extract frame at {:.2}s: {}",
                timestamp,
                e
            );
        }
    }
}

fn extract_frame(state: &DecodeState, timestamp: f64) -> Result<VideoFrame, String> {
    let path = state.path.as_ref().ok_or("No video loaded")?;
    let info = state.info.as_ref().ok_or("No video loaded")?;

    let output = Command::new("ffmpeg")
        .args([
            "-ss",
            &format!("{:.6}", timestamp),
            "-i",
            path.to_str().ok_or("Invalid path")?,
            "-vframes",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-v",
            "quiet",
            "-",
        ])
        .output()
        .map_err(|e| format!("ffmpeg execution failed: {}", e))?;

    if !output.status.success() {
        return Err(format!(
            "ffmpeg failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let expected_size = (info.width * info.height * 3) as usize;
    if output.stdout.len() != expected_size {
        return Err(format!(
            "Unexpected frame size: {} (expected {})",
            output.stdout.len(),
            expected_size
        ));
    }

    Ok(VideoFrame {
        rgba: rgb24_to_rgba(&output.stdout),
        width: info.width,
        height: info.height,
        timestamp,
    })
}

fn rgb24_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for chunk in rgb.chunks_exact(3) {
        rgba.extend_from_slice(chunk);
        rgba.push(255);
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb24_to_rgba_conversion() {
        let rgb = vec![10, 20, 30, 40, 50, 60];
        let rgba = rgb24_to_rgba(&rgb);
        assert_eq!(rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_player_initial_state() {
        let player = VideoPlayer::new();
        assert_eq!(*player.state(), PlayerState::Unloaded);
        assert_eq!(player.position(), 0.0);
        assert_eq!(player.duration(), 0.0);
        assert!(player.latest_frame().is_none());
        assert!(player.texture().is_none());
        assert!(!player.state().is_loaded());
    }

    #[test]
    fn test_state_predicates() {
        assert!(PlayerState::Ready.can_play());
        assert!(PlayerState::Paused.can_play());
        assert!(!PlayerState::Playing.can_play());
        assert!(PlayerState::Playing.can_pause());
        assert!(!PlayerState::Unloaded.can_pause());
        assert!(PlayerState::Ready.can_seek());
        assert!(PlayerState::Playing.can_seek());
        assert!(PlayerState::Paused.can_seek());
        assert!(!PlayerState::Unloaded.can_seek());
        assert!(!PlayerState::Loading.can_seek());
        assert!(!PlayerState::Error("x".to_string()).is_loaded());
    }

    #[test]
    fn test_play_ignored_when_unloaded() {
        let mut player = VideoPlayer::new();
        player.play();
        assert_eq!(*player.state(), PlayerState::Unloaded);
        player.seek(10.0);
        assert_eq!(player.position(), 0.0);
    }

    #[test]
    fn test_load_enters_loading_state() {
        let mut player = VideoPlayer::new();
        player.load(
            PathBuf::from("test.mp4"),
            VideoInfo {
                duration: 60.0,
                width: 1280,
                height: 720,
                frame_rate: 30.0,
            },
        );
        assert_eq!(*player.state(), PlayerState::Loading);
        assert_eq!(player.duration(), 60.0);
        assert_eq!(player.position(), 0.0);
        assert!(!player.state().can_play());
    }
}
