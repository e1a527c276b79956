use std::path::Path;
use std::process::Command;

/// Metadata for a loaded video file, probed once at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

pub struct VideoProbe;

impl VideoProbe {
    /// Runs ffprobe against the file and extracts duration, dimensions and
    /// frame rate from its JSON output.
    pub fn probe(file_path: &Path) -> anyhow::Result<VideoInfo> {
        let output = Command::new("ffprobe")
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(file_path)
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to run ffprobe: {}", e))?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "ffprobe failed for {}: {}",
                file_path.display(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let info = Self::parse_probe_output(&output.stdout)?;
        log::info!(
            "Probed {}: {:.2}s, {}x{}, {:.2} FPS",
            file_path.display(),
            info.duration,
            info.width,
            info.height,
            info.frame_rate
        );
        Ok(info)
    }

    fn parse_probe_output(raw: &[u8]) -> anyhow::Result<VideoInfo> {
        let json: serde_json::Value = serde_json::from_slice(raw)?;

        let duration = json["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        let empty_vec = vec![];
        let streams = json["streams"].as_array().unwrap_or(&empty_vec);
        let video_stream = streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"))
            .ok_or_else(|| anyhow::anyhow!("No video stream found"))?;

        let width = video_stream["width"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("Video stream has no width"))? as u32;
        let height = video_stream["height"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("Video stream has no height"))? as u32;

        let frame_rate = video_stream["r_frame_rate"]
            .as_str()
            .map(Self::parse_frame_rate)
            .unwrap_or(30.0);

        Ok(VideoInfo {
            duration,
            width,
            height,
            frame_rate,
        })
    }

    /// Parses ffprobe's frame rate string ("30/1", "30000/1001" or "29.97").
    fn parse_frame_rate(fps_str: &str) -> f64 {
        let fps = if let Some((numerator, denominator)) = fps_str.split_once('/') {
            let numerator: f64 = numerator.parse().unwrap_or(30.0);
            let denominator: f64 = denominator.parse().unwrap_or(1.0);
            if denominator != 0.0 {
                numerator / denominator
            } else {
                30.0
            }
        } else {
            fps_str.parse().unwrap_or(30.0)
        };

        // Clamp to a sane range so a bad probe can't wreck playback pacing
        if fps.is_finite() && fps > 0.0 {
            fps.clamp(1.0, 1000.0)
        } else {
            30.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate_fraction() {
        assert_eq!(VideoProbe::parse_frame_rate("30/1"), 30.0);
        assert_eq!(VideoProbe::parse_frame_rate("60/1"), 60.0);
        let ntsc = VideoProbe::parse_frame_rate("30000/1001");
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate_direct_value() {
        assert_eq!(VideoProbe::parse_frame_rate("25"), 25.0);
        assert!((VideoProbe::parse_frame_rate("29.97") - 29.97).abs() < 0.001);
    }

    #[test]
    fn test_parse_frame_rate_bad_input_falls_back() {
        assert_eq!(VideoProbe::parse_frame_rate("garbage"), 30.0);
        assert_eq!(VideoProbe::parse_frame_rate("30/0"), 30.0);
    }

    #[test]
    fn test_parse_frame_rate_clamped() {
        assert_eq!(VideoProbe::parse_frame_rate("100000/1"), 1000.0);
        assert_eq!(VideoProbe::parse_frame_rate("0/1"), 30.0);
    }

    #[test]
    fn test_parse_probe_output() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "sample_rate": "48000"},
                {"codec_type": "video", "width": 1280, "height": 720, "r_frame_rate": "60/1"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = VideoProbe::parse_probe_output(raw).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.frame_rate, 60.0);
        assert!((info.duration - 12.48).abs() < 0.001);
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let raw = br#"{
            "streams": [{"codec_type": "audio"}],
            "format": {"duration": "3.0"}
        }"#;
        assert!(VideoProbe::parse_probe_output(raw).is_err());
    }
}
