//! FFprobe metadata probing.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use fpipe_models::VideoMetadata;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    nb_read_frames: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file for the canonical job metadata.
///
/// Fails with [`MediaError::UnreadableSource`] when the file cannot be
/// opened, has no video stream, or reports a non-positive frame count or
/// geometry.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::unreadable_source(format!(
            "no such file: {}",
            path.display()
        )));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-count_frames",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::unreadable_source(format!(
            "ffprobe rejected {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unreadable_source("no video stream found"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    // Prefer the decoder's counted frames (exact, from -count_frames), then
    // the demuxer's declared count, then duration * fps.
    let total_frames = video_stream
        .nb_read_frames
        .as_ref()
        .or(video_stream.nb_frames.as_ref())
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| {
            probe
                .format
                .duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok())
                .map(|d| (d * fps).round() as u64)
        })
        .unwrap_or(0);

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);

    if total_frames == 0 || width == 0 || height == 0 || fps <= 0.0 {
        return Err(MediaError::unreadable_source(format!(
            "invalid metadata for {}: {total_frames} frames, {width}x{height} @ {fps}",
            path.display()
        )));
    }

    Ok(VideoMetadata {
        total_frames,
        width,
        height,
        fps,
        codec_tag: video_stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse a frame rate string (e.g. "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}
