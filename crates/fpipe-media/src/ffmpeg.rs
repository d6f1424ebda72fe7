//! FFmpeg-backed codec.
//!
//! Decode and encode run as ffmpeg subprocesses moving packed RGB24
//! rawvideo over pipes; segment concatenation uses the concat demuxer with
//! a stream copy, driven by a temporary manifest file.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use fpipe_models::VideoMetadata;

use crate::codec::{FramePull, FrameSink, FrameSource, VideoCodec};
use crate::error::{MediaError, MediaResult};
use crate::probe;

/// Codec backed by ffmpeg/ffprobe subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegCodec;

impl FfmpegCodec {
    /// Create a new codec handle.
    pub fn new() -> Self {
        Self
    }
}

struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    frame_size: usize,
    finished: bool,
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<FramePull> {
        if self.finished {
            return Ok(FramePull::End);
        }

        let mut frame = vec![0u8; self.frame_size];
        let mut filled = 0usize;
        while filled < self.frame_size {
            let n = self.stdout.read(&mut frame[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finished = true;
            let _ = self.child.wait().await;
            return Ok(FramePull::End);
        }
        if filled < self.frame_size {
            // Trailing partial frame from the decoder: surface it as corrupt
            // once, then end.
            warn!(
                bytes = filled,
                expected = self.frame_size,
                "partial frame at end of decode stream"
            );
            self.finished = true;
            let _ = self.child.wait().await;
            return Ok(FramePull::Corrupt);
        }

        Ok(FramePull::Frame(frame))
    }
}

struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_size: usize,
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()> {
        if frame.len() != self.frame_size {
            return Err(MediaError::geometry_mismatch(format!(
                "frame is {} bytes, sink expects {}",
                frame.len(),
                self.frame_size
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::ffmpeg_failed("sink already finished", None, None))?;
        stdin.write_all(frame).await?;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
            drop(stdin);
        }

        let status = self.child.wait().await?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "encoder exited with non-zero status",
                None,
                status.code(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoCodec for FfmpegCodec {
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata> {
        probe::probe_video(path).await
    }

    async fn open_source(
        &self,
        path: &Path,
        meta: &VideoMetadata,
        start_frame: u64,
    ) -> MediaResult<Box<dyn FrameSource>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        // Frame-accurate positioning: select drops everything before
        // start_frame, vsync passthrough keeps the frame count exact.
        let select = format!("select=gte(n\\,{start_frame})");
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vf",
                select.as_str(),
                "-vsync",
                "0",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("decoder stdout not captured", None, None))?;

        debug!(input = %path.display(), start_frame, "decoder started");
        Ok(Box::new(FfmpegFrameSource {
            child,
            stdout,
            frame_size: meta.frame_size(),
            finished: false,
        }))
    }

    async fn create_sink(
        &self,
        path: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<Box<dyn FrameSink>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let size = format!("{}x{}", meta.width, meta.height);
        let rate = format!("{}", meta.fps);
        // MJPEG segments: every frame is independent, so stream-copy concat
        // of finished segments stays lossless.
        let mut child = Command::new("ffmpeg")
            .args([
                "-v",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                size.as_str(),
                "-r",
                rate.as_str(),
                "-i",
                "pipe:0",
                "-c:v",
                "mjpeg",
                "-q:v",
                "3",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("encoder stdin not captured", None, None))?;

        debug!(output = %path.display(), %size, %rate, "encoder started");
        Ok(Box::new(FfmpegFrameSink {
            child,
            stdin: Some(stdin),
            frame_size: meta.frame_size(),
        }))
    }

    async fn concat(
        &self,
        segments: &[PathBuf],
        output: &Path,
        _meta: &VideoMetadata,
    ) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let manifest = output.with_extension("txt");
        let mut listing = String::new();
        for segment in segments {
            let escaped = segment.display().to_string().replace('\'', "'\\''");
            listing.push_str(&format!("file '{escaped}'\n"));
        }
        tokio::fs::write(&manifest, listing).await?;

        let result = Command::new("ffmpeg")
            .args(["-v", "error", "-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&manifest)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&manifest).await {
            warn!(manifest = %manifest.display(), "failed to remove concat manifest: {}", e);
        }

        let output_result = result?;
        if !output_result.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "concat failed",
                Some(String::from_utf8_lossy(&output_result.stderr).to_string()),
                output_result.status.code(),
            ));
        }

        Ok(())
    }

    fn extension(&self) -> &'static str {
        "avi"
    }
}
