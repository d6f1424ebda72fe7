//! Pixel filter engine.
//!
//! All filters operate in place on one packed RGB24 frame and parallelize
//! over independent pixel or row regions with rayon. Kernels that read
//! neighborhoods (blur, edge detection) take an unmodified snapshot of the
//! input first, so no parallel unit ever observes partially-written output.

use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, warn};

use fpipe_models::{FilterKind, VideoMetadata};

use crate::accel::{AccelError, FilterAccelerator};

/// Luma in thousandths: `0.299 R + 0.587 G + 0.114 B`, truncated.
///
/// Integer arithmetic keeps the result exact, which makes grayscale
/// idempotent: a pixel with equal channels maps to itself.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Per-node transform statistics.
#[derive(Debug, Clone, Default)]
pub struct TransformStats {
    /// Frames transformed on the CPU path
    pub cpu_frames: u64,
    /// Frames transformed on the accelerated path
    pub accel_frames: u64,
    /// Fallbacks because the backend reported itself unavailable
    pub unavailable_fallbacks: u64,
    /// Fallbacks because an accelerated execution failed
    pub execution_fallbacks: u64,
    /// Device time spent on the accelerated path
    pub accel_time: Duration,
}

/// Applies the selected filter to frames, trying the accelerated backend
/// first and falling back to the CPU path on any accelerated failure.
pub struct FilterEngine {
    accelerator: Option<Arc<dyn FilterAccelerator>>,
    stats: TransformStats,
}

impl FilterEngine {
    /// Create an engine with an optional accelerated backend.
    pub fn new(accelerator: Option<Arc<dyn FilterAccelerator>>) -> Self {
        Self {
            accelerator,
            stats: TransformStats::default(),
        }
    }

    /// Create an engine from the one-time capability probe.
    pub fn from_probe() -> Self {
        Self::new(crate::accel::detect_accelerator())
    }

    /// Statistics accumulated so far.
    pub fn stats(&self) -> &TransformStats {
        &self.stats
    }

    /// Apply `kind` to one frame in place.
    ///
    /// The caller never sees a failed frame: accelerated unavailability or
    /// execution errors only show up in the stats, and an unavailable
    /// backend is dropped for the rest of the job.
    pub fn apply(&mut self, kind: FilterKind, frame: &mut [u8], meta: &VideoMetadata) {
        if kind == FilterKind::None {
            return;
        }

        if let Some(accelerator) = self.accelerator.clone() {
            match accelerator.apply(kind, frame, meta) {
                Ok(elapsed) => {
                    self.stats.accel_frames += 1;
                    self.stats.accel_time += elapsed;
                    return;
                }
                Err(AccelError::Unavailable) => {
                    debug!(
                        backend = accelerator.name(),
                        "accelerated backend unavailable, dropping it for this job"
                    );
                    self.stats.unavailable_fallbacks += 1;
                    self.accelerator = None;
                }
                Err(AccelError::Execution(e)) => {
                    warn!(
                        backend = accelerator.name(),
                        filter = kind.name(),
                        "accelerated execution failed, using CPU for this frame: {}",
                        e
                    );
                    self.stats.execution_fallbacks += 1;
                }
            }
        }

        apply_cpu(kind, frame, meta.width as usize, meta.height as usize);
        self.stats.cpu_frames += 1;
    }
}

/// CPU reference path for one frame.
pub fn apply_cpu(kind: FilterKind, frame: &mut [u8], width: usize, height: usize) {
    debug_assert_eq!(frame.len(), width * height * 3);
    match kind {
        FilterKind::None => {}
        FilterKind::Invert => invert(frame),
        FilterKind::Grayscale => grayscale(frame),
        FilterKind::Blur => blur(frame, width, height),
        FilterKind::EdgeDetect => edge_detect(frame, width, height),
    }
}

fn invert(frame: &mut [u8]) {
    frame.par_chunks_mut(64 * 1024).for_each(|chunk| {
        for byte in chunk {
            *byte = 255 - *byte;
        }
    });
}

fn grayscale(frame: &mut [u8]) {
    frame.par_chunks_exact_mut(3).for_each(|px| {
        let l = luma(px[0], px[1], px[2]);
        px[0] = l;
        px[1] = l;
        px[2] = l;
    });
}

fn blur(frame: &mut [u8], width: usize, height: usize) {
    let snapshot = frame.to_vec();
    let row_len = width * 3;

    frame.par_chunks_exact_mut(row_len).enumerate().for_each(|(y, row)| {
        for x in 0..width {
            let mut sum = [0u32; 3];
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = y as i64 + dy;
                    let nx = x as i64 + dx;
                    if ny >= 0 && ny < height as i64 && nx >= 0 && nx < width as i64 {
                        let idx = (ny as usize * width + nx as usize) * 3;
                        sum[0] += snapshot[idx] as u32;
                        sum[1] += snapshot[idx + 1] as u32;
                        sum[2] += snapshot[idx + 2] as u32;
                    }
                }
            }
            // Fixed 3x3 kernel: the divisor stays 9 at the borders, where
            // out-of-bounds neighbors simply contribute nothing.
            let idx = x * 3;
            row[idx] = (sum[0] / 9) as u8;
            row[idx + 1] = (sum[1] / 9) as u8;
            row[idx + 2] = (sum[2] / 9) as u8;
        }
    });
}

fn edge_detect(frame: &mut [u8], width: usize, height: usize) {
    // The Sobel kernels need a full 3x3 neighborhood; frames too small to
    // have an interior pass through untouched, like the border does.
    if width < 3 || height < 3 {
        return;
    }

    let snapshot = frame.to_vec();
    let row_len = width * 3;

    const GX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const GY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    let luma_at = |x: usize, y: usize| -> f32 {
        let idx = (y * width + x) * 3;
        (299 * snapshot[idx] as u32 + 587 * snapshot[idx + 1] as u32
            + 114 * snapshot[idx + 2] as u32) as f32
            / 1000.0
    };

    // Skip the first and last rows entirely; the one-pixel border keeps its
    // original values.
    frame[row_len..(height - 1) * row_len]
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(i, row)| {
            let y = i + 1;
            for x in 1..width - 1 {
                let mut gx = 0.0f32;
                let mut gy = 0.0f32;
                for (dy, (gx_row, gy_row)) in GX.iter().zip(GY.iter()).enumerate() {
                    for (dx, (&kx, &ky)) in gx_row.iter().zip(gy_row.iter()).enumerate() {
                        let value = luma_at(x + dx - 1, y + dy - 1);
                        gx += value * kx as f32;
                        gy += value * ky as f32;
                    }
                }
                let magnitude = (gx * gx + gy * gy).sqrt().min(255.0) as u8;
                let idx = x * 3;
                row[idx] = magnitude;
                row[idx + 1] = magnitude;
                row[idx + 2] = magnitude;
            }
        });
}
