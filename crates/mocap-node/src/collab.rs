//! Hardware and vision collaborators the agent drives but does not implement.

use std::fs;
use std::path::Path;

use image::RgbImage;
use mocap_core::{
    CameraIntrinsics, CaptureConfig, FrameDetections, MarkerColor, MarkerIdentity, Resolution,
};
use nalgebra::Point2;

use crate::{FrameArena, FrameBuffer, FrameError};

/// The camera sensor.
pub trait FrameSource: Send {
    /// Record raw frames into `buffer` until `config.max_recording` elapses
    /// or the buffer is full.
    fn record(&mut self, config: &CaptureConfig, buffer: &mut FrameBuffer) -> Result<(), FrameError>;
}

/// Raw sensor frame to RGB image.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, raw: &[u8], resolution: Resolution) -> Result<RgbImage, FrameError>;
}

/// Image to per-frame marker detections.
pub trait MarkerIdentifier: Send + Sync {
    fn identify(&self, image: &RgbImage) -> Result<FrameDetections, FrameError>;
}

/// Chessboard lens calibration over a whole recording.
pub trait LensCalibrator: Send {
    fn calibrate(
        &mut self,
        frames: &FrameArena,
        pattern: (u32, u32),
    ) -> Result<CameraIntrinsics, FrameError>;
}

/// Decoder for sensors that already deliver packed 8-bit RGB.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackedRgbDecoder;

impl FrameDecoder for PackedRgbDecoder {
    fn decode(&self, raw: &[u8], resolution: Resolution) -> Result<RgbImage, FrameError> {
        let expected = resolution.width as usize * resolution.height as usize * 3;
        if raw.len() != expected {
            return Err(FrameError::Decode(format!(
                "expected {expected} bytes for {}x{} RGB, got {}",
                resolution.width,
                resolution.height,
                raw.len()
            )));
        }
        RgbImage::from_raw(resolution.width, resolution.height, raw.to_vec())
            .ok_or_else(|| FrameError::Decode("buffer does not fit image".to_string()))
    }
}

/// Replays frames recorded earlier, e.g. for offline reprocessing.
#[derive(Clone, Debug, Default)]
pub struct ReplaySource {
    frames: Vec<Vec<u8>>,
}

impl ReplaySource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames }
    }

    /// One frame per regular file in `dir`, in file name order.
    pub fn from_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        let frames = paths.iter().map(fs::read).collect::<std::io::Result<_>>()?;
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn record(&mut self, _config: &CaptureConfig, buffer: &mut FrameBuffer) -> Result<(), FrameError> {
        for frame in self.frames.drain(..) {
            if !buffer.push(frame) {
                break;
            }
        }
        Ok(())
    }
}

/// Locates saturated blobs of each palette color by their centre of mass.
///
/// This only classifies color; detections carry no pattern. At most one blob
/// per color is reported per frame, so two markers of one color in view merge.
#[derive(Clone, Copy, Debug)]
pub struct ColorCentroidIdentifier {
    /// A channel at or above this counts as lit.
    pub high: u8,
    /// A channel at or below this counts as dark.
    pub low: u8,
    /// Smallest blob, in pixels, reported as a marker.
    pub min_pixels: usize,
}

impl Default for ColorCentroidIdentifier {
    fn default() -> Self {
        Self {
            high: 160,
            low: 90,
            min_pixels: 4,
        }
    }
}

impl ColorCentroidIdentifier {
    fn classify(&self, [r, g, b]: [u8; 3]) -> Option<MarkerColor> {
        let lit = |c: u8| {
            if c >= self.high {
                Some(true)
            } else if c <= self.low {
                Some(false)
            } else {
                None
            }
        };
        match (lit(r)?, lit(g)?, lit(b)?) {
            (true, false, false) => Some(MarkerColor::Red),
            (true, true, false) => Some(MarkerColor::Yellow),
            (false, true, false) => Some(MarkerColor::Green),
            (false, true, true) => Some(MarkerColor::Cyan),
            (false, false, true) => Some(MarkerColor::Blue),
            (true, false, true) => Some(MarkerColor::Magenta),
            _ => None,
        }
    }
}

impl MarkerIdentifier for ColorCentroidIdentifier {
    fn identify(&self, image: &RgbImage) -> Result<FrameDetections, FrameError> {
        // (sum x, sum y, count) per palette color
        let mut sums = [(0.0f64, 0.0f64, 0usize); MarkerColor::ALL.len()];
        for (x, y, pixel) in image.enumerate_pixels() {
            if let Some(color) = self.classify(pixel.0) {
                let slot = &mut sums[color as usize];
                slot.0 += x as f64;
                slot.1 += y as f64;
                slot.2 += 1;
            }
        }

        let mut map = FrameDetections::new();
        for (color, (sx, sy, n)) in MarkerColor::ALL.into_iter().zip(sums) {
            if n >= self.min_pixels.max(1) {
                let identity = MarkerIdentity {
                    color: Some(color),
                    pattern: None,
                };
                map.insert(identity, Point2::new(sx / n as f64, sy / n as f64));
            }
        }
        Ok(map)
    }
}
