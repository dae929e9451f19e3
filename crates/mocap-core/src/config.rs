use serde::{Deserialize, Serialize};

/// Sensor output size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Express a pixel coordinate as a `(0,1)×(0,1)` fraction of the frame.
    #[inline]
    pub fn normalize(&self, x: f64, y: f64) -> [f64; 2] {
        [x / self.width as f64, y / self.height as f64]
    }

    /// Inverse of [`Resolution::normalize`].
    #[inline]
    pub fn denormalize(&self, u: f64, v: f64) -> [f64; 2] {
        [u * self.width as f64, v * self.height as f64]
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1632, 1232)
    }
}

/// Manual white balance gains `(red, blue)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwbGains {
    pub red: f64,
    pub blue: f64,
}

impl Default for AwbGains {
    fn default() -> Self {
        Self {
            red: 1.5,
            blue: 1.5,
        }
    }
}

/// Frame rates offered by the operator console.
pub const FRAME_RATE_PRESETS: [u32; 6] = [24, 18, 15, 12, 6, 3];
/// Recording durations (seconds) offered by the operator console.
pub const DURATION_PRESETS: [u32; 5] = [30, 15, 10, 5, 1];
/// ISO values offered by the operator console; `0` lets the sensor choose.
pub const ISO_PRESETS: [u32; 5] = [0, 100, 200, 400, 800];
/// Shutter speeds in microseconds; `0` lets the sensor choose.
pub const SHUTTER_PRESETS: [u32; 8] = [0, 16000, 8000, 4000, 2000, 1000, 500, 250];

fn default_frame_rate() -> u32 {
    24
}

fn default_max_recording() -> u32 {
    30
}

fn default_awb_mode() -> String {
    "off".to_string()
}

/// Sensor settings pushed to every node during the handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Maximum recording length in seconds.
    #[serde(default = "default_max_recording")]
    pub max_recording: u32,
    #[serde(default)]
    pub iso: u32,
    /// Shutter speed in microseconds.
    #[serde(default)]
    pub shutter_speed: u32,
    #[serde(default = "default_awb_mode")]
    pub awb_mode: String,
    #[serde(default)]
    pub awb_gains: AwbGains,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            frame_rate: default_frame_rate(),
            max_recording: default_max_recording(),
            iso: 0,
            shutter_speed: 0,
            awb_mode: default_awb_mode(),
            awb_gains: AwbGains::default(),
        }
    }
}

impl CaptureConfig {
    /// Upper bound on the number of frames one node can record.
    pub fn max_frames(&self) -> usize {
        self.frame_rate as usize * self.max_recording as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let cfg: CaptureConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg, CaptureConfig::default());
        assert_eq!(cfg.max_frames(), 24 * 30);
    }

    #[test]
    fn normalization_is_invertible() {
        let res = Resolution::new(1632, 1232);
        let [u, v] = res.normalize(816.0, 308.0);
        assert_eq!([u, v], [0.5, 0.25]);
        assert_eq!(res.denormalize(u, v), [816.0, 308.0]);
    }
}
