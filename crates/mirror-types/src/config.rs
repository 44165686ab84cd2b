use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{MirrorError, Result};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8100";
pub const SPRINGBOARD_BUNDLE: &str = "com.apple.springboard";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub base_url: String,
    /// Multipart JPEG endpoint. Defaults to `<base_url>/mjpegstream`.
    pub stream_url: Option<String>,
    /// Fixed bundle to attach to. `None` follows the foreground app.
    pub target_bundle: Option<String>,
    pub home_bundle: String,
    pub command_timeout_ms: u64,
    pub image_timeout_ms: u64,
    pub lock_check_timeout_ms: u64,
    pub drag_timeout_floor_ms: u64,
}

impl DeviceConfig {
    pub fn stream_url(&self) -> String {
        self.stream_url
            .clone()
            .unwrap_or_else(|| format!("{}/mjpegstream", self.base_url.trim_end_matches('/')))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    pub fn lock_check_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_check_timeout_ms)
    }

    /// Drag requests block until the gesture finishes on the device, so the
    /// request budget always covers the requested swipe duration.
    pub fn drag_timeout(&self, swipe: Duration) -> Duration {
        let floor = Duration::from_millis(self.drag_timeout_floor_ms);
        floor.max(self.command_timeout() + swipe)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            stream_url: None,
            target_bundle: None,
            home_bundle: SPRINGBOARD_BUNDLE.into(),
            command_timeout_ms: 4_000,
            image_timeout_ms: 6_000,
            lock_check_timeout_ms: 2_000,
            drag_timeout_floor_ms: 6_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub unlock_poll_ms: u64,
    pub unlock_timeout_ms: u64,
    pub attach_retry_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unlock_poll_ms: 500,
            unlock_timeout_ms: 120_000,
            attach_retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub prefer_stream: bool,
    pub poll_fps: u32,
    pub stream_grace_ms: u64,
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.poll_fps.max(1)))
    }

    pub fn stream_grace(&self) -> Duration {
        Duration::from_millis(self.stream_grace_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            prefer_stream: true,
            poll_fps: 12,
            stream_grace_ms: 600,
        }
    }
}

/// Tap/swipe decision thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub tap_time_max_ms: u64,
    pub tap_move_max_px: f64,
    pub tap_move_max_pt: f64,
    pub swipe_min_pt: f64,
    pub swipe_min_duration_ms: u64,
    pub swipe_max_duration_ms: u64,
}

impl GestureConfig {
    pub fn tap_time_max(&self) -> Duration {
        Duration::from_millis(self.tap_time_max_ms)
    }

    pub fn clamp_swipe_duration(&self, requested: Duration) -> Duration {
        requested.clamp(
            Duration::from_millis(self.swipe_min_duration_ms),
            Duration::from_millis(self.swipe_max_duration_ms),
        )
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_time_max_ms: 220,
            tap_move_max_px: 10.0,
            tap_move_max_pt: 12.0,
            swipe_min_pt: 18.0,
            swipe_min_duration_ms: 120,
            swipe_max_duration_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Try the raw HTTP endpoints before the session action API.
    pub prefer_raw: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    pub recovery_attempts: u8,
    pub shutdown_grace_ms: u64,
}

impl DispatchConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefer_raw: true,
            workers: 2,
            queue_capacity: 32,
            recovery_attempts: 1,
            shutdown_grace_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub max_width: u32,
    pub max_height: u32,
    pub target_fps: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "iPhone".into(),
            max_width: 900,
            max_height: 1600,
            target_fps: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub device: DeviceConfig,
    pub session: SessionConfig,
    pub capture: CaptureConfig,
    pub gesture: GestureConfig,
    pub dispatch: DispatchConfig,
    pub display: DisplayConfig,
    pub ops: OpsConfig,
}

impl MirrorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            MirrorError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            MirrorError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.base_url.trim().is_empty() {
            return Err(MirrorError::Configuration(
                "device.base_url must not be empty".into(),
            ));
        }
        if self.capture.poll_fps == 0 {
            return Err(MirrorError::Configuration(
                "capture.poll_fps must be greater than zero".into(),
            ));
        }
        if self.dispatch.workers == 0 {
            return Err(MirrorError::Configuration(
                "dispatch.workers must be greater than zero".into(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(MirrorError::Configuration(
                "dispatch.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.gesture.swipe_min_duration_ms > self.gesture.swipe_max_duration_ms {
            return Err(MirrorError::Configuration(
                "gesture.swipe_min_duration_ms must not exceed gesture.swipe_max_duration_ms"
                    .into(),
            ));
        }
        if self.display.max_width == 0 || self.display.max_height == 0 {
            return Err(MirrorError::Configuration(
                "display.max_width and display.max_height must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
