use std::path::PathBuf;
use std::time::Duration;

use crate::actuator::ActionKind;
use crate::error::ConfigError;

/// Trigger tuning for the decision engine.
///
/// Built once at startup and never mutated. The constructor clamps every
/// field into its valid range, so `window_size >= consecutive_required`
/// always holds for a constructed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    threshold: f32,
    consecutive_required: usize,
    window_size: usize,
    cooldown: Duration,
}

impl TriggerConfig {
    /// Create a trigger configuration, clamping out-of-range values.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Score at or above which a frame counts as anomalous (clamped to 0.0..=1.0)
    /// * `consecutive_required` - Length of the trailing streak that fires a trigger (at least 1)
    /// * `window_size` - Number of recent scores retained (at least `consecutive_required`)
    /// * `cooldown` - Minimum time between two successful actions
    pub fn new(
        threshold: f32,
        consecutive_required: usize,
        window_size: usize,
        cooldown: Duration,
    ) -> Self {
        let threshold = if threshold.is_nan() {
            defaults::THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        let consecutive_required = consecutive_required.max(1);
        Self {
            threshold,
            consecutive_required,
            window_size: window_size.max(consecutive_required),
            cooldown,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn consecutive_required(&self) -> usize {
        self.consecutive_required
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::new(
            defaults::THRESHOLD,
            defaults::CONSECUTIVE_REQUIRED,
            defaults::WINDOW_SIZE,
            Duration::from_secs(defaults::COOLDOWN_SECONDS),
        )
    }
}

/// Configuration for the Spaghetti Guard application loaded from environment variables.
///
/// All values have defaults so the guard can be rehearsed against a local
/// OctoPrint instance with nothing but a model file. Dry-run is on unless
/// explicitly disabled.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the OctoPrint server, without a trailing slash.
    /// Environment variable: `OCTO_URL`
    pub octo_url: String,

    /// Static API key sent as `X-Api-Key`.
    /// Environment variable: `OCTO_KEY`
    pub octo_key: String,

    /// MJPEG stream to watch.
    /// Environment variable: `MJPEG_URL`
    pub mjpeg_url: String,

    /// Path to the Edge Impulse `.eim` model executable.
    /// Environment variable: `MODEL_FILE`
    pub model_file: PathBuf,

    /// Streak detection settings.
    /// Environment variables: `ANOM_THRESH`, `CONSEC_REQUIRED`, `WINDOW_SIZE`, `COOLDOWN_SEC`
    pub trigger: TriggerConfig,

    /// What to do when a sustained anomaly is detected.
    /// Environment variable: `ACTION`
    pub action: ActionKind,

    /// Raw G-code sent when `action` is `gcode`.
    /// Environment variable: `GCODE`
    pub raw_command: String,

    /// Log actions instead of sending them.
    /// Environment variable: `DRY_RUN` (`1` enables)
    pub dry_run: bool,

    /// Loop pacing target. Zero or negative disables pacing.
    /// Environment variable: `TARGET_FPS`
    pub target_fps: f64,

    /// Write an annotated copy of each scored frame to `overlay_path`.
    /// Environment variable: `DEBUG_OVERLAY` (`1` enables)
    pub debug_overlay: bool,

    /// Environment variable: `DEBUG_OVERLAY_PATH`
    pub overlay_path: PathBuf,

    /// Optional TTF font used to print the score on the overlay.
    /// Environment variable: `DEBUG_OVERLAY_FONT`
    pub overlay_font: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed or `ACTION`
    /// names an unknown action. Missing variables fall back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// `load` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let octo_url = var("OCTO_URL", defaults::OCTO_URL)
            .trim_end_matches('/')
            .to_string();
        let octo_key = var("OCTO_KEY", "");
        let mjpeg_url = lookup("MJPEG_URL")
            .unwrap_or_else(|| format!("{}/webcam/?action=stream", octo_url));
        let model_file = PathBuf::from(var("MODEL_FILE", defaults::MODEL_FILE));

        let threshold: f32 = parse_field("ANOM_THRESH", &var("ANOM_THRESH", "0.70"))?;
        let consecutive: i64 = parse_field("CONSEC_REQUIRED", &var("CONSEC_REQUIRED", "5"))?;
        let window: i64 = parse_field("WINDOW_SIZE", &var("WINDOW_SIZE", "8"))?;
        let cooldown: i64 = parse_field("COOLDOWN_SEC", &var("COOLDOWN_SEC", "30"))?;

        let trigger = TriggerConfig::new(
            threshold,
            consecutive.max(1) as usize,
            window.max(1) as usize,
            Duration::from_secs(cooldown.max(0) as u64),
        );

        let action = var("ACTION", "pause").parse::<ActionKind>()?;
        let raw_command = var("GCODE", defaults::RAW_COMMAND);
        let dry_run = var("DRY_RUN", "1") == "1";
        let target_fps: f64 = parse_field("TARGET_FPS", &var("TARGET_FPS", "30"))?;
        let debug_overlay = var("DEBUG_OVERLAY", "0") == "1";
        let overlay_path = PathBuf::from(var("DEBUG_OVERLAY_PATH", defaults::OVERLAY_PATH));
        let overlay_font = lookup("DEBUG_OVERLAY_FONT")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Config {
            octo_url,
            octo_key,
            mjpeg_url,
            model_file,
            trigger,
            action,
            raw_command,
            dry_run,
            target_fps,
            debug_overlay,
            overlay_path,
            overlay_font,
        })
    }
}

fn parse_field<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Default values for optional settings.
pub mod defaults {
    pub const OCTO_URL: &str = "http://octopi.local";
    pub const MODEL_FILE: &str = "./model.eim";
    pub const RAW_COMMAND: &str = "M25";
    pub const OVERLAY_PATH: &str = "./debug_overlay.jpg";
    pub const THRESHOLD: f32 = 0.70;
    pub const CONSECUTIVE_REQUIRED: usize = 5;
    pub const WINDOW_SIZE: usize = 8;
    pub const COOLDOWN_SECONDS: u64 = 30;
}

/// Application constants used throughout the system.
pub mod constants {
    use std::time::Duration;

    /// Attempts made per actuation before giving up.
    pub const ACTUATION_ATTEMPTS: u32 = 3;

    /// Delay step between actuation attempts; attempt `n` waits `n` steps.
    pub const ACTUATION_RETRY_STEP: Duration = Duration::from_millis(500);

    /// Timeout for a single printer API request.
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connect timeout for the camera stream.
    pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// First reconnect delay after the stream fails to open.
    pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

    /// Upper bound for the reconnect delay.
    pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

    /// Pause after a read failure before reopening.
    pub const READ_FAILURE_PAUSE: Duration = Duration::from_millis(500);

    /// Pause after a failed inference before the next frame.
    pub const SCORING_FAILURE_PAUSE: Duration = Duration::from_millis(50);

    /// Model input size used when the runner does not report one.
    pub const FALLBACK_INPUT_WIDTH: u32 = 320;
    pub const FALLBACK_INPUT_HEIGHT: u32 = 240;

    /// How long to wait for the model runner to create its socket.
    pub const RUNNER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Longest a single socket read or write to the model runner may block.
    pub const RUNNER_IO_TIMEOUT: Duration = Duration::from_secs(5);

    /// Largest MJPEG buffer kept while searching for a complete frame.
    pub const MAX_FRAME_BUFFER: usize = 4 * 1024 * 1024;
}
