use std::io::Write;

use anyhow::Result;
use log::{error, info};

use spaghetti_guard::{CancellationToken, Config, LiveMonitor};

/// Spaghetti Guard - stop a failing 3D print before it turns into spaghetti.
///
/// Watches the printer's MJPEG stream, scores every frame with an Edge
/// Impulse model and pauses (or cancels) the job through OctoPrint once the
/// anomaly score stays above the threshold for enough consecutive frames.
///
/// # Environment Variables
///
/// * `OCTO_URL` - OctoPrint base URL (default: "http://octopi.local")
/// * `OCTO_KEY` - OctoPrint API key
/// * `MJPEG_URL` - Camera stream (default: "{OCTO_URL}/webcam/?action=stream")
/// * `MODEL_FILE` - Edge Impulse model (default: "./model.eim")
/// * `ANOM_THRESH` - Anomaly threshold (default: "0.70")
/// * `CONSEC_REQUIRED` - Consecutive frames above threshold (default: "5")
/// * `WINDOW_SIZE` - Scores kept in the window (default: "8")
/// * `COOLDOWN_SEC` - Seconds between actions (default: "30")
/// * `ACTION` - pause | cancel | gcode (default: "pause")
/// * `GCODE` - Command for the gcode action (default: "M25")
/// * `DRY_RUN` - "1" to only log actions (default: "1")
/// * `TARGET_FPS` - Loop rate, 0 disables pacing (default: "30")
/// * `DEBUG_OVERLAY` - "1" to write annotated frames (default: "0")
///
/// # Usage
///
/// ```bash
/// export OCTO_URL="http://octopi.local"
/// export OCTO_KEY="..."
/// export DRY_RUN=0
/// ./spaghetti-guard
/// ```
fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let config = Config::load()?;

    info!("Spaghetti Guard starting...");
    info!("Using OctoPrint at {}, camera {}", config.octo_url, config.mjpeg_url);

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        info!("Stopping... (Ctrl+C)");
        handler_token.cancel();
    })?;

    let mut monitor = match LiveMonitor::from_config(&config) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!("ERROR: {}", e);
            return Err(e.into());
        }
    };

    monitor.run(&token);
    drop(monitor);

    info!("Stopped cleanly.");
    Ok(())
}
