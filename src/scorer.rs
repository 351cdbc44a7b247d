use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;
use std::{fs, thread, time::Duration};

use image::RgbImage;
use image::imageops::{self, FilterType};
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::config::constants;
use crate::error::ScorerError;

/// Model metadata reported by the runner at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Expected frame width in pixels.
    pub input_width: u32,
    /// Expected frame height in pixels.
    pub input_height: u32,
    /// 1 for greyscale models, 3 for RGB.
    pub channel_count: u32,
    /// Project description as reported by the runner, for logging.
    pub project: Value,
}

impl ModelInfo {
    /// Parse the runner's hello response.
    ///
    /// Missing or zero input dimensions fall back to 320x240.
    pub fn from_response(response: &Value) -> Self {
        let params = if response["model_parameters"].is_object() {
            &response["model_parameters"]
        } else {
            &response["modelParameters"]
        };

        let dimension = |key: &str, fallback: u32| {
            params[key]
                .as_u64()
                .filter(|v| *v > 0)
                .map(|v| v as u32)
                .unwrap_or(fallback)
        };

        Self {
            input_width: dimension("image_input_width", constants::FALLBACK_INPUT_WIDTH),
            input_height: dimension("image_input_height", constants::FALLBACK_INPUT_HEIGHT),
            channel_count: dimension("image_channel_count", 3),
            project: response["project"].clone(),
        }
    }
}

/// Result of scoring one frame.
///
/// Models either report an anomaly score directly or a set of class
/// probabilities; [`InferenceResult::anomaly_score`] reduces both to one scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    /// Explicit anomaly score.
    Anomaly(f32),
    /// Probability per class label.
    Classification(BTreeMap<String, f32>),
    /// The response carried neither.
    Empty,
}

impl InferenceResult {
    /// Class label that means "print looks fine".
    pub const OK_LABEL: &'static str = "ok";

    /// Interpret a classify response.
    ///
    /// A top-level `anomaly` wins, then `result.anomaly`, then
    /// `result.classification`.
    pub fn from_response(response: &Value) -> Self {
        if let Some(score) = response["anomaly"].as_f64() {
            return InferenceResult::Anomaly(score as f32);
        }

        let result = &response["result"];
        if let Some(score) = result["anomaly"].as_f64() {
            return InferenceResult::Anomaly(score as f32);
        }

        match result["classification"].as_object() {
            Some(classes) => InferenceResult::Classification(
                classes
                    .iter()
                    .filter_map(|(label, p)| p.as_f64().map(|p| (label.clone(), p as f32)))
                    .collect(),
            ),
            None => InferenceResult::Empty,
        }
    }

    /// Reduce to a single anomaly score in `0.0..=1.0`.
    ///
    /// For classifications the score is `max(0, 1 - P(ok))`; a missing `ok`
    /// class counts as probability zero.
    pub fn anomaly_score(&self) -> f32 {
        let score = match self {
            InferenceResult::Anomaly(score) => *score,
            InferenceResult::Classification(classes) => {
                let ok = classes.get(Self::OK_LABEL).copied().unwrap_or(0.0);
                (1.0 - ok).max(0.0)
            }
            InferenceResult::Empty => 0.0,
        };
        if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
    }
}

/// Opaque frame scorer.
pub trait Scorer {
    /// Start the model and report its input geometry.
    fn init(&mut self) -> Result<ModelInfo, ScorerError>;

    /// Score a frame already resized to the model's input size.
    fn score(&mut self, frame: &RgbImage) -> Result<InferenceResult, ScorerError>;

    /// Release the model. Safe to call more than once.
    fn teardown(&mut self);
}

/// Resize a decoded frame to the model's input size.
pub fn prepare_frame(frame: &RgbImage, info: &ModelInfo) -> RgbImage {
    if frame.width() == info.input_width && frame.height() == info.input_height {
        return frame.clone();
    }
    imageops::resize(
        frame,
        info.input_width,
        info.input_height,
        FilterType::Triangle,
    )
}

/// Pack pixels the way the runner expects: one `0xRRGGBB` integer per pixel.
///
/// Greyscale models get the luma value repeated in all three bytes.
pub fn pack_features(frame: &RgbImage, channel_count: u32) -> Vec<u32> {
    frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            if channel_count == 1 {
                let luma =
                    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u32;
                (luma << 16) | (luma << 8) | luma
            } else {
                ((r as u32) << 16) | ((g as u32) << 8) | b as u32
            }
        })
        .collect()
}

/// Scorer backed by an Edge Impulse `.eim` model executable.
///
/// The executable is started with a socket path argument and then driven
/// with NUL-terminated JSON messages over that Unix socket.
pub struct EimScorer {
    model_path: PathBuf,
    socket_path: PathBuf,
    child: Option<Child>,
    stream: Option<UnixStream>,
    pending: Vec<u8>,
    info: Option<ModelInfo>,
    next_id: u64,
}

impl EimScorer {
    /// Prepare a scorer for the model at `model_path`. Nothing is started until `init`.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        let socket_path = std::env::temp_dir().join(format!(
            "spaghetti-guard-{}.sock",
            std::process::id()
        ));
        Self {
            model_path: model_path.into(),
            socket_path,
            child: None,
            stream: None,
            pending: Vec::new(),
            info: None,
            next_id: 1,
        }
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }

    fn spawn(&mut self) -> Result<(), ScorerError> {
        let _ = fs::remove_file(&self.socket_path);

        let child = Command::new(&self.model_path)
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| ScorerError::SpawnFailed {
                path: self.model_path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.child = Some(child);

        let started = Instant::now();
        loop {
            match connect_runner(&self.socket_path) {
                Ok(stream) => {
                    self.pending.clear();
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) if started.elapsed() >= constants::RUNNER_STARTUP_TIMEOUT => {
                    return Err(ScorerError::ConnectFailed {
                        socket: self.socket_path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    if let Some(status) = self.child.as_mut().and_then(|c| c.try_wait().ok()?) {
                        return Err(ScorerError::SpawnFailed {
                            path: self.model_path.display().to_string(),
                            reason: format!("runner exited early with {}", status),
                        });
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    fn request(&mut self, message: Value) -> Result<Value, ScorerError> {
        let id = self.next_id;
        self.next_id += 1;

        let stream = self.stream.as_mut().ok_or(ScorerError::NotInitialized)?;
        exchange(stream, &mut self.pending, message, id)
    }
}

/// Connect to the runner socket with every read and write bounded by
/// [`constants::RUNNER_IO_TIMEOUT`], so a hung runner costs one frame.
fn connect_runner(path: &Path) -> io::Result<UnixStream> {
    let stream = UnixStream::connect(path)?;
    stream.set_read_timeout(Some(constants::RUNNER_IO_TIMEOUT))?;
    stream.set_write_timeout(Some(constants::RUNNER_IO_TIMEOUT))?;
    Ok(stream)
}

/// Send `message` stamped with `id` and return the reply carrying that id.
///
/// Late replies to earlier requests (left behind by a timeout) are skipped.
fn exchange<S: Read + Write>(
    stream: &mut S,
    pending: &mut Vec<u8>,
    mut message: Value,
    id: u64,
) -> Result<Value, ScorerError> {
    message["id"] = json!(id);
    stream.write_all(message.to_string().as_bytes())?;

    loop {
        let response = read_message(stream, pending)?;
        let value: Value =
            serde_json::from_slice(&response).map_err(|e| ScorerError::Protocol {
                reason: e.to_string(),
            })?;

        if let Some(reply_id) = value["id"].as_u64() {
            if reply_id < id {
                debug!("[Model] Dropping late reply {} (waiting for {})", reply_id, id);
                continue;
            }
        }

        if value["success"].as_bool() == Some(false) {
            return Err(ScorerError::Rejected {
                reason: value["error"].as_str().unwrap_or("unknown error").to_string(),
            });
        }
        return Ok(value);
    }
}

/// Read one NUL-terminated message. Bytes past the terminator stay in `pending`.
fn read_message<R: Read>(reader: &mut R, pending: &mut Vec<u8>) -> Result<Vec<u8>, ScorerError> {
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = pending.iter().position(|b| *b == 0) {
            let message = pending[..end].to_vec();
            pending.drain(..=end);
            return Ok(message);
        }

        // On a timeout the partial reply stays in `pending`; once complete it
        // is dropped as a late reply.
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            pending.clear();
            return Err(ScorerError::Io {
                reason: "runner closed the socket".to_string(),
            });
        }
        pending.extend_from_slice(&chunk[..read]);
    }
}

impl Scorer for EimScorer {
    fn init(&mut self) -> Result<ModelInfo, ScorerError> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }

        self.spawn()?;
        let hello = self.request(json!({"hello": 1}))?;
        let info = ModelInfo::from_response(&hello);
        info!("[Model] Loaded {}", info.project);
        self.info = Some(info.clone());
        Ok(info)
    }

    fn score(&mut self, frame: &RgbImage) -> Result<InferenceResult, ScorerError> {
        let channels = self
            .info
            .as_ref()
            .ok_or(ScorerError::NotInitialized)?
            .channel_count;
        let features = pack_features(frame, channels);
        let response = self.request(json!({"classify": features}))?;
        debug!("[Model] timing {}", response["timing"]);
        Ok(InferenceResult::from_response(&response))
    }

    fn teardown(&mut self) {
        self.stream = None;
        self.pending.clear();
        self.info = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("[Model] Failed to stop runner: {}", e);
            }
            let _ = child.wait();
        }
        if self.socket_path.exists() {
            let _ = fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for EimScorer {
    fn drop(&mut self) {
        self.teardown();
    }
}
