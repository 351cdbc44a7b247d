//! Error types for the Spaghetti Guard application.
//!
//! Each boundary of the monitor has its own error enum so the main loop can
//! decide locally how a fault degrades: source faults become a reconnect,
//! scoring faults skip a frame, actuation faults leave the trigger armed.
//! Only configuration and startup faults ever stop the process.

use std::fmt;

/// Top-level error type for Spaghetti Guard operations.
#[derive(Debug)]
pub enum GuardError {
    /// Invalid or unparseable configuration.
    ConfigError(ConfigError),

    /// Fatal faults detected before the monitoring loop starts.
    StartupError(StartupError),

    /// Errors raised by the model runner.
    ScorerError(ScorerError),

    /// Errors raised by the camera stream.
    SourceError(SourceError),

    /// Errors raised while commanding the printer.
    ActuationError(ActuationError),
}

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// The configured action is not one of `pause`, `cancel` or `gcode`.
    UnknownAction { value: String },
}

/// Faults that abort startup.
#[derive(Debug)]
pub enum StartupError {
    /// The model artifact does not exist on disk.
    MissingModel { path: String },
}

/// Errors specific to the inference runner.
#[derive(Debug)]
pub enum ScorerError {
    /// The model executable could not be started.
    SpawnFailed { path: String, reason: String },

    /// The runner socket never became reachable.
    ConnectFailed { socket: String, reason: String },

    /// Socket I/O failed mid-request.
    Io { reason: String },

    /// The runner replied with something we could not interpret.
    Protocol { reason: String },

    /// The runner replied with `success: false`.
    Rejected { reason: String },

    /// `score` was called before `init` or after `teardown`.
    NotInitialized,
}

/// Errors specific to the camera stream.
#[derive(Debug)]
pub enum SourceError {
    /// The stream could not be opened.
    OpenFailed { url: String, reason: String },

    /// A frame could not be read or decoded.
    ReadFailed { reason: String },

    /// The server closed the stream.
    EndOfStream,

    /// A read was attempted while the stream was closed.
    NotOpen,
}

/// Errors specific to printer control.
#[derive(Debug)]
pub enum ActuationError {
    /// The request never got a response.
    Transport { url: String, reason: String },

    /// The controller answered with a non-2xx status.
    Rejected { status: u16, body: String },

    /// Every retry attempt failed.
    Exhausted { attempts: u32 },
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::ConfigError(e) => write!(f, "Configuration error: {}", e),
            GuardError::StartupError(e) => write!(f, "Startup error: {}", e),
            GuardError::ScorerError(e) => write!(f, "Scorer error: {}", e),
            GuardError::SourceError(e) => write!(f, "Camera error: {}", e),
            GuardError::ActuationError(e) => write!(f, "Printer error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
            ConfigError::UnknownAction { value } => {
                write!(
                    f,
                    "Unknown action '{}' (expected pause, cancel or gcode)",
                    value
                )
            }
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::MissingModel { path } => {
                write!(f, "MODEL_FILE not found: {}", path)
            }
        }
    }
}

impl fmt::Display for ScorerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerError::SpawnFailed { path, reason } => {
                write!(f, "Failed to start model runner '{}': {}", path, reason)
            }
            ScorerError::ConnectFailed { socket, reason } => {
                write!(f, "Failed to connect to runner at '{}': {}", socket, reason)
            }
            ScorerError::Io { reason } => write!(f, "Runner I/O failed: {}", reason),
            ScorerError::Protocol { reason } => {
                write!(f, "Unexpected runner response: {}", reason)
            }
            ScorerError::Rejected { reason } => write!(f, "Runner rejected request: {}", reason),
            ScorerError::NotInitialized => write!(f, "Runner is not initialized"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::OpenFailed { url, reason } => {
                write!(f, "Failed to open stream '{}': {}", url, reason)
            }
            SourceError::ReadFailed { reason } => write!(f, "Failed to read frame: {}", reason),
            SourceError::EndOfStream => write!(f, "Stream closed by server"),
            SourceError::NotOpen => write!(f, "Stream is not open"),
        }
    }
}

impl fmt::Display for ActuationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationError::Transport { url, reason } => {
                write!(f, "Request to '{}' failed: {}", url, reason)
            }
            ActuationError::Rejected { status, body } => {
                write!(f, "Controller answered HTTP {}: {}", status, body)
            }
            ActuationError::Exhausted { attempts } => {
                write!(f, "Giving up after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::ConfigError(e) => Some(e),
            GuardError::StartupError(e) => Some(e),
            GuardError::ScorerError(e) => Some(e),
            GuardError::SourceError(e) => Some(e),
            GuardError::ActuationError(e) => Some(e),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StartupError {}
impl std::error::Error for ScorerError {}
impl std::error::Error for SourceError {}
impl std::error::Error for ActuationError {}

impl From<ConfigError> for GuardError {
    fn from(err: ConfigError) -> Self {
        GuardError::ConfigError(err)
    }
}

impl From<StartupError> for GuardError {
    fn from(err: StartupError) -> Self {
        GuardError::StartupError(err)
    }
}

impl From<ScorerError> for GuardError {
    fn from(err: ScorerError) -> Self {
        GuardError::ScorerError(err)
    }
}

impl From<SourceError> for GuardError {
    fn from(err: SourceError) -> Self {
        GuardError::SourceError(err)
    }
}

impl From<ActuationError> for GuardError {
    fn from(err: ActuationError) -> Self {
        GuardError::ActuationError(err)
    }
}

impl From<std::io::Error> for ScorerError {
    fn from(err: std::io::Error) -> Self {
        ScorerError::Io {
            reason: err.to_string(),
        }
    }
}
