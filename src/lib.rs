//! Spaghetti Guard - stops a 3D print when the camera keeps seeing a failure.
//!
//! Every frame from the printer's MJPEG stream is scored by an Edge Impulse
//! model. A debounced decision engine turns the noisy score stream into a
//! single trigger, which pauses or cancels the job through OctoPrint.
//!
//! # Core Components
//!
//! * [`config`] - Configuration loaded from environment variables
//! * [`window`] - Fixed-size window of recent scores with streak detection
//! * [`decision`] - Threshold, streak and cooldown decision engine
//! * [`actuator`] - OctoPrint client with bounded retries and dry-run mode
//! * [`frame_source`] - MJPEG stream reader and reconnecting supervisor
//! * [`scorer`] - Edge Impulse `.eim` model runner
//! * [`overlay`] - Optional annotated debug frames
//! * [`pacing`] - Sleep, frame-rate pacing and cancellation
//! * [`monitor`] - The main loop tying it all together
//! * [`error`] - Error types for each boundary
//!
//! # Quick Start
//!
//! ```no_run
//! use spaghetti_guard::*;
//!
//! let config = Config::load()?;
//! let token = CancellationToken::new();
//! let mut monitor = LiveMonitor::from_config(&config)?;
//! monitor.run(&token);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod actuator;
pub mod config;
pub mod decision;
pub mod error;
pub mod frame_source;
pub mod monitor;
pub mod overlay;
pub mod pacing;
pub mod scorer;
pub mod window;

// Re-export commonly used types for convenience
pub use actuator::{ActionKind, ActuatorClient, HttpTransport, RetryPolicy, Transport};
pub use config::{Config, TriggerConfig};
pub use decision::{Decision, DecisionEngine, Mode};
pub use error::GuardError;
pub use frame_source::{ConnectionState, FrameOutcome, FrameSource, FrameSupervisor, MjpegSource};
pub use monitor::{LiveMonitor, Monitor, StepReport};
pub use overlay::Overlay;
pub use pacing::{CancellationToken, Pacer, Sleeper, ThreadSleeper};
pub use scorer::{EimScorer, InferenceResult, ModelInfo, Scorer};
pub use window::ScoreWindow;
