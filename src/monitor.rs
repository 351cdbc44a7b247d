use std::time::Instant;

use log::{debug, error, info, warn};

use crate::actuator::{ActionKind, ActuatorClient, HttpTransport, Transport};
use crate::config::{Config, constants};
use crate::decision::{Decision, DecisionEngine};
use crate::error::{GuardError, StartupError};
use crate::frame_source::{FrameOutcome, FrameSource, FrameSupervisor, MjpegSource};
use crate::overlay::Overlay;
use crate::pacing::{CancellationToken, Pacer, Sleeper, ThreadSleeper};
use crate::scorer::{EimScorer, ModelInfo, Scorer, prepare_frame};

/// What happened during one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepReport {
    /// The camera had no frame; the supervisor already waited.
    Retry,
    /// Inference failed and the frame was skipped.
    ScoringFailed,
    /// The frame was scored and fed to the decision engine.
    Scored {
        score: f32,
        decision: Decision,
        /// True when a trigger fired and the printer accepted the action.
        actuated: bool,
    },
}

/// The single-threaded monitoring loop.
///
/// Pulls a frame, scores it, feeds the score to the decision engine and
/// calls the actuator when a trigger fires. Every fault is logged and
/// turned into a recoverable [`StepReport`].
pub struct Monitor<S, M, T, P = ThreadSleeper>
where
    S: FrameSource,
    M: Scorer,
    T: Transport,
    P: Sleeper,
{
    frames: FrameSupervisor<S, P>,
    scorer: M,
    model: ModelInfo,
    engine: DecisionEngine,
    actuator: ActuatorClient<T, P>,
    action: ActionKind,
    pacer: Pacer,
    sleeper: P,
    overlay: Option<Overlay>,
}

/// Monitor wired to a real camera, model runner and OctoPrint server.
pub type LiveMonitor = Monitor<MjpegSource, EimScorer, HttpTransport, ThreadSleeper>;

impl LiveMonitor {
    /// Build every component from configuration and start the model.
    ///
    /// # Errors
    ///
    /// Returns a startup fault if the model file is missing or the runner
    /// cannot be started. Nothing is left running on error.
    pub fn from_config(config: &Config) -> Result<Self, GuardError> {
        if !config.model_file.exists() {
            return Err(StartupError::MissingModel {
                path: config.model_file.display().to_string(),
            }
            .into());
        }
        if config.octo_key.is_empty() && !config.dry_run {
            warn!("OCTO_KEY is empty and DRY_RUN=0. Requests will fail.");
        }

        let mut scorer = EimScorer::new(config.model_file.clone());
        let model = scorer.init()?;

        let trigger = config.trigger;
        info!(
            "[Model] Input: {}x{}, Threshold: {}, Consec: {}, Cooldown: {}s, DRY_RUN={}",
            model.input_width,
            model.input_height,
            trigger.threshold(),
            trigger.consecutive_required(),
            trigger.cooldown().as_secs(),
            config.dry_run
        );

        let frames = FrameSupervisor::new(MjpegSource::new(config.mjpeg_url.clone())?, ThreadSleeper);
        let actuator = ActuatorClient::new(
            HttpTransport::new(config.octo_key.clone())?,
            ThreadSleeper,
            config.octo_url.clone(),
            config.raw_command.clone(),
            config.dry_run,
        );

        let mut monitor = Monitor::new(
            frames,
            scorer,
            model,
            DecisionEngine::new(trigger),
            actuator,
            config.action,
            Pacer::new(config.target_fps),
            ThreadSleeper,
        );
        if config.debug_overlay {
            info!("[Overlay] Writing frames to {}", config.overlay_path.display());
            monitor = monitor.with_overlay(Overlay::new(
                config.overlay_path.clone(),
                config.overlay_font.as_deref(),
            ));
        }
        Ok(monitor)
    }
}

impl<S, M, T, P> Monitor<S, M, T, P>
where
    S: FrameSource,
    M: Scorer,
    T: Transport,
    P: Sleeper,
{
    /// Assemble a monitor from already-initialised parts.
    ///
    /// `model` is the info returned by `scorer.init()`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frames: FrameSupervisor<S, P>,
        scorer: M,
        model: ModelInfo,
        engine: DecisionEngine,
        actuator: ActuatorClient<T, P>,
        action: ActionKind,
        pacer: Pacer,
        sleeper: P,
    ) -> Self {
        Self {
            frames,
            scorer,
            model,
            engine,
            actuator,
            action,
            pacer,
            sleeper,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Run one iteration of the loop.
    pub fn step(&mut self) -> StepReport {
        let started = Instant::now();

        let frame = match self.frames.next_frame() {
            FrameOutcome::Frame(frame) => frame,
            FrameOutcome::Retry => return StepReport::Retry,
        };

        let input = prepare_frame(&frame, &self.model);
        let result = match self.scorer.score(&input) {
            Ok(result) => result,
            Err(e) => {
                error!("Classify error: {}", e);
                self.sleeper.sleep(constants::SCORING_FAILURE_PAUSE);
                return StepReport::ScoringFailed;
            }
        };

        let score = result.anomaly_score();
        let threshold = self.engine.config().threshold();
        debug!("score={:.3} thr={:.2}", score, threshold);

        if let Some(overlay) = &self.overlay {
            if let Err(e) = overlay.render(&frame, score, threshold) {
                warn!("[Overlay] Failed to write {}: {}", overlay.path().display(), e);
            }
        }

        let decision = self.engine.observe(score, Instant::now());
        let mut actuated = false;
        if decision == Decision::ShouldTrigger {
            info!(
                "[TRIGGER] score={:.3} >= thr={} for {} frames. ACTION={}",
                score,
                threshold,
                self.engine.config().consecutive_required(),
                self.action
            );
            if self.actuator.send(self.action) {
                self.engine.record_action(Instant::now());
                actuated = true;
            } else {
                error!("[TRIGGER] Action failed, will retry on next frame");
            }
        }

        if let Some(rest) = self.pacer.remaining(started.elapsed()) {
            self.sleeper.sleep(rest);
        }

        StepReport::Scored {
            score,
            decision,
            actuated,
        }
    }

    /// Loop until `token` is cancelled, then release the camera and model.
    pub fn run(&mut self, token: &CancellationToken) {
        info!("Monitoring started");
        while !token.is_cancelled() {
            self.step();
        }
        self.shutdown();
    }

    /// Release the camera stream and stop the model. Idempotent.
    pub fn shutdown(&mut self) {
        self.frames.close();
        self.scorer.teardown();
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn frames(&self) -> &FrameSupervisor<S, P> {
        &self.frames
    }
}

impl<S, M, T, P> Drop for Monitor<S, M, T, P>
where
    S: FrameSource,
    M: Scorer,
    T: Transport,
    P: Sleeper,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
