use std::time::Instant;

use log::debug;

use crate::config::TriggerConfig;
use crate::window::ScoreWindow;

/// Outcome of feeding one score to the [`DecisionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    ShouldTrigger,
}

/// Whether the engine may currently fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No cooldown in effect.
    Armed,
    /// A successful action happened less than the cooldown ago.
    Cooling,
}

/// Debounces the per-frame score stream into a single trigger decision.
///
/// The engine never performs the action itself. After `ShouldTrigger` the
/// caller runs the actuator and calls [`DecisionEngine::record_action`] only
/// if the printer acknowledged it. A failed actuation leaves the window and
/// cooldown untouched, so the very next observation fires again.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: TriggerConfig,
    window: ScoreWindow,
    last_action: Option<Instant>,
}

impl DecisionEngine {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            window: ScoreWindow::new(config.window_size()),
            config,
            last_action: None,
        }
    }

    /// Record a new score and decide whether to act.
    ///
    /// The score is always appended, even while cooling down. The first
    /// trigger is never cooldown-gated.
    pub fn observe(&mut self, score: f32, now: Instant) -> Decision {
        self.window.append(score);

        if self.mode(now) == Mode::Cooling {
            debug!("Cooling down, ignoring score {:.3}", score);
            return Decision::NoAction;
        }

        if self
            .window
            .sustained_above(self.config.threshold(), self.config.consecutive_required())
        {
            Decision::ShouldTrigger
        } else {
            Decision::NoAction
        }
    }

    /// Confirm that the action succeeded: start the cooldown and clear the window.
    pub fn record_action(&mut self, now: Instant) {
        self.last_action = Some(now);
        self.window.clear();
    }

    pub fn mode(&self, now: Instant) -> Mode {
        match self.last_action {
            Some(last) if now.saturating_duration_since(last) < self.config.cooldown() => {
                Mode::Cooling
            }
            _ => Mode::Armed,
        }
    }

    pub fn last_action(&self) -> Option<Instant> {
        self.last_action
    }

    pub fn window(&self) -> &ScoreWindow {
        &self.window
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }
}
