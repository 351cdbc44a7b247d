#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use serde_json::Value;

use spaghetti_guard::actuator::Ack;
use spaghetti_guard::error::{ActuationError, ScorerError, SourceError};
use spaghetti_guard::{FrameSource, InferenceResult, ModelInfo, Scorer, Sleeper, Transport};

/// Sleeper that records requested delays instead of waiting.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pub slept: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

pub fn frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([120, 60, 30]))
}

/// Frame source driven by scripted open and read results.
#[derive(Default)]
pub struct ScriptedSource {
    pub opens: VecDeque<bool>,
    pub reads: VecDeque<bool>,
    pub open: bool,
    pub open_calls: usize,
    pub releases: Rc<RefCell<usize>>,
}

impl ScriptedSource {
    pub fn new(opens: &[bool], reads: &[bool]) -> Self {
        Self {
            opens: opens.iter().copied().collect(),
            reads: reads.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl FrameSource for ScriptedSource {
    fn endpoint(&self) -> &str {
        "scripted://camera"
    }

    fn open(&mut self) -> Result<(), SourceError> {
        self.open_calls += 1;
        if self.opens.pop_front().unwrap_or(true) {
            self.open = true;
            Ok(())
        } else {
            Err(SourceError::OpenFailed {
                url: "scripted://camera".to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    fn read(&mut self) -> Result<RgbImage, SourceError> {
        if self.reads.pop_front().unwrap_or(true) {
            Ok(frame(64, 48))
        } else {
            Err(SourceError::EndOfStream)
        }
    }

    fn release(&mut self) {
        self.open = false;
        *self.releases.borrow_mut() += 1;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Scorer returning a scripted sequence of results.
pub struct ScriptedScorer {
    pub results: VecDeque<Result<InferenceResult, ScorerError>>,
    pub seen_sizes: Rc<RefCell<Vec<(u32, u32)>>>,
    pub torn_down: Rc<RefCell<bool>>,
}

impl ScriptedScorer {
    pub fn anomalies(scores: &[f32]) -> Self {
        Self {
            results: scores
                .iter()
                .map(|s| Ok(InferenceResult::Anomaly(*s)))
                .collect(),
            seen_sizes: Rc::default(),
            torn_down: Rc::default(),
        }
    }
}

impl Scorer for ScriptedScorer {
    fn init(&mut self) -> Result<ModelInfo, ScorerError> {
        Ok(model_info())
    }

    fn score(&mut self, frame: &RgbImage) -> Result<InferenceResult, ScorerError> {
        self.seen_sizes.borrow_mut().push(frame.dimensions());
        self.results
            .pop_front()
            .unwrap_or(Ok(InferenceResult::Anomaly(0.0)))
    }

    fn teardown(&mut self) {
        *self.torn_down.borrow_mut() = true;
    }
}

pub fn model_info() -> ModelInfo {
    ModelInfo {
        input_width: 32,
        input_height: 24,
        channel_count: 3,
        project: Value::Null,
    }
}

/// Transport answering every request with a fixed status, or failing outright.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub status: Option<u16>,
    pub requests: Rc<RefCell<Vec<(String, Value)>>>,
}

impl ScriptedTransport {
    pub fn answering(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Transport for ScriptedTransport {
    fn post(&self, url: &str, body: &Value) -> Result<Ack, ActuationError> {
        self.requests
            .borrow_mut()
            .push((url.to_string(), body.clone()));
        match self.status {
            Some(status) => Ok(Ack {
                status,
                body: "{}".to_string(),
            }),
            None => Err(ActuationError::Transport {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}
