mod common;

use std::time::Duration;

use common::{RecordingSleeper, ScriptedScorer, ScriptedSource, ScriptedTransport, model_info};
use spaghetti_guard::error::{ScorerError, StartupError};
use spaghetti_guard::{
    ActionKind, ActuatorClient, CancellationToken, Config, Decision, DecisionEngine,
    FrameSupervisor, GuardError, LiveMonitor, Monitor, Pacer, StepReport, TriggerConfig,
};

type TestMonitor = Monitor<ScriptedSource, ScriptedScorer, ScriptedTransport, RecordingSleeper>;

fn monitor(
    scorer: ScriptedScorer,
    transport: ScriptedTransport,
    dry_run: bool,
    sleeper: &RecordingSleeper,
) -> TestMonitor {
    let trigger = TriggerConfig::new(0.70, 3, 5, Duration::from_secs(10));
    Monitor::new(
        FrameSupervisor::new(ScriptedSource::new(&[], &[]), sleeper.clone()),
        scorer,
        model_info(),
        DecisionEngine::new(trigger),
        ActuatorClient::new(transport, sleeper.clone(), "http://octopi.local", "M25", dry_run),
        ActionKind::Pause,
        Pacer::new(0.0),
        sleeper.clone(),
    )
}

fn decision(report: StepReport) -> Decision {
    match report {
        StepReport::Scored { decision, .. } => decision,
        other => panic!("expected a scored frame, got {:?}", other),
    }
}

#[test]
fn test_dry_run_trigger_then_cooldown() {
    let sleeper = RecordingSleeper::default();
    let transport = ScriptedTransport::unreachable();
    let mut monitor = monitor(
        ScriptedScorer::anomalies(&[0.9, 0.9, 0.9, 0.9]),
        transport.clone(),
        true,
        &sleeper,
    );

    assert_eq!(decision(monitor.step()), Decision::NoAction);
    assert_eq!(decision(monitor.step()), Decision::NoAction);

    match monitor.step() {
        StepReport::Scored {
            decision, actuated, ..
        } => {
            assert_eq!(decision, Decision::ShouldTrigger);
            assert!(actuated);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(monitor.engine().window().is_empty());
    assert!(monitor.engine().last_action().is_some());

    // Cooling: a high score is recorded but does not fire.
    assert_eq!(decision(monitor.step()), Decision::NoAction);
    assert_eq!(monitor.engine().window().len(), 1);
    assert_eq!(transport.calls(), 0);
}

#[test]
fn test_failed_actuation_retriggers_on_next_frame() {
    let sleeper = RecordingSleeper::default();
    let transport = ScriptedTransport::unreachable();
    let mut monitor = monitor(
        ScriptedScorer::anomalies(&[0.9, 0.9, 0.9, 0.9]),
        transport.clone(),
        false,
        &sleeper,
    );

    monitor.step();
    monitor.step();
    assert_eq!(
        monitor.step(),
        StepReport::Scored {
            score: 0.9,
            decision: Decision::ShouldTrigger,
            actuated: false,
        }
    );
    assert_eq!(transport.calls(), 3);
    assert!(monitor.engine().last_action().is_none());
    assert_eq!(monitor.engine().window().len(), 3);

    assert_eq!(decision(monitor.step()), Decision::ShouldTrigger);
    assert_eq!(transport.calls(), 6);
}

#[test]
fn test_scoring_failure_skips_frame_without_touching_window() {
    let sleeper = RecordingSleeper::default();
    let mut scorer = ScriptedScorer::anomalies(&[0.9]);
    scorer.results.push_back(Err(ScorerError::Protocol {
        reason: "garbled".to_string(),
    }));
    let mut monitor = monitor(scorer, ScriptedTransport::unreachable(), true, &sleeper);

    assert!(matches!(monitor.step(), StepReport::Scored { .. }));
    assert_eq!(monitor.step(), StepReport::ScoringFailed);
    assert_eq!(monitor.engine().window().len(), 1);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(50)]);
}

#[test]
fn test_frames_are_resized_before_scoring() {
    let sleeper = RecordingSleeper::default();
    let scorer = ScriptedScorer::anomalies(&[0.1]);
    let sizes = scorer.seen_sizes.clone();
    let mut monitor = monitor(scorer, ScriptedTransport::unreachable(), true, &sleeper);

    monitor.step();
    assert_eq!(*sizes.borrow(), vec![(32, 24)]);
}

#[test]
fn test_camera_outage_reports_retry() {
    let sleeper = RecordingSleeper::default();
    let trigger = TriggerConfig::default();
    let mut monitor = Monitor::new(
        FrameSupervisor::new(ScriptedSource::new(&[false], &[]), sleeper.clone()),
        ScriptedScorer::anomalies(&[]),
        model_info(),
        DecisionEngine::new(trigger),
        ActuatorClient::new(
            ScriptedTransport::unreachable(),
            sleeper.clone(),
            "http://octopi.local",
            "M25",
            true,
        ),
        ActionKind::Pause,
        Pacer::new(0.0),
        sleeper.clone(),
    );

    assert_eq!(monitor.step(), StepReport::Retry);
    assert!(matches!(monitor.step(), StepReport::Scored { .. }));
}

#[test]
fn test_pacing_sleeps_remainder_of_frame_budget() {
    let sleeper = RecordingSleeper::default();
    let trigger = TriggerConfig::default();
    let mut monitor = Monitor::new(
        FrameSupervisor::new(ScriptedSource::new(&[], &[]), sleeper.clone()),
        ScriptedScorer::anomalies(&[0.1]),
        model_info(),
        DecisionEngine::new(trigger),
        ActuatorClient::new(
            ScriptedTransport::unreachable(),
            sleeper.clone(),
            "http://octopi.local",
            "M25",
            true,
        ),
        ActionKind::Pause,
        Pacer::new(0.1),
        sleeper.clone(),
    );

    monitor.step();
    let delays = sleeper.delays();
    assert_eq!(delays.len(), 1);
    assert!(delays[0] <= Duration::from_secs(10));
    assert!(delays[0] > Duration::from_secs(9));
}

#[test]
fn test_run_stops_when_cancelled_and_releases_model() {
    let sleeper = RecordingSleeper::default();
    let scorer = ScriptedScorer::anomalies(&[]);
    let torn_down = scorer.torn_down.clone();
    let mut monitor = monitor(scorer, ScriptedTransport::unreachable(), true, &sleeper);

    let token = CancellationToken::new();
    token.cancel();
    monitor.run(&token);

    assert!(*torn_down.borrow());
    assert_eq!(
        monitor.frames().state(),
        spaghetti_guard::ConnectionState::Closed
    );
}

#[test]
fn test_pacer_budget() {
    let pacer = Pacer::new(20.0);
    assert_eq!(pacer.frame_budget(), Some(Duration::from_millis(50)));
    assert_eq!(
        pacer.remaining(Duration::from_millis(20)),
        Some(Duration::from_millis(30))
    );
    assert_eq!(pacer.remaining(Duration::from_millis(80)), None);
    assert_eq!(Pacer::new(0.0).frame_budget(), None);
    assert_eq!(Pacer::new(-5.0).remaining(Duration::ZERO), None);
}

#[test]
fn test_tiny_target_fps_disables_pacing() {
    let config = Config::from_lookup(|key| (key == "TARGET_FPS").then(|| "1e-20".to_string()))
        .unwrap();

    let pacer = Pacer::new(config.target_fps);
    assert_eq!(pacer.frame_budget(), None);
    assert_eq!(pacer.remaining(Duration::ZERO), None);
}

#[test]
fn test_missing_model_fails_startup() {
    let missing = std::env::temp_dir().join("spaghetti-guard-no-such-model.eim");
    let _ = std::fs::remove_file(&missing);
    let model_file = missing.display().to_string();
    let config = Config::from_lookup(|key| match key {
        "MODEL_FILE" => Some(model_file.clone()),
        // Would be dialled if startup got past the model check.
        "MJPEG_URL" => Some("http://127.0.0.1:9/stream".to_string()),
        _ => None,
    })
    .unwrap();

    match LiveMonitor::from_config(&config) {
        Err(GuardError::StartupError(StartupError::MissingModel { path })) => {
            assert_eq!(path, model_file);
        }
        Err(other) => panic!("expected a missing model, got {:?}", other),
        Ok(_) => panic!("startup succeeded without a model"),
    }
    assert!(!missing.exists());
}
