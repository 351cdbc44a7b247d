use std::time::{Duration, Instant};

use spaghetti_guard::{Decision, DecisionEngine, Mode, TriggerConfig};

fn engine(threshold: f32, consecutive: usize, window: usize, cooldown_secs: u64) -> DecisionEngine {
    DecisionEngine::new(TriggerConfig::new(
        threshold,
        consecutive,
        window,
        Duration::from_secs(cooldown_secs),
    ))
}

#[test]
fn test_trigger_config_clamps_invalid_values() {
    let config = TriggerConfig::new(1.5, 0, 0, Duration::ZERO);
    assert_eq!(config.threshold(), 1.0);
    assert_eq!(config.consecutive_required(), 1);
    assert_eq!(config.window_size(), 1);

    let config = TriggerConfig::new(-0.2, 6, 4, Duration::from_secs(3));
    assert_eq!(config.threshold(), 0.0);
    assert_eq!(config.window_size(), 6);
}

#[test]
fn test_triggers_after_consecutive_high_scores() {
    let mut engine = engine(0.7, 3, 5, 10);
    let now = Instant::now();

    assert_eq!(engine.observe(0.9, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::ShouldTrigger);
}

#[test]
fn test_first_trigger_is_not_cooldown_gated() {
    let mut engine = engine(0.5, 1, 1, 3600);
    assert_eq!(engine.mode(Instant::now()), Mode::Armed);
    assert_eq!(engine.observe(0.6, Instant::now()), Decision::ShouldTrigger);
}

#[test]
fn test_success_clears_window_and_starts_cooldown() {
    let mut engine = engine(0.7, 3, 5, 10);
    let t0 = Instant::now();
    for _ in 0..3 {
        engine.observe(0.9, t0);
    }
    engine.record_action(t0);

    assert!(engine.window().is_empty());
    assert_eq!(engine.last_action(), Some(t0));
    assert_eq!(engine.mode(t0 + Duration::from_secs(5)), Mode::Cooling);

    // High scores during cooldown are recorded but never fire.
    for i in 1..=9 {
        let now = t0 + Duration::from_secs(i);
        assert_eq!(engine.observe(0.95, now), Decision::NoAction);
    }
    assert_eq!(engine.window().len(), 5);
}

#[test]
fn test_rearms_once_cooldown_expires() {
    let mut engine = engine(0.7, 3, 5, 10);
    let t0 = Instant::now();
    for _ in 0..3 {
        engine.observe(0.9, t0);
    }
    engine.record_action(t0);

    let later = t0 + Duration::from_secs(10);
    assert_eq!(engine.mode(later), Mode::Armed);
    // The window was cleared, so a fresh streak is needed.
    assert_eq!(engine.observe(0.9, later), Decision::NoAction);
    assert_eq!(engine.observe(0.9, later), Decision::NoAction);
    assert_eq!(engine.observe(0.9, later), Decision::ShouldTrigger);
}

#[test]
fn test_scores_seen_while_cooling_count_after_expiry() {
    let mut engine = engine(0.7, 3, 5, 10);
    let t0 = Instant::now();
    engine.record_action(t0);

    engine.observe(0.9, t0 + Duration::from_secs(8));
    engine.observe(0.9, t0 + Duration::from_secs(9));
    assert_eq!(
        engine.observe(0.9, t0 + Duration::from_secs(11)),
        Decision::ShouldTrigger
    );
}

#[test]
fn test_failed_actuation_keeps_trigger_armed() {
    let mut engine = engine(0.7, 3, 5, 10);
    let now = Instant::now();
    for _ in 0..2 {
        engine.observe(0.9, now);
    }
    assert_eq!(engine.observe(0.9, now), Decision::ShouldTrigger);

    // No record_action: the actuator failed.
    assert_eq!(engine.last_action(), None);
    assert_eq!(engine.window().len(), 3);
    assert_eq!(engine.observe(0.9, now), Decision::ShouldTrigger);
}

#[test]
fn test_low_score_breaks_streak() {
    let mut engine = engine(0.7, 3, 8, 0);
    let now = Instant::now();
    engine.observe(0.9, now);
    engine.observe(0.9, now);
    assert_eq!(engine.observe(0.3, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::ShouldTrigger);
}

#[test]
fn test_zero_cooldown_never_cools() {
    let mut engine = engine(0.7, 1, 1, 0);
    let now = Instant::now();
    engine.record_action(now);
    assert_eq!(engine.mode(now), Mode::Armed);
    assert_eq!(engine.observe(0.8, now), Decision::ShouldTrigger);
}

#[test]
fn test_huge_window_is_allocated_lazily() {
    let mut engine = DecisionEngine::new(TriggerConfig::new(
        0.7,
        2,
        1usize << 62,
        Duration::from_secs(30),
    ));
    let now = Instant::now();

    assert_eq!(engine.config().window_size(), 1usize << 62);
    assert_eq!(engine.observe(0.9, now), Decision::NoAction);
    assert_eq!(engine.observe(0.9, now), Decision::ShouldTrigger);
    assert_eq!(engine.window().len(), 2);
}
