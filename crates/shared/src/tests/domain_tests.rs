use super::*;

#[test]
fn clamp_score_bounds_and_nan() {
    assert_eq!(clamp_score(-0.5), 0.0);
    assert_eq!(clamp_score(1.7), 1.0);
    assert_eq!(clamp_score(f64::NAN), 0.0);
    assert_eq!(clamp_score(0.3), 0.3);
}

#[test]
fn score_steps_saturate_at_one() {
    assert_eq!(score_from_steps(0), 0.0);
    assert_eq!(score_from_steps(4), 0.4);
    assert_eq!(score_from_steps(25), 1.0);
}

#[test]
fn record_round_stops_after_total_rounds() {
    let mut session = WorkoutSession::new(UserId("alice".into()));
    for round in 1..=TOTAL_ROUNDS {
        session
            .record_round(0.9, score_from_steps(round))
            .expect("record");
    }
    assert_eq!(session.rounds_completed, TOTAL_ROUNDS);
    let err = session.record_round(0.9, 0.8).expect_err("eighth round");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[test]
fn closed_session_rejects_rounds_and_keeps_first_end_time() {
    let mut session = WorkoutSession::new(UserId("bob".into()));
    let first = Utc::now();
    session.close(first);
    session.close(first + chrono::Duration::seconds(5));
    assert_eq!(session.end_time, Some(first));
    let err = session.record_round(0.1, 0.1).expect_err("closed");
    assert!(matches!(err.code, ErrorCode::Conflict));
}

#[test]
fn voice_parses_case_insensitively() {
    assert_eq!("Nova".parse::<Voice>(), Ok(Voice::Nova));
    assert!("robot".parse::<Voice>().is_err());
    assert_eq!(
        serde_json::to_string(&Voice::Shimmer).expect("json"),
        "\"shimmer\""
    );
}
