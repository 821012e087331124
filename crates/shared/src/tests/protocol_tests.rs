use super::*;

#[test]
fn move_command_request_defaults_missing_fields() {
    let request: MoveCommandRequest = serde_json::from_str("{}").expect("json");
    assert_eq!(request.complexity, 0.0);
    assert_eq!(request.intensity, 0.0);
    assert_eq!(request.round_number, 1);
}

#[test]
fn speech_request_defaults_voice_and_speed() {
    let request: SpeechRequest =
        serde_json::from_str(r#"{"text":"Round 1"}"#).expect("json");
    assert_eq!(request.voice, Voice::Alloy);
    assert_eq!(request.speed, 1.0);
}
