use super::{apply_env_settings, apply_file_settings, normalize_database_url, prepare_database_url, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_full_urls_untouched() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./data/brutality.db?mode=rwc"),
        "sqlite://./data/brutality.db?mode=rwc"
    );
}

#[test]
fn blank_url_falls_back_to_default() {
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn single_colon_sqlite_url_gains_slashes() {
    assert_eq!(
        normalize_database_url("sqlite:data\\workouts.db"),
        "sqlite://data/workouts.db"
    );
}

#[test]
fn prefixed_env_vars_override_plain_ones() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("SERVER_BIND", "0.0.0.0:9000"),
        ("APP__BIND_ADDR", "127.0.0.1:9100"),
        ("TTS_API_KEY", "plain-key"),
        ("APP__TTS_API_KEY", "app-key"),
        ("TTS_MODEL", "tts-1-hd"),
        ("APP__TTS_TIMEOUT_SECONDS", "12"),
    ]);
    let mut settings = Settings::default();
    apply_env_settings(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.server_bind, "127.0.0.1:9100");
    assert_eq!(settings.tts_api_key.as_deref(), Some("app-key"));
    assert_eq!(settings.tts_model, "tts-1-hd");
    assert_eq!(settings.tts_timeout().as_secs(), 12);
}

#[test]
fn blank_api_key_disables_speech() {
    let mut settings = Settings::default();
    let file_cfg = HashMap::from([
        ("tts_api_key".to_string(), "  ".to_string()),
        ("tts_timeout_seconds".to_string(), "nope".to_string()),
        ("bind_addr".to_string(), "127.0.0.1:8123".to_string()),
    ]);
    apply_file_settings(&mut settings, &file_cfg);

    assert!(settings.tts_api_key.is_none());
    assert_eq!(settings.tts_timeout_seconds, 30);
    assert_eq!(settings.server_bind, "127.0.0.1:8123");
}

#[test]
fn creates_parent_dir_for_sqlite_file_path() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("brutality_server_test_{suffix}"));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("brutality_server_open_test_{suffix}"));
    let db_path = temp_root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(temp_root).expect("cleanup");
}
