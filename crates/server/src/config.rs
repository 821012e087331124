use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub tts_api_key: Option<String>,
    pub tts_base_url: String,
    pub tts_model: String,
    pub tts_timeout_seconds: u64,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8001".into(),
            database_url: "sqlite://./data/brutality.db".into(),
            tts_api_key: None,
            tts_base_url: speech::DEFAULT_BASE_URL.into(),
            tts_model: speech::DEFAULT_MODEL.into(),
            tts_timeout_seconds: speech::DEFAULT_TIMEOUT.as_secs(),
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_seconds.max(1))
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_file_settings(&mut settings, &file_cfg);
        }
    }

    apply_env_settings(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("tts_api_key") {
        settings.tts_api_key = non_empty(v);
    }
    if let Some(v) = file_cfg.get("tts_base_url") {
        settings.tts_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("tts_model") {
        settings.tts_model = v.clone();
    }
    if let Some(parsed) = file_cfg
        .get("tts_timeout_seconds")
        .and_then(|v| v.parse::<u64>().ok())
    {
        settings.tts_timeout_seconds = parsed;
    }
}

/// Plain names first, then the `APP__` prefixed ones so they win.
fn apply_env_settings(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("TTS_API_KEY") {
        settings.tts_api_key = non_empty(&v);
    }
    if let Some(v) = var("APP__TTS_API_KEY") {
        settings.tts_api_key = non_empty(&v);
    }

    if let Some(v) = var("TTS_BASE_URL") {
        settings.tts_base_url = v;
    }
    if let Some(v) = var("TTS_MODEL") {
        settings.tts_model = v;
    }

    if let Some(v) = var("APP__TTS_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.tts_timeout_seconds = parsed;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
