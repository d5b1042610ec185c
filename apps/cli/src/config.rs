use std::{collections::HashMap, fs, time::Duration};

pub const CONFIG_FILE: &str = "envshare.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub user_id: Option<i64>,
    pub request_timeout_seconds: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000/api/".into(),
            api_token: None,
            user_id: None,
            request_timeout_seconds: 30,
            log_level: "info".into(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

/// Defaults, then `envshare.toml`, then environment variables.
pub fn load_settings() -> Settings {
    let file = fs::read_to_string(CONFIG_FILE).ok();
    layered(file.as_deref(), |key| std::env::var(key).ok())
}

fn layered(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(file_cfg) = file.and_then(flat_table) {
        if let Some(v) = file_cfg.get("api_url") {
            settings.api_url = v.clone();
        }
        if let Some(v) = file_cfg.get("api_token") {
            settings.api_token = Some(v.clone());
        }
        if let Some(parsed) = file_cfg.get("user_id").and_then(|v| v.parse().ok()) {
            settings.user_id = Some(parsed);
        }
        if let Some(parsed) = file_cfg
            .get("request_timeout_seconds")
            .and_then(|v| v.parse().ok())
        {
            settings.request_timeout_seconds = parsed;
        }
        if let Some(v) = file_cfg.get("log_level") {
            settings.log_level = v.clone();
        }
    }

    if let Some(v) = env("ENVSHARE_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("ENVSHARE_API_TOKEN") {
        settings.api_token = Some(v);
    }
    if let Some(v) = env("APP__API_TOKEN") {
        settings.api_token = Some(v);
    }

    if let Some(parsed) = env("ENVSHARE_USER_ID").and_then(|v| v.parse().ok()) {
        settings.user_id = Some(parsed);
    }

    if let Some(parsed) = env("APP__REQUEST_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_seconds = parsed;
    }

    if let Some(v) = env("APP__LOG_LEVEL") {
        settings.log_level = v;
    }

    settings.api_token = settings.api_token.filter(|t| !t.trim().is_empty());
    settings
}

/// Top-level scalar keys as strings; nested tables are ignored.
fn flat_table(raw: &str) -> Option<HashMap<String, String>> {
    let table = toml::from_str::<toml::Table>(raw).ok()?;
    Some(
        table
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect(),
    )
}
