use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "docchat.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend_url: String,
    pub storage_url: Option<String>,
    pub storage_api_key: Option<String>,
    pub storage_bucket: String,
    pub database_url: String,
}

/// Keys accepted in `docchat.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    backend_url: Option<String>,
    storage_url: Option<String>,
    storage_api_key: Option<String>,
    storage_bucket: Option<String>,
    database_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".into(),
            storage_url: None,
            storage_api_key: None,
            storage_bucket: client_core::transport::DEFAULT_BUCKET.into(),
            database_url: "sqlite://./data/docchat.db".into(),
        }
    }
}

/// Defaults, then the config file, then the process environment.
///
/// An explicit `path` must exist; the implicit `docchat.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&file) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", file.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", file.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<FileSettings>(raw)?;
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if file_cfg.storage_url.is_some() {
        settings.storage_url = file_cfg.storage_url;
    }
    if file_cfg.storage_api_key.is_some() {
        settings.storage_api_key = file_cfg.storage_api_key;
    }
    if let Some(v) = file_cfg.storage_bucket {
        settings.storage_bucket = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    Ok(())
}

/// Later keys in each list win, so `APP__*` overrides the plain names.
fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let last = |keys: &[&str]| keys.iter().filter_map(|key| lookup(key)).last();

    if let Some(v) = last(&["DOCCHAT_BACKEND_URL", "APP__BACKEND_URL"]) {
        settings.backend_url = v;
    }
    if let Some(v) = last(&["SUPABASE_URL", "APP__STORAGE_URL"]) {
        settings.storage_url = Some(v);
    }
    if let Some(v) = last(&["SUPABASE_ANON_KEY", "APP__STORAGE_API_KEY"]) {
        settings.storage_api_key = Some(v);
    }
    if let Some(v) = last(&["APP__STORAGE_BUCKET"]) {
        settings.storage_bucket = v;
    }
    if let Some(v) = last(&["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
}

/// Accepts bare file paths as well as `sqlite:` URLs; blank input falls back to the default.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite:{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
