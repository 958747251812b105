use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::SessionName;
use storage::StoreLocation;
use url::Url;

const IN_MEMORY_DATA_DIRS: [&str; 3] = ["memory", ":memory:", "sqlite::memory:"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    /// Directory holding one SQLite file per session, or `memory`.
    pub data_dir: String,
    pub public_url: Option<String>,
    /// Deck length; when set, slide indices are clamped below it.
    pub slide_limit: Option<u32>,
    pub event_capacity: usize,
    /// Optional directory served at `/` for the browser views.
    pub static_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".into(),
            data_dir: "./data/sessions".into(),
            public_url: None,
            slide_limit: None,
            event_capacity: 256,
            static_dir: None,
        }
    }
}

impl Settings {
    /// Link an audience member scans to join `session`.
    pub fn audience_url(&self, session: &SessionName) -> anyhow::Result<Url> {
        let base = match &self.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}", self.bind_addr),
        };
        let mut url = Url::parse(&base)
            .with_context(|| format!("invalid public url '{base}'"))?
            .join("audience")?;
        url.query_pairs_mut().append_pair("session", session.as_str());
        Ok(url)
    }
}

/// Defaults, then `server.toml`, then `APP__*` variables, then the bare
/// variable names older deployments use.
pub fn load_settings() -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let mut settings: Settings = config::Config::builder()
        .set_default("bind_addr", defaults.bind_addr)?
        .set_default("data_dir", defaults.data_dir)?
        .set_default("event_capacity", defaults.event_capacity as i64)?
        .add_source(config::File::with_name("server").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to assemble server configuration")?
        .try_deserialize()
        .context("invalid server configuration")?;

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("DATA_DIR") {
        settings.data_dir = v;
    }
    if let Some(v) = lookup("PUBLIC_URL") {
        settings.public_url = Some(v);
    }
    if let Some(v) = lookup("SLIDE_LIMIT") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.slide_limit = Some(parsed);
        }
    }
}

pub fn prepare_store_location(raw_data_dir: &str) -> anyhow::Result<StoreLocation> {
    let location = normalize_store_location(raw_data_dir);
    if let StoreLocation::Directory(dir) = &location {
        fs::create_dir_all(dir).with_context(|| {
            format!("failed to create session data directory '{}'", dir.display())
        })?;
    }
    Ok(location)
}

fn normalize_store_location(raw_data_dir: &str) -> StoreLocation {
    let raw_data_dir = raw_data_dir.trim();

    if raw_data_dir.is_empty() {
        return StoreLocation::Directory(PathBuf::from(Settings::default().data_dir));
    }
    if IN_MEMORY_DATA_DIRS.contains(&raw_data_dir) {
        return StoreLocation::InMemory;
    }

    let path = raw_data_dir
        .strip_prefix("sqlite://")
        .or_else(|| raw_data_dir.strip_prefix("sqlite:"))
        .unwrap_or(raw_data_dir)
        .replace('\\', "/");
    StoreLocation::Directory(Path::new(&path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
