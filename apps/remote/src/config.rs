use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use client_core::PushBinding;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "remote.toml";
const STATE_DIR_NAME: &str = "chronono";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub transport: PushBinding,
    pub state_dir: Option<PathBuf>,
    /// `None` or `0` keeps a lost push channel down.
    pub reconnect_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8811".into(),
            transport: PushBinding::Sse,
            state_dir: None,
            reconnect_ms: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    transport: Option<PushBinding>,
    state_dir: Option<PathBuf>,
    reconnect_ms: Option<u64>,
}

impl Settings {
    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.server_url {
            self.server_url = v;
        }
        if let Some(v) = file.transport {
            self.transport = v;
        }
        if let Some(v) = file.state_dir {
            self.state_dir = Some(v);
        }
        if let Some(v) = file.reconnect_ms {
            self.reconnect_ms = Some(v);
        }
    }

    /// `APP__*` names win over `CHRONONO_*` when both are set.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for key in ["CHRONONO_SERVER_URL", "APP__SERVER_URL"] {
            if let Some(v) = lookup(key) {
                self.server_url = v;
            }
        }
        for key in ["CHRONONO_TRANSPORT", "APP__TRANSPORT"] {
            if let Some(v) = lookup(key) {
                self.transport = v
                    .parse()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("invalid {key}"))?;
            }
        }
        for key in ["CHRONONO_STATE_DIR", "APP__STATE_DIR"] {
            if let Some(v) = lookup(key) {
                self.state_dir = Some(PathBuf::from(v));
            }
        }
        for key in ["CHRONONO_RECONNECT_MS", "APP__RECONNECT_MS"] {
            if let Some(v) = lookup(key) {
                let parsed = v
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid {key} `{v}`"))?;
                self.reconnect_ms = Some(parsed);
            }
        }
        Ok(())
    }

    pub fn reconnect_after(&self) -> Option<Duration> {
        self.reconnect_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Directory holding `settings.json`.
    pub fn resolve_state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("unable to resolve local app data dir"))?;
        Ok(base.join(STATE_DIR_NAME))
    }
}

fn parse_file(path: &Path) -> Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Defaults, then the TOML file, then the environment. CLI flags are applied
/// by the caller.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    match config_path {
        Some(path) => settings.apply_file(parse_file(path)?),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                match parse_file(path) {
                    Ok(file) => settings.apply_file(file),
                    Err(err) => warn!(error = %format!("{err:#}"), "ignoring {DEFAULT_CONFIG_FILE}"),
                }
            }
        }
    }
    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}
