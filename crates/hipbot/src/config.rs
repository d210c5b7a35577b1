// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Configuration management for the bot runner.
//!
//! Configuration is loaded from `~/.config/hipbot/config.toml` unless a path
//! is given on the command line. `HIPBOT_JID` and `HIPBOT_PASSWORD` override
//! the file so credentials can stay out of it.

use anyhow::{bail, Context, Result};
use hipbot_xmpp::ConnectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const JID_ENV: &str = "HIPBOT_JID";
pub const PASSWORD_ENV: &str = "HIPBOT_PASSWORD";

/// Behaviour of the built-in responder
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Answer `ping` with `pong`
    pub ping: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { ping: true }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// XMPP connector configuration
    pub xmpp: ConnectorConfig,
    /// Responder configuration
    pub bot: BotConfig,
}

impl Config {
    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// malformed one is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Config::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(jid) = lookup(JID_ENV).filter(|v| !v.is_empty()) {
            self.xmpp.jid = Some(jid);
        }
        if let Some(password) = lookup(PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.xmpp.password = Some(password);
        }
    }
}

/// Pick the config file: an explicit path must exist, the default may not.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) if !path.exists() => bail!("Config file not found: {:?}", path),
        Some(path) => Ok(Some(path)),
        None => Ok(default_path()),
    }
}

/// `<XDG config dir>/hipbot/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hipbot").join("config.toml"))
}
