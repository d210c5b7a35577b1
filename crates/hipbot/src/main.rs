// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Hipbot - chat bot runner for XMPP group chat.
//!
//! Connects one bot account, joins the configured rooms and answers `ping`
//! until interrupted or the session is lost.

use anyhow::{Context, Result};
use clap::Parser;
use hipbot_xmpp::{Adapter, TokioXmppTransport};
use std::path::PathBuf;
use tracing::info;

mod config;
mod host;
mod telemetry;

use config::Config;
use host::Host;

/// Hipbot - chat bot for XMPP group chat
#[derive(Parser)]
#[command(name = "hipbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file (default: ~/.config/hipbot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every stanza sent and received
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = config::resolve_path(cli.config)?;
    let mut config = Config::load_from(path.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    config.xmpp.debug |= cli.debug;

    telemetry::init(config.xmpp.debug)?;
    match &path {
        Some(path) if path.exists() => info!("Loaded configuration from {:?}", path),
        _ => info!("No config file found, using defaults"),
    }

    config
        .xmpp
        .validate()
        .context("Set the credentials in the config file or via HIPBOT_JID/HIPBOT_PASSWORD")?;

    let transport = TokioXmppTransport::new(&config.xmpp)?;
    let (host, inbox) = Host::new(config.bot.ping);
    let adapter = Adapter::new(config.xmpp, host.clone());
    let responder = tokio::spawn(host::respond(adapter.clone(), host, inbox));

    let result = adapter.run(transport).await;
    responder.abort();
    result.context("XMPP session failed")?;

    info!("Shut down cleanly");
    Ok(())
}
