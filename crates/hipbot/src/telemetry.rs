// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Logging setup.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,hipbot=debug,hipbot_xmpp=debug";

/// Build the log filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// With `debug` set the connector logs at trace level, which includes every
/// stanza sent and received.
pub fn filter(debug: bool) -> Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if !debug {
        return Ok(filter);
    }
    Ok(filter.add_directive(
        "hipbot_xmpp=trace"
            .parse()
            .context("Invalid trace directive")?,
    ))
}

/// Install the global subscriber.
pub fn init(debug: bool) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter(debug)?)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let debug_enabled = debug;
    tracing::debug!(debug = debug_enabled, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_connector_to_trace() {
        let filter = filter(true).unwrap().to_string();
        assert!(filter.contains("hipbot_xmpp=trace"));
    }
}
