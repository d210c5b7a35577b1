// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2025 Hipbot Contributors

//! Error types for the connector.

use thiserror::Error;

/// Connector errors.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Required credentials are absent from the configuration
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    /// An address could not be parsed or normalized
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Connecting or authenticating failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport failed while sending or closing
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered a request with an error
    #[error("Request failed: {0}")]
    Request(String),

    /// A server round-trip did not complete in time
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The session has already been shut down
    #[error("Session closed")]
    Closed,
}

impl ConnectorError {
    /// Create a new invalid address error.
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create a new connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConnectorError>;
