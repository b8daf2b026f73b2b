/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use thiserror::Error;

/// Error surface for the configuration store.
///
/// Network/remote failures (fetch, push) are never represented here —
/// per the design, those are logged and swallowed so that the committed
/// local state stays the authoritative outcome of an operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("malformed properties content: {0}")]
    Properties(String),

    #[error("coordination service error: {0}")]
    Coordination(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
