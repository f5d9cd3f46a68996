//! Error taxonomy of the discovery pipeline.
//!
//! Only `DiscoveryError` may fail a call outright; every other error is turned
//! into data (a failed `SourceResult`, a missing selection, a report field) at
//! the boundary where it occurs.

use std::time::Duration;

use lacuna_common::LacunaError;
use thiserror::Error;

/// A failure scoped to one bibliographic source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sandbox(#[from] LacunaError),

    #[error("non-success status {0}")]
    Status(u16),

    #[error("unparseable payload: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("search task did not complete: {0}")]
    Incomplete(String),
}

/// Knowledge-store lookup or write failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Sandbox(#[from] LacunaError),

    #[error("store API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    Malformed(String),

    #[error("no knowledge store configured")]
    Unconfigured,
}

/// Enrichment page fetch or parse failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Blocked(#[from] LacunaError),

    #[error("page returned status {0}")]
    Status(u16),

    #[error("could not extract paper metadata: {0}")]
    Parse(String),
}

/// Configuration-class errors: the only failures allowed to escape the pipeline.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no bibliographic sources are enabled")]
    NoSourcesEnabled,

    #[error("source '{0}' is enabled more than once")]
    DuplicateSource(String),

    #[error("source '{0}' requires an API key")]
    MissingApiKey(String),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error(transparent)]
    Client(#[from] LacunaError),
}
