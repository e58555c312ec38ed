//! Derivation error types

use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between "we need a token" and "we have one".
///
/// None of these are retried automatically: a dead script URL or a crashing
/// challenge script must be fixed by reconfiguration, and hammering the vendor
/// with repeated derivations is itself a bot signal.
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("challenge script fetch failed: {0}")]
    ChallengeFetch(#[from] reqwest::Error),

    #[error("failed to spawn script runtime `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("script runtime i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("script runtime exited with code {exit_code}: {stderr_tail}")]
    Execution { exit_code: i32, stderr_tail: String },

    #[error("token derivation timed out after {0:?}")]
    Timeout(Duration),

    #[error("script runtime produced no usable token output")]
    Output,
}
