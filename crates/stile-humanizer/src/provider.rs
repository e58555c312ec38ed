//! Token provider orchestration.
//!
//! Ties the pieces together: fetch the current challenge script, compose the
//! emulation unit, execute it, and hand back the printed token. One
//! derivation per upstream call by default; a TTL cache can be switched on
//! where the vendor's challenge is known to be time-windowed.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use crate::challenge::ChallengeFetcher;
use crate::emulation::EmulationUnit;
use crate::error::DerivationError;
use crate::fingerprint::FingerprintProfile;
use crate::runtime::ScriptRuntime;

/// One successfully derived proof-of-humanity credential.
///
/// The value is opaque: callers attach it verbatim to upstream requests and
/// never inspect it.
#[derive(Debug, Clone)]
pub struct VerificationToken {
    pub value: String,
    pub obtained_at: SystemTime,
}

/// Source of verification tokens, as the gateway sees it.
///
/// The gateway holds a `dyn TokenSource` so tests can substitute a double
/// that counts calls or fails on demand.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<VerificationToken, DerivationError>;
}

/// Settings for a [`TokenProvider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub fingerprint: FingerprintProfile,
    pub script_url: String,
    /// Interpreter binary for the script runtime bridge (`node` in
    /// production).
    pub runtime_program: String,
    /// Hard deadline for one script execution.
    pub run_timeout: Duration,
    /// Upper bound on concurrent derivations; excess requests queue.
    pub max_concurrent: usize,
    /// `None` derives a fresh token per call. `Some(ttl)` enables a global
    /// single-slot cache — a tunable, not a correctness requirement.
    pub token_ttl: Option<Duration>,
}

/// Production [`TokenSource`]: fetch → compose → execute → parse.
pub struct TokenProvider {
    fingerprint: FingerprintProfile,
    fetcher: ChallengeFetcher,
    runtime: ScriptRuntime,
    run_timeout: Duration,
    token_ttl: Option<Duration>,
    derivations: Semaphore,
    cached: Mutex<Option<VerificationToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            fetcher: ChallengeFetcher::new(http, config.script_url),
            runtime: ScriptRuntime::new(config.runtime_program),
            fingerprint: config.fingerprint,
            run_timeout: config.run_timeout,
            token_ttl: config.token_ttl,
            derivations: Semaphore::new(config.max_concurrent.max(1)),
            cached: Mutex::new(None),
        }
    }

    async fn derive(&self) -> Result<VerificationToken, DerivationError> {
        let script = self.fetcher.fetch(&self.fingerprint).await?;
        let unit = EmulationUnit::compose(&self.fingerprint, &script);

        let stdout = self.runtime.run(unit.as_source(), self.run_timeout).await?;

        let value = stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .ok_or(DerivationError::Output)?
            .to_string();

        info!(token_len = value.len(), "derived verification token");
        Ok(VerificationToken {
            value,
            obtained_at: SystemTime::now(),
        })
    }

    fn still_fresh(&self, token: &VerificationToken) -> bool {
        match self.token_ttl {
            Some(ttl) => token
                .obtained_at
                .elapsed()
                .map(|age| age < ttl)
                .unwrap_or(false),
            None => false,
        }
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn token(&self) -> Result<VerificationToken, DerivationError> {
        if self.token_ttl.is_some() {
            let cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref() {
                if self.still_fresh(token) {
                    debug!("reusing cached verification token");
                    return Ok(token.clone());
                }
            }
        }

        let _permit = self
            .derivations
            .acquire()
            .await
            .expect("derivation semaphore closed");

        let token = self.derive().await?;

        if self.token_ttl.is_some() {
            *self.cached.lock().await = Some(token.clone());
        }
        Ok(token)
    }
}
