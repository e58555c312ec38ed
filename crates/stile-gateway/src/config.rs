//! Configuration from environment variables.
//!
//! Everything is read once at startup into an immutable [`GatewayConfig`]
//! and passed down explicitly; nothing reads the environment after boot.
//!
//! **Environment variables:**
//! - `API_KEY` (required): bearer secret inbound callers must present
//! - `FP` (required): base64-encoded JSON fingerprint profile
//! - `SCRIPT_URL` (required): current challenge script URL
//! - `MODELS` (required): comma-separated model allow-list
//! - `UPSTREAM_CHAT_URL`: chat endpoint (default: https://cursor.com/api/chat)
//! - `PORT`: listen port (default: 8000)
//! - `NODE_BIN`: script runtime binary (default: node)
//! - `REQUEST_TIMEOUT_SECS`: upstream HTTP timeout (default: 120)
//! - `DERIVATION_TIMEOUT_SECS`: hard deadline for one script run (default: 30)
//! - `MAX_CONCURRENT_DERIVATIONS`: runtime process cap (default: 4)
//! - `TOKEN_TTL_MS`: token cache TTL, 0 disables caching (default: 0)

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use stile_humanizer::{FingerprintProfile, ProviderConfig};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub api_key: SecretString,
    pub models: Vec<String>,
    pub fingerprint: FingerprintProfile,
    pub script_url: String,
    pub upstream_chat_url: String,
    pub runtime_program: String,
    pub request_timeout: Duration,
    pub derivation_timeout: Duration,
    pub max_concurrent_derivations: usize,
    pub token_ttl: Option<Duration>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = required("API_KEY")?;
        let fp_blob = required("FP")?;
        let script_url = required("SCRIPT_URL")?;
        let models = parse_models(&required("MODELS")?)?;

        let fingerprint = FingerprintProfile::from_base64(&fp_blob)
            .context("failed to decode FP fingerprint blob")?;

        let token_ttl_ms: u64 = parse_or("TOKEN_TTL_MS", 0)?;

        Ok(Self {
            port: parse_or("PORT", 8000)?,
            api_key: SecretString::from(api_key),
            models,
            fingerprint,
            script_url,
            upstream_chat_url: env::var("UPSTREAM_CHAT_URL")
                .unwrap_or_else(|_| "https://cursor.com/api/chat".to_string()),
            runtime_program: env::var("NODE_BIN").unwrap_or_else(|_| "node".to_string()),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 120)?),
            derivation_timeout: Duration::from_secs(parse_or("DERIVATION_TIMEOUT_SECS", 30)?),
            max_concurrent_derivations: parse_or("MAX_CONCURRENT_DERIVATIONS", 4)?,
            token_ttl: (token_ttl_ms > 0).then(|| Duration::from_millis(token_ttl_ms)),
        })
    }

    /// The token provider settings carved out of this config.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            fingerprint: self.fingerprint.clone(),
            script_url: self.script_url.clone(),
            runtime_program: self.runtime_program.clone(),
            run_timeout: self.derivation_timeout,
            max_concurrent: self.max_concurrent_derivations,
            token_ttl: self.token_ttl,
        }
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("environment variable {name} has invalid value {raw:?}")),
    }
}

fn parse_models(raw: &str) -> Result<Vec<String>> {
    let models: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if models.is_empty() {
        bail!("MODELS must list at least one model identifier");
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_parse_in_configured_order() {
        let models = parse_models("gpt-4o, claude-4.5-sonnet ,gemini-2.5-pro").unwrap();
        assert_eq!(models, vec!["gpt-4o", "claude-4.5-sonnet", "gemini-2.5-pro"]);
    }

    #[test]
    fn empty_model_list_is_rejected() {
        assert!(parse_models(" , ,").is_err());
        assert!(parse_models("").is_err());
    }
}
