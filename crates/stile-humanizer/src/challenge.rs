//! Challenge script retrieval.
//!
//! The vendor rotates both the script URL's content and its behavior without
//! notice, so the script is re-fetched for every derivation and never cached.
//! The fetch itself has to look like a browser loading a `<script>` tag:
//! wrong `sec-fetch-*` values are enough to get served an interstitial
//! instead of the real script.

use std::time::SystemTime;

use tracing::debug;

use crate::error::DerivationError;
use crate::fingerprint::FingerprintProfile;

const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const SEC_CH_UA: &str = "\"Chromium\";v=\"140\", \"Not=A?Brand\";v=\"24\", \"Google Chrome\";v=\"140\"";
const REFERER: &str = "https://cursor.com/en-US/learn/how-ai-models-work";

/// One fetched copy of the vendor challenge script.
#[derive(Debug, Clone)]
pub struct ChallengeScript {
    pub source_url: String,
    pub body: String,
    pub fetched_at: SystemTime,
}

/// Fetches the current challenge script with script-load request headers.
#[derive(Clone)]
pub struct ChallengeFetcher {
    http: reqwest::Client,
    script_url: String,
}

impl ChallengeFetcher {
    pub fn new(http: reqwest::Client, script_url: impl Into<String>) -> Self {
        Self {
            http,
            script_url: script_url.into(),
        }
    }

    pub async fn fetch(
        &self,
        fingerprint: &FingerprintProfile,
    ) -> Result<ChallengeScript, DerivationError> {
        let response = self
            .http
            .get(&self.script_url)
            .header("user-agent", &fingerprint.user_agent)
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-site", "same-origin")
            .header("sec-fetch-mode", "no-cors")
            .header("sec-fetch-dest", "script")
            .header("referer", REFERER)
            .header("accept-language", ACCEPT_LANGUAGE)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!(url = %self.script_url, bytes = body.len(), "fetched challenge script");

        Ok(ChallengeScript {
            source_url: self.script_url.clone(),
            body,
            fetched_at: SystemTime::now(),
        })
    }
}
