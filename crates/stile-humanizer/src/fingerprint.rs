//! Spoofed browser identity.
//!
//! The upstream challenge script probes `navigator.userAgent` and the WebGL
//! `WEBGL_debug_renderer_info` strings; the values injected here must describe
//! one coherent browser install or the derived token is rejected server-side.
//! Profiles are captured from a real browser session and shipped as a
//! base64-encoded JSON blob in the `FP` environment variable, using the
//! browser's own key vocabulary.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

/// Static spoofed browser identity, loaded once at startup and shared
/// read-only by every token derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintProfile {
    #[serde(rename = "userAgent")]
    pub user_agent: String,

    /// WebGL `UNMASKED_VENDOR_WEBGL` string, e.g. `Google Inc. (NVIDIA)`.
    #[serde(rename = "UNMASKED_VENDOR_WEBGL")]
    pub gpu_vendor: String,

    /// WebGL `UNMASKED_RENDERER_WEBGL` string (the full ANGLE renderer line).
    #[serde(rename = "UNMASKED_RENDERER_WEBGL")]
    pub gpu_renderer: String,
}

impl FingerprintProfile {
    /// Decode a profile from the base64-encoded JSON blob used in
    /// configuration.
    pub fn from_base64(blob: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(blob.trim())
            .context("fingerprint blob is not valid base64")?;
        serde_json::from_slice(&raw).context("fingerprint blob is not a valid profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn decodes_production_key_names() {
        let blob = encode(
            r#"{
                "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/140.0.0.0",
                "UNMASKED_VENDOR_WEBGL": "Google Inc. (NVIDIA)",
                "UNMASKED_RENDERER_WEBGL": "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060, D3D11)"
            }"#,
        );

        let fp = FingerprintProfile::from_base64(&blob).unwrap();
        assert!(fp.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(fp.gpu_vendor, "Google Inc. (NVIDIA)");
        assert!(fp.gpu_renderer.contains("RTX 3060"));
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(FingerprintProfile::from_base64("%%%not-base64%%%").is_err());
    }

    #[test]
    fn rejects_missing_keys() {
        let blob = encode(r#"{"userAgent": "ua"}"#);
        assert!(FingerprintProfile::from_base64(&blob).is_err());
    }
}
