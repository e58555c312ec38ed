//! Emulation context assembly.
//!
//! The challenge script expects to run inside a browser page. It does not get
//! one: it gets the smallest global/document surface we have observed it
//! probing, with the fingerprint values wired into the properties it reads.
//! The surface is a capability stub, not a DOM — when the vendor rotates the
//! script and starts probing something new, this template is the file that
//! needs to grow.
//!
//! Token capture works through the script's own delivery mechanism: the
//! script patches `window.fetch` so that page API calls carry the proof
//! header. The stub installs a base `fetch` that resolves a promise with that
//! header's value, and the tail of the unit fires one probe request and
//! prints whatever was captured as the single line of stdout.

use crate::challenge::ChallengeScript;
use crate::fingerprint::FingerprintProfile;

/// The composed, ready-to-execute unit: environment stub + injected
/// fingerprint + challenge script body. Built fresh per derivation and
/// discarded after one execution.
#[derive(Debug)]
pub struct EmulationUnit {
    source: String,
}

impl EmulationUnit {
    /// Substitute the fingerprint and the fetched script into the fixed
    /// environment template. String values are injected as JSON literals so
    /// quoting in (for example) the renderer string cannot break the unit.
    pub fn compose(fingerprint: &FingerprintProfile, script: &ChallengeScript) -> EmulationUnit {
        let source = ENV_TEMPLATE
            .replace("@@USER_AGENT@@", &js_string(&fingerprint.user_agent))
            .replace("@@GPU_VENDOR@@", &js_string(&fingerprint.gpu_vendor))
            .replace("@@GPU_RENDERER@@", &js_string(&fingerprint.gpu_renderer))
            .replace("@@SCRIPT_SRC@@", &js_string(&script.source_url))
            .replace("@@CHALLENGE_SCRIPT@@", &script.body);

        EmulationUnit { source }
    }

    pub fn as_source(&self) -> &str {
        &self.source
    }
}

fn js_string(value: &str) -> String {
    // serde_json string encoding is valid JS string literal syntax.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

const ENV_TEMPLATE: &str = r#"
"use strict";

// ---- token capture ---------------------------------------------------------
// The challenge script wraps fetch() to attach its proof header to page API
// calls. We are the fetch underneath the wrapper: first call that carries the
// header resolves the capture promise.
var __resolveToken;
var __capturedToken = new Promise(function (resolve) { __resolveToken = resolve; });

function __headerValue(headers, name) {
  if (!headers) return null;
  if (typeof headers.get === "function") return headers.get(name);
  if (Array.isArray(headers)) {
    for (var i = 0; i < headers.length; i++) {
      if (String(headers[i][0]).toLowerCase() === name) return headers[i][1];
    }
    return null;
  }
  for (var key in headers) {
    if (String(key).toLowerCase() === name) return headers[key];
  }
  return null;
}

function __baseFetch(input, init) {
  var token =
    __headerValue(init && init.headers, "x-is-human") ||
    __headerValue(input && input.headers, "x-is-human");
  if (token) __resolveToken(String(token));
  return Promise.resolve({
    ok: true,
    status: 200,
    headers: { get: function () { return null; } },
    text: function () { return Promise.resolve(""); },
    json: function () { return Promise.resolve({}); },
  });
}

// ---- browser surface -------------------------------------------------------
var window = globalThis;
globalThis.window = window;
globalThis.self = window;
globalThis.top = window;
globalThis.parent = window;
globalThis.fetch = __baseFetch;

globalThis.navigator = {
  userAgent: @@USER_AGENT@@,
  vendor: "Google Inc.",
  platform: "Win32",
  language: "en-US",
  languages: ["en-US", "en"],
  hardwareConcurrency: 8,
  maxTouchPoints: 0,
  webdriver: false,
  cookieEnabled: true,
  sendBeacon: function () { return true; },
};

globalThis.screen = {
  width: 1920,
  height: 1080,
  availWidth: 1920,
  availHeight: 1040,
  colorDepth: 24,
  pixelDepth: 24,
};

globalThis.location = {
  href: "https://cursor.com/en-US/learn/how-ai-models-work",
  origin: "https://cursor.com",
  hostname: "cursor.com",
  host: "cursor.com",
  protocol: "https:",
  pathname: "/en-US/learn/how-ai-models-work",
  search: "",
  hash: "",
};

// WebGL surface: just enough getParameter/getExtension for the debug
// renderer info queries the script fingerprints with.
var GL_UNMASKED_VENDOR = 0x9245;
var GL_UNMASKED_RENDERER = 0x9246;

function __webglContext() {
  return {
    getExtension: function (name) {
      if (name === "WEBGL_debug_renderer_info") {
        return {
          UNMASKED_VENDOR_WEBGL: GL_UNMASKED_VENDOR,
          UNMASKED_RENDERER_WEBGL: GL_UNMASKED_RENDERER,
        };
      }
      return null;
    },
    getParameter: function (param) {
      if (param === GL_UNMASKED_VENDOR) return @@GPU_VENDOR@@;
      if (param === GL_UNMASKED_RENDERER) return @@GPU_RENDERER@@;
      return null;
    },
    getSupportedExtensions: function () {
      return ["WEBGL_debug_renderer_info"];
    },
  };
}

function __canvas() {
  return {
    width: 300,
    height: 150,
    style: {},
    getContext: function (kind) {
      if (kind === "webgl" || kind === "experimental-webgl" || kind === "webgl2") {
        return __webglContext();
      }
      return null;
    },
    toDataURL: function () { return "data:,"; },
  };
}

globalThis.document = {
  currentScript: { src: @@SCRIPT_SRC@@, dataset: {} },
  readyState: "complete",
  cookie: "",
  referrer: "",
  documentElement: { style: {} },
  head: { appendChild: function (node) { return node; } },
  body: { appendChild: function (node) { return node; }, removeChild: function () {} },
  createElement: function (tag) {
    if (String(tag).toLowerCase() === "canvas") return __canvas();
    return { style: {}, setAttribute: function () {}, appendChild: function (node) { return node; } };
  },
  getElementById: function () { return null; },
  querySelector: function () { return null; },
  querySelectorAll: function () { return []; },
  addEventListener: function () {},
  removeEventListener: function () {},
};

globalThis.addEventListener = function () {};
globalThis.removeEventListener = function () {};
globalThis.XMLHttpRequest = function () {
  this.open = function () {};
  this.send = function () {};
  this.setRequestHeader = function () {};
};

// ---- challenge script ------------------------------------------------------
@@CHALLENGE_SCRIPT@@

// ---- harness ---------------------------------------------------------------
(async function () {
  try {
    // Give the script a tick to finish installing its fetch wrapper, then
    // trigger it the way the page would.
    await new Promise(function (resolve) { setTimeout(resolve, 0); });
    window.fetch(location.origin + "/api/chat", { method: "POST", headers: {}, body: "{}" });

    var deadline = setTimeout(function () {
      console.error("challenge script never produced a token");
      process.exit(2);
    }, 10000);

    var token = await __capturedToken;
    clearTimeout(deadline);
    process.stdout.write(token + "\n");
    process.exit(0);
  } catch (err) {
    console.error((err && err.stack) || String(err));
    process.exit(1);
  }
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn fingerprint() -> FingerprintProfile {
        serde_json::from_value(serde_json::json!({
            "userAgent": "Mozilla/5.0 \"quoted\" UA",
            "UNMASKED_VENDOR_WEBGL": "Google Inc. (NVIDIA)",
            "UNMASKED_RENDERER_WEBGL": "ANGLE (NVIDIA, D3D11)",
        }))
        .unwrap()
    }

    fn script(body: &str) -> ChallengeScript {
        ChallengeScript {
            source_url: "https://cursor.com/challenge.js".to_string(),
            body: body.to_string(),
            fetched_at: SystemTime::now(),
        }
    }

    #[test]
    fn substitutes_every_placeholder() {
        let unit = EmulationUnit::compose(&fingerprint(), &script("var x = 1;"));
        assert!(!unit.as_source().contains("@@"));
    }

    #[test]
    fn embeds_script_body_verbatim() {
        let body = "function probe() { return navigator.userAgent; }";
        let unit = EmulationUnit::compose(&fingerprint(), &script(body));
        assert!(unit.as_source().contains(body));
    }

    #[test]
    fn injected_values_are_quoted_js_literals() {
        let unit = EmulationUnit::compose(&fingerprint(), &script(""));
        // The quote inside the user agent must arrive escaped.
        assert!(unit
            .as_source()
            .contains(r#"userAgent: "Mozilla/5.0 \"quoted\" UA""#));
        assert!(unit
            .as_source()
            .contains(r#"src: "https://cursor.com/challenge.js""#));
    }
}
