//! stile-humanizer — proof-of-humanity token derivation.
//!
//! The upstream chat backend sits behind an anti-automation challenge: a
//! vendor-supplied, frequently rotated, deliberately obfuscated script that
//! computes a proof token inside a real browser. This crate derives that
//! token without a browser by:
//!
//! 1. fetching the current challenge script ([`ChallengeFetcher`]),
//! 2. composing it with a minimal emulated browser surface and a spoofed
//!    fingerprint into one executable unit ([`EmulationUnit`]),
//! 3. running the unit in an isolated interpreter process and reading the
//!    token it prints ([`ScriptRuntime`]).
//!
//! [`TokenProvider`] orchestrates the three steps behind the [`TokenSource`]
//! trait. The script itself stays a black box on purpose: nothing here
//! parses or reimplements it, so vendor rotations cost a template tweak at
//! worst, not a reverse-engineering effort.

pub mod challenge;
pub mod emulation;
pub mod error;
pub mod fingerprint;
pub mod provider;
pub mod runtime;

pub use challenge::{ChallengeFetcher, ChallengeScript};
pub use emulation::EmulationUnit;
pub use error::DerivationError;
pub use fingerprint::FingerprintProfile;
pub use provider::{ProviderConfig, TokenProvider, TokenSource, VerificationToken};
pub use runtime::ScriptRuntime;
