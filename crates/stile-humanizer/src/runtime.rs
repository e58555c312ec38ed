//! Script runtime bridge.
//!
//! Runs an emulation unit in an isolated interpreter process and returns what
//! it printed. The process boundary is the fault containment line: a vendor
//! script that throws, spins, or probes for APIs the stub does not have can
//! kill its own process, not this one.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::DerivationError;

const STDERR_TAIL_BYTES: usize = 2048;

/// Executes unit source by piping it to an interpreter's stdin.
///
/// The interpreter is `node` in production; anything that reads a program
/// from stdin and writes to stdout works, which is what the tests use.
#[derive(Debug, Clone)]
pub struct ScriptRuntime {
    program: String,
}

impl ScriptRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `unit` with a hard deadline. On timeout the child is killed
    /// (`kill_on_drop`), never left running; on non-zero exit the tail of
    /// stderr is preserved for the logs.
    pub async fn run(&self, unit: &str, limit: Duration) -> Result<String, DerivationError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DerivationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin was not captured"))?;

        let unit = unit.as_bytes().to_vec();
        let execution = async move {
            stdin.write_all(&unit).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        let output = match timeout(limit, execution).await {
            // Dropping the future on timeout drops the child handle, which
            // kills the process.
            Err(_) => return Err(DerivationError::Timeout(limit)),
            Ok(result) => result?,
        };

        if !output.status.success() {
            return Err(DerivationError::Execution {
                exit_code: output.status.code().unwrap_or(-1),
                stderr_tail: tail(&output.stderr),
            });
        }

        debug!(
            program = %self.program,
            stdout_bytes = output.stdout.len(),
            "script runtime finished"
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().nth_back(STDERR_TAIL_BYTES) {
        Some((idx, _)) => text[idx..].to_string(),
        None => text.to_string(),
    }
}
