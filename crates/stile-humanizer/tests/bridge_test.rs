//! Script runtime bridge tests against a real interpreter (`sh`).

use std::time::Duration;

use stile_humanizer::{DerivationError, ScriptRuntime};

#[tokio::test]
async fn returns_what_the_script_prints() {
    let runtime = ScriptRuntime::new("sh");
    let out = runtime
        .run("echo tok-123", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(out, "tok-123\n");
}

#[tokio::test]
async fn nonzero_exit_is_an_execution_error() {
    let runtime = ScriptRuntime::new("sh");
    let err = runtime
        .run("echo boom >&2; exit 7", Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        DerivationError::Execution {
            exit_code,
            stderr_tail,
        } => {
            assert_eq!(exit_code, 7);
            assert!(stderr_tail.contains("boom"));
        }
        other => panic!("expected Execution, got {other:?}"),
    }
}

#[tokio::test]
async fn runaway_script_hits_the_deadline() {
    let runtime = ScriptRuntime::new("sh");
    let err = runtime
        .run("sleep 5", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, DerivationError::Timeout(_)));
}

#[tokio::test]
async fn missing_interpreter_is_a_spawn_error() {
    let runtime = ScriptRuntime::new("definitely-not-an-interpreter");
    let err = runtime.run("echo hi", Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, DerivationError::Spawn { .. }));
}
