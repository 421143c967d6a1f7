use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wirecore::{FailureKind, Step, StepInput, StepResult};

/// Uniform envelope around every step call: timing, outcome logging,
/// panic-to-result normalization, and the per-node deadline.
///
/// This is the only boundary in the engine where a panic becomes a
/// failure value; nothing throwing ever propagates past it into the
/// executor. A step-returned Success/Failure payload is passed through
/// untouched.
pub async fn invoke_step(
    slug: &str,
    step: Arc<dyn Step>,
    input: StepInput,
    deadline: Option<Duration>,
) -> StepResult {
    let start = Instant::now();
    let call = AssertUnwindSafe(step.run(input)).catch_unwind();

    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(slug = %slug, timeout_ms = limit.as_millis() as u64, "step timed out");
                return StepResult::fail(
                    FailureKind::Timeout,
                    format!("Step '{}' did not return within {}ms", slug, limit.as_millis()),
                );
            }
        },
        None => call.await,
    };

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic);
            tracing::error!(slug = %slug, panic = %message, "step panicked");
            StepResult::fail(
                FailureKind::Internal,
                format!("Step '{}' panicked: {}", slug, message),
            )
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        StepResult::Success(_) => {
            tracing::debug!(slug = %slug, duration_ms, "step succeeded");
        }
        StepResult::Failure(failure) => {
            tracing::warn!(slug = %slug, duration_ms, kind = %failure.kind, error = %failure.message, "step failed");
        }
    }
    result
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wirecore::{Fields, StepFailure};

    struct PanickingStep;

    #[async_trait]
    impl Step for PanickingStep {
        fn slug(&self) -> &str {
            "panics"
        }

        async fn run(&self, _input: StepInput) -> StepResult {
            panic!("boom");
        }
    }

    struct SlowStep;

    #[async_trait]
    impl Step for SlowStep {
        fn slug(&self) -> &str {
            "slow"
        }

        async fn run(&self, _input: StepInput) -> StepResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StepResult::success()
        }
    }

    struct FailingStep;

    #[async_trait]
    impl Step for FailingStep {
        fn slug(&self) -> &str {
            "fails"
        }

        async fn run(&self, _input: StepInput) -> StepResult {
            StepResult::Failure(StepFailure::external_api("provider said no"))
        }
    }

    #[tokio::test]
    async fn panic_becomes_internal_failure() {
        let result = invoke_step(
            "panics",
            Arc::new(PanickingStep),
            StepInput::new(Fields::new()),
            None,
        )
        .await;

        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Internal);
                assert!(failure.message.contains("boom"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deadline_becomes_timeout_failure() {
        let result = invoke_step(
            "slow",
            Arc::new(SlowStep),
            StepInput::new(Fields::new()),
            Some(Duration::from_millis(50)),
        )
        .await;

        match result {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Timeout);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn step_failure_passes_through_untouched() {
        let result = invoke_step(
            "fails",
            Arc::new(FailingStep),
            StepInput::new(Fields::new()),
            None,
        )
        .await;

        assert_eq!(
            result,
            StepResult::Failure(StepFailure::external_api("provider said no"))
        );
    }
}
