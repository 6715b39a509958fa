//! Plan runner
//!
//! Executes a plan strictly in order against the live UI. Every step is
//! performed (with bounded retries), allowed to settle, read back and
//! fingerprinted. The runner never replans: a landing on an unexpected state
//! ends the run with [`RunOutcome::Diverged`] so the owner can compile a new
//! grid from where the UI actually is.

use std::sync::Arc;

use graph_explorer::ActionExecutor;
use perceiver_structural::{ElementExtractor, Fingerprinter};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wayfinder_core_types::{ActionOutcome, Fingerprint};

use crate::strategies::RunnerConfig;
use crate::types::{Plan, PlanStep, RunOutcome, StepReport};

pub struct PlanRunner {
    executor: Arc<dyn ActionExecutor>,
    extractor: Arc<dyn ElementExtractor>,
    fingerprinter: Fingerprinter,
    config: RunnerConfig,
}

enum StepResult {
    Landed(Fingerprint),
    Failed(String),
    Cancelled,
}

impl PlanRunner {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        extractor: Arc<dyn ElementExtractor>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            executor,
            extractor,
            fingerprinter: Fingerprinter::default(),
            config,
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Runs `plan`, sending one [`StepReport`] per executed step to `reports`.
    /// A dropped receiver does not stop the run.
    pub async fn run(
        &self,
        plan: &Plan,
        reports: &mpsc::Sender<StepReport>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        info!(target: "plan-runner", steps = plan.len(), "running plan");
        let mut last_successful_step = None;
        let mut final_state = None;

        for step in &plan.steps {
            if cancel.is_cancelled() {
                return self.cancelled(step.index);
            }
            let observed = match self.execute_step(step, cancel).await {
                StepResult::Landed(observed) => observed,
                StepResult::Cancelled => return self.cancelled(step.index),
                StepResult::Failed(error) => {
                    warn!(target: "plan-runner", step = step.index, %error, "step failed, aborting plan");
                    report(reports, step.index, false, None, Some(error.clone())).await;
                    return RunOutcome::Failed {
                        step_index: step.index,
                        last_successful_step,
                        error,
                    };
                }
            };

            if let Some(expected) = step.expected.as_ref().filter(|exp| **exp != observed) {
                warn!(
                    target: "plan-runner",
                    step = step.index,
                    expected = %expected.short(),
                    observed = %observed.short(),
                    "state mismatch"
                );
                let error = format!("expected {expected}, observed {observed}");
                report(reports, step.index, false, Some(observed.clone()), Some(error)).await;
                return RunOutcome::Diverged {
                    step_index: step.index,
                    expected: expected.clone(),
                    observed,
                };
            }

            debug!(target: "plan-runner", step = step.index, state = %observed.short(), "step done");
            report(reports, step.index, true, Some(observed.clone()), None).await;
            last_successful_step = Some(step.index);
            final_state = Some(observed);
        }

        info!(target: "plan-runner", steps = plan.len(), "plan complete");
        RunOutcome::Completed {
            steps: plan.len(),
            final_state,
        }
    }

    async fn execute_step(&self, step: &PlanStep, cancel: &CancellationToken) -> StepResult {
        let limit = step.timeout.unwrap_or_else(|| self.config.action_timeout());
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return StepResult::Cancelled,
                result = timeout(limit, self.executor.perform(&step.action)) => result
                    .unwrap_or_else(|_| ActionOutcome::failed(format!("timed out after {}ms", limit.as_millis()))),
            };
            if outcome.success {
                break;
            }
            attempt += 1;
            let error = outcome
                .error
                .unwrap_or_else(|| "executor reported failure".to_string());
            if !self.config.should_retry(attempt) {
                return StepResult::Failed(error);
            }
            let backoff = self.config.backoff(attempt);
            debug!(
                target: "plan-runner",
                step = step.index,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                %error,
                "retrying step"
            );
            tokio::select! {
                _ = cancel.cancelled() => return StepResult::Cancelled,
                _ = sleep(backoff) => {}
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return StepResult::Cancelled,
            _ = sleep(self.config.settle()) => {}
        }

        match self.extractor.snapshot().await {
            Ok(snapshot) => StepResult::Landed(self.fingerprinter.detailed(&snapshot)),
            Err(err) => StepResult::Failed(format!("cannot observe result: {err}")),
        }
    }

    fn cancelled(&self, next_step: usize) -> RunOutcome {
        info!(target: "plan-runner", completed = next_step, "plan cancelled");
        RunOutcome::Cancelled {
            completed: next_step,
        }
    }
}

async fn report(
    reports: &mpsc::Sender<StepReport>,
    step_index: usize,
    success: bool,
    new_fingerprint: Option<Fingerprint>,
    error: Option<String>,
) {
    let sent = reports
        .send(StepReport {
            step_index,
            success,
            new_fingerprint,
            error,
        })
        .await;
    if sent.is_err() {
        debug!(target: "plan-runner", step_index, "step report dropped, no listener");
    }
}
