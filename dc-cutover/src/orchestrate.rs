//! Sequential execution of a [`MigrationPlan`].
//!
//! Steps run strictly one after another. The first failure stops the run and
//! its exit code becomes the run's exit code; nothing is rolled back.

use std::future;
use std::time::{Duration, Instant};

use remote_exec_core::{ExecError, Interpreter, ProcessExecutor};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::FailureKind;
use crate::plan::{MigrationPlan, Step, StepId};

/// Returned by the single-script commands and `validate`; a run skips missing scripts.
pub const EXIT_SCRIPT_MISSING: i32 = 3;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_LAUNCH_FAILURE: i32 = 127;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
    /// Stopped by a timeout or cancellation while a step was running.
    PartiallyStopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not-started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::PartiallyStopped => "partially-stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    Skipped,
    Simulated,
    /// Never reached because an earlier step stopped the run.
    NotRun,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "ok",
            StepStatus::Failed => "failed",
            StepStatus::TimedOut => "timeout",
            StepStatus::Cancelled => "cancelled",
            StepStatus::Skipped => "skip",
            StepStatus::Simulated => "dry-run",
            StepStatus::NotRun => "not-run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// 1-based position in the plan.
    pub index: usize,
    pub id: StepId,
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub exit_code: i32,
    pub dry_run: bool,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.failure.is_some())
    }
}

/// Progress emitted while a plan runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        total: usize,
        dry_run: bool,
    },
    StepStarted {
        index: usize,
        id: StepId,
        name: String,
        command: String,
    },
    /// Captured output, delivered once the step has finished.
    StepOutput {
        index: usize,
        stdout: String,
        stderr: String,
    },
    StepFinished(StepRecord),
    Finished {
        state: RunState,
        exit_code: i32,
    },
}

pub trait ProgressSink {
    fn report(&mut self, event: ProgressEvent);
}

impl ProgressSink for Vec<ProgressEvent> {
    fn report(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { total, dry_run } => info!(total, dry_run, "run started"),
            ProgressEvent::StepStarted {
                index, id, command, ..
            } => info!(index, step = %id, %command, "step started"),
            ProgressEvent::StepOutput { index, stdout, stderr } => {
                debug!(index, stdout = %stdout, stderr = %stderr, "step output")
            }
            ProgressEvent::StepFinished(record) => info!(
                index = record.index,
                step = %record.id,
                status = record.status.as_str(),
                exit_code = ?record.exit_code,
                "step finished"
            ),
            ProgressEvent::Finished { state, exit_code } => {
                info!(state = state.as_str(), exit_code, "run finished")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("script interpreter {program} not found on PATH")]
    InterpreterMissing { program: String },
    #[error("step {0} is not part of this plan")]
    StartStepNotInPlan(StepId),
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub step_timeout: Duration,
    pub dry_run: bool,
    /// Resume point; earlier steps are reported as skipped.
    pub start_from: Option<StepId>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(3600),
            dry_run: false,
            start_from: None,
        }
    }
}

pub struct Orchestrator {
    interpreter: Interpreter,
    executor: ProcessExecutor,
    options: OrchestratorOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    /// Fails when the interpreter is not installed, unless this is a dry run.
    pub fn new(interpreter: Interpreter, options: OrchestratorOptions) -> Result<Self, OrchestrateError> {
        if !options.dry_run && interpreter.locate().is_none() {
            return Err(OrchestrateError::InterpreterMissing {
                program: interpreter.program.display().to_string(),
            });
        }
        Ok(Self {
            interpreter,
            executor: ProcessExecutor::new(),
            options,
            cancel: None,
        })
    }

    /// Kill the running step and stop once `true` is sent.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn run(
        &self,
        plan: &MigrationPlan,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunReport, OrchestrateError> {
        let start_at = match self.options.start_from {
            Some(id) => plan
                .position(id)
                .ok_or(OrchestrateError::StartStepNotInPlan(id))?,
            None => 0,
        };

        let total = plan.len();
        let dry_run = self.options.dry_run;
        let mut state = RunState::Running;
        let mut exit_code = 0;
        let mut records = Vec::with_capacity(total);
        sink.report(ProgressEvent::Started { total, dry_run });

        for (offset, step) in plan.iter().enumerate() {
            let index = offset + 1;
            let entry = if state != RunState::Running {
                record(index, step, StepStatus::NotRun, None, None, "")
            } else if offset < start_at {
                record(index, step, StepStatus::Skipped, None, None, "before resume point")
            } else {
                let finished = self.run_step(index, step, sink).await;
                if let Some(kind) = finished.failure {
                    exit_code = finished.exit_code.unwrap_or(1);
                    state = match kind {
                        FailureKind::Timeout | FailureKind::Cancelled => RunState::PartiallyStopped,
                        _ => RunState::Failed,
                    };
                    error!(step = %step.id, exit_code, failure = %kind, "step failed; stopping run");
                }
                finished
            };
            sink.report(ProgressEvent::StepFinished(entry.clone()));
            records.push(entry);
        }

        if state == RunState::Running {
            state = RunState::Completed;
        }
        sink.report(ProgressEvent::Finished { state, exit_code });
        Ok(RunReport {
            state,
            exit_code,
            dry_run,
            steps: records,
        })
    }

    async fn run_step(&self, index: usize, step: &Step, sink: &mut dyn ProgressSink) -> StepRecord {
        if !step.executable.is_file() {
            let path = step.executable.display();
            warn!(
                step = %step.id,
                path = %path,
                optional = step.optional,
                "script missing; skipping"
            );
            return record(
                index,
                step,
                StepStatus::Skipped,
                None,
                None,
                format!("script not found: {path}"),
            );
        }

        let spec = self
            .interpreter
            .script_command(&step.executable, &step.args, self.options.step_timeout);
        sink.report(ProgressEvent::StepStarted {
            index,
            id: step.id,
            name: step.name.clone(),
            command: spec.display(),
        });
        if self.options.dry_run {
            return record(index, step, StepStatus::Simulated, None, None, "not executed");
        }

        let started = Instant::now();
        let outcome = match &self.cancel {
            Some(cancel) => {
                self.executor
                    .run_cancellable(&spec, cancelled(cancel.clone()))
                    .await
            }
            None => self.executor.run(&spec).await,
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                if !result.stdout.is_empty() || !result.stderr.is_empty() {
                    sink.report(ProgressEvent::StepOutput {
                        index,
                        stdout: result.stdout.clone(),
                        stderr: result.stderr.clone(),
                    });
                }
                if result.success {
                    record(
                        index,
                        step,
                        StepStatus::Succeeded,
                        Some(0),
                        None,
                        format!("finished in {:.1}s", elapsed.as_secs_f32()),
                    )
                } else {
                    let stderr = result.stderr.trim();
                    record(
                        index,
                        step,
                        StepStatus::Failed,
                        Some(result.exit_code),
                        Some(FailureKind::NonZeroExit),
                        if stderr.is_empty() {
                            format!("exit code {}", result.exit_code)
                        } else {
                            format!("exit code {}: {stderr}", result.exit_code)
                        },
                    )
                }
            }
            Err(err) => {
                let (status, code) = match &err {
                    ExecError::Timeout { .. } => (StepStatus::TimedOut, EXIT_TIMEOUT),
                    ExecError::Cancelled { .. } => (StepStatus::Cancelled, EXIT_CANCELLED),
                    ExecError::LaunchFailed { .. } | ExecError::Wait { .. } => {
                        (StepStatus::Failed, EXIT_LAUNCH_FAILURE)
                    }
                };
                record(
                    index,
                    step,
                    status,
                    Some(code),
                    Some(FailureKind::from(&err)),
                    err.to_string(),
                )
            }
        }
    }
}

/// Resolves once `true` is observed; never resolves if the sender is gone.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        future::pending::<()>().await;
    }
}

fn record(
    index: usize,
    step: &Step,
    status: StepStatus,
    exit_code: Option<i32>,
    failure: Option<FailureKind>,
    detail: impl Into<String>,
) -> StepRecord {
    StepRecord {
        index,
        id: step.id,
        name: step.name.clone(),
        status,
        exit_code,
        failure,
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn step(id: StepId, optional: bool) -> Step {
        Step {
            id,
            name: id.to_string(),
            executable: PathBuf::from("/nonexistent/dc-cutover/step.ps1"),
            args: Vec::new(),
            optional,
        }
    }

    fn dry_run() -> Orchestrator {
        Orchestrator::new(
            Interpreter::default(),
            OrchestratorOptions {
                dry_run: true,
                ..OrchestratorOptions::default()
            },
        )
        .expect("dry run needs no interpreter")
    }

    #[tokio::test]
    async fn missing_scripts_are_skipped_in_dry_run() {
        let plan = MigrationPlan::new(vec![
            step(StepId::ToolInstall, true),
            step(StepId::TrustCreate, false),
            step(StepId::GroupMigrate, false),
        ]);
        let mut events: Vec<ProgressEvent> = Vec::new();
        let report = dry_run().run(&plan, &mut events).await.expect("run");
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.exit_code, 0);
        assert!(report.steps.iter().all(|r| r.status == StepStatus::Skipped));
        assert!(report.failed_step().is_none());
        assert!(report.steps[1].detail.starts_with("script not found"));
    }

    #[tokio::test]
    async fn resume_point_must_be_in_plan() {
        let plan = MigrationPlan::new(vec![step(StepId::ParameterSave, false)]);
        let orchestrator = Orchestrator::new(
            Interpreter::default(),
            OrchestratorOptions {
                dry_run: true,
                start_from: Some(StepId::DemoteDc),
                ..OrchestratorOptions::default()
            },
        )
        .expect("orchestrator");
        let err = orchestrator.run(&plan, &mut Vec::<ProgressEvent>::new()).await.unwrap_err();
        assert!(matches!(err, OrchestrateError::StartStepNotInPlan(StepId::DemoteDc)));
    }

    #[test]
    fn missing_interpreter_is_fatal_outside_dry_run() {
        let interpreter = Interpreter {
            program: PathBuf::from("dc-cutover-no-such-shell"),
            ..Interpreter::default()
        };
        let err = Orchestrator::new(interpreter, OrchestratorOptions::default())
            .err()
            .expect("missing interpreter");
        assert!(err.to_string().contains("dc-cutover-no-such-shell"));
    }
}
