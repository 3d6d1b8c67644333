use std::fmt;
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default timeout applied by [`CommandSpec::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long output is still read once the process itself has exited.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of a process (or remote command) that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            success: exit_code == 0,
        }
    }
}

/// Errors raised when a process could not run to completion.
///
/// A process that ran and exited non-zero is *not* an error; it is an
/// [`ExecutionResult`] with `success == false`.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The executable could not be started at all.
    #[error("failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        source: std::io::Error,
    },
    /// The process exceeded its allotted time and was killed.
    #[error("{program} timed out after {}s and was killed", .timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },
    /// The caller cancelled the run and the process was killed.
    #[error("{program} was cancelled and killed")]
    Cancelled { program: String },
    /// Waiting on the child failed after it was started.
    #[error("failed while waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// A fully described local process invocation.
#[derive(Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable for the child only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined for logs. Environment values are never rendered.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|arg| {
            if arg.contains(' ') {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        }));
        parts.join(" ")
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs local executables with incremental output capture and a hard timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `spec` to completion or until its timeout elapses.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult, ExecError> {
        self.run_cancellable(spec, future::pending()).await
    }

    /// Like [`ProcessExecutor::run`], but the child is also killed as soon as
    /// `cancel` resolves.
    pub async fn run_cancellable<F>(
        &self,
        spec: &CommandSpec,
        cancel: F,
    ) -> Result<ExecutionResult, ExecError>
    where
        F: Future<Output = ()>,
    {
        let program = spec.program.display().to_string();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ExecError::LaunchFailed {
            program: program.clone(),
            source,
        })?;
        debug!(program = %program, pid = ?child.id(), "process started");

        // Both pipes are drained concurrently so a chatty child never blocks on a full pipe.
        let stdout = OutputReader::spawn(child.stdout.take());
        let stderr = OutputReader::spawn(child.stderr.take());

        tokio::pin!(cancel);
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(spec.timeout) => Outcome::TimedOut,
            _ = &mut cancel => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Exited(Ok(status)) => {
                let exit_code = status.code().unwrap_or(-1);
                // A background grandchild may hold the pipes open after the child exits.
                let (stdout, stderr) = tokio::join!(
                    stdout.finish(OUTPUT_DRAIN_GRACE),
                    stderr.finish(OUTPUT_DRAIN_GRACE)
                );
                debug!(program = %program, exit_code, "process exited");
                Ok(ExecutionResult::new(exit_code, stdout, stderr))
            }
            Outcome::Exited(Err(source)) => {
                stdout.abort();
                stderr.abort();
                Err(ExecError::Wait { program, source })
            }
            Outcome::TimedOut => {
                terminate(&mut child, &program).await;
                stdout.abort();
                stderr.abort();
                Err(ExecError::Timeout {
                    program,
                    timeout: spec.timeout,
                })
            }
            Outcome::Cancelled => {
                terminate(&mut child, &program).await;
                stdout.abort();
                stderr.abort();
                Err(ExecError::Cancelled { program })
            }
        }
    }
}

async fn terminate(child: &mut Child, program: &str) {
    if let Err(err) = child.kill().await {
        warn!(program, error = %err, "failed to kill process");
    }
}

/// Collects one output stream line by line in a background task.
struct OutputReader {
    lines: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl OutputReader {
    fn spawn<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let task = tokio::spawn(async move {
            let Some(stream) = stream else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\r', '\n']).to_string();
                        if let Ok(mut lines) = sink.lock() {
                            lines.push(line);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "stopped reading process output");
                        break;
                    }
                }
            }
        });
        Self { lines, task }
    }

    /// Wait up to `grace` for end of stream, then return whatever was read.
    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            debug!("output stream still open after exit; keeping captured lines");
            self.task.abort();
        }
        self.captured()
    }

    fn abort(&self) {
        self.task.abort();
    }

    fn captured(&self) -> String {
        self.lines
            .lock()
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }
}

/// Locate an executable by name on `PATH`. Paths with a directory component
/// are checked directly.
pub fn find_executable(name: impl AsRef<Path>) -> Option<PathBuf> {
    find_executable_with(name, &[])
}

/// Check `candidates` first, then fall back to a `PATH` search for `name`.
pub fn find_executable_with(name: impl AsRef<Path>, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Some(found) = candidates.iter().find(|path| is_executable(path)) {
        return Some(found.clone());
    }

    let name = name.as_ref();
    if name.is_absolute() || name.components().count() > 1 {
        return is_executable(name).then(|| name.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    let extensions = executable_extensions();
    std::env::split_paths(&path_var).find_map(|dir| {
        extensions.iter().find_map(|ext| {
            let candidate = if ext.is_empty() {
                dir.join(name)
            } else {
                dir.join(format!("{}{ext}", name.display()))
            };
            is_executable(&candidate).then_some(candidate)
        })
    })
}

fn executable_extensions() -> Vec<String> {
    let mut extensions = vec![String::new()];
    if cfg!(windows) {
        let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT".to_string());
        extensions.extend(
            pathext
                .split(';')
                .filter(|ext| !ext.is_empty())
                .map(str::to_string),
        );
    }
    extensions
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_tracks_exit_code() {
        assert!(ExecutionResult::new(0, "", "").success);
        assert!(!ExecutionResult::new(2, "out", "err").success);
        assert!(!ExecutionResult::new(-1, "", "").success);
    }

    #[test]
    fn debug_output_hides_environment_values() {
        let spec = CommandSpec::new("tool").env("SECRET", "hunter2");
        let rendered = format!("{spec:?}");
        assert!(rendered.contains("SECRET"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("powershell.exe").args(["-File", "C:\\My Scripts\\a.ps1"]);
        assert_eq!(spec.display(), "powershell.exe -File \"C:\\My Scripts\\a.ps1\"");
    }

    #[test]
    fn missing_executable_is_not_found() {
        assert!(find_executable("definitely-not-a-real-binary-4f1c").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn finds_shell_on_path() {
        assert!(find_executable("sh").is_some());
    }
}
