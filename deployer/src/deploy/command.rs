//! Command execution for git, install and build steps

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Replacement text for redacted secrets
pub const REDACTED: &str = "***";

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives output lines as they are produced
pub trait OutputObserver: Send + Sync {
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// Observer that drops every line
pub struct NoopObserver;

impl OutputObserver for NoopObserver {
    fn on_line(&self, _stream: OutputStream, _line: &str) {}
}

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A command line interpreted by the runner's shell
    Shell(String),
    /// A program with literal arguments, no shell involved
    Exec { program: String, args: Vec<String> },
}

impl CommandSpec {
    pub fn shell(command: impl Into<String>) -> Self {
        CommandSpec::Shell(command.into())
    }

    pub fn exec<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Shell(command) => f.write_str(command),
            CommandSpec::Exec { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
        }
    }
}

/// A command invocation
#[derive(Debug)]
pub struct CommandRequest {
    pub spec: CommandSpec,
    pub working_dir: PathBuf,
    /// Merged over the ambient environment; overlay wins on collision
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    /// Values scrubbed from every captured line
    pub secrets: Vec<SecretString>,
}

impl CommandRequest {
    pub fn new(spec: CommandSpec, working_dir: impl AsRef<Path>) -> Self {
        Self {
            spec,
            working_dir: working_dir.as_ref().to_path_buf(),
            env: HashMap::new(),
            timeout: None,
            secrets: Vec::new(),
        }
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn secret(mut self, secret: SecretString) -> Self {
        self.secrets.push(secret);
        self
    }

    fn redactor(&self) -> Redactor<'_> {
        Redactor::new(self.secrets.iter().map(|s| s.expose_secret()))
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Command failure
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("exited with {}", exit_label(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("timed out after {}s", .timeout.as_secs())]
    TimedOut {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to read output: {0}")]
    Io(#[source] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl CommandError {
    /// Captured stderr, if the command got far enough to produce any
    pub fn stderr(&self) -> &str {
        match self {
            CommandError::Failed { stderr, .. } | CommandError::TimedOut { stderr, .. } => stderr,
            _ => "",
        }
    }

    /// Last `lines` lines of stderr, for error messages
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr().lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Scrubs secret values out of text
pub struct Redactor<'a> {
    secrets: Vec<&'a str>,
}

impl<'a> Redactor<'a> {
    pub fn new(secrets: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            secrets: secrets.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret) {
                out = out.replace(secret, REDACTED);
            }
        }
        out
    }
}

/// Runs commands for the pipeline
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        request: &CommandRequest,
        observer: &dyn OutputObserver,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as local child processes
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl ShellCommandRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn command_for(&self, spec: &CommandSpec) -> Command {
        match spec {
            CommandSpec::Shell(line) => {
                let mut command = Command::new(&self.shell);
                command.arg("-c").arg(line);
                command
            }
            CommandSpec::Exec { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
        }
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

enum Completion {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute(
        &self,
        request: &CommandRequest,
        observer: &dyn OutputObserver,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        let redactor = request.redactor();
        debug!(
            "Running `{}` in {}",
            redactor.apply(&request.spec.to_string()),
            request.working_dir.display()
        );

        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled);
        }

        let mut command = self.command_for(&request.spec);
        command
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(CommandError::Spawn)?;
        let pid = child.id();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let mut stdout = String::new();
        let mut stderr = String::new();

        let completion = {
            let collect = async {
                let (out, err) = tokio::join!(
                    pump(stdout_pipe, OutputStream::Stdout, &mut stdout, observer, &redactor),
                    pump(stderr_pipe, OutputStream::Stderr, &mut stderr, observer, &redactor),
                );
                out.and(err)?;
                child.wait().await
            };
            let deadline = async {
                match request.timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                result = collect => Completion::Exited(result),
                _ = deadline => Completion::TimedOut(request.timeout.unwrap_or_default()),
                _ = cancel.cancelled() => Completion::Cancelled,
            }
        };

        match completion {
            Completion::Exited(Ok(status)) if status.success() => {
                Ok(CommandOutput { stdout, stderr })
            }
            Completion::Exited(Ok(status)) => Err(CommandError::Failed {
                exit_code: status.code(),
                stdout,
                stderr,
            }),
            Completion::Exited(Err(e)) => {
                terminate(&mut child, pid).await;
                Err(CommandError::Io(e))
            }
            Completion::TimedOut(timeout) => {
                terminate(&mut child, pid).await;
                Err(CommandError::TimedOut {
                    timeout,
                    stdout,
                    stderr,
                })
            }
            Completion::Cancelled => {
                terminate(&mut child, pid).await;
                Err(CommandError::Cancelled)
            }
        }
    }
}

async fn pump<R>(
    reader: Option<R>,
    stream: OutputStream,
    buffer: &mut String,
    observer: &dyn OutputObserver,
    redactor: &Redactor<'_>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&raw);
        let line = redactor.apply(text.trim_end_matches(['\n', '\r']));
        observer.on_line(stream, &line);
        buffer.push_str(&line);
        buffer.push('\n');
    }
    Ok(())
}

/// Kill the child and everything it spawned
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_process_group(pid);
    if let Err(e) = child.kill().await {
        debug!("Child already gone: {}", e);
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: killpg only sends a signal. The child was spawned with
    // process_group(0), so its pid is also its process group id.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "killpg({}) failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(OutputStream, String)>>);

    impl OutputObserver for Collect {
        fn on_line(&self, stream: OutputStream, line: &str) {
            self.0.lock().unwrap().push((stream, line.to_string()));
        }
    }

    fn cwd() -> PathBuf {
        std::env::temp_dir()
    }

    #[tokio::test]
    async fn test_streams_and_buffers_output() {
        let runner = ShellCommandRunner::default();
        let observer = Collect::default();
        let request = CommandRequest::new(
            CommandSpec::shell("echo one; echo two >&2; echo three"),
            cwd(),
        );

        let output = runner
            .execute(&request, &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.stdout, "one\nthree\n");
        assert_eq!(output.stderr, "two\n");
        let lines = observer.0.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&(OutputStream::Stderr, "two".to_string())));
    }

    #[tokio::test]
    async fn test_env_overlay_wins() {
        let runner = ShellCommandRunner::default();
        let request = CommandRequest::new(CommandSpec::shell("echo $HOME-$MADA_TEST"), cwd())
            .var("HOME", "/overlay")
            .var("MADA_TEST", "yes");

        let output = runner
            .execute(&request, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "/overlay-yes");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let runner = ShellCommandRunner::default();
        let request = CommandRequest::new(CommandSpec::exec("cat", ["marker.txt"]), dir.path());

        let output = runner
            .execute(&request, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "here\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_output() {
        let runner = ShellCommandRunner::default();
        let request = CommandRequest::new(
            CommandSpec::shell("echo partial; echo 'boom' >&2; exit 3"),
            cwd(),
        );

        let err = runner
            .execute(&request, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            CommandError::Failed {
                exit_code, stdout, ..
            } => {
                assert_eq!(*exit_code, Some(3));
                assert_eq!(stdout, "partial\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.stderr_tail(5), "boom");
        assert_eq!(err.to_string(), "exited with code 3");
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let runner = ShellCommandRunner::default();
        let request = CommandRequest::new(CommandSpec::shell("echo started; sleep 30"), cwd())
            .timeout(Duration::from_millis(300));

        let started = Instant::now();
        let err = runner
            .execute(&request, &NoopObserver, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            CommandError::TimedOut { stdout, .. } => assert_eq!(stdout, "started\n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts() {
        let runner = ShellCommandRunner::default();
        let request = CommandRequest::new(CommandSpec::shell("sleep 30"), cwd());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = runner
            .execute(&request, &NoopObserver, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_secrets_are_redacted() {
        let runner = ShellCommandRunner::default();
        let observer = Collect::default();
        let request = CommandRequest::new(
            CommandSpec::shell("echo https://ghp_secret123@github.com/a/b.git >&2; exit 1"),
            cwd(),
        )
        .secret(SecretString::from("ghp_secret123".to_string()));

        let err = runner
            .execute(&request, &observer, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(!err.stderr().contains("ghp_secret123"));
        assert!(err.stderr().contains("https://***@github.com"));
        assert!(observer
            .0
            .lock()
            .unwrap()
            .iter()
            .all(|(_, line)| !line.contains("ghp_secret123")));
    }

    #[test]
    fn test_exec_spec_display() {
        let spec = CommandSpec::exec("git", ["clone", "--depth", "1"]);
        assert_eq!(spec.to_string(), "git clone --depth 1");
    }
}
