//! Agent process management
//!
//! One [`AgentProcess`] owns one child: its stdin, its combined
//! stdout/stderr channel and its exit status. On Unix both output streams
//! are attached to the same OS pipe so the relative order of writes is kept
//! exactly; elsewhere the two streams are forwarded into one channel.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::command::CommandSpec;
use crate::error::{ExecutorError, Result};

pub use imp::CombinedOutput;
use imp::PendingOutput;

/// Time allowed for a killed process to be reaped
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Exit code reported when the process was killed or no code is available
pub const ABNORMAL_EXIT_CODE: i32 = -1;

const READ_BUFFER_SIZE: usize = 4096;

/// Represents a running agent process
pub struct AgentProcess {
    child: Child,
    output: Option<CombinedOutput>,
    program: String,
}

impl AgentProcess {
    /// Spawn a new agent process in `working_dir`
    pub fn spawn(spec: &CommandSpec, working_dir: &Path) -> Result<Self> {
        info!("Spawning {} in {:?}", spec.program, working_dir);
        debug!("{} argv: {:?}, stdin: {}", spec.program, spec.args, spec.use_stdin);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .current_dir(working_dir)
            .stdin(if spec.use_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let pending = PendingOutput::attach(&mut cmd).map_err(|e| {
            ExecutorError::spawn_failed("Failed to create output pipe", e)
        })?;

        let mut child = cmd.spawn().map_err(|e| {
            ExecutorError::spawn_failed(
                format!("Failed to spawn {}: {}", spec.program, e),
                e,
            )
        })?;
        // The command keeps the parent's copies of the pipe's write end open
        drop(cmd);

        let output = pending.into_output(&mut child).map_err(|e| {
            ExecutorError::spawn_failed("Failed to capture output", e)
        })?;

        Ok(Self {
            child,
            output: Some(output),
            program: spec.program.clone(),
        })
    }

    /// Get the process ID
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write the message to stdin and close it
    ///
    /// A process that exits without reading its input yields a broken pipe;
    /// that is logged and otherwise ignored.
    pub async fn write_input(&mut self, message: &str) {
        let Some(mut stdin) = self.child.stdin.take() else {
            return;
        };
        if let Err(e) = stdin.write_all(message.as_bytes()).await {
            warn!("Failed to write stdin of {}: {}", self.program, e);
        } else if let Err(e) = stdin.shutdown().await {
            debug!("Failed to close stdin of {}: {}", self.program, e);
        }
    }

    /// Read the next chunk of combined output; `None` at EOF
    pub async fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.output.as_mut() {
            Some(output) => output.read_chunk().await,
            None => Ok(None),
        }
    }

    /// Stop reading output; later writes by the process fail with a broken pipe
    pub fn close_output(&mut self) {
        if self.output.take().is_some() {
            debug!("Closed output of {} (pid {:?})", self.program, self.pid());
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        let code = status.code().unwrap_or(ABNORMAL_EXIT_CODE);
        info!("{} (pid {:?}) exited with code {}", self.program, self.pid(), code);
        Ok(code)
    }

    /// Kill the process without a grace period and reap it
    pub async fn force_kill(&mut self) -> i32 {
        let pid = self.child.id();
        if let Err(e) = self.child.start_kill() {
            debug!("Kill of {} (pid {:?}) failed: {}", self.program, pid, e);
        }
        match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("{} (pid {:?}) killed", self.program, pid);
                status.code().unwrap_or(ABNORMAL_EXIT_CODE)
            }
            Ok(Err(e)) => {
                warn!("Failed to reap {} (pid {:?}): {}", self.program, pid, e);
                ABNORMAL_EXIT_CODE
            }
            Err(_) => {
                warn!("{} (pid {:?}) not reaped within {:?}", self.program, pid, KILL_GRACE);
                ABNORMAL_EXIT_CODE
            }
        }
    }
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::io::PipeReader;
    use std::os::fd::OwnedFd;

    use tokio::io::AsyncReadExt;
    use tokio::net::unix::pipe;
    use tokio::process::{Child, Command};

    use super::READ_BUFFER_SIZE;

    /// Read end of the pipe shared by stdout and stderr, before spawn
    pub(super) struct PendingOutput(PipeReader);

    impl PendingOutput {
        pub(super) fn attach(cmd: &mut Command) -> io::Result<Self> {
            let (reader, writer) = std::io::pipe()?;
            let stderr = writer.try_clone()?;
            cmd.stdout(writer).stderr(stderr);
            Ok(Self(reader))
        }

        pub(super) fn into_output(self, _child: &mut Child) -> io::Result<CombinedOutput> {
            let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(self.0))?;
            Ok(CombinedOutput { receiver })
        }
    }

    /// The single byte stream formed by stdout and stderr
    pub struct CombinedOutput {
        receiver: pipe::Receiver,
    }

    impl CombinedOutput {
        pub async fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let n = self.receiver.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some(buf))
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;
    use std::process::Stdio;

    use tokio::io::{AsyncRead, AsyncReadExt};
    use tokio::process::{Child, Command};
    use tokio::sync::mpsc;

    use super::READ_BUFFER_SIZE;

    pub(super) struct PendingOutput;

    impl PendingOutput {
        pub(super) fn attach(cmd: &mut Command) -> io::Result<Self> {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            Ok(Self)
        }

        pub(super) fn into_output(self, child: &mut Child) -> io::Result<CombinedOutput> {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| io::Error::other("Failed to capture stderr"))?;

            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(forward(stdout, tx.clone()));
            tokio::spawn(forward(stderr, tx));
            Ok(CombinedOutput { rx })
        }
    }

    async fn forward<R>(mut reader: R, tx: mpsc::Sender<io::Result<Vec<u8>>>)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let item = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => Ok(buf[..n].to_vec()),
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    }

    /// Stdout and stderr forwarded into one channel in arrival order
    pub struct CombinedOutput {
        rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    }

    impl CombinedOutput {
        pub async fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
            self.rx.recv().await.transpose()
        }
    }
}
