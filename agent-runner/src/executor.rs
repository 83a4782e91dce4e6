//! CLI agent gateway - runs one agent process per message
//!
//! Buffered runs collect the whole combined output; streamed runs relay it
//! as it arrives. Both are bounded by the agent's configured timeout.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentweb_core::{AgentConfig, AgentKind, AgentsConfig, StreamConfig};

use crate::command::CommandSpec;
use crate::error::{ExecutorError, Result};
use crate::event::{StreamEvent, TIMEOUT_MARKER};
use crate::process::{AgentProcess, ABNORMAL_EXIT_CODE};
use crate::relay::{OutputRelay, RelayError};
use crate::run::{RunRequest, RunResult};
use crate::watchdog::{Outcome, Watchdog};

/// Port for sending a prompt to an agent implementation
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Run one message to completion and return the combined output
    async fn run_once(&self, request: RunRequest) -> Result<RunResult>;

    /// Run one message, sending chunks and then exactly one terminal event
    ///
    /// Returns once the process has exited. Failures to start are reported
    /// as a terminal [`StreamEvent::Error`].
    async fn run_stream(&self, request: RunRequest, events: mpsc::Sender<StreamEvent>);
}

/// Gateway that spawns the configured CLI for every message
pub struct CliAgentGateway {
    agents: Arc<AgentsConfig>,
    stream: StreamConfig,
    shutdown: CancellationToken,
}

/// How the streaming read loop ended
enum Ending {
    /// Output ended or could not be read; the process exits on its own
    Drained,
    /// The deadline fired
    TimedOut,
    /// Consumer gone or shutdown
    Abort,
}

/// One step of the streaming read loop
enum Read {
    Data(Vec<u8>),
    Eof,
    Failed(io::Error),
    Disconnected,
}

impl CliAgentGateway {
    pub fn new(agents: impl Into<Arc<AgentsConfig>>) -> Self {
        Self {
            agents: agents.into(),
            stream: StreamConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the streaming delivery policy
    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Cancel in-flight runs when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    fn resolve(&self, kind: AgentKind) -> Result<&AgentConfig> {
        let config = self.agents.get(kind);
        if !config.is_configured() {
            return Err(ExecutorError::configuration(format!(
                "Executable not configured for {}",
                kind
            )));
        }
        Ok(config)
    }

    fn start(&self, request: &RunRequest) -> Result<(AgentProcess, Watchdog, bool)> {
        let config = self.resolve(request.kind)?;
        let spec = CommandSpec::build(config, &request.message, request.resume_token.as_deref())?;
        let process = AgentProcess::spawn(&spec, &request.working_dir)?;
        let watchdog = Watchdog::arm(config.timeout(), self.shutdown.child_token());
        Ok((process, watchdog, spec.use_stdin))
    }

    async fn stream_process(&self, request: &RunRequest, relay: &mut OutputRelay) -> Result<i32> {
        let (mut process, mut watchdog, use_stdin) = self.start(request)?;
        info!(
            "Streaming {} run (pid {:?}, timeout {:?})",
            request.kind,
            process.pid(),
            watchdog.timeout()
        );

        if use_stdin {
            watchdog.guard(process.write_input(&request.message)).await;
        }

        let ending = loop {
            let step = watchdog
                .guard(async {
                    tokio::select! {
                        read = process.read_chunk() => match read {
                            Ok(Some(bytes)) => Read::Data(bytes),
                            Ok(None) => Read::Eof,
                            Err(e) => Read::Failed(e),
                        },
                        () = relay.closed() => Read::Disconnected,
                    }
                })
                .await;

            let delivered = match step {
                Outcome::Completed(Read::Data(bytes)) => watchdog.guard(relay.push(&bytes)).await,
                Outcome::Completed(Read::Eof) => match watchdog.guard(relay.finish_input()).await {
                    Outcome::Completed(Ok(())) => break Ending::Drained,
                    other => other,
                },
                Outcome::Completed(Read::Failed(e)) => {
                    warn!("Failed to read output of pid {:?}: {}", process.pid(), e);
                    process.close_output();
                    let report = format!("[error] {}\n", e);
                    match watchdog.guard(relay.report(&report)).await {
                        Outcome::Completed(Ok(())) => break Ending::Drained,
                        other => other,
                    }
                }
                Outcome::Completed(Read::Disconnected) => Outcome::Completed(Err(RelayError::Disconnected)),
                Outcome::TimedOut => break Ending::TimedOut,
                Outcome::Cancelled => break Ending::Abort,
            };

            match delivered {
                Outcome::Completed(Ok(())) => {}
                Outcome::Completed(Err(RelayError::Disconnected)) => {
                    info!("Consumer of pid {:?} disconnected, stopping run", process.pid());
                    break Ending::Abort;
                }
                Outcome::TimedOut => break Ending::TimedOut,
                Outcome::Cancelled => break Ending::Abort,
            }
        };

        let code = match ending {
            Ending::Drained => match watchdog.guard(process.wait()).await {
                Outcome::Completed(Ok(code)) => code,
                Outcome::Completed(Err(e)) => {
                    warn!("Failed to wait for pid {:?}: {}", process.pid(), e);
                    process.force_kill().await
                }
                Outcome::TimedOut => timed_out(&mut process, relay, &watchdog).await,
                Outcome::Cancelled => process.force_kill().await,
            },
            Ending::TimedOut => timed_out(&mut process, relay, &watchdog).await,
            Ending::Abort => process.force_kill().await,
        };
        Ok(code)
    }
}

/// Announce the timeout, then kill without a grace period
async fn timed_out(process: &mut AgentProcess, relay: &mut OutputRelay, watchdog: &Watchdog) -> i32 {
    warn!(
        "pid {:?} exceeded timeout {:?}, killing",
        process.pid(),
        watchdog.timeout()
    );
    relay.notice(TIMEOUT_MARKER).await;
    process.force_kill().await;
    ABNORMAL_EXIT_CODE
}

async fn drain(process: &mut AgentProcess, sink: &mut Vec<u8>) -> io::Result<()> {
    while let Some(chunk) = process.read_chunk().await? {
        sink.extend_from_slice(&chunk);
    }
    Ok(())
}

#[async_trait]
impl AgentGateway for CliAgentGateway {
    async fn run_once(&self, request: RunRequest) -> Result<RunResult> {
        let (mut process, mut watchdog, use_stdin) = self.start(&request)?;
        let pid = process.pid();
        info!("Running {} once (pid {:?}, timeout {:?})", request.kind, pid, watchdog.timeout());

        if use_stdin {
            watchdog.guard(process.write_input(&request.message)).await;
        }

        let mut collected = Vec::new();
        let drained = watchdog.guard(drain(&mut process, &mut collected)).await;
        if let Outcome::Completed(Err(e)) = drained {
            warn!("Failed to drain output of pid {:?}: {}", pid, e);
            collected.clear();
        }

        let exit = watchdog.guard(process.wait()).await;
        let output = String::from_utf8_lossy(&collected).into_owned();
        let result = match exit {
            Outcome::Completed(Ok(code)) => RunResult::completed(code, output),
            Outcome::Completed(Err(e)) => {
                warn!("Failed to wait for pid {:?}: {}", pid, e);
                let code = process.force_kill().await;
                RunResult::completed(code, output)
            }
            Outcome::TimedOut => {
                warn!("pid {:?} exceeded timeout {:?}, killing", pid, watchdog.timeout());
                process.force_kill().await;
                RunResult::timed_out(output)
            }
            Outcome::Cancelled => {
                warn!("Run of pid {:?} cancelled, killing", pid);
                process.force_kill().await;
                RunResult::cancelled(output)
            }
        };
        Ok(result)
    }

    async fn run_stream(&self, request: RunRequest, events: mpsc::Sender<StreamEvent>) {
        let mut relay = OutputRelay::new(events, self.stream.cancel_on_disconnect);
        let terminal = match self.stream_process(&request, &mut relay).await {
            Ok(code) => StreamEvent::exit(code),
            Err(e) => {
                warn!("Streaming {} run failed: {}", request.kind, e);
                StreamEvent::error(e.to_string())
            }
        };
        relay.finish(terminal).await;
    }
}
