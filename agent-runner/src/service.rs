//! Chat service
//!
//! Composes the session store, the agent gateway and the scheduler into the
//! operations exposed to the HTTP layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use agentweb_core::{AgentKind, Error as CoreError, Session, SessionStore, StreamConfig};

use crate::error::Result;
use crate::event::StreamEvent;
use crate::executor::AgentGateway;
use crate::run::{RunRequest, RunResult};
use crate::scheduler::ExecutionScheduler;

pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn AgentGateway>,
    scheduler: ExecutionScheduler,
    stream_buffer: usize,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<dyn AgentGateway>,
        scheduler: ExecutionScheduler,
        stream: &StreamConfig,
    ) -> Self {
        Self {
            sessions,
            gateway,
            scheduler,
            stream_buffer: stream.buffer.max(1),
        }
    }

    /// Open a session for `kind` rooted at an existing directory
    pub async fn start_session(&self, kind: AgentKind, working_dir: impl AsRef<Path>) -> Result<Session> {
        let dir = resolve_working_dir(working_dir.as_ref()).await?;
        let session = self.sessions.save(Session::new(kind, dir)).await?;
        info!(
            "Started {} session {} in {:?}",
            session.agent_kind, session.id, session.working_dir
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.require_session(session_id).await
    }

    /// Forget a session; runs already queued for it are unaffected
    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        if !self.sessions.remove(session_id).await? {
            return Err(CoreError::SessionNotFound(session_id.to_string()).into());
        }
        info!("Closed session {}", session_id);
        Ok(())
    }

    /// Run one message to completion in the session's directory
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<RunResult> {
        let session = self.require_session(session_id).await?;
        debug!("Sending buffered message to session {}", session.id);
        self.gateway
            .run_once(RunRequest::for_session(&session, message))
            .await
    }

    /// Queue a streamed run and return its events
    ///
    /// Fails without producing a stream when the session is unknown or the
    /// scheduler rejects the job.
    pub async fn stream_message(
        &self,
        session_id: &str,
        message: &str,
        resume_token: Option<String>,
    ) -> Result<ReceiverStream<StreamEvent>> {
        let session = self.require_session(session_id).await?;
        let request = RunRequest::for_session(&session, message).with_resume_token(resume_token);

        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let gateway = Arc::clone(&self.gateway);
        self.scheduler
            .submit(async move { gateway.run_stream(request, tx).await })?;
        debug!(
            "Queued streamed message for session {} ({} waiting)",
            session.id,
            self.scheduler.queued()
        );
        Ok(ReceiverStream::new(rx))
    }

    /// Drop sessions idle for longer than `ttl`
    pub async fn evict_idle(&self, ttl: Duration) -> Result<usize> {
        Ok(self.sessions.evict_idle(ttl).await?)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    pub fn scheduler(&self) -> &ExecutionScheduler {
        &self.scheduler
    }

    async fn require_session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()).into())
    }
}

async fn resolve_working_dir(path: &Path) -> Result<PathBuf> {
    let invalid = || CoreError::InvalidWorkingDir(path.to_path_buf());
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(invalid().into()),
    }
    tokio::fs::canonicalize(path).await.map_err(|_| invalid().into())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use agentweb_core::{AgentConfig, AgentsConfig, InMemorySessionStore, SchedulerConfig};
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    use crate::error::{ExecutorError, SchedulerError};
    use crate::executor::CliAgentGateway;

    fn echo_agents() -> AgentsConfig {
        AgentsConfig::default().with(
            AgentKind::Codex,
            AgentConfig::new("/bin/echo")
                .with_args(["Echo", "${MESSAGE}"])
                .with_stdin(false),
        )
    }

    fn service_with(agents: AgentsConfig, scheduler: SchedulerConfig) -> ChatService {
        ChatService::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(CliAgentGateway::new(agents)),
            ExecutionScheduler::new(&scheduler),
            &StreamConfig::default(),
        )
    }

    fn service() -> ChatService {
        service_with(echo_agents(), SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_start_session_canonicalizes_dir() {
        let dir = TempDir::new().unwrap();
        let service = service();

        let nested = dir.path().join("work");
        std::fs::create_dir(&nested).unwrap();
        let session = service
            .start_session(AgentKind::Codex, nested.join("..").join("work"))
            .await
            .unwrap();

        assert_eq!(session.working_dir, nested.canonicalize().unwrap());
        assert_eq!(service.session_count().await, 1);
        assert_eq!(service.get_session(&session.id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_close_session_forgets_it() {
        let dir = TempDir::new().unwrap();
        let service = service();
        let session = service.start_session(AgentKind::Codex, dir.path()).await.unwrap();

        service.close_session(&session.id).await.unwrap();

        assert_eq!(service.session_count().await, 0);
        let err = service.send_message(&session.id, "hello").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Core(CoreError::SessionNotFound(_))));
        let err = service.close_session(&session.id).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Core(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_start_session_rejects_missing_dir() {
        let dir = TempDir::new().unwrap();
        let service = service();

        let err = service
            .start_session(AgentKind::Codex, dir.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Core(CoreError::InvalidWorkingDir(_))));
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_session_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "x").unwrap();

        let err = service()
            .start_session(AgentKind::Claude, &file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Core(CoreError::InvalidWorkingDir(_))));
    }

    #[tokio::test]
    async fn test_send_message_end_to_end() {
        let dir = TempDir::new().unwrap();
        let service = service();
        let session = service.start_session(AgentKind::Codex, dir.path()).await.unwrap();

        let result = service.send_message(&session.id, "hello").await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("Echo hello"));
        assert_eq!(result.transcript(), "[exit=0]\nEcho hello\n");
    }

    #[tokio::test]
    async fn test_send_message_runs_in_session_dir() {
        let dir = TempDir::new().unwrap();
        let service = service_with(
            AgentsConfig::default().with(
                AgentKind::Claude,
                AgentConfig::new("/bin/sh")
                    .with_args(["-c", "pwd -P"])
                    .with_stdin(false),
            ),
            SchedulerConfig::default(),
        );
        let session = service.start_session(AgentKind::Claude, dir.path()).await.unwrap();

        let result = service.send_message(&session.id, "where").await.unwrap();

        assert_eq!(
            result.output.trim_end(),
            dir.path().canonicalize().unwrap().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let service = service();

        let err = service.send_message("missing", "hello").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Core(CoreError::SessionNotFound(ref id)) if id == "missing"));

        let err = service
            .stream_message("missing", "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Core(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_stream_message_ends_with_exit() {
        let dir = TempDir::new().unwrap();
        let service = service();
        let session = service.start_session(AgentKind::Codex, dir.path()).await.unwrap();

        let events: Vec<StreamEvent> = service
            .stream_message(&session.id, "hello", None)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events,
            vec![StreamEvent::chunk("Echo hello\n"), StreamEvent::exit(0)]
        );
    }

    #[tokio::test]
    async fn test_stream_message_unconfigured_agent_reports_error_event() {
        let dir = TempDir::new().unwrap();
        let service = service();
        let session = service.start_session(AgentKind::Claude, dir.path()).await.unwrap();

        let events: Vec<StreamEvent> = service
            .stream_message(&session.id, "hello", None)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_stream_message_rejected_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let service = service();
        let session = service.start_session(AgentKind::Codex, dir.path()).await.unwrap();
        service.scheduler().shutdown();

        let err = service
            .stream_message(&session.id, "hello", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Scheduler(SchedulerError::Closed)));
    }

    #[tokio::test]
    async fn test_evict_idle_removes_sessions() {
        let dir = TempDir::new().unwrap();
        let service = service();
        service.start_session(AgentKind::Codex, dir.path()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let evicted = service.evict_idle(Duration::from_millis(10)).await.unwrap();

        assert_eq!(evicted, 1);
        assert_eq!(service.session_count().await, 0);
    }
}
