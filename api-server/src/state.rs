//! Application state

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agent_runner::{ChatService, CliAgentGateway, ExecutionScheduler};
use agentweb_core::{GatewayConfig, InMemorySessionStore, SessionConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    chat: ChatService,
}

impl AppState {
    /// Wire the session store, gateway and scheduler from the config
    ///
    /// In-flight runs are cancelled when `shutdown` is cancelled.
    pub fn new(config: &GatewayConfig, shutdown: CancellationToken) -> Self {
        let gateway = CliAgentGateway::new(config.agents.clone())
            .with_stream_config(config.stream.clone())
            .with_shutdown(shutdown);
        let chat = ChatService::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(gateway),
            ExecutionScheduler::new(&config.scheduler),
            &config.stream,
        );
        Self::with_service(chat)
    }

    pub fn with_service(chat: ChatService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { chat }),
        }
    }

    pub fn chat(&self) -> &ChatService {
        &self.inner.chat
    }
}

/// Periodically evict idle sessions until `shutdown` is cancelled
///
/// Returns `None` when sessions never expire.
pub fn start_session_sweeper(
    state: AppState,
    config: &SessionConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let ttl = config.idle_ttl()?;
    let period = config.sweep_interval();
    info!("Evicting sessions idle for {:?} every {:?}", ttl, period);

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match state.chat().evict_idle(ttl).await {
                Ok(0) => {}
                Ok(n) => info!("Evicted {} idle sessions", n),
                Err(e) => warn!("Session eviction failed: {}", e),
            }
        }
        debug!("Session sweeper stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentweb_core::AgentKind;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweeper_evicts_idle_sessions() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(&GatewayConfig::default(), CancellationToken::new());
        state
            .chat()
            .start_session(AgentKind::Codex, dir.path())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let config = SessionConfig {
            idle_ttl_secs: 1,
            sweep_interval_secs: 1,
        };
        let handle = start_session_sweeper(state.clone(), &config, shutdown.clone()).unwrap();

        let mut remaining = state.chat().session_count().await;
        for _ in 0..40 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            remaining = state.chat().session_count().await;
        }
        assert_eq!(remaining, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_disabled_without_ttl() {
        let state = AppState::new(&GatewayConfig::default(), CancellationToken::new());
        let config = SessionConfig {
            idle_ttl_secs: 0,
            sweep_interval_secs: 1,
        };

        assert!(start_session_sweeper(state, &config, CancellationToken::new()).is_none());
    }
}
