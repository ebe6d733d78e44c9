//! Reload session state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                               |                 |  reload ok
//!                               +--exhausted--> Disconnected
//! ```

use crate::channel::{ChannelError, Connector, ControlChannel, ReloadReport};
use crate::config::ReloadConfig;
use crate::vm_service::VmServiceConnector;
use bridge_core::{BridgeError, BridgeResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Control connection to a running script VM.
///
/// Tracks a single isolate, the first one the VM reports on connect.
/// Dropping a session closes its connection.
pub struct ReloadSession {
    connector: Box<dyn Connector>,
    config: ReloadConfig,
    channel: Option<Box<dyn ControlChannel>>,
    isolate_id: Option<String>,
    state: SessionState,
}

impl ReloadSession {
    /// Create a session that talks to the VM service over WebSocket.
    pub fn new(config: ReloadConfig) -> Self {
        Self::with_connector(config, Box::new(VmServiceConnector::new()))
    }

    pub fn with_connector(config: ReloadConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            config,
            channel: None,
            isolate_id: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn isolate_id(&self) -> Option<&str> {
        self.isolate_id.as_deref()
    }

    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    /// Connect using the configured endpoint and retry budget.
    pub async fn connect_default(&mut self) -> bool {
        let endpoint = self.config.endpoint.clone();
        let attempts = self.config.max_attempts;
        let delay = self.config.retry_delay();
        self.connect(&endpoint, attempts, delay).await
    }

    /// Try up to `max_attempts` times, sleeping `delay` between attempts.
    ///
    /// Any existing connection is closed first. Dropping the returned future
    /// abandons the attempt and leaves the session in `Connecting`; call
    /// [`disconnect`](Self::disconnect) to reset it.
    pub async fn connect(&mut self, endpoint: &str, max_attempts: u32, delay: Duration) -> bool {
        self.disconnect();
        self.state = SessionState::Connecting;
        info!(
            "Connecting to VM service at {} ({} attempts, {:?} apart)",
            endpoint, max_attempts, delay
        );

        for attempt in 1..=max_attempts {
            match self.try_connect(endpoint).await {
                Ok((channel, isolate_id)) => {
                    info!(attempt, isolate = %isolate_id, "Connected to VM service");
                    self.channel = Some(channel);
                    self.isolate_id = Some(isolate_id);
                    self.state = SessionState::Connected;
                    return true;
                }
                Err(ChannelError::Unavailable(reason)) => {
                    debug!(attempt, max_attempts, "VM service not ready: {}", reason);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, "Connection attempt failed: {}", e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            "Could not connect to VM service at {} after {} attempts",
            endpoint, max_attempts
        );
        self.state = SessionState::Disconnected;
        false
    }

    async fn try_connect(
        &self,
        endpoint: &str,
    ) -> Result<(Box<dyn ControlChannel>, String), ChannelError> {
        let channel = self.connector.open(endpoint).await?;
        let isolate_id = channel
            .isolate_ids()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChannelError::Unavailable("no isolate yet".to_string()))?;
        Ok((channel, isolate_id))
    }

    /// Force the tracked isolate to reload its sources.
    pub async fn reload(&mut self) -> BridgeResult<ReloadReport> {
        let (Some(channel), Some(isolate_id)) = (&self.channel, &self.isolate_id) else {
            return Err(BridgeError::Precondition(format!(
                "cannot reload while {}",
                self.state
            )));
        };

        match channel.reload_sources(isolate_id).await {
            Ok(report) => {
                if report.success {
                    info!(isolate = %isolate_id, "Reloaded sources");
                } else {
                    warn!(isolate = %isolate_id, details = ?report.details, "VM reported reload failure");
                }
                Ok(report)
            }
            Err(e) => {
                warn!(isolate = %isolate_id, "Reload call failed: {}", e);
                if !channel.is_connected() {
                    self.disconnect();
                }
                Err(BridgeError::Connection(e.to_string()))
            }
        }
    }

    /// Close the connection. Safe to call in any state.
    pub fn disconnect(&mut self) {
        if self.channel.take().is_some() {
            info!("Disconnected from VM service");
        }
        self.isolate_id = None;
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    struct FakeChannel {
        isolates: Vec<String>,
        report: Result<ReloadReport, ChannelError>,
        connected: Arc<AtomicBool>,
        reloads: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ControlChannel for FakeChannel {
        async fn isolate_ids(&self) -> Result<Vec<String>, ChannelError> {
            Ok(self.isolates.clone())
        }

        async fn reload_sources(&self, isolate_id: &str) -> Result<ReloadReport, ChannelError> {
            self.reloads.lock().unwrap().push(isolate_id.to_string());
            self.report.clone()
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    /// Plays back a scripted sequence of open results, then refuses.
    #[derive(Clone, Default)]
    struct FakeConnector {
        attempts: Arc<AtomicUsize>,
        script: Arc<Mutex<VecDeque<Result<Vec<String>, ChannelError>>>>,
        report: Option<Result<ReloadReport, ChannelError>>,
        connected: Arc<AtomicBool>,
        reloads: Arc<Mutex<Vec<String>>>,
    }

    impl FakeConnector {
        fn scripted(steps: Vec<Result<Vec<String>, ChannelError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(steps.into())),
                connected: Arc::new(AtomicBool::new(true)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn open(&self, _endpoint: &str) -> Result<Box<dyn ControlChannel>, ChannelError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChannelError::Unavailable("connection refused".into())));

            step.map(|isolates| {
                Box::new(FakeChannel {
                    isolates,
                    report: self.report.clone().unwrap_or(Ok(ReloadReport {
                        kind: "ReloadReport".to_string(),
                        success: true,
                        details: None,
                    })),
                    connected: Arc::clone(&self.connected),
                    reloads: Arc::clone(&self.reloads),
                }) as Box<dyn ControlChannel>
            })
        }
    }

    fn session(connector: &FakeConnector) -> ReloadSession {
        ReloadSession::with_connector(ReloadConfig::default(), Box::new(connector.clone()))
    }

    #[tokio::test]
    async fn test_dead_endpoint_exhausts_attempts() {
        let connector = FakeConnector::scripted(vec![]);
        let mut session = session(&connector);

        let start = Instant::now();
        let connected = session
            .connect("ws://127.0.0.1:1/ws", 3, Duration::from_millis(10))
            .await;

        assert!(!connected);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.isolate_id().is_none());
    }

    #[tokio::test]
    async fn test_retries_until_isolate_appears() {
        let connector = FakeConnector::scripted(vec![
            Err(ChannelError::Unavailable("refused".into())),
            Ok(vec![]),
            Err(ChannelError::Other("bad handshake".into())),
            Ok(vec!["isolates/1".into(), "isolates/2".into()]),
        ]);
        let mut session = session(&connector);

        assert!(session.connect("ws://vm", 10, Duration::from_millis(1)).await);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.isolate_id(), Some("isolates/1"));
    }

    #[tokio::test]
    async fn test_reload_requires_connection() {
        let connector = FakeConnector::scripted(vec![]);
        let mut session = session(&connector);

        let err = session.reload().await.unwrap_err();
        assert!(matches!(err, BridgeError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_reload_targets_tracked_isolate() {
        let connector = FakeConnector::scripted(vec![Ok(vec!["isolates/7".into()])]);
        let mut session = session(&connector);
        assert!(session.connect("ws://vm", 1, Duration::ZERO).await);

        let report = session.reload().await.unwrap();
        assert!(report.success);
        let report = session.reload().await.unwrap();
        assert!(report.success);

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(
            *connector.reloads.lock().unwrap(),
            vec!["isolates/7", "isolates/7"]
        );
    }

    #[tokio::test]
    async fn test_reload_failure_on_closed_transport_disconnects() {
        let mut connector = FakeConnector::scripted(vec![Ok(vec!["isolates/7".into()])]);
        connector.report = Some(Err(ChannelError::Other("connection closed".into())));
        let mut session = session(&connector);
        assert!(session.connect("ws://vm", 1, Duration::ZERO).await);

        connector.connected.store(false, Ordering::SeqCst);
        let err = session.reload().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let connector = FakeConnector::scripted(vec![Ok(vec!["isolates/7".into()])]);
        let mut session = session(&connector);
        assert!(session.connect("ws://vm", 1, Duration::ZERO).await);

        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.isolate_id().is_none());
    }

    #[tokio::test]
    async fn test_zero_attempts_fails_immediately() {
        let connector = FakeConnector::scripted(vec![Ok(vec!["isolates/7".into()])]);
        let mut session = session(&connector);
        assert!(!session.connect("ws://vm", 0, Duration::from_secs(5)).await);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }
}
