//! Dart VM service connector over JSON-RPC/WebSocket.

use crate::channel::{ChannelError, Connector, ControlChannel, ReloadReport};
use async_trait::async_trait;
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VmInfo {
    #[serde(default)]
    isolates: Vec<IsolateRef>,
}

#[derive(Debug, Deserialize)]
struct IsolateRef {
    id: String,
}

fn classify(err: ClientError) -> ChannelError {
    match err {
        ClientError::Transport(e) => ChannelError::Unavailable(e.to_string()),
        ClientError::RequestTimeout => ChannelError::Unavailable("request timed out".to_string()),
        other => ChannelError::Other(other.to_string()),
    }
}

/// Opens WebSocket connections to a VM service endpoint.
#[derive(Debug, Clone)]
pub struct VmServiceConnector {
    request_timeout: Duration,
}

impl VmServiceConnector {
    pub fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Per-call timeout, also used for the connection handshake.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for VmServiceConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for VmServiceConnector {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn ControlChannel>, ChannelError> {
        debug!("Opening VM service connection to {}", endpoint);

        let client = WsClientBuilder::default()
            .request_timeout(self.request_timeout)
            .connection_timeout(self.request_timeout)
            .build(endpoint)
            .await
            .map_err(classify)?;

        Ok(Box::new(VmServiceChannel { client }))
    }
}

/// A live VM service connection.
pub struct VmServiceChannel {
    client: WsClient,
}

#[async_trait]
impl ControlChannel for VmServiceChannel {
    async fn isolate_ids(&self) -> Result<Vec<String>, ChannelError> {
        let vm: VmInfo = self
            .client
            .request("getVM", rpc_params![])
            .await
            .map_err(classify)?;

        Ok(vm.isolates.into_iter().map(|isolate| isolate.id).collect())
    }

    async fn reload_sources(&self, isolate_id: &str) -> Result<ReloadReport, ChannelError> {
        let mut params = ObjectParams::new();
        params
            .insert("isolateId", isolate_id)
            .map_err(|e| ChannelError::Other(e.to_string()))?;
        params
            .insert("force", true)
            .map_err(|e| ChannelError::Other(e.to_string()))?;

        self.client
            .request("reloadSources", params)
            .await
            .map_err(classify)
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}
