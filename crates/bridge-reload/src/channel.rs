//! Connection seams used by [`ReloadSession`](crate::ReloadSession).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from opening or using a control channel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    /// The VM is not reachable yet. Expected while it starts up.
    #[error("VM service unavailable: {0}")]
    Unavailable(String),

    /// Anything else: protocol errors, rejected calls, bad responses.
    #[error("{0}")]
    Other(String),
}

/// Outcome of a `reloadSources` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadReport {
    #[serde(rename = "type", default)]
    pub kind: String,

    pub success: bool,

    /// VM-specific detail, e.g. counts of loaded libraries or compile errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// An open control connection to a running VM.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Ids of the isolates running in the VM.
    async fn isolate_ids(&self) -> Result<Vec<String>, ChannelError>;

    /// Force a reload of the isolate's sources.
    async fn reload_sources(&self, isolate_id: &str) -> Result<ReloadReport, ChannelError>;

    /// Whether the underlying transport is still open.
    fn is_connected(&self) -> bool;
}

/// Opens control channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn ControlChannel>, ChannelError>;
}
