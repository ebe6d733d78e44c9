//! # bridge-reload
//!
//! Control session for reconnecting to a running script VM and forcing it to
//! reload its code.
//!
//! The session speaks the Dart VM service protocol (JSON-RPC over
//! WebSocket): `getVM` to find the running isolate and `reloadSources` to
//! reload it. Connection attempts are retried on a fixed delay until the VM
//! comes up or the attempt budget runs out.

pub mod channel;
pub mod config;
pub mod session;
pub mod vm_service;

pub use channel::{ChannelError, Connector, ControlChannel, ReloadReport};
pub use config::{is_valid_endpoint, ReloadConfig, ENDPOINT_ENV};
pub use session::{ReloadSession, SessionState};
pub use vm_service::{VmServiceChannel, VmServiceConnector};
