//! Error types for the bridge.

use crate::registry::ProxyKind;
use crate::types::{HandlerId, ResourceKey};
use thiserror::Error;

/// Errors that can occur on the host/script boundary.
///
/// None of these are ever raised as a panic. Every public entry point returns
/// them as values, and most are logged and absorbed where they are produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The control channel could not be opened or a call over it failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No proxy object is registered under this handler id.
    #[error("Unknown handler: {0}")]
    UnknownHandler(HandlerId),

    /// The handler id names a proxy object of a different kind than the slot expects.
    #[error("Handler {id} is a {actual} proxy, expected {expected}")]
    KindMismatch {
        id: HandlerId,
        expected: ProxyKind,
        actual: ProxyKind,
    },

    /// The host object registry has sealed and accepts no more registrations.
    #[error("Host registry is sealed, cannot register {0}")]
    RegistrySealed(ResourceKey),

    /// A relayed event payload could not be decoded.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// The operation is not valid in the current state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A `namespace:path` pair is not a valid resource key.
    #[error("Invalid resource key: {0}")]
    InvalidResourceKey(String),

    /// The host registry refused the registration for another reason.
    #[error("Host rejected {key}: {reason}")]
    HostRejected { key: ResourceKey, reason: String },
}

/// Result type for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
