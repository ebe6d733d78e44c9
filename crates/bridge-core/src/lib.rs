//! # bridge-core
//!
//! Handler registry and callback dispatch between a host runtime and a
//! script runtime.
//!
//! This crate provides:
//! - A table of typed callback slots the host invokes synchronously
//! - A registry of script-defined proxy objects, addressed by opaque ids
//! - An event relay that moves host lifecycle events onto the script thread
//! - A per-process context tying the three together
//!
//! ## Threading
//!
//! The dispatch table and registry may be used from any host thread. The
//! script runtime is single-threaded: everything it observes from the host
//! either arrives as a direct call on a handler, or is posted through the
//! relay and delivered on the script thread.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod relay;
pub mod types;

pub use context::BridgeContext;
pub use dispatch::{
    CallbackDispatchTable, EntityTarget, Handler, HostEvent, ItemTarget, ProxyTarget, Response,
    Slot,
};
pub use error::{BridgeError, BridgeResult};
pub use registry::{
    BaseType, BlockSettings, EntitySettings, HandlerRegistry, HostRegistry, HostRegistryError,
    ItemSettings, MemoryHostRegistry, ProxyConfig, ProxyKind, ProxyObject, SpawnGroup,
};
pub use relay::{
    ContainerClosed, ContainerOpened, EventRelay, EventStream, ListenerId, PayloadLedger,
    RelayInbox, RelaySender,
};
pub use types::{
    BlockPos, EntityId, Hand, HandlerId, InteractionResult, PlayerId, ResourceKey, Verdict, WorldId,
};
