//! Typed callback slots invoked by the host.
//!
//! Each [`Slot`] holds at most one script-side handler. The host calls
//! [`CallbackDispatchTable::dispatch`] from any of its threads; when nothing is
//! registered the slot answers with a fixed default instead of failing.
//!
//! | Slot | Default |
//! |------|---------|
//! | `block_break`, `block_interact` | allow |
//! | `tick`, `server_*` | no-op |
//! | `proxy_block_break` | allow |
//! | `proxy_block_use` | pass |
//! | other `proxy_block_*` | no-op |
//! | `proxy_item_use`, `proxy_item_use_on_block`, `proxy_item_use_on_entity` | pass |
//! | `proxy_item_attack_entity` | allow |
//! | `proxy_entity_damage` | allow |
//! | other `proxy_entity_*` | no-op |
//!
//! Proxy slots carry the [`HandlerId`] of the object the host is asking about.
//! [`Slot::proxy_kind`] names the kind of object that id must refer to.

use crate::registry::ProxyKind;
use crate::types::{
    BlockPos, EntityId, Hand, HandlerId, InteractionResult, PlayerId, Verdict, WorldId,
};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// A named event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    BlockBreak,
    BlockInteract,
    Tick,
    ServerStarting,
    ServerStarted,
    ServerStopping,
    ProxyBlockBreak,
    ProxyBlockUse,
    ProxyBlockPlaced,
    ProxyBlockRemoved,
    ProxyBlockSteppedOn,
    ProxyBlockFallenUpon,
    ProxyBlockRandomTick,
    ProxyBlockNeighborChanged,
    ProxyBlockEntityInside,
    ProxyItemUse,
    ProxyItemUseOnBlock,
    ProxyItemUseOnEntity,
    ProxyItemAttackEntity,
    ProxyEntitySpawn,
    ProxyEntityTick,
    ProxyEntityDeath,
    ProxyEntityDamage,
    ProxyEntityAttack,
    ProxyEntityTarget,
}

impl Slot {
    /// Number of slots in the table.
    pub const COUNT: usize = 25;

    /// Every slot, in table order.
    pub const ALL: [Slot; Slot::COUNT] = [
        Slot::BlockBreak,
        Slot::BlockInteract,
        Slot::Tick,
        Slot::ServerStarting,
        Slot::ServerStarted,
        Slot::ServerStopping,
        Slot::ProxyBlockBreak,
        Slot::ProxyBlockUse,
        Slot::ProxyBlockPlaced,
        Slot::ProxyBlockRemoved,
        Slot::ProxyBlockSteppedOn,
        Slot::ProxyBlockFallenUpon,
        Slot::ProxyBlockRandomTick,
        Slot::ProxyBlockNeighborChanged,
        Slot::ProxyBlockEntityInside,
        Slot::ProxyItemUse,
        Slot::ProxyItemUseOnBlock,
        Slot::ProxyItemUseOnEntity,
        Slot::ProxyItemAttackEntity,
        Slot::ProxyEntitySpawn,
        Slot::ProxyEntityTick,
        Slot::ProxyEntityDeath,
        Slot::ProxyEntityDamage,
        Slot::ProxyEntityAttack,
        Slot::ProxyEntityTarget,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The answer given when no handler is registered.
    pub fn default_response(self) -> Response {
        match self {
            Slot::BlockBreak
            | Slot::BlockInteract
            | Slot::ProxyBlockBreak
            | Slot::ProxyItemAttackEntity
            | Slot::ProxyEntityDamage => Response::Verdict(Verdict::Allow),
            Slot::ProxyBlockUse => Response::Interaction(InteractionResult::Pass),
            Slot::ProxyItemUse | Slot::ProxyItemUseOnBlock | Slot::ProxyItemUseOnEntity => {
                Response::ItemAction(InteractionResult::Pass)
            }
            Slot::Tick
            | Slot::ServerStarting
            | Slot::ServerStarted
            | Slot::ServerStopping
            | Slot::ProxyBlockPlaced
            | Slot::ProxyBlockRemoved
            | Slot::ProxyBlockSteppedOn
            | Slot::ProxyBlockFallenUpon
            | Slot::ProxyBlockRandomTick
            | Slot::ProxyBlockNeighborChanged
            | Slot::ProxyBlockEntityInside
            | Slot::ProxyEntitySpawn
            | Slot::ProxyEntityTick
            | Slot::ProxyEntityDeath
            | Slot::ProxyEntityAttack
            | Slot::ProxyEntityTarget => Response::Done,
        }
    }

    /// Kind of proxy object the slot's handler id must name, if it has one.
    pub fn proxy_kind(self) -> Option<ProxyKind> {
        match self {
            Slot::BlockBreak
            | Slot::BlockInteract
            | Slot::Tick
            | Slot::ServerStarting
            | Slot::ServerStarted
            | Slot::ServerStopping => None,
            Slot::ProxyBlockBreak
            | Slot::ProxyBlockUse
            | Slot::ProxyBlockPlaced
            | Slot::ProxyBlockRemoved
            | Slot::ProxyBlockSteppedOn
            | Slot::ProxyBlockFallenUpon
            | Slot::ProxyBlockRandomTick
            | Slot::ProxyBlockNeighborChanged
            | Slot::ProxyBlockEntityInside => Some(ProxyKind::Block),
            Slot::ProxyItemUse
            | Slot::ProxyItemUseOnBlock
            | Slot::ProxyItemUseOnEntity
            | Slot::ProxyItemAttackEntity => Some(ProxyKind::Item),
            Slot::ProxyEntitySpawn
            | Slot::ProxyEntityTick
            | Slot::ProxyEntityDeath
            | Slot::ProxyEntityDamage
            | Slot::ProxyEntityAttack
            | Slot::ProxyEntityTarget => Some(ProxyKind::Entity),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::BlockBreak => "block_break",
            Slot::BlockInteract => "block_interact",
            Slot::Tick => "tick",
            Slot::ServerStarting => "server_starting",
            Slot::ServerStarted => "server_started",
            Slot::ServerStopping => "server_stopping",
            Slot::ProxyBlockBreak => "proxy_block_break",
            Slot::ProxyBlockUse => "proxy_block_use",
            Slot::ProxyBlockPlaced => "proxy_block_placed",
            Slot::ProxyBlockRemoved => "proxy_block_removed",
            Slot::ProxyBlockSteppedOn => "proxy_block_stepped_on",
            Slot::ProxyBlockFallenUpon => "proxy_block_fallen_upon",
            Slot::ProxyBlockRandomTick => "proxy_block_random_tick",
            Slot::ProxyBlockNeighborChanged => "proxy_block_neighbor_changed",
            Slot::ProxyBlockEntityInside => "proxy_block_entity_inside",
            Slot::ProxyItemUse => "proxy_item_use",
            Slot::ProxyItemUseOnBlock => "proxy_item_use_on_block",
            Slot::ProxyItemUseOnEntity => "proxy_item_use_on_entity",
            Slot::ProxyItemAttackEntity => "proxy_item_attack_entity",
            Slot::ProxyEntitySpawn => "proxy_entity_spawn",
            Slot::ProxyEntityTick => "proxy_entity_tick",
            Slot::ProxyEntityDeath => "proxy_entity_death",
            Slot::ProxyEntityDamage => "proxy_entity_damage",
            Slot::ProxyEntityAttack => "proxy_entity_attack",
            Slot::ProxyEntityTarget => "proxy_entity_target",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The proxy block an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyTarget {
    pub handler: HandlerId,
    pub world: WorldId,
    pub pos: BlockPos,
}

/// The proxy item an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTarget {
    pub handler: HandlerId,
    pub world: WorldId,
}

/// The live instance of a proxy entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTarget {
    pub handler: HandlerId,
    pub entity: EntityId,
}

/// An event raised by the host, carrying the arguments of its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    BlockBreak { pos: BlockPos, player: PlayerId },
    BlockInteract { pos: BlockPos, player: PlayerId, hand: Hand },
    Tick { tick: u64 },
    ServerStarting,
    ServerStarted,
    ServerStopping,
    ProxyBlockBreak { target: ProxyTarget, player: PlayerId },
    ProxyBlockUse { target: ProxyTarget, player: PlayerId, hand: Hand },
    ProxyBlockPlaced { target: ProxyTarget, player: PlayerId },
    ProxyBlockRemoved { target: ProxyTarget },
    ProxyBlockSteppedOn { target: ProxyTarget, entity: EntityId },
    ProxyBlockFallenUpon { target: ProxyTarget, entity: EntityId, fall_distance: f32 },
    ProxyBlockRandomTick { target: ProxyTarget },
    ProxyBlockNeighborChanged { target: ProxyTarget, neighbor: BlockPos },
    ProxyBlockEntityInside { target: ProxyTarget, entity: EntityId },
    ProxyItemUse { target: ItemTarget, player: PlayerId, hand: Hand },
    ProxyItemUseOnBlock { target: ItemTarget, pos: BlockPos, player: PlayerId, hand: Hand },
    ProxyItemUseOnEntity { target: ItemTarget, entity: EntityId, player: PlayerId, hand: Hand },
    ProxyItemAttackEntity { target: ItemTarget, attacker: EntityId, victim: EntityId },
    ProxyEntitySpawn { target: EntityTarget, world: WorldId },
    ProxyEntityTick { target: EntityTarget },
    ProxyEntityDeath { target: EntityTarget, source: String },
    ProxyEntityDamage { target: EntityTarget, source: String, amount: f64 },
    ProxyEntityAttack { target: EntityTarget, victim: EntityId },
    ProxyEntityTarget { target: EntityTarget, victim: EntityId },
}

impl HostEvent {
    pub fn slot(&self) -> Slot {
        match self {
            HostEvent::BlockBreak { .. } => Slot::BlockBreak,
            HostEvent::BlockInteract { .. } => Slot::BlockInteract,
            HostEvent::Tick { .. } => Slot::Tick,
            HostEvent::ServerStarting => Slot::ServerStarting,
            HostEvent::ServerStarted => Slot::ServerStarted,
            HostEvent::ServerStopping => Slot::ServerStopping,
            HostEvent::ProxyBlockBreak { .. } => Slot::ProxyBlockBreak,
            HostEvent::ProxyBlockUse { .. } => Slot::ProxyBlockUse,
            HostEvent::ProxyBlockPlaced { .. } => Slot::ProxyBlockPlaced,
            HostEvent::ProxyBlockRemoved { .. } => Slot::ProxyBlockRemoved,
            HostEvent::ProxyBlockSteppedOn { .. } => Slot::ProxyBlockSteppedOn,
            HostEvent::ProxyBlockFallenUpon { .. } => Slot::ProxyBlockFallenUpon,
            HostEvent::ProxyBlockRandomTick { .. } => Slot::ProxyBlockRandomTick,
            HostEvent::ProxyBlockNeighborChanged { .. } => Slot::ProxyBlockNeighborChanged,
            HostEvent::ProxyBlockEntityInside { .. } => Slot::ProxyBlockEntityInside,
            HostEvent::ProxyItemUse { .. } => Slot::ProxyItemUse,
            HostEvent::ProxyItemUseOnBlock { .. } => Slot::ProxyItemUseOnBlock,
            HostEvent::ProxyItemUseOnEntity { .. } => Slot::ProxyItemUseOnEntity,
            HostEvent::ProxyItemAttackEntity { .. } => Slot::ProxyItemAttackEntity,
            HostEvent::ProxyEntitySpawn { .. } => Slot::ProxyEntitySpawn,
            HostEvent::ProxyEntityTick { .. } => Slot::ProxyEntityTick,
            HostEvent::ProxyEntityDeath { .. } => Slot::ProxyEntityDeath,
            HostEvent::ProxyEntityDamage { .. } => Slot::ProxyEntityDamage,
            HostEvent::ProxyEntityAttack { .. } => Slot::ProxyEntityAttack,
            HostEvent::ProxyEntityTarget { .. } => Slot::ProxyEntityTarget,
        }
    }

    /// Handler id of the proxy object this event is about, if any.
    pub fn handler_id(&self) -> Option<HandlerId> {
        match self {
            HostEvent::BlockBreak { .. }
            | HostEvent::BlockInteract { .. }
            | HostEvent::Tick { .. }
            | HostEvent::ServerStarting
            | HostEvent::ServerStarted
            | HostEvent::ServerStopping => None,
            HostEvent::ProxyBlockBreak { target, .. }
            | HostEvent::ProxyBlockUse { target, .. }
            | HostEvent::ProxyBlockPlaced { target, .. }
            | HostEvent::ProxyBlockRemoved { target }
            | HostEvent::ProxyBlockSteppedOn { target, .. }
            | HostEvent::ProxyBlockFallenUpon { target, .. }
            | HostEvent::ProxyBlockRandomTick { target }
            | HostEvent::ProxyBlockNeighborChanged { target, .. }
            | HostEvent::ProxyBlockEntityInside { target, .. } => Some(target.handler),
            HostEvent::ProxyItemUse { target, .. }
            | HostEvent::ProxyItemUseOnBlock { target, .. }
            | HostEvent::ProxyItemUseOnEntity { target, .. }
            | HostEvent::ProxyItemAttackEntity { target, .. } => Some(target.handler),
            HostEvent::ProxyEntitySpawn { target, .. }
            | HostEvent::ProxyEntityTick { target }
            | HostEvent::ProxyEntityDeath { target, .. }
            | HostEvent::ProxyEntityDamage { target, .. }
            | HostEvent::ProxyEntityAttack { target, .. }
            | HostEvent::ProxyEntityTarget { target, .. } => Some(target.handler),
        }
    }
}

/// What a slot answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Verdict(Verdict),
    Interaction(InteractionResult),
    /// Result of an item hook. Same values as `Interaction`, different codes.
    ItemAction(InteractionResult),
    Done,
}

impl Response {
    pub fn verdict(self) -> Option<Verdict> {
        match self {
            Response::Verdict(v) => Some(v),
            _ => None,
        }
    }

    pub fn interaction(self) -> Option<InteractionResult> {
        match self {
            Response::Interaction(r) | Response::ItemAction(r) => Some(r),
            _ => None,
        }
    }

    /// The integer handed back to the host.
    pub fn code(self) -> i32 {
        match self {
            Response::Verdict(v) => v.code(),
            Response::Interaction(r) => r.code(),
            Response::ItemAction(r) => r.item_code(),
            Response::Done => 0,
        }
    }
}

type BlockBreakFn = dyn Fn(BlockPos, PlayerId) -> Verdict + Send + Sync;
type BlockInteractFn = dyn Fn(BlockPos, PlayerId, Hand) -> Verdict + Send + Sync;
type TickFn = dyn Fn(u64) + Send + Sync;
type LifecycleFn = dyn Fn() + Send + Sync;
type ProxyBreakFn = dyn Fn(ProxyTarget, PlayerId) -> Verdict + Send + Sync;
type ProxyUseFn = dyn Fn(ProxyTarget, PlayerId, Hand) -> InteractionResult + Send + Sync;
type ProxyPlacedFn = dyn Fn(ProxyTarget, PlayerId) + Send + Sync;
type ProxyFn = dyn Fn(ProxyTarget) + Send + Sync;
type ProxyEntityFn = dyn Fn(ProxyTarget, EntityId) + Send + Sync;
type ProxyFallenUponFn = dyn Fn(ProxyTarget, EntityId, f32) + Send + Sync;
type ProxyNeighborFn = dyn Fn(ProxyTarget, BlockPos) + Send + Sync;
type ItemUseFn = dyn Fn(ItemTarget, PlayerId, Hand) -> InteractionResult + Send + Sync;
type ItemUseOnBlockFn =
    dyn Fn(ItemTarget, BlockPos, PlayerId, Hand) -> InteractionResult + Send + Sync;
type ItemUseOnEntityFn =
    dyn Fn(ItemTarget, EntityId, PlayerId, Hand) -> InteractionResult + Send + Sync;
type ItemAttackFn = dyn Fn(ItemTarget, EntityId, EntityId) -> Verdict + Send + Sync;
type EntitySpawnFn = dyn Fn(EntityTarget, WorldId) + Send + Sync;
type EntityFn = dyn Fn(EntityTarget) + Send + Sync;
type EntityDeathFn = dyn Fn(EntityTarget, &str) + Send + Sync;
type EntityDamageFn = dyn Fn(EntityTarget, &str, f64) -> Verdict + Send + Sync;
type EntityOtherFn = dyn Fn(EntityTarget, EntityId) + Send + Sync;

/// A script-side handler. The variant decides which slot it occupies.
#[derive(Clone)]
pub enum Handler {
    BlockBreak(Arc<BlockBreakFn>),
    BlockInteract(Arc<BlockInteractFn>),
    Tick(Arc<TickFn>),
    ServerStarting(Arc<LifecycleFn>),
    ServerStarted(Arc<LifecycleFn>),
    ServerStopping(Arc<LifecycleFn>),
    ProxyBlockBreak(Arc<ProxyBreakFn>),
    ProxyBlockUse(Arc<ProxyUseFn>),
    ProxyBlockPlaced(Arc<ProxyPlacedFn>),
    ProxyBlockRemoved(Arc<ProxyFn>),
    ProxyBlockSteppedOn(Arc<ProxyEntityFn>),
    ProxyBlockFallenUpon(Arc<ProxyFallenUponFn>),
    ProxyBlockRandomTick(Arc<ProxyFn>),
    ProxyBlockNeighborChanged(Arc<ProxyNeighborFn>),
    ProxyBlockEntityInside(Arc<ProxyEntityFn>),
    ProxyItemUse(Arc<ItemUseFn>),
    ProxyItemUseOnBlock(Arc<ItemUseOnBlockFn>),
    ProxyItemUseOnEntity(Arc<ItemUseOnEntityFn>),
    ProxyItemAttackEntity(Arc<ItemAttackFn>),
    ProxyEntitySpawn(Arc<EntitySpawnFn>),
    ProxyEntityTick(Arc<EntityFn>),
    ProxyEntityDeath(Arc<EntityDeathFn>),
    ProxyEntityDamage(Arc<EntityDamageFn>),
    ProxyEntityAttack(Arc<EntityOtherFn>),
    ProxyEntityTarget(Arc<EntityOtherFn>),
}

impl Handler {
    pub fn block_break(f: impl Fn(BlockPos, PlayerId) -> Verdict + Send + Sync + 'static) -> Self {
        Handler::BlockBreak(Arc::new(f))
    }

    pub fn block_interact(
        f: impl Fn(BlockPos, PlayerId, Hand) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        Handler::BlockInteract(Arc::new(f))
    }

    pub fn tick(f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Handler::Tick(Arc::new(f))
    }

    pub fn server_starting(f: impl Fn() + Send + Sync + 'static) -> Self {
        Handler::ServerStarting(Arc::new(f))
    }

    /// Runs once the host registry has sealed.
    pub fn server_started(f: impl Fn() + Send + Sync + 'static) -> Self {
        Handler::ServerStarted(Arc::new(f))
    }

    pub fn server_stopping(f: impl Fn() + Send + Sync + 'static) -> Self {
        Handler::ServerStopping(Arc::new(f))
    }

    pub fn proxy_block_break(
        f: impl Fn(ProxyTarget, PlayerId) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockBreak(Arc::new(f))
    }

    pub fn proxy_block_use(
        f: impl Fn(ProxyTarget, PlayerId, Hand) -> InteractionResult + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockUse(Arc::new(f))
    }

    pub fn proxy_block_placed(f: impl Fn(ProxyTarget, PlayerId) + Send + Sync + 'static) -> Self {
        Handler::ProxyBlockPlaced(Arc::new(f))
    }

    pub fn proxy_block_removed(f: impl Fn(ProxyTarget) + Send + Sync + 'static) -> Self {
        Handler::ProxyBlockRemoved(Arc::new(f))
    }

    pub fn proxy_block_stepped_on(
        f: impl Fn(ProxyTarget, EntityId) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockSteppedOn(Arc::new(f))
    }

    pub fn proxy_block_fallen_upon(
        f: impl Fn(ProxyTarget, EntityId, f32) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockFallenUpon(Arc::new(f))
    }

    pub fn proxy_block_random_tick(f: impl Fn(ProxyTarget) + Send + Sync + 'static) -> Self {
        Handler::ProxyBlockRandomTick(Arc::new(f))
    }

    pub fn proxy_block_neighbor_changed(
        f: impl Fn(ProxyTarget, BlockPos) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockNeighborChanged(Arc::new(f))
    }

    pub fn proxy_block_entity_inside(
        f: impl Fn(ProxyTarget, EntityId) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyBlockEntityInside(Arc::new(f))
    }

    pub fn proxy_item_use(
        f: impl Fn(ItemTarget, PlayerId, Hand) -> InteractionResult + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyItemUse(Arc::new(f))
    }

    pub fn proxy_item_use_on_block(
        f: impl Fn(ItemTarget, BlockPos, PlayerId, Hand) -> InteractionResult + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyItemUseOnBlock(Arc::new(f))
    }

    pub fn proxy_item_use_on_entity(
        f: impl Fn(ItemTarget, EntityId, PlayerId, Hand) -> InteractionResult + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyItemUseOnEntity(Arc::new(f))
    }

    /// Called after the item was used to hit `victim`. Cancelling is advisory.
    pub fn proxy_item_attack_entity(
        f: impl Fn(ItemTarget, EntityId, EntityId) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyItemAttackEntity(Arc::new(f))
    }

    pub fn proxy_entity_spawn(f: impl Fn(EntityTarget, WorldId) + Send + Sync + 'static) -> Self {
        Handler::ProxyEntitySpawn(Arc::new(f))
    }

    pub fn proxy_entity_tick(f: impl Fn(EntityTarget) + Send + Sync + 'static) -> Self {
        Handler::ProxyEntityTick(Arc::new(f))
    }

    pub fn proxy_entity_death(f: impl Fn(EntityTarget, &str) + Send + Sync + 'static) -> Self {
        Handler::ProxyEntityDeath(Arc::new(f))
    }

    /// Return `Verdict::Cancel` to prevent the damage.
    pub fn proxy_entity_damage(
        f: impl Fn(EntityTarget, &str, f64) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyEntityDamage(Arc::new(f))
    }

    pub fn proxy_entity_attack(
        f: impl Fn(EntityTarget, EntityId) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyEntityAttack(Arc::new(f))
    }

    pub fn proxy_entity_target(
        f: impl Fn(EntityTarget, EntityId) + Send + Sync + 'static,
    ) -> Self {
        Handler::ProxyEntityTarget(Arc::new(f))
    }

    pub fn slot(&self) -> Slot {
        match self {
            Handler::BlockBreak(_) => Slot::BlockBreak,
            Handler::BlockInteract(_) => Slot::BlockInteract,
            Handler::Tick(_) => Slot::Tick,
            Handler::ServerStarting(_) => Slot::ServerStarting,
            Handler::ServerStarted(_) => Slot::ServerStarted,
            Handler::ServerStopping(_) => Slot::ServerStopping,
            Handler::ProxyBlockBreak(_) => Slot::ProxyBlockBreak,
            Handler::ProxyBlockUse(_) => Slot::ProxyBlockUse,
            Handler::ProxyBlockPlaced(_) => Slot::ProxyBlockPlaced,
            Handler::ProxyBlockRemoved(_) => Slot::ProxyBlockRemoved,
            Handler::ProxyBlockSteppedOn(_) => Slot::ProxyBlockSteppedOn,
            Handler::ProxyBlockFallenUpon(_) => Slot::ProxyBlockFallenUpon,
            Handler::ProxyBlockRandomTick(_) => Slot::ProxyBlockRandomTick,
            Handler::ProxyBlockNeighborChanged(_) => Slot::ProxyBlockNeighborChanged,
            Handler::ProxyBlockEntityInside(_) => Slot::ProxyBlockEntityInside,
            Handler::ProxyItemUse(_) => Slot::ProxyItemUse,
            Handler::ProxyItemUseOnBlock(_) => Slot::ProxyItemUseOnBlock,
            Handler::ProxyItemUseOnEntity(_) => Slot::ProxyItemUseOnEntity,
            Handler::ProxyItemAttackEntity(_) => Slot::ProxyItemAttackEntity,
            Handler::ProxyEntitySpawn(_) => Slot::ProxyEntitySpawn,
            Handler::ProxyEntityTick(_) => Slot::ProxyEntityTick,
            Handler::ProxyEntityDeath(_) => Slot::ProxyEntityDeath,
            Handler::ProxyEntityDamage(_) => Slot::ProxyEntityDamage,
            Handler::ProxyEntityAttack(_) => Slot::ProxyEntityAttack,
            Handler::ProxyEntityTarget(_) => Slot::ProxyEntityTarget,
        }
    }

    /// Run the handler against an event of the same slot.
    fn invoke(&self, event: &HostEvent) -> Option<Response> {
        use HostEvent as E;

        let response = match (self, event) {
            (Handler::BlockBreak(f), E::BlockBreak { pos, player }) => {
                Response::Verdict(f(*pos, *player))
            }
            (Handler::BlockInteract(f), E::BlockInteract { pos, player, hand }) => {
                Response::Verdict(f(*pos, *player, *hand))
            }
            (Handler::Tick(f), E::Tick { tick }) => {
                f(*tick);
                Response::Done
            }
            (Handler::ServerStarting(f), E::ServerStarting)
            | (Handler::ServerStarted(f), E::ServerStarted)
            | (Handler::ServerStopping(f), E::ServerStopping) => {
                f();
                Response::Done
            }
            (Handler::ProxyBlockBreak(f), E::ProxyBlockBreak { target, player }) => {
                Response::Verdict(f(*target, *player))
            }
            (Handler::ProxyBlockUse(f), E::ProxyBlockUse { target, player, hand }) => {
                Response::Interaction(f(*target, *player, *hand))
            }
            (Handler::ProxyBlockPlaced(f), E::ProxyBlockPlaced { target, player }) => {
                f(*target, *player);
                Response::Done
            }
            (Handler::ProxyBlockRemoved(f), E::ProxyBlockRemoved { target })
            | (Handler::ProxyBlockRandomTick(f), E::ProxyBlockRandomTick { target }) => {
                f(*target);
                Response::Done
            }
            (Handler::ProxyBlockSteppedOn(f), E::ProxyBlockSteppedOn { target, entity })
            | (Handler::ProxyBlockEntityInside(f), E::ProxyBlockEntityInside { target, entity }) => {
                f(*target, *entity);
                Response::Done
            }
            (
                Handler::ProxyBlockFallenUpon(f),
                E::ProxyBlockFallenUpon {
                    target,
                    entity,
                    fall_distance,
                },
            ) => {
                f(*target, *entity, *fall_distance);
                Response::Done
            }
            (
                Handler::ProxyBlockNeighborChanged(f),
                E::ProxyBlockNeighborChanged { target, neighbor },
            ) => {
                f(*target, *neighbor);
                Response::Done
            }
            (Handler::ProxyItemUse(f), E::ProxyItemUse { target, player, hand }) => {
                Response::ItemAction(f(*target, *player, *hand))
            }
            (
                Handler::ProxyItemUseOnBlock(f),
                E::ProxyItemUseOnBlock {
                    target,
                    pos,
                    player,
                    hand,
                },
            ) => Response::ItemAction(f(*target, *pos, *player, *hand)),
            (
                Handler::ProxyItemUseOnEntity(f),
                E::ProxyItemUseOnEntity {
                    target,
                    entity,
                    player,
                    hand,
                },
            ) => Response::ItemAction(f(*target, *entity, *player, *hand)),
            (
                Handler::ProxyItemAttackEntity(f),
                E::ProxyItemAttackEntity {
                    target,
                    attacker,
                    victim,
                },
            ) => Response::Verdict(f(*target, *attacker, *victim)),
            (Handler::ProxyEntitySpawn(f), E::ProxyEntitySpawn { target, world }) => {
                f(*target, *world);
                Response::Done
            }
            (Handler::ProxyEntityTick(f), E::ProxyEntityTick { target }) => {
                f(*target);
                Response::Done
            }
            (Handler::ProxyEntityDeath(f), E::ProxyEntityDeath { target, source }) => {
                f(*target, source.as_str());
                Response::Done
            }
            (
                Handler::ProxyEntityDamage(f),
                E::ProxyEntityDamage {
                    target,
                    source,
                    amount,
                },
            ) => Response::Verdict(f(*target, source.as_str(), *amount)),
            (Handler::ProxyEntityAttack(f), E::ProxyEntityAttack { target, victim })
            | (Handler::ProxyEntityTarget(f), E::ProxyEntityTarget { target, victim }) => {
                f(*target, *victim);
                Response::Done
            }
            _ => return None,
        };
        Some(response)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.slot()).finish()
    }
}

/// Thread-safe table of slot handlers.
///
/// The lock guards only the slot array. Handlers are cloned out and the lock
/// is released before they run, so a handler may dispatch or re-register
/// without deadlocking.
pub struct CallbackDispatchTable {
    slots: Mutex<[Option<Handler>; Slot::COUNT]>,
}

impl CallbackDispatchTable {
    /// Create a table with every slot empty.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    fn slots(&self) -> MutexGuard<'_, [Option<Handler>; Slot::COUNT]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a handler in its slot, replacing any previous one.
    ///
    /// Returns `true` if a handler was replaced.
    pub fn register(&self, handler: Handler) -> bool {
        let slot = handler.slot();
        let previous = self.slots()[slot.index()].replace(handler);
        debug!(slot = %slot, replaced = previous.is_some(), "Registered handler");
        previous.is_some()
    }

    /// Remove the handler for one slot. Returns `true` if one was present.
    pub fn unregister(&self, slot: Slot) -> bool {
        self.slots()[slot.index()].take().is_some()
    }

    /// Invoke the handler for the event's slot, or answer the slot default.
    pub fn dispatch(&self, event: HostEvent) -> Response {
        let slot = event.slot();
        let handler = self.slots()[slot.index()].clone();

        let Some(handler) = handler else {
            return slot.default_response();
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(&event))) {
            Ok(Some(response)) => response,
            Ok(None) => {
                warn!(slot = %slot, "Handler does not match event shape, using default");
                slot.default_response()
            }
            Err(_) => {
                error!(slot = %slot, "Handler panicked, using default response");
                slot.default_response()
            }
        }
    }

    /// Whether a handler is installed for the slot.
    pub fn is_registered(&self, slot: Slot) -> bool {
        self.slots()[slot.index()].is_some()
    }

    /// Slots that currently have a handler.
    pub fn registered_slots(&self) -> Vec<Slot> {
        let slots = self.slots();
        Slot::ALL
            .into_iter()
            .filter(|slot| slots[slot.index()].is_some())
            .collect()
    }

    /// Reset every slot to "no handler".
    pub fn clear(&self) {
        let mut slots = self.slots();
        for slot in slots.iter_mut() {
            *slot = None;
        }
        debug!("Cleared all handlers");
    }
}

impl Default for CallbackDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}
