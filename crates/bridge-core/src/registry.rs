//! Handler registry for script-defined objects.
//!
//! The registry hands out opaque [`HandlerId`]s, keeps the proxy object state
//! the host may ask about, and pushes finalized objects into the host's own
//! object registry through the [`HostRegistry`] trait. Host registrations are
//! one-shot: once the host seals its registry, no further objects get in.

use crate::error::{BridgeError, BridgeResult};
use crate::types::{HandlerId, ResourceKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// Object settings
// ============================================================================

/// Physical properties of a script-defined block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSettings {
    pub hardness: f32,
    pub resistance: f32,
    pub requires_tool: bool,
    /// Emitted light level, 0..=15.
    pub luminance: u8,
    pub slipperiness: f32,
    pub velocity_multiplier: f32,
    pub jump_velocity_multiplier: f32,
    pub ticks_randomly: bool,
    pub collidable: bool,
    pub replaceable: bool,
    pub burnable: bool,
}

impl BlockSettings {
    pub fn new(hardness: f32, resistance: f32, requires_tool: bool) -> Self {
        Self {
            hardness,
            resistance,
            requires_tool,
            ..Self::default()
        }
    }

    fn normalized(mut self) -> Self {
        self.luminance = self.luminance.min(15);
        self
    }
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            hardness: 1.0,
            resistance: 1.0,
            requires_tool: false,
            luminance: 0,
            slipperiness: 0.6,
            velocity_multiplier: 1.0,
            jump_velocity_multiplier: 1.0,
            ticks_randomly: false,
            collidable: true,
            replaceable: false,
            burnable: false,
        }
    }
}

/// Properties of a script-defined item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSettings {
    /// 1..=99.
    pub max_stack_size: u8,
    /// 0 means the item cannot be damaged.
    pub max_damage: u32,
    pub fire_resistant: bool,
    pub attack_damage: Option<f64>,
    pub attack_speed: Option<f64>,
    pub attack_knockback: Option<f64>,
}

impl ItemSettings {
    pub fn is_damageable(&self) -> bool {
        self.max_damage > 0
    }

    fn normalized(mut self) -> Self {
        self.max_stack_size = self.max_stack_size.clamp(1, 99);
        // Damageable items never stack in the host.
        if self.is_damageable() {
            self.max_stack_size = 1;
        }
        self
    }
}

impl Default for ItemSettings {
    fn default() -> Self {
        Self {
            max_stack_size: 64,
            max_damage: 0,
            fire_resistant: false,
            attack_damage: None,
            attack_speed: None,
            attack_knockback: None,
        }
    }
}

/// Spawn category of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnGroup {
    Monster,
    #[default]
    Creature,
    Ambient,
    WaterCreature,
    Misc,
}

/// Host base class an entity proxy extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseType {
    #[default]
    PathfinderMob,
    Monster,
    Animal,
    Projectile,
}

impl BaseType {
    /// Host code for the base type. Unknown codes map to `PathfinderMob`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => BaseType::Monster,
            2 => BaseType::Animal,
            3 => BaseType::Projectile,
            _ => BaseType::PathfinderMob,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            BaseType::PathfinderMob => 0,
            BaseType::Monster => 1,
            BaseType::Animal => 2,
            BaseType::Projectile => 3,
        }
    }
}

/// Properties of a script-defined entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySettings {
    pub width: f32,
    pub height: f32,
    pub max_health: f64,
    pub movement_speed: f64,
    pub attack_damage: f64,
    pub spawn_group: SpawnGroup,
    pub base_type: BaseType,
    /// Item that makes an animal breed, e.g. `minecraft:wheat`.
    pub breeding_item: Option<ResourceKey>,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            width: 0.6,
            height: 1.8,
            max_health: 20.0,
            movement_speed: 0.25,
            attack_damage: 2.0,
            spawn_group: SpawnGroup::default(),
            base_type: BaseType::default(),
            breeding_item: None,
        }
    }
}

/// Configuration a proxy object is created with.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyConfig {
    Block(BlockSettings),
    Item(ItemSettings),
    Entity(EntitySettings),
}

impl ProxyConfig {
    pub fn kind(&self) -> ProxyKind {
        match self {
            ProxyConfig::Block(_) => ProxyKind::Block,
            ProxyConfig::Item(_) => ProxyKind::Item,
            ProxyConfig::Entity(_) => ProxyKind::Entity,
        }
    }

    fn normalized(self) -> Self {
        match self {
            ProxyConfig::Block(settings) => ProxyConfig::Block(settings.normalized()),
            ProxyConfig::Item(settings) => ProxyConfig::Item(settings.normalized()),
            entity @ ProxyConfig::Entity(_) => entity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Block,
    Item,
    Entity,
}

impl std::fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProxyKind::Block => "block",
            ProxyKind::Item => "item",
            ProxyKind::Entity => "entity",
        };
        f.write_str(name)
    }
}

/// Host-observable stand-in for a script-defined object.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyObject {
    id: HandlerId,
    config: ProxyConfig,
    /// Every key the host routes to this object, oldest first.
    keys: Vec<ResourceKey>,
}

impl ProxyObject {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn kind(&self) -> ProxyKind {
        self.config.kind()
    }

    /// Key the object was last finalized under.
    pub fn key(&self) -> Option<&ResourceKey> {
        self.keys.last()
    }

    /// All keys the object was finalized under. The current key is last.
    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }

    pub fn is_finalized(&self) -> bool {
        !self.keys.is_empty()
    }

    fn record_key(&mut self, key: ResourceKey) {
        self.keys.retain(|existing| *existing != key);
        self.keys.push(key);
    }
}

// ============================================================================
// Host registry capability
// ============================================================================

/// Why the host refused a registration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostRegistryError {
    #[error("registry is sealed")]
    Sealed,

    #[error("key {0} is already registered")]
    Duplicate(ResourceKey),

    #[error("{0}")]
    Rejected(String),
}

/// The host's immutable object registry.
pub trait HostRegistry: Send + Sync {
    /// Register a finalized object under `key`.
    fn register(&self, key: &ResourceKey, object: &ProxyObject) -> Result<(), HostRegistryError>;

    /// Whether the registry still accepts registrations.
    fn is_sealed(&self) -> bool;
}

/// An entry in a [`MemoryHostRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEntry {
    pub id: HandlerId,
    pub kind: ProxyKind,
}

/// In-process host registry that seals once.
#[derive(Debug, Default)]
pub struct MemoryHostRegistry {
    entries: Mutex<BTreeMap<ResourceKey, HostEntry>>,
    sealed: AtomicBool,
}

impl MemoryHostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the registry. Returns `false` if it was already sealed.
    pub fn seal(&self) -> bool {
        let first = !self.sealed.swap(true, Ordering::SeqCst);
        if first {
            info!(entries = self.len(), "Host registry sealed");
        }
        first
    }

    /// All registered keys with their entries, ordered by key.
    pub fn entries(&self) -> Vec<(ResourceKey, HostEntry)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<HostEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HostRegistry for MemoryHostRegistry {
    fn register(&self, key: &ResourceKey, object: &ProxyObject) -> Result<(), HostRegistryError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        // Checked under the entry lock so a concurrent seal cannot interleave.
        if self.sealed.load(Ordering::SeqCst) {
            return Err(HostRegistryError::Sealed);
        }

        let entry = HostEntry {
            id: object.id(),
            kind: object.kind(),
        };
        match entries.get(key) {
            Some(existing) if existing.id != entry.id => {
                Err(HostRegistryError::Duplicate(key.clone()))
            }
            _ => {
                entries.insert(key.clone(), entry);
                Ok(())
            }
        }
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Handler registry
// ============================================================================

/// Allocates handler ids and tracks proxy objects.
///
/// Blocks, items and entities share one id sequence, so an id names exactly
/// one object for the life of the registry.
pub struct HandlerRegistry {
    host: Arc<dyn HostRegistry>,
    objects: RwLock<HashMap<HandlerId, ProxyObject>>,
    next_seq: AtomicU64,
}

impl HandlerRegistry {
    /// Create an empty registry that finalizes into `host`.
    pub fn new(host: Arc<dyn HostRegistry>) -> Self {
        Self {
            host,
            objects: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Allocate an id and record a proxy object for `config`.
    pub fn create(&self, config: ProxyConfig) -> HandlerId {
        let id = HandlerId::from_sequence(self.next_seq.fetch_add(1, Ordering::SeqCst));
        let object = ProxyObject {
            id,
            config: config.normalized(),
            keys: Vec::new(),
        };
        debug!(id = %id, kind = %object.kind(), "Created proxy object");

        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, object);
        id
    }

    pub fn create_block(&self, hardness: f32, resistance: f32, requires_tool: bool) -> HandlerId {
        self.create(ProxyConfig::Block(BlockSettings::new(
            hardness,
            resistance,
            requires_tool,
        )))
    }

    pub fn create_item(&self, settings: ItemSettings) -> HandlerId {
        self.create(ProxyConfig::Item(settings))
    }

    pub fn create_entity(&self, settings: EntitySettings) -> HandlerId {
        self.create(ProxyConfig::Entity(settings))
    }

    /// Register the proxy object with the host under `namespace:path`.
    ///
    /// May be called again before the host seals. The new key becomes the
    /// object's current key, while earlier keys stay registered with the host
    /// and keep resolving through [`find_by_key`](Self::find_by_key).
    pub fn finalize(&self, id: HandlerId, namespace: &str, path: &str) -> BridgeResult<()> {
        let Some(object) = self.lookup(id) else {
            warn!(id = %id, "Cannot finalize unknown handler");
            return Err(BridgeError::UnknownHandler(id));
        };

        let key = ResourceKey::new(namespace, path).map_err(|e| {
            warn!(id = %id, "Cannot finalize: {}", e);
            e
        })?;

        if self.host.is_sealed() {
            warn!(id = %id, key = %key, "Cannot finalize after host registry sealed");
            return Err(BridgeError::RegistrySealed(key));
        }

        match self.host.register(&key, &object) {
            Ok(()) => {
                if let Some(object) = self
                    .objects
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_mut(&id)
                {
                    object.record_key(key.clone());
                }
                info!(id = %id, key = %key, kind = %object.kind(), "Finalized proxy object");
                Ok(())
            }
            Err(HostRegistryError::Sealed) => {
                warn!(id = %id, key = %key, "Host registry sealed during finalize");
                Err(BridgeError::RegistrySealed(key))
            }
            Err(e) => {
                warn!(id = %id, key = %key, "Host rejected registration: {}", e);
                Err(BridgeError::HostRejected {
                    key,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Snapshot of the proxy object behind `id`.
    pub fn lookup(&self, id: HandlerId) -> Option<ProxyObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Drop local bookkeeping for `id`. The host registration stays.
    pub fn remove(&self, id: HandlerId) -> bool {
        let removed = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(id = %id, "Removed proxy object");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Ids of all tracked objects, ascending.
    pub fn all_ids(&self) -> Vec<HandlerId> {
        let mut ids: Vec<HandlerId> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Kind of the object behind `id`, if it is tracked.
    pub fn kind_of(&self, id: HandlerId) -> Option<ProxyKind> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(ProxyObject::kind)
    }

    /// The object the host routes `key` to.
    ///
    /// Matches current and earlier keys alike, so code reloaded after a
    /// re-finalize still rebinds by whichever key it names.
    pub fn find_by_key(&self, key: &ResourceKey) -> Option<ProxyObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|object| object.keys.contains(key))
            .cloned()
    }
}
