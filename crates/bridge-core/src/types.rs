//! Shared value types passed across the bridge.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// Opaque identifier of a script-defined object, as seen by the host.
///
/// Never zero: the host uses 0 to mean "no handler".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(NonZeroU64);

impl HandlerId {
    /// Wrap a raw id coming from the host. Returns `None` for 0.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Id for the `seq`-th allocation, counting from zero.
    pub(crate) fn from_sequence(seq: u64) -> Self {
        Self(NonZeroU64::MIN.saturating_add(seq))
    }

    /// The raw value handed to the host.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Host-side player identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub i64);

/// Host-side world (dimension) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(pub i64);

/// Host-side entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub i32);

/// Which hand an interaction was performed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Main,
    Off,
}

impl Hand {
    /// Decode the host's hand code. Anything other than 1 is the main hand.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Hand::Off,
            _ => Hand::Main,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Hand::Main => 0,
            Hand::Off => 1,
        }
    }
}

/// Allow/cancel answer for break and interact hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Allow,
    Cancel,
}

impl Verdict {
    /// Host wire code: 1 allows, 0 cancels.
    pub fn code(self) -> i32 {
        match self {
            Verdict::Allow => 1,
            Verdict::Cancel => 0,
        }
    }

    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Verdict::Cancel
        } else {
            Verdict::Allow
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Verdict::Allow
    }
}

/// Result of using a proxy block, mirrored from the host's interaction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionResult {
    Success,
    Consume,
    ConsumePartial,
    Pass,
    Fail,
}

impl InteractionResult {
    pub fn code(self) -> i32 {
        match self {
            InteractionResult::Success => 0,
            InteractionResult::Consume => 1,
            InteractionResult::ConsumePartial => 2,
            InteractionResult::Pass => 3,
            InteractionResult::Fail => 4,
        }
    }

    /// Decode a host code. Unknown codes fall back to `Pass`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => InteractionResult::Success,
            1 => InteractionResult::Consume,
            2 => InteractionResult::ConsumePartial,
            4 => InteractionResult::Fail,
            _ => InteractionResult::Pass,
        }
    }
    /// Code used by item hooks, which order the results differently.
    pub fn item_code(self) -> i32 {
        match self {
            InteractionResult::Success => 0,
            InteractionResult::ConsumePartial => 1,
            InteractionResult::Consume => 2,
            InteractionResult::Fail => 3,
            InteractionResult::Pass => 4,
        }
    }

    /// Decode an item hook code. Unknown codes fall back to `Pass`.
    pub fn from_item_code(code: i32) -> Self {
        match code {
            0 => InteractionResult::Success,
            1 => InteractionResult::ConsumePartial,
            2 => InteractionResult::Consume,
            3 => InteractionResult::Fail,
            _ => InteractionResult::Pass,
        }
    }
}

/// A `namespace:path` key in the host's object registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    namespace: String,
    path: String,
}

impl ResourceKey {
    /// Build a key, validating both halves against the host's identifier rules.
    pub fn new(namespace: &str, path: &str) -> BridgeResult<Self> {
        let valid_namespace = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-'));
        let valid_path = !path.is_empty()
            && path
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-' | '/'));

        if !valid_namespace || !valid_path {
            return Err(BridgeError::InvalidResourceKey(format!("{namespace}:{path}")));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for ResourceKey {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        match s.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Err(BridgeError::InvalidResourceKey(s.to_string())),
        }
    }
}
