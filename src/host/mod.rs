//! Host engine interfaces
//!
//! The controller never owns entities. Everything it reads or writes goes
//! through these narrow traits, implemented by the host adapter (or by
//! [`memory::MemoryHost`] in the demo and tests).

pub mod events;
pub mod memory;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::WeatherKind;
use crate::util::vec3::Vec3;

/// Stable integer handle of an actor (player or NPC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Live reference to a world record (location, keyword, weather, armor)
///
/// Only valid within one load; never persisted.
pub type FormHandle = u32;

/// Externally owned scalar attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeChannel {
    /// Movement speed (reference 100)
    SpeedMult,
    /// Attack cadence multiplier (reference 1.0)
    AttackSpeed,
    /// Unrelated channel nudged to force dependent-system recomputation
    CarryWeight,
    Health,
    Stamina,
    Magicka,
}

impl AttributeChannel {
    pub const COUNT: usize = 6;

    pub const ALL: [AttributeChannel; Self::COUNT] = [
        AttributeChannel::SpeedMult,
        AttributeChannel::AttackSpeed,
        AttributeChannel::CarryWeight,
        AttributeChannel::Health,
        AttributeChannel::Stamina,
        AttributeChannel::Magicka,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            AttributeChannel::SpeedMult => 0,
            AttributeChannel::AttackSpeed => 1,
            AttributeChannel::CarryWeight => 2,
            AttributeChannel::Health => 3,
            AttributeChannel::Stamina => 4,
            AttributeChannel::Magicka => 5,
        }
    }
}

/// Authoritative weapon drawn/sheathed status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeaponState {
    Sheathed,
    WantToDraw,
    Drawing,
    Drawn,
    WantToSheathe,
    Sheathing,
    /// Status field ambiguous, fall back to equipment inspection
    #[default]
    Unknown,
}

/// Behavioral flags for one actor this frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorState {
    pub in_combat: bool,
    pub sneaking: bool,
    pub weapon_state: WeaponState,
    /// A weapon, light or scroll sits in either hand
    pub holds_drawable: bool,
    /// Werewolf / vampire-lord style transformation
    pub transformed: bool,
}

/// A worn armor item; multi-slot items appear once per slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WornArmor {
    pub slot: u32,
    pub form: FormHandle,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationSample {
    pub form: FormHandle,
    pub keywords: SmallVec<[FormHandle; 8]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSample {
    pub form: FormHandle,
    pub kind: WeatherKind,
}

/// World-side view of one actor
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSample {
    pub position: Vec3,
    pub location: Option<LocationSample>,
    /// Location of the parent cell, when it differs from `location`
    pub parent_location: Option<LocationSample>,
    pub interior: bool,
    pub weather: Option<WeatherSample>,
    pub worn_armor: SmallVec<[WornArmor; 8]>,
    /// Combined weight of equipped weapons
    pub equipped_weight: f32,
    pub scale: f32,
}

impl Default for WorldSample {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            location: None,
            parent_location: None,
            interior: false,
            weather: None,
            worn_armor: SmallVec::new(),
            equipped_weight: 0.0,
            scale: 1.0,
        }
    }
}

/// Host-side failures; all of them are transient from the controller's view
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("Entity {0} has no valid attribute owner")]
    Unavailable(EntityId),
    #[error("Attribute {1:?} of entity {0} is read-only")]
    ReadOnly(EntityId, AttributeChannel),
}

/// Read/modify primitive for externally owned attributes
pub trait AttributeAccess {
    fn read_attribute(&self, entity: EntityId, channel: AttributeChannel) -> Result<f32, HostError>;

    /// Maximum (permanent) value, used for vitals percentages
    fn read_maximum(&self, entity: EntityId, channel: AttributeChannel) -> Result<f32, HostError>;

    fn modify_attribute(
        &mut self,
        entity: EntityId,
        channel: AttributeChannel,
        delta: f32,
    ) -> Result<(), HostError>;
}

/// Behavior and animation-graph access
pub trait BehaviorQuery {
    fn behavior(&self, entity: EntityId) -> Result<BehaviorState, HostError>;

    fn graph_bool(&self, entity: EntityId, name: &str) -> Option<bool>;

    fn graph_float(&self, entity: EntityId, name: &str) -> Option<f32>;

    /// Returns false if the graph has no such variable
    fn set_graph_float(&mut self, entity: EntityId, name: &str, value: f32) -> bool;

    /// Normalized move input of the player from direct button/analog state
    fn player_move_axes(&self) -> (f32, f32);
}

pub trait WorldQuery {
    fn world(&self, entity: EntityId) -> Result<WorldSample, HostError>;
}

/// Turns persisted `plugin|0xID` references into live handles
pub trait FormResolver {
    fn resolve(&self, plugin: &str, local_id: u32) -> Option<FormHandle>;
}

/// Which actors the population scanner iterates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorScope {
    /// Actors in the host's bounded high-detail set
    Nearby,
    /// Every loaded actor
    All,
}

pub trait ActorDirectory {
    fn player(&self) -> EntityId;

    /// Append the actors in `scope` to `out` (the player may be included)
    fn actors(&self, scope: ActorScope, out: &mut Vec<EntityId>);
}

/// Everything the controller needs from the host
pub trait Host: AttributeAccess + BehaviorQuery + WorldQuery + FormResolver + ActorDirectory {}

impl<T> Host for T where T: AttributeAccess + BehaviorQuery + WorldQuery + FormResolver + ActorDirectory {}
