//! Identifiers and stimulus parameters shared by the audition map and the ray
//! cast manager.

use crate::math::Vec3;
use std::fmt;

/// Opaque handle into the host's entity registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

/// Faction a stimulus originates from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FactionId(pub u8);

impl FactionId {
    /// Unset faction. Stimuli carrying it are never heard.
    pub const INVALID: Self = Self(u8::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for FactionId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Set of factions a listener pays attention to, one bit per faction.
///
/// Factions outside the 32 representable bits can never be contained.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FactionMask(pub u32);

impl FactionMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    /// Create a mask containing every listed faction.
    pub fn from_factions(factions: &[FactionId]) -> Self {
        factions
            .iter()
            .fold(Self::NONE, |mask, &faction| mask.with(faction))
    }

    /// Return a copy of this mask that also contains `faction`.
    pub fn with(self, faction: FactionId) -> Self {
        match Self::bit(faction) {
            Some(bit) => Self(self.0 | bit),
            None => self,
        }
    }

    /// Check whether `faction` is in the mask. Invalid factions never are.
    pub fn contains(self, faction: FactionId) -> bool {
        Self::bit(faction).is_some_and(|bit| self.0 & bit != 0)
    }

    fn bit(faction: FactionId) -> Option<u32> {
        if faction.is_valid() {
            1u32.checked_shl(u32::from(faction.0))
        } else {
            None
        }
    }
}

/// Handle of a registered global listener.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalListenerId(u32);

impl GlobalListenerId {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Get the underlying integer value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GlobalListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalListenerId({})", self.0)
    }
}

/// Monotonic generator for [`GlobalListenerId`]s.
///
/// Wraps around after 2^32 issuances and never hands out
/// [`GlobalListenerId::INVALID`].
#[derive(Debug, Default)]
pub struct GlobalListenerIdGenerator {
    last: u32,
}

impl GlobalListenerIdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next_id(&mut self) -> GlobalListenerId {
        self.last = self.last.wrapping_add(1);
        if self.last == GlobalListenerId::INVALID.0 {
            self.last = self.last.wrapping_add(1);
        }
        GlobalListenerId(self.last)
    }
}

/// How obstruction between a stimulus and listener ears is handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ObstructionHandling {
    /// Deliver synchronously to every listener with an ear in range.
    #[default]
    IgnoreAllObstructions,
    /// Cast one ray per ear in range and deliver once the ray resolves,
    /// attenuating linearly with distance and with the surfaces hit.
    RayCastWithLinearFallOff,
}

/// A single sound event.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundStimulusParams {
    pub position: Vec3,
    pub radius: f32,
    pub faction: FactionId,
    pub obstruction_handling: ObstructionHandling,
    /// Entity that caused the sound, if any.
    pub source_entity_id: EntityId,
}

impl SoundStimulusParams {
    /// Create a stimulus that ignores obstructions and has no source entity.
    pub fn new(position: Vec3, radius: f32, faction: FactionId) -> Self {
        Self {
            position,
            radius,
            faction,
            obstruction_handling: ObstructionHandling::IgnoreAllObstructions,
            source_entity_id: EntityId::INVALID,
        }
    }

    /// Set how obstruction is handled.
    pub fn obstruction_handling(mut self, handling: ObstructionHandling) -> Self {
        self.obstruction_handling = handling;
        self
    }

    /// Set the entity that caused the sound.
    pub fn source_entity(mut self, entity_id: EntityId) -> Self {
        self.source_entity_id = entity_id;
        self
    }
}

impl Default for SoundStimulusParams {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0, FactionId::INVALID)
    }
}
