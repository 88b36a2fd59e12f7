//! Listeners: entities that can hear stimuli through one or more ears.

use crate::math::{BoundingSphere, Vec3};
use crate::types::{EntityId, FactionMask, SoundStimulusParams};
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

/// Upper bound on the number of ears a listener may have.
pub const MAX_EARS_PER_LISTENER: usize = 4;

/// Information handed to a listener when it hears a stimulus.
#[derive(Debug, Clone, Copy)]
pub struct HeardSound<'a> {
    pub listener_entity_id: EntityId,
    /// Ear through which the stimulus was heard.
    pub ear_index: usize,
    pub stimulus: &'a SoundStimulusParams,
}

/// Called when a stimulus reaches one of the listener's ears.
pub type SoundHeardCallback = dyn Fn(&HeardSound<'_>) + Send + Sync;

/// Extra veto a listener can apply after the faction and range checks passed.
/// Returning `false` makes the listener ignore the stimulus.
pub type UserConditionCallback = dyn Fn(EntityId, &SoundStimulusParams) -> bool + Send + Sync;

bitflags! {
    /// Which fields of [`ListenerParams`] a `listener_changed` call updates.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ListenerChangeFlags: u32 {
        const LISTENING_DISTANCE_SCALE = 0x01;
        const FACTION_MASK             = 0x02;
        const USER_CONDITION           = 0x04;
        const SOUND_HEARD_CALLBACK     = 0x08;
        const EARS                     = 0x10;
    }
}

/// Registration parameters of a listener.
#[derive(Clone)]
pub struct ListenerParams {
    /// World-space ear positions.
    pub ears: Vec<Vec3>,
    /// Multiplier applied to a stimulus radius when testing this listener.
    pub listening_distance_scale: f32,
    pub faction_mask: FactionMask,
    pub user_condition: Option<Arc<UserConditionCallback>>,
    pub on_sound_heard: Arc<SoundHeardCallback>,
}

impl ListenerParams {
    /// Creates parameters with no ears, a distance scale of 1 and an empty
    /// faction mask.
    pub fn new<F>(on_sound_heard: F) -> Self
    where
        F: Fn(&HeardSound<'_>) + Send + Sync + 'static,
    {
        Self {
            ears: Vec::new(),
            listening_distance_scale: 1.0,
            faction_mask: FactionMask::NONE,
            user_condition: None,
            on_sound_heard: Arc::new(on_sound_heard),
        }
    }

    /// Add an ear at a world-space position.
    pub fn ear(mut self, position: Vec3) -> Self {
        self.ears.push(position);
        self
    }

    /// Replace all ears.
    pub fn ears(mut self, positions: impl IntoIterator<Item = Vec3>) -> Self {
        self.ears = positions.into_iter().collect();
        self
    }

    /// Set the multiplier applied to stimulus radii.
    pub fn listening_distance_scale(mut self, scale: f32) -> Self {
        self.listening_distance_scale = scale;
        self
    }

    /// Set the factions this listener pays attention to.
    pub fn faction_mask(mut self, mask: FactionMask) -> Self {
        self.faction_mask = mask;
        self
    }

    /// Set an extra veto checked after the faction and range tests.
    pub fn user_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(EntityId, &SoundStimulusParams) -> bool + Send + Sync + 'static,
    {
        self.user_condition = Some(Arc::new(condition));
        self
    }
}

impl fmt::Debug for ListenerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerParams")
            .field("ears", &self.ears)
            .field("listening_distance_scale", &self.listening_distance_scale)
            .field("faction_mask", &self.faction_mask)
            .field("user_condition", &self.user_condition.is_some())
            .finish_non_exhaustive()
    }
}

/// A registered listener and its derived bounding sphere.
#[derive(Debug, Clone)]
pub struct Listener {
    entity_id: EntityId,
    params: ListenerParams,
    bounding_sphere: BoundingSphere,
    debug_name: String,
}

impl Listener {
    pub(crate) fn new(
        entity_id: EntityId,
        params: ListenerParams,
        noise_buffer: f32,
        debug_name: String,
    ) -> Self {
        let mut listener = Self {
            entity_id,
            params,
            bounding_sphere: BoundingSphere::EMPTY,
            debug_name,
        };
        listener.reconstruct_bounding_sphere(noise_buffer);
        listener
    }

    /// Get the entity this listener belongs to.
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Get the current listener parameters.
    pub fn params(&self) -> &ListenerParams {
        &self.params
    }

    /// Get the sphere enclosing every ear.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// Get the display name used in logs.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(crate) fn reconstruct_bounding_sphere(&mut self, noise_buffer: f32) {
        self.bounding_sphere = BoundingSphere::around_points(&self.params.ears, noise_buffer);
    }

    /// Copies the fields selected by `flags` from `params`.
    pub(crate) fn apply_changes(
        &mut self,
        params: &ListenerParams,
        flags: ListenerChangeFlags,
        noise_buffer: f32,
    ) {
        if flags.contains(ListenerChangeFlags::LISTENING_DISTANCE_SCALE) {
            self.params.listening_distance_scale = params.listening_distance_scale;
        }
        if flags.contains(ListenerChangeFlags::FACTION_MASK) {
            self.params.faction_mask = params.faction_mask;
        }
        if flags.contains(ListenerChangeFlags::USER_CONDITION) {
            self.params.user_condition = params.user_condition.clone();
        }
        if flags.contains(ListenerChangeFlags::SOUND_HEARD_CALLBACK) {
            self.params.on_sound_heard = Arc::clone(&params.on_sound_heard);
        }

        if flags.contains(ListenerChangeFlags::EARS) {
            self.params.ears.clone_from(&params.ears);
            // Moved ears keep their in-flight rays; only the sphere follows.
            self.reconstruct_bounding_sphere(noise_buffer);
        }
    }

    fn hearing_range(&self, stimulus: &SoundStimulusParams) -> f32 {
        stimulus.radius * self.params.listening_distance_scale
    }

    /// First, cheap stage of the range filter: faction checks, then a
    /// point-vs-bounding-sphere prune, then the user condition.
    pub fn should_acknowledge_sound(&self, stimulus: &SoundStimulusParams) -> bool {
        if !stimulus.faction.is_valid() {
            return false;
        }
        if !self.params.faction_mask.contains(stimulus.faction) {
            return false;
        }

        let threshold = (self.hearing_range(stimulus) - self.bounding_sphere.radius).max(0.0);
        if self
            .bounding_sphere
            .center
            .distance_squared(stimulus.position)
            > threshold * threshold
        {
            return false;
        }

        match &self.params.user_condition {
            Some(condition) => condition(self.entity_id, stimulus),
            None => true,
        }
    }

    /// Second stage of the range filter. Returns the index of the first ear
    /// within range, if any.
    pub fn ear_within_stimulus_range(&self, stimulus: &SoundStimulusParams) -> Option<usize> {
        self.ears_within_stimulus_range(stimulus).next()
    }

    pub(crate) fn ears_within_stimulus_range<'a>(
        &'a self,
        stimulus: &'a SoundStimulusParams,
    ) -> impl Iterator<Item = usize> + 'a {
        let range = self.hearing_range(stimulus);
        let range_sq = range * range;
        self.params
            .ears
            .iter()
            .enumerate()
            .filter(move |(_, ear)| ear.distance_squared(stimulus.position) <= range_sq)
            .map(|(index, _)| index)
    }

    pub(crate) fn deliver(&self, ear_index: usize, stimulus: &SoundStimulusParams) {
        let heard = HeardSound {
            listener_entity_id: self.entity_id,
            ear_index,
            stimulus,
        };
        (self.params.on_sound_heard)(&heard);
    }
}
