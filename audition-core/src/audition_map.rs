use crate::config::AuditionMapDesc;
use crate::error::{AuditionError, Result};
use crate::listener::{Listener, ListenerChangeFlags, ListenerParams, MAX_EARS_PER_LISTENER};
use crate::ray_cast_manager::{RayCastManager, RayCastOutcome};
use crate::scene::{RayCastQueue, RayCastResult, RayHit, RayId, SurfaceObstructionTable};
use crate::types::{
    EntityId, GlobalListenerId, GlobalListenerIdGenerator, ObstructionHandling,
    SoundStimulusParams,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Called once a stimulus has been fully processed and reached at least one
/// ear.
pub type StimulusProcessedCallback = dyn Fn(&SoundStimulusParams) + Send + Sync;

/// Registration parameters of a global listener.
#[derive(Clone)]
pub struct GlobalListenerParams {
    pub on_stimulus_processed: Arc<StimulusProcessedCallback>,
}

impl GlobalListenerParams {
    /// Create global listener parameters around a callback.
    pub fn new<F>(on_stimulus_processed: F) -> Self
    where
        F: Fn(&SoundStimulusParams) + Send + Sync + 'static,
    {
        Self {
            on_stimulus_processed: Arc::new(on_stimulus_processed),
        }
    }
}

impl fmt::Debug for GlobalListenerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalListenerParams").finish_non_exhaustive()
    }
}

struct GlobalListener {
    params: GlobalListenerParams,
    debug_name: String,
}

/// Resolves entity ids to display names for diagnostics.
pub trait EntityNameLookup {
    fn entity_name(&self, entity_id: EntityId) -> Option<String>;
}

/// Registry of listeners and dispatcher of sound stimuli.
///
/// `AuditionMap` is owned by the simulation thread. Sound events are filtered
/// per listener by faction, then by a bounding-sphere prune, then per ear.
/// Depending on the stimulus' [`ObstructionHandling`] they are either
/// delivered right away or handed to the [`RayCastManager`], in which case
/// delivery happens during a later [`AuditionMap::update`] (or
/// [`AuditionMap::on_ray_cast_complete`]) once the rays resolve.
///
/// # Example
///
/// ```
/// use audition_core::*;
/// use audition_core::scene::channel_ray_cast_queue;
///
/// let (queue, _worker) = channel_ray_cast_queue();
/// let mut map = AuditionMap::new(AuditionMapDesc::default(), queue)?;
///
/// let params = ListenerParams::new(|heard| {
///     println!("{} heard a sound", heard.listener_entity_id);
/// })
/// .ear(Vec3::new(0.0, 0.0, 1.8))
/// .faction_mask(FactionMask::from_factions(&[FactionId(2)]));
/// map.register_listener(EntityId(1), params)?;
///
/// let stimulus = SoundStimulusParams::new(Vec3::new(5.0, 0.0, 1.8), 10.0, FactionId(2));
/// map.on_sound_event(&stimulus, "footstep");
/// # Ok::<(), AuditionError>(())
/// ```
pub struct AuditionMap {
    desc: AuditionMapDesc,
    listeners: HashMap<EntityId, Listener>,
    global_listeners: HashMap<GlobalListenerId, GlobalListener>,
    global_listener_ids: GlobalListenerIdGenerator,
    ray_cast_manager: RayCastManager,
    entity_names: Option<Box<dyn EntityNameLookup>>,
    outcomes: Vec<RayCastOutcome>,
}

impl AuditionMap {
    /// Creates an audition map submitting obstruction rays to `ray_queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if `desc` is invalid.
    pub fn new(desc: AuditionMapDesc, ray_queue: impl RayCastQueue + 'static) -> Result<Self> {
        desc.validate()?;
        let ray_cast_manager = RayCastManager::new(Box::new(ray_queue), &desc);
        Ok(Self {
            desc,
            listeners: HashMap::new(),
            global_listeners: HashMap::new(),
            global_listener_ids: GlobalListenerIdGenerator::new(),
            ray_cast_manager,
            entity_names: None,
            outcomes: Vec::new(),
        })
    }

    /// Get the configuration this map was created with.
    pub fn desc(&self) -> &AuditionMapDesc {
        &self.desc
    }

    /// Sets the resolver used to give listeners readable names in logs.
    pub fn set_entity_name_lookup(&mut self, lookup: impl EntityNameLookup + 'static) {
        self.entity_names = Some(Box::new(lookup));
    }

    /// Replaces how surface hits are turned into obstruction.
    pub fn set_sound_obstruction_on_hit_callback<F>(&mut self, callback: F)
    where
        F: Fn(&RayHit) -> f32 + Send + Sync + 'static,
    {
        self.ray_cast_manager
            .set_sound_obstruction_on_hit_callback(callback);
    }

    /// Looks surface obstruction up in `table`.
    pub fn set_surface_obstruction_table(&mut self, table: SurfaceObstructionTable) {
        self.ray_cast_manager.set_surface_obstruction_table(table);
    }

    fn validate_ears(entity_id: EntityId, params: &ListenerParams) -> Result<()> {
        if params.ears.len() > MAX_EARS_PER_LISTENER {
            return Err(AuditionError::TooManyEars {
                entity_id,
                ear_count: params.ears.len(),
                max: MAX_EARS_PER_LISTENER,
            });
        }
        Ok(())
    }

    /// Registers a listener, replacing any listener already registered for
    /// `entity_id`.
    ///
    /// Returns `true` if the entity was not registered before.
    ///
    /// # Errors
    ///
    /// Returns an error for the invalid entity id or when `params` has more
    /// than [`MAX_EARS_PER_LISTENER`] ears.
    pub fn register_listener(&mut self, entity_id: EntityId, params: ListenerParams) -> Result<bool> {
        if !entity_id.is_valid() {
            return Err(AuditionError::InvalidEntityId);
        }
        Self::validate_ears(entity_id, &params)?;

        let replaces_different_ear_count = self
            .listeners
            .get(&entity_id)
            .is_some_and(|existing| existing.params().ears.len() != params.ears.len());
        if replaces_different_ear_count {
            self.cancel_rays_directed_at(entity_id);
        }

        let debug_name = self
            .entity_names
            .as_ref()
            .and_then(|lookup| lookup.entity_name(entity_id))
            .unwrap_or_else(|| entity_id.to_string());

        let listener = Listener::new(
            entity_id,
            params,
            self.desc.bounding_sphere_noise_buffer,
            debug_name,
        );
        log::debug!(
            "Registered listener '{}' with {} ears",
            listener.debug_name(),
            listener.params().ears.len()
        );
        let is_new = self.listeners.insert(entity_id, listener).is_none();
        Ok(is_new)
    }

    /// Cancels every ray aimed at the listener, then forgets it.
    pub fn unregister_listener(&mut self, entity_id: EntityId) {
        self.cancel_rays_directed_at(entity_id);
        if let Some(listener) = self.listeners.remove(&entity_id) {
            log::debug!("Unregistered listener '{}'", listener.debug_name());
        }
    }

    /// Updates the fields of a registered listener selected by `flags`.
    ///
    /// A change in the number of ears cancels every ray in flight towards the
    /// listener. Ears that only moved keep their rays, which may then resolve
    /// against the old ear position.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener is not registered or the new ears
    /// exceed [`MAX_EARS_PER_LISTENER`].
    pub fn listener_changed(
        &mut self,
        entity_id: EntityId,
        params: &ListenerParams,
        flags: ListenerChangeFlags,
    ) -> Result<()> {
        let Some(listener) = self.listeners.get(&entity_id) else {
            log::warn!("listener_changed called for unregistered {}", entity_id);
            return Err(AuditionError::UnknownListener(entity_id));
        };

        let ears_changed = flags.contains(ListenerChangeFlags::EARS);
        if ears_changed {
            Self::validate_ears(entity_id, params)?;
        }
        if ears_changed && listener.params().ears.len() != params.ears.len() {
            self.cancel_rays_directed_at(entity_id);
        }

        if let Some(listener) = self.listeners.get_mut(&entity_id) {
            listener.apply_changes(params, flags, self.desc.bounding_sphere_noise_buffer);
        }
        Ok(())
    }

    /// Register a listener notified of every stimulus that reached at least one ear.
    pub fn register_global_listener(
        &mut self,
        params: GlobalListenerParams,
        debug_name: &str,
    ) -> GlobalListenerId {
        let id = self.global_listener_ids.next_id();
        self.global_listeners.insert(
            id,
            GlobalListener {
                params,
                debug_name: debug_name.to_string(),
            },
        );
        log::debug!("Registered global listener '{}' as {}", debug_name, id);
        id
    }

    /// Remove a global listener. Unknown ids are logged and ignored.
    pub fn unregister_global_listener(&mut self, id: GlobalListenerId) {
        match self.global_listeners.remove(&id) {
            Some(global) => log::debug!("Unregistered global listener '{}'", global.debug_name),
            None => log::warn!("Unregistering unknown {}", id),
        }
    }

    /// Dispatches a sound event to every listener that can hear it.
    ///
    /// `debug_text` only shows up in logs.
    pub fn on_sound_event(&mut self, stimulus: &SoundStimulusParams, debug_text: &str) {
        log::debug!(
            "Sound event '{}' at {} (radius {}, faction {}, {:?})",
            debug_text,
            stimulus.position,
            stimulus.radius,
            stimulus.faction.0,
            stimulus.obstruction_handling
        );

        match stimulus.obstruction_handling {
            ObstructionHandling::IgnoreAllObstructions => {
                self.on_sound_event_ignoring_obstructions(stimulus)
            }
            ObstructionHandling::RayCastWithLinearFallOff => {
                self.on_sound_event_with_ray_casts(stimulus)
            }
        }
    }

    fn on_sound_event_ignoring_obstructions(&self, stimulus: &SoundStimulusParams) {
        let mut delivered = 0;
        for listener in self.listeners.values() {
            if !listener.should_acknowledge_sound(stimulus) {
                continue;
            }
            if let Some(ear_index) = listener.ear_within_stimulus_range(stimulus) {
                listener.deliver(ear_index, stimulus);
                delivered += 1;
            }
        }

        if delivered > 0 {
            self.notify_global_listeners_stimulus_processed(stimulus);
        }
    }

    fn on_sound_event_with_ray_casts(&mut self, stimulus: &SoundStimulusParams) {
        let mut scope = self.ray_cast_manager.prepare_pending_stimulus(stimulus);
        let mut listeners_pending = 0;
        let mut rays_queued = 0;

        for listener in self.listeners.values() {
            if !listener.should_acknowledge_sound(stimulus)
                || listener.ear_within_stimulus_range(stimulus).is_none()
            {
                continue;
            }
            let queued = scope.queue_rays_to_listener(listener);
            if queued > 0 {
                rays_queued += queued;
                listeners_pending += 1;
            }
        }

        log::trace!(
            "Queued {} rays for {} listeners (fall-off factor {})",
            rays_queued,
            listeners_pending,
            scope.fall_off_factor()
        );
    }

    /// Resolves one finished ray, for hosts whose ray queue pushes
    /// completions instead of handing them out in `drain_completed`.
    ///
    /// Completions for unknown or cancelled rays are ignored.
    pub fn on_ray_cast_complete(&mut self, ray_id: RayId, result: RayCastResult) {
        let mut outcomes = std::mem::take(&mut self.outcomes);
        self.ray_cast_manager
            .on_ray_cast_complete(ray_id, result, &mut outcomes);
        self.dispatch_outcomes(&mut outcomes);
        self.outcomes = outcomes;
    }

    /// Dispatches the rays the queue finished since the last update.
    pub fn update(&mut self, delta_time: f32) {
        let mut outcomes = std::mem::take(&mut self.outcomes);
        let processed = self
            .ray_cast_manager
            .update(self.desc.max_completions_per_update, &mut outcomes);
        self.dispatch_outcomes(&mut outcomes);
        self.outcomes = outcomes;

        if processed > 0 {
            log::trace!(
                "Audition update ({:.3}s): resolved {} rays, {} still pending",
                delta_time,
                processed,
                self.ray_cast_manager.pending_ray_count()
            );
        }
    }

    /// Cancels every ray and drops every listener and global listener.
    pub fn reset(&mut self) {
        self.ray_cast_manager.cancel_all_pending_stimuli();
        self.listeners.clear();
        self.global_listeners.clear();
        self.outcomes.clear();
        log::info!("Audition map reset");
    }

    fn cancel_rays_directed_at(&mut self, entity_id: EntityId) {
        let mut outcomes = std::mem::take(&mut self.outcomes);
        self.ray_cast_manager
            .cancel_all_pending_stimuli_directed_at_listener(entity_id, &mut outcomes);
        self.dispatch_outcomes(&mut outcomes);
        self.outcomes = outcomes;
    }

    fn dispatch_outcomes(&self, outcomes: &mut Vec<RayCastOutcome>) {
        for outcome in outcomes.drain(..) {
            match outcome {
                RayCastOutcome::Heard {
                    listener_entity_id,
                    ear_index,
                    stimulus,
                } => self.deliver_stimulus_to_listener(listener_entity_id, ear_index, &stimulus),
                RayCastOutcome::StimulusProcessed { stimulus } => {
                    self.notify_global_listeners_stimulus_processed(&stimulus)
                }
            }
        }
    }

    fn deliver_stimulus_to_listener(
        &self,
        entity_id: EntityId,
        ear_index: usize,
        stimulus: &SoundStimulusParams,
    ) {
        let Some(listener) = self.listeners.get(&entity_id) else {
            debug_assert!(false, "stimulus resolved for unregistered listener {entity_id}");
            log::warn!("Dropping stimulus resolved for unregistered {}", entity_id);
            return;
        };
        listener.deliver(ear_index, stimulus);
    }

    fn notify_global_listeners_stimulus_processed(&self, stimulus: &SoundStimulusParams) {
        for global in self.global_listeners.values() {
            (global.params.on_stimulus_processed)(stimulus);
        }
    }

    /// Get a registered listener.
    pub fn listener(&self, entity_id: EntityId) -> Option<&Listener> {
        self.listeners.get(&entity_id)
    }

    /// Iterate over every registered listener, in no particular order.
    pub fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.values()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of registered global listeners.
    pub fn global_listener_count(&self) -> usize {
        self.global_listeners.len()
    }

    /// Number of rays waiting for their completion.
    pub fn pending_ray_count(&self) -> usize {
        self.ray_cast_manager.pending_ray_count()
    }

    /// Number of (listener, stimulus) pairs waiting on rays.
    pub fn pending_listener_count(&self) -> usize {
        self.ray_cast_manager.pending_listener_count()
    }

    /// Number of stimuli with rays still in flight.
    pub fn pending_stimulus_count(&self) -> usize {
        self.ray_cast_manager.pending_stimulus_count()
    }

    /// Number of rays in flight towards one listener.
    pub fn pending_rays_for_listener(&self, entity_id: EntityId) -> usize {
        self.ray_cast_manager.pending_rays_for_listener(entity_id)
    }
}

impl Drop for AuditionMap {
    fn drop(&mut self) {
        self.ray_cast_manager.cancel_all_pending_stimuli();
    }
}
