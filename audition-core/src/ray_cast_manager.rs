//! Ray-cast path of sound delivery.
//!
//! For stimuli with
//! [`RayCastWithLinearFallOff`](crate::types::ObstructionHandling::RayCastWithLinearFallOff) every
//! ear in range gets a ray from the stimulus. The manager keeps three kinds of
//! pending state until those rays resolve:
//!
//! - one ref-counted [`PendingStimulusParams`] per stimulus, shared by every
//!   listener the stimulus reaches
//! - one [`PendingListenerForStimulus`] per (listener, stimulus) pair, holding
//!   the listener's outstanding rays
//! - one [`PendingRay`] per queued ray, keyed by its ray id
//!
//! A pending-listener record is created when its first ray is queued, loses
//! one ray per completion and is released when no ray is left, or is
//! cancelled when its listener goes away. Resolutions are reported as
//! [`RayCastOutcome`]s for the audition map to dispatch.

use crate::config::AuditionMapDesc;
use crate::listener::{Listener, MAX_EARS_PER_LISTENER};
use crate::math::Vec3;
use crate::pool::{ItemPool, RefCountedItemPool};
use crate::scene::{
    RayCastQueue, RayCastResult, RayCompletion, RayHit, RayId, RayPriority, RayRequest,
    SurfaceObstructionTable,
};
use crate::types::{EntityId, SoundStimulusParams};
use std::collections::{HashMap, HashSet, VecDeque};

/// Priority of every ray queued for sound obstruction.
pub const AUDITION_RAY_PRIORITY: RayPriority = RayPriority::Medium;

const MIN_STIMULUS_RADIUS: f32 = 1.0e-3;

/// Returns the obstruction coefficient a ray picks up when crossing `hit`.
pub type SoundObstructionOnHitCallback = dyn Fn(&RayHit) -> f32 + Send + Sync;

/// Obstruction gained per unit of distance travelled by a stimulus of the
/// given radius.
///
/// Travelling exactly `radius` accumulates an obstruction of 1.0, which
/// blocks the sound completely.
pub fn compute_sound_linear_fall_off_factor(radius: f32) -> f32 {
    1.0 / radius.max(MIN_STIMULUS_RADIUS)
}

/// Integrates obstruction along a ray and tells whether it gets to
/// `target_distance` before being fully obstructed.
///
/// `hits` must be sorted by ascending distance. Hits beyond the target are
/// ignored.
pub fn ray_reaches_target(
    target_distance: f32,
    fall_off_factor: f32,
    hits: &[RayHit],
    obstruction_on_hit: impl Fn(&RayHit) -> f32,
) -> bool {
    let mut obstruction = 0.0f32;
    let mut travelled = 0.0f32;

    for hit in hits.iter().take_while(|hit| hit.distance <= target_distance) {
        let distance = hit.distance.max(travelled);
        obstruction += (distance - travelled) * fall_off_factor;
        obstruction += obstruction_on_hit(hit).max(0.0);
        travelled = distance;
        if obstruction >= 1.0 {
            return false;
        }
    }

    let furthest_reachable = travelled + (1.0 - obstruction) / fall_off_factor;
    furthest_reachable >= target_distance
}

/// Stimulus parameters shared by every listener still waiting on rays.
#[derive(Debug, Clone, Default)]
pub struct PendingStimulusParams {
    pub params: SoundStimulusParams,
    pub reached_any_ear: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingRayInfo {
    ray_id: RayId,
    ear_index: usize,
}

/// Rays still outstanding between one stimulus and one listener.
#[derive(Debug, Clone, Default)]
pub struct PendingListenerForStimulus {
    listener_entity_id: EntityId,
    pending_stimulus_index: usize,
    rays: Vec<PendingRayInfo>,
}

impl PendingListenerForStimulus {
    /// Get the listener the rays are aimed at.
    pub fn listener_entity_id(&self) -> EntityId {
        self.listener_entity_id
    }

    /// Number of rays of this listener still in flight.
    pub fn outstanding_rays(&self) -> usize {
        self.rays.len()
    }
}

/// A queued ray awaiting its completion.
#[derive(Debug, Clone, Copy)]
pub struct PendingRay {
    pub start: Vec3,
    pub end: Vec3,
    pub fall_off_factor: f32,
    pending_listener_index: usize,
}

/// Resolution reported back to the audition map.
#[derive(Debug, Clone, PartialEq)]
pub enum RayCastOutcome {
    /// A ray reached `ear_index` of the listener.
    Heard {
        listener_entity_id: EntityId,
        ear_index: usize,
        stimulus: SoundStimulusParams,
    },
    /// The last pending listener of a stimulus resolved and at least one ear
    /// was reached along the way.
    StimulusProcessed { stimulus: SoundStimulusParams },
}

/// Queues, tracks and resolves obstruction rays.
pub struct RayCastManager {
    ray_queue: Box<dyn RayCastQueue>,
    pending_stimuli: RefCountedItemPool<PendingStimulusParams>,
    pending_listeners: ItemPool<PendingListenerForStimulus>,
    pending_rays: HashMap<RayId, PendingRay>,
    obstruction_on_hit: Box<SoundObstructionOnHitCallback>,

    // Cached to avoid per-update allocations
    drained: Vec<RayCompletion>,
    backlog: VecDeque<RayCompletion>,
}

impl RayCastManager {
    /// Create a manager submitting rays to `ray_queue`.
    pub fn new(ray_queue: Box<dyn RayCastQueue>, desc: &AuditionMapDesc) -> Self {
        let table = SurfaceObstructionTable::new(desc.default_surface_obstruction);
        Self {
            ray_queue,
            pending_stimuli: RefCountedItemPool::with_sort_interval(desc.pool_sort_interval),
            pending_listeners: ItemPool::with_sort_interval(desc.pool_sort_interval),
            pending_rays: HashMap::new(),
            obstruction_on_hit: Box::new(move |hit: &RayHit| table.obstruction(hit.surface_type)),
            drained: Vec::new(),
            backlog: VecDeque::new(),
        }
    }

    /// Replaces how surface hits are turned into obstruction.
    pub fn set_sound_obstruction_on_hit_callback<F>(&mut self, callback: F)
    where
        F: Fn(&RayHit) -> f32 + Send + Sync + 'static,
    {
        self.obstruction_on_hit = Box::new(callback);
    }

    /// Looks surface obstruction up in `table`.
    pub fn set_surface_obstruction_table(&mut self, table: SurfaceObstructionTable) {
        self.set_sound_obstruction_on_hit_callback(move |hit| table.obstruction(hit.surface_type));
    }

    /// Number of rays waiting for their completion.
    pub fn pending_ray_count(&self) -> usize {
        self.pending_rays.len()
    }

    /// Number of live pending-listener records.
    pub fn pending_listener_count(&self) -> usize {
        self.pending_listeners.len()
    }

    /// Number of live pending-stimulus records.
    pub fn pending_stimulus_count(&self) -> usize {
        self.pending_stimuli.len()
    }

    /// Outstanding rays aimed at `listener_entity_id`.
    pub fn pending_rays_for_listener(&self, listener_entity_id: EntityId) -> usize {
        self.pending_listeners
            .iter()
            .filter(|(_, record)| record.listener_entity_id == listener_entity_id)
            .map(|(_, record)| record.rays.len())
            .sum()
    }

    /// Allocates the shared record for `params` and returns a scope through
    /// which rays for individual listeners are queued.
    ///
    /// The scope holds one reference on the record. When it is dropped the
    /// record is released right away if no listener took a reference.
    pub fn prepare_pending_stimulus(
        &mut self,
        params: &SoundStimulusParams,
    ) -> PendingStimulusScope<'_> {
        let index = self.pending_stimuli.allocate();
        self.pending_stimuli[index] = PendingStimulusParams {
            params: params.clone(),
            reached_any_ear: false,
        };
        self.pending_stimuli.add_ref(index);

        PendingStimulusScope {
            fall_off_factor: compute_sound_linear_fall_off_factor(params.radius),
            stimulus_index: index,
            manager: self,
        }
    }

    fn release_pending_stimulus_params_if_not_used(&mut self, index: usize) {
        if let Some(released) = self.pending_stimuli.dec_ref(index) {
            log::trace!(
                "Stimulus at {} reached no listener, released pending record {}",
                released.params.position,
                index
            );
        }
    }

    fn queue_rays_between_stimulus_and_listener(
        &mut self,
        stimulus_index: usize,
        fall_off_factor: f32,
        listener: &Listener,
    ) -> usize {
        let stimulus = self.pending_stimuli[stimulus_index].params.clone();
        let mut pending_listener_index = None;
        let mut queued = 0;

        for ear_index in listener.ears_within_stimulus_range(&stimulus) {
            let ear = listener.params().ears[ear_index];
            let request = RayRequest::new(stimulus.position, ear, AUDITION_RAY_PRIORITY);
            let ray_id = match self.ray_queue.queue_ray(request) {
                Ok(ray_id) => ray_id,
                Err(e) => {
                    log::warn!(
                        "Not listening through ear {} of {}: {}",
                        ear_index,
                        listener.entity_id(),
                        e
                    );
                    continue;
                }
            };

            let index = match pending_listener_index {
                Some(index) => index,
                None => {
                    let index = self.pending_listeners.allocate();
                    let record = &mut self.pending_listeners[index];
                    record.listener_entity_id = listener.entity_id();
                    record.pending_stimulus_index = stimulus_index;
                    self.pending_stimuli.add_ref(stimulus_index);
                    pending_listener_index = Some(index);
                    index
                }
            };
            self.track_ray(ray_id, request, fall_off_factor, index);

            let record = &mut self.pending_listeners[index];
            assert!(
                record.rays.len() < MAX_EARS_PER_LISTENER,
                "more than {MAX_EARS_PER_LISTENER} rays queued for listener {}",
                record.listener_entity_id
            );
            record.rays.push(PendingRayInfo { ray_id, ear_index });
            queued += 1;
        }

        if queued > 0 {
            log::trace!(
                "Queued {} rays towards listener {}",
                queued,
                listener.entity_id()
            );
        }
        queued
    }

    fn track_ray(
        &mut self,
        ray_id: RayId,
        request: RayRequest,
        fall_off_factor: f32,
        pending_listener_index: usize,
    ) {
        let previous = self.pending_rays.insert(
            ray_id,
            PendingRay {
                start: request.start,
                end: request.end,
                fall_off_factor,
                pending_listener_index,
            },
        );
        debug_assert!(previous.is_none(), "ray queue reused live {ray_id}");
    }

    /// Tells the queue to drop `ray_id`, unless its completion was already
    /// drained into the backlog, in which case the backlog entry is dropped.
    fn cancel_ray(&mut self, ray_id: RayId) {
        match self.backlog.iter().position(|c| c.ray_id == ray_id) {
            Some(position) => {
                self.backlog.remove(position);
            }
            None => self.ray_queue.cancel_ray(ray_id),
        }
    }

    /// Resolves one completed ray.
    ///
    /// Completions of unknown or cancelled rays are ignored.
    pub fn on_ray_cast_complete(
        &mut self,
        ray_id: RayId,
        mut result: RayCastResult,
        outcomes: &mut Vec<RayCastOutcome>,
    ) {
        let Some(ray) = self.pending_rays.remove(&ray_id) else {
            log::trace!("Ignoring completion of unknown {}", ray_id);
            return;
        };

        result.sort_by_distance();
        let reached_ear = ray_reaches_target(
            ray.start.distance(ray.end),
            ray.fall_off_factor,
            &result.hits,
            |hit| (self.obstruction_on_hit)(hit),
        );

        self.process_pending_stimulus_ray_cast_result(
            ray.pending_listener_index,
            ray_id,
            reached_ear,
            outcomes,
        );
    }

    fn process_pending_stimulus_ray_cast_result(
        &mut self,
        pending_listener_index: usize,
        ray_id: RayId,
        reached_ear: bool,
        outcomes: &mut Vec<RayCastOutcome>,
    ) {
        let record = &mut self.pending_listeners[pending_listener_index];
        let Some(position) = record.rays.iter().position(|info| info.ray_id == ray_id) else {
            log::warn!(
                "{} is not tracked by pending listener {}",
                ray_id,
                record.listener_entity_id
            );
            return;
        };
        let info = record.rays.swap_remove(position);
        let listener_entity_id = record.listener_entity_id;
        let stimulus_index = record.pending_stimulus_index;
        let resolved = record.rays.is_empty();

        if reached_ear {
            let pending_stimulus = &mut self.pending_stimuli[stimulus_index];
            pending_stimulus.reached_any_ear = true;
            outcomes.push(RayCastOutcome::Heard {
                listener_entity_id,
                ear_index: info.ear_index,
                stimulus: pending_stimulus.params.clone(),
            });
        }

        log::trace!(
            "{} towards ear {} of {} resolved (reached: {})",
            ray_id,
            info.ear_index,
            listener_entity_id,
            reached_ear
        );

        if resolved {
            self.release_pending_listener(pending_listener_index, outcomes);
        }
    }

    fn release_pending_listener(
        &mut self,
        pending_listener_index: usize,
        outcomes: &mut Vec<RayCastOutcome>,
    ) {
        let stimulus_index = self.pending_listeners[pending_listener_index].pending_stimulus_index;
        self.pending_listeners.release(pending_listener_index);

        let Some(released) = self.pending_stimuli.dec_ref(stimulus_index) else {
            return;
        };
        if released.reached_any_ear {
            outcomes.push(RayCastOutcome::StimulusProcessed {
                stimulus: released.params,
            });
        }
    }

    /// Cancels every ray aimed at `listener_entity_id` and drops its pending
    /// records without delivering anything to the listener.
    ///
    /// Returns the number of rays cancelled.
    pub fn cancel_all_pending_stimuli_directed_at_listener(
        &mut self,
        listener_entity_id: EntityId,
        outcomes: &mut Vec<RayCastOutcome>,
    ) -> usize {
        let indices: Vec<usize> = self
            .pending_listeners
            .iter()
            .filter(|(_, record)| record.listener_entity_id == listener_entity_id)
            .map(|(index, _)| index)
            .collect();

        let mut cancelled = 0;
        for index in indices {
            let rays = std::mem::take(&mut self.pending_listeners[index].rays);
            for info in rays {
                self.cancel_ray(info.ray_id);
                self.pending_rays.remove(&info.ray_id);
                cancelled += 1;
            }
            self.release_pending_listener(index, outcomes);
        }

        if cancelled > 0 {
            log::debug!(
                "Cancelled {} rays directed at listener {}",
                cancelled,
                listener_entity_id
            );
        }
        cancelled
    }

    /// Cancels every outstanding ray.
    ///
    /// Leaves the pending records in place; only meant to be followed by
    /// [`Self::cancel_all_pending_stimuli`].
    fn cancel_all_rays(&mut self) {
        let drained: HashSet<RayId> = self.backlog.drain(..).map(|c| c.ray_id).collect();
        for (ray_id, _) in self.pending_rays.drain() {
            if !drained.contains(&ray_id) {
                self.ray_queue.cancel_ray(ray_id);
            }
        }
    }

    /// Cancels every ray and releases all pending state, without reporting
    /// anything.
    pub fn cancel_all_pending_stimuli(&mut self) {
        self.cancel_all_rays();
        self.pending_listeners.clear();
        self.pending_stimuli.clear();
    }

    /// Pulls finished rays from the queue and resolves at most `max` of them.
    ///
    /// Returns the number of completions processed.
    pub fn update(&mut self, max: usize, outcomes: &mut Vec<RayCastOutcome>) -> usize {
        self.ray_queue.drain_completed(&mut self.drained);
        self.backlog.extend(self.drained.drain(..));

        let mut processed = 0;
        while processed < max {
            let Some(completion) = self.backlog.pop_front() else {
                break;
            };
            self.on_ray_cast_complete(completion.ray_id, completion.result, outcomes);
            processed += 1;
        }
        processed
    }
}

/// Scope of a stimulus while its rays are being queued.
///
/// Created by [`RayCastManager::prepare_pending_stimulus`].
pub struct PendingStimulusScope<'a> {
    manager: &'a mut RayCastManager,
    stimulus_index: usize,
    fall_off_factor: f32,
}

impl PendingStimulusScope<'_> {
    /// Get the fall-off factor of the stimulus.
    pub fn fall_off_factor(&self) -> f32 {
        self.fall_off_factor
    }

    /// Queues one ray per ear of `listener` that is within range of the
    /// stimulus. Returns the number of rays queued.
    pub fn queue_rays_to_listener(&mut self, listener: &Listener) -> usize {
        self.manager.queue_rays_between_stimulus_and_listener(
            self.stimulus_index,
            self.fall_off_factor,
            listener,
        )
    }
}

impl Drop for PendingStimulusScope<'_> {
    fn drop(&mut self) {
        self.manager
            .release_pending_stimulus_params_if_not_used(self.stimulus_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerParams;
    use crate::scene::SurfaceTypeId;
    use crate::test_support::RecordingRayQueue;
    use crate::types::{FactionId, FactionMask, ObstructionHandling};

    const EAR_A: Vec3 = Vec3::new(0.0, 0.0, 1.8);
    const EAR_B: Vec3 = Vec3::new(0.0, 0.5, 1.8);

    fn hit(distance: f32, surface: u16) -> RayHit {
        RayHit::new(distance, SurfaceTypeId(surface), Vec3::ZERO, Vec3::X)
    }

    fn manager() -> (RayCastManager, RecordingRayQueue) {
        let queue = RecordingRayQueue::new();
        let manager = RayCastManager::new(Box::new(queue.clone()), &AuditionMapDesc::default());
        (manager, queue)
    }

    fn two_eared_listener(entity_id: u32) -> Listener {
        let params = ListenerParams::new(|_| {})
            .ears([EAR_A, EAR_B])
            .faction_mask(FactionMask::ALL);
        Listener::new(EntityId(entity_id), params, 0.05, String::new())
    }

    fn stimulus() -> SoundStimulusParams {
        SoundStimulusParams::new(Vec3::new(5.0, 0.0, 1.8), 10.0, FactionId(1))
            .obstruction_handling(ObstructionHandling::RayCastWithLinearFallOff)
    }

    #[test]
    fn test_fall_off_factor() {
        assert_eq!(compute_sound_linear_fall_off_factor(10.0), 0.1);
        assert_eq!(
            compute_sound_linear_fall_off_factor(4.0),
            compute_sound_linear_fall_off_factor(4.0)
        );
        assert!(compute_sound_linear_fall_off_factor(20.0) < compute_sound_linear_fall_off_factor(10.0));
        assert!(compute_sound_linear_fall_off_factor(0.0).is_finite());

        let radius = 8.0;
        let factor = compute_sound_linear_fall_off_factor(radius);
        assert!((radius * factor - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clear_path_reaches_within_radius_only() {
        let factor = compute_sound_linear_fall_off_factor(8.0);
        assert!(ray_reaches_target(7.5, factor, &[], |_| 0.0));
        assert!(ray_reaches_target(8.0, factor, &[], |_| 0.0));
        assert!(!ray_reaches_target(8.5, factor, &[], |_| 0.0));
    }

    #[test]
    fn test_surface_obstruction_accumulates() {
        let factor = compute_sound_linear_fall_off_factor(8.0);
        // 2 units travelled (0.25) + wall (0.5) leaves 0.25, i.e. 2 more units.
        assert!(ray_reaches_target(4.0, factor, &[hit(2.0, 1)], |_| 0.5));
        assert!(!ray_reaches_target(4.0, factor, &[hit(2.0, 1)], |_| 0.625));
        assert!(!ray_reaches_target(1.0, factor, &[hit(0.5, 1)], |_| 1.0));
    }

    #[test]
    fn test_hits_beyond_target_are_ignored() {
        let factor = compute_sound_linear_fall_off_factor(8.0);
        assert!(ray_reaches_target(4.0, factor, &[hit(5.0, 1)], |_| 1.0));
    }

    #[test]
    fn test_stimulus_without_listeners_is_released_immediately() {
        let (mut manager, queue) = manager();
        {
            let scope = manager.prepare_pending_stimulus(&stimulus());
            assert_eq!(scope.fall_off_factor(), 0.1);
        }
        assert_eq!(manager.pending_stimulus_count(), 0);
        assert!(queue.rays.borrow().queued.is_empty());
    }

    #[test]
    fn test_queue_one_ray_per_ear_in_range() {
        let (mut manager, queue) = manager();
        let listener = two_eared_listener(1);
        {
            let mut scope = manager.prepare_pending_stimulus(&stimulus());
            assert_eq!(scope.queue_rays_to_listener(&listener), 2);
        }
        assert_eq!(manager.pending_stimulus_count(), 1);
        assert_eq!(manager.pending_listener_count(), 1);
        assert_eq!(manager.pending_ray_count(), 2);
        assert_eq!(manager.pending_rays_for_listener(EntityId(1)), 2);

        let rays = queue.rays.borrow();
        assert!(rays.queued.iter().all(|(_, r)| r.priority == AUDITION_RAY_PRIORITY));
        assert!(rays.ray_towards(EAR_A).is_some());
        assert!(rays.ray_towards(EAR_B).is_some());
    }

    fn resolve_in_order(first: Vec3, second: Vec3) -> (RayCastManager, Vec<RayCastOutcome>) {
        let (mut manager, queue) = manager();
        let listener = two_eared_listener(1);
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&listener);

        let (first_id, second_id) = {
            let rays = queue.rays.borrow();
            (rays.ray_towards(first).unwrap(), rays.ray_towards(second).unwrap())
        };

        let mut outcomes = Vec::new();
        // The ray to EAR_B is blocked by a fully obstructing surface.
        let result_for = |ear: Vec3| {
            if ear == EAR_B {
                RayCastResult::with_hits(vec![hit(1.0, 9)])
            } else {
                RayCastResult::clear_path()
            }
        };
        manager.set_sound_obstruction_on_hit_callback(|_| 1.0);
        manager.on_ray_cast_complete(first_id, result_for(first), &mut outcomes);
        assert_eq!(manager.pending_listener_count(), 1);
        manager.on_ray_cast_complete(second_id, result_for(second), &mut outcomes);
        (manager, outcomes)
    }

    #[test]
    fn test_completion_order_does_not_matter() {
        for (first, second) in [(EAR_A, EAR_B), (EAR_B, EAR_A)] {
            let (manager, outcomes) = resolve_in_order(first, second);
            assert_eq!(manager.pending_listener_count(), 0);
            assert_eq!(manager.pending_stimulus_count(), 0);
            assert_eq!(manager.pending_ray_count(), 0);

            let heard: Vec<usize> = outcomes
                .iter()
                .filter_map(|o| match o {
                    RayCastOutcome::Heard { ear_index, .. } => Some(*ear_index),
                    _ => None,
                })
                .collect();
            assert_eq!(heard, vec![0]);
            assert_eq!(
                outcomes.last(),
                Some(&RayCastOutcome::StimulusProcessed {
                    stimulus: stimulus()
                })
            );
        }
    }

    #[test]
    fn test_every_reached_ear_is_delivered() {
        let (mut manager, queue) = manager();
        let listener = two_eared_listener(1);
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&listener);

        let mut outcomes = Vec::new();
        for id in queue.rays.borrow().queued_ids() {
            manager.on_ray_cast_complete(id, RayCastResult::clear_path(), &mut outcomes);
        }
        let heard = outcomes
            .iter()
            .filter(|o| matches!(o, RayCastOutcome::Heard { .. }))
            .count();
        let processed = outcomes
            .iter()
            .filter(|o| matches!(o, RayCastOutcome::StimulusProcessed { .. }))
            .count();
        assert_eq!((heard, processed), (2, 1));
    }

    #[test]
    fn test_no_global_notification_when_nothing_reached() {
        let (mut manager, queue) = manager();
        manager.set_sound_obstruction_on_hit_callback(|_| 1.0);
        let listener = two_eared_listener(1);
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&listener);

        let mut outcomes = Vec::new();
        for id in queue.rays.borrow().queued_ids() {
            let blocked = RayCastResult::with_hits(vec![hit(0.5, 3)]);
            manager.on_ray_cast_complete(id, blocked, &mut outcomes);
        }
        assert!(outcomes.is_empty());
        assert_eq!(manager.pending_stimulus_count(), 0);
    }

    #[test]
    fn test_stimulus_shared_by_listeners_released_after_last() {
        let (mut manager, queue) = manager();
        {
            let mut scope = manager.prepare_pending_stimulus(&stimulus());
            scope.queue_rays_to_listener(&two_eared_listener(1));
            scope.queue_rays_to_listener(&two_eared_listener(2));
        }
        assert_eq!(manager.pending_stimulus_count(), 1);
        assert_eq!(manager.pending_listener_count(), 2);

        let ids = queue.rays.borrow().queued_ids();
        let mut outcomes = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            manager.on_ray_cast_complete(*id, RayCastResult::clear_path(), &mut outcomes);
            let expected = if i + 1 == ids.len() { 0 } else { 1 };
            assert_eq!(manager.pending_stimulus_count(), expected);
        }
        let processed = outcomes
            .iter()
            .filter(|o| matches!(o, RayCastOutcome::StimulusProcessed { .. }))
            .count();
        assert_eq!(processed, 1);
    }

    #[test]
    fn test_cancel_for_listener_makes_completions_no_ops() {
        let (mut manager, queue) = manager();
        {
            let mut scope = manager.prepare_pending_stimulus(&stimulus());
            scope.queue_rays_to_listener(&two_eared_listener(1));
            scope.queue_rays_to_listener(&two_eared_listener(2));
        }

        let mut outcomes = Vec::new();
        let cancelled =
            manager.cancel_all_pending_stimuli_directed_at_listener(EntityId(1), &mut outcomes);
        assert_eq!(cancelled, 2);
        assert_eq!(queue.rays.borrow().cancelled.len(), 2);
        assert_eq!(manager.pending_rays_for_listener(EntityId(1)), 0);
        assert_eq!(manager.pending_rays_for_listener(EntityId(2)), 2);

        for id in queue.rays.borrow().cancelled.clone() {
            manager.on_ray_cast_complete(id, RayCastResult::clear_path(), &mut outcomes);
        }
        assert!(outcomes.is_empty());
        assert_eq!(manager.pending_stimulus_count(), 1);
    }

    #[test]
    fn test_cancel_all_pending_stimuli() {
        let (mut manager, queue) = manager();
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&two_eared_listener(1));

        manager.cancel_all_pending_stimuli();
        assert_eq!(manager.pending_ray_count(), 0);
        assert_eq!(manager.pending_listener_count(), 0);
        assert_eq!(manager.pending_stimulus_count(), 0);
        assert_eq!(queue.rays.borrow().cancelled.len(), 2);
    }

    #[test]
    fn test_update_respects_completion_budget() {
        let (mut manager, queue) = manager();
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&two_eared_listener(1));

        {
            let mut rays = queue.rays.borrow_mut();
            let ids = rays.queued_ids();
            rays.completions = ids
                .into_iter()
                .map(|ray_id| RayCompletion {
                    ray_id,
                    result: RayCastResult::clear_path(),
                })
                .collect();
        }

        let mut outcomes = Vec::new();
        assert_eq!(manager.update(1, &mut outcomes), 1);
        assert_eq!(manager.pending_ray_count(), 1);
        assert_eq!(manager.update(1, &mut outcomes), 1);
        assert_eq!(manager.pending_ray_count(), 0);
        assert_eq!(manager.update(1, &mut outcomes), 0);
    }

    #[test]
    fn test_surface_table_drives_obstruction() {
        let (mut manager, queue) = manager();
        let mut table = SurfaceObstructionTable::new(0.0);
        table.set(SurfaceTypeId(7), 1.0);
        manager.set_surface_obstruction_table(table);
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&two_eared_listener(1));

        let (to_a, to_b) = {
            let rays = queue.rays.borrow();
            (rays.ray_towards(EAR_A).unwrap(), rays.ray_towards(EAR_B).unwrap())
        };
        let mut outcomes = Vec::new();
        manager.on_ray_cast_complete(to_a, RayCastResult::with_hits(vec![hit(1.0, 7)]), &mut outcomes);
        manager.on_ray_cast_complete(to_b, RayCastResult::with_hits(vec![hit(1.0, 2)]), &mut outcomes);

        assert!(matches!(
            outcomes.first(),
            Some(RayCastOutcome::Heard { ear_index: 1, .. })
        ));
    }

    fn complete_all_queued(queue: &RecordingRayQueue) {
        let mut rays = queue.rays.borrow_mut();
        let ids = rays.queued_ids();
        rays.completions = ids
            .into_iter()
            .map(|ray_id| RayCompletion {
                ray_id,
                result: RayCastResult::clear_path(),
            })
            .collect();
    }

    #[test]
    fn test_cancel_drops_backlogged_completion_instead_of_cancelling() {
        let (mut manager, queue) = manager();
        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&two_eared_listener(1));
        complete_all_queued(&queue);

        let mut outcomes = Vec::new();
        assert_eq!(manager.update(1, &mut outcomes), 1);
        assert_eq!(manager.pending_rays_for_listener(EntityId(1)), 1);

        let cancelled =
            manager.cancel_all_pending_stimuli_directed_at_listener(EntityId(1), &mut outcomes);
        assert_eq!(cancelled, 1);
        // The queue already handed that completion over.
        assert!(queue.rays.borrow().cancelled.is_empty());
        assert_eq!(manager.update(usize::MAX, &mut outcomes), 0);
        assert_eq!(manager.pending_ray_count(), 0);
        assert_eq!(manager.pending_stimulus_count(), 0);
    }

    #[test]
    fn test_cancel_all_skips_backlogged_completions() {
        let (mut manager, queue) = manager();
        {
            let mut scope = manager.prepare_pending_stimulus(&stimulus());
            scope.queue_rays_to_listener(&two_eared_listener(1));
        }
        complete_all_queued(&queue);
        let mut outcomes = Vec::new();
        manager.update(1, &mut outcomes);

        manager
            .prepare_pending_stimulus(&stimulus())
            .queue_rays_to_listener(&two_eared_listener(2));
        let waiting = queue.rays.borrow().queued_ids()[2..].to_vec();

        manager.cancel_all_pending_stimuli();
        let mut cancelled = queue.rays.borrow().cancelled.clone();
        cancelled.sort_unstable();
        assert_eq!(cancelled, waiting);
        assert_eq!(manager.update(usize::MAX, &mut outcomes), 0);
    }

    #[test]
    fn test_refused_rays_leave_no_pending_state() {
        let (mut manager, queue) = manager();
        queue.rays.borrow_mut().refuse_rays = true;
        {
            let mut scope = manager.prepare_pending_stimulus(&stimulus());
            assert_eq!(scope.queue_rays_to_listener(&two_eared_listener(1)), 0);
        }
        assert_eq!(manager.pending_ray_count(), 0);
        assert_eq!(manager.pending_listener_count(), 0);
        assert_eq!(manager.pending_stimulus_count(), 0);
    }
}
