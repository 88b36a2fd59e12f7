//! Asynchronous ray cast queue interface.
//!
//! The audition map never traces rays itself. It submits [`RayRequest`]s to a
//! host-provided [`RayCastQueue`] and is told about the outcome later, either
//! through [`RayCastQueue::drain_completed`] during `update` or by the host
//! calling `AuditionMap::on_ray_cast_complete` directly.

use crate::error::Result;
use crate::math::Vec3;
use crate::scene::surface::SurfaceTypeId;
use std::fmt;

/// Identifier assigned to a queued ray by the ray cast queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RayId(pub u32);

impl fmt::Display for RayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RayId({})", self.0)
    }
}

/// Scheduling priority of a queued ray.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RayPriority {
    Low,
    #[default]
    Medium,
    High,
    Immediate,
}

/// A segment to trace from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayRequest {
    pub start: Vec3,
    pub end: Vec3,
    pub priority: RayPriority,
}

impl RayRequest {
    /// Create a request for the segment `start..end`.
    pub fn new(start: Vec3, end: Vec3, priority: RayPriority) -> Self {
        Self {
            start,
            end,
            priority,
        }
    }
}

/// One surface crossed by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray start to the hit point
    pub distance: f32,

    /// Physical surface type, used to look up the sound obstruction
    pub surface_type: SurfaceTypeId,

    /// World-space hit position
    pub position: Vec3,

    /// Surface normal at the hit point
    pub normal: Vec3,
}

impl RayHit {
    /// Create a hit.
    pub fn new(distance: f32, surface_type: SurfaceTypeId, position: Vec3, normal: Vec3) -> Self {
        Self {
            distance,
            surface_type,
            position,
            normal,
        }
    }
}

/// Every surface a ray crossed between its start and end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RayCastResult {
    pub hits: Vec<RayHit>,
}

impl RayCastResult {
    /// Create a result for a ray that crossed nothing.
    pub fn clear_path() -> Self {
        Self::default()
    }

    /// Create a result from hits in any order.
    pub fn with_hits(hits: Vec<RayHit>) -> Self {
        Self { hits }
    }

    pub(crate) fn sort_by_distance(&mut self) {
        self.hits
            .sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));
    }
}

/// A finished ray, as handed back by [`RayCastQueue::drain_completed`].
#[derive(Debug, Clone, PartialEq)]
pub struct RayCompletion {
    pub ray_id: RayId,
    pub result: RayCastResult,
}

/// External queue that traces rays asynchronously.
///
/// Completions may arrive in any order. Once `cancel_ray` has been called for
/// an id, no completion for that id may be reported any more.
pub trait RayCastQueue {
    /// Submits a ray and returns the id its completion will carry.
    ///
    /// # Errors
    ///
    /// Returns an error if the ray can never be traced, for example because
    /// the tracing side has shut down.
    fn queue_ray(&mut self, request: RayRequest) -> Result<RayId>;

    /// Withdraws a queued ray. Unknown or already completed ids are ignored.
    fn cancel_ray(&mut self, ray_id: RayId);

    /// Moves finished rays into `completed`.
    ///
    /// Queues that report completions by calling
    /// `AuditionMap::on_ray_cast_complete` themselves can keep the default,
    /// which reports nothing.
    fn drain_completed(&mut self, _completed: &mut Vec<RayCompletion>) {}
}

/// Scene geometry query used by ray cast workers.
///
/// Implementations must be `Send + Sync`: workers typically run on a physics
/// or job thread.
pub trait SceneRayTracer: Send + Sync {
    /// Appends every surface crossed by the segment `start..end` to `hits`.
    /// Order does not matter.
    fn trace_segment(&self, start: Vec3, end: Vec3, hits: &mut Vec<RayHit>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_distance() {
        let hit = |d| RayHit::new(d, SurfaceTypeId(0), Vec3::ZERO, Vec3::Y);
        let mut result = RayCastResult::with_hits(vec![hit(3.0), hit(1.0), hit(2.0)]);
        result.sort_by_distance();
        let distances: Vec<f32> = result.hits.iter().map(|h| h.distance).collect();
        assert_eq!(distances, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_priority_order() {
        assert!(RayPriority::Immediate > RayPriority::High);
        assert!(RayPriority::Medium > RayPriority::Low);
    }
}
