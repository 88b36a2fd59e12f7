//! Test doubles shared by the unit tests.

use crate::error::{AuditionError, Result};
use crate::scene::{RayCastQueue, RayCompletion, RayId, RayRequest};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct RecordedRays {
    next_id: u32,
    pub queued: Vec<(RayId, RayRequest)>,
    pub cancelled: Vec<RayId>,
    /// Completions handed out on the next `drain_completed`.
    pub completions: Vec<RayCompletion>,
    /// Makes `queue_ray` fail, like a queue whose tracer has shut down.
    pub refuse_rays: bool,
}

impl RecordedRays {
    pub fn queued_ids(&self) -> Vec<RayId> {
        self.queued.iter().map(|(id, _)| *id).collect()
    }

    /// Ray queued towards `end`, if any.
    pub fn ray_towards(&self, end: crate::math::Vec3) -> Option<RayId> {
        self.queued
            .iter()
            .find(|(_, request)| request.end == end)
            .map(|(id, _)| *id)
    }
}

/// Ray queue that records every call and never completes on its own.
#[derive(Clone, Default)]
pub struct RecordingRayQueue {
    pub rays: Rc<RefCell<RecordedRays>>,
}

impl RecordingRayQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RayCastQueue for RecordingRayQueue {
    fn queue_ray(&mut self, request: RayRequest) -> Result<RayId> {
        let mut rays = self.rays.borrow_mut();
        if rays.refuse_rays {
            return Err(AuditionError::RayCast("tracer is gone".into()));
        }
        rays.next_id += 1;
        let ray_id = RayId(rays.next_id);
        rays.queued.push((ray_id, request));
        Ok(ray_id)
    }

    fn cancel_ray(&mut self, ray_id: RayId) {
        self.rays.borrow_mut().cancelled.push(ray_id);
    }

    fn drain_completed(&mut self, completed: &mut Vec<RayCompletion>) {
        completed.append(&mut self.rays.borrow_mut().completions);
    }
}
