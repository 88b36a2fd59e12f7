//! Channel-backed [`RayCastQueue`] with a separate tracing worker.
//!
//! The queue half lives with the audition map on the simulation thread. The
//! worker half can be moved to any thread: it receives ray jobs, traces them
//! against a [`SceneRayTracer`] and sends the results back. Completions are
//! picked up by the queue in `drain_completed`, so audition state is only ever
//! touched on the thread that owns the map.

use crate::error::{AuditionError, Result};
use crate::scene::ray_queue::{
    RayCastQueue, RayCastResult, RayCompletion, RayHit, RayId, RayRequest, SceneRayTracer,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::cmp::Reverse;
use std::collections::HashSet;

/// A ray waiting to be traced by a [`RayCastWorker`].
#[derive(Debug, Clone, Copy)]
pub struct RayJob {
    pub ray_id: RayId,
    pub request: RayRequest,
}

/// Creates a connected queue / worker pair.
pub fn channel_ray_cast_queue() -> (ChannelRayCastQueue, RayCastWorker) {
    let (job_sender, job_receiver) = unbounded();
    let (completion_sender, completion_receiver) = unbounded();
    let queue = ChannelRayCastQueue {
        next_ray_id: 0,
        job_sender,
        completion_receiver,
        in_flight: HashSet::new(),
        cancelled: HashSet::new(),
    };
    let worker = RayCastWorker {
        job_receiver,
        completion_sender,
        pending: Vec::new(),
        hits: Vec::new(),
    };
    (queue, worker)
}

/// Submitting half. Implements [`RayCastQueue`].
pub struct ChannelRayCastQueue {
    next_ray_id: u32,
    job_sender: Sender<RayJob>,
    completion_receiver: Receiver<RayCompletion>,
    /// Rays sent to the worker whose completion has not been drained yet.
    in_flight: HashSet<RayId>,
    cancelled: HashSet<RayId>,
}

impl ChannelRayCastQueue {
    /// Number of cancelled rays whose (discarded) completion has not come
    /// back from the worker yet.
    pub fn cancelled_in_flight(&self) -> usize {
        self.cancelled.len()
    }

    /// Number of rays sent to the worker whose completion has not been
    /// drained yet, cancelled ones included.
    pub fn rays_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Next id not held by a ray in flight.
    fn next_free_ray_id(&mut self) -> RayId {
        loop {
            self.next_ray_id = self.next_ray_id.wrapping_add(1);
            let ray_id = RayId(self.next_ray_id);
            if !self.in_flight.contains(&ray_id) {
                return ray_id;
            }
        }
    }
}

impl RayCastQueue for ChannelRayCastQueue {
    fn queue_ray(&mut self, request: RayRequest) -> Result<RayId> {
        let ray_id = self.next_free_ray_id();
        self.job_sender
            .send(RayJob { ray_id, request })
            .map_err(|e| {
                AuditionError::RayCast(format!("Ray cast worker is gone, cannot queue {}: {}", ray_id, e))
            })?;
        self.in_flight.insert(ray_id);
        Ok(ray_id)
    }

    fn cancel_ray(&mut self, ray_id: RayId) {
        // Only rays whose completion is still to come need remembering.
        if self.in_flight.contains(&ray_id) {
            self.cancelled.insert(ray_id);
        }
    }

    fn drain_completed(&mut self, completed: &mut Vec<RayCompletion>) {
        for completion in self.completion_receiver.try_iter() {
            self.in_flight.remove(&completion.ray_id);
            if self.cancelled.remove(&completion.ray_id) {
                log::trace!("Dropping completion of cancelled {}", completion.ray_id);
                continue;
            }
            completed.push(completion);
        }
    }
}

/// Tracing half. Send it to whichever thread owns the scene geometry.
pub struct RayCastWorker {
    job_receiver: Receiver<RayJob>,
    completion_sender: Sender<RayCompletion>,
    pending: Vec<RayJob>,
    hits: Vec<RayHit>,
}

impl RayCastWorker {
    /// Traces every job queued so far, highest priority first.
    ///
    /// Returns the number of rays traced.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue half has been dropped.
    pub fn process_pending(&mut self, tracer: &dyn SceneRayTracer) -> Result<usize> {
        self.pending.extend(self.job_receiver.try_iter());
        self.trace_pending(tracer)
    }

    /// Blocks and traces jobs until the queue half is dropped.
    pub fn run(mut self, tracer: &dyn SceneRayTracer) -> Result<()> {
        log::debug!("Ray cast worker started");
        while let Ok(job) = self.job_receiver.recv() {
            self.pending.push(job);
            self.pending.extend(self.job_receiver.try_iter());
            if let Err(e) = self.trace_pending(tracer) {
                log::debug!("Ray cast worker stopping: {}", e);
                return Ok(());
            }
        }
        log::debug!("Ray cast worker stopped, queue disconnected");
        Ok(())
    }

    fn trace_pending(&mut self, tracer: &dyn SceneRayTracer) -> Result<usize> {
        // Stable sort keeps submission order within a priority.
        self.pending.sort_by_key(|job| Reverse(job.request.priority));

        let count = self.pending.len();
        for job in self.pending.drain(..) {
            self.hits.clear();
            tracer.trace_segment(job.request.start, job.request.end, &mut self.hits);
            let completion = RayCompletion {
                ray_id: job.ray_id,
                result: RayCastResult::with_hits(self.hits.clone()),
            };
            self.completion_sender.send(completion).map_err(|e| {
                AuditionError::RayCast(format!("Failed to send ray completion: {}", e))
            })?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::scene::ray_queue::RayPriority;
    use crate::scene::surface::SurfaceTypeId;
    use std::time::{Duration, Instant};

    /// Reports one hit at the segment midpoint whose surface type encodes the
    /// segment length, so completions can be told apart.
    struct MidpointTracer;

    impl SceneRayTracer for MidpointTracer {
        fn trace_segment(&self, start: Vec3, end: Vec3, hits: &mut Vec<RayHit>) {
            let length = start.distance(end);
            hits.push(RayHit::new(
                length * 0.5,
                SurfaceTypeId(length as u16),
                start.lerp(end, 0.5),
                Vec3::Y,
            ));
        }
    }

    fn request(length: f32, priority: RayPriority) -> RayRequest {
        RayRequest::new(Vec3::ZERO, Vec3::new(length, 0.0, 0.0), priority)
    }

    #[test]
    fn test_process_pending_in_priority_order() {
        let (mut queue, mut worker) = channel_ray_cast_queue();
        let low = queue.queue_ray(request(1.0, RayPriority::Low)).unwrap();
        let high = queue.queue_ray(request(2.0, RayPriority::High)).unwrap();
        let medium = queue.queue_ray(request(3.0, RayPriority::Medium)).unwrap();

        assert_eq!(worker.process_pending(&MidpointTracer).unwrap(), 3);

        let mut completed = Vec::new();
        queue.drain_completed(&mut completed);
        let order: Vec<RayId> = completed.iter().map(|c| c.ray_id).collect();
        assert_eq!(order, vec![high, medium, low]);
        assert_eq!(completed[0].result.hits[0].surface_type, SurfaceTypeId(2));
    }

    #[test]
    fn test_cancelled_rays_never_complete() {
        let (mut queue, mut worker) = channel_ray_cast_queue();
        let kept = queue.queue_ray(request(1.0, RayPriority::Medium)).unwrap();
        let cancelled = queue.queue_ray(request(2.0, RayPriority::Medium)).unwrap();
        queue.cancel_ray(cancelled);

        worker.process_pending(&MidpointTracer).unwrap();

        let mut completed = Vec::new();
        queue.drain_completed(&mut completed);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].ray_id, kept);
        assert_eq!(queue.cancelled_in_flight(), 0);
    }

    #[test]
    fn test_worker_reports_disconnected_queue() {
        let (mut queue, mut worker) = channel_ray_cast_queue();
        queue.queue_ray(request(1.0, RayPriority::Medium)).unwrap();
        drop(queue);
        assert!(matches!(
            worker.process_pending(&MidpointTracer),
            Err(AuditionError::RayCast(_))
        ));
    }

    #[test]
    fn test_worker_on_separate_thread() {
        let (mut queue, worker) = channel_ray_cast_queue();
        let handle = std::thread::spawn(move || worker.run(&MidpointTracer));

        let ids: Vec<RayId> = (1..=4)
            .map(|i| queue.queue_ray(request(i as f32, RayPriority::Medium)).unwrap())
            .collect();

        let mut completed = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while completed.len() < ids.len() && Instant::now() < deadline {
            queue.drain_completed(&mut completed);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(completed.len(), ids.len());

        drop(queue);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_cancel_after_completion_was_drained_is_forgotten() {
        let (mut queue, mut worker) = channel_ray_cast_queue();
        let ray_id = queue.queue_ray(request(1.0, RayPriority::Medium)).unwrap();
        assert_eq!(queue.rays_in_flight(), 1);
        worker.process_pending(&MidpointTracer).unwrap();

        let mut completed = Vec::new();
        queue.drain_completed(&mut completed);
        assert_eq!(queue.rays_in_flight(), 0);

        queue.cancel_ray(ray_id);
        queue.cancel_ray(RayId(77));
        assert_eq!(queue.cancelled_in_flight(), 0);
    }

    #[test]
    fn test_queue_ray_fails_without_worker() {
        let (mut queue, worker) = channel_ray_cast_queue();
        drop(worker);
        assert!(matches!(
            queue.queue_ray(request(1.0, RayPriority::Medium)),
            Err(AuditionError::RayCast(_))
        ));
        assert_eq!(queue.rays_in_flight(), 0);
    }
}
