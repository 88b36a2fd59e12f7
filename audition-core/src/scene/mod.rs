//! Scene-side collaborators of the audition map.
//!
//! The audition map does not own any geometry. Obstruction is computed from
//! rays traced by the host, and this module defines the seams:
//!
//! 1. **RayCastQueue** - asynchronous ray submission, cancellation and completion
//! 2. **SceneRayTracer** - geometry query used by ray cast workers
//! 3. **SurfaceObstructionTable** - sound obstruction per physical surface type
//!
//! [`channel_ray_cast_queue`] wires a queue to a worker thread over channels
//! for hosts that do not already have an asynchronous ray cast service.

pub mod channel_queue;
pub mod ray_queue;
pub mod surface;

pub use channel_queue::{ChannelRayCastQueue, RayCastWorker, RayJob, channel_ray_cast_queue};
pub use ray_queue::{
    RayCastQueue, RayCastResult, RayCompletion, RayHit, RayId, RayPriority, RayRequest,
    SceneRayTracer,
};
pub use surface::{
    DEFAULT_SURFACE_OBSTRUCTION, SurfaceObstruction, SurfaceObstructionTable, SurfaceTypeId,
};
