//! # Audition Core
//!
//! Sound perception for game AI: a registry of listening entities and a
//! dispatcher that decides which of them hear a sound event.
//!
//! Entities register as listeners with one or more ears and a faction mask.
//! When the game emits a sound stimulus, the [`AuditionMap`] filters listeners
//! by faction and distance and delivers the stimulus to the ones in range.
//! Stimuli can optionally be checked for obstruction: one ray is cast from the
//! sound to every ear in range, and the sound only gets through if the
//! accumulated attenuation along the ray stays below 1.
//!
//! ## Quick Start
//!
//! ```no_run
//! use audition_core::*;
//! use audition_core::scene::{RayHit, SceneRayTracer, channel_ray_cast_queue};
//!
//! struct OpenField;
//!
//! impl SceneRayTracer for OpenField {
//!     fn trace_segment(&self, _start: Vec3, _end: Vec3, _hits: &mut Vec<RayHit>) {}
//! }
//!
//! // Rays are traced by a worker on its own thread
//! let (queue, worker) = channel_ray_cast_queue();
//! std::thread::spawn(move || worker.run(&OpenField));
//!
//! let mut map = AuditionMap::new(AuditionMapDesc::default(), queue)?;
//!
//! // A guard with a single ear at head height
//! map.register_listener(
//!     EntityId(1),
//!     ListenerParams::new(|heard| {
//!         println!("{} heard a sound at {}", heard.listener_entity_id, heard.stimulus.position);
//!     })
//!     .ear(Vec3::new(0.0, 0.0, 1.8))
//!     .faction_mask(FactionMask::from_factions(&[FactionId(2)])),
//! )?;
//!
//! // Gunshot that has to get past walls
//! let gunshot = SoundStimulusParams::new(Vec3::new(8.0, 3.0, 1.2), 40.0, FactionId(2))
//!     .obstruction_handling(ObstructionHandling::RayCastWithLinearFallOff);
//! map.on_sound_event(&gunshot, "gunshot");
//!
//! // Deliver resolved rays once per frame
//! map.update(1.0 / 60.0);
//! # Ok::<(), AuditionError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AuditionMap`]**: Listener registry and sound event dispatcher
//! - **[`ListenerParams`]**: Ears, faction mask, listening distance scale and callbacks of a listener
//! - **[`SoundStimulusParams`]**: A single sound event
//! - **[`RayCastManager`](ray_cast_manager::RayCastManager)**: Pending state of the ray-cast path
//! - **[`RayCastQueue`](scene::RayCastQueue)**: Asynchronous ray service provided by the host
//! - **[`SurfaceObstructionTable`](scene::SurfaceObstructionTable)**: Obstruction per surface type
//!
//! ## Threading
//!
//! The map is owned by the simulation thread and every callback runs on it.
//! Ray completions are picked up in [`AuditionMap::update`], or pushed with
//! [`AuditionMap::on_ray_cast_complete`] by hosts that complete rays on the
//! simulation thread themselves.

pub mod audition_map;
pub mod config;
pub mod error;
pub mod listener;
pub mod math;
pub mod pool;
pub mod ray_cast_manager;
pub mod scene;
pub mod types;

#[cfg(test)]
mod test_support;

pub use audition_map::{AuditionMap, EntityNameLookup, GlobalListenerParams};
pub use config::AuditionMapDesc;
pub use error::AuditionError;
pub use listener::{
    HeardSound, Listener, ListenerChangeFlags, ListenerParams, MAX_EARS_PER_LISTENER,
};
pub use math::{BoundingSphere, Vec3};
pub use types::{
    EntityId, FactionId, FactionMask, GlobalListenerId, ObstructionHandling, SoundStimulusParams,
};
