use anyhow::{Result, bail};
use audition_core::scene::{
    RayHit, SceneRayTracer, SurfaceObstruction, SurfaceObstructionTable, SurfaceTypeId,
    channel_ray_cast_queue,
};
use audition_core::{
    AuditionMap, AuditionMapDesc, EntityId, EntityNameLookup, FactionId, FactionMask,
    GlobalListenerParams, ListenerParams, ObstructionHandling, SoundStimulusParams, Vec3,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const PLAYER_FACTION: FactionId = FactionId(1);
const BRICK: SurfaceTypeId = SurfaceTypeId(7);
const GLASS: SurfaceTypeId = SurfaceTypeId(3);

/// Infinite wall in the plane `x = const`.
struct Wall {
    x: f32,
    surface_type: SurfaceTypeId,
}

/// Scene made of parallel walls, enough to show obstruction at work.
struct WallScene {
    walls: Vec<Wall>,
}

impl SceneRayTracer for WallScene {
    fn trace_segment(&self, start: Vec3, end: Vec3, hits: &mut Vec<RayHit>) {
        let delta = end - start;
        if delta.x.abs() <= f32::EPSILON {
            return;
        }
        let length = delta.length();
        for wall in &self.walls {
            let t = (wall.x - start.x) / delta.x;
            if (0.0..=1.0).contains(&t) {
                hits.push(RayHit::new(
                    t * length,
                    wall.surface_type,
                    start + delta * t,
                    Vec3::new(-delta.x.signum(), 0.0, 0.0),
                ));
            }
        }
    }
}

struct GuardNames;

impl EntityNameLookup for GuardNames {
    fn entity_name(&self, entity_id: EntityId) -> Option<String> {
        match entity_id.0 {
            1 => Some("Guard (courtyard)".to_string()),
            2 => Some("Guard (behind brick wall)".to_string()),
            3 => Some("Guard (behind window)".to_string()),
            _ => None,
        }
    }
}

pub fn run_scenarios() -> Result<()> {
    log::info!("=== Setting up audition map ===");
    let (queue, worker) = channel_ray_cast_queue();
    let scene = WallScene {
        walls: vec![
            Wall {
                x: 10.0,
                surface_type: BRICK,
            },
            Wall {
                x: -6.0,
                surface_type: GLASS,
            },
        ],
    };
    let tracer = std::thread::spawn(move || worker.run(&scene));

    let desc = AuditionMapDesc::default().max_completions_per_update(16);
    let mut map = AuditionMap::new(desc.clone(), queue)?;
    map.set_entity_name_lookup(GuardNames);
    let mut surfaces = SurfaceObstructionTable::with_presets(desc.default_surface_obstruction);
    // Thin single-pane windows
    surfaces.set(GLASS, SurfaceObstruction::GLASS * 0.5);
    map.set_surface_obstruction_table(surfaces);

    let heard_count = Arc::new(AtomicUsize::new(0));
    let guards = [
        (EntityId(1), Vec3::new(4.0, 0.0, 1.8)),
        (EntityId(2), Vec3::new(14.0, 0.0, 1.8)),
        (EntityId(3), Vec3::new(-9.0, 1.0, 1.8)),
    ];
    for (entity_id, position) in guards {
        let heard_count = heard_count.clone();
        let params = ListenerParams::new(move |heard| {
            heard_count.fetch_add(1, Ordering::Relaxed);
            log::info!(
                "{} heard a sound at {} through ear {}",
                heard.listener_entity_id,
                heard.stimulus.position,
                heard.ear_index
            );
        })
        .ears([position, position + Vec3::new(0.2, 0.0, 0.0)])
        .faction_mask(FactionMask::from_factions(&[PLAYER_FACTION]));
        map.register_listener(entity_id, params)?;
    }

    let alerts = Arc::new(AtomicUsize::new(0));
    let alerts_clone = alerts.clone();
    map.register_global_listener(
        GlobalListenerParams::new(move |stimulus| {
            alerts_clone.fetch_add(1, Ordering::Relaxed);
            log::info!("Alert level raised by sound at {}", stimulus.position);
        }),
        "alert level",
    );

    log::info!("\n=== Footstep, ignoring obstructions ===");
    let footstep = SoundStimulusParams::new(Vec3::new(0.0, 0.0, 0.0), 6.0, PLAYER_FACTION)
        .source_entity(EntityId(100));
    map.on_sound_event(&footstep, "footstep");

    log::info!("\n=== Gunshot, ray cast with linear fall-off ===");
    let gunshot = SoundStimulusParams::new(Vec3::new(0.0, 0.0, 1.5), 20.0, PLAYER_FACTION)
        .obstruction_handling(ObstructionHandling::RayCastWithLinearFallOff)
        .source_entity(EntityId(100));
    map.on_sound_event(&gunshot, "gunshot");
    log::info!("{} rays in flight", map.pending_ray_count());

    let deadline = Instant::now() + Duration::from_secs(2);
    while map.pending_ray_count() > 0 {
        if Instant::now() > deadline {
            bail!("{} rays did not complete in time", map.pending_ray_count());
        }
        std::thread::sleep(Duration::from_millis(5));
        map.update(0.005);
    }

    log::info!("\n=== Guard behind the window leaves ===");
    map.on_sound_event(&gunshot, "second gunshot");
    map.unregister_listener(EntityId(3));
    log::info!(
        "{} rays left after unregistering, {} listeners registered",
        map.pending_ray_count(),
        map.listener_count()
    );
    std::thread::sleep(Duration::from_millis(20));
    map.update(0.02);

    log::info!(
        "Done: {} deliveries, {} alerts",
        heard_count.load(Ordering::Relaxed),
        alerts.load(Ordering::Relaxed)
    );

    drop(map);
    match tracer.join() {
        Ok(result) => result?,
        Err(_) => bail!("ray cast worker panicked"),
    }
    Ok(())
}
