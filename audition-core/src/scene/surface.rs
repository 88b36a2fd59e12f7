//! Sound obstruction of physical surfaces.
//!
//! Each surface a ray crosses adds its obstruction coefficient to the total
//! obstruction of the ray. A coefficient of 1.0 blocks sound completely, 0.0
//! lets it pass untouched.

use std::collections::HashMap;
use std::fmt;

/// Physics surface type identifier, as reported in ray hits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceTypeId(pub u16);

impl fmt::Display for SurfaceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceTypeId({})", self.0)
    }
}

/// Obstruction of surfaces without an explicit entry.
pub const DEFAULT_SURFACE_OBSTRUCTION: f32 = 0.5;

/// Named obstruction coefficients for common surfaces.
pub struct SurfaceObstruction;

impl SurfaceObstruction {
    pub const FOLIAGE: f32 = 0.05;
    pub const CLOTH: f32 = 0.1;
    pub const GLASS: f32 = 0.25;
    pub const WOOD: f32 = 0.35;
    pub const PLASTER: f32 = 0.45;
    pub const METAL: f32 = 0.6;
    pub const BRICK: f32 = 0.8;
    pub const CONCRETE: f32 = 0.9;
    pub const ROCK: f32 = 1.0;
}

/// Surface-type to obstruction-coefficient lookup with a fallback value.
///
/// # Example
///
/// ```
/// use audition_core::scene::{SurfaceObstruction, SurfaceObstructionTable, SurfaceTypeId};
///
/// let mut table = SurfaceObstructionTable::new(0.5);
/// table.set(SurfaceTypeId(3), SurfaceObstruction::GLASS);
///
/// assert_eq!(table.obstruction(SurfaceTypeId(3)), SurfaceObstruction::GLASS);
/// assert_eq!(table.obstruction(SurfaceTypeId(42)), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct SurfaceObstructionTable {
    entries: HashMap<SurfaceTypeId, f32>,
    default_obstruction: f32,
}

impl SurfaceObstructionTable {
    /// Create an empty table. `default_obstruction` is clamped to `[0, 1]`.
    pub fn new(default_obstruction: f32) -> Self {
        Self {
            entries: HashMap::new(),
            default_obstruction: default_obstruction.clamp(0.0, 1.0),
        }
    }

    /// Creates a table pre-loaded with the [`SurfaceObstruction`] presets.
    ///
    /// Surface type ids are assigned in the following order:
    /// - 1: FOLIAGE
    /// - 2: CLOTH
    /// - 3: GLASS
    /// - 4: WOOD
    /// - 5: PLASTER
    /// - 6: METAL
    /// - 7: BRICK
    /// - 8: CONCRETE
    /// - 9: ROCK
    pub fn with_presets(default_obstruction: f32) -> Self {
        let mut table = Self::new(default_obstruction);
        let presets = [
            SurfaceObstruction::FOLIAGE,
            SurfaceObstruction::CLOTH,
            SurfaceObstruction::GLASS,
            SurfaceObstruction::WOOD,
            SurfaceObstruction::PLASTER,
            SurfaceObstruction::METAL,
            SurfaceObstruction::BRICK,
            SurfaceObstruction::CONCRETE,
            SurfaceObstruction::ROCK,
        ];
        for (id, obstruction) in (1u16..).zip(presets) {
            table.set(SurfaceTypeId(id), obstruction);
        }
        table
    }

    /// Sets the obstruction of a surface type, clamped to `[0, 1]`.
    pub fn set(&mut self, surface_type: SurfaceTypeId, obstruction: f32) {
        self.entries
            .insert(surface_type, obstruction.clamp(0.0, 1.0));
    }

    /// Obstruction of `surface_type`, or the default when it has no entry.
    pub fn obstruction(&self, surface_type: SurfaceTypeId) -> f32 {
        self.entries
            .get(&surface_type)
            .copied()
            .unwrap_or(self.default_obstruction)
    }

    /// Get the obstruction used for surfaces without an entry.
    pub fn default_obstruction(&self) -> f32 {
        self.default_obstruction
    }

    /// Number of surfaces with an explicit entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no surface has an explicit entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SurfaceObstructionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_OBSTRUCTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_surface_falls_back_to_default() {
        let table = SurfaceObstructionTable::new(0.7);
        assert_eq!(table.obstruction(SurfaceTypeId(12)), 0.7);
    }

    #[test]
    fn test_values_are_clamped() {
        let mut table = SurfaceObstructionTable::new(3.0);
        assert_eq!(table.default_obstruction(), 1.0);
        table.set(SurfaceTypeId(1), -0.5);
        assert_eq!(table.obstruction(SurfaceTypeId(1)), 0.0);
    }

    #[test]
    fn test_presets() {
        let table = SurfaceObstructionTable::with_presets(DEFAULT_SURFACE_OBSTRUCTION);
        assert_eq!(table.len(), 9);
        assert_eq!(table.obstruction(SurfaceTypeId(3)), SurfaceObstruction::GLASS);
        assert_eq!(table.obstruction(SurfaceTypeId(9)), SurfaceObstruction::ROCK);
        assert_eq!(table.obstruction(SurfaceTypeId(0)), DEFAULT_SURFACE_OBSTRUCTION);
    }
}
