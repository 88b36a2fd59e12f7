//! Math types for the audition map

pub use glam::Vec3;

/// Sphere enclosing every ear of a listener.
///
/// Used as a cheap proxy when deciding whether any ear could possibly be in
/// range of a stimulus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Degenerate sphere at the origin, used for listeners without ears.
    pub const EMPTY: Self = Self {
        center: Vec3::ZERO,
        radius: 0.0,
    };

    /// Builds a sphere around `points`.
    ///
    /// The center is the center of the points' axis-aligned bounding box (not
    /// their centroid). The radius is the distance to the furthest point plus
    /// `noise_buffer`, which absorbs floating point error in later range tests.
    pub fn around_points(points: &[Vec3], noise_buffer: f32) -> Self {
        let Some((first, rest)) = points.split_first() else {
            return Self::EMPTY;
        };

        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        let center = (min + max) * 0.5;

        let furthest_sq = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0f32, f32::max);

        Self {
            center,
            radius: furthest_sq.sqrt() + noise_buffer,
        }
    }

    /// Check whether `point` lies inside or on the sphere.
    pub fn contains(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::EMPTY
    }
}
