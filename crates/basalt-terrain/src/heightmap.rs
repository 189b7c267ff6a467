use basalt_core::glam::IVec2;
use basalt_core::ilattice::prelude::Extent;

/// An inclusive rectangle of heightmap sample coordinates.
pub type HeightRect = Extent<IVec2>;

pub fn height_rect(min: IVec2, max: IVec2) -> HeightRect {
    Extent::from_min_and_max(min, max)
}

/// Read-only access to the ground the mesh is built from.
pub trait GroundSource {
    /// Map size in heightmap squares. There is one more height sample than squares along each axis.
    fn dimensions(&self) -> IVec2;

    /// Height of the sample at `(x, z)`, where `0 <= x <= dimensions.x` and `0 <= z <= dimensions.y`.
    fn height(&self, x: i32, z: i32) -> f32;

    /// Global multiplier on the ROAM split threshold. Larger values produce a finer mesh.
    fn ground_detail(&self) -> f32;
}

/// A dense grid of height samples held in memory.
#[derive(Clone, Debug)]
pub struct HeightMap {
    dimensions: IVec2,
    heights: Vec<f32>,
    ground_detail: f32,
}

impl HeightMap {
    pub const DEFAULT_GROUND_DETAIL: f32 = 60.0;

    pub fn flat(dimensions: IVec2, height: f32) -> Self {
        Self::from_fn(dimensions, |_, _| height)
    }

    /// Samples `f(x, z)` at every corner of a `dimensions` map.
    pub fn from_fn(dimensions: IVec2, mut f: impl FnMut(i32, i32) -> f32) -> Self {
        assert!(dimensions.x > 0 && dimensions.y > 0);

        let mut heights = Vec::with_capacity(((dimensions.x + 1) * (dimensions.y + 1)) as usize);
        for z in 0..=dimensions.y {
            for x in 0..=dimensions.x {
                heights.push(f(x, z));
            }
        }
        Self {
            dimensions,
            heights,
            ground_detail: Self::DEFAULT_GROUND_DETAIL,
        }
    }

    pub fn set_ground_detail(&mut self, detail: f32) {
        self.ground_detail = detail;
    }

    pub fn set_height(&mut self, x: i32, z: i32, height: f32) {
        let i = self.sample_index(x, z);
        self.heights[i] = height;
    }

    /// Rewrites every sample in `rect` (clamped to the map) with `f(x, z, old_height)`.
    ///
    /// Returns the clamped rectangle, ready to be published as a height map change.
    pub fn modify(&mut self, rect: HeightRect, mut f: impl FnMut(i32, i32, f32) -> f32) -> HeightRect {
        let min = rect.minimum.max(IVec2::ZERO);
        let max = rect.max().min(self.dimensions);
        for z in min.y..=max.y {
            for x in min.x..=max.x {
                let i = self.sample_index(x, z);
                self.heights[i] = f(x, z, self.heights[i]);
            }
        }
        height_rect(min, max)
    }

    pub fn min_max_height(&self) -> (f32, f32) {
        self.heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }

    fn sample_index(&self, x: i32, z: i32) -> usize {
        assert!(x >= 0 && z >= 0 && x <= self.dimensions.x && z <= self.dimensions.y);
        (z * (self.dimensions.x + 1) + x) as usize
    }
}

impl GroundSource for HeightMap {
    fn dimensions(&self) -> IVec2 {
        self.dimensions
    }

    fn height(&self, x: i32, z: i32) -> f32 {
        self.heights[self.sample_index(x, z)]
    }

    fn ground_detail(&self) -> f32 {
        self.ground_detail
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn samples_include_far_edge() {
        let map = HeightMap::from_fn(IVec2::new(4, 2), |x, z| (x + 10 * z) as f32);
        assert_eq!(map.height(4, 2), 24.0);
        assert_eq!(map.height(0, 1), 10.0);
        assert_eq!(map.min_max_height(), (0.0, 24.0));
    }

    #[test]
    fn modify_clamps_to_map() {
        let mut map = HeightMap::flat(IVec2::new(8, 8), 1.0);
        let changed = map.modify(height_rect(IVec2::new(-3, 6), IVec2::new(2, 12)), |_, _, h| h + 1.0);
        assert_eq!(changed.minimum, IVec2::new(0, 6));
        assert_eq!(changed.max(), IVec2::new(2, 8));
        assert_eq!(map.height(2, 8), 2.0);
        assert_eq!(map.height(3, 8), 1.0);
    }
}
