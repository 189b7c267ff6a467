use super::Patch;
use crate::heightmap::GroundSource;

use basalt_core::glam::IVec2;
use std::mem;

/// Variance never drops below this, so flat ground still splits when the viewer is close enough.
pub(super) const MIN_VARIANCE: f32 = 0.001;

impl Patch {
    /// Rebuilds both variance trees and the height range from the current ground heights, and clears the dirty flag.
    ///
    /// A tree is stored as an implicit binary heap: the base triangle is node 1 and node `n` has children `2n` and
    /// `2n + 1`. A node's variance is the larger of its children's and the vertical distance between the height at its
    /// hypotenuse midpoint and the average of the hypotenuse endpoints.
    pub fn compute_variance(&mut self, ground: &dyn GroundSource) {
        let num_nodes = 1 << self.params.variance_depth;

        let mut left = mem::take(&mut self.variance_left);
        let mut right = mem::take(&mut self.variance_right);
        left.clear();
        left.resize(num_nodes, 0.0);
        right.clear();
        right.resize(num_nodes, 0.0);

        let builder = VarianceBuilder {
            ground,
            origin: self.coords,
        };
        let [l, r, a] = self.base_left_corners();
        builder.recurse(&mut left, l, r, a, 1);
        let [l, r, a] = self.base_right_corners();
        builder.recurse(&mut right, l, r, a, 1);

        self.variance_left = left;
        self.variance_right = right;

        self.refresh_height_range();
        self.is_dirty = false;
    }
}

struct VarianceBuilder<'a> {
    ground: &'a dyn GroundSource,
    origin: IVec2,
}

impl<'a> VarianceBuilder<'a> {
    fn height(&self, p: IVec2) -> f32 {
        let p = self.origin + p;
        self.ground.height(p.x, p.y)
    }

    fn recurse(&self, out: &mut [f32], left: IVec2, right: IVec2, apex: IVec2, node: usize) -> f32 {
        let center = (left + right) / 2;
        let expected = 0.5 * (self.height(left) + self.height(right));
        let mut variance = (self.height(center) - expected).abs();

        let first_child = node << 1;
        if first_child < out.len() {
            variance = variance.max(self.recurse(out, apex, left, center, first_child));
            variance = variance.max(self.recurse(out, right, apex, center, first_child + 1));
        }

        let variance = variance.max(MIN_VARIANCE);
        out[node] = variance;
        variance
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
