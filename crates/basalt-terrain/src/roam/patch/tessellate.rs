use super::Patch;
use crate::roam::pool::{NodeId, TriNodePool};

use basalt_core::glam::{IVec2, Vec3A};

/// Splits leaf `tri` into two children, first splitting its base neighbor if the two don't form a diamond.
///
/// The new children inherit the outer neighbor links and every neighbor that pointed at `tri` is repointed at the child
/// now covering the shared edge. Returns false if the pool ran out, in which case `tri` may still be a leaf.
pub fn split(pool: &TriNodePool, tri: NodeId) -> bool {
    let node = pool.node(tri);
    if node.is_branch() {
        return true;
    }

    // A triangle may only split together with the one across its hypotenuse.
    if let Some(base) = node.base_neighbor() {
        if pool.node(base).base_neighbor() != Some(tri) && !split(pool, base) {
            return false;
        }
    }
    if let Some(base) = node.base_neighbor() {
        if pool.node(base).base_neighbor() != Some(tri) {
            return false;
        }
    }

    let (left_child, right_child) = match pool.allocate_pair() {
        Ok(pair) => pair,
        Err(_) => return false,
    };
    node.set_children(left_child, right_child);

    let lc = pool.node(left_child);
    let rc = pool.node(right_child);
    lc.set_base_neighbor(node.left_neighbor());
    lc.set_left_neighbor(Some(right_child));
    rc.set_base_neighbor(node.right_neighbor());
    rc.set_right_neighbor(Some(left_child));

    if let Some(left) = node.left_neighbor() {
        pool.node(left).replace_neighbor(tri, left_child);
    }
    if let Some(right) = node.right_neighbor() {
        pool.node(right).replace_neighbor(tri, right_child);
    }

    match node.base_neighbor() {
        Some(base) => {
            let base_node = pool.node(base);
            if let Some((base_left, base_right)) = base_node.children() {
                // The diamond partner already split, so stitch the four children together.
                pool.node(base_left).set_right_neighbor(Some(right_child));
                pool.node(base_right).set_left_neighbor(Some(left_child));
                lc.set_right_neighbor(Some(base_right));
                rc.set_left_neighbor(Some(base_left));
            } else {
                // Its split will stitch onto our children.
                return split(pool, base);
            }
        }
        None => {
            // Hypotenuse on the map border.
            lc.set_right_neighbor(None);
            rc.set_left_neighbor(None);
        }
    }
    true
}

/// The error of a triangle on screen, up to a constant. A triangle splits when this exceeds the pass's split threshold:
/// one for player passes, [`PatchParams::shadow_split_threshold`](super::PatchParams) for shadow passes.
#[inline]
pub fn split_error(variance: f32, max_variance: f32, patch_size: i32, hypotenuse_extent: i32, lod_factor: f32) -> f32 {
    variance.min(max_variance) * (patch_size * hypotenuse_extent) as f32 * lod_factor
}

impl Patch {
    /// Scales split errors down with distance. One at or inside `view_radius / lod_distance_scale` from the patch
    /// center.
    pub fn lod_factor(&self, viewer: Vec3A, view_radius: f32) -> f32 {
        let distance = self.bounds().center().distance(viewer);
        let scaled = distance * self.params.lod_distance_scale / view_radius.max(f32::EPSILON);
        1.0 / scaled.max(1.0)
    }

    /// Split errors above this refine the mesh.
    pub fn split_threshold(&self, is_shadow_pass: bool) -> f32 {
        if is_shadow_pass {
            self.params.shadow_split_threshold
        } else {
            1.0
        }
    }

    /// Splits the trees of this patch until every leaf is fine enough for a viewer at `viewer`, the variance tree
    /// runs out, or the pool does. Returns false if the pool did.
    ///
    /// Forced splits reach into adjacent patches, so callers must not tessellate neighboring patches concurrently.
    pub fn tessellate(&self, pool: &TriNodePool, viewer: Vec3A, view_radius: f32, is_shadow_pass: bool) -> bool {
        let t = Tessellator {
            pool,
            patch_size: self.params.size,
            max_variance: self.params.max_variance,
            lod_factor: self.lod_factor(viewer, view_radius),
            threshold: self.split_threshold(is_shadow_pass),
        };

        let [l, r, a] = self.base_left_corners();
        let converged_left = t.recurse(&self.variance_left, self.base_left, l, r, a, 1);
        let [l, r, a] = self.base_right_corners();
        let converged_right = t.recurse(&self.variance_right, self.base_right, l, r, a, 1);

        log::trace!(
            "Tessellated patch {:?} with LOD factor {}",
            self.square(),
            t.lod_factor
        );
        converged_left && converged_right
    }
}

struct Tessellator<'a> {
    pool: &'a TriNodePool,
    patch_size: i32,
    max_variance: f32,
    lod_factor: f32,
    threshold: f32,
}

impl<'a> Tessellator<'a> {
    /// Returns false if a split failed for lack of nodes.
    fn recurse(
        &self,
        variance: &[f32],
        tri: NodeId,
        left: IVec2,
        right: IVec2,
        apex: IVec2,
        node: usize,
    ) -> bool {
        // Past the stored variance depth.
        let node_variance = match variance.get(node) {
            Some(&v) => v,
            None => return true,
        };

        let extent = (left - right).abs().max_element();
        let error = split_error(
            node_variance,
            self.max_variance,
            self.patch_size,
            extent,
            self.lod_factor,
        );
        if error <= self.threshold {
            return true;
        }

        if !split(self.pool, tri) {
            return false;
        }

        let center = (left + right) / 2;
        match self.pool.node(tri).children() {
            Some((lc, rc)) => {
                let converged_left = self.recurse(variance, lc, apex, left, center, node << 1);
                converged_left && self.recurse(variance, rc, right, apex, center, (node << 1) + 1)
            }
            None => false,
        }
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

    use crate::config::RoamConfig;
    use crate::heightmap::HeightMap;
    use crate::roam::{PatchLinks, PatchParams};

    const SIZE: i32 = 16;

    fn params() -> PatchParams {
        PatchParams::from(&RoamConfig {
            patch_size: SIZE as u32,
            variance_depth: 8,
            square_size: 1.0,
            ..Default::default()
        })
    }

    fn hills() -> HeightMap {
        HeightMap::from_fn(IVec2::splat(SIZE), |x, z| {
            ((x as f32 * 0.7).sin() + (z as f32 * 0.4).cos()) * 4.0
        })
    }

    fn lone_patch(map: &HeightMap, capacity: u32) -> (TriNodePool, Patch) {
        let pool = TriNodePool::new(1, capacity).unwrap();
        let patch = Patch::new(IVec2::ZERO, map, pool.base_pair(0), params());
        patch.reset(&pool, PatchLinks::default());
        (pool, patch)
    }

    fn count_leaves(pool: &TriNodePool, tri: NodeId) -> usize {
        match pool.node(tri).children() {
            Some((l, r)) => count_leaves(pool, l) + count_leaves(pool, r),
            None => 1,
        }
    }

    fn check_links(pool: &TriNodePool, tri: NodeId) {
        let node = pool.node(tri);
        match node.children() {
            Some((l, r)) => {
                check_links(pool, l);
                check_links(pool, r);
            }
            None => {
                // Leaves that share an edge point at each other.
                for neighbor in [node.base_neighbor(), node.left_neighbor(), node.right_neighbor()]
                    .into_iter()
                    .flatten()
                {
                    let n = pool.node(neighbor);
                    if n.is_leaf() {
                        let back = [n.base_neighbor(), n.left_neighbor(), n.right_neighbor()];
                        assert!(back.contains(&Some(tri)));
                    }
                }
            }
        }
    }

    #[test]
    fn splitting_one_base_triangle_splits_its_diamond_partner() {
        let map = hills();
        let (pool, patch) = lone_patch(&map, 64);

        assert!(split(&pool, patch.base_left()));
        assert!(pool.node(patch.base_left()).is_branch());
        assert!(pool.node(patch.base_right()).is_branch());
        assert_eq!(pool.nodes_used(), 4);

        let (bl_left, bl_right) = pool.node(patch.base_left()).children().unwrap();
        let (br_left, br_right) = pool.node(patch.base_right()).children().unwrap();
        assert_eq!(pool.node(bl_left).right_neighbor(), Some(br_right));
        assert_eq!(pool.node(bl_right).left_neighbor(), Some(br_left));
        assert_eq!(pool.node(br_left).right_neighbor(), Some(bl_right));
        assert_eq!(pool.node(br_right).left_neighbor(), Some(bl_left));

        // Splitting a grandchild forces its way back through the diamond.
        assert!(split(&pool, bl_left));
        check_links(&pool, patch.base_left());
        check_links(&pool, patch.base_right());
    }

    #[test]
    fn closer_viewers_get_finer_meshes() {
        let map = hills();
        let mut previous = usize::MAX;
        for distance in [1.0, 50.0, 500.0, 1.0e6] {
            let (pool, patch) = lone_patch(&map, 1 << 16);
            let viewer = Vec3A::new(8.0, distance, 8.0);
            assert!(patch.tessellate(&pool, viewer, 2000.0, false));
            let leaves = count_leaves(&pool, patch.base_left()) + count_leaves(&pool, patch.base_right());
            assert!(leaves <= previous);
            previous = leaves;
            check_links(&pool, patch.base_left());
            check_links(&pool, patch.base_right());
        }
        assert_eq!(previous, 2);
    }

    #[test]
    fn splitting_never_increases_error() {
        let map = hills();
        let (_pool, patch) = lone_patch(&map, 0);
        let lod = patch.lod_factor(Vec3A::new(8.0, 30.0, 8.0), 2000.0);

        for (tree, [l, r, _]) in [
            (patch.variance_left(), patch.base_left_corners()),
            (patch.variance_right(), patch.base_right_corners()),
        ] {
            let root_extent = (l - r).abs().max_element();
            // Hypotenuse extent halves every other level.
            let extent_at = |node: usize| root_extent >> ((usize::BITS - 1 - node.leading_zeros()) / 2);
            for node in 2..tree.len() {
                let parent = node / 2;
                let e_parent = split_error(tree[parent], 256.0, SIZE, extent_at(parent), lod);
                let e_child = split_error(tree[node], 256.0, SIZE, extent_at(node), lod);
                assert!(e_child <= e_parent);
            }
        }
    }

    #[test]
    fn shadow_passes_split_less() {
        let map = hills();
        let viewer = Vec3A::new(8.0, 20.0, 8.0);
        let tessellate_with = |shadow_split_threshold: f32, is_shadow_pass: bool| {
            let pool = TriNodePool::new(1, 1 << 16).unwrap();
            let patch = Patch::new(
                IVec2::ZERO,
                &map,
                pool.base_pair(0),
                PatchParams {
                    shadow_split_threshold,
                    ..params()
                },
            );
            patch.reset(&pool, PatchLinks::default());
            assert!(patch.tessellate(&pool, viewer, 2000.0, is_shadow_pass));
            check_links(&pool, patch.base_left());
            check_links(&pool, patch.base_right());
            pool.nodes_used()
        };

        let player = tessellate_with(16.0, false);
        assert!(player > 0);
        assert!(tessellate_with(16.0, true) < player);
        // With the player threshold both passes refine alike.
        assert_eq!(tessellate_with(1.0, true), player);
    }

    #[test]
    fn exhausted_pool_reports_incomplete_tessellation() {
        let map = hills();
        let (pool, patch) = lone_patch(&map, 6);
        assert!(!patch.tessellate(&pool, Vec3A::new(8.0, 1.0, 8.0), 2000.0, false));
        assert!(pool.is_exhausted());
        check_links(&pool, patch.base_left());
        check_links(&pool, patch.base_right());
    }
}
