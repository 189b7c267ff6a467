use super::{BorderEdges, Patch};
use crate::roam::pool::{NodeId, TriNodePool};

use basalt_core::glam::IVec2;

/// A vertex of the border skirt: opaque white at the terrain edge, fading to transparent at the bottom.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BorderVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

const SKIRT_TOP_COLOR: [u8; 4] = [255, 255, 255, 255];
const SKIRT_BOTTOM_COLOR: [u8; 4] = [255, 255, 255, 0];

impl Patch {
    /// Rebuilds the index list from the leaves of both trees, and the border skirts if the patch touches the map edge.
    ///
    /// Every triangle is emitted as `apex, left, right`, which winds counter-clockwise seen from above. The patch only
    /// needs a new upload if the lists differ from the previous ones.
    pub fn generate_indices(&mut self, pool: &TriNodePool) {
        let mut indices = Vec::with_capacity(self.indices.len());
        let mut border = Vec::with_capacity(self.border_vertices.len());

        let mut emit = |apex: IVec2, left: IVec2, right: IVec2| {
            let size = self.params.size;
            indices.extend([
                Self::vertex_index(size, apex.x, apex.y),
                Self::vertex_index(size, left.x, left.y),
                Self::vertex_index(size, right.x, right.y),
            ]);
            if self.border_edges.any() {
                // Directed edges of a counter-clockwise triangle have the outside on the same side.
                for (from, to) in [(apex, left), (left, right), (right, apex)] {
                    if self.is_border_edge(from, to) {
                        self.push_skirt(&mut border, from, to);
                    }
                }
            }
        };

        let [l, r, a] = self.base_left_corners();
        visit_leaves(pool, self.base_left, l, r, a, &mut emit);
        let [l, r, a] = self.base_right_corners();
        visit_leaves(pool, self.base_right, l, r, a, &mut emit);

        if indices != self.indices || border != self.border_vertices {
            self.indices = indices;
            self.border_vertices = border;
            self.indices_changed = true;
        }
    }

    fn is_border_edge(&self, from: IVec2, to: IVec2) -> bool {
        let s = self.params.size;
        let e = self.border_edges;
        (e.contains(BorderEdges::LEFT) && from.x == 0 && to.x == 0)
            || (e.contains(BorderEdges::RIGHT) && from.x == s && to.x == s)
            || (e.contains(BorderEdges::TOP) && from.y == 0 && to.y == 0)
            || (e.contains(BorderEdges::BOTTOM) && from.y == s && to.y == s)
    }

    /// Two triangles hanging from the edge `from -> to` down to the skirt height, facing away from the map.
    fn push_skirt(&self, out: &mut Vec<BorderVertex>, from: IVec2, to: IVec2) {
        let size = self.params.size;
        let top = |p: IVec2| BorderVertex {
            position: self.vertices[Self::vertex_index(size, p.x, p.y) as usize],
            color: SKIRT_TOP_COLOR,
        };
        let bottom = |p: IVec2| {
            let [x, _, z] = self.vertices[Self::vertex_index(size, p.x, p.y) as usize];
            BorderVertex {
                position: [x, self.params.skirt_height, z],
                color: SKIRT_BOTTOM_COLOR,
            }
        };
        out.extend([top(from), bottom(from), top(to), top(to), bottom(from), bottom(to)]);
    }
}

fn visit_leaves(
    pool: &TriNodePool,
    tri: NodeId,
    left: IVec2,
    right: IVec2,
    apex: IVec2,
    emit: &mut impl FnMut(IVec2, IVec2, IVec2),
) {
    match pool.node(tri).children() {
        Some((lc, rc)) => {
            let center = (left + right) / 2;
            visit_leaves(pool, lc, apex, left, center, emit);
            visit_leaves(pool, rc, right, apex, center, emit);
        }
        None => emit(apex, left, right),
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
    use crate::gpu::recording::{GpuCommand, RecordingDevice};
    use crate::gpu::GpuCapabilities;
    use crate::heightmap::{height_rect, HeightMap};
    use crate::roam::{PatchLinks, PatchParams};

    use basalt_core::glam::{Vec3, Vec3A};

    const SIZE: i32 = 8;

    fn tessellated_patch() -> (TriNodePool, Patch) {
        let map = HeightMap::from_fn(IVec2::splat(SIZE), |x, z| (x * z % 4) as f32);
        let params = PatchParams::from(&RoamConfig {
            patch_size: SIZE as u32,
            square_size: 2.0,
            ..Default::default()
        });
        let pool = TriNodePool::new(1, 1 << 12).unwrap();
        let mut patch = Patch::new(IVec2::ZERO, &map, pool.base_pair(0), params);
        patch.reset(&pool, PatchLinks::default());
        assert!(patch.tessellate(&pool, Vec3A::new(8.0, 2.0, 8.0), 2000.0, false));
        patch.generate_indices(&pool);
        (pool, patch)
    }

    fn position(patch: &Patch, i: u32) -> Vec3 {
        Vec3::from(patch.vertices()[i as usize])
    }

    #[test]
    fn triangles_face_up_and_cover_the_patch() {
        let (_pool, patch) = tessellated_patch();
        assert!(patch.indices().len() > 6);
        assert_eq!(patch.indices().len() % 3, 0);

        let mut area = 0.0;
        for tri in patch.indices().chunks(3) {
            let [a, b, c] = [position(&patch, tri[0]), position(&patch, tri[1]), position(&patch, tri[2])];
            let up = (b - a).cross(c - a).y;
            assert!(up > 0.0);
            area += 0.5 * up;
        }
        // Projected areas add up to the patch footprint (8 squares of 2 world units).
        assert!((area - 16.0 * 16.0).abs() < 1e-3);
    }

    #[test]
    fn corner_patch_gets_skirts_facing_outward() {
        let (_pool, patch) = tessellated_patch();
        let skirts = patch.border_vertices();
        assert!(!skirts.is_empty());
        assert_eq!(skirts.len() % 6, 0);

        let center = Vec3::new(8.0, 0.0, 8.0);
        for tri in skirts.chunks(3) {
            let [a, b, c] = [
                Vec3::from(tri[0].position),
                Vec3::from(tri[1].position),
                Vec3::from(tri[2].position),
            ];
            let normal = (b - a).cross(c - a);
            let mid = (a + b + c) / 3.0;
            let outward = Vec3::new(mid.x - center.x, 0.0, mid.z - center.z);
            assert!(normal.dot(outward) > 0.0);
        }
        assert!(skirts.iter().any(|v| v.position[1] == -400.0 && v.color[3] == 0));
    }

    #[test]
    fn upload_is_skipped_when_nothing_changed() {
        let (mut pool, mut patch) = tessellated_patch();
        let mut device = RecordingDevice::new(GpuCapabilities::default());
        assert!(patch.upload(&mut device));
        assert!(!patch.upload(&mut device));

        // Same trees, same lists.
        patch.generate_indices(&pool);
        device.clear_commands();
        assert!(!patch.upload(&mut device));
        assert!(device.commands().is_empty());

        // A distant viewer only needs the base triangles.
        pool.reset_all();
        patch.reset(&pool, PatchLinks::default());
        assert!(patch.tessellate(&pool, Vec3A::new(8.0, 1.0e6, 8.0), 2000.0, false));
        patch.generate_indices(&pool);
        assert_eq!(patch.indices().len(), 6);
        assert!(patch.upload(&mut device));
        // Vertices didn't change, so only the index and skirt buffers are written.
        assert_eq!(
            device.count_commands(|c| matches!(c, GpuCommand::WriteBuffer { .. })),
            2
        );

        patch.draw(&mut device);
        patch.draw_border(&mut device);
        assert_eq!(device.count_commands(GpuCommand::is_draw), 2);
    }

    #[test]
    fn height_edit_on_the_border_refreshes_skirts() {
        let (pool, mut patch) = tessellated_patch();
        let mut device = RecordingDevice::new(GpuCapabilities::default());
        assert!(patch.upload(&mut device));

        let mut map = HeightMap::from_fn(IVec2::splat(SIZE), |x, z| (x * z % 4) as f32);
        let rect = map.modify(height_rect(IVec2::ZERO, IVec2::ZERO), |_, _, _| 7.0);
        patch.update_height_map(&map, rect);
        let indices = patch.indices().to_vec();
        patch.generate_indices(&pool);
        assert_eq!(patch.indices(), &indices[..]);
        assert!(patch.border_vertices().iter().any(|v| v.position == [0.0, 7.0, 0.0]));

        device.clear_commands();
        assert!(patch.upload(&mut device));
        assert_eq!(
            device.count_commands(|c| matches!(c, GpuCommand::WriteBuffer { .. })),
            3
        );
    }
}
