use basalt::basalt_terrain::basalt_core::glam::{IVec2, Vec3};
use basalt::basalt_terrain::gpu::recording::RecordingDevice;
use basalt::basalt_terrain::gpu::{GpuCapabilities, GpuDevice, ProgramHandle, TextureDesc, TextureFormat};
use basalt::basalt_terrain::{
    height_rect, CameraKind, DrawPass, EventHub, FrustumCamera, GroundSource, HeightMap, MeshDrawer, TerrainEvent,
    TessResources,
};
use basalt::{Config, MeshDrawerKind, TerrainMesh};

#[derive(Debug, structopt::StructOpt)]
#[structopt(name = "flyover", about = "Flies a camera over synthetic terrain and reports level-of-detail statistics")]
struct CommandLineOptions {
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    config_file: Option<std::path::PathBuf>,

    /// Map side length in heightmap squares.
    #[structopt(short = "s", long = "size", default_value = "512")]
    map_size: i32,

    #[structopt(short = "f", long = "frames", default_value = "240")]
    frames: u32,

    /// Raise a crater under the camera every N frames. Zero disables edits.
    #[structopt(short = "e", long = "edit_every", default_value = "60")]
    edit_every: u32,

    #[structopt(long = "tessellated")]
    tessellated: bool,

    #[structopt(long = "single_threaded")]
    single_threaded: bool,

    #[structopt(long = "altitude", default_value = "600")]
    altitude: f32,
}

fn synthetic_map(size: i32) -> HeightMap {
    HeightMap::from_fn(IVec2::splat(size), |x, z| {
        let (x, z) = (x as f32, z as f32);
        let hills = 120.0 * (x * 0.021).sin() * (z * 0.017).cos();
        let ridges = 40.0 * ((x + z) * 0.07).sin().abs();
        let noise = 6.0 * ((x * 12.9898 + z * 78.233).sin() * 43758.545).fract();
        hills + ridges + noise
    })
}

fn main() {
    if std::env::var("CARGO_MANIFEST_DIR").is_ok() {
        std::env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::init();

    let command_line = {
        use structopt::StructOpt;
        CommandLineOptions::from_args()
    };

    let mut config = match &command_line.config_file {
        Some(path) => Config::read_file(path).expect("failed to read config"),
        None => Config::default(),
    };
    if command_line.tessellated {
        config.drawer = MeshDrawerKind::Tessellated;
    }

    let mut map = synthetic_map(command_line.map_size);
    let mut device = RecordingDevice::new(GpuCapabilities::all());
    let height_texture = device.create_texture(TextureDesc {
        width: command_line.map_size as u32 + 1,
        height: command_line.map_size as u32 + 1,
        levels: 1,
        format: TextureFormat::R32Float,
    });
    let resources = TessResources {
        tessellation_program: ProgramHandle(1),
        variance_program: ProgramHandle(2),
        height_texture,
    };

    let mut mesh =
        TerrainMesh::new(&config, &map, &mut device, Some(resources)).expect("failed to build terrain mesh");
    if let TerrainMesh::Roam(drawer) = &mut mesh {
        for kind in [CameraKind::Player, CameraKind::Shadow] {
            drawer
                .grid_mut(kind)
                .set_use_threads(!command_line.single_threaded);
        }
    }

    let mut events = EventHub::default();
    let subscription = events.subscribe(mesh.event_mask());
    events.publish(TerrainEvent::ViewResized {
        width: 1920,
        height: 1080,
    });

    let square_size = match mesh.kind() {
        MeshDrawerKind::Roam => config.roam.square_size,
        MeshDrawerKind::Tessellated => config.tess.square_size,
    };
    let world_size = command_line.map_size as f32 * square_size;
    let sun = FrustumCamera::look_at(
        CameraKind::Shadow,
        Vec3::new(0.0, 4.0 * world_size, 0.0),
        Vec3::new(0.5 * world_size, 0.0, 0.5 * world_size),
        0.8,
        1.0,
        1.0,
        16.0 * world_size,
    );

    let mut total_draws = 0;
    for frame in 0..command_line.frames {
        let t = frame as f32 / command_line.frames.max(1) as f32;
        let eye = Vec3::new(
            world_size * (0.1 + 0.8 * t),
            command_line.altitude,
            world_size * (0.5 + 0.3 * (t * std::f32::consts::TAU).sin()),
        );
        let target = eye + Vec3::new(world_size * 0.2, -command_line.altitude, 0.0);
        let player = FrustumCamera::look_at(CameraKind::Player, eye, target, 1.0, 16.0 / 9.0, 1.0, 4.0 * world_size);

        if command_line.edit_every > 0 && frame > 0 && frame % command_line.edit_every == 0 {
            let center = IVec2::new((eye.x / square_size) as i32, (eye.z / square_size) as i32);
            let rect = map.modify(height_rect(center - IVec2::splat(6), center + IVec2::splat(6)), |x, z, h| {
                let d = ((x - center.x).pow(2) + (z - center.y).pow(2)) as f32;
                h - 30.0 * (-d / 18.0).exp()
            });
            events.publish(TerrainEvent::HeightMapChanged(rect));
        }
        for event in events.drain(&subscription) {
            mesh.handle_event(&map, &event);
        }

        mesh.update(&map, &player, &mut device);
        mesh.draw_mesh(&map, &sun, &mut device, DrawPass::Shadow);
        mesh.draw_mesh(&map, &player, &mut device, DrawPass::Normal);
        mesh.draw_border_mesh(&mut device, DrawPass::Normal);

        total_draws += device.count_commands(|c| c.is_draw());
        device.clear_commands();
    }

    let dims = map.dimensions();
    let (min_height, max_height) = map.min_max_height();
    log::info!(
        "{} frames over a {}x{} map (heights {:.1}..{:.1}) with the {:?} drawer, {} draw calls",
        command_line.frames,
        dims.x,
        dims.y,
        min_height,
        max_height,
        mesh.kind(),
        total_draws,
    );
    match &mesh {
        TerrainMesh::Roam(drawer) => {
            for kind in [CameraKind::Player, CameraKind::Shadow] {
                let stats = drawer.stats(kind);
                log::info!(
                    "{:?}: {} passes, {} us average, last pass {} / {} nodes over {} visible patches{}",
                    kind,
                    stats.timer.passes_completed(),
                    stats.timer.average_time_us(),
                    stats.nodes_used,
                    stats.node_capacity,
                    stats.visible_patches,
                    if stats.exhausted { ", pool exhausted" } else { "" },
                );
            }
        }
        TerrainMesh::Tessellated(drawer) => {
            log::info!(
                "{:?} capture backend, {} variance levels",
                drawer.cache().backend_kind(),
                drawer.cache().variance_pass().level_dims().len(),
            );
        }
    }
    log::info!("{} minimap patches darkened", mesh.draw_in_minimap().darkened.len());

    mesh.release(&mut device);
}
