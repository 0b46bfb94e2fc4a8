//! Cardpalace - corridor viewer

use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use cardpalace::atlas::{ImageFileTileSource, ProceduralTileSource};
use cardpalace::card::{CardSource, cards_from_json};
use cardpalace::coordinator::{OptimizationCoordinator, PalaceConfig, corridor_extent};
use cardpalace::core::{
    camera::Camera,
    logging,
    time::FrameTimer,
};
use cardpalace::core::error::Error;
use cardpalace::geometry::GeometryPool;
use cardpalace::render::{CardBatchGpu, CardPipeline, DEPTH_FORMAT, GpuContext, ViewerBuffer};

/// Walking speed of the automatic fly-through (units per second)
const FLY_SPEED: f32 = 2.5;

/// Eye height above the corridor floor
const EYE_HEIGHT: f32 = 1.6;

const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.08, g: 0.08, b: 0.1, a: 1.0 };

/// Words shown when no list is given on the command line
const BUILTIN_WORDS: &[(&str, &str, &str, &str)] = &[
    ("apple", "яблоко", "ˈæp.əl", "An apple a day keeps the doctor away."),
    ("house", "дом", "haʊs", "The house stands at the end of the street."),
    ("river", "река", "ˈrɪv.ər", "The river froze in January."),
    ("window", "окно", "ˈwɪn.doʊ", "Open the window, please."),
    ("bread", "хлеб", "bred", "She bakes bread every morning."),
    ("mountain", "гора", "ˈmaʊn.tən", "We climbed the mountain at dawn."),
    ("book", "книга", "bʊk", "This book is about memory."),
    ("chair", "стул", "tʃer", "Pull up a chair."),
    ("cloud", "облако", "klaʊd", "A cloud covered the sun."),
    ("key", "ключ", "kiː", "I lost my key again."),
    ("garden", "сад", "ˈɡɑːr.dən", "The garden is full of roses."),
    ("bridge", "мост", "brɪdʒ", "The bridge crosses the bay."),
    ("candle", "свеча", "ˈkæn.dəl", "Light a candle in the dark."),
    ("forest", "лес", "ˈfɔːr.ɪst", "Wolves live in the forest."),
    ("mirror", "зеркало", "ˈmɪr.ər", "The mirror is cracked."),
    ("letter", "письмо", "ˈlet.ər", "He wrote her a letter."),
];

/// Ping-pong walk down the corridor centre line
struct FlyThrough {
    near_z: f32,
    far_z: f32,
    z: f32,
    direction: f32,
}

impl FlyThrough {
    fn new(near_z: f32, far_z: f32) -> Self {
        Self { near_z, far_z, z: near_z, direction: -1.0 }
    }

    fn advance(&mut self, dt: f32, camera: &mut Camera) {
        self.z += self.direction * FLY_SPEED * dt;
        if self.z <= self.far_z {
            self.z = self.far_z;
            self.direction = 1.0;
        } else if self.z >= self.near_z {
            self.z = self.near_z;
            self.direction = -1.0;
        }
        camera.position = glam::Vec3::new(0.0, EYE_HEIGHT, self.z);
        let target = camera.position + glam::Vec3::new(0.0, 0.0, self.direction * 10.0);
        camera.face(target, glam::Vec3::Y);
    }
}

/// GPU objects created once the window exists
struct RenderResources {
    viewer: ViewerBuffer,
    pipeline: CardPipeline,
    batch: CardBatchGpu,
}

struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    resources: Option<RenderResources>,
    camera: Camera,
    timer: FrameTimer,
    coordinator: OptimizationCoordinator,
    // Outlives the coordinator's render group
    _pool: GeometryPool,
    fly: FlyThrough,
}

impl App {
    fn new(coordinator: OptimizationCoordinator, pool: GeometryPool, card_count: usize) -> Self {
        let (first_z, last_z) = corridor_extent(card_count, &coordinator.config().layout);
        // Start one pair before the entrance and stop at the last pair
        let near_z = first_z + coordinator.config().layout.spacing;
        Self {
            window: None,
            gpu: None,
            resources: None,
            camera: Camera::look_at(
                glam::Vec3::new(0.0, EYE_HEIGHT, near_z),
                glam::Vec3::new(0.0, EYE_HEIGHT, last_z),
                glam::Vec3::Y,
            ),
            timer: FrameTimer::new(),
            coordinator,
            _pool: pool,
            fly: FlyThrough::new(near_z, last_z),
        }
    }

    fn render(&mut self) {
        let (Some(gpu), Some(resources)) = (&self.gpu, &mut self.resources) else {
            return;
        };

        if let Some(group) = self.coordinator.render_group_mut() {
            resources.batch.sync(&gpu.queue, group);
        }
        resources.viewer.update(&gpu.queue, &self.camera);

        let frame = match gpu.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping frame: {}", e);
                return;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        resources.pipeline.render(
            &mut encoder,
            &view,
            gpu.depth_view(),
            &resources.viewer,
            &resources.batch,
            CLEAR_COLOR,
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn update_title(&self) {
        if let Some(window) = &self.window {
            let metrics = self.coordinator.metrics();
            let lod = self.coordinator.lod().last_stats();
            window.set_title(&format!(
                "Cardpalace - {:.1} FPS | {} cards | draw calls {} | textures {} | geometries {} | atlas {}px | H/M/L {}/{}/{} culled {}",
                self.timer.fps(),
                metrics.instance_count,
                metrics.draw_calls,
                metrics.texture_count,
                metrics.geometry_count,
                metrics.atlas_size,
                lod.per_level[0],
                lod.per_level[1],
                lod.per_level[2],
                lod.culled,
            ));
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.resources = None;
        self.coordinator.dispose();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Cardpalace")
            .with_inner_size(PhysicalSize::new(1280, 720));

        let window = Arc::new(event_loop.create_window(window_attrs).expect("Failed to create window"));

        let gpu = pollster::block_on(GpuContext::new(window.clone()))
            .expect("Failed to create GPU context");

        let size = window.inner_size();
        self.camera.set_aspect(size.width as f32, size.height as f32);
        log::info!("Window created: {}x{}", size.width, size.height);

        let viewer = ViewerBuffer::new(&gpu.device);
        let pipeline = CardPipeline::new(&gpu.device, &viewer, gpu.format(), DEPTH_FORMAT);
        let group = self.coordinator.render_group_mut().expect("Coordinator not initialized");
        let batch = CardBatchGpu::new(&gpu.device, &gpu.queue, &pipeline, group)
            .expect("Failed to upload card batch");

        self.window = Some(window);
        self.resources = Some(RenderResources { viewer, pipeline, batch });
        self.gpu = Some(gpu);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent { physical_key: PhysicalKey::Code(KeyCode::Escape), state: ElementState::Pressed, .. },
                ..
            } => {
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(gpu) = &mut self.gpu {
                        gpu.resize(size.width, size.height);
                        self.camera.set_aspect(size.width as f32, size.height as f32);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.timer.tick();
                let dt = self.timer.delta_secs();

                self.fly.advance(dt, &mut self.camera);
                if let Err(e) = self.coordinator.update(dt, &self.camera) {
                    log::error!("LOD update failed: {}", e);
                }

                self.render();
                self.update_title();

                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    logging::init();
    log::info!("Cardpalace starting...");

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_path_arg(&args, "--config", "-c") {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            PalaceConfig::from_json_file(&path).expect("Failed to read config")
        }
        None => PalaceConfig::default(),
    };
    let cards = match parse_path_arg(&args, "--words", "-w") {
        Some(path) => {
            log::info!("Loading words from: {}", path.display());
            let text = std::fs::read_to_string(&path).expect("Failed to read word list");
            cards_from_json(&text).expect("Failed to parse word list")
        }
        None => builtin_cards(),
    };
    let images = parse_path_arg(&args, "--images", "-i");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    let mut pool = GeometryPool::new();
    let mut coordinator = OptimizationCoordinator::new(config);
    let built = runtime.block_on(async {
        match &images {
            Some(root) => {
                coordinator
                    .initialize(&mut pool, &ImageFileTileSource::new(root.clone()), &cards)
                    .await
                    .map(|init| init.metrics)
            }
            None => {
                coordinator
                    .initialize(&mut pool, &ProceduralTileSource, &cards)
                    .await
                    .map(|init| init.metrics)
            }
        }
    });

    match built {
        Ok(metrics) => log::info!(
            "Built corridor: {} cards, {} draw call(s), {}px atlas, {} placeholder tile(s)",
            metrics.instance_count,
            metrics.draw_calls,
            metrics.atlas_size,
            metrics.placeholder_count
        ),
        Err(Error::CapacityExceeded { item_count, surface_size, .. }) => {
            log::error!(
                "{} cards do not fit a {}px atlas even at reduced size; use a shorter word list or smaller tiles",
                item_count,
                surface_size
            );
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("Failed to build corridor: {}", e);
            std::process::exit(1);
        }
    }

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App::new(coordinator, pool, cards.len());

    event_loop.run_app(&mut app).expect("Event loop error");
}

fn builtin_cards() -> Vec<CardSource> {
    BUILTIN_WORDS
        .iter()
        .map(|(word, translation, transcription, example)| CardSource {
            transcription: transcription.to_string(),
            example: example.to_string(),
            ..CardSource::new(*word, *translation)
        })
        .collect()
}

/// Parse a `--flag <path>` argument from the command line
fn parse_path_arg(args: &[String], long: &str, short: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}
