//! Opens a window and renders the scene on a dedicated thread until the
//! window is closed.
//!
//! Usage: `deferra-player [settings.json]`

use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result, anyhow};
use cgmath::Rad;
use deferra_render::{
    Camera, FixedTimestep, GeometryBatch, ImportedTexture, PassShaders, RenderManager, RenderManagerHandle,
    RenderSettings, Scene, ShaderProgram, executor::CommandListExecutor,
};
use deferra_render_rhi::{
    Extent2D, Format, RenderDevice, ResourceState, TextureDimension, TextureInfo, TextureUsage,
    vulkan::{Device, DeviceCreateInfo, Instance, Library, PresentMode, Surface, SwapChain, SwapChainCreateInfo},
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowAttributes, WindowId},
};

/// Vertices of the cube every geometry batch draws.
const CUBE_VERTEX_COUNT: u32 = 36;
const CAMERA_TURN_RATE: f32 = 0.25;

#[derive(Default)]
enum PlayerState {
    #[default]
    Uninitialized,
    Running {
        // Joined before the window is dropped: the surface refers to it.
        render_thread: JoinHandle<Result<()>>,
        handle: RenderManagerHandle,
        window: Arc<Window>,
    },
    Stopped,
}

struct Player {
    settings: RenderSettings,
    state: PlayerState,
    error: Option<anyhow::Error>,
}

impl Player {
    fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            state: PlayerState::Uninitialized,
            error: None,
        }
    }

    fn start(&self, window: &Window) -> Result<(RenderManagerHandle, JoinHandle<Result<()>>)> {
        let settings = &self.settings;

        let library = Library::new()?;
        let display = window.display_handle()?.as_raw();
        let instance = Instance::new(library, display, cfg!(debug_assertions))?;

        // SAFETY: the window outlives the render thread, which owns the surface.
        let surface = unsafe { Surface::new(Arc::clone(&instance), display, window.window_handle()?.as_raw()) }?;

        let device = Arc::new(Device::new(DeviceCreateInfo::select(&instance, &surface)?)?);
        let executor = CommandListExecutor::new(&*device, device.queue())?;

        let size = window.inner_size();
        let swap_chain = SwapChain::new(
            &device,
            surface,
            executor.submission_queue(),
            SwapChainCreateInfo {
                buffer_count: settings.swap_chain_buffer_count,
                extent: Extent2D::new(size.width, size.height),
                present_mode: if settings.vsync {
                    PresentMode::Fifo
                } else {
                    PresentMode::Mailbox
                },
                format: Format::Bgra8Srgb,
            },
        )?;

        let mut manager = RenderManager::new(Arc::clone(&device), executor, swap_chain, settings.clone())?;
        manager.set_updater(FixedTimestep::new(
            settings.seconds_per_frame,
            |delta: f32, camera: &mut Camera| camera.rotate(Rad(CAMERA_TURN_RATE * delta), Rad(0.0)),
        ));
        manager.init_passes(load_scene(&device, settings)?)?;

        let handle = manager.handle();
        let render_thread = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || manager.run().context("render loop failed"))?;

        Ok((handle, render_thread))
    }

    /// Stops the render thread, if any, and keeps its error.
    fn stop(&mut self) {
        let PlayerState::Running {
            render_thread,
            handle,
            window,
        } = std::mem::replace(&mut self.state, PlayerState::Stopped)
        else {
            return;
        };

        handle.terminate();
        match render_thread.join() {
            Ok(Ok(())) => log::info!("Render thread stopped"),
            Ok(Err(error)) => {
                log::error!("{error:#}");
                self.error = Some(error);
            }
            Err(_) => self.error = Some(anyhow!("render thread panicked")),
        }

        drop(window);
    }
}

impl ApplicationHandler for Player {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.state, PlayerState::Uninitialized) {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title("Deferra Player")
            .with_inner_size(PhysicalSize::new(self.settings.window_width, self.settings.window_height))
            .with_resizable(false)
            .with_visible(true)
            .with_active(true);

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                self.error = Some(error.into());
                event_loop.exit();
                return;
            }
        };
        log::info!("Window created");

        match self.start(&window) {
            Ok((handle, render_thread)) => {
                self.state = PlayerState::Running {
                    render_thread,
                    handle,
                    window,
                };
            }
            Err(error) => {
                log::error!("Failed to start the renderer: {error:#}");
                self.error = Some(error);
                self.state = PlayerState::Stopped;
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // The render thread only finishes on its own when it failed.
        let failed = matches!(
            &self.state,
            PlayerState::Running { render_thread, .. } if render_thread.is_finished()
        );
        if failed {
            self.stop();
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Window close requested");
            self.stop();
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.stop();
    }
}

fn load_scene(device: &Device, settings: &RenderSettings) -> Result<Scene<Device>> {
    let directory = &settings.shader_directory;
    let shaders = PassShaders::load(directory, settings.ambient_occlusion.enabled)?;

    // Environment maps are left undefined until something uploads into them.
    let cube_map = |name: &'static str| -> Result<ImportedTexture<Device>> {
        let texture = device.create_texture(&TextureInfo {
            name: name.into(),
            dimension: TextureDimension::Cube,
            format: Format::Rgba16Float,
            extent: Extent2D::new(256, 256),
            mip_levels: 1,
            usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DEST,
        })?;
        Ok(ImportedTexture::new(texture, ResourceState::Undefined))
    };

    let mut scene = Scene::new(
        shaders,
        cube_map("Sky Box")?,
        cube_map("Diffuse Irradiance")?,
        cube_map("Specular Pre-Convolved")?,
    );

    let program = scene.add_geometry_program(ShaderProgram::load(directory, "geometry")?);
    scene.add_geometry(GeometryBatch::new(program, CUBE_VERTEX_COUNT, 1));
    Ok(scene)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let settings = match std::env::args_os().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            RenderSettings::load(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => {
            log::info!("No settings file given, using defaults");
            RenderSettings::default()
        }
    };

    let event_loop = EventLoop::new()?;
    let mut player = Player::new(settings);
    event_loop.run_app(&mut player)?;

    match player.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
