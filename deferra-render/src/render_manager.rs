use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use deferra_render_rhi::{CommandList, PipelineInfo, RenderDevice, ResourceState, SwapChain, TextureInfo};
use smallvec::SmallVec;

use crate::{
    command::CommandListPerFrame,
    error::Result,
    executor::CommandListExecutor,
    frame::{Camera, FrameContext, FrameTimer, FrameUpdater},
    pass::{
        AmbientOcclusionPass, EnvironmentLightPass, GeometryPass, Pass, PassContext, PostProcessPass,
        SkyBoxPass, ToneMappingPass,
    },
    pipeline::PipelineLibrary,
    resource::{BackBuffer, RenderTarget, ResourceTable},
    scene::Scene,
    settings::RenderSettings,
    sync::SyncStats,
    tracker::{BarrierBatch, ResourceStateTracker},
};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// What one call to [`RenderManager::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_number: u64,
    pub back_buffer_index: u32,
    /// Lists submitted, including the begin and final lists.
    pub command_lists: u32,
    /// Fence value signaled after the present.
    pub present_fence_value: u64,
    /// Fence value the present waited for: the oldest of the last
    /// `queued_frame_count` present signals, this one included. 0 until that
    /// many presents happened.
    pub throttle_fence_value: u64,
}

/// Stops a running [`RenderManager`] from another thread.
#[derive(Debug, Clone)]
pub struct RenderManagerHandle {
    terminate: Arc<AtomicBool>,
}

impl RenderManagerHandle {
    /// The loop exits after presenting the frame it is recording.
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }
}

/// Drives the frame loop.
///
/// Every frame clears the back buffer, the intermediate color buffers and the
/// depth buffer, runs the passes, transitions the back buffer for
/// presentation and presents. Up to `queued_frame_count` frames are in
/// flight: presenting frame N waits for the GPU to finish frame N - K.
pub struct RenderManager<D: RenderDevice> {
    // Fields drop in declaration order. Everything that records or owns GPU
    // objects goes before the swap chain, the executor and the device.
    passes: Vec<Pass<D>>,
    begin_commands: CommandListPerFrame<D>,
    final_commands: CommandListPerFrame<D>,
    pipelines: PipelineLibrary<D>,
    resources: ResourceTable<D>,
    back_buffers: SmallVec<[BackBuffer; 4]>,
    intermediate_color_1: RenderTarget,
    intermediate_color_2: RenderTarget,
    depth: RenderTarget,
    tracker: ResourceStateTracker,
    swap_chain: D::SwapChain,
    executor: CommandListExecutor<D>,
    device: Arc<D>,

    settings: RenderSettings,
    camera: Camera,
    updater: Box<dyn FrameUpdater>,
    timer: FrameTimer,
    fence_by_queued_frame: SmallVec<[u64; 4]>,
    queued_frame_index: usize,
    frame_number: u64,
    passes_initialized: bool,
    terminate: Arc<AtomicBool>,
    shut_down: bool,
}

impl<D: RenderDevice> RenderManager<D> {
    /// Creates the frame-wide render targets and imports the back buffers.
    ///
    /// The manager renders at the swap chain extent. No pass runs until
    /// [`RenderManager::init_passes`] is called.
    pub fn new(
        device: Arc<D>,
        executor: CommandListExecutor<D>,
        swap_chain: D::SwapChain,
        settings: RenderSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let extent = swap_chain.extent();
        let queued_frame_count = settings.queued_frame_count as usize;
        if swap_chain.buffer_count() != settings.swap_chain_buffer_count {
            log::warn!(
                "Swap chain has {} buffers, {} requested",
                swap_chain.buffer_count(),
                settings.swap_chain_buffer_count
            );
        }

        let mut tracker = ResourceStateTracker::new();
        let mut resources = ResourceTable::new();

        let initial_state = swap_chain.initial_state();
        let mut back_buffers = SmallVec::new();
        for index in 0..swap_chain.buffer_count() {
            let texture = swap_chain.back_buffer(index)?;
            back_buffers.push(resources.import_back_buffer(&*device, &mut tracker, index, texture, initial_state)?);
        }

        let color_format = settings.color_buffer_format;
        let intermediate_color_1 = resources.create_render_target(
            &*device,
            &mut tracker,
            &TextureInfo::render_target("Intermediate Color 1", color_format, extent),
        )?;
        let intermediate_color_2 = resources.create_render_target(
            &*device,
            &mut tracker,
            &TextureInfo::render_target("Intermediate Color 2", color_format, extent),
        )?;
        let depth = resources.create_render_target(
            &*device,
            &mut tracker,
            &TextureInfo::depth_stencil("Depth", settings.depth_format, extent),
        )?;

        log::info!(
            "Render manager ready: {}x{}, {} back buffers, {queued_frame_count} queued frames",
            extent.width,
            extent.height,
            back_buffers.len()
        );

        Ok(Self {
            passes: Vec::new(),
            begin_commands: CommandListPerFrame::new(&*device, queued_frame_count)?,
            final_commands: CommandListPerFrame::new(&*device, queued_frame_count)?,
            pipelines: PipelineLibrary::default(),
            resources,
            back_buffers,
            intermediate_color_1,
            intermediate_color_2,
            depth,
            tracker,
            swap_chain,
            executor,
            device,
            camera: Camera::from_settings(&settings, extent.aspect_ratio()),
            settings,
            updater: Box::new(|_: f32, _: &mut Camera| {}),
            timer: FrameTimer::new(),
            fence_by_queued_frame: SmallVec::from_elem(0, queued_frame_count),
            queued_frame_index: 0,
            frame_number: 0,
            passes_initialized: false,
            terminate: Arc::new(AtomicBool::new(false)),
            shut_down: false,
        })
    }

    pub fn handle(&self) -> RenderManagerHandle {
        RenderManagerHandle {
            terminate: Arc::clone(&self.terminate),
        }
    }

    /// Replaces the collaborator that moves the camera once per frame.
    pub fn set_updater(&mut self, updater: impl FrameUpdater + 'static) {
        self.updater = Box::new(updater);
    }

    /// Imports the scene, builds every pipeline and creates the passes.
    ///
    /// Ambient occlusion runs when the scene carries its shaders.
    ///
    /// # Panics
    ///
    /// Panics if called twice or after the first frame.
    pub fn init_passes(&mut self, scene: Scene<D>) -> Result<()> {
        assert!(!self.passes_initialized, "passes initialized twice");
        assert_eq!(self.frame_number, 0, "passes must be initialized before the first frame");
        self.passes_initialized = true;

        let Scene {
            shaders,
            geometry_programs,
            geometry,
            sky_box,
            diffuse_irradiance,
            specular_pre_convolved,
        } = scene;

        let ambient_occlusion = shaders.ambient_occlusion.is_some();
        if ambient_occlusion != self.settings.ambient_occlusion.enabled {
            log::warn!(
                "Ambient occlusion is {} in the settings but the scene shaders decide: {}",
                enabled(self.settings.ambient_occlusion.enabled),
                enabled(ambient_occlusion)
            );
        }

        let device = &*self.device;
        let tracker = &mut self.tracker;
        let resources = &mut self.resources;

        let sky_box = resources.import_sampled(device, tracker, "Sky Box", sky_box.texture, sky_box.state)?;
        let diffuse_irradiance = resources.import_sampled(
            device,
            tracker,
            "Diffuse Irradiance",
            diffuse_irradiance.texture,
            diffuse_irradiance.state,
        )?;
        let specular_pre_convolved = resources.import_sampled(
            device,
            tracker,
            "Specular Pre-Convolved",
            specular_pre_convolved.texture,
            specular_pre_convolved.state,
        )?;

        let color_format = self.settings.color_buffer_format;
        let depth_format = self.settings.depth_format;

        let mut infos = Vec::new();
        let geometry_pipelines = enqueue(&mut infos, GeometryPass::<D>::pipeline_infos(&geometry_programs, depth_format));
        let occlusion_pipelines = shaders
            .ambient_occlusion
            .as_ref()
            .map(|shaders| enqueue(&mut infos, AmbientOcclusionPass::<D>::pipeline_infos(shaders)));
        let environment_pipeline = enqueue(
            &mut infos,
            [EnvironmentLightPass::<D>::pipeline_info(
                &shaders.environment_light,
                color_format,
                ambient_occlusion,
            )],
        );
        let sky_box_pipeline = enqueue(
            &mut infos,
            [SkyBoxPass::<D>::pipeline_info(&shaders.sky_box, color_format, depth_format)],
        );
        let tone_mapping_pipeline = enqueue(
            &mut infos,
            [ToneMappingPass::<D>::pipeline_info(&shaders.tone_mapping, color_format)],
        );
        let post_process_pipeline = enqueue(
            &mut infos,
            [PostProcessPass::<D>::pipeline_info(&shaders.post_process, self.swap_chain.format())],
        );

        let (pipelines, ids) = PipelineLibrary::build(device, &infos, self.settings.worker_threads)?;
        log::info!("Built {} pipelines", pipelines.len());

        let queued_frame_count = self.settings.queued_frame_count as usize;
        let extent = self.swap_chain.extent();

        let geometry_pass = GeometryPass::init(
            device,
            resources,
            tracker,
            queued_frame_count,
            extent,
            self.depth,
            &geometry,
            &ids[geometry_pipelines],
        )?;
        let buffers = geometry_pass.buffers();

        let occlusion_pass = match occlusion_pipelines {
            Some(range) => Some(AmbientOcclusionPass::init(
                device,
                resources,
                tracker,
                queued_frame_count,
                extent,
                &self.settings.ambient_occlusion,
                buffers.normal_smoothness,
                self.depth,
                &ids[range],
            )?),
            None => None,
        };

        let environment_pass = EnvironmentLightPass::init(
            device,
            queued_frame_count,
            ids[environment_pipeline.start],
            buffers,
            self.depth,
            occlusion_pass.as_ref().map(AmbientOcclusionPass::output),
            diffuse_irradiance,
            specular_pre_convolved,
            self.intermediate_color_1,
        )?;
        let sky_box_pass = SkyBoxPass::init(
            device,
            queued_frame_count,
            ids[sky_box_pipeline.start],
            sky_box,
            self.intermediate_color_1,
            self.depth,
        )?;
        let tone_mapping_pass = ToneMappingPass::init(
            device,
            queued_frame_count,
            ids[tone_mapping_pipeline.start],
            self.intermediate_color_1,
            self.intermediate_color_2,
        )?;
        let post_process_pass = PostProcessPass::init(
            device,
            queued_frame_count,
            ids[post_process_pipeline.start],
            self.intermediate_color_2,
        )?;

        self.passes.push(Pass::Geometry(geometry_pass));
        if let Some(pass) = occlusion_pass {
            self.passes.push(Pass::AmbientOcclusion(pass));
        }
        self.passes.push(Pass::EnvironmentLight(environment_pass));
        self.passes.push(Pass::SkyBox(sky_box_pass));
        self.passes.push(Pass::ToneMapping(tone_mapping_pass));
        self.passes.push(Pass::PostProcess(post_process_pass));
        self.pipelines = pipelines;

        log::debug!(
            "Pass pipeline: {}",
            self.passes.iter().map(Pass::name).collect::<Vec<_>>().join(" -> ")
        );
        Ok(())
    }

    /// Records, submits and presents one frame.
    pub fn render_frame(&mut self) -> Result<FrameStats> {
        let (delta_seconds, elapsed_seconds) = self.timer.tick();
        self.updater.update(delta_seconds, &mut self.camera);

        let back_buffer_index = self.swap_chain.current_back_buffer_index();
        let back_buffer = self.back_buffers[back_buffer_index as usize];
        let frame = FrameContext {
            frame_number: self.frame_number,
            constants: self.camera.constants(),
            delta_seconds,
            elapsed_seconds,
            back_buffer_index,
            back_buffer,
        };
        log::trace!("Frame {} into back buffer {back_buffer_index}", self.frame_number);

        let mut command_lists = self.begin_pass(back_buffer)?;

        let mut ctx = PassContext {
            frame: &frame,
            resources: &self.resources,
            pipelines: &self.pipelines,
            tracker: &mut self.tracker,
            executor: &mut self.executor,
        };
        for pass in &mut self.passes {
            let submitted = pass.execute(&mut ctx)?;
            log::trace!("{} pass submitted {submitted} command lists", pass.name());
            command_lists += submitted;
        }

        command_lists += self.final_pass(back_buffer)?;
        let (present_fence_value, throttle_fence_value) = self.present()?;

        let stats = FrameStats {
            frame_number: self.frame_number,
            back_buffer_index,
            command_lists,
            present_fence_value,
            throttle_fence_value,
        };
        self.frame_number += 1;
        Ok(stats)
    }

    /// Brings the frame-wide targets to their writable states and clears
    /// them. Waits for the GPU before returning.
    fn begin_pass(&mut self, back_buffer: BackBuffer) -> Result<u32> {
        let list = self
            .begin_commands
            .reset_with_next_allocator(self.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(&mut self.tracker, back_buffer.resource, ResourceState::RenderTarget);
        barriers.request(&mut self.tracker, self.intermediate_color_1.resource, ResourceState::RenderTarget);
        barriers.request(&mut self.tracker, self.intermediate_color_2.resource, ResourceState::RenderTarget);
        barriers.request(&mut self.tracker, self.depth.resource, ResourceState::DepthWrite);
        barriers.record(list, &self.resources);

        list.clear_render_target(self.resources.view(back_buffer.target_view), CLEAR_COLOR);
        list.clear_render_target(self.resources.view(self.intermediate_color_1.target_view), CLEAR_COLOR);
        list.clear_render_target(self.resources.view(self.intermediate_color_2.target_view), CLEAR_COLOR);
        list.clear_depth_stencil(self.resources.view(self.depth.target_view), 1.0, 0);

        self.begin_commands.submit_and_wait(&mut self.executor)?;
        Ok(1)
    }

    /// Transitions the back buffer for presentation. Submits nothing if it
    /// is already there.
    fn final_pass(&mut self, back_buffer: BackBuffer) -> Result<u32> {
        let mut barriers = BarrierBatch::new();
        barriers.request(&mut self.tracker, back_buffer.resource, ResourceState::Present);
        if barriers.is_empty() {
            return Ok(0);
        }

        let list = self
            .final_commands
            .reset_with_next_allocator(self.executor.gate_mut(), None)?;
        barriers.record(list, &self.resources);
        self.final_commands.submit_and_wait(&mut self.executor)?;
        Ok(1)
    }

    /// Presents, then waits until at most `queued_frame_count` frames are in
    /// flight. Returns the signaled value and the value waited for.
    fn present(&mut self) -> Result<(u64, u64)> {
        self.swap_chain
            .present(self.executor.submission_queue(), self.settings.sync_interval())?;

        let queued_frame_count = self.fence_by_queued_frame.len();
        self.fence_by_queued_frame[self.queued_frame_index] = self.executor.gate().next_value();
        self.queued_frame_index = (self.queued_frame_index + 1) % queued_frame_count;

        let oldest = self.fence_by_queued_frame[self.queued_frame_index];
        let signaled = self.executor.signal_and_wait(oldest)?;
        Ok((signaled, oldest))
    }

    /// Renders until [`RenderManagerHandle::terminate`] is called, then shuts
    /// down.
    pub fn run(&mut self) -> Result<()> {
        log::info!("Render loop started");
        while !self.terminate.load(Ordering::Acquire) {
            self.render_frame()?;
        }

        log::info!("Render loop stopped after {} frames", self.frame_number);
        self.shutdown()
    }

    /// Waits for the GPU to finish everything submitted. Only the first call
    /// does anything.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        self.executor.flush()?;
        self.shut_down = true;
        log::debug!("GPU queue drained, {:?}", self.executor.gate().stats());
        Ok(())
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.executor.gate().stats()
    }

    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    pub fn resources(&self) -> &ResourceTable<D> {
        &self.resources
    }

    pub fn pipelines(&self) -> &PipelineLibrary<D> {
        &self.pipelines
    }

    pub fn back_buffers(&self) -> &[BackBuffer] {
        &self.back_buffers
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

impl<D: RenderDevice> Drop for RenderManager<D> {
    fn drop(&mut self) {
        if self.shut_down || std::thread::panicking() {
            return;
        }

        if let Err(error) = self.executor.flush() {
            log::error!("Failed to drain the GPU queue: {error}");
        }
    }
}

fn enqueue(infos: &mut Vec<PipelineInfo>, more: impl IntoIterator<Item = PipelineInfo>) -> Range<usize> {
    let start = infos.len();
    infos.extend(more);
    start..infos.len()
}

fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use deferra_render_rhi::{
        Extent2D, Format,
        mock::{MockDevice, MockEvent, MockGpuMode},
    };

    use super::*;
    use crate::testing;

    fn manager(
        device: &Arc<MockDevice>,
        buffer_count: u32,
        queued_frame_count: u32,
    ) -> RenderManager<MockDevice> {
        let settings = RenderSettings {
            swap_chain_buffer_count: buffer_count,
            queued_frame_count,
            ..Default::default()
        };
        let executor = CommandListExecutor::new(&**device, device.create_queue()).unwrap();
        let swap_chain = device.create_swap_chain(buffer_count, Format::Bgra8Unorm, Extent2D::new(64, 32));
        RenderManager::new(Arc::clone(device), executor, swap_chain, settings).unwrap()
    }

    fn count(device: &MockDevice, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        device.count_events(predicate)
    }

    /// Checks every barrier the GPU saw changes state and starts where the
    /// previous barrier of the same texture ended.
    fn assert_barriers_are_consistent(device: &MockDevice) {
        let mut states = HashMap::new();
        for event in device.events() {
            if let MockEvent::Barrier { texture, before, after } = event {
                assert_ne!(before, after, "redundant barrier on texture {texture}");
                if let Some(previous) = states.insert(texture, after) {
                    assert_eq!(previous, before, "texture {texture} was not in {before:?}");
                }
            }
        }
    }

    #[test]
    fn test_empty_pipeline_cycles_back_buffers() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 2, 1);

        let indices = (0..5)
            .map(|_| manager.render_frame().unwrap().back_buffer_index)
            .collect::<Vec<_>>();

        assert_eq!(indices, [0, 1, 0, 1, 0]);
        assert_eq!(count(&device, |event| matches!(event, MockEvent::ClearDepthStencil { .. })), 5);
        assert_eq!(count(&device, |event| matches!(event, MockEvent::ClearRenderTarget { .. })), 15);

        let presented = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Present { back_buffer } => Some(back_buffer),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(presented, [0, 1, 0, 1, 0]);
        assert_barriers_are_consistent(&device);
    }

    #[test]
    fn test_begin_elides_barriers_already_in_place() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);

        let first = manager.render_frame().unwrap();
        // Back buffer, both intermediates and depth, then the final barrier.
        assert_eq!(count(&device, |event| matches!(event, MockEvent::Barrier { .. })), 5);
        assert_eq!(first.command_lists, 2);

        device.clear_events();
        manager.render_frame().unwrap();
        // The intermediates and depth are still writable.
        assert_eq!(count(&device, |event| matches!(event, MockEvent::Barrier { .. })), 2);
        assert_eq!(
            manager.tracker().state(manager.back_buffers()[1].resource),
            ResourceState::Present
        );
    }

    #[test]
    fn test_terminate_finishes_frame_then_drains_once() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);

        let handle = manager.handle();
        let frames = Arc::new(Mutex::new(0));
        manager.set_updater({
            let frames = Arc::clone(&frames);
            move |_: f32, _: &mut Camera| {
                let mut frames = frames.lock().unwrap();
                *frames += 1;
                if *frames == 3 {
                    handle.terminate();
                }
            }
        });

        manager.run().unwrap();

        assert_eq!(*frames.lock().unwrap(), 3);
        assert_eq!(count(&device, |event| matches!(event, MockEvent::Present { .. })), 3);
        // A begin and a final drain per frame, then the shutdown drain.
        assert_eq!(manager.sync_stats().drains, 2 * 3 + 1);

        let events = device.events();
        let last_present = events
            .iter()
            .rposition(|event| matches!(event, MockEvent::Present { .. }))
            .unwrap();
        let signals_after_present = events[last_present..]
            .iter()
            .filter(|event| matches!(event, MockEvent::Signal { .. }))
            .count();
        // The bounded present wait, then the drain.
        assert_eq!(signals_after_present, 2);

        device.clear_events();
        manager.shutdown().unwrap();
        drop(manager);
        assert_eq!(count(&device, |event| matches!(event, MockEvent::Signal { .. })), 0);
    }

    #[test]
    fn test_drop_drains_unfinished_manager() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 2, 1);
        manager.render_frame().unwrap();

        device.clear_events();
        drop(manager);

        assert_eq!(count(&device, |event| matches!(event, MockEvent::Signal { .. })), 1);
    }

    #[test]
    fn test_full_pipeline_over_several_frames() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);
        manager.init_passes(testing::scene(&device, true)).unwrap();

        assert_eq!(manager.pass_count(), 6);
        // Two geometry programs, occlusion and blur, then one per pass.
        assert_eq!(manager.pipelines().len(), 8);

        for _ in 0..4 {
            let stats = manager.render_frame().unwrap();
            // Begin, geometry, two occlusion lists, four passes, final.
            assert_eq!(stats.command_lists, 9);
        }

        assert_barriers_are_consistent(&device);
        assert_eq!(
            count(&device, |event| matches!(event, MockEvent::Draw { vertex_count: 3, .. })),
            4 * 5
        );
        assert_eq!(
            count(&device, |event| matches!(event, MockEvent::Draw { vertex_count: 36, .. })),
            4 * 2
        );
        assert_eq!(
            count(&device, |event| matches!(
                event,
                MockEvent::SetShaderResources { textures } if textures.len() == 6
            )),
            4
        );
        assert_eq!(count(&device, |event| matches!(event, MockEvent::SetConstants { size: 80 })), 4);

        manager.shutdown().unwrap();
    }

    #[test]
    fn test_pipeline_without_ambient_occlusion() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);
        manager.init_passes(testing::scene(&device, false)).unwrap();

        assert_eq!(manager.pass_count(), 5);

        let stats = manager.render_frame().unwrap();
        assert_eq!(stats.command_lists, 7);
        assert_eq!(
            count(&device, |event| matches!(
                event,
                MockEvent::SetShaderResources { textures } if textures.len() == 5
            )),
            1
        );
        assert_barriers_are_consistent(&device);
    }

    #[test]
    fn test_manual_gpu_completion_drives_the_loop() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Manual));
        let mut manager = manager(&device, 3, 2);

        // Begin and final lists drain, so something has to complete the
        // pending signals.
        let completer = {
            let device = Arc::clone(&device);
            let handle = manager.handle();
            std::thread::spawn(move || {
                while !handle.is_terminated() {
                    device.complete_all();
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                device.complete_all();
            })
        };

        for _ in 0..4 {
            manager.render_frame().unwrap();
        }
        manager.shutdown().unwrap();
        manager.handle().terminate();
        completer.join().unwrap();

        assert_eq!(manager.frame_number(), 4);
        assert_barriers_are_consistent(&device);
    }

    #[test]
    fn test_present_waits_for_the_oldest_queued_frame() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Manual));
        let mut manager = manager(&device, 3, 2);

        let completer = {
            let device = Arc::clone(&device);
            let handle = manager.handle();
            std::thread::spawn(move || {
                while !handle.is_terminated() {
                    device.complete_all();
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                device.complete_all();
            })
        };

        // Begin, final and present each signal once per frame.
        let fences = (0..3)
            .map(|_| {
                let stats = manager.render_frame().unwrap();
                (stats.present_fence_value, stats.throttle_fence_value)
            })
            .collect::<Vec<_>>();
        manager.shutdown().unwrap();
        manager.handle().terminate();
        completer.join().unwrap();

        assert_eq!(fences, [(3, 0), (6, 3), (9, 6)]);

        let signals = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Signal { value, .. } => Some(value),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(signals, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_present_blocks_until_the_oldest_queued_frame_completes() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);
        manager.render_frame().unwrap();

        // The first present after this leaves its signal pending, and the
        // second one has to wait for it.
        device.set_mode(MockGpuMode::Manual);
        let (pending, waited_for) = manager.present().unwrap();
        assert_eq!((pending, waited_for), (4, 3));
        let waits = manager.sync_stats().waits;

        let completer = {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                device.complete_up_to(pending);
            })
        };

        let (signaled, waited_for) = manager.present().unwrap();
        completer.join().unwrap();

        assert_eq!((signaled, waited_for), (5, pending));
        assert_eq!(manager.sync_stats().waits, waits + 1);
        assert_eq!(manager.executor.gate().completed_value(), pending);

        device.set_mode(MockGpuMode::Immediate);
        device.complete_all();
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn test_init_passes_twice_panics() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let mut manager = manager(&device, 3, 2);
        manager.init_passes(testing::scene(&device, false)).unwrap();
        manager.init_passes(testing::scene(&device, false)).unwrap();
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let device = Arc::new(MockDevice::new(MockGpuMode::Immediate));
        let settings = RenderSettings {
            swap_chain_buffer_count: 2,
            queued_frame_count: 2,
            ..Default::default()
        };
        let executor = CommandListExecutor::new(&*device, device.create_queue()).unwrap();
        let swap_chain = device.create_swap_chain(2, Format::Bgra8Unorm, Extent2D::new(64, 32));

        let result = RenderManager::new(Arc::clone(&device), executor, swap_chain, settings);

        assert!(matches!(result, Err(crate::error::RenderError::Settings(_))));
    }
}
