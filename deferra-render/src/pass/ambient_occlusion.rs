use bytemuck::{Pod, Zeroable};
use deferra_render_rhi::{CommandList, Extent2D, Format, PipelineInfo, RenderDevice, ResourceState, TextureInfo};
use static_assertions::assert_eq_size;

use super::{PassContext, draw_fullscreen, fullscreen_pipeline};
use crate::{
    command::CommandListPerFrame,
    error::Result,
    pipeline::PipelineId,
    resource::{RenderTarget, ResourceTable},
    scene::OcclusionShaders,
    settings::AmbientOcclusionSettings,
    tracker::{BarrierBatch, ResourceStateTracker},
};

const ACCESSIBILITY_FORMAT: Format = Format::R16Unorm;

/// Push constants of the occlusion sub-pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AmbientOcclusionConstants {
    pub projection: [[f32; 4]; 4],
    pub sample_kernel_size: u32,
    pub noise_texture_dimension: u32,
    pub occlusion_radius: f32,
    pub ssao_power: f32,
}

assert_eq_size!(AmbientOcclusionConstants, [u8; 80]);

/// Screen-space ambient occlusion.
///
/// The occlusion sub-pass writes the accessibility buffer from the normals
/// and depth; the blur sub-pass smooths it into the blur buffer the
/// environment light samples. Each sub-pass submits its own list.
pub struct AmbientOcclusionPass<D: RenderDevice> {
    occlusion_commands: CommandListPerFrame<D>,
    blur_commands: CommandListPerFrame<D>,
    occlusion_pipeline: PipelineId,
    blur_pipeline: PipelineId,
    normal_smoothness: RenderTarget,
    depth: RenderTarget,
    accessibility: RenderTarget,
    blur: RenderTarget,
    settings: AmbientOcclusionSettings,
}

impl<D: RenderDevice> AmbientOcclusionPass<D> {
    /// The occlusion pipeline followed by the blur pipeline.
    pub fn pipeline_infos(shaders: &OcclusionShaders) -> Vec<PipelineInfo> {
        vec![
            fullscreen_pipeline(
                "Ambient Occlusion",
                &shaders.occlusion,
                ACCESSIBILITY_FORMAT,
                2,
                size_of::<AmbientOcclusionConstants>() as u32,
            ),
            fullscreen_pipeline("Ambient Occlusion Blur", &shaders.blur, ACCESSIBILITY_FORMAT, 1, 0),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init(
        device: &D,
        resources: &mut ResourceTable<D>,
        tracker: &mut ResourceStateTracker,
        queued_frame_count: usize,
        extent: Extent2D,
        settings: &AmbientOcclusionSettings,
        normal_smoothness: RenderTarget,
        depth: RenderTarget,
        pipelines: &[PipelineId],
    ) -> Result<Self> {
        let [occlusion_pipeline, blur_pipeline] = pipelines else {
            panic!("ambient occlusion takes 2 pipelines, got {}", pipelines.len());
        };

        let accessibility = resources.create_render_target(
            device,
            tracker,
            &TextureInfo::render_target("Ambient Accessibility", ACCESSIBILITY_FORMAT, extent),
        )?;
        let blur = resources.create_render_target(
            device,
            tracker,
            &TextureInfo::render_target("Ambient Accessibility Blur", ACCESSIBILITY_FORMAT, extent),
        )?;

        log::debug!(
            "Ambient occlusion uses {} kernel samples and a {}x{} noise texture",
            settings.sample_kernel_size,
            settings.noise_texture_dimension,
            settings.noise_texture_dimension
        );

        Ok(Self {
            occlusion_commands: CommandListPerFrame::new(device, queued_frame_count)?,
            blur_commands: CommandListPerFrame::new(device, queued_frame_count)?,
            occlusion_pipeline: *occlusion_pipeline,
            blur_pipeline: *blur_pipeline,
            normal_smoothness,
            depth,
            accessibility,
            blur,
            settings: settings.clone(),
        })
    }

    /// The buffer holding the blurred accessibility.
    pub fn output(&self) -> RenderTarget {
        self.blur
    }

    fn constants(&self, projection: [[f32; 4]; 4]) -> AmbientOcclusionConstants {
        AmbientOcclusionConstants {
            projection,
            sample_kernel_size: self.settings.sample_kernel_size,
            noise_texture_dimension: self.settings.noise_texture_dimension,
            occlusion_radius: self.settings.occlusion_radius,
            ssao_power: self.settings.ssao_power,
        }
    }

    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        let resources = ctx.resources;
        let constants = self.constants(ctx.frame.constants.projection);

        let list = self
            .occlusion_commands
            .reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(ctx.tracker, self.accessibility.resource, ResourceState::RenderTarget);
        barriers.request(ctx.tracker, self.normal_smoothness.resource, ResourceState::PixelShaderResource);
        barriers.request(ctx.tracker, self.depth.resource, ResourceState::PixelShaderResource);
        barriers.record(list, resources);

        let accessibility_view = resources.view(self.accessibility.target_view);
        list.clear_render_target(accessibility_view, [1.0; 4]);
        list.set_render_targets(&[accessibility_view], None);
        list.set_pipeline(ctx.pipelines.get(self.occlusion_pipeline));
        list.set_shader_resources(&[
            resources.view(self.normal_smoothness.shader_view),
            resources.view(self.depth.shader_view),
        ]);
        list.set_constants(bytemuck::bytes_of(&constants));
        draw_fullscreen::<D>(list);
        self.occlusion_commands.submit(ctx.executor)?;

        let list = self
            .blur_commands
            .reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(ctx.tracker, self.accessibility.resource, ResourceState::PixelShaderResource);
        barriers.request(ctx.tracker, self.blur.resource, ResourceState::RenderTarget);
        barriers.record(list, resources);

        let blur_view = resources.view(self.blur.target_view);
        list.clear_render_target(blur_view, [1.0; 4]);
        list.set_render_targets(&[blur_view], None);
        list.set_pipeline(ctx.pipelines.get(self.blur_pipeline));
        list.set_shader_resources(&[resources.view(self.accessibility.shader_view)]);
        draw_fullscreen::<D>(list);
        self.blur_commands.submit(ctx.executor)?;

        Ok(2)
    }
}
