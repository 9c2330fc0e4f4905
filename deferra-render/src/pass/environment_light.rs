use deferra_render_rhi::{CommandList, Format, PipelineInfo, RenderDevice, ResourceState};
use smallvec::SmallVec;

use super::{GeometryBuffers, PassContext, draw_fullscreen, fullscreen_pipeline};
use crate::{
    command::CommandListPerFrame,
    error::Result,
    frame::FrameConstants,
    pipeline::PipelineId,
    resource::{RenderTarget, SampledTexture},
    scene::ShaderProgram,
    tracker::BarrierBatch,
};

/// Image based lighting of the G-buffers into the first intermediate color
/// buffer.
pub struct EnvironmentLightPass<D: RenderDevice> {
    commands: CommandListPerFrame<D>,
    pipeline: PipelineId,
    buffers: GeometryBuffers,
    depth: RenderTarget,
    ambient_accessibility: Option<RenderTarget>,
    diffuse_irradiance: SampledTexture,
    specular_pre_convolved: SampledTexture,
    output: RenderTarget,
}

impl<D: RenderDevice> EnvironmentLightPass<D> {
    pub fn pipeline_info(program: &ShaderProgram, color_format: Format, ambient_occlusion: bool) -> PipelineInfo {
        let shader_resource_count = if ambient_occlusion { 6 } else { 5 };
        fullscreen_pipeline(
            "Environment Light",
            program,
            color_format,
            shader_resource_count,
            size_of::<FrameConstants>() as u32,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init(
        device: &D,
        queued_frame_count: usize,
        pipeline: PipelineId,
        buffers: GeometryBuffers,
        depth: RenderTarget,
        ambient_accessibility: Option<RenderTarget>,
        diffuse_irradiance: SampledTexture,
        specular_pre_convolved: SampledTexture,
        output: RenderTarget,
    ) -> Result<Self> {
        Ok(Self {
            commands: CommandListPerFrame::new(device, queued_frame_count)?,
            pipeline,
            buffers,
            depth,
            ambient_accessibility,
            diffuse_irradiance,
            specular_pre_convolved,
            output,
        })
    }

    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        let resources = ctx.resources;

        // Binding order matches the shader.
        let mut inputs = SmallVec::<[_; 6]>::new();
        inputs.push((self.buffers.normal_smoothness.resource, self.buffers.normal_smoothness.shader_view));
        inputs.push((self.buffers.base_color_metal_mask.resource, self.buffers.base_color_metal_mask.shader_view));
        inputs.push((self.depth.resource, self.depth.shader_view));
        if let Some(accessibility) = self.ambient_accessibility {
            inputs.push((accessibility.resource, accessibility.shader_view));
        }
        inputs.push((self.diffuse_irradiance.resource, self.diffuse_irradiance.shader_view));
        inputs.push((self.specular_pre_convolved.resource, self.specular_pre_convolved.shader_view));

        let list = self.commands.reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        for (resource, _) in &inputs {
            barriers.request(ctx.tracker, *resource, ResourceState::PixelShaderResource);
        }
        barriers.request(ctx.tracker, self.output.resource, ResourceState::RenderTarget);
        barriers.record(list, resources);

        let views = inputs
            .iter()
            .map(|(_, view)| resources.view(*view))
            .collect::<SmallVec<[_; 6]>>();

        list.set_render_targets(&[resources.view(self.output.target_view)], None);
        list.set_pipeline(ctx.pipelines.get(self.pipeline));
        list.set_shader_resources(&views);
        list.set_constants(bytemuck::bytes_of(&ctx.frame.constants));
        draw_fullscreen::<D>(list);

        self.commands.submit(ctx.executor)?;
        Ok(1)
    }
}
