use deferra_render_rhi::{CommandList, DepthTest, Format, PipelineInfo, RenderDevice, ResourceState};
use smallvec::smallvec;

use super::PassContext;
use crate::{
    command::CommandListPerFrame,
    error::Result,
    frame::FrameConstants,
    pipeline::PipelineId,
    resource::{RenderTarget, SampledTexture},
    scene::ShaderProgram,
    tracker::BarrierBatch,
};

/// A unit cube drawn as 12 triangles.
const CUBE_VERTEX_COUNT: u32 = 36;

/// Draws the sky box cube map behind everything the geometry pass left in
/// the depth buffer.
pub struct SkyBoxPass<D: RenderDevice> {
    commands: CommandListPerFrame<D>,
    pipeline: PipelineId,
    sky_box: SampledTexture,
    output: RenderTarget,
    depth: RenderTarget,
}

impl<D: RenderDevice> SkyBoxPass<D> {
    pub fn pipeline_info(program: &ShaderProgram, color_format: Format, depth_format: Format) -> PipelineInfo {
        PipelineInfo {
            name: "Sky Box".into(),
            vertex: program.vertex.clone(),
            fragment: program.fragment.clone(),
            color_formats: smallvec![color_format],
            depth_format: Some(depth_format),
            depth_test: DepthTest::LessEqualRead,
            shader_resource_count: 1,
            constants_size: size_of::<FrameConstants>() as u32,
        }
    }

    pub fn init(
        device: &D,
        queued_frame_count: usize,
        pipeline: PipelineId,
        sky_box: SampledTexture,
        output: RenderTarget,
        depth: RenderTarget,
    ) -> Result<Self> {
        Ok(Self {
            commands: CommandListPerFrame::new(device, queued_frame_count)?,
            pipeline,
            sky_box,
            output,
            depth,
        })
    }

    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        let resources = ctx.resources;
        let list = self.commands.reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(ctx.tracker, self.sky_box.resource, ResourceState::PixelShaderResource);
        barriers.request(ctx.tracker, self.output.resource, ResourceState::RenderTarget);
        barriers.request(ctx.tracker, self.depth.resource, ResourceState::DepthWrite);
        barriers.record(list, resources);

        list.set_render_targets(
            &[resources.view(self.output.target_view)],
            Some(resources.view(self.depth.target_view)),
        );
        list.set_pipeline(ctx.pipelines.get(self.pipeline));
        list.set_shader_resources(&[resources.view(self.sky_box.shader_view)]);
        list.set_constants(bytemuck::bytes_of(&ctx.frame.constants));
        list.draw(CUBE_VERTEX_COUNT, 1);

        self.commands.submit(ctx.executor)?;
        Ok(1)
    }
}
