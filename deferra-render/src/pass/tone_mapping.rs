use deferra_render_rhi::{CommandList, Format, PipelineInfo, RenderDevice, ResourceState};

use super::{PassContext, draw_fullscreen, fullscreen_pipeline};
use crate::{
    command::CommandListPerFrame, error::Result, pipeline::PipelineId, resource::RenderTarget,
    scene::ShaderProgram, tracker::BarrierBatch,
};

/// Maps the lit HDR color into the second intermediate buffer.
pub struct ToneMappingPass<D: RenderDevice> {
    commands: CommandListPerFrame<D>,
    pipeline: PipelineId,
    input: RenderTarget,
    output: RenderTarget,
}

impl<D: RenderDevice> ToneMappingPass<D> {
    pub fn pipeline_info(program: &ShaderProgram, color_format: Format) -> PipelineInfo {
        fullscreen_pipeline("Tone Mapping", program, color_format, 1, 0)
    }

    pub fn init(
        device: &D,
        queued_frame_count: usize,
        pipeline: PipelineId,
        input: RenderTarget,
        output: RenderTarget,
    ) -> Result<Self> {
        Ok(Self {
            commands: CommandListPerFrame::new(device, queued_frame_count)?,
            pipeline,
            input,
            output,
        })
    }

    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        let resources = ctx.resources;
        let list = self.commands.reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(ctx.tracker, self.input.resource, ResourceState::PixelShaderResource);
        barriers.request(ctx.tracker, self.output.resource, ResourceState::RenderTarget);
        barriers.record(list, resources);

        list.set_render_targets(&[resources.view(self.output.target_view)], None);
        list.set_pipeline(ctx.pipelines.get(self.pipeline));
        list.set_shader_resources(&[resources.view(self.input.shader_view)]);
        draw_fullscreen::<D>(list);

        self.commands.submit(ctx.executor)?;
        Ok(1)
    }
}
