use deferra_render_rhi::{
    CommandList, DepthTest, Extent2D, Format, PipelineInfo, RenderDevice, ResourceState, TextureInfo,
};
use smallvec::smallvec;

use super::PassContext;
use crate::{
    command::CommandListPerFrame,
    error::Result,
    frame::FrameConstants,
    pipeline::PipelineId,
    resource::{RenderTarget, ResourceTable},
    scene::{GeometryBatch, ShaderProgram},
    tracker::{BarrierBatch, ResourceStateTracker},
};

const NORMAL_SMOOTHNESS_FORMAT: Format = Format::Rgba16Float;
const BASE_COLOR_METAL_MASK_FORMAT: Format = Format::Rgba8Unorm;

/// The G-buffers the geometry pass writes and the lighting passes sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuffers {
    pub normal_smoothness: RenderTarget,
    pub base_color_metal_mask: RenderTarget,
}

/// Rasterizes the scene into the G-buffers and the depth buffer.
pub struct GeometryPass<D: RenderDevice> {
    commands: CommandListPerFrame<D>,
    buffers: GeometryBuffers,
    depth: RenderTarget,
    batches: Vec<(PipelineId, GeometryBatch)>,
}

impl<D: RenderDevice> GeometryPass<D> {
    /// One pipeline per geometry program, in program order.
    pub fn pipeline_infos(programs: &[ShaderProgram], depth_format: Format) -> Vec<PipelineInfo> {
        programs
            .iter()
            .enumerate()
            .map(|(index, program)| PipelineInfo {
                name: format!("Geometry {index}").into(),
                vertex: program.vertex.clone(),
                fragment: program.fragment.clone(),
                color_formats: smallvec![NORMAL_SMOOTHNESS_FORMAT, BASE_COLOR_METAL_MASK_FORMAT],
                depth_format: Some(depth_format),
                depth_test: DepthTest::LessEqualWrite,
                shader_resource_count: 0,
                constants_size: size_of::<FrameConstants>() as u32,
            })
            .collect()
    }

    /// `pipelines` are the ids of [`GeometryPass::pipeline_infos`], indexed
    /// by program.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        device: &D,
        resources: &mut ResourceTable<D>,
        tracker: &mut ResourceStateTracker,
        queued_frame_count: usize,
        extent: Extent2D,
        depth: RenderTarget,
        batches: &[GeometryBatch],
        pipelines: &[PipelineId],
    ) -> Result<Self> {
        let buffers = GeometryBuffers {
            normal_smoothness: resources.create_render_target(
                device,
                tracker,
                &TextureInfo::render_target("Normal Smoothness", NORMAL_SMOOTHNESS_FORMAT, extent),
            )?,
            base_color_metal_mask: resources.create_render_target(
                device,
                tracker,
                &TextureInfo::render_target("Base Color Metal Mask", BASE_COLOR_METAL_MASK_FORMAT, extent),
            )?,
        };

        let batches = batches
            .iter()
            .map(|batch| (pipelines[batch.program], *batch))
            .collect::<Vec<_>>();
        log::debug!("Geometry pass draws {} batches", batches.len());

        Ok(Self {
            commands: CommandListPerFrame::new(device, queued_frame_count)?,
            buffers,
            depth,
            batches,
        })
    }

    pub fn buffers(&self) -> GeometryBuffers {
        self.buffers
    }

    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        let GeometryBuffers {
            normal_smoothness,
            base_color_metal_mask,
        } = self.buffers;
        let resources = ctx.resources;

        let list = self.commands.reset_with_next_allocator(ctx.executor.gate_mut(), None)?;

        let mut barriers = BarrierBatch::new();
        barriers.request(ctx.tracker, normal_smoothness.resource, ResourceState::RenderTarget);
        barriers.request(ctx.tracker, base_color_metal_mask.resource, ResourceState::RenderTarget);
        barriers.request(ctx.tracker, self.depth.resource, ResourceState::DepthWrite);
        barriers.record(list, resources);

        let normal_view = resources.view(normal_smoothness.target_view);
        let base_color_view = resources.view(base_color_metal_mask.target_view);
        list.clear_render_target(normal_view, [0.0; 4]);
        list.clear_render_target(base_color_view, [0.0; 4]);
        list.set_render_targets(
            &[normal_view, base_color_view],
            Some(resources.view(self.depth.target_view)),
        );

        let constants = bytemuck::bytes_of(&ctx.frame.constants);
        for (pipeline, batch) in &self.batches {
            list.set_pipeline(ctx.pipelines.get(*pipeline));
            list.set_constants(constants);
            list.draw(batch.vertex_count, batch.instance_count);
        }

        self.commands.submit(ctx.executor)?;
        Ok(1)
    }
}
