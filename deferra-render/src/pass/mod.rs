//! The passes a frame runs between the begin and final barriers.
//!
//! Each pass owns its pipelines and command lists, requests the transitions it
//! needs from the tracker and pushes its lists without waiting for them.

mod ambient_occlusion;
mod environment_light;
mod geometry;
mod post_process;
mod sky_box;
mod tone_mapping;

use std::borrow::Cow;

pub use ambient_occlusion::{AmbientOcclusionConstants, AmbientOcclusionPass};
pub use environment_light::EnvironmentLightPass;
pub use geometry::{GeometryBuffers, GeometryPass};
pub use post_process::PostProcessPass;
pub use sky_box::SkyBoxPass;
pub use tone_mapping::ToneMappingPass;

use deferra_render_rhi::{CommandList, DepthTest, Format, PipelineInfo, RenderDevice};
use smallvec::smallvec;

use crate::{
    error::Result, executor::CommandListExecutor, frame::FrameContext, pipeline::PipelineLibrary,
    resource::ResourceTable, scene::ShaderProgram, tracker::ResourceStateTracker,
};

/// What a pass borrows while it records.
pub struct PassContext<'a, D: RenderDevice> {
    pub frame: &'a FrameContext,
    pub resources: &'a ResourceTable<D>,
    pub pipelines: &'a PipelineLibrary<D>,
    pub tracker: &'a mut ResourceStateTracker,
    pub executor: &'a mut CommandListExecutor<D>,
}

pub enum Pass<D: RenderDevice> {
    Geometry(GeometryPass<D>),
    AmbientOcclusion(AmbientOcclusionPass<D>),
    EnvironmentLight(EnvironmentLightPass<D>),
    SkyBox(SkyBoxPass<D>),
    ToneMapping(ToneMappingPass<D>),
    PostProcess(PostProcessPass<D>),
}

impl<D: RenderDevice> Pass<D> {
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Geometry(_) => "Geometry",
            Pass::AmbientOcclusion(_) => "Ambient Occlusion",
            Pass::EnvironmentLight(_) => "Environment Light",
            Pass::SkyBox(_) => "Sky Box",
            Pass::ToneMapping(_) => "Tone Mapping",
            Pass::PostProcess(_) => "Post Process",
        }
    }

    /// Records and pushes the pass. Returns how many command lists it
    /// submitted.
    pub fn execute(&mut self, ctx: &mut PassContext<'_, D>) -> Result<u32> {
        match self {
            Pass::Geometry(pass) => pass.execute(ctx),
            Pass::AmbientOcclusion(pass) => pass.execute(ctx),
            Pass::EnvironmentLight(pass) => pass.execute(ctx),
            Pass::SkyBox(pass) => pass.execute(ctx),
            Pass::ToneMapping(pass) => pass.execute(ctx),
            Pass::PostProcess(pass) => pass.execute(ctx),
        }
    }
}

/// A pipeline drawing one full-screen triangle into a single color target.
fn fullscreen_pipeline(
    name: impl Into<Cow<'static, str>>,
    program: &ShaderProgram,
    color_format: Format,
    shader_resource_count: u32,
    constants_size: u32,
) -> PipelineInfo {
    PipelineInfo {
        name: name.into(),
        vertex: program.vertex.clone(),
        fragment: program.fragment.clone(),
        color_formats: smallvec![color_format],
        depth_format: None,
        depth_test: DepthTest::Disabled,
        shader_resource_count,
        constants_size,
    }
}

fn draw_fullscreen<D: RenderDevice>(list: &mut D::CommandList) {
    list.draw(3, 1);
}
