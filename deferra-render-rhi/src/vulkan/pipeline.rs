use std::sync::Arc;

use ash::vk;

use crate::{
    Result,
    types::{DepthTest, PipelineInfo, ShaderBlob},
    vulkan::{AshHandle, DebugWrapper, VkHandle, device::RawDevice},
};

/// A shader module that only lives until its pipeline is built.
struct ShaderModule<'a> {
    device: &'a RawDevice,
    module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    fn new(device: &'a RawDevice, blob: &ShaderBlob) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(blob.words());
        let module = unsafe { device.ash_handle().create_shader_module(&create_info, None) }?;
        Ok(Self { device, module })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.ash_handle().destroy_shader_module(self.module, None);
        }
    }
}

/// A graphics pipeline with its layout.
///
/// Set 0 holds `shader_resource_count` combined image samplers updated with
/// push descriptors.
pub struct Pipeline {
    device: Arc<RawDevice>,
    pipeline: DebugWrapper<vk::Pipeline>,
    layout: vk::PipelineLayout,
    set_layout: vk::DescriptorSetLayout,
    constants_size: u32,
    shader_resource_count: u32,
}

pub(crate) const CONSTANTS_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

impl Pipeline {
    pub(crate) fn new(device: Arc<RawDevice>, info: &PipelineInfo) -> Result<Self> {
        // Destroying null handles is a no-op, so a partially built pipeline
        // cleans up after itself when an error returns early.
        let mut pipeline = Self {
            device: Arc::clone(&device),
            pipeline: DebugWrapper(vk::Pipeline::null()),
            layout: vk::PipelineLayout::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            constants_size: info.constants_size,
            shader_resource_count: info.shader_resource_count,
        };

        let ash_device = device.ash_handle();

        let bindings = (0..info.shader_resource_count)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            })
            .collect::<Vec<_>>();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
            .bindings(&bindings);
        pipeline.set_layout = unsafe { ash_device.create_descriptor_set_layout(&set_layout_info, None) }?;

        let set_layouts = [pipeline.set_layout];
        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: CONSTANTS_STAGES,
            offset: 0,
            size: info.constants_size,
        }];
        let used_ranges: &[vk::PushConstantRange] = if info.constants_size > 0 {
            &push_constant_ranges[..]
        } else {
            &[]
        };
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(used_ranges);
        pipeline.layout = unsafe { ash_device.create_pipeline_layout(&layout_info, None) }?;

        let vertex = ShaderModule::new(&device, &info.vertex)?;
        let fragment = ShaderModule::new(&device, &info.fragment)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex.module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let (depth_test, depth_write) = match info.depth_test {
            DepthTest::Disabled => (false, false),
            DepthTest::LessEqualWrite => (true, true),
            DepthTest::LessEqualRead => (true, false),
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let blend_attachments = info
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect::<Vec<_>>();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = info
            .color_formats
            .iter()
            .map(|format| format.to_vk())
            .collect::<Vec<_>>();
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(
                info.depth_format
                    .map(|format| format.to_vk())
                    .unwrap_or(vk::Format::UNDEFINED),
            );

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(pipeline.layout)
            .push_next(&mut rendering);

        let pipelines = unsafe {
            ash_device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, error)| error)?;
        pipeline.pipeline = DebugWrapper(pipelines[0]);

        log::debug!("Created pipeline `{}`", info.name);
        Ok(pipeline)
    }

    pub(crate) fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn constants_size(&self) -> u32 {
        self.constants_size
    }

    pub fn shader_resource_count(&self) -> u32 {
        self.shader_resource_count
    }
}

impl VkHandle for Pipeline {
    type Handle = vk::Pipeline;

    fn vk_handle(&self) -> Self::Handle {
        self.pipeline.0
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let device = self.device.ash_handle();
        unsafe {
            device.destroy_pipeline(self.pipeline.0, None);
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
