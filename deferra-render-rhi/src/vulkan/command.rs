use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::{
    Result, TextureBarrier,
    state::ResourceState,
    types::Extent2D,
    vulkan::{
        AshHandle, DebugWrapper, VkHandle,
        device::{Device, RawDevice},
        pipeline::{CONSTANTS_STAGES, Pipeline},
        texture::View,
    },
};

/// Layout, stages and accesses that make up a resource state.
fn state_sync(state: ResourceState) -> (vk::ImageLayout, vk::PipelineStageFlags2, vk::AccessFlags2) {
    match state {
        ResourceState::Undefined => (
            vk::ImageLayout::UNDEFINED,
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
        ),
        ResourceState::Common => (
            vk::ImageLayout::GENERAL,
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
        ResourceState::RenderTarget => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        ResourceState::PixelShaderResource => (
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        ResourceState::DepthWrite => (
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        ResourceState::DepthRead => (
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        ResourceState::CopySource => (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::PipelineStageFlags2::ALL_TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        ResourceState::CopyDest => (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::ALL_TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        ResourceState::Present => (
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
        ),
    }
}

/// A command pool owning a single primary command buffer.
pub struct CommandAllocator {
    device: Arc<RawDevice>,
    pool: DebugWrapper<vk::CommandPool>,
    buffer: vk::CommandBuffer,
}

impl CommandAllocator {
    pub(crate) fn new(device: Arc<RawDevice>) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(device.queue_family_index());

        let ash_device = device.ash_handle();
        let pool = unsafe { ash_device.create_command_pool(&create_info, None) }?;

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = match unsafe { ash_device.allocate_command_buffers(&allocate_info) } {
            Ok(buffers) => buffers[0],
            Err(error) => {
                unsafe { ash_device.destroy_command_pool(pool, None) };
                return Err(error.into());
            }
        };

        Ok(Self {
            device,
            pool: DebugWrapper(pool),
            buffer,
        })
    }
}

impl crate::CommandAllocator for CommandAllocator {
    fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device
                .ash_handle()
                .reset_command_pool(self.pool.0, vk::CommandPoolResetFlags::empty())
        }?;

        Ok(())
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        unsafe {
            self.device.ash_handle().destroy_command_pool(self.pool.0, None);
        }
    }
}

/// Records into the command buffer of whichever allocator it was last reset
/// against.
///
/// Render targets are bound lazily: rendering begins at the first draw after
/// `set_render_targets` and ends before any barrier, clear or target change.
pub struct CommandList {
    device: Arc<RawDevice>,
    buffer: DebugWrapper<vk::CommandBuffer>,
    recording: bool,
    rendering: bool,
    colors: SmallVec<[vk::ImageView; 4]>,
    depth: Option<vk::ImageView>,
    extent: Extent2D,
    layout: vk::PipelineLayout,
}

impl CommandList {
    pub(crate) fn new(device: Arc<RawDevice>, allocator: &CommandAllocator) -> Self {
        Self {
            device,
            buffer: DebugWrapper(allocator.buffer),
            recording: false,
            rendering: false,
            colors: SmallVec::new(),
            depth: None,
            extent: Extent2D::default(),
            layout: vk::PipelineLayout::null(),
        }
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe { self.device.ash_handle().cmd_end_rendering(self.buffer.0) };
            self.rendering = false;
        }
    }

    fn begin_rendering(
        &mut self,
        colors: &[vk::RenderingAttachmentInfo<'_>],
        depth: Option<&vk::RenderingAttachmentInfo<'_>>,
        extent: Extent2D,
    ) {
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: extent.to_vk(),
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(colors);
        if let Some(depth) = depth {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        let device = self.device.ash_handle();
        unsafe {
            device.cmd_begin_rendering(self.buffer.0, &rendering_info);
            device.cmd_set_viewport(
                self.buffer.0,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            device.cmd_set_scissor(self.buffer.0, 0, &[render_area]);
        }

        self.rendering = true;
    }

    fn ensure_rendering(&mut self) {
        if self.rendering {
            return;
        }

        let colors = self
            .colors
            .iter()
            .map(|&view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            })
            .collect::<SmallVec<[_; 4]>>();
        let depth = self.depth.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });

        let extent = self.extent;
        self.begin_rendering(&colors, depth.as_ref(), extent);
    }
}

impl crate::CommandList<Device> for CommandList {
    fn reset(&mut self, allocator: &CommandAllocator, pipeline: Option<&Pipeline>) -> Result<()> {
        debug_assert!(!self.recording, "command list reset while recording");

        self.buffer = DebugWrapper(allocator.buffer);
        self.rendering = false;
        self.colors.clear();
        self.depth = None;
        self.layout = vk::PipelineLayout::null();

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .ash_handle()
                .begin_command_buffer(self.buffer.0, &begin_info)
        }?;
        self.recording = true;

        if let Some(pipeline) = pipeline {
            crate::CommandList::set_pipeline(self, pipeline);
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.end_rendering();
        unsafe { self.device.ash_handle().end_command_buffer(self.buffer.0) }?;
        self.recording = false;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[TextureBarrier<'_, Device>]) {
        self.end_rendering();

        let image_barriers = barriers
            .iter()
            .map(|barrier| {
                let (old_layout, src_stage, src_access) = state_sync(barrier.before);
                let (new_layout, dst_stage, dst_access) = state_sync(barrier.after);
                let src_access = available_writes(barrier.before, src_access);

                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(src_stage)
                    .src_access_mask(src_access)
                    .dst_stage_mask(dst_stage)
                    .dst_access_mask(dst_access)
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(barrier.texture.vk_handle())
                    .subresource_range(barrier.texture.full_range())
            })
            .collect::<SmallVec<[_; 8]>>();

        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&image_barriers);
        unsafe {
            self.device
                .ash_handle()
                .cmd_pipeline_barrier2(self.buffer.0, &dependency_info);
        }
    }

    fn clear_render_target(&mut self, view: &View, color: [f32; 4]) {
        self.end_rendering();

        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view.vk_handle())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            });

        self.begin_rendering(std::slice::from_ref(&attachment), None, view.extent());
        self.end_rendering();
    }

    fn clear_depth_stencil(&mut self, view: &View, depth: f32, stencil: u8) {
        self.end_rendering();

        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view.vk_handle())
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: stencil as u32,
                },
            });

        self.begin_rendering(&[], Some(&attachment), view.extent());
        self.end_rendering();
    }

    fn set_render_targets(&mut self, colors: &[&View], depth: Option<&View>) {
        self.end_rendering();

        self.colors = colors.iter().map(|view| view.vk_handle()).collect();
        self.depth = depth.map(|view| view.vk_handle());
        self.extent = colors
            .first()
            .copied()
            .or(depth)
            .map(|view| view.extent())
            .unwrap_or_default();
    }

    fn set_pipeline(&mut self, pipeline: &Pipeline) {
        unsafe {
            self.device.ash_handle().cmd_bind_pipeline(
                self.buffer.0,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.vk_handle(),
            );
        }
        self.layout = pipeline.layout();
    }

    fn set_shader_resources(&mut self, views: &[&View]) {
        debug_assert!(
            self.layout != vk::PipelineLayout::null(),
            "shader resources bound without a pipeline"
        );

        let image_infos = views
            .iter()
            .map(|view| vk::DescriptorImageInfo {
                sampler: self.device.sampler(),
                image_view: view.vk_handle(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect::<SmallVec<[_; 8]>>();

        let writes = image_infos
            .iter()
            .enumerate()
            .map(|(binding, image_info)| {
                vk::WriteDescriptorSet::default()
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(image_info))
            })
            .collect::<SmallVec<[_; 8]>>();

        unsafe {
            self.device.push_descriptor().cmd_push_descriptor_set(
                self.buffer.0,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                0,
                &writes,
            );
        }
    }

    fn set_constants(&mut self, data: &[u8]) {
        debug_assert!(
            self.layout != vk::PipelineLayout::null(),
            "constants set without a pipeline"
        );

        unsafe {
            self.device.ash_handle().cmd_push_constants(
                self.buffer.0,
                self.layout,
                CONSTANTS_STAGES,
                0,
                data,
            );
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.ensure_rendering();
        unsafe {
            self.device
                .ash_handle()
                .cmd_draw(self.buffer.0, vertex_count, instance_count, 0, 0);
        }
    }
}

impl VkHandle for CommandList {
    type Handle = vk::CommandBuffer;

    fn vk_handle(&self) -> Self::Handle {
        self.buffer.0
    }
}

/// Only writes have to be made available to later access; prior reads need
/// the execution dependency alone.
fn available_writes(state: ResourceState, access: vk::AccessFlags2) -> vk::AccessFlags2 {
    const WRITES: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw(),
    );

    if state.is_write() {
        access & WRITES
    } else {
        vk::AccessFlags2::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_maps_to_present_layout() {
        let (layout, stage, access) = state_sync(ResourceState::Present);
        assert_eq!(layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(stage, vk::PipelineStageFlags2::NONE);
        assert_eq!(access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_undefined_discards_contents() {
        let (layout, _, access) = state_sync(ResourceState::Undefined);
        assert_eq!(layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_write_states_carry_write_access() {
        for state in [ResourceState::RenderTarget, ResourceState::DepthWrite, ResourceState::CopyDest] {
            let (_, _, access) = state_sync(state);
            let writes = vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
                | vk::AccessFlags2::TRANSFER_WRITE;
            assert!(access.intersects(writes), "{state:?} has no write access");
        }
    }

    #[test]
    fn test_barriers_only_flush_prior_writes() {
        let (_, _, access) = state_sync(ResourceState::RenderTarget);
        assert_eq!(
            available_writes(ResourceState::RenderTarget, access),
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        );

        let (_, _, access) = state_sync(ResourceState::PixelShaderResource);
        assert_eq!(
            available_writes(ResourceState::PixelShaderResource, access),
            vk::AccessFlags2::NONE
        );
    }
}
