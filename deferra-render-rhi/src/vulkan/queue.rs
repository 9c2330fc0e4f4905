use std::sync::Arc;

use ash::vk;

use crate::{
    Result,
    vulkan::{
        AshHandle, DebugWrapper, VkHandle, command::CommandList, device::{Device, RawDevice},
        sync::Fence,
    },
};

pub struct Queue {
    device: Arc<RawDevice>,
    queue: DebugWrapper<vk::Queue>,
}

impl Queue {
    pub(crate) fn new(device: Arc<RawDevice>, queue: vk::Queue) -> Self {
        Self {
            device,
            queue: DebugWrapper(queue),
        }
    }

    pub fn family_index(&self) -> u32 {
        self.device.queue_family_index()
    }
}

impl crate::Queue<Device> for Queue {
    fn submit(&self, list: &CommandList) -> Result<()> {
        let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(list.vk_handle())];
        let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&command_buffer_infos);

        unsafe {
            self.device
                .ash_handle()
                .queue_submit2(self.queue.0, &[submit_info], vk::Fence::null())
        }?;

        Ok(())
    }

    fn signal(&self, fence: &Fence, value: u64) -> Result<()> {
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.vk_handle())
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let submit_info = vk::SubmitInfo2::default().signal_semaphore_infos(&signal_infos);

        unsafe {
            self.device
                .ash_handle()
                .queue_submit2(self.queue.0, &[submit_info], vk::Fence::null())
        }?;

        Ok(())
    }
}

impl VkHandle for Queue {
    type Handle = vk::Queue;

    fn vk_handle(&self) -> Self::Handle {
        self.queue.0
    }
}
