use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use ash::vk;

use crate::{
    Result,
    vulkan::{AshHandle, DebugWrapper, VkHandle, device::RawDevice},
};

/// A timeline semaphore used as a monotonically increasing GPU counter.
pub struct Fence {
    device: Arc<RawDevice>,
    semaphore: DebugWrapper<vk::Semaphore>,
    /// Highest counter value observed so far.
    last_completed: AtomicU64,
}

impl Fence {
    pub(crate) fn new(device: Arc<RawDevice>, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.ash_handle().create_semaphore(&create_info, None) }?;

        Ok(Self {
            device,
            semaphore: DebugWrapper(semaphore),
            last_completed: AtomicU64::new(initial_value),
        })
    }
}

/// Folds a counter query into the highest value seen so far. A failed query
/// keeps the last value; the error resurfaces through the next `wait`.
fn observe_counter(
    last_completed: &AtomicU64,
    queried: ash::prelude::VkResult<u64>,
    semaphore: &impl std::fmt::Debug,
) -> u64 {
    match queried {
        Ok(value) => last_completed.fetch_max(value, Ordering::AcqRel).max(value),
        Err(error) => {
            log::error!("Failed to query fence {semaphore:?}: {error}");
            last_completed.load(Ordering::Acquire)
        }
    }
}

impl crate::Fence for Fence {
    fn completed_value(&self) -> u64 {
        let queried = unsafe {
            self.device
                .ash_handle()
                .get_semaphore_counter_value(self.semaphore.0)
        };

        observe_counter(&self.last_completed, queried, &self.semaphore)
    }

    fn wait(&self, value: u64) -> Result<()> {
        let semaphores = [self.semaphore.0];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe { self.device.ash_handle().wait_semaphores(&wait_info, u64::MAX) }?;
        Ok(())
    }
}

impl VkHandle for Fence {
    type Handle = vk::Semaphore;

    fn vk_handle(&self) -> Self::Handle {
        self.semaphore.0
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.ash_handle().destroy_semaphore(self.semaphore.0, None);
        }
    }
}

/// A binary fence the CPU waits on for swap chain image acquisition.
pub(crate) struct AcquireFence {
    device: Arc<RawDevice>,
    fence: DebugWrapper<vk::Fence>,
}

impl AcquireFence {
    pub fn new(device: Arc<RawDevice>) -> Result<Self> {
        let fence = unsafe {
            device
                .ash_handle()
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }?;

        Ok(Self {
            device,
            fence: DebugWrapper(fence),
        })
    }

    /// Waits for the pending acquisition and resets the fence for the next one.
    pub fn wait_and_reset(&self) -> Result<()> {
        let device = self.device.ash_handle();
        unsafe {
            device.wait_for_fences(&[self.fence.0], true, u64::MAX)?;
            device.reset_fences(&[self.fence.0])?;
        }

        Ok(())
    }
}

impl VkHandle for AcquireFence {
    type Handle = vk::Fence;

    fn vk_handle(&self) -> Self::Handle {
        self.fence.0
    }
}

impl Drop for AcquireFence {
    fn drop(&mut self) {
        unsafe {
            self.device.ash_handle().destroy_fence(self.fence.0, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_never_decreases() {
        let last_completed = AtomicU64::new(0);

        assert_eq!(observe_counter(&last_completed, Ok(4), &"fence"), 4);
        assert_eq!(observe_counter(&last_completed, Err(vk::Result::ERROR_DEVICE_LOST), &"fence"), 4);
        assert_eq!(observe_counter(&last_completed, Ok(2), &"fence"), 4);
        assert_eq!(observe_counter(&last_completed, Ok(7), &"fence"), 7);
    }
}
