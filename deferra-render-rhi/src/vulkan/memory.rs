use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;

use crate::{
    Result,
    vulkan::{AshHandle, VkHandle, device::RawDevice},
};

/// Sub-allocates device memory for textures.
pub struct MemoryAllocator {
    allocator: Mutex<gpu_allocator::vulkan::Allocator>,
    // The allocator frees its blocks on drop, so the device must outlive it.
    _device: Arc<RawDevice>,
}

impl MemoryAllocator {
    pub(crate) fn new(device: Arc<RawDevice>) -> Result<Arc<Self>> {
        let create_desc = gpu_allocator::vulkan::AllocatorCreateDesc {
            instance: device.instance().ash_handle().clone(),
            device: device.ash_handle().clone(),
            physical_device: device.physical_device().vk_handle(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        };

        let allocator = gpu_allocator::vulkan::Allocator::new(&create_desc)?;

        Ok(Arc::new(Self {
            allocator: Mutex::new(allocator),
            _device: device,
        }))
    }

    /// Allocates device-local memory for an optimally tiled image.
    pub fn allocate_image(
        self: &Arc<Self>,
        name: &str,
        requirements: vk::MemoryRequirements,
    ) -> Result<MemoryAllocation> {
        let allocation_desc = gpu_allocator::vulkan::AllocationCreateDesc {
            name,
            requirements,
            location: gpu_allocator::MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
        };

        let allocation = self
            .allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(&allocation_desc)?;

        Ok(MemoryAllocation {
            allocator: Arc::clone(self),
            allocation: Some(allocation),
        })
    }
}

pub struct MemoryAllocation {
    allocator: Arc<MemoryAllocator>,
    allocation: Option<gpu_allocator::vulkan::Allocation>,
}

impl MemoryAllocation {
    /// Returns the device memory backing this allocation and the offset
    /// within it.
    ///
    /// # Safety
    /// The memory must only be used to bind resources, and the allocation
    /// must outlive every resource bound to it.
    pub(crate) unsafe fn memory_and_offset(&self) -> Option<(vk::DeviceMemory, u64)> {
        self.allocation
            .as_ref()
            .map(|allocation| (unsafe { allocation.memory() }, allocation.offset()))
    }
}

impl Drop for MemoryAllocation {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let result = self
                .allocator
                .allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .free(allocation);

            if let Err(error) = result {
                log::error!("Failed to free GPU memory: {error}");
            }
        }
    }
}
