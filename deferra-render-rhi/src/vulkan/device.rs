use std::sync::Arc;

use ash::vk;

use crate::{
    RenderDevice, Result, RhiError,
    impl_extensions,
    types::{PipelineInfo, TextureInfo, ViewKind},
    vulkan::{
        AshDebugWrapper, AshHandle, Version, VkHandle,
        command::{CommandAllocator, CommandList},
        instance::Instance,
        memory::MemoryAllocator,
        physical::PhysicalDevice,
        pipeline::Pipeline,
        queue::Queue,
        surface::Surface,
        swapchain::SwapChain,
        sync::Fence,
        texture::{Texture, View},
    },
};

impl_extensions! {
    pub struct DeviceExtensions {
        khr_swapchain => ash::khr::swapchain::NAME,
        khr_push_descriptor => ash::khr::push_descriptor::NAME,
    }
}

impl DeviceExtensions {
    /// The extensions the backend cannot run without.
    pub const REQUIRED: Self = Self {
        khr_swapchain: true,
        khr_push_descriptor: true,
    };
}

pub struct DeviceCreateInfo {
    pub physical_device: Arc<PhysicalDevice>,
    pub queue_family_index: u32,
}

impl DeviceCreateInfo {
    /// Picks the most capable physical device with a graphics queue family
    /// that can present to `surface`. Discrete GPUs are preferred.
    pub fn select(instance: &Arc<Instance>, surface: &Surface) -> Result<Self> {
        let physical_devices = instance.enumerate_physical_devices()?;
        log::info!("Found {} physical devices", physical_devices.len());

        physical_devices
            .into_iter()
            .filter(|physical_device| {
                let missing = DeviceExtensions::REQUIRED.missing_from(physical_device.extensions());
                if !missing.is_empty() {
                    log::debug!(
                        "Skipping {}: missing extensions {}",
                        physical_device.properties().device_name,
                        missing
                    );
                    return false;
                }

                physical_device.supports_required_features()
            })
            .filter_map(|physical_device| {
                let queue_family_index = physical_device
                    .queue_families()
                    .iter()
                    .enumerate()
                    .find_map(|(index, flags)| {
                        let index = index as u32;
                        let supported = flags.contains(vk::QueueFlags::GRAPHICS)
                            && surface
                                .supports_queue_family(&physical_device, index)
                                .unwrap_or(false);

                        supported.then_some(index)
                    })?;

                Some(Self {
                    physical_device,
                    queue_family_index,
                })
            })
            .min_by_key(|info| info.physical_device.properties().device_type.preference())
            .ok_or_else(|| RhiError::NoSuitableDevice {
                required: Version::V1_3.to_string(),
            })
    }
}

/// The logical device shared by every object created from it.
pub(crate) struct RawDevice {
    instance: Arc<Instance>,
    physical_device: Arc<PhysicalDevice>,
    device: AshDebugWrapper<ash::Device>,
    push_descriptor: ash::khr::push_descriptor::Device,
    sampler: vk::Sampler,
    queue_family_index: u32,
}

impl RawDevice {
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn physical_device(&self) -> &Arc<PhysicalDevice> {
        &self.physical_device
    }

    pub fn push_descriptor(&self) -> &ash::khr::push_descriptor::Device {
        &self.push_descriptor
    }

    /// The sampler used for every shader resource binding.
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl AshHandle for RawDevice {
    type Handle = ash::Device;

    fn ash_handle(&self) -> &Self::Handle {
        &self.device
    }
}

impl Drop for RawDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_device(None);
        }
    }
}

pub struct Device {
    raw: Arc<RawDevice>,
    allocator: Arc<MemoryAllocator>,
}

impl Device {
    pub fn new(create_info: DeviceCreateInfo) -> Result<Self> {
        let DeviceCreateInfo {
            physical_device,
            queue_family_index,
        } = create_info;
        let instance = Arc::clone(physical_device.instance());

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];

        let enabled_extensions = DeviceExtensions::REQUIRED
            .names()
            .map(std::ffi::CStr::as_ptr)
            .collect::<Vec<_>>();

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(true)
            .dynamic_rendering(true);

        let vk_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extensions)
            .push_next(&mut features12)
            .push_next(&mut features13);

        let device = unsafe {
            instance
                .ash_handle()
                .create_device(physical_device.vk_handle(), &vk_create_info, None)
        }?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = match unsafe { device.create_sampler(&sampler_info, None) } {
            Ok(sampler) => sampler,
            Err(error) => {
                unsafe { device.destroy_device(None) };
                return Err(error.into());
            }
        };

        let push_descriptor = ash::khr::push_descriptor::Device::new(instance.ash_handle(), &device);

        log::info!(
            "Created device on {} ({:?}, Vulkan {})",
            physical_device.properties().device_name,
            physical_device.properties().device_type,
            physical_device.properties().api_version
        );

        let raw = Arc::new(RawDevice {
            instance,
            physical_device,
            device: AshDebugWrapper(device),
            push_descriptor,
            sampler,
            queue_family_index,
        });

        let allocator = MemoryAllocator::new(Arc::clone(&raw))?;

        Ok(Self { raw, allocator })
    }

    pub(crate) fn raw(&self) -> &Arc<RawDevice> {
        &self.raw
    }

    /// Returns the queue all frame work is submitted to.
    pub fn queue(&self) -> Queue {
        let queue = unsafe {
            self.raw
                .ash_handle()
                .get_device_queue(self.raw.queue_family_index, 0)
        };

        Queue::new(Arc::clone(&self.raw), queue)
    }

    pub fn physical_device(&self) -> &Arc<PhysicalDevice> {
        &self.raw.physical_device
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.ash_handle().device_wait_idle() }?;
        Ok(())
    }
}

impl RenderDevice for Device {
    type Texture = Texture;
    type View = View;
    type Pipeline = Pipeline;
    type CommandAllocator = CommandAllocator;
    type CommandList = CommandList;
    type Fence = Fence;
    type Queue = Queue;
    type SwapChain = SwapChain;

    fn create_texture(&self, info: &TextureInfo) -> Result<Texture> {
        Texture::new(Arc::clone(&self.raw), &self.allocator, info)
    }

    fn create_view(&self, texture: &Texture, kind: ViewKind) -> Result<View> {
        View::new(texture, kind)
    }

    fn create_pipeline(&self, info: &PipelineInfo) -> Result<Pipeline> {
        Pipeline::new(Arc::clone(&self.raw), info)
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator> {
        CommandAllocator::new(Arc::clone(&self.raw))
    }

    fn create_command_list(&self, allocator: &CommandAllocator) -> Result<CommandList> {
        Ok(CommandList::new(Arc::clone(&self.raw), allocator))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence> {
        Fence::new(Arc::clone(&self.raw), initial_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_from_names() {
        let extensions = DeviceExtensions::from_names([ash::khr::swapchain::NAME, c"VK_EXT_unknown"]);
        assert!(extensions.khr_swapchain);
        assert!(!extensions.khr_push_descriptor);
        assert_eq!(extensions.to_string(), "[\"VK_KHR_swapchain\"]");
    }

    #[test]
    fn test_missing_required_extensions() {
        let supported = DeviceExtensions {
            khr_swapchain: true,
            ..Default::default()
        };

        let missing = DeviceExtensions::REQUIRED.missing_from(&supported);
        assert_eq!(missing.names().collect::<Vec<_>>(), [ash::khr::push_descriptor::NAME]);
        assert!(DeviceExtensions::REQUIRED.missing_from(&DeviceExtensions::REQUIRED).is_empty());
    }
}
