use std::sync::{Arc, OnceLock};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    vk_enum,
    vulkan::{AshHandle, Version, VkHandle, device::DeviceExtensions, instance::Instance},
};

vk_enum! {
    pub enum PhysicalDeviceType: vk::PhysicalDeviceType {
        Other => OTHER,
        IntegratedGpu => INTEGRATED_GPU,
        DiscreteGpu => DISCRETE_GPU,
        VirtualGpu => VIRTUAL_GPU,
        Cpu => CPU,
    }
}

impl PhysicalDeviceType {
    /// Lower is preferred.
    pub const fn preference(self) -> u32 {
        match self {
            PhysicalDeviceType::DiscreteGpu => 0,
            PhysicalDeviceType::IntegratedGpu => 1,
            PhysicalDeviceType::VirtualGpu => 2,
            PhysicalDeviceType::Cpu => 3,
            PhysicalDeviceType::Other => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalDeviceProperties {
    pub api_version: Version,
    pub device_type: PhysicalDeviceType,
    pub device_name: String,
    pub max_push_constants_size: u32,
}

pub struct PhysicalDevice {
    instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    properties: OnceLock<PhysicalDeviceProperties>,
    queue_families: OnceLock<SmallVec<[vk::QueueFlags; 8]>>,
    extensions: OnceLock<DeviceExtensions>,
}

impl VkHandle for PhysicalDevice {
    type Handle = vk::PhysicalDevice;

    fn vk_handle(&self) -> Self::Handle {
        self.physical_device
    }
}

impl PhysicalDevice {
    pub fn from_raw(instance: Arc<Instance>, physical_device: vk::PhysicalDevice) -> Arc<Self> {
        Arc::new(Self {
            instance,
            physical_device,
            properties: Default::default(),
            queue_families: Default::default(),
            extensions: Default::default(),
        })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn properties(&self) -> &PhysicalDeviceProperties {
        self.properties.get_or_init(|| {
            let properties = unsafe {
                self.instance
                    .ash_handle()
                    .get_physical_device_properties(self.physical_device)
            };

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unknown>".into());

            PhysicalDeviceProperties {
                api_version: Version::from_vk(properties.api_version),
                device_type: PhysicalDeviceType::from_vk(properties.device_type)
                    .unwrap_or(PhysicalDeviceType::Other),
                device_name,
                max_push_constants_size: properties.limits.max_push_constants_size,
            }
        })
    }

    /// Returns the flags of every queue family, indexed by family.
    pub fn queue_families(&self) -> &[vk::QueueFlags] {
        self.queue_families.get_or_init(|| {
            unsafe {
                self.instance
                    .ash_handle()
                    .get_physical_device_queue_family_properties(self.physical_device)
            }
            .into_iter()
            .map(|family| family.queue_flags)
            .collect()
        })
    }

    /// Returns the extensions supported by the physical device.
    pub fn extensions(&self) -> &DeviceExtensions {
        self.extensions.get_or_init(|| {
            let properties = unsafe {
                self.instance
                    .ash_handle()
                    .enumerate_device_extension_properties(self.physical_device)
            }
            .unwrap_or_default();

            DeviceExtensions::from_names(
                properties
                    .iter()
                    .filter_map(|extension| extension.extension_name_as_c_str().ok()),
            )
        })
    }

    /// Returns `true` if the device exposes every core feature the backend
    /// relies on: timeline semaphores, `synchronization2` and dynamic
    /// rendering.
    pub fn supports_required_features(&self) -> bool {
        if self.properties().api_version < Version::V1_3 {
            return false;
        }

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features12)
            .push_next(&mut features13);

        unsafe {
            self.instance
                .ash_handle()
                .get_physical_device_features2(self.physical_device, &mut features);
        }

        features12.timeline_semaphore == vk::TRUE
            && features13.synchronization2 == vk::TRUE
            && features13.dynamic_rendering == vk::TRUE
    }
}
