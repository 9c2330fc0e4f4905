use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    Result,
    vulkan::{AshHandle, DebugWrapper, VkHandle, instance::Instance, physical::PhysicalDevice},
};

pub struct Surface {
    instance: Arc<Instance>,
    surface: DebugWrapper<vk::SurfaceKHR>,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface for a native window.
    ///
    /// # Safety
    /// The handles must refer to a live window that outlives the surface.
    pub unsafe fn new(
        instance: Arc<Instance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Arc<Self>> {
        let library = instance.library();
        let surface_loader = ash::khr::surface::Instance::new(&library.entry, instance.ash_handle());

        let surface = unsafe {
            ash_window::create_surface(&library.entry, instance.ash_handle(), display, window, None)
        }?;

        Ok(Arc::new(Self {
            instance,
            surface: DebugWrapper(surface),
            surface_loader,
        }))
    }

    pub fn capabilities(&self, physical_device: &PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device.vk_handle(), self.surface.0)
        }?;

        Ok(capabilities)
    }

    pub fn formats(&self, physical_device: &PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device.vk_handle(), self.surface.0)
        }?;

        Ok(formats)
    }

    pub fn present_modes(&self, physical_device: &PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device.vk_handle(), self.surface.0)
        }?;

        Ok(present_modes)
    }

    /// Returns `true` if the queue family can present to this surface.
    pub fn supports_queue_family(&self, physical_device: &PhysicalDevice, queue_family_index: u32) -> Result<bool> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device.vk_handle(),
                queue_family_index,
                self.surface.0,
            )
        }?;

        Ok(supported)
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl VkHandle for Surface {
    type Handle = vk::SurfaceKHR;

    fn vk_handle(&self) -> Self::Handle {
        self.surface.0
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface.0, None);
        }
    }
}
