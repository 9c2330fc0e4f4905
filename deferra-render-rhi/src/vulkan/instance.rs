use std::{ffi::CStr, sync::Arc};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::{
    Result,
    vulkan::{AshDebugWrapper, AshHandle, Version, debug::debug_trampoline, physical::PhysicalDevice},
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// The loaded Vulkan library.
pub struct Library {
    pub(crate) entry: ash::Entry,
}

impl Library {
    pub fn new() -> Result<Arc<Library>> {
        let entry = unsafe { ash::Entry::load() }?;
        Ok(Arc::new(Library { entry }))
    }

    fn has_layer(&self, name: &CStr) -> bool {
        unsafe { self.entry.enumerate_instance_layer_properties() }
            .unwrap_or_default()
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|layer| layer == name))
    }
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct Instance {
    library: Arc<Library>,
    instance: AshDebugWrapper<ash::Instance>,
    debug: Option<DebugMessenger>,
}

impl Instance {
    /// Creates an instance able to present to windows of `display`.
    ///
    /// With `validation`, the Khronos validation layer is enabled when it is
    /// installed and its messages are forwarded to `log`.
    pub fn new(library: Arc<Library>, display: RawDisplayHandle, validation: bool) -> Result<Arc<Self>> {
        let application_info = vk::ApplicationInfo::default()
            .application_name(c"deferra")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"deferra")
            .api_version(Version::V1_3.to_vk());

        let mut enabled_extensions = ash_window::enumerate_required_extensions(display)?.to_vec();

        let validation = validation && library.has_layer(VALIDATION_LAYER);
        let mut enabled_layers = Vec::new();
        if validation {
            enabled_layers.push(VALIDATION_LAYER.as_ptr());
            enabled_extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        } else {
            log::debug!("Validation layer disabled or not installed");
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layers)
            .enabled_extension_names(&enabled_extensions);

        let instance = unsafe { library.entry.create_instance(&create_info, None) }?;

        let debug = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&library.entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_trampoline));

            let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None) }?;
            Some(DebugMessenger { loader, messenger })
        } else {
            None
        };

        log::info!("Created Vulkan {} instance (validation: {})", Version::V1_3, validation);

        Ok(Arc::new(Self {
            library,
            instance: AshDebugWrapper(instance),
            debug,
        }))
    }

    pub fn enumerate_physical_devices(self: &Arc<Self>) -> Result<Vec<Arc<PhysicalDevice>>> {
        let physical_devices = unsafe { self.instance.enumerate_physical_devices() }?;

        Ok(physical_devices
            .into_iter()
            .map(|physical_device| PhysicalDevice::from_raw(Arc::clone(self), physical_device))
            .collect())
    }

    /// Returns the library (entry) associated with this instance.
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }
}

impl AshHandle for Instance {
    type Handle = ash::Instance;

    fn ash_handle(&self) -> &Self::Handle {
        &self.instance
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
