use std::sync::Arc;

use ash::vk;

use crate::{
    Result, RhiError,
    state::ResourceState,
    types::{Extent2D, Format},
    vk_enum,
    vulkan::{
        AshHandle, DebugWrapper, VkHandle,
        device::{Device, RawDevice},
        queue::Queue,
        surface::Surface,
        sync::AcquireFence,
        texture::Texture,
    },
};

vk_enum! {
    #[derive(Default)]
    pub enum PresentMode: vk::PresentModeKHR {
        #[default]
        Fifo => FIFO,
        Mailbox => MAILBOX,
        Immediate => IMMEDIATE,
    }
}

pub struct SwapChainCreateInfo {
    pub buffer_count: u32,
    /// Used when the surface leaves the extent up to the swap chain.
    pub extent: Extent2D,
    /// Falls back to FIFO when the surface does not support it.
    pub present_mode: PresentMode,
    /// Falls back to the first supported format.
    pub format: Format,
}

/// A swap chain whose next image is always acquired and ready.
///
/// Acquisition waits on the CPU, so presenting needs no semaphores as long
/// as the caller waited for the frame's final command list.
pub struct SwapChain {
    device: Arc<RawDevice>,
    _surface: Arc<Surface>,
    loader: ash::khr::swapchain::Device,
    swapchain: DebugWrapper<vk::SwapchainKHR>,
    images: Vec<vk::Image>,
    format: Format,
    extent: Extent2D,
    index: u32,
    acquire_fence: AcquireFence,
}

impl SwapChain {
    /// Creates a swap chain presenting from `queue`.
    pub fn new(device: &Device, surface: Arc<Surface>, queue: &Queue, create_info: SwapChainCreateInfo) -> Result<Self> {
        let raw = Arc::clone(device.raw());
        let physical_device = raw.physical_device();

        if !surface.supports_queue_family(physical_device, queue.family_index())? {
            return Err(RhiError::Vulkan(vk::Result::ERROR_INCOMPATIBLE_DISPLAY_KHR));
        }

        let capabilities = surface.capabilities(physical_device)?;
        let formats = surface.formats(physical_device)?;
        let present_modes = surface.present_modes(physical_device)?;

        let surface_format = formats
            .iter()
            .find(|format| {
                format.format == create_info.format.to_vk()
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.iter().find(|format| Format::from_vk(format.format).is_some()))
            .copied()
            .ok_or(RhiError::UnsupportedFormat(create_info.format))?;
        let format = Format::from_vk(surface_format.format).ok_or(RhiError::UnsupportedFormat(create_info.format))?;

        let mut image_count = create_info.buffer_count.max(capabilities.min_image_count);
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let image_extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: create_info.extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: create_info.extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let present_mode = if present_modes.contains(&create_info.present_mode.to_vk()) {
            create_info.present_mode
        } else {
            PresentMode::Fifo
        };

        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::INHERIT,
        ]
        .into_iter()
        .find(|mode| capabilities.supported_composite_alpha.contains(*mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let loader = ash::khr::swapchain::Device::new(raw.instance().ash_handle(), raw.ash_handle());

        let vk_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.vk_handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode.to_vk())
            .clipped(true);

        let swapchain = unsafe { loader.create_swapchain(&vk_create_info, None) }?;
        let acquire_fence = AcquireFence::new(Arc::clone(&raw))?;

        let mut swap_chain = Self {
            device: raw,
            _surface: surface,
            loader,
            swapchain: DebugWrapper(swapchain),
            images: Vec::new(),
            format,
            extent: Extent2D::from_vk(image_extent),
            index: 0,
            acquire_fence,
        };

        swap_chain.images = unsafe { swap_chain.loader.get_swapchain_images(swapchain) }?;
        swap_chain.acquire()?;

        log::info!(
            "Created swap chain with {} {:?} images of {}x{} ({:?})",
            swap_chain.images.len(),
            format,
            swap_chain.extent.width,
            swap_chain.extent.height,
            present_mode
        );

        Ok(swap_chain)
    }

    fn acquire(&mut self) -> Result<()> {
        let (index, suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain.0,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence.vk_handle(),
            )
        }?;

        if suboptimal {
            log::warn!("Swap chain is suboptimal for the surface");
        }

        self.acquire_fence.wait_and_reset()?;
        self.index = index;
        Ok(())
    }
}

impl crate::SwapChain<Device> for SwapChain {
    fn buffer_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.index
    }

    fn back_buffer(&self, index: u32) -> Result<Texture> {
        let image = self
            .images
            .get(index as usize)
            .copied()
            .ok_or(RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR))?;

        Ok(Texture::from_swap_chain_image(
            Arc::clone(&self.device),
            image,
            self.format,
            self.extent,
        ))
    }

    fn initial_state(&self) -> ResourceState {
        ResourceState::Undefined
    }

    fn format(&self) -> Format {
        self.format
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    /// The sync interval is fixed by the present mode chosen at creation.
    fn present(&mut self, queue: &Queue, _sync_interval: u32) -> Result<()> {
        let swapchains = [self.swapchain.0];
        let image_indices = [self.index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.loader.queue_present(queue.vk_handle(), &present_info) }?;
        if suboptimal {
            log::warn!("Presented to a suboptimal swap chain");
        }

        self.acquire()
    }
}

impl VkHandle for SwapChain {
    type Handle = vk::SwapchainKHR;

    fn vk_handle(&self) -> Self::Handle {
        self.swapchain.0
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain.0, None);
        }
    }
}
