use std::sync::Arc;

use ash::vk;

use crate::{
    Result,
    types::{Extent2D, Format, TextureDimension, TextureInfo, TextureUsage, ViewKind},
    vulkan::{
        AshHandle, DebugWrapper, VkHandle,
        device::RawDevice,
        memory::{MemoryAllocation, MemoryAllocator},
    },
};

/// Who owns the image behind a texture.
enum TextureStorage {
    Owned {
        #[allow(dead_code)]
        memory: MemoryAllocation,
    },
    /// A swap chain image; the swap chain destroys it.
    SwapChain,
}

pub struct Texture {
    device: Arc<RawDevice>,
    image: DebugWrapper<vk::Image>,
    format: Format,
    extent: Extent2D,
    dimension: TextureDimension,
    storage: TextureStorage,
}

fn usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::SHADER_RESOURCE) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::COPY_SOURCE) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DEST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

impl Texture {
    pub(crate) fn new(device: Arc<RawDevice>, allocator: &Arc<MemoryAllocator>, info: &TextureInfo) -> Result<Self> {
        let flags = match info.dimension {
            TextureDimension::D2 => vk::ImageCreateFlags::empty(),
            TextureDimension::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        };

        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format.to_vk())
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(info.mip_levels.max(1))
            .array_layers(info.dimension.array_layers())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage_to_vk(info.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let ash_device = device.ash_handle();
        let image = unsafe { ash_device.create_image(&create_info, None) }?;

        let bound = (|| -> Result<MemoryAllocation> {
            let requirements = unsafe { ash_device.get_image_memory_requirements(image) };
            let memory = allocator.allocate_image(&info.name, requirements)?;
            if let Some((device_memory, offset)) = unsafe { memory.memory_and_offset() } {
                unsafe { ash_device.bind_image_memory(image, device_memory, offset) }?;
            }
            Ok(memory)
        })();

        let memory = match bound {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { ash_device.destroy_image(image, None) };
                return Err(error);
            }
        };

        log::debug!(
            "Created texture `{}` ({:?} {}x{})",
            info.name,
            info.format,
            info.extent.width,
            info.extent.height
        );

        Ok(Self {
            device,
            image: DebugWrapper(image),
            format: info.format,
            extent: info.extent,
            dimension: info.dimension,
            storage: TextureStorage::Owned { memory },
        })
    }

    pub(crate) fn from_swap_chain_image(
        device: Arc<RawDevice>,
        image: vk::Image,
        format: Format,
        extent: Extent2D,
    ) -> Self {
        Self {
            device,
            image: DebugWrapper(image),
            format,
            extent,
            dimension: TextureDimension::D2,
            storage: TextureStorage::SwapChain,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Every aspect of the format.
    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        if self.format.has_stencil() {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else if self.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    /// The range covering every mip and layer.
    pub(crate) fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect())
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS)
    }
}

impl VkHandle for Texture {
    type Handle = vk::Image;

    fn vk_handle(&self) -> Self::Handle {
        self.image.0
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let TextureStorage::Owned { .. } = self.storage {
            unsafe {
                self.device.ash_handle().destroy_image(self.image.0, None);
            }
        }
    }
}

pub struct View {
    device: Arc<RawDevice>,
    view: DebugWrapper<vk::ImageView>,
    kind: ViewKind,
    extent: Extent2D,
}

impl View {
    pub(crate) fn new(texture: &Texture, kind: ViewKind) -> Result<Self> {
        let view_type = match (texture.dimension, kind) {
            (TextureDimension::Cube, ViewKind::ShaderResource) => vk::ImageViewType::CUBE,
            (TextureDimension::Cube, _) => vk::ImageViewType::TYPE_2D_ARRAY,
            (TextureDimension::D2, _) => vk::ImageViewType::TYPE_2D,
        };

        // Sampling reads depth only.
        let mut range = texture.full_range();
        if kind == ViewKind::ShaderResource && texture.format.is_depth() {
            range.aspect_mask = vk::ImageAspectFlags::DEPTH;
        }

        let create_info = vk::ImageViewCreateInfo::default()
            .image(texture.vk_handle())
            .view_type(view_type)
            .format(texture.format.to_vk())
            .components(vk::ComponentMapping::default())
            .subresource_range(range);

        let view = unsafe {
            texture
                .device
                .ash_handle()
                .create_image_view(&create_info, None)
        }?;

        Ok(Self {
            device: Arc::clone(&texture.device),
            view: DebugWrapper(view),
            kind,
            extent: texture.extent,
        })
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}

impl VkHandle for View {
    type Handle = vk::ImageView;

    fn vk_handle(&self) -> Self::Handle {
        self.view.0
    }
}

impl Drop for View {
    fn drop(&mut self) {
        unsafe {
            self.device.ash_handle().destroy_image_view(self.view.0, None);
        }
    }
}
