use std::borrow::Cow;

use deferra_render_rhi::{RenderDevice, ResourceState, TextureInfo, ViewKind};
use slotmap::SlotMap;

use crate::{error::Result, tracker::ResourceStateTracker};

slotmap::new_key_type! {
    /// A texture owned by a [`ResourceTable`].
    pub struct ResourceId;

    /// A view owned by a [`ResourceTable`].
    pub struct ViewId;
}

/// A texture that passes render into and later sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub resource: ResourceId,
    /// A render target view, or a depth stencil view for depth formats.
    pub target_view: ViewId,
    pub shader_view: ViewId,
}

/// A swap chain image. Back buffers are only ever rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackBuffer {
    pub resource: ResourceId,
    pub target_view: ViewId,
}

/// A texture that is only sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledTexture {
    pub resource: ResourceId,
    pub shader_view: ViewId,
}

struct TextureEntry<D: RenderDevice> {
    name: Cow<'static, str>,
    texture: D::Texture,
}

struct ViewEntry<D: RenderDevice> {
    resource: ResourceId,
    kind: ViewKind,
    view: D::View,
}

/// Owns every texture and view the renderer uses.
///
/// Passes only hold [`ResourceId`]s and [`ViewId`]s. Every texture added here
/// is registered with the [`ResourceStateTracker`] at the same time.
pub struct ResourceTable<D: RenderDevice> {
    // Views are declared first so they are destroyed before their textures.
    views: SlotMap<ViewId, ViewEntry<D>>,
    textures: SlotMap<ResourceId, TextureEntry<D>>,
}

impl<D: RenderDevice> Default for ResourceTable<D> {
    fn default() -> Self {
        Self {
            views: SlotMap::with_key(),
            textures: SlotMap::with_key(),
        }
    }
}

impl<D: RenderDevice> ResourceTable<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a texture. Its contents start out undefined.
    pub fn create_texture(
        &mut self,
        device: &D,
        tracker: &mut ResourceStateTracker,
        info: &TextureInfo,
    ) -> Result<ResourceId> {
        let texture = device.create_texture(info)?;
        Ok(self.import(tracker, info.name.clone(), texture, ResourceState::Undefined))
    }

    /// Takes ownership of a texture created elsewhere, such as a swap chain
    /// image or a scene asset, in the state the caller declares.
    pub fn import(
        &mut self,
        tracker: &mut ResourceStateTracker,
        name: impl Into<Cow<'static, str>>,
        texture: D::Texture,
        state: ResourceState,
    ) -> ResourceId {
        let name = name.into();
        log::debug!("Tracking `{name}` in {state:?}");

        let resource = self.textures.insert(TextureEntry { name, texture });
        tracker.add_resource(resource, state);
        resource
    }

    pub fn create_view(&mut self, device: &D, resource: ResourceId, kind: ViewKind) -> Result<ViewId> {
        let view = device.create_view(self.texture(resource), kind)?;
        Ok(self.views.insert(ViewEntry { resource, kind, view }))
    }

    /// Creates a texture with a target view and a shader resource view.
    pub fn create_render_target(
        &mut self,
        device: &D,
        tracker: &mut ResourceStateTracker,
        info: &TextureInfo,
    ) -> Result<RenderTarget> {
        let target_kind = if info.format.is_depth() {
            ViewKind::DepthStencil
        } else {
            ViewKind::RenderTarget
        };

        let resource = self.create_texture(device, tracker, info)?;
        let target_view = self.create_view(device, resource, target_kind)?;
        let shader_view = self.create_view(device, resource, ViewKind::ShaderResource)?;

        Ok(RenderTarget {
            resource,
            target_view,
            shader_view,
        })
    }

    /// Imports a swap chain image and creates its render target view.
    pub fn import_back_buffer(
        &mut self,
        device: &D,
        tracker: &mut ResourceStateTracker,
        index: u32,
        texture: D::Texture,
        state: ResourceState,
    ) -> Result<BackBuffer> {
        let resource = self.import(tracker, format!("Back Buffer {index}"), texture, state);
        let target_view = self.create_view(device, resource, ViewKind::RenderTarget)?;
        Ok(BackBuffer { resource, target_view })
    }

    /// Imports a texture and creates its shader resource view.
    pub fn import_sampled(
        &mut self,
        device: &D,
        tracker: &mut ResourceStateTracker,
        name: impl Into<Cow<'static, str>>,
        texture: D::Texture,
        state: ResourceState,
    ) -> Result<SampledTexture> {
        let resource = self.import(tracker, name, texture, state);
        let shader_view = self.create_view(device, resource, ViewKind::ShaderResource)?;
        Ok(SampledTexture { resource, shader_view })
    }

    /// Destroys a texture and every view over it, and stops tracking it.
    pub fn remove(&mut self, tracker: &mut ResourceStateTracker, resource: ResourceId) {
        self.views.retain(|_, entry| entry.resource != resource);
        if let Some(entry) = self.textures.remove(resource) {
            log::debug!("Released `{}`", entry.name);
            tracker.remove_resource(resource);
        }
    }

    /// # Panics
    ///
    /// Panics if the resource does not exist.
    pub fn texture(&self, resource: ResourceId) -> &D::Texture {
        &self.texture_entry(resource).texture
    }

    pub fn name(&self, resource: ResourceId) -> &str {
        &self.texture_entry(resource).name
    }

    /// # Panics
    ///
    /// Panics if the view does not exist.
    pub fn view(&self, view: ViewId) -> &D::View {
        &self.view_entry(view).view
    }

    pub fn view_kind(&self, view: ViewId) -> ViewKind {
        self.view_entry(view).kind
    }

    /// The texture a view was created over.
    pub fn view_resource(&self, view: ViewId) -> ResourceId {
        self.view_entry(view).resource
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    fn texture_entry(&self, resource: ResourceId) -> &TextureEntry<D> {
        match self.textures.get(resource) {
            Some(entry) => entry,
            None => panic!("unknown resource {resource:?}"),
        }
    }

    fn view_entry(&self, view: ViewId) -> &ViewEntry<D> {
        match self.views.get(view) {
            Some(entry) => entry,
            None => panic!("unknown view {view:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use deferra_render_rhi::{
        Extent2D, Format, SwapChain,
        mock::{MockDevice, MockGpuMode},
    };

    use super::*;

    #[test]
    fn test_render_target_is_tracked_as_undefined() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut tracker = ResourceStateTracker::new();
        let mut resources = ResourceTable::new();

        let info = TextureInfo::render_target("Color", Format::Rgba16Float, Extent2D::new(8, 8));
        let target = resources.create_render_target(&device, &mut tracker, &info).unwrap();

        assert_eq!(tracker.state(target.resource), ResourceState::Undefined);
        assert_eq!(resources.name(target.resource), "Color");
        assert_eq!(resources.view_kind(target.target_view), ViewKind::RenderTarget);
        assert_eq!(resources.view_kind(target.shader_view), ViewKind::ShaderResource);
        assert_eq!(resources.view_resource(target.shader_view), target.resource);
    }

    #[test]
    fn test_depth_target_gets_depth_stencil_view() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut tracker = ResourceStateTracker::new();
        let mut resources = ResourceTable::new();

        let info = TextureInfo::depth_stencil("Depth", Format::D32Float, Extent2D::new(8, 8));
        let target = resources.create_render_target(&device, &mut tracker, &info).unwrap();

        assert_eq!(resources.view_kind(target.target_view), ViewKind::DepthStencil);
        assert_eq!(resources.view(target.target_view).texture, resources.texture(target.resource).id);
    }

    #[test]
    fn test_import_uses_declared_state() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut tracker = ResourceStateTracker::new();
        let mut resources = ResourceTable::new();
        let swap_chain = device.create_swap_chain(2, Format::Bgra8Unorm, Extent2D::new(4, 4));

        let back_buffer = resources
            .import_back_buffer(&device, &mut tracker, 1, swap_chain.back_buffer(1).unwrap(), ResourceState::Present)
            .unwrap();

        assert_eq!(tracker.state(back_buffer.resource), ResourceState::Present);
        assert_eq!(resources.name(back_buffer.resource), "Back Buffer 1");
    }

    #[test]
    fn test_remove_releases_views_and_tracking() {
        let device = MockDevice::new(MockGpuMode::Immediate);
        let mut tracker = ResourceStateTracker::new();
        let mut resources = ResourceTable::new();

        let info = TextureInfo::render_target("Scratch", Format::R16Unorm, Extent2D::new(2, 2));
        let target = resources.create_render_target(&device, &mut tracker, &info).unwrap();
        assert_eq!(resources.view_count(), 2);

        resources.remove(&mut tracker, target.resource);

        assert_eq!(resources.texture_count(), 0);
        assert_eq!(resources.view_count(), 0);
        assert!(!tracker.contains(target.resource));
    }
}
