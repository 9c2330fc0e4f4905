use std::{borrow::Cow, io::Cursor, path::Path};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{RhiError, vk_enum};

vk_enum! {
    #[derive(Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Format: ash::vk::Format {
        #[default]
        Rgba8Unorm => R8G8B8A8_UNORM,
        Rgba8Srgb => R8G8B8A8_SRGB,
        Bgra8Unorm => B8G8R8A8_UNORM,
        Bgra8Srgb => B8G8R8A8_SRGB,
        Rgba16Float => R16G16B16A16_SFLOAT,
        R16Unorm => R16_UNORM,
        R16Float => R16_SFLOAT,
        D32Float => D32_SFLOAT,
        D24UnormS8Uint => D24_UNORM_S8_UINT,
    }
}

impl Format {
    pub const fn is_depth(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint)
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn to_vk(self) -> ash::vk::Extent2D {
        ash::vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub const fn from_vk(extent: ash::vk::Extent2D) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height.
    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

bitflags::bitflags! {
    /// How a texture may be used after creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const RENDER_TARGET = 1 << 0;
        const DEPTH_STENCIL = 1 << 1;
        const SHADER_RESOURCE = 1 << 2;
        const COPY_SOURCE = 1 << 3;
        const COPY_DEST = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    /// Six square 2D layers sampled as a cube.
    Cube,
}

impl TextureDimension {
    pub const fn array_layers(self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub name: Cow<'static, str>,
    pub dimension: TextureDimension,
    pub format: Format,
    pub extent: Extent2D,
    pub mip_levels: u32,
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// A single-mip 2D render target that can also be sampled.
    pub fn render_target(name: impl Into<Cow<'static, str>>, format: Format, extent: Extent2D) -> Self {
        Self {
            name: name.into(),
            dimension: TextureDimension::D2,
            format,
            extent,
            mip_levels: 1,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_RESOURCE,
        }
    }

    /// A single-mip depth buffer that can also be sampled.
    pub fn depth_stencil(name: impl Into<Cow<'static, str>>, format: Format, extent: Extent2D) -> Self {
        Self {
            name: name.into(),
            dimension: TextureDimension::D2,
            format,
            extent,
            mip_levels: 1,
            usage: TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE,
        }
    }
}

/// The kind of view created over a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    RenderTarget,
    DepthStencil,
    ShaderResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// A compiled SPIR-V shader.
#[derive(Debug, Clone)]
pub struct ShaderBlob {
    name: String,
    words: Vec<u32>,
}

impl ShaderBlob {
    /// Parses SPIR-V from raw bytes, validating the magic number and
    /// fixing up the endianness.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, RhiError> {
        let name = name.into();
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|source| RhiError::InvalidShader { name: name.clone(), source })?;

        Ok(Self { name, words })
    }

    /// Reads and parses a SPIR-V file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RhiError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let bytes = std::fs::read(path)
            .map_err(|source| RhiError::InvalidShader { name: name.clone(), source })?;

        Self::from_bytes(name, &bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Depth testing configuration of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthTest {
    #[default]
    Disabled,
    /// Less-or-equal test with depth writes.
    LessEqualWrite,
    /// Less-or-equal test without depth writes.
    LessEqualRead,
}

/// Describes a graphics pipeline.
///
/// Pipelines draw without vertex buffers; vertices are generated in the
/// vertex shader. Shader resources are bound as combined image samplers at
/// bindings `0..shader_resource_count` of set 0, and `constants_size` bytes of
/// push constants are visible to both stages.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub name: Cow<'static, str>,
    pub vertex: ShaderBlob,
    pub fragment: ShaderBlob,
    pub color_formats: SmallVec<[Format; 4]>,
    pub depth_format: Option<Format>,
    pub depth_test: DepthTest,
    pub shader_resource_count: u32,
    pub constants_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv_header() -> Vec<u8> {
        // Magic, version 1.0, generator, bound, schema.
        [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_shader_blob_parses_spirv() {
        let blob = ShaderBlob::from_bytes("header", &spirv_header()).unwrap();
        assert_eq!(blob.words().len(), 5);
        assert_eq!(blob.words()[0], 0x0723_0203);
    }

    #[test]
    fn test_shader_blob_rejects_truncated_input() {
        let result = ShaderBlob::from_bytes("truncated", &[0x03, 0x02, 0x23]);
        assert!(matches!(result, Err(RhiError::InvalidShader { .. })));
    }

    #[test]
    fn test_depth_formats() {
        assert!(Format::D32Float.is_depth());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(!Format::Rgba16Float.is_depth());
    }

    #[test]
    fn test_format_round_trips_through_vulkan() {
        assert_eq!(Format::from_vk(Format::R16Unorm.to_vk()), Some(Format::R16Unorm));
        assert_eq!(Format::from_vk(ash::vk::Format::R8_UINT), None);
    }

    #[test]
    fn test_format_deserializes_from_snake_case() {
        let format: Format = serde_json::from_str("\"rgba16_float\"").unwrap();
        assert_eq!(format, Format::Rgba16Float);
    }
}
