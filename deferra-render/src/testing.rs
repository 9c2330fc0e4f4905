//! Fixtures shared by the unit tests.

use deferra_render_rhi::{
    Extent2D, Format, RenderDevice, ResourceState, ShaderBlob, TextureDimension, TextureInfo,
    TextureUsage, mock::MockDevice,
};

use crate::scene::{GeometryBatch, ImportedTexture, OcclusionShaders, PassShaders, Scene, ShaderProgram};

/// A SPIR-V module header with no instructions.
pub(crate) fn spirv_bytes() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

pub(crate) fn blob(name: &str) -> ShaderBlob {
    ShaderBlob::from_bytes(name, &spirv_bytes()).unwrap()
}

pub(crate) fn program(name: &str) -> ShaderProgram {
    ShaderProgram::new(blob(&format!("{name}.vert")), blob(&format!("{name}.frag")))
}

pub(crate) fn shaders(ambient_occlusion: bool) -> PassShaders {
    PassShaders {
        ambient_occlusion: ambient_occlusion.then(|| OcclusionShaders {
            occlusion: program("ambient_occlusion"),
            blur: program("blur"),
        }),
        environment_light: program(PassShaders::environment_light_program(ambient_occlusion)),
        sky_box: program("sky_box"),
        tone_mapping: program("tone_mapping"),
        post_process: program("post_process"),
    }
}

pub(crate) fn cube_map(device: &MockDevice, name: &'static str) -> ImportedTexture<MockDevice> {
    let texture = device
        .create_texture(&TextureInfo {
            name: name.into(),
            dimension: TextureDimension::Cube,
            format: Format::Rgba16Float,
            extent: Extent2D::new(16, 16),
            mip_levels: 1,
            usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DEST,
        })
        .unwrap();

    ImportedTexture::new(texture, ResourceState::PixelShaderResource)
}

/// Two geometry programs drawn by three batches.
pub(crate) fn scene(device: &MockDevice, ambient_occlusion: bool) -> Scene<MockDevice> {
    let mut scene = Scene::new(
        shaders(ambient_occlusion),
        cube_map(device, "Sky Box"),
        cube_map(device, "Diffuse Irradiance"),
        cube_map(device, "Specular Pre-Convolved"),
    );

    let opaque = scene.add_geometry_program(program("geometry"));
    let foliage = scene.add_geometry_program(program("geometry_foliage"));
    scene.add_geometry(GeometryBatch::new(opaque, 36, 4));
    scene.add_geometry(GeometryBatch::new(opaque, 6, 1));
    scene.add_geometry(GeometryBatch::new(foliage, 12, 20));
    scene
}
