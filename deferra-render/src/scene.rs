use std::path::{Path, PathBuf};

use deferra_render_rhi::{RenderDevice, ResourceState, ShaderBlob, ShaderStage};

use crate::error::{RenderError, Result};

/// A vertex and fragment shader pair.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub vertex: ShaderBlob,
    pub fragment: ShaderBlob,
}

impl ShaderProgram {
    pub fn new(vertex: ShaderBlob, fragment: ShaderBlob) -> Self {
        Self { vertex, fragment }
    }

    /// Loads `<directory>/<program>.vert.spv` and `<directory>/<program>.frag.spv`.
    pub fn load(directory: impl AsRef<Path>, program: &str) -> Result<Self> {
        let directory = directory.as_ref();
        Ok(Self {
            vertex: load_blob(directory, program, ShaderStage::Vertex)?,
            fragment: load_blob(directory, program, ShaderStage::Fragment)?,
        })
    }
}

fn shader_path(directory: &Path, program: &str, stage: ShaderStage) -> PathBuf {
    let extension = match stage {
        ShaderStage::Vertex => "vert",
        ShaderStage::Fragment => "frag",
    };

    directory.join(format!("{program}.{extension}.spv"))
}

fn load_blob(directory: &Path, program: &str, stage: ShaderStage) -> Result<ShaderBlob> {
    let path = shader_path(directory, program, stage);
    ShaderBlob::from_file(&path).map_err(|source| RenderError::Shader { path, source })
}

/// The occlusion and blur programs of the ambient occlusion pass.
#[derive(Debug, Clone)]
pub struct OcclusionShaders {
    pub occlusion: ShaderProgram,
    pub blur: ShaderProgram,
}

/// The programs of every full-screen pass.
#[derive(Debug, Clone)]
pub struct PassShaders {
    /// Present when ambient occlusion runs.
    pub ambient_occlusion: Option<OcclusionShaders>,
    pub environment_light: ShaderProgram,
    pub sky_box: ShaderProgram,
    pub tone_mapping: ShaderProgram,
    pub post_process: ShaderProgram,
}

impl PassShaders {
    /// Loads every pass program from `directory`.
    ///
    /// With ambient occlusion the environment light program also samples the
    /// blurred accessibility buffer.
    pub fn load(directory: impl AsRef<Path>, ambient_occlusion: bool) -> Result<Self> {
        let directory = directory.as_ref();
        log::info!("Loading pass shaders from `{}`", directory.display());

        let occlusion = if ambient_occlusion {
            Some(OcclusionShaders {
                occlusion: ShaderProgram::load(directory, "ambient_occlusion")?,
                blur: ShaderProgram::load(directory, "blur")?,
            })
        } else {
            None
        };

        Ok(Self {
            ambient_occlusion: occlusion,
            environment_light: ShaderProgram::load(
                directory,
                Self::environment_light_program(ambient_occlusion),
            )?,
            sky_box: ShaderProgram::load(directory, "sky_box")?,
            tone_mapping: ShaderProgram::load(directory, "tone_mapping")?,
            post_process: ShaderProgram::load(directory, "post_process")?,
        })
    }

    pub const fn environment_light_program(ambient_occlusion: bool) -> &'static str {
        if ambient_occlusion {
            "environment_light_occlusion"
        } else {
            "environment_light"
        }
    }
}

/// One draw of the geometry pass. Vertices are generated by the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBatch {
    /// Index into [`Scene::geometry_programs`].
    pub program: usize,
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl GeometryBatch {
    pub const fn new(program: usize, vertex_count: u32, instance_count: u32) -> Self {
        Self {
            program,
            vertex_count,
            instance_count,
        }
    }
}

/// A texture created outside the renderer, in the state it was left in.
pub struct ImportedTexture<D: RenderDevice> {
    pub texture: D::Texture,
    pub state: ResourceState,
}

impl<D: RenderDevice> ImportedTexture<D> {
    pub fn new(texture: D::Texture, state: ResourceState) -> Self {
        Self { texture, state }
    }
}

/// Everything the passes draw. Handed over once, before the first frame.
pub struct Scene<D: RenderDevice> {
    pub shaders: PassShaders,
    pub geometry_programs: Vec<ShaderProgram>,
    pub geometry: Vec<GeometryBatch>,
    pub sky_box: ImportedTexture<D>,
    pub diffuse_irradiance: ImportedTexture<D>,
    pub specular_pre_convolved: ImportedTexture<D>,
}

impl<D: RenderDevice> Scene<D> {
    pub fn new(
        shaders: PassShaders,
        sky_box: ImportedTexture<D>,
        diffuse_irradiance: ImportedTexture<D>,
        specular_pre_convolved: ImportedTexture<D>,
    ) -> Self {
        Self {
            shaders,
            geometry_programs: Vec::new(),
            geometry: Vec::new(),
            sky_box,
            diffuse_irradiance,
            specular_pre_convolved,
        }
    }

    /// Returns the index batches refer to the program by.
    pub fn add_geometry_program(&mut self, program: ShaderProgram) -> usize {
        self.geometry_programs.push(program);
        self.geometry_programs.len() - 1
    }

    pub fn add_geometry(&mut self, batch: GeometryBatch) {
        assert!(
            batch.program < self.geometry_programs.len(),
            "geometry batch refers to unknown program {}",
            batch.program
        );
        self.geometry.push(batch);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::testing;

    use super::*;

    fn shader_directory(name: &str, programs: &[&str]) -> PathBuf {
        let directory = std::env::temp_dir().join(format!("deferra-{name}-{}", std::process::id()));
        fs::create_dir_all(&directory).unwrap();
        for program in programs {
            for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
                fs::write(shader_path(&directory, program, stage), testing::spirv_bytes()).unwrap();
            }
        }
        directory
    }

    #[test]
    fn test_loads_occlusion_variant() {
        let directory = shader_directory(
            "occlusion-shaders",
            &[
                "ambient_occlusion",
                "blur",
                "environment_light_occlusion",
                "sky_box",
                "tone_mapping",
                "post_process",
            ],
        );

        let shaders = PassShaders::load(&directory, true).unwrap();

        assert!(shaders.ambient_occlusion.is_some());
        assert!(shaders.environment_light.vertex.name().ends_with("environment_light_occlusion.vert.spv"));
        assert_eq!(shaders.post_process.fragment.words().len(), 5);
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_occlusion_shaders_are_optional() {
        let directory = shader_directory(
            "plain-shaders",
            &["environment_light", "sky_box", "tone_mapping", "post_process"],
        );

        let shaders = PassShaders::load(&directory, false).unwrap();

        assert!(shaders.ambient_occlusion.is_none());
        assert!(shaders.environment_light.fragment.name().ends_with("environment_light.frag.spv"));
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_missing_shader_reports_path() {
        let directory = shader_directory("missing-shaders", &["ambient_occlusion"]);

        let error = PassShaders::load(&directory, true).unwrap_err();

        match error {
            RenderError::Shader { path, .. } => assert_eq!(path, directory.join("blur.vert.spv")),
            other => panic!("unexpected error {other:?}"),
        }
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    #[should_panic(expected = "unknown program")]
    fn test_batch_must_refer_to_a_program() {
        let device = deferra_render_rhi::mock::MockDevice::new(Default::default());
        let mut scene = testing::scene(&device, false);
        let programs = scene.geometry_programs.len();
        scene.add_geometry(GeometryBatch::new(programs, 3, 1));
    }
}
