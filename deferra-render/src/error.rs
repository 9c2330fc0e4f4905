use std::path::PathBuf;

use deferra_render_rhi::RhiError;

use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to load shader `{}`", path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: RhiError,
    },

    #[error("a pipeline worker panicked")]
    WorkerPanicked,
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
