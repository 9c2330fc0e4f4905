/// The usage state a texture is in from the GPU's point of view.
///
/// A texture is in exactly one state at a time. Moving between two different
/// states requires a barrier recorded into a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Freshly created; the contents are undefined. Only valid as the source
    /// of a transition.
    #[default]
    Undefined,
    Common,
    RenderTarget,
    PixelShaderResource,
    DepthWrite,
    DepthRead,
    CopySource,
    CopyDest,
    Present,
}

impl ResourceState {
    /// Returns `true` if the state can be the target of a transition.
    pub const fn is_valid_target(self) -> bool {
        !matches!(self, ResourceState::Undefined)
    }

    /// Returns `true` if the state allows the GPU to write the texture.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::Common
                | ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::CopyDest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_is_not_a_target() {
        assert!(!ResourceState::Undefined.is_valid_target());
        assert!(ResourceState::Present.is_valid_target());
    }

    #[test]
    fn test_write_states() {
        assert!(ResourceState::RenderTarget.is_write());
        assert!(ResourceState::DepthWrite.is_write());
        assert!(!ResourceState::DepthRead.is_write());
        assert!(!ResourceState::PixelShaderResource.is_write());
        assert!(!ResourceState::Present.is_write());
    }
}
