//! Deferred frame orchestration.
//!
//! A [`RenderManager`] owns the frame-wide render targets, the passes and the
//! swap chain, and drives the per-frame loop: begin barriers and clears, the
//! pass pipeline, the final barrier and the present. Every CPU wait on the GPU
//! goes through the [`FenceGate`](sync::FenceGate) of the
//! [`CommandListExecutor`](executor::CommandListExecutor), and every resource
//! state transition through the [`ResourceStateTracker`](tracker::ResourceStateTracker).
//!
//! Everything is generic over a [`deferra_render_rhi::RenderDevice`].

pub mod command;
pub mod error;
pub mod executor;
pub mod frame;
pub mod pass;
pub mod pipeline;
pub mod render_manager;
pub mod resource;
pub mod scene;
pub mod settings;
pub mod sync;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use error::{RenderError, Result};
pub use frame::{Camera, FixedTimestep, FrameConstants, FrameUpdater};
pub use render_manager::{FrameStats, RenderManager, RenderManagerHandle};
pub use scene::{GeometryBatch, ImportedTexture, PassShaders, Scene, ShaderProgram};
pub use settings::{RenderSettings, SettingsError};
