// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Anything that stops the rendering context from being built.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("instance creation failed: {0}")]
    InstanceCreation(vk::Result),

    #[error("surface creation failed: {0}")]
    SurfaceCreationFailed(String),

    #[error("required feature missing: {0}")]
    MissingRequiredFeature(&'static str),

    #[error("no suitable physical device: {0}")]
    NoSuitableDevice(String),

    #[error("logical device creation failed: {0}")]
    DeviceCreation(vk::Result),

    #[error("swapchain creation failed ({call}): {result}")]
    SwapchainCreationFailed {
        call: &'static str,
        result: vk::Result,
    },

    #[error("command pool/buffer allocation failed ({call}): {result}")]
    CommandResources {
        call: &'static str,
        result: vk::Result,
    },

    #[error("shader file {path:?} not readable: {source}")]
    ShaderFileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader module {path:?} rejected: {reason}")]
    ShaderModuleInvalid { path: PathBuf, reason: String },

    #[error("pipeline compilation failed: {0}")]
    PipelineCompilationFailed(String),

    #[error("sync object creation failed: {0}")]
    Sync(vk::Result),
}

/// Per-frame conditions that a swapchain rebuild resolves.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverable {
    #[error("swapchain out of date")]
    SwapchainOutOfDate,
    #[error("surface suboptimal")]
    SurfaceSuboptimal,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{0}")]
    Recoverable(Recoverable),

    #[error("device lost")]
    DeviceLost,

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("swapchain rebuild failed: {0}")]
    Rebuild(#[from] InitError),
}

impl FrameError {
    /// Maps a driver result from a per-frame call onto the frame taxonomy.
    pub fn from_vk(call: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::Recoverable(Recoverable::SwapchainOutOfDate),
            vk::Result::SUBOPTIMAL_KHR => Self::Recoverable(Recoverable::SurfaceSuboptimal),
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            result => Self::Vulkan { call, result },
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

pub type InitResult<T> = std::result::Result<T, InitError>;
pub type FrameResult<T> = std::result::Result<T, FrameError>;
