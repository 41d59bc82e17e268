// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::vk;
use dyntri_render::{RenderSize, SurfaceProvider};
use tracing::{debug, info};

use crate::commands::{create_primary_command_resources, CommandResources};
use crate::config::RenderConfig;
use crate::debug::DebugMessenger;
use crate::device::{init_device, init_physical_device, GpuSelection};
use crate::error::{InitError, InitResult};
use crate::image::LayoutTracker;
use crate::instance::{create_surface, init_instance, load_entry};
use crate::swapchain::{init_swapchain, SwapchainBundle, SwapchainRequest};
use crate::sync::FrameSyncRing;

/// Every Vulkan object the triangle needs apart from the pipeline.
///
/// Owned exclusively by the frame loop; all handles are released in `Drop`.
pub struct RenderContext {
    pub(crate) instance: ash::Instance,
    pub(crate) debug: Option<DebugMessenger>,
    pub(crate) surface_loader: surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) gpu: GpuSelection,
    pub(crate) device: ash::Device,
    pub(crate) queue: vk::Queue,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) swapchain: SwapchainBundle,
    pub(crate) commands: CommandResources,
    pub(crate) sync: FrameSyncRing,
    pub(crate) layouts: LayoutTracker,
    pub(crate) request: SwapchainRequest,
    // Dropped last: unloads the Vulkan library.
    _entry: ash::Entry,
}

impl RenderContext {
    // STRICT ORDER:
    // 1) Instance (WSI + optional debug exts)
    // 2) Surface FROM THIS INSTANCE
    // 3) Physical device + queue family checked AGAINST THIS SURFACE
    // 4) Logical device with the 1.3 feature chain
    // 5) Swapchain + views, command pool/buffer, sync ring
    pub fn new(provider: &dyn SurfaceProvider, cfg: &RenderConfig) -> InitResult<Self> {
        let source = provider
            .surface_source()
            .map_err(|e| InitError::SurfaceCreationFailed(format!("{e:#}")))?;
        let size = provider.size();

        let entry = load_entry()?;
        unsafe {
            let (instance, debug) = init_instance(&entry, &source, &cfg.app_name, cfg.validation)?;
            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = create_surface(&entry, &instance, &source)?;

            let gpu = init_physical_device(&instance, &surface_loader, surface)?;
            let (device, queue) = init_device(&instance, &gpu)?;
            let swapchain_loader = swapchain::Device::new(&instance, &device);

            let request = SwapchainRequest {
                hint: size,
                vsync: cfg.vsync,
                vsync_mode: cfg.vsync_mode,
                image_count: cfg.image_count,
            };
            let swapchain = init_swapchain(
                &device,
                &surface_loader,
                &swapchain_loader,
                gpu.phys,
                surface,
                vk::SwapchainKHR::null(),
                request,
            )?;
            let commands = create_primary_command_resources(&device, gpu.queue_family)?;
            let sync = FrameSyncRing::new(&device, swapchain.images.len())?;
            let layouts = LayoutTracker::new(swapchain.images.len());

            info!(
                "render context ready: {} images, {}x{}",
                swapchain.images.len(),
                swapchain.extent.width,
                swapchain.extent.height
            );

            Ok(Self {
                instance,
                debug,
                surface_loader,
                surface,
                gpu,
                device,
                queue,
                swapchain_loader,
                swapchain,
                commands,
                sync,
                layouts,
                request,
                _entry: entry,
            })
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn gpu(&self) -> &GpuSelection {
        &self.gpu
    }

    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    pub fn view_count(&self) -> usize {
        self.swapchain.views.len()
    }

    pub fn image_layout(&self, index: usize) -> Option<vk::ImageLayout> {
        self.layouts.get(index)
    }

    pub fn sync(&self) -> &FrameSyncRing {
        &self.sync
    }

    /// Validation errors reported so far; always 0 without the debug messenger.
    pub fn validation_errors(&self) -> u32 {
        self.debug.as_ref().map_or(0, DebugMessenger::validation_errors)
    }

    /// Replaces the swapchain for `hint`, retiring the old one. Returns whether
    /// the image format changed, in which case pipelines must be rebuilt.
    pub(crate) unsafe fn rebuild_swapchain(&mut self, hint: RenderSize) -> InitResult<bool> {
        // Nothing may still reference the old images, views or semaphores.
        self.device
            .device_wait_idle()
            .map_err(|result| InitError::SwapchainCreationFailed {
                call: "device_wait_idle",
                result,
            })?;

        self.request.hint = hint;
        let mut fresh = init_swapchain(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.gpu.phys,
            self.surface,
            self.swapchain.swapchain,
            self.request,
        )?;
        std::mem::swap(&mut self.swapchain, &mut fresh);
        let old = &mut fresh;
        let format_changed = old.format != self.swapchain.format;
        old.destroy(&self.device, &self.swapchain_loader);

        let count = self.swapchain.images.len();
        self.sync.recreate_image_semaphores(&self.device, count)?;
        self.layouts = LayoutTracker::new(count);
        debug!(
            "swapchain rebuilt: {}x{}, {} images, format changed: {}",
            self.swapchain.extent.width, self.swapchain.extent.height, count, format_changed
        );
        Ok(format_changed)
    }
}

// STRICT ORDER (teardown):
// - Device idle before anything is destroyed
// - Sync objects and command pool BEFORE device
// - Views and swapchain BEFORE device
// - Surface AFTER device; debug messenger, then instance last
impl Drop for RenderContext {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();

            self.sync.destroy(d);
            self.commands.destroy(d);
            self.swapchain.destroy(d, &self.swapchain_loader);
            d.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(debug) = self.debug.take() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
        debug!("render context destroyed");
    }
}
