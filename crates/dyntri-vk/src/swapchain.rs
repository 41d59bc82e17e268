// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::vk;
use dyntri_render::RenderSize;
use tracing::{debug, info};

use crate::error::{InitError, InitResult};
use crate::image::basic_subresource_range;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    #[default]
    Fifo,
    Mailbox,
}

/// What the caller wants from the next swapchain build.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SwapchainRequest {
    pub hint: RenderSize,
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub image_count: Option<u32>,
}

pub struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        _ => "OTHER",
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// B8G8R8A8_SRGB, then B8G8R8A8_UNORM in the sRGB color space, else whatever
/// the surface lists first.
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let nonlinear = |f: &&vk::SurfaceFormatKHR| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR;
    formats
        .iter()
        .filter(nonlinear)
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB)
        .or_else(|| {
            formats
                .iter()
                .filter(nonlinear)
                .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
        })
        .or_else(|| formats.first())
        .copied()
}

pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    vsync: bool,
    mode: VsyncMode,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match (vsync, mode) {
        (false, _) => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ],
        (true, VsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        (true, VsyncMode::Fifo) => &[vk::PresentModeKHR::FIFO],
    };
    // FIFO is the one mode every surface must support.
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A `current_extent` of `u32::MAX` means the surface takes its size from the swapchain.
pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum unless a count is requested; always within the
/// surface's bounds (a `max_image_count` of 0 means unbounded).
pub(crate) fn image_count_from_caps(caps: &vk::SurfaceCapabilitiesKHR, requested: Option<u32>) -> u32 {
    let max = if caps.max_image_count == 0 {
        u32::MAX
    } else {
        caps.max_image_count
    };
    let want = requested.unwrap_or(caps.min_image_count.saturating_add(1));
    want.clamp(caps.min_image_count, max.max(caps.min_image_count))
}

unsafe fn create_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> InitResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: basic_subresource_range(),
            ..Default::default()
        };
        match device.create_image_view(&iv_info, None) {
            Ok(v) => views.push(v),
            Err(result) => {
                destroy_views(device, &views);
                return Err(InitError::SwapchainCreationFailed {
                    call: "create_image_view",
                    result,
                });
            }
        }
    }
    Ok(views)
}

pub(crate) unsafe fn destroy_views(device: &ash::Device, views: &[vk::ImageView]) {
    for &v in views {
        device.destroy_image_view(v, None);
    }
}

/// Builds a swapchain (plus one view per image) for `surface`.
///
/// Images are created with `COLOR_ATTACHMENT | TRANSFER_DST` usage so they can
/// be cleared either through the attachment load op or with a transfer clear.
/// `old_swapchain` is retired by the driver but still has to be destroyed by
/// the caller.
pub(crate) unsafe fn init_swapchain(
    device: &ash::Device,
    surf_i: &surface::Instance,
    swap_d: &swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    old_swapchain: vk::SwapchainKHR,
    req: SwapchainRequest,
) -> InitResult<SwapchainBundle> {
    let query = |call: &'static str| {
        move |result: vk::Result| InitError::SwapchainCreationFailed { call, result }
    };

    // --- Query surface capabilities / formats / present modes ---
    let caps = surf_i
        .get_physical_device_surface_capabilities(phys, surface)
        .map_err(query("get_physical_device_surface_capabilities"))?;
    let formats = surf_i
        .get_physical_device_surface_formats(phys, surface)
        .map_err(query("get_physical_device_surface_formats"))?;
    let modes = surf_i
        .get_physical_device_surface_present_modes(phys, surface)
        .map_err(query("get_physical_device_surface_present_modes"))?;

    let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;
    if !caps.supported_usage_flags.contains(usage) {
        return Err(InitError::MissingRequiredFeature(
            "swapchain images usable as color attachment and transfer destination",
        ));
    }

    let surf_format = choose_surface_format(&formats).ok_or(InitError::SwapchainCreationFailed {
        call: "get_physical_device_surface_formats",
        result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
    })?;
    let present_mode = choose_present_mode(&modes, req.vsync, req.vsync_mode);
    let extent = extent_from_caps(&caps, req.hint);
    let min_count = image_count_from_caps(&caps, req.image_count);

    info!(
        "swapchain: format {} ({:?}), present_mode {}, extent {}x{}, images(min={} → picked={})",
        fmt_name(surf_format.format),
        surf_format.color_space,
        pm_name(present_mode),
        extent.width,
        extent.height,
        caps.min_image_count,
        min_count
    );

    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };

    let composite_alpha = [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|a| caps.supported_composite_alpha.contains(*a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: usage,
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform,
        composite_alpha,
        present_mode,
        clipped: vk::TRUE,
        old_swapchain,
        ..Default::default()
    };

    let new_swapchain = swap_d
        .create_swapchain(&swap_info, None)
        .map_err(query("create_swapchain"))?;
    let images = match swap_d.get_swapchain_images(new_swapchain) {
        Ok(images) => images,
        Err(result) => {
            swap_d.destroy_swapchain(new_swapchain, None);
            return Err(InitError::SwapchainCreationFailed {
                call: "get_swapchain_images",
                result,
            });
        }
    };
    let views = match create_views(device, &images, surf_format.format) {
        Ok(views) => views,
        Err(e) => {
            swap_d.destroy_swapchain(new_swapchain, None);
            return Err(e);
        }
    };
    debug!("swapchain holds {} images", images.len());

    Ok(SwapchainBundle {
        swapchain: new_swapchain,
        format: surf_format.format,
        color_space: surf_format.color_space,
        present_mode,
        extent,
        images,
        views,
    })
}

impl SwapchainBundle {
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device, swap_d: &swapchain::Device) {
        destroy_views(device, &self.views);
        self.views.clear();
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            swap_d.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}
