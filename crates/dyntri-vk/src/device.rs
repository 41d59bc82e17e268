// SPDX-License-Identifier: CEPL-1.0
use ash::{khr::surface, khr::swapchain, vk};
use std::ffi::CStr;
use tracing::{debug, info};

use crate::error::{InitError, InitResult};
use crate::instance::{api_version_string, REQUIRED_API_VERSION};

/// The physical device chosen for rendering plus the queue family that both
/// draws and presents to the surface.
#[derive(Clone, Debug)]
pub struct GpuSelection {
    pub phys: vk::PhysicalDevice,
    pub queue_family: u32,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
}

enum Rejection {
    Feature(&'static str),
    Other(String),
}

/// Lower ranks are preferred.
pub(crate) fn device_type_rank(t: vk::PhysicalDeviceType) -> u32 {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// First 1.3 feature the renderer needs that `feats13` lacks.
pub(crate) fn missing_feature(feats13: &vk::PhysicalDeviceVulkan13Features<'_>) -> Option<&'static str> {
    if feats13.dynamic_rendering == vk::FALSE {
        Some("dynamicRendering")
    } else if feats13.synchronization2 == vk::FALSE {
        Some("synchronization2")
    } else {
        None
    }
}

unsafe fn check_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    props: &vk::PhysicalDeviceProperties,
) -> Result<u32, Rejection> {
    if props.api_version < REQUIRED_API_VERSION {
        return Err(Rejection::Other(format!(
            "supports Vulkan {}, need 1.3",
            api_version_string(props.api_version)
        )));
    }

    let has_swapchain = instance
        .enumerate_device_extension_properties(phys)
        .map_err(|e| Rejection::Other(format!("enumerate_device_extension_properties: {e}")))?
        .iter()
        .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME));
    if !has_swapchain {
        return Err(Rejection::Other("no VK_KHR_swapchain".into()));
    }

    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        ..Default::default()
    };
    {
        let mut feats2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut feats13);
        instance.get_physical_device_features2(phys, &mut feats2);
    }
    if let Some(f) = missing_feature(&feats13) {
        return Err(Rejection::Feature(f));
    }

    let families = instance.get_physical_device_queue_family_properties(phys);
    for (i, fam) in families.iter().enumerate() {
        let i = i as u32;
        if !fam.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        let present = surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false);
        if present {
            return Ok(i);
        }
    }
    Err(Rejection::Other(
        "no queue family with both graphics and present support".into(),
    ))
}

/// Picks the best device that can render to `surface`: Vulkan 1.3 with
/// dynamic rendering and synchronization2, a graphics+present queue family and
/// the swapchain extension. Discrete GPUs win ties.
pub(crate) unsafe fn init_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> InitResult<GpuSelection> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|e| InitError::NoSuitableDevice(format!("enumerate_physical_devices: {e}")))?;
    if devices.is_empty() {
        return Err(InitError::NoSuitableDevice("no Vulkan devices present".into()));
    }

    let mut best: Option<GpuSelection> = None;
    let mut missing: Option<&'static str> = None;
    let mut rejections = Vec::new();
    let mut other_rejections = 0usize;

    for phys in devices {
        let props = instance.get_physical_device_properties(phys);
        let name = props
            .device_name_as_c_str()
            .map(CStr::to_string_lossy)
            .map(|n| n.into_owned())
            .unwrap_or_else(|_| "<unnamed>".into());

        match check_device(instance, surface_loader, surface, phys, &props) {
            Ok(queue_family) => {
                debug!("candidate {name} ({:?}), queue family {queue_family}", props.device_type);
                let better = best.as_ref().map_or(true, |b| {
                    device_type_rank(props.device_type) < device_type_rank(b.device_type)
                });
                if better {
                    best = Some(GpuSelection {
                        phys,
                        queue_family,
                        name,
                        device_type: props.device_type,
                        api_version: props.api_version,
                    });
                }
            }
            Err(Rejection::Feature(f)) => {
                debug!("skipping {name}: missing {f}");
                missing.get_or_insert(f);
                rejections.push(format!("{name}: missing {f}"));
            }
            Err(Rejection::Other(reason)) => {
                debug!("skipping {name}: {reason}");
                other_rejections += 1;
                rejections.push(format!("{name}: {reason}"));
            }
        }
    }

    match (best, missing) {
        (Some(sel), _) => {
            info!(
                "GPU: {} ({:?}, Vulkan {})",
                sel.name,
                sel.device_type,
                api_version_string(sel.api_version)
            );
            Ok(sel)
        }
        // Only report a missing feature when that was the sole reason.
        (None, Some(f)) if other_rejections == 0 => Err(InitError::MissingRequiredFeature(f)),
        (None, _) => Err(InitError::NoSuitableDevice(rejections.join("; "))),
    }
}

/// Creates the logical device with one queue from `sel.queue_family`,
/// `VK_KHR_swapchain` and the 1.3 dynamic rendering + synchronization2 features.
pub(crate) unsafe fn init_device(
    instance: &ash::Instance,
    sel: &GpuSelection,
) -> InitResult<(ash::Device, vk::Queue)> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: sel.queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let device_exts = [swapchain::NAME.as_ptr()];

    // Core 1.3 structs only; do not mix in the KHR equivalents.
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        dynamic_rendering: vk::TRUE,
        synchronization2: vk::TRUE,
        ..Default::default()
    };

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        p_next: (&mut feats13) as *mut _ as *const std::ffi::c_void,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    let device = instance
        .create_device(sel.phys, &dinfo, None)
        .map_err(InitError::DeviceCreation)?;
    let queue = device.get_device_queue(sel.queue_family, 0);
    debug!("logical device created, queue family {}", sel.queue_family);
    Ok((device, queue))
}
