// SPDX-License-Identifier: CEPL-1.0
use ash::{ext::headless_surface, khr::surface, vk, Entry, Instance};
use dyntri_render::SurfaceSource;
use std::ffi::{c_char, CStr, CString};
use tracing::{info, warn};

use crate::debug::DebugMessenger;
use crate::error::{InitError, InitResult};

pub const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_3;
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"dyntri";

/// Loads the Vulkan loader at runtime so a machine without one gets an error
/// instead of a link failure.
pub(crate) fn load_entry() -> InitResult<Entry> {
    let entry = unsafe { Entry::load()? };
    Ok(entry)
}

pub(crate) fn api_version_string(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

/// Instance extensions the surface needs, before any optional ones.
unsafe fn surface_extensions(source: &SurfaceSource) -> InitResult<Vec<*const c_char>> {
    match source {
        SurfaceSource::Native { display, .. } => ash_window::enumerate_required_extensions(*display)
            .map(|exts| exts.to_vec())
            .map_err(|e| {
                InitError::SurfaceCreationFailed(format!("enumerate_required_extensions: {e}"))
            }),
        SurfaceSource::Headless => Ok(vec![
            surface::NAME.as_ptr(),
            headless_surface::NAME.as_ptr(),
        ]),
    }
}

/// Creates a Vulkan 1.3 instance with the extensions `source` needs.
///
/// With `validation` set, the Khronos validation layer and `VK_EXT_debug_utils`
/// are enabled when the loader has them; their absence is only a warning.
pub(crate) unsafe fn init_instance(
    entry: &Entry,
    source: &SurfaceSource,
    app_name: &str,
    validation: bool,
) -> InitResult<(Instance, Option<DebugMessenger>)> {
    // --- Loader version ---
    let loader_version = entry
        .try_enumerate_instance_version()
        .map_err(InitError::InstanceCreation)?
        .unwrap_or(vk::API_VERSION_1_0);
    if loader_version < REQUIRED_API_VERSION {
        return Err(InitError::MissingRequiredFeature("Vulkan 1.3 instance"));
    }

    // --- Extensions ---
    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(InitError::InstanceCreation)?;
    let has_ext = |name: &CStr| {
        available
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
    };

    let mut exts = surface_extensions(source)?;
    for &ext in &exts {
        let name = CStr::from_ptr(ext);
        if !has_ext(name) {
            return Err(InitError::SurfaceCreationFailed(format!(
                "instance extension {} not available",
                name.to_string_lossy()
            )));
        }
    }

    // --- Validation (optional) ---
    let mut layers: Vec<*const c_char> = Vec::new();
    let mut debug_utils = false;
    if validation {
        let have_layer = entry
            .enumerate_instance_layer_properties()
            .map_err(InitError::InstanceCreation)?
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
        if have_layer {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        if has_ext(ash::ext::debug_utils::NAME) {
            exts.push(ash::ext::debug_utils::NAME.as_ptr());
            debug_utils = true;
        } else {
            warn!("VK_EXT_debug_utils unavailable; validation output will not be captured");
        }
    }

    // --- Instance ---
    let app = CString::new(app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: REQUIRED_API_VERSION,
        ..Default::default()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(InitError::InstanceCreation)?;
    info!(
        "Vulkan instance created (loader {}, validation: {})",
        api_version_string(loader_version),
        !layers.is_empty()
    );

    let debug = if debug_utils {
        match DebugMessenger::new(entry, &instance) {
            Ok(d) => Some(d),
            Err(e) => {
                instance.destroy_instance(None);
                return Err(e);
            }
        }
    } else {
        None
    };

    Ok((instance, debug))
}

/// Creates the presentation surface from THIS instance.
pub(crate) unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    source: &SurfaceSource,
) -> InitResult<vk::SurfaceKHR> {
    match *source {
        SurfaceSource::Native { display, window } => {
            ash_window::create_surface(entry, instance, display, window, None)
                .map_err(|e| InitError::SurfaceCreationFailed(format!("ash_window: {e}")))
        }
        SurfaceSource::Headless => {
            let loader = headless_surface::Instance::new(entry, instance);
            let ci = vk::HeadlessSurfaceCreateInfoEXT {
                s_type: vk::StructureType::HEADLESS_SURFACE_CREATE_INFO_EXT,
                ..Default::default()
            };
            loader
                .create_headless_surface(&ci, None)
                .map_err(|e| InitError::SurfaceCreationFailed(format!("headless: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_string_formats_all_parts() {
        assert_eq!(api_version_string(vk::make_api_version(0, 1, 3, 250)), "1.3.250");
    }

    #[test]
    fn headless_needs_surface_and_headless_extensions() {
        let exts = unsafe { surface_extensions(&SurfaceSource::Headless).unwrap() };
        let names: Vec<&CStr> = exts.iter().map(|&p| unsafe { CStr::from_ptr(p) }).collect();
        assert_eq!(names, [surface::NAME, headless_surface::NAME]);
    }
}
