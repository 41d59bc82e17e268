// SPDX-License-Identifier: CEPL-1.0
use ash::{ext::debug_utils, vk};
use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, trace, warn};

use crate::error::{InitError, InitResult};

/// `VK_EXT_debug_utils` messenger that forwards driver/validation messages to
/// tracing and counts validation errors.
pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Boxed so the address handed to the driver as user data stays put.
    errors: Box<AtomicU32>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    let msg = if data.is_null() {
        Default::default()
    } else {
        (*data)
            .message_as_c_str()
            .map(|m| m.to_string_lossy())
            .unwrap_or_default()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        if !user.is_null() {
            (*(user as *const AtomicU32)).fetch_add(1, Ordering::Relaxed);
        }
        error!("[vulkan {:?}] {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {:?}] {}", types, msg);
    } else {
        trace!("[vulkan {:?}] {}", types, msg);
    }
    vk::FALSE
}

impl DebugMessenger {
    pub(crate) unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> InitResult<Self> {
        let errors = Box::new(AtomicU32::new(0));
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            p_user_data: (&*errors as *const AtomicU32) as *mut c_void,
            ..Default::default()
        };

        let loader = debug_utils::Instance::new(entry, instance);
        let messenger = loader
            .create_debug_utils_messenger(&ci, None)
            .map_err(InitError::InstanceCreation)?;
        debug!("debug messenger installed");

        Ok(Self {
            loader,
            messenger,
            errors,
        })
    }

    pub(crate) fn validation_errors(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }

    pub(crate) unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}
