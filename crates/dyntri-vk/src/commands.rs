// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{InitError, InitResult};

/// The one resettable pool and the single primary buffer re-recorded every frame.
pub struct CommandResources {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

pub(crate) unsafe fn create_primary_command_resources(
    device: &ash::Device,
    queue_family: u32,
) -> InitResult<CommandResources> {
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: queue_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    let pool = device
        .create_command_pool(&pool_info, None)
        .map_err(|result| InitError::CommandResources {
            call: "create_command_pool",
            result,
        })?;

    let alloc_info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let buffer = match device.allocate_command_buffers(&alloc_info) {
        Ok(bufs) => bufs[0],
        Err(result) => {
            device.destroy_command_pool(pool, None);
            return Err(InitError::CommandResources {
                call: "allocate_command_buffers",
                result,
            });
        }
    };

    Ok(CommandResources { pool, buffer })
}

impl CommandResources {
    /// Frees the buffer along with its pool.
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}
