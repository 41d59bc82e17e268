// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{InitError, InitResult};

/// Frames the CPU may record ahead of the GPU.
pub const FRAMES_IN_FLIGHT: usize = 1;

/// Acquire semaphore plus the fence that guards reuse of this slot.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AcquireSlot {
    pub sem: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Acquire slots rotate per frame; render-finished semaphores are per swapchain
/// image because presentation may still hold one after its frame's fence fired.
#[derive(Debug, Default)]
pub struct FrameSyncRing {
    slots: Vec<AcquireSlot>,
    render_finished: Vec<vk::Semaphore>,
    cursor: usize,
}

pub(crate) fn next_slot(cursor: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (cursor + 1) % len
    }
}

unsafe fn create_semaphore(device: &ash::Device) -> InitResult<vk::Semaphore> {
    let ci = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    device.create_semaphore(&ci, None).map_err(InitError::Sync)
}

impl FrameSyncRing {
    pub(crate) unsafe fn new(device: &ash::Device, image_count: usize) -> InitResult<Self> {
        let mut ring = Self::default();
        if let Err(e) = ring.fill(device, image_count) {
            ring.destroy(device);
            return Err(e);
        }
        Ok(ring)
    }

    unsafe fn fill(&mut self, device: &ash::Device, image_count: usize) -> InitResult<()> {
        // Signaled so the very first wait returns at once.
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..FRAMES_IN_FLIGHT {
            let sem = create_semaphore(device)?;
            let fence = match device.create_fence(&fence_ci, None) {
                Ok(f) => f,
                Err(e) => {
                    device.destroy_semaphore(sem, None);
                    return Err(InitError::Sync(e));
                }
            };
            self.slots.push(AcquireSlot { sem, fence });
        }
        self.fill_image_semaphores(device, image_count)
    }

    unsafe fn fill_image_semaphores(&mut self, device: &ash::Device, image_count: usize) -> InitResult<()> {
        for _ in 0..image_count {
            let sem = create_semaphore(device)?;
            self.render_finished.push(sem);
        }
        Ok(())
    }

    unsafe fn destroy_image_semaphores(&mut self, device: &ash::Device) {
        for sem in self.render_finished.drain(..) {
            device.destroy_semaphore(sem, None);
        }
    }

    /// Replaces the per-image semaphores after a swapchain rebuild. The device
    /// must be idle.
    pub(crate) unsafe fn recreate_image_semaphores(
        &mut self,
        device: &ash::Device,
        image_count: usize,
    ) -> InitResult<()> {
        self.destroy_image_semaphores(device);
        self.fill_image_semaphores(device, image_count)
    }

    pub(crate) fn current(&self) -> AcquireSlot {
        self.slots[self.cursor]
    }

    pub(crate) fn render_finished(&self, image_index: u32) -> Option<vk::Semaphore> {
        self.render_finished.get(image_index as usize).copied()
    }

    pub(crate) fn advance(&mut self) {
        self.cursor = next_slot(self.cursor, self.slots.len());
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn image_semaphore_count(&self) -> usize {
        self.render_finished.len()
    }

    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        self.destroy_image_semaphores(device);
        for slot in self.slots.drain(..) {
            device.destroy_fence(slot.fence, None);
            device.destroy_semaphore(slot.sem, None);
        }
        self.cursor = 0;
    }
}
