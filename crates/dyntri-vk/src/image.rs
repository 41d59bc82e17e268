// SPDX-License-Identifier: CEPL-1.0
//! Layout transitions and clears on swapchain images.
use ash::vk;
use tracing::warn;

/// Black, fully opaque.
pub const DEFAULT_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Color aspect, first mip, first layer.
pub fn basic_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

// Coarse but always correct: any real stage gets the full memory mask.
fn coarse_access(stage: vk::PipelineStageFlags2, dst: bool) -> vk::AccessFlags2 {
    if stage == vk::PipelineStageFlags2::NONE
        || stage == vk::PipelineStageFlags2::TOP_OF_PIPE
        || stage == vk::PipelineStageFlags2::BOTTOM_OF_PIPE
    {
        vk::AccessFlags2::empty()
    } else if dst {
        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE
    } else {
        vk::AccessFlags2::MEMORY_WRITE
    }
}

/// Builds a synchronization2 layout transition for the whole color image.
pub fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_stage: vk::PipelineStageFlags2,
    dst_stage: vk::PipelineStageFlags2,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: src_stage,
        src_access_mask: coarse_access(src_stage, false),
        dst_stage_mask: dst_stage,
        dst_access_mask: coarse_access(dst_stage, true),
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: basic_subresource_range(),
        ..Default::default()
    }
}

/// Records `image_barrier` into `cmd` and hands back what was recorded.
pub unsafe fn insert_memory_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_stage: vk::PipelineStageFlags2,
    dst_stage: vk::PipelineStageFlags2,
) -> vk::ImageMemoryBarrier2<'static> {
    let barrier = image_barrier(image, old_layout, new_layout, src_stage, dst_stage);
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &barrier,
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
    barrier
}

/// Transfer-clears the whole color image. `layout` must be `TRANSFER_DST_OPTIMAL` or `GENERAL`.
pub unsafe fn clear_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    layout: vk::ImageLayout,
    color: [f32; 4],
) {
    let value = vk::ClearColorValue { float32: color };
    device.cmd_clear_color_image(cmd, image, layout, &value, &[basic_subresource_range()]);
}

/// What each swapchain image was last transitioned to on the GPU timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutTracker {
    layouts: Vec<vk::ImageLayout>,
}

impl LayoutTracker {
    pub fn new(image_count: usize) -> Self {
        Self {
            layouts: vec![vk::ImageLayout::UNDEFINED; image_count],
        }
    }

    pub fn get(&self, index: usize) -> Option<vk::ImageLayout> {
        self.layouts.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Applies a recorded barrier. `UNDEFINED` as the old layout discards
    /// contents, so it is valid from any state.
    pub fn record(&mut self, index: usize, barrier: &vk::ImageMemoryBarrier2<'_>) {
        let Some(slot) = self.layouts.get_mut(index) else {
            warn!("layout record for image {index} outside swapchain");
            return;
        };
        if barrier.old_layout != vk::ImageLayout::UNDEFINED && *slot != barrier.old_layout {
            warn!(
                "image {index}: barrier expects {:?} but image is in {:?}",
                barrier.old_layout, *slot
            );
        }
        *slot = barrier.new_layout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn img() -> vk::Image {
        vk::Image::from_raw(0x1234)
    }

    #[test]
    fn subresource_range_covers_first_mip_and_layer() {
        let r = basic_subresource_range();
        assert_eq!(r.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!((r.base_mip_level, r.level_count), (0, 1));
        assert_eq!((r.base_array_layer, r.layer_count), (0, 1));
    }

    #[test]
    fn barrier_carries_layouts_and_stages() {
        let b = image_barrier(
            img(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        );
        assert_eq!(b.s_type, vk::StructureType::IMAGE_MEMORY_BARRIER_2);
        assert_eq!(b.image, img());
        assert_eq!(b.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(b.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(b.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(b.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(b.src_access_mask, vk::AccessFlags2::MEMORY_WRITE);
        assert_eq!(
            b.dst_access_mask,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE
        );
        assert_eq!(b.subresource_range.layer_count, 1);
    }

    #[test]
    fn pipe_ends_need_no_access() {
        let b = image_barrier(
            img(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        );
        assert_eq!(b.dst_access_mask, vk::AccessFlags2::empty());

        let b = image_barrier(
            img(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::PipelineStageFlags2::TRANSFER,
        );
        assert_eq!(b.src_access_mask, vk::AccessFlags2::empty());
    }

    #[test]
    fn chained_transitions_end_in_last_layout() {
        let mut t = LayoutTracker::new(2);
        assert_eq!(t.get(0), Some(vk::ImageLayout::UNDEFINED));

        let stage = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        let to_color = image_barrier(
            img(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            stage,
            stage,
        );
        let to_present = image_barrier(
            img(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            stage,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        );
        t.record(1, &to_color);
        t.record(1, &to_present);

        assert_eq!(t.get(0), Some(vk::ImageLayout::UNDEFINED));
        assert_eq!(t.get(1), Some(vk::ImageLayout::PRESENT_SRC_KHR));
        assert_eq!(t.get(2), None);
    }

    #[test]
    fn out_of_range_record_is_ignored() {
        let mut t = LayoutTracker::new(1);
        let b = image_barrier(
            img(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::PipelineStageFlags2::ALL_COMMANDS,
        );
        t.record(5, &b);
        assert_eq!(t, LayoutTracker::new(1));
    }
}
