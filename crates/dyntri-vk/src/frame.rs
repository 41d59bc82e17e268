// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use dyntri_render::{RenderSize, SurfaceProvider};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{ClearStrategy, RenderConfig};
use crate::context::RenderContext;
use crate::error::{FrameError, FrameResult, InitResult};
use crate::image::{clear_image, insert_memory_barrier};
use crate::pipeline::{build_triangle_pipeline, DynamicRenderingPipeline, PipelineConfig, ShaderSet};

/// Outcome of one `draw_frame` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32, rebuilt: bool },
    /// The surface has no area; nothing was submitted.
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub presented: u64,
    pub skipped: u64,
    pub rebuilds: u64,
    pub recovered: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Acquired {
    pub image_index: u32,
    pub suboptimal: bool,
    pub rebuilds: u32,
}

/// Runs `acquire` until it hands out an image. An out-of-date swapchain is
/// rebuilt and acquisition retried, at most `max_rebuilds` times; after that
/// the out-of-date error is returned as recoverable.
pub(crate) fn acquire_with_rebuild<S>(
    state: &mut S,
    max_rebuilds: u32,
    mut acquire: impl FnMut(&mut S) -> VkResult<(u32, bool)>,
    mut rebuild: impl FnMut(&mut S) -> FrameResult<()>,
) -> FrameResult<Acquired> {
    let mut rebuilds = 0;
    loop {
        match acquire(state) {
            Ok((image_index, suboptimal)) => {
                return Ok(Acquired {
                    image_index,
                    suboptimal,
                    rebuilds,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if rebuilds < max_rebuilds => {
                rebuilds += 1;
                warn!("acquire: swapchain out of date, rebuilding (attempt {rebuilds})");
                rebuild(state)?;
            }
            Err(e) => return Err(FrameError::from_vk("acquire_next_image", e)),
        }
    }
}

/// Folds one frame result into `summary`. Recoverable errors mark the
/// swapchain stale and yield `None`; fatal ones are returned.
fn tally(
    summary: &mut RunSummary,
    stale: &mut bool,
    result: FrameResult<FrameStatus>,
) -> FrameResult<Option<FrameStatus>> {
    match result {
        Ok(status @ FrameStatus::Presented { rebuilt, .. }) => {
            summary.presented += 1;
            if rebuilt {
                summary.rebuilds += 1;
            }
            Ok(Some(status))
        }
        Ok(FrameStatus::Skipped) => {
            summary.skipped += 1;
            Ok(Some(FrameStatus::Skipped))
        }
        Err(e) if e.is_recoverable() => {
            warn!("{e}; rebuilding next frame");
            *stale = true;
            summary.recovered += 1;
            Ok(None)
        }
        Err(e) => {
            error!("frame failed: {e}");
            Err(e)
        }
    }
}

/// Owns the context and the triangle pipeline, and turns one call into one
/// presented frame.
pub struct FrameLoop {
    pipeline: DynamicRenderingPipeline,
    pipeline_config: PipelineConfig,
    shaders: ShaderSet,
    clear_color: [f32; 4],
    clear_strategy: ClearStrategy,
    max_rebuild_attempts: u32,
    stale: bool,
    // Dropped after `pipeline` is destroyed in `Drop`.
    ctx: RenderContext,
}

impl FrameLoop {
    pub fn new(ctx: RenderContext, cfg: &RenderConfig) -> InitResult<Self> {
        let pipeline =
            build_triangle_pipeline(&ctx.device, ctx.swapchain_format(), &cfg.shaders, &cfg.pipeline)?;
        Ok(Self {
            pipeline,
            pipeline_config: cfg.pipeline.clone(),
            shaders: cfg.shaders.clone(),
            clear_color: cfg.clear_color,
            clear_strategy: cfg.clear_strategy,
            max_rebuild_attempts: cfg.max_rebuild_attempts,
            stale: false,
            ctx,
        })
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn pipeline(&self) -> &DynamicRenderingPipeline {
        &self.pipeline
    }

    /// Forces a swapchain rebuild before the next frame.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    fn rebuild(&mut self, hint: RenderSize) -> FrameResult<()> {
        let format_changed = unsafe { self.ctx.rebuild_swapchain(hint)? };
        if format_changed {
            info!("swapchain format changed; rebuilding pipeline");
            let fresh = build_triangle_pipeline(
                &self.ctx.device,
                self.ctx.swapchain_format(),
                &self.shaders,
                &self.pipeline_config,
            )?;
            unsafe { self.pipeline.destroy(&self.ctx.device) };
            self.pipeline = fresh;
        }
        self.stale = false;
        Ok(())
    }

    /// Acquire, record, submit and present one frame, then wait for the device
    /// to go idle.
    pub fn draw_frame(&mut self, hint: RenderSize) -> FrameResult<FrameStatus> {
        if hint.is_empty() {
            return Ok(FrameStatus::Skipped);
        }

        let mut rebuilt = false;
        if self.stale {
            self.rebuild(hint)?;
            rebuilt = true;
        }

        unsafe {
            let slot = self.ctx.sync.current();
            self.ctx
                .device
                .wait_for_fences(&[slot.fence], true, u64::MAX)
                .map_err(|e| FrameError::from_vk("wait_for_fences", e))?;

            // 1) Acquire
            let max_rebuilds = self.max_rebuild_attempts;
            let acquired = acquire_with_rebuild(
                &mut *self,
                max_rebuilds,
                |fl| {
                    fl.ctx.swapchain_loader.acquire_next_image(
                        fl.ctx.swapchain.swapchain,
                        u64::MAX,
                        slot.sem,
                        vk::Fence::null(),
                    )
                },
                |fl| fl.rebuild(hint),
            )?;
            let (image_index, suboptimal) = (acquired.image_index, acquired.suboptimal);
            rebuilt |= acquired.rebuilds > 0;

            // 2) Record
            self.record(image_index)?;

            // 3) Submit
            let Some(render_finished) = self.ctx.sync.render_finished(image_index) else {
                return Err(FrameError::Vulkan {
                    call: "acquire_next_image",
                    result: vk::Result::ERROR_UNKNOWN,
                });
            };
            let cmd = self.ctx.commands.buffer;
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                wait_semaphore_count: 1,
                p_wait_semaphores: &slot.sem,
                p_wait_dst_stage_mask: wait_stages.as_ptr(),
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                signal_semaphore_count: 1,
                p_signal_semaphores: &render_finished,
                ..Default::default()
            };
            // Reset only once a submit is certain to signal it again.
            self.ctx
                .device
                .reset_fences(&[slot.fence])
                .map_err(|e| FrameError::from_vk("reset_fences", e))?;
            self.ctx
                .device
                .queue_submit(self.ctx.queue, std::slice::from_ref(&submit), slot.fence)
                .map_err(|e| FrameError::from_vk("queue_submit", e))?;

            // 4) Present
            let present = vk::PresentInfoKHR {
                s_type: vk::StructureType::PRESENT_INFO_KHR,
                wait_semaphore_count: 1,
                p_wait_semaphores: &render_finished,
                swapchain_count: 1,
                p_swapchains: &self.ctx.swapchain.swapchain,
                p_image_indices: &image_index,
                ..Default::default()
            };
            match self
                .ctx
                .swapchain_loader
                .queue_present(self.ctx.queue, &present)
            {
                Ok(false) if !suboptimal => {}
                Ok(_) => {
                    debug!("present: surface suboptimal, rebuilding next frame");
                    self.stale = true;
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    debug!("present: swapchain out of date, rebuilding next frame");
                    self.stale = true;
                }
                Err(e) => return Err(FrameError::from_vk("queue_present", e)),
            }

            // 5) Settle
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| FrameError::from_vk("device_wait_idle", e))?;
            self.ctx.sync.advance();

            Ok(FrameStatus::Presented {
                image_index,
                rebuilt,
            })
        }
    }

    unsafe fn record(&mut self, image_index: u32) -> FrameResult<()> {
        let i = image_index as usize;
        let ctx = &mut self.ctx;
        let d = &ctx.device;
        let cmd = ctx.commands.buffer;
        let image = ctx.swapchain.images[i];
        let view = ctx.swapchain.views[i];
        let extent = ctx.swapchain.extent;

        d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(|e| FrameError::from_vk("reset_command_buffer", e))?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)
            .map_err(|e| FrameError::from_vk("begin_command_buffer", e))?;

        let color_stage = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        let load_op = match self.clear_strategy {
            ClearStrategy::LoadOp => {
                let b = insert_memory_barrier(
                    d,
                    cmd,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    color_stage,
                    color_stage,
                );
                ctx.layouts.record(i, &b);
                vk::AttachmentLoadOp::CLEAR
            }
            ClearStrategy::Transfer => {
                let b = insert_memory_barrier(
                    d,
                    cmd,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    color_stage,
                    vk::PipelineStageFlags2::TRANSFER,
                );
                ctx.layouts.record(i, &b);
                clear_image(
                    d,
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    self.clear_color,
                );
                let b = insert_memory_barrier(
                    d,
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::PipelineStageFlags2::TRANSFER,
                    color_stage,
                );
                ctx.layouts.record(i, &b);
                vk::AttachmentLoadOp::LOAD
            }
        };

        // Dynamic rendering: no render pass, no framebuffer.
        let color_att = vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            image_view: view,
            image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            ..Default::default()
        };
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            render_area,
            layer_count: 1,
            color_attachment_count: 1,
            p_color_attachments: &color_att,
            ..Default::default()
        };
        d.cmd_begin_rendering(cmd, &rendering_info);

        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        d.cmd_set_viewport(cmd, 0, &[viewport]);
        d.cmd_set_scissor(cmd, 0, &[render_area]);
        d.cmd_draw(cmd, 3, 1, 0, 0);

        d.cmd_end_rendering(cmd);

        let b = insert_memory_barrier(
            d,
            cmd,
            image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            color_stage,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        );
        ctx.layouts.record(i, &b);

        d.end_command_buffer(cmd)
            .map_err(|e| FrameError::from_vk("end_command_buffer", e))?;
        Ok(())
    }

    /// Draws until the provider asks to close or `max_frames` frames were
    /// presented. Recoverable errors are logged and retried next iteration.
    pub fn run(
        &mut self,
        provider: &mut dyn SurfaceProvider,
        max_frames: Option<u64>,
    ) -> FrameResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut window_start = Instant::now();
        let mut window_frames = 0u32;

        while !provider.should_close() {
            if max_frames.is_some_and(|limit| summary.presented >= limit) {
                break;
            }
            if let Some(size) = provider.take_resize() {
                debug!("resize → {}x{}", size.width, size.height);
                self.mark_stale();
            }

            let result = self.draw_frame(provider.size());
            match tally(&mut summary, &mut self.stale, result)? {
                Some(FrameStatus::Presented { .. }) => window_frames += 1,
                // Minimized: don't spin.
                Some(FrameStatus::Skipped) => std::thread::sleep(Duration::from_millis(16)),
                None => {}
            }

            provider.pump_events();

            let elapsed = window_start.elapsed();
            if elapsed >= Duration::from_secs(1) {
                debug!("fps ~ {:.1}", window_frames as f64 / elapsed.as_secs_f64());
                window_start = Instant::now();
                window_frames = 0;
            }
        }

        info!(
            "frame loop finished: {} presented, {} skipped, {} rebuilds",
            summary.presented, summary.skipped, summary.rebuilds
        );
        Ok(summary)
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            self.pipeline.destroy(&self.ctx.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InitError, Recoverable};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Script {
        results: VecDeque<VkResult<(u32, bool)>>,
        acquires: u32,
        rebuilds: u32,
        fail_rebuild: bool,
    }

    impl Script {
        fn new(results: impl IntoIterator<Item = VkResult<(u32, bool)>>) -> Self {
            Self {
                results: results.into_iter().collect(),
                ..Default::default()
            }
        }

        fn acquire(&mut self) -> FrameResult<Acquired> {
            acquire_with_rebuild(
                self,
                3,
                |s| {
                    s.acquires += 1;
                    s.results
                        .pop_front()
                        .unwrap_or(Err(vk::Result::ERROR_OUT_OF_DATE_KHR))
                },
                |s| {
                    s.rebuilds += 1;
                    if s.fail_rebuild {
                        return Err(InitError::SwapchainCreationFailed {
                            call: "create_swapchain",
                            result: vk::Result::ERROR_INITIALIZATION_FAILED,
                        }
                        .into());
                    }
                    Ok(())
                },
            )
        }
    }

    const OUT_OF_DATE: VkResult<(u32, bool)> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);

    #[test]
    fn first_acquire_needs_no_rebuild() {
        let mut s = Script::new([Ok((2, false))]);
        let got = s.acquire().unwrap();
        assert_eq!(
            got,
            Acquired {
                image_index: 2,
                suboptimal: false,
                rebuilds: 0
            }
        );
        assert_eq!((s.acquires, s.rebuilds), (1, 0));
    }

    #[test]
    fn out_of_date_rebuilds_then_retries() {
        let mut s = Script::new([OUT_OF_DATE, Ok((1, true))]);
        let got = s.acquire().unwrap();
        assert_eq!(got.image_index, 1);
        assert!(got.suboptimal);
        assert_eq!(got.rebuilds, 1);
        assert_eq!((s.acquires, s.rebuilds), (2, 1));
    }

    #[test]
    fn rebuilds_are_bounded() {
        let mut s = Script::new([]);
        match s.acquire() {
            Err(FrameError::Recoverable(Recoverable::SwapchainOutOfDate)) => {}
            other => panic!("expected out-of-date, got {other:?}"),
        }
        assert_eq!((s.acquires, s.rebuilds), (4, 3));
    }

    #[test]
    fn device_lost_skips_rebuild() {
        let mut s = Script::new([Err(vk::Result::ERROR_DEVICE_LOST)]);
        assert!(matches!(s.acquire(), Err(FrameError::DeviceLost)));
        assert_eq!((s.acquires, s.rebuilds), (1, 0));
    }

    #[test]
    fn failed_rebuild_is_returned() {
        let mut s = Script::new([OUT_OF_DATE]);
        s.fail_rebuild = true;
        let err = s.acquire().unwrap_err();
        assert!(matches!(err, FrameError::Rebuild(_)), "{err}");
        assert!(!err.is_recoverable());
        assert_eq!((s.acquires, s.rebuilds), (1, 1));
    }

    #[test]
    fn recoverable_frame_error_marks_stale_and_continues() {
        let mut summary = RunSummary::default();
        let mut stale = false;
        let got = tally(
            &mut summary,
            &mut stale,
            Err(FrameError::Recoverable(Recoverable::SwapchainOutOfDate)),
        )
        .unwrap();
        assert_eq!(got, None);
        assert!(stale);
        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.presented, 0);
    }

    #[test]
    fn tally_counts_frames() {
        let mut summary = RunSummary::default();
        let mut stale = false;
        let presented = |rebuilt| {
            Ok(FrameStatus::Presented {
                image_index: 0,
                rebuilt,
            })
        };
        tally(&mut summary, &mut stale, presented(true)).unwrap();
        tally(&mut summary, &mut stale, presented(false)).unwrap();
        tally(&mut summary, &mut stale, Ok(FrameStatus::Skipped)).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                presented: 2,
                skipped: 1,
                rebuilds: 1,
                recovered: 0
            }
        );
        assert!(!stale);
    }

    #[test]
    fn device_lost_stops_the_loop() {
        let mut summary = RunSummary::default();
        let mut stale = false;
        let err = tally(&mut summary, &mut stale, Err(FrameError::DeviceLost)).unwrap_err();
        assert!(matches!(err, FrameError::DeviceLost));
        assert!(!stale);
    }
}
