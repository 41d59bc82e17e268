// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports 0 in one dimension; nothing can be presented then.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the presentation surface is created from.
#[derive(Clone, Copy, Debug)]
pub enum SurfaceSource {
    Native {
        display: RawDisplayHandle,
        window: RawWindowHandle,
    },
    /// No window at all; the backend uses an offscreen-capable surface.
    Headless,
}

/// The windowing collaborator the renderer is driven by.
///
/// Everything here must be non-blocking: the frame loop calls `should_close`
/// and `pump_events` once per iteration.
pub trait SurfaceProvider {
    fn surface_source(&self) -> Result<SurfaceSource>;
    fn size(&self) -> RenderSize;
    fn should_close(&self) -> bool;
    fn pump_events(&mut self);

    /// Returns the latest size change since the previous call, if any.
    fn take_resize(&mut self) -> Option<RenderSize> {
        None
    }
}

/// Window-less provider used by `--headless` runs and the integration tests.
///
/// It asks to close once `frame_budget` event pumps have happened, so a loop
/// that pumps once per frame renders exactly that many frames.
#[derive(Debug, Clone)]
pub struct HeadlessProvider {
    size: RenderSize,
    frame_budget: Option<u32>,
    pumped: u32,
    pending_resize: Option<RenderSize>,
}

impl HeadlessProvider {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            frame_budget: None,
            pumped: 0,
            pending_resize: None,
        }
    }

    pub fn with_frame_budget(mut self, frames: u32) -> Self {
        self.frame_budget = Some(frames);
        self
    }

    /// Simulates the host resizing the surface.
    pub fn resize(&mut self, size: RenderSize) {
        self.size = size;
        self.pending_resize = Some(size);
    }

    pub fn frames_pumped(&self) -> u32 {
        self.pumped
    }
}

impl SurfaceProvider for HeadlessProvider {
    fn surface_source(&self) -> Result<SurfaceSource> {
        Ok(SurfaceSource::Headless)
    }

    fn size(&self) -> RenderSize {
        self.size
    }

    fn should_close(&self) -> bool {
        matches!(self.frame_budget, Some(budget) if self.pumped >= budget)
    }

    fn pump_events(&mut self) {
        self.pumped = self.pumped.saturating_add(1);
    }

    fn take_resize(&mut self) -> Option<RenderSize> {
        self.pending_resize.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_closes_after_budget() {
        let mut p = HeadlessProvider::new(RenderSize::new(64, 64)).with_frame_budget(2);
        let mut frames = 0;
        while !p.should_close() {
            frames += 1;
            p.pump_events();
        }
        assert_eq!(frames, 2);
        assert_eq!(p.frames_pumped(), 2);
    }

    #[test]
    fn headless_without_budget_never_closes() {
        let mut p = HeadlessProvider::new(RenderSize::new(1, 1));
        for _ in 0..100 {
            p.pump_events();
        }
        assert!(!p.should_close());
    }

    #[test]
    fn resize_is_reported_once() {
        let mut p = HeadlessProvider::new(RenderSize::new(64, 64));
        assert_eq!(p.take_resize(), None);
        p.resize(RenderSize::new(128, 32));
        assert_eq!(p.size(), RenderSize::new(128, 32));
        assert_eq!(p.take_resize(), Some(RenderSize::new(128, 32)));
        assert_eq!(p.take_resize(), None);
    }

    #[test]
    fn empty_size() {
        assert!(RenderSize::new(0, 10).is_empty());
        assert!(RenderSize::new(10, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }

    #[test]
    fn headless_source() {
        let p = HeadlessProvider::new(RenderSize::new(8, 8));
        assert!(matches!(p.surface_source().unwrap(), SurfaceSource::Headless));
    }
}
