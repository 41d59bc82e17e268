// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use anyhow::{anyhow, Result};
use dyntri_render::{RenderSize, SurfaceProvider, SurfaceSource};
use std::time::Duration;
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

// `resumed` can take a few round trips on Wayland before it fires.
const STARTUP_PUMPS: u32 = 200;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(5);

struct WindowState {
    title: String,
    requested: RenderSize,
    window: Option<Window>,
    create_error: Option<String>,
    close_requested: bool,
    size: RenderSize,
    pending_resize: Option<RenderSize>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.requested.width,
                self.requested.height,
            ));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let s = window.inner_size();
                self.size = RenderSize::new(s.width, s.height);
                info!("window ready ({}x{})", s.width, s.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                let size = RenderSize::new(new_size.width, new_size.height);
                if size != self.size {
                    debug!("Resized → {}x{}", size.width, size.height);
                    self.size = size;
                    self.pending_resize = Some(size);
                }
            }
            _ => {}
        }
    }
}

/// A winit window driven by `pump_app_events` instead of `run_app`, so the
/// caller keeps ownership of the frame loop.
pub struct WindowProvider {
    // Dropped before the event loop.
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WindowProvider {
    pub fn open(title: &str, size: RenderSize) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut state = WindowState {
            title: title.to_owned(),
            requested: size,
            window: None,
            create_error: None,
            close_requested: false,
            size,
            pending_resize: None,
        };

        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut state)
            {
                return Err(anyhow!("event loop exited during startup (code {code})"));
            }
            if let Some(e) = state.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if state.window.is_some() {
                return Ok(Self { state, event_loop });
            }
        }
        Err(anyhow!("window was not created after {STARTUP_PUMPS} event pumps"))
    }

    fn window(&self) -> Result<&Window> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("window already closed"))
    }
}

impl SurfaceProvider for WindowProvider {
    fn surface_source(&self) -> Result<SurfaceSource> {
        let window = self.window()?;
        let display = window
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let handle = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();
        Ok(SurfaceSource::Native {
            display,
            window: handle,
        })
    }

    fn size(&self) -> RenderSize {
        self.state.size
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn pump_events(&mut self) {
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
        {
            info!("event loop exited (code {code})");
            self.state.close_requested = true;
        }
    }

    fn take_resize(&mut self) -> Option<RenderSize> {
        self.state.pending_resize.take()
    }
}
