mod input_state;

use super::renderer::Renderer;
use color_eyre::eyre::{OptionExt, Report};
use color_eyre::Result;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId};
use crate::app::input_state::InputState;
use crate::renderer::config::Config;

pub struct App {
    config: Config,
    event_loop: Option<EventLoop<()>>,

    // Dropped before the window it presents to
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    // State
    input_state: InputState,
    frame_count: u64,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        Ok(Self {
            config,
            event_loop: Some(event_loop),

            renderer: None,
            window: None,

            input_state: InputState::default(),
            frame_count: 0,
            close_requested: false,
            error: None,
        })
    }

    /// Runs the render loop until the window is closed or something fails
    pub fn run(mut self) -> Result<()> {
        let event_loop = self.event_loop
            .take()
            .ok_or_eyre("Event loop already consumed")?;
        event_loop.run_app(&mut self)?;

        log::info!("Render loop finished after {} frames", self.frame_count);
        loop_result(self.error.take())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        keep_first_error(&mut self.error, error);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let attributes = self.config.window.window_attributes();
            let window = Arc::new(event_loop.create_window(attributes)?);
            log::info!(
                "Window \"{}\" created ({}x{})",
                self.config.window.title,
                window.inner_size().width,
                window.inner_size().height,
            );
            self.window = Some(window);
        }

        if self.renderer.is_none() {
            let window = self.window
                .clone()
                .ok_or_eyre("No window to render to")?;
            self.renderer = Some(Renderer::new(window, &self.config)?);
        }

        Ok(())
    }

    fn handle_window_event(&mut self, event: WindowEvent) -> Result<()> {
        // Closing on release lets the key press reach the window first
        if self.input_state.process_window_events(&event) == Some(KeyCode::Escape) {
            self.close_requested = true;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.draw()?;
                    self.frame_count += 1;
                }
            }
            _ => {}
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        if let Err(e) = self.handle_window_event(event) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested || self.error.is_some() {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Waits for the device to go idle, then releases everything in reverse creation order
        self.renderer = None;
        self.window = None;
    }
}

/// Later errors are only logged; the first one is what `run` reports
fn keep_first_error(slot: &mut Option<Report>, error: Report) {
    log::error!("{:?}", error);
    if slot.is_none() {
        *slot = Some(error);
    }
}

fn loop_result(error: Option<Report>) -> Result<()> {
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;

    #[test]
    fn first_error_wins() {
        let mut slot = None;
        keep_first_error(&mut slot, eyre!("No suitable physical device found"));
        keep_first_error(&mut slot, eyre!("Failed to wait for device idle"));

        let err = loop_result(slot).unwrap_err();
        assert_eq!(err.to_string(), "No suitable physical device found");
    }

    #[test]
    fn clean_exit_is_ok() {
        assert!(loop_result(None).is_ok());
    }
}
