use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::assets::{AssetDirectory, ImageSource};
use crate::gpu::GpuBackend;
use crate::input::{PointerSource, SensorSource, SweepSensor};
use crate::session::{FrameOutcome, LoopState, RenderSession};
use crate::types::{InputMode, RendererConfig};
use crate::uniforms::Viewport;

/// What a key press asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyAction {
    Select(String),
    Quit,
    Ignore,
}

/// Window, session and pointer for the desktop host.
///
/// The session owns the surface, so it is declared (and dropped) before the window.
struct HostWindow {
    session: RenderSession<GpuBackend>,
    pointer: PointerSource,
    window: Arc<Window>,
}

impl HostWindow {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let size = window.inner_size();
        let backend = GpuBackend::new(window.as_ref(), size, config.antialiasing, config.power)
            .context("failed to initialise GPU backend")?;

        let images: Arc<dyn ImageSource> = Arc::new(AssetDirectory::new(config.asset_root.clone()));
        let mut session = RenderSession::new(backend, Arc::clone(&config.registry), images);
        session
            .set_active_demo(config.initial_demo_id())
            .context("failed to select initial demo")?;
        session
            .prepare(Viewport::new(size.width, size.height, window.scale_factor()))
            .context("failed to prepare render session")?;

        let pointer = PointerSource::new(f64::from(size.width), f64::from(size.height));
        // Desktop hosts carry no motion hardware; the sweep only runs when asked for by name.
        let sensor = match config.input.mode {
            InputMode::Sensor => {
                let amplitude = config.input.max_tilt_x.max(config.input.max_tilt_y) * 4.0 / 3.0;
                Some(SensorSource::new(
                    Box::new(SweepSensor::new(config.input.sweep_period, amplitude)),
                    config.input.sensor_options(),
                ))
            }
            InputMode::Auto | InputMode::Pointer => None,
        };
        let attached = session.attach_inputs(config.input.mode, pointer.clone(), sensor);
        info!(inputs = ?attached, mode = ?config.input.mode, "tilt inputs ready");

        Ok(Self {
            session,
            pointer,
            window,
        })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.session.backend_mut().resize(new_size);
        self.pointer
            .viewport_resized(f64::from(new_size.width), f64::from(new_size.height));
        let viewport = Viewport::new(new_size.width, new_size.height, self.window.scale_factor());
        if let Err(err) = self.session.resize(viewport) {
            debug!(%err, "ignoring degenerate resize");
        }
    }

    fn rescale(&mut self, scale_factor: f64) {
        let current = self.session.viewport();
        let viewport = Viewport::new(current.width, current.height, scale_factor);
        if let Err(err) = self.session.resize(viewport) {
            debug!(%err, "ignoring scale factor change");
        }
    }

    fn key_action(&self, event: &KeyEvent) -> KeyAction {
        if event.state != ElementState::Pressed || event.repeat {
            return KeyAction::Ignore;
        }
        let registry = self.session.registry();
        let current = self
            .session
            .pending_demo()
            .or_else(|| self.session.active_demo().map(|demo| demo.id.as_str()))
            .unwrap_or_else(|| registry.default_id());
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => KeyAction::Quit,
            Key::Named(NamedKey::ArrowRight) => KeyAction::Select(registry.next_after(current).id.clone()),
            Key::Named(NamedKey::ArrowLeft) => {
                KeyAction::Select(registry.previous_before(current).id.clone())
            }
            Key::Character(value) => digit_selection(value.as_str())
                .and_then(|position| registry.nth(position))
                .map(|demo| KeyAction::Select(demo.id.clone()))
                .unwrap_or(KeyAction::Ignore),
            _ => KeyAction::Ignore,
        }
    }
}

/// Maps the keys `1`..`9` onto registry positions `0..9`.
fn digit_selection(key: &str) -> Option<usize> {
    match key.parse::<usize>() {
        Ok(digit @ 1..=9) => Some(digit - 1),
        _ => None,
    }
}

/// Opens the window and drives the session until the user quits.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let (width, height) = config.surface_size;
    let window = WindowBuilder::new()
        .with_title("fake3d")
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .context("failed to create window")?;

    let mut host = HostWindow::new(Arc::new(window), config)?;
    host.window.request_redraw();

    let mut fatal: Option<anyhow::Error> = None;
    let run_result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        match event {
            Event::WindowEvent { window_id, event } if window_id == host.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        host.session.destroy();
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => match host.key_action(&event) {
                        KeyAction::Quit => {
                            host.session.destroy();
                            elwt.exit();
                        }
                        KeyAction::Select(id) => {
                            if let Err(err) = host.session.set_active_demo(&id) {
                                warn!(demo = %id, %err, "demo switch rejected");
                            }
                        }
                        KeyAction::Ignore => {}
                    },
                    WindowEvent::CursorMoved { position, .. } => {
                        host.pointer.pointer_moved(position.x, position.y);
                    }
                    WindowEvent::Resized(new_size) => {
                        host.resize(new_size);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        host.rescale(scale_factor);
                    }
                    WindowEvent::RedrawRequested => match host.session.tick() {
                        Ok(FrameOutcome::Inactive)
                            if host.session.state() == LoopState::Destroyed =>
                        {
                            elwt.exit();
                        }
                        Ok(_) => {}
                        Err(err) => match err.as_surface_error() {
                            Some(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                host.session.backend_mut().reconfigure();
                            }
                            Some(wgpu::SurfaceError::OutOfMemory) => {
                                error!("surface out of memory; exiting");
                                fatal = Some(anyhow!("surface out of memory"));
                                host.session.destroy();
                                elwt.exit();
                            }
                            Some(other) => {
                                warn!(error = ?other, "surface error; retrying next frame");
                            }
                            None => {
                                error!(%err, "render loop failed");
                                fatal = Some(anyhow!(err));
                                host.session.destroy();
                                elwt.exit();
                            }
                        },
                    },
                    _ => {}
                }
            }
            Event::AboutToWait => {
                host.window.request_redraw();
            }
            _ => {}
        }
    });

    drop(host);
    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_map_to_registry_positions() {
        assert_eq!(digit_selection("1"), Some(0));
        assert_eq!(digit_selection("9"), Some(8));
        assert_eq!(digit_selection("0"), None);
        assert_eq!(digit_selection("a"), None);
        assert_eq!(digit_selection("10"), None);
    }
}
