//! Backend-agnostic render loop.
//!
//! [`RenderSession`] owns the tilt state, the demo selection, the texture cache and the frame slot
//! pool. Each [`RenderSession::tick`] eases the tilt, claims a slot, composes the uniform block and
//! hands everything to a [`FrameBackend`]. The wgpu implementation lives in `gpu::state`; tests
//! drive the session with a recording backend instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::aspect::{fit, FitScale};
use crate::assets::{DecodeFuture, DecodedImage, ImageSource};
use crate::demos::{DemoDescriptor, DemoRegistry, Thresholds};
use crate::error::RenderError;
use crate::frames::{FramePool, SlotLease};
use crate::input::{PointerSource, SensorSource, TiltCallback, TiltSource};
use crate::runtime::{BoxedTimeSource, SystemTimeSource};
use crate::tilt::{TiltTarget, TiltVector};
use crate::types::InputMode;
use crate::uniforms::{ParallaxUniforms, Viewport, FRAMES_IN_FLIGHT};

/// Color and depth textures that are always bound together.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSet<T> {
    pub color: T,
    pub depth: T,
    /// Pixel size of the color image, used for the aspect fit.
    pub color_size: (u32, u32),
}

/// Everything a backend needs to draw one frame.
pub struct FrameSubmission<'a, T> {
    /// Slot the uniforms belong in. The backend must keep the lease alive until the GPU has
    /// finished the draw that reads the slot.
    pub lease: SlotLease,
    pub uniforms: ParallaxUniforms,
    pub textures: &'a TextureSet<T>,
}

/// Graphics side of the render loop.
pub trait FrameBackend {
    type Texture: Clone;

    fn upload_texture(&mut self, image: &DecodedImage) -> Result<Self::Texture, RenderError>;

    fn submit_frame(&mut self, frame: FrameSubmission<'_, Self::Texture>)
        -> Result<(), RenderError>;

    /// Blocks until the GPU has finished all submitted work.
    fn wait_idle(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Ready,
    Running,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// The tick ran but nothing was submitted.
    Skipped,
    /// The session is not prepared or has been destroyed.
    Inactive,
}

/// Thread-safe handle that tears a session down from outside the render thread.
///
/// Requesting shutdown closes the frame pool, which wakes a tick blocked waiting for a slot. The
/// session finishes its teardown on that tick.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    pool: Arc<FramePool>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.pool.close();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
struct CachedTexture<T> {
    texture: T,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct ActiveDemo<T> {
    descriptor: DemoDescriptor,
    thresholds: Thresholds,
    textures: TextureSet<T>,
}

#[derive(Debug)]
struct PendingSwap {
    descriptor: DemoDescriptor,
    future: DecodeFuture,
}

pub struct RenderSession<B: FrameBackend> {
    backend: B,
    registry: Arc<DemoRegistry>,
    images: Arc<dyn ImageSource>,
    clock: BoxedTimeSource,
    pool: Arc<FramePool>,
    shutdown: ShutdownHandle,
    state: LoopState,
    requested_demo: Option<String>,
    active: Option<ActiveDemo<B::Texture>>,
    pending: Option<PendingSwap>,
    cache: HashMap<String, CachedTexture<B::Texture>>,
    tilt: TiltVector,
    target: TiltTarget,
    viewport: Viewport,
    scale: FitScale,
    inputs: Vec<Box<dyn TiltSource>>,
    frames_drawn: u64,
}

impl<B: FrameBackend> RenderSession<B> {
    pub fn new(backend: B, registry: Arc<DemoRegistry>, images: Arc<dyn ImageSource>) -> Self {
        let pool = FramePool::new(FRAMES_IN_FLIGHT);
        let shutdown = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            pool: Arc::clone(&pool),
        };
        Self {
            backend,
            registry,
            images,
            clock: Box::new(SystemTimeSource::new()),
            pool,
            shutdown,
            state: LoopState::Uninitialized,
            requested_demo: None,
            active: None,
            pending: None,
            cache: HashMap::new(),
            tilt: TiltVector::default(),
            target: TiltTarget::new(),
            viewport: Viewport::new(1, 1, 1.0),
            scale: FitScale::IDENTITY,
            inputs: Vec::new(),
            frames_drawn: 0,
        }
    }

    /// Replaces the clock. Only meaningful before the first tick.
    pub fn with_clock(mut self, clock: BoxedTimeSource) -> Self {
        self.clock = clock;
        self
    }

    /// Loads the initial demo synchronously and moves the session to `Ready`.
    ///
    /// A demo whose images cannot be loaded is shown with neutral placeholder textures so the
    /// window still comes up; later switches keep the last good pair instead.
    pub fn prepare(&mut self, viewport: Viewport) -> Result<(), RenderError> {
        if self.state != LoopState::Uninitialized {
            return Ok(());
        }
        if viewport.width > 0 && viewport.height > 0 {
            self.viewport = viewport;
        }

        let requested = self
            .requested_demo
            .take()
            .unwrap_or_else(|| self.registry.default_id().to_string());
        let descriptor = match self.registry.get(&requested) {
            Ok(descriptor) => descriptor.clone(),
            Err(err) => {
                warn!(%err, "falling back to the default demo");
                self.registry.get(self.registry.default_id())?.clone()
            }
        };

        let names = [descriptor.image.clone(), descriptor.depth.clone()];
        let textures = match DecodeFuture::immediate(self.images.as_ref(), &names).wait() {
            Ok(images) => self.upload_all(&images).and_then(|_| self.texture_set(&descriptor)),
            Err(err) => Err(err),
        };
        let textures = match textures {
            Ok(textures) => textures,
            Err(err) => {
                warn!(demo = %descriptor.id, %err, "initial demo failed to load; using placeholders");
                self.placeholder_set()?
            }
        };

        info!(demo = %descriptor.id, width = self.viewport.width, height = self.viewport.height, "render session ready");
        self.active = Some(ActiveDemo {
            thresholds: descriptor.thresholds,
            descriptor,
            textures,
        });
        self.recompute_scale();
        self.state = LoopState::Ready;
        Ok(())
    }

    /// Runs one frame. Never blocks for longer than it takes the GPU to free a slot.
    pub fn tick(&mut self) -> Result<FrameOutcome, RenderError> {
        if self.shutdown.is_requested() {
            self.destroy();
        }
        match self.state {
            LoopState::Uninitialized | LoopState::Destroyed => return Ok(FrameOutcome::Inactive),
            LoopState::Ready | LoopState::Running => {}
        }

        let time = self.clock.sample();
        self.poll_pending();

        self.tilt.set_target(self.target.load());
        let tilt = self.tilt.ease();

        let lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(RenderError::PoolClosed) => {
                self.destroy();
                return Ok(FrameOutcome::Inactive);
            }
            Err(err) => return Err(err),
        };

        let Some(active) = self.active.as_ref() else {
            return Ok(FrameOutcome::Skipped);
        };
        let uniforms =
            ParallaxUniforms::compose(&self.viewport, self.scale, tilt, active.thresholds, time.seconds);
        trace!(frame = lease.frame(), slot = lease.index(), "submitting frame");

        let submission = FrameSubmission {
            lease,
            uniforms,
            textures: &active.textures,
        };
        match self.backend.submit_frame(submission) {
            Ok(()) => {}
            Err(err @ RenderError::Surface(_)) => return Err(err),
            Err(err) => {
                warn!(%err, "frame submission failed; skipping frame");
                return Ok(FrameOutcome::Skipped);
            }
        }

        if self.state == LoopState::Ready {
            debug!("render loop running");
            self.state = LoopState::Running;
        }
        self.frames_drawn += 1;
        Ok(FrameOutcome::Drawn)
    }

    /// Applies a new surface size. Degenerate sizes are rejected and the previous scale is kept.
    pub fn resize(&mut self, viewport: Viewport) -> Result<(), RenderError> {
        if self.state == LoopState::Destroyed {
            return Ok(());
        }
        if viewport.width == 0 || viewport.height == 0 {
            return Err(RenderError::InvalidDimension {
                width: viewport.width as f32,
                height: viewport.height as f32,
            });
        }
        if let Some(active) = self.active.as_ref() {
            let (image_w, image_h) = active.textures.color_size;
            self.scale = fit(
                viewport.width as f32,
                viewport.height as f32,
                image_w as f32,
                image_h as f32,
            )?;
        }
        self.viewport = viewport;
        debug!(width = viewport.width, height = viewport.height, scale_x = self.scale.x, scale_y = self.scale.y, "viewport resized");
        Ok(())
    }

    /// Switches to `id`. Textures load in the background unless both are cached, and the previous
    /// pair stays bound until the new pair is complete. Selecting the active demo is a no-op.
    pub fn set_active_demo(&mut self, id: &str) -> Result<(), RenderError> {
        let descriptor = self.registry.get(id)?.clone();
        match self.state {
            LoopState::Destroyed => return Ok(()),
            LoopState::Uninitialized => {
                self.requested_demo = Some(descriptor.id);
                return Ok(());
            }
            LoopState::Ready | LoopState::Running => {}
        }

        if self.active_demo().map(|demo| demo.id.as_str()) == Some(id) {
            if let Some(pending) = self.pending.take() {
                debug!(demo = %pending.descriptor.id, "cancelled pending demo switch");
            }
            return Ok(());
        }
        if self.pending_demo() == Some(id) {
            return Ok(());
        }

        let missing: Vec<String> = [&descriptor.image, &descriptor.depth]
            .into_iter()
            .filter(|name| !self.cache.contains_key(name.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            self.pending = None;
            return self.commit(descriptor);
        }

        debug!(demo = %descriptor.id, images = ?missing, "loading demo textures");
        let future = DecodeFuture::spawn(Arc::clone(&self.images), missing);
        self.pending = Some(PendingSwap { descriptor, future });
        Ok(())
    }

    /// Overrides the thresholds of the active demo until the next switch.
    pub fn update_thresholds(&mut self, horizontal: f32, vertical: f32) -> Result<(), RenderError> {
        let thresholds = Thresholds::new(horizontal, vertical);
        if thresholds.validate().is_err() {
            return Err(RenderError::InvalidThresholds {
                horizontal,
                vertical,
            });
        }
        if let Some(active) = self.active.as_mut() {
            active.thresholds = thresholds;
        }
        Ok(())
    }

    /// Callback that input sources use to publish a new tilt target.
    pub fn tilt_callback(&self) -> TiltCallback {
        let target = self.target.clone();
        Arc::new(move |tilt| target.store(tilt))
    }

    pub fn tilt_target(&self) -> TiltTarget {
        self.target.clone()
    }

    /// Starts `source` and keeps it until teardown.
    pub fn attach_input(&mut self, mut source: Box<dyn TiltSource>) -> Result<(), RenderError> {
        if self.state == LoopState::Destroyed {
            return Ok(());
        }
        source.start(self.tilt_callback())?;
        info!(source = source.name(), "input source attached");
        self.inputs.push(source);
        Ok(())
    }

    /// Attaches the sources that `mode` asks for and returns their names.
    ///
    /// A sensor that cannot start is never fatal: `Auto` falls back to the pointer, `Sensor`
    /// keeps the tilt neutral.
    pub fn attach_inputs(
        &mut self,
        mode: InputMode,
        pointer: PointerSource,
        sensor: Option<SensorSource>,
    ) -> Vec<&'static str> {
        let mut attached = Vec::new();
        if matches!(mode, InputMode::Auto | InputMode::Sensor) {
            match sensor {
                Some(sensor) => match self.attach_input(Box::new(sensor)) {
                    Ok(()) => attached.push("sensor"),
                    Err(err) => warn!(%err, "motion input unavailable"),
                },
                None => debug!("no motion sensor on this host"),
            }
        }
        let wants_pointer = match mode {
            InputMode::Pointer => true,
            InputMode::Auto => attached.is_empty(),
            InputMode::Sensor => false,
        };
        if wants_pointer {
            match self.attach_input(Box::new(pointer)) {
                Ok(()) => attached.push("pointer"),
                Err(err) => warn!(%err, "pointer input unavailable"),
            }
        }
        if attached.is_empty() {
            warn!("no tilt input attached; tilt stays neutral");
        }
        attached
    }

    /// Tears the session down. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.state == LoopState::Destroyed {
            return;
        }
        self.state = LoopState::Destroyed;
        self.shutdown.request();
        for input in self.inputs.iter_mut() {
            input.stop();
        }
        self.inputs.clear();
        self.pending = None;
        self.backend.wait_idle();
        self.active = None;
        self.cache.clear();
        self.target.reset();
        info!(frames = self.frames_drawn, "render session destroyed");
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn active_demo(&self) -> Option<&DemoDescriptor> {
        self.active.as_ref().map(|active| &active.descriptor)
    }

    pub fn pending_demo(&self) -> Option<&str> {
        self.pending.as_ref().map(|pending| pending.descriptor.id.as_str())
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        self.active.as_ref().map(|active| active.thresholds)
    }

    pub fn tilt(&self) -> TiltVector {
        self.tilt
    }

    pub fn scale(&self) -> FitScale {
        self.scale
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn registry(&self) -> &Arc<DemoRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    pub fn cached_textures(&self) -> usize {
        self.cache.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn poll_pending(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let images = match pending.future.poll() {
            Ok(Some(images)) => images,
            Ok(None) => return,
            Err(err) => {
                warn!(demo = %pending.descriptor.id, %err, "demo switch failed; keeping current demo");
                self.pending = None;
                return;
            }
        };
        let Some(pending) = self.pending.take() else {
            return;
        };
        if let Err(err) = self.upload_all(&images) {
            warn!(demo = %pending.descriptor.id, %err, "texture upload failed; keeping current demo");
            return;
        }
        if let Err(err) = self.commit(pending.descriptor) {
            warn!(%err, "demo switch failed; keeping current demo");
        }
    }

    fn upload_all(&mut self, images: &[DecodedImage]) -> Result<(), RenderError> {
        for image in images {
            if self.cache.contains_key(&image.name) {
                continue;
            }
            let texture = self.backend.upload_texture(image)?;
            debug!(name = %image.name, width = image.width, height = image.height, "texture cached");
            self.cache.insert(
                image.name.clone(),
                CachedTexture {
                    texture,
                    width: image.width,
                    height: image.height,
                },
            );
        }
        Ok(())
    }

    fn texture_set(&self, descriptor: &DemoDescriptor) -> Result<TextureSet<B::Texture>, RenderError> {
        let lookup = |name: &str| {
            self.cache
                .get(name)
                .ok_or_else(|| RenderError::texture_load(name, "texture missing from cache"))
        };
        let color = lookup(&descriptor.image)?;
        let depth = lookup(&descriptor.depth)?;
        Ok(TextureSet {
            color: color.texture.clone(),
            depth: depth.texture.clone(),
            color_size: (color.width, color.height),
        })
    }

    fn placeholder_set(&mut self) -> Result<TextureSet<B::Texture>, RenderError> {
        let color = DecodedImage::placeholder("placeholder:color");
        let depth = DecodedImage::placeholder("placeholder:depth");
        self.upload_all(&[color.clone(), depth.clone()])?;
        let color = &self.cache[&color.name];
        let depth = &self.cache[&depth.name];
        Ok(TextureSet {
            color: color.texture.clone(),
            depth: depth.texture.clone(),
            color_size: (color.width, color.height),
        })
    }

    fn commit(&mut self, descriptor: DemoDescriptor) -> Result<(), RenderError> {
        let textures = self.texture_set(&descriptor)?;
        info!(demo = %descriptor.id, name = %descriptor.display_name, "switched demo");
        self.active = Some(ActiveDemo {
            thresholds: descriptor.thresholds,
            descriptor,
            textures,
        });
        self.recompute_scale();
        Ok(())
    }

    fn recompute_scale(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let (image_w, image_h) = active.textures.color_size;
        match fit(
            self.viewport.width as f32,
            self.viewport.height as f32,
            image_w as f32,
            image_h as f32,
        ) {
            Ok(scale) => self.scale = scale,
            Err(err) => warn!(%err, "keeping previous aspect scale"),
        }
    }
}

impl<B: FrameBackend> Drop for RenderSession<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<B: FrameBackend> fmt::Debug for RenderSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSession")
            .field("state", &self.state)
            .field("active", &self.active_demo().map(|demo| demo.id.as_str()))
            .field("pending", &self.pending_demo())
            .field("viewport", &self.viewport)
            .field("scale", &self.scale)
            .field("frames_drawn", &self.frames_drawn)
            .finish()
    }
}
