//! Tilt input sources.
//!
//! Every source reduces its raw samples to a normalized [`Tilt`] target and hands it to a
//! callback. The session stores the target in a [`crate::tilt::TiltTarget`]; sources never touch
//! the render state directly.

use std::f32::consts::TAU;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Sender};
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::tilt::{normalize, pointer_target, Tilt, DEFAULT_MAX_TILT};

pub type TiltCallback = Arc<dyn Fn(Tilt) + Send + Sync>;

/// Anything that emits normalized tilt targets.
pub trait TiltSource: Send {
    fn name(&self) -> &'static str;
    /// Begins delivering targets to `callback`. Starting an already running source is a no-op.
    fn start(&mut self, callback: TiltCallback) -> Result<(), RenderError>;
    /// Stops delivery. After this returns the callback is not invoked again.
    fn stop(&mut self);
}

#[derive(Default)]
struct PointerState {
    callback: Option<TiltCallback>,
    width: f64,
    height: f64,
}

/// Event-driven pointer input. Clones share state, so the host window keeps one handle to feed
/// events while the session owns another as its [`TiltSource`].
#[derive(Clone, Default)]
pub struct PointerSource {
    state: Arc<Mutex<PointerState>>,
}

impl PointerSource {
    pub fn new(width: f64, height: f64) -> Self {
        let source = Self::default();
        source.viewport_resized(width, height);
        source
    }

    pub fn viewport_resized(&self, width: f64, height: f64) {
        let mut state = self.lock();
        state.width = width;
        state.height = height;
    }

    pub fn pointer_moved(&self, x: f64, y: f64) {
        let (callback, target) = {
            let state = self.lock();
            let Some(callback) = state.callback.clone() else {
                return;
            };
            (callback, pointer_target(x, y, state.width, state.height))
        };
        callback(target);
    }

    fn lock(&self) -> MutexGuard<'_, PointerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PointerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PointerSource")
            .field("width", &state.width)
            .field("height", &state.height)
            .field("active", &state.callback.is_some())
            .finish()
    }
}

impl TiltSource for PointerSource {
    fn name(&self) -> &'static str {
        "pointer"
    }

    fn start(&mut self, callback: TiltCallback) -> Result<(), RenderError> {
        self.lock().callback = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().callback = None;
    }
}

/// Device attitude in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    /// Front/back rotation, mapped to the vertical tilt axis.
    pub pitch: f32,
    /// Left/right rotation, mapped (inverted) to the horizontal tilt axis.
    pub roll: f32,
}

/// Platform motion sensor polled by [`SensorSource`].
pub trait MotionSensor: Send {
    /// Asks the platform for access. Returning `false` means the user or OS denied it.
    fn request_permission(&mut self) -> bool;
    /// Latest attitude, or `None` when no new reading is available.
    fn read(&mut self) -> Option<Attitude>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorOptions {
    pub max_tilt_x: f32,
    pub max_tilt_y: f32,
    pub rate_hz: u32,
    /// Minimum change on either axis before a new target is published.
    pub deadband: f32,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            max_tilt_x: DEFAULT_MAX_TILT,
            max_tilt_y: DEFAULT_MAX_TILT,
            rate_hz: 60,
            deadband: 0.005,
        }
    }
}

impl SensorOptions {
    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz.clamp(1, 1000)))
    }

    fn publishes(&self, candidate: Tilt, last: Tilt) -> bool {
        candidate.max_axis_delta(last) > self.deadband
    }
}

struct SensorWorker {
    stop: Sender<()>,
    handle: JoinHandle<Box<dyn MotionSensor>>,
}

/// Polls a [`MotionSensor`] on its own thread at a fixed rate.
pub struct SensorSource {
    sensor: Option<Box<dyn MotionSensor>>,
    options: SensorOptions,
    worker: Option<SensorWorker>,
}

impl SensorSource {
    pub fn new(sensor: Box<dyn MotionSensor>, options: SensorOptions) -> Self {
        Self {
            sensor: Some(sensor),
            options,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl fmt::Debug for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorSource")
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish()
    }
}

impl TiltSource for SensorSource {
    fn name(&self) -> &'static str {
        "sensor"
    }

    fn start(&mut self, callback: TiltCallback) -> Result<(), RenderError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(mut sensor) = self.sensor.take() else {
            return Err(RenderError::Initialization(
                "motion sensor was lost by a previous worker".into(),
            ));
        };
        if !sensor.request_permission() {
            self.sensor = Some(sensor);
            warn!("motion sensor permission denied");
            return Err(RenderError::PermissionDenied {
                source_name: "sensor",
            });
        }

        let options = self.options;
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let spawned = thread::Builder::new()
            .name("parallax-sensor".into())
            .spawn(move || {
                let ticker = tick(options.interval());
                let mut last = Tilt::NEUTRAL;
                loop {
                    select! {
                        recv(stopped) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(attitude) = sensor.read() else {
                                continue;
                            };
                            let target = normalize(
                                attitude.roll,
                                attitude.pitch,
                                options.max_tilt_x,
                                options.max_tilt_y,
                            );
                            if options.publishes(target, last) {
                                last = target;
                                callback(target);
                            }
                        }
                    }
                }
                sensor
            });

        match spawned {
            Ok(handle) => {
                info!(rate_hz = options.rate_hz, "motion sensor started");
                self.worker = Some(SensorWorker { stop, handle });
                Ok(())
            }
            Err(err) => Err(RenderError::Initialization(format!(
                "failed to spawn sensor thread: {err}"
            ))),
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        drop(worker.stop);
        match worker.handle.join() {
            Ok(sensor) => self.sensor = Some(sensor),
            Err(_) => warn!("motion sensor thread panicked"),
        }
        debug!("motion sensor stopped");
    }
}

impl Drop for SensorSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Synthetic sensor that sweeps a Lissajous figure, for hosts without motion hardware.
#[derive(Debug, Clone)]
pub struct SweepSensor {
    origin: Instant,
    period: Duration,
    amplitude: f32,
}

impl SweepSensor {
    pub fn new(period: Duration, amplitude: f32) -> Self {
        Self {
            origin: Instant::now(),
            period: period.max(Duration::from_millis(1)),
            amplitude: amplitude.abs(),
        }
    }

    /// Attitude after `elapsed` time. Roll completes one cycle per period, pitch two.
    pub fn attitude_at(&self, elapsed: Duration) -> Attitude {
        let phase = (elapsed.as_secs_f64() / self.period.as_secs_f64()).fract() as f32;
        Attitude {
            roll: self.amplitude * (TAU * phase).sin(),
            pitch: self.amplitude * 0.5 * (2.0 * TAU * phase).sin(),
        }
    }
}

impl Default for SweepSensor {
    fn default() -> Self {
        Self::new(Duration::from_secs(8), DEFAULT_MAX_TILT * 4.0 / 3.0)
    }
}

impl MotionSensor for SweepSensor {
    fn request_permission(&mut self) -> bool {
        true
    }

    fn read(&mut self) -> Option<Attitude> {
        Some(self.attitude_at(self.origin.elapsed()))
    }
}
