use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};
use wgpu::util::{DeviceExt, TextureDataOrder};
use winit::dpi::PhysicalSize;

use crate::assets::DecodedImage;
use crate::error::RenderError;
use crate::session::{FrameBackend, FrameSubmission, TextureSet};
use crate::types::{Antialiasing, GpuPowerPreference};
use crate::uniforms::{slot_stride, FRAMES_IN_FLIGHT, UNIFORM_BLOCK_SIZE};

use super::context::GpuContext;
use super::pipeline::{build_texture_entries, ParallaxPipeline, PipelineLayouts, QUAD_VERTEX_COUNT};

struct GpuTextureInner {
    id: u64,
    name: String,
    width: u32,
    height: u32,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Uploaded image. Clones share the same GPU texture, which is freed when the last clone drops.
#[derive(Clone)]
pub struct GpuTexture(Arc<GpuTextureInner>);

impl GpuTexture {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }
}

impl PartialEq for GpuTexture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .finish()
    }
}

struct MultisampleTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl MultisampleTarget {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        sample_count: u32,
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa color target"),
            size: extent,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Thread that blocks on submission indices so completion callbacks fire promptly.
struct CompletionPump {
    sender: Sender<wgpu::SubmissionIndex>,
    handle: JoinHandle<()>,
}

impl CompletionPump {
    fn spawn(device: wgpu::Device) -> Result<Self, RenderError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<wgpu::SubmissionIndex>();
        let handle = thread::Builder::new()
            .name("parallax-gpu-completion".into())
            .spawn(move || {
                for index in receiver {
                    if let Err(err) = device.poll(wgpu::PollType::WaitForSubmissionIndex(index)) {
                        warn!(%err, "waiting for GPU submission failed");
                    }
                }
            })
            .map_err(|err| {
                RenderError::Initialization(format!("failed to spawn completion thread: {err}"))
            })?;
        Ok(Self { sender, handle })
    }

    fn notify(&self, index: wgpu::SubmissionIndex) {
        if self.sender.send(index).is_err() {
            warn!("GPU completion thread exited; slot release relies on queue maintenance");
        }
    }

    fn shutdown(self) {
        drop(self.sender);
        if self.handle.join().is_err() {
            warn!("GPU completion thread panicked");
        }
    }
}

struct FrameStats {
    last_update: Instant,
    frames_since_update: u32,
    frames_per_second: f32,
    frame_count: u64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frames_since_update: 0,
            frames_per_second: 0.0,
            frame_count: 0,
        }
    }

    fn record(&mut self, tilt: [f32; 2], in_flight: usize) {
        self.frame_count += 1;
        self.frames_since_update += 1;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed >= Duration::from_secs(1) {
            self.frames_per_second = self.frames_since_update as f32 / elapsed.as_secs_f32();
            self.frames_since_update = 0;
            self.last_update = now;
            debug!(
                fps = self.frames_per_second.round(),
                frame_count = self.frame_count,
                tilt_x = tilt[0],
                tilt_y = tilt[1],
                in_flight,
                "render stats"
            );
        }
    }
}

/// wgpu implementation of [`FrameBackend`].
///
/// Uniform slots live in one buffer at a stride padded to the device's dynamic offset alignment.
/// Each submission moves its [`crate::frames::SlotLease`] into the queue's work-done callback,
/// so the slot only returns to the pool once the GPU is finished with it.
pub struct GpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipeline: ParallaxPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    slot_stride: u64,
    texture_bind_groups: HashMap<(u64, u64), wgpu::BindGroup>,
    multisample_target: Option<MultisampleTarget>,
    completions: Option<CompletionPump>,
    next_texture_id: u64,
    stats: FrameStats,
}

impl GpuBackend {
    pub fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        antialiasing: Antialiasing,
        power: GpuPowerPreference,
    ) -> Result<Self, RenderError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size, antialiasing, power)
            .map_err(|err| RenderError::Initialization(format!("{err:#}")))?;
        let layouts = PipelineLayouts::new(&context.device);
        let pipeline = ParallaxPipeline::new(
            &context.device,
            &layouts,
            context.surface_format,
            context.sample_count,
        )?;

        let slot_stride = slot_stride(context.uniform_offset_alignment);
        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax uniform ring"),
            size: slot_stride * FRAMES_IN_FLIGHT as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("parallax uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE),
                    }),
                }],
            });

        let multisample_target = (context.sample_count > 1).then(|| {
            MultisampleTarget::new(
                &context.device,
                context.surface_format,
                context.size,
                context.sample_count,
            )
        });
        let completions = CompletionPump::spawn(context.device.clone())?;

        debug!(
            slot_stride,
            slots = FRAMES_IN_FLIGHT,
            sample_count = context.sample_count,
            "GPU backend ready"
        );

        Ok(Self {
            context,
            layouts,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            slot_stride,
            texture_bind_groups: HashMap::new(),
            multisample_target,
            completions: Some(completions),
            next_texture_id: 0,
            stats: FrameStats::new(),
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if !self.context.resize(new_size) {
            return;
        }
        if self.context.sample_count > 1 {
            self.multisample_target = Some(MultisampleTarget::new(
                &self.context.device,
                self.context.surface_format,
                self.context.size,
                self.context.sample_count,
            ));
        }
    }

    /// Recovers from `Lost`/`Outdated` surface errors.
    pub fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    fn texture_bind_group(&mut self, textures: &TextureSet<GpuTexture>) -> wgpu::BindGroup {
        let key = (textures.color.id(), textures.depth.id());
        let device = &self.context.device;
        let layout = &self.layouts.texture_layout;
        let sampler = &self.pipeline.sampler;
        self.texture_bind_groups
            .entry(key)
            .or_insert_with(|| {
                debug!(
                    color = textures.color.name(),
                    depth = textures.depth.name(),
                    "creating texture bind group"
                );
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("parallax texture bind group"),
                    layout,
                    entries: &build_texture_entries(
                        &textures.color.0.view,
                        &textures.depth.0.view,
                        sampler,
                    ),
                })
            })
            .clone()
    }
}

impl FrameBackend for GpuBackend {
    type Texture = GpuTexture;

    fn upload_texture(&mut self, image: &DecodedImage) -> Result<GpuTexture, RenderError> {
        let max = self.context.max_texture_dimension;
        if image.width > max || image.height > max {
            return Err(RenderError::texture_load(
                &image.name,
                format_args!(
                    "{}x{} exceeds the GPU limit of {max}",
                    image.width, image.height
                ),
            ));
        }
        let expected = image.bytes_per_row() as usize * image.height as usize;
        if image.pixels.len() != expected {
            return Err(RenderError::texture_load(
                &image.name,
                format_args!("expected {expected} bytes, got {}", image.pixels.len()),
            ));
        }

        let texture = self.context.device.create_texture_with_data(
            &self.context.queue,
            &wgpu::TextureDescriptor {
                label: Some(&image.name),
                size: wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &image.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        Ok(GpuTexture(Arc::new(GpuTextureInner {
            id,
            name: image.name.clone(),
            width: image.width,
            height: image.height,
            _texture: texture,
            view,
        })))
    }

    fn submit_frame(&mut self, frame: FrameSubmission<'_, GpuTexture>) -> Result<(), RenderError> {
        let surface_texture = self.context.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let offset = frame.lease.index() as u64 * self.slot_stride;
        self.context.queue.write_buffer(
            &self.uniform_buffer,
            offset,
            bytemuck::bytes_of(&frame.uniforms),
        );
        let texture_bind_group = self.texture_bind_group(frame.textures);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("parallax encoder"),
                });
        {
            let (attachment_view, resolve_target) =
                if let Some(msaa) = self.multisample_target.as_ref() {
                    (&msaa.view, Some(&view))
                } else {
                    (&view, None)
                };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("parallax pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: attachment_view,
                    depth_slice: None,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[offset as u32]);
            render_pass.set_bind_group(1, &texture_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.pipeline.quad.slice(..));
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }

        let index = self.context.queue.submit(std::iter::once(encoder.finish()));
        let in_flight = frame.lease.in_flight();
        let lease = frame.lease;
        self.context
            .queue
            .on_submitted_work_done(move || lease.release());
        surface_texture.present();

        if let Some(pump) = self.completions.as_ref() {
            pump.notify(index);
        }
        self.stats.record(frame.uniforms.tilt, in_flight);
        Ok(())
    }

    fn wait_idle(&mut self) {
        if let Err(err) = self.context.device.poll(wgpu::PollType::Wait) {
            warn!(%err, "failed to wait for GPU idle");
        }
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        self.wait_idle();
        if let Some(pump) = self.completions.take() {
            pump.shutdown();
        }
        self.texture_bind_groups.clear();
    }
}
