//! wgpu implementation of [`Surface`].
//!
//! The [`Context`] owns the window surface, device and queue and draws
//! [`Frame`] snapshots with a small forward renderer. Geometry is uploaded
//! once per [`MeshId`], textures once per decoded image; both caches drop
//! entries a frame no longer references.

use std::collections::{HashMap, HashSet};
use std::iter;
use std::sync::{Arc, Weak};

use anyhow::Context as _;
use image::RgbaImage;
use log::{debug, error, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    config::DriverConfig,
    data_structures::{
        light::LightKind,
        material::{MaterialId, MaterialView, Texture},
        model::MeshId,
        texture::GpuTexture,
        transform::TransformRaw,
    },
    error::SceneError,
    pipelines::basic::{mk_globals_layout, mk_material_layout, mk_scene_pipelines, ScenePipelines},
    render::{DrawItem, Frame, Surface, Viewport},
};

const MAX_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct LightUniform {
    position: [f32; 4],
    direction: [f32; 4],
    diffuse: [f32; 4],
    ground: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GlobalsUniform {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    ambient: [f32; 4],
    light_count: [u32; 4],
    lights: [LightUniform; MAX_LIGHTS],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialUniform {
    albedo: [f32; 4],
    emissive: [f32; 4],
    params: [f32; 4],
    uv_scale: [f32; 4],
}

impl MaterialUniform {
    fn from_view(view: &MaterialView) -> Self {
        let (u, v) = view
            .albedo
            .as_ref()
            .map_or((1.0, 1.0), |tex| (tex.u_scale, tex.v_scale));
        Self {
            albedo: view.albedo_colour.into(),
            emissive: view.emissive.with_alpha(1.0).into(),
            params: [view.roughness, view.metallic, view.environment_intensity, 0.0],
            uv_scale: [u, v, 0.0, 0.0],
        }
    }
}

#[derive(Debug)]
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_elements: u32,
}

#[derive(Debug)]
struct CachedTexture {
    image: Weak<RgbaImage>,
    gpu: GpuTexture,
}

#[derive(Debug)]
struct GpuMaterial {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Opaque,
    DoubleSided,
    Transparent,
}

struct DrawCall {
    pass: Pass,
    mesh: MeshId,
    material: Option<MaterialId>,
    instance: u32,
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    is_surface_configured: bool,
    sample_count: u32,
    depth_texture: GpuTexture,
    msaa_target: Option<GpuTexture>,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    pipelines: ScenePipelines,
    white: GpuTexture,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<usize, CachedTexture>,
    materials: HashMap<Option<MaterialId>, GpuMaterial>,
}

impl Context {
    pub async fn new(window: Arc<Window>, settings: &DriverConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        debug!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shader writes linear colour and relies on an sRGB target.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("no supported surface formats")?;
        let present_mode = match settings.present_mode {
            mode @ (wgpu::PresentMode::AutoVsync | wgpu::PresentMode::AutoNoVsync) => mode,
            mode if surface_caps.present_modes.contains(&mode) => mode,
            mode => {
                warn!("present mode {mode:?} unsupported, using Fifo");
                wgpu::PresentMode::Fifo
            }
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let sample_count = if settings.msaa_samples > 1
            && adapter
                .get_texture_format_features(surface_format)
                .flags
                .sample_count_supported(settings.msaa_samples)
        {
            settings.msaa_samples
        } else {
            if settings.msaa_samples > 1 {
                warn!("{}x MSAA unsupported for {surface_format:?}", settings.msaa_samples);
            }
            1
        };

        let globals_layout = mk_globals_layout(&device);
        let material_layout = mk_material_layout(&device);
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals Buffer"),
            size: std::mem::size_of::<GlobalsUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
            label: Some("globals_bind_group"),
        });
        let pipelines = mk_scene_pipelines(
            &device,
            surface_format,
            sample_count,
            &globals_layout,
            &material_layout,
        );

        let depth_texture = GpuTexture::create_depth_texture(
            &device,
            [config.width, config.height],
            sample_count,
            "depth_texture",
        );
        let msaa_target = (sample_count > 1).then(|| {
            GpuTexture::create_msaa_target(&device, [config.width, config.height], surface_format, sample_count)
        });
        let white = GpuTexture::create_white(&device, &queue);
        let instance_capacity = 64;
        let instance_buffer = mk_instance_buffer(&device, instance_capacity);

        let ctx = Self {
            window,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            sample_count,
            depth_texture,
            msaa_target,
            globals_buffer,
            globals_bind_group,
            material_layout,
            pipelines,
            white,
            instance_buffer,
            instance_capacity,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
        };
        Ok(ctx.configured())
    }

    fn configured(mut self) -> Self {
        if self.config.width > 0 && self.config.height > 0 {
            self.surface.configure(&self.device, &self.config);
            self.is_surface_configured = true;
        }
        self
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn reconfigure(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            // minimised
            self.is_surface_configured = false;
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.is_surface_configured = true;
        self.depth_texture = GpuTexture::create_depth_texture(
            &self.device,
            [width, height],
            self.sample_count,
            "depth_texture",
        );
        if self.sample_count > 1 {
            self.msaa_target = Some(GpuTexture::create_msaa_target(
                &self.device,
                [width, height],
                self.config.format,
                self.sample_count,
            ));
        }
    }

    fn write_globals(&self, frame: &Frame) {
        let aspect = self.viewport().aspect();
        let (view_proj, eye): ([[f32; 4]; 4], [f32; 4]) = match &frame.camera {
            Some(camera) => (
                camera.view_proj(aspect).into(),
                [camera.eye.x, camera.eye.y, camera.eye.z, 1.0],
            ),
            None => (cgmath::Matrix4::from_scale(1.0f32).into(), [0.0; 4]),
        };
        let mut lights = [LightUniform::default(); MAX_LIGHTS];
        if frame.lights.len() > MAX_LIGHTS {
            debug!("frame {} has {} lights, shading the first {MAX_LIGHTS}", frame.index, frame.lights.len());
        }
        for (slot, light) in lights.iter_mut().zip(&frame.lights) {
            let kind = match light.kind {
                LightKind::Hemispheric { .. } => 0.0,
                LightKind::Directional { .. } => 1.0,
                LightKind::Point => 2.0,
            };
            *slot = LightUniform {
                position: light.position.extend(kind).into(),
                direction: light.direction.extend(light.intensity).into(),
                diffuse: light.diffuse.with_alpha(1.0).into(),
                ground: light.ground_colour.with_alpha(1.0).into(),
            };
        }
        let env = &frame.environment;
        let globals = GlobalsUniform {
            view_proj,
            eye,
            ambient: env.ambient_colour.with_alpha(env.intensity).into(),
            light_count: [frame.lights.len().min(MAX_LIGHTS) as u32, 0, 0, 0],
            lights,
        };
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&[globals]));
    }

    fn upload_mesh(&mut self, item: &DrawItem) {
        let id = item.mesh.id();
        if self.meshes.contains_key(&id) {
            return;
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", item.mesh.name)),
            contents: bytemuck::cast_slice(&item.mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", item.mesh.name)),
            contents: bytemuck::cast_slice(&item.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                num_elements: item.mesh.indices.len() as u32,
            },
        );
    }

    /// Cache key of a loaded albedo map, uploading it on first use.
    fn upload_texture(&mut self, texture: &Texture) -> Option<usize> {
        let image = texture.image.as_ref()?;
        let key = Arc::as_ptr(image) as usize;
        let fresh = self
            .textures
            .get(&key)
            .and_then(|cached| cached.image.upgrade())
            .is_some_and(|cached| Arc::ptr_eq(&cached, image));
        if !fresh {
            let gpu = GpuTexture::from_image(&self.device, &self.queue, image, Some(&texture.source), false);
            self.textures.insert(
                key,
                CachedTexture {
                    image: Arc::downgrade(image),
                    gpu,
                },
            );
            // a stale bind group may still point at the replaced texture
            self.materials.retain(|_, material| material.texture != Some(key));
        }
        Some(key)
    }

    fn prepare_material(&mut self, view: &MaterialView) {
        let texture = view.albedo.as_ref().and_then(|tex| self.upload_texture(tex));
        let uniform = MaterialUniform::from_view(view);
        if let Some(material) = self.materials.get(&view.id) {
            if material.texture == texture {
                self.queue
                    .write_buffer(&material.buffer, 0, bytemuck::cast_slice(&[uniform]));
                return;
            }
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let gpu = texture
            .and_then(|key| self.textures.get(&key))
            .map_or(&self.white, |cached| &cached.gpu);
        let sampler = gpu.sampler.as_ref().or(self.white.sampler.as_ref());
        let Some(sampler) = sampler else {
            error!("texture without sampler");
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&gpu.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some("material_bind_group"),
        });
        self.materials.insert(
            view.id,
            GpuMaterial {
                buffer,
                bind_group,
                texture,
            },
        );
    }

    fn write_instances(&mut self, instances: &[TransformRaw]) {
        if instances.len() > self.instance_capacity {
            self.instance_capacity = instances.len().next_power_of_two();
            self.instance_buffer = mk_instance_buffer(&self.device, self.instance_capacity);
        }
        if !instances.is_empty() {
            self.queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(instances));
        }
    }

    /// Uploads everything the frame needs and returns the draws in order.
    fn prepare(&mut self, frame: &Frame) -> Vec<DrawCall> {
        let (opaque, transparent) = frame.batches();
        let mut calls = Vec::with_capacity(opaque.len() + transparent.len());
        let mut instances = Vec::with_capacity(calls.capacity());
        let mut seen_meshes = HashSet::new();
        let mut seen_materials = HashSet::new();

        for (pass_items, is_transparent) in [(opaque, false), (transparent, true)] {
            for item in pass_items {
                self.upload_mesh(item);
                if seen_materials.insert(item.material.id) {
                    self.prepare_material(&item.material);
                }
                seen_meshes.insert(item.mesh.id());
                let pass = match (is_transparent, item.material.back_face_culling) {
                    (true, _) => Pass::Transparent,
                    (false, true) => Pass::Opaque,
                    (false, false) => Pass::DoubleSided,
                };
                calls.push(DrawCall {
                    pass,
                    mesh: item.mesh.id(),
                    material: item.material.id,
                    instance: instances.len() as u32,
                });
                instances.push(TransformRaw::from_world(&item.world));
            }
        }
        self.write_instances(&instances);

        self.meshes.retain(|id, _| seen_meshes.contains(id));
        self.materials.retain(|id, _| seen_materials.contains(id));
        let live: HashSet<usize> = self.materials.values().filter_map(|m| m.texture).collect();
        self.textures.retain(|key, _| live.contains(key));
        calls
    }
}

fn mk_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Buffer"),
        size: (capacity * std::mem::size_of::<TransformRaw>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl Surface for Context {
    fn draw(&mut self, frame: &Frame) -> Result<(), SceneError> {
        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.reconfigure(size.width, size.height);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("Unable to render: out of memory");
                return Err(SceneError::SurfaceUnavailable);
            }
            Err(e) => {
                warn!("Skipping frame {}: {}", frame.index, e);
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.write_globals(frame);
        let calls = if frame.is_loading() {
            Vec::new()
        } else {
            self.prepare(frame)
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let (target, resolve_target, store) = match &self.msaa_target {
                Some(msaa) => (&msaa.view, Some(&view), wgpu::StoreOp::Discard),
                None => (&view, None, wgpu::StoreOp::Store),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear_colour().into()),
                        store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            let mut current = None;
            for call in &calls {
                let (Some(mesh), Some(material)) = (self.meshes.get(&call.mesh), self.materials.get(&call.material))
                else {
                    continue;
                };
                if current != Some(call.pass) {
                    render_pass.set_pipeline(match call.pass {
                        Pass::Opaque => &self.pipelines.opaque,
                        Pass::DoubleSided => &self.pipelines.opaque_double_sided,
                        Pass::Transparent => &self.pipelines.transparent,
                    });
                    current = Some(call.pass);
                }
                render_pass.set_bind_group(1, &material.bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.num_elements, 0, call.instance..call.instance + 1);
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(self.config.width, self.config.height)
    }

    fn resize(&mut self, viewport: Viewport) {
        self.reconfigure(viewport.width, viewport.height);
    }
}
