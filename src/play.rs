#![cfg(feature = "play")]
//! Live preview window: the engine ticks into a [`PixmapSurface`] on the
//! event-loop thread and the frame is shown as an egui texture.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use egui::{Color32, FontFamily, FontId, RichText, TextureHandle, TextureOptions};
use egui_wgpu::{Renderer as EguiRenderer, ScreenDescriptor};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::clock::FrameClock;
use crate::config::{load_config_or_default, ConfigOverride, RainConfig};
use crate::engine::RainEngine;
use crate::painter::GlyphPainter;
use crate::surface::{PixmapSurface, Surface};

#[derive(Debug, Clone)]
pub struct PlayOptions {
    /// Watched for changes when set.
    pub config_path: Option<PathBuf>,
    pub overrides: Vec<ConfigOverride>,
    pub initial_config: RainConfig,
    pub width: u32,
    pub height: u32,
    /// Pins the seed across reloads; wins over the config's `seed`.
    pub seed: Option<u64>,
    pub start_paused: bool,
}

struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: wgpu::Adapter,
}

impl GpuContext {
    async fn for_surface(instance: &wgpu::Instance, surface: &wgpu::Surface<'_>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                force_fallback_adapter: false,
                compatible_surface: Some(surface),
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("glyphrain-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }
}

/// Everything the event loop mutates between frames.
struct Preview {
    engine: RainEngine<PixmapSurface>,
    clock: FrameClock,
    texture: Option<TextureHandle>,
    config_path: Option<PathBuf>,
    overrides: Vec<ConfigOverride>,
    pinned_seed: Option<u64>,
}

pub fn run(options: PlayOptions) -> Result<()> {
    let config_path = options.config_path.as_deref().map(canonical_config_path);
    let mut config = options.initial_config.clone();
    if options.seed.is_some() {
        config.seed = options.seed;
    }

    let painter = GlyphPainter::for_source(config.font.as_ref())?;
    let event_loop = EventLoop::new().context("failed to create play event loop")?;
    let initial_size = PhysicalSize::new(options.width.max(1), options.height.max(1));
    let title = match &config_path {
        Some(path) => format!("glyphrain - {}", path.display()),
        None => "glyphrain".to_owned(),
    };
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(title)
            .with_inner_size(initial_size)
            .with_resizable(true)
            .build(&event_loop)
            .context("failed to create preview window")?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("failed to create wgpu surface")?;
    let gpu = pollster::block_on(GpuContext::for_surface(&instance, &surface))?;

    let caps = surface.get_capabilities(&gpu.adapter);
    let format = pick_surface_format(&caps.formats)?;
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);
    let size = window.inner_size();
    let mut surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&gpu.device, &surface_config);

    let (watch_tx, watch_rx) = mpsc::channel::<()>();
    let _watcher = match &config_path {
        Some(path) => Some(watch_config(path, watch_tx)?),
        None => None,
    };

    let egui_ctx = egui::Context::default();
    let mut egui_state = egui_winit::State::new(
        egui_ctx.clone(),
        egui::ViewportId::ROOT,
        &event_loop,
        None,
        None,
    );
    let mut egui_renderer = EguiRenderer::new(&gpu.device, surface_config.format, None, 1, false);

    let interval = config.frame_interval();
    let mut preview = Preview {
        engine: RainEngine::new(config, PixmapSurface::new(size.width, size.height, painter)),
        clock: FrameClock::new(interval, Instant::now(), options.start_paused),
        texture: None,
        config_path,
        overrides: options.overrides,
        pinned_seed: options.seed,
    };

    let grid = preview.engine.grid();
    info!(
        width = size.width,
        height = size.height,
        columns = grid.columns,
        rows = grid.rows,
        interval_ms = interval.as_millis() as u64,
        "play started"
    );
    info!("controls: Space pause/resume, R reseed, Esc quit");

    event_loop
        .run(move |event, target| match event {
            WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                let egui_response = egui_state.on_window_event(&window, &event);
                match event {
                    WindowEvent::CloseRequested => target.exit(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state == ElementState::Pressed && !event.repeat && !egui_response.consumed {
                            handle_keyboard_event(event.physical_key, &mut preview, target);
                            window.request_redraw();
                        }
                    }
                    WindowEvent::Resized(size) => {
                        if size.width > 0 && size.height > 0 {
                            surface_config.width = size.width;
                            surface_config.height = size.height;
                            surface.configure(&gpu.device, &surface_config);
                        }
                        preview.engine.on_resize(size.width, size.height);
                        preview.texture = None;
                        window.request_redraw();
                    }
                    WindowEvent::RedrawRequested => {
                        render_frame(
                            &window,
                            &surface,
                            &gpu,
                            &surface_config,
                            &egui_ctx,
                            &mut egui_state,
                            &mut egui_renderer,
                            &mut preview,
                        );
                    }
                    _ => {}
                }
            }
            WinitEvent::AboutToWait => {
                let mut config_dirty = false;
                while watch_rx.try_recv().is_ok() {
                    config_dirty = true;
                }
                if config_dirty {
                    try_hot_reload(&mut preview);
                    window.request_redraw();
                }

                if preview.clock.poll(Instant::now()) {
                    preview.engine.tick();
                    window.request_redraw();
                }

                match preview.clock.next_deadline() {
                    Some(deadline) => target.set_control_flow(ControlFlow::WaitUntil(deadline)),
                    None => target.set_control_flow(ControlFlow::Wait),
                }
            }
            _ => {}
        })
        .map_err(|error| anyhow!("play event loop terminated: {error}"))
}

fn watch_config(path: &Path, sender: mpsc::Sender<()>) -> Result<notify::RecommendedWatcher> {
    let watched = path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
        Ok(event) => {
            if should_reload(&event) && event_targets_config(&event, &watched) {
                let _ = sender.send(());
            }
        }
        Err(error) => warn!("file watcher error: {error}"),
    })
    .context("failed to create file watcher")?;

    // Editors often replace the file, so watch its directory.
    let watch_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher
        .watch(&watch_root, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_root.display()))?;
    Ok(watcher)
}

fn upload_frame(ctx: &egui::Context, preview: &mut Preview) {
    let surface = preview.engine.surface();
    let (width, height) = surface.size();
    if width == 0 || height == 0 {
        return;
    }

    let image = egui::ColorImage::from_rgba_unmultiplied(
        [width as usize, height as usize],
        &surface.to_rgba8(),
    );
    match preview.texture.as_mut() {
        Some(texture) => texture.set(image, TextureOptions::NEAREST),
        None => preview.texture = Some(ctx.load_texture("rain", image, TextureOptions::NEAREST)),
    }
}

fn render_frame(
    window: &Window,
    surface: &wgpu::Surface<'_>,
    gpu: &GpuContext,
    surface_config: &wgpu::SurfaceConfiguration,
    egui_ctx: &egui::Context,
    egui_state: &mut egui_winit::State,
    egui_renderer: &mut EguiRenderer,
    preview: &mut Preview,
) {
    let frame = match surface.get_current_texture() {
        Ok(frame) => frame,
        Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
            surface.configure(&gpu.device, surface_config);
            return;
        }
        Err(wgpu::SurfaceError::Timeout) => return,
        Err(wgpu::SurfaceError::OutOfMemory) => {
            error!("surface out of memory");
            return;
        }
    };
    let view = frame
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    upload_frame(egui_ctx, preview);

    let raw_input = egui_state.take_egui_input(window);
    let full_output = egui_ctx.run(raw_input, |ctx| draw_rain(ctx, preview));
    egui_state.handle_platform_output(window, full_output.platform_output);

    let pixels_per_point = window.scale_factor() as f32;
    let paint_jobs = egui_ctx.tessellate(full_output.shapes, pixels_per_point);
    for (texture_id, delta) in &full_output.textures_delta.set {
        egui_renderer.update_texture(&gpu.device, &gpu.queue, *texture_id, delta);
    }

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("glyphrain-frame"),
        });
    let screen_descriptor = ScreenDescriptor {
        size_in_pixels: [surface_config.width, surface_config.height],
        pixels_per_point,
    };
    egui_renderer.update_buffers(
        &gpu.device,
        &gpu.queue,
        &mut encoder,
        &paint_jobs,
        &screen_descriptor,
    );

    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("glyphrain-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        egui_renderer.render(&mut pass, &paint_jobs, &screen_descriptor);
    }

    for texture_id in &full_output.textures_delta.free {
        egui_renderer.free_texture(texture_id);
    }
    gpu.queue.submit(Some(encoder.finish()));
    frame.present();
}

fn draw_rain(ctx: &egui::Context, preview: &Preview) {
    egui::CentralPanel::default()
        .frame(egui::Frame::none())
        .show(ctx, |ui| {
            if let Some(texture) = &preview.texture {
                ui.painter().image(
                    texture.id(),
                    ctx.screen_rect(),
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
        });

    if preview.clock.is_paused() {
        egui::Area::new("paused".into())
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-12.0, 12.0))
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(Color32::from_black_alpha(140))
                    .rounding(egui::Rounding::same(3.0))
                    .inner_margin(egui::Margin::same(8.0))
                    .show(ui, |ui| {
                        ui.label(
                            RichText::new(format!("paused  tick {}", preview.engine.ticks()))
                                .font(FontId::new(14.0, FontFamily::Monospace))
                                .color(Color32::from_rgb(180, 255, 180)),
                        );
                    });
            });
    }
}

fn try_hot_reload(preview: &mut Preview) {
    let Some(path) = preview.config_path.as_deref() else {
        return;
    };

    let mut next = match load_config_or_default(Some(path), &preview.overrides) {
        Ok(next) => next,
        Err(error) => {
            warn!("reload failed, keeping previous config: {error:#}");
            return;
        }
    };
    if preview.pinned_seed.is_some() {
        next.seed = preview.pinned_seed;
    }

    let painter = match GlyphPainter::for_source(next.font.as_ref()) {
        Ok(painter) => painter,
        Err(error) => {
            warn!("reload failed to load font, keeping previous config: {error:#}");
            return;
        }
    };

    let seed_changed = next.seed != preview.engine.config().seed;
    preview.clock.set_interval(next.frame_interval(), Instant::now());
    preview.engine.surface_mut().set_painter(painter);
    if seed_changed {
        preview.engine.on_config_change_reseeded(next);
    } else {
        preview.engine.on_config_change(next);
    }

    let grid = preview.engine.grid();
    info!(
        path = %path.display(),
        columns = grid.columns,
        rows = grid.rows,
        "config reloaded"
    );
}

fn handle_keyboard_event(key: PhysicalKey, preview: &mut Preview, target: &EventLoopWindowTarget<()>) {
    match key {
        PhysicalKey::Code(KeyCode::Space) => {
            preview.clock.toggle_pause(Instant::now());
            debug!(paused = preview.clock.is_paused(), "toggled pause");
        }
        PhysicalKey::Code(KeyCode::KeyR) => {
            preview.engine.reseed(preview.pinned_seed);
            debug!("reseeded");
        }
        PhysicalKey::Code(KeyCode::Escape) => target.exit(),
        _ => {}
    }
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn event_targets_config(event: &Event, config_path: &Path) -> bool {
    if event.paths.is_empty() {
        return true;
    }

    event.paths.iter().any(|path| {
        path == config_path
            || std::fs::canonicalize(path)
                .map(|resolved| resolved == config_path)
                .unwrap_or(false)
    })
}

fn canonical_config_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Result<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first().copied())
        .ok_or_else(|| anyhow!("surface reports no supported texture formats"))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use notify::{Event, EventKind};

    use super::{event_targets_config, should_reload};

    #[test]
    fn modify_and_create_trigger_reload() {
        assert!(should_reload(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(should_reload(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(!should_reload(&Event::new(EventKind::Remove(RemoveKind::File))));
    }

    #[test]
    fn only_the_watched_file_counts() {
        let watched = Path::new("/tmp/glyphrain-play/rain.yaml");
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/glyphrain-play/other.yaml"));
        assert!(!event_targets_config(&event, watched));

        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(watched.to_path_buf());
        assert!(event_targets_config(&event, watched));
    }
}
