//! egui-side presenter: shows interop surfaces as egui textures.

use std::sync::Arc;

use egui::mutex::RwLock;
use log::debug;

use crate::compute::{display_target_descriptor, DeviceSession, Frame, Presenter, SurfaceHandle};
use crate::util::Result;

/// Presents frames through the egui wgpu renderer.
///
/// Shared surfaces are registered once as native textures and sampled in
/// place; staged pixels are uploaded into a managed egui texture each frame.
pub struct EguiPresenter {
    ctx: egui::Context,
    renderer: Arc<RwLock<egui_wgpu::Renderer>>,
    native: Option<egui::TextureId>,
    staged: Option<egui::TextureHandle>,
    last: Option<SurfaceHandle>,
    viewport: (u32, u32),
    title: String,
}

impl EguiPresenter {
    pub fn new(ctx: egui::Context, renderer: Arc<RwLock<egui_wgpu::Renderer>>) -> Self {
        Self {
            ctx,
            renderer,
            native: None,
            staged: None,
            last: None,
            viewport: (0, 0),
            title: String::new(),
        }
    }

    /// Texture to paint for the most recent frame.
    pub fn texture_id(&self) -> Option<egui::TextureId> {
        self.last?;
        self.native.or_else(|| self.staged.as_ref().map(|t| t.id()))
    }

    pub fn last_handle(&self) -> Option<SurfaceHandle> {
        self.last
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn free_native(&mut self) {
        if let Some(id) = self.native.take() {
            self.renderer.write().free_texture(&id);
        }
    }

    /// Drop every texture the presenter registered.
    pub fn release(&mut self) {
        self.free_native();
        self.staged = None;
        self.last = None;
    }
}

impl Presenter for EguiPresenter {
    fn create_display_target(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<wgpu::Texture> {
        self.free_native();
        let texture = device.create_texture(&display_target_descriptor(width, height));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self
            .renderer
            .write()
            .register_native_texture(device, &view, wgpu::FilterMode::Nearest);
        debug!("Registered display target {:?} ({}x{})", id, width, height);
        self.native = Some(id);
        self.last = None;
        Ok(texture)
    }

    fn present(&mut self, _session: &DeviceSession, frame: Frame<'_>) -> Result<()> {
        let handle = frame.handle();
        if let Frame::Staged { pixels, .. } = frame {
            let size = [handle.width as usize, handle.height as usize];
            let image = egui::ColorImage::from_rgba_unmultiplied(size, pixels);
            match &mut self.staged {
                Some(texture) => texture.set(image, egui::TextureOptions::NEAREST),
                None => {
                    self.staged = Some(self.ctx.load_texture("mandelbrot", image, egui::TextureOptions::NEAREST));
                }
            }
        }
        self.last = Some(handle);
        Ok(())
    }

    fn set_title(&mut self, text: &str) {
        self.title = text.to_string();
        self.ctx.send_viewport_cmd(egui::ViewportCommand::Title(self.title.clone()));
    }

    fn configure_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }
}

impl Drop for EguiPresenter {
    fn drop(&mut self) {
        self.free_native();
    }
}
