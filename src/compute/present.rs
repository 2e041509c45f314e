//! Rendering collaborator interface.
//!
//! The pipeline never owns a window. It asks the presenter for display
//! targets (shared mode), hands it each finished frame, and passes it the
//! stats line for the title.

use std::path::Path;

use log::info;

use super::session::DeviceSession;
use super::surface::{image_bytes, read_texture, SurfaceHandle, RESULT_FORMAT};
use crate::util::{Error, Result};

/// A finished frame, borrowed for the duration of `present`.
pub enum Frame<'a> {
    /// Texture the renderer can sample directly.
    Shared { texture: &'a wgpu::Texture, handle: SurfaceHandle },
    /// Host pixels the renderer must upload.
    Staged { pixels: &'a [u8], handle: SurfaceHandle },
}

impl Frame<'_> {
    pub fn handle(&self) -> SurfaceHandle {
        match self {
            Self::Shared { handle, .. } | Self::Staged { handle, .. } => *handle,
        }
    }
}

/// Window-side operations the pipeline calls.
pub trait Presenter {
    /// Create a texture to be wrapped as a shared interop surface.
    fn create_display_target(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<wgpu::Texture>;

    /// Show a finished frame.
    fn present(&mut self, session: &DeviceSession, frame: Frame<'_>) -> Result<()>;

    fn set_title(&mut self, text: &str);

    /// Surface dimensions changed.
    fn configure_viewport(&mut self, _width: u32, _height: u32) {}
}

/// Descriptor for textures handed out by [`Presenter::create_display_target`].
pub fn display_target_descriptor(width: u32, height: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("display_target"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RESULT_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    }
}

/// Headless presenter that keeps the last frame in host memory.
#[derive(Debug, Default)]
pub struct OffscreenPresenter {
    pixels: Vec<u8>,
    size: (u32, u32),
    title: Option<String>,
    frames: u64,
    targets_created: u32,
}

impl OffscreenPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// RGBA8 pixels of the last presented frame.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Pixel at `(x, y)` of the last frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.0 || y >= self.size.1 {
            return None;
        }
        let at = (y as usize * self.size.0 as usize + x as usize) * 4;
        self.pixels.get(at..at + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn targets_created(&self) -> u32 {
        self.targets_created
    }

    /// Write the last frame as an image; the format follows the extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.frames == 0 {
            return Err(Error::invalid("no frame has been presented"));
        }
        let (w, h) = self.size;
        let image = image::RgbaImage::from_raw(w, h, self.pixels.clone())
            .ok_or_else(|| Error::invalid("frame buffer does not match its size"))?;
        image.save(path).map_err(|e| Error::Io(std::io::Error::other(e)))?;
        info!("Saved {}x{} frame to {}", w, h, path.display());
        Ok(())
    }
}

impl Presenter for OffscreenPresenter {
    fn create_display_target(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<wgpu::Texture> {
        self.targets_created += 1;
        Ok(device.create_texture(&display_target_descriptor(width, height)))
    }

    fn present(&mut self, session: &DeviceSession, frame: Frame<'_>) -> Result<()> {
        let handle = frame.handle();
        let len = image_bytes(handle.width, handle.height)
            .ok_or_else(|| Error::AllocationFailed("frame too large".into()))?;
        self.pixels.resize(len, 0);
        match frame {
            Frame::Shared { texture, .. } => read_texture(session, texture, &mut self.pixels)?,
            Frame::Staged { pixels, .. } => self.pixels.copy_from_slice(pixels),
        }
        self.size = (handle.width, handle.height);
        self.frames += 1;
        Ok(())
    }

    fn set_title(&mut self, text: &str) {
        self.title = Some(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offscreen_pixel_bounds() {
        let p = OffscreenPresenter::new();
        assert_eq!(p.pixel(0, 0), None);
        assert_eq!(p.frames_presented(), 0);
        assert!(p.title().is_none());
    }

    #[test]
    fn test_save_without_frame() {
        let dir = tempfile::tempdir().unwrap();
        let p = OffscreenPresenter::new();
        assert!(p.save(&dir.path().join("frame.png")).is_err());
    }

    #[test]
    fn test_display_target_usage() {
        let desc = display_target_descriptor(64, 32);
        assert_eq!(desc.format, RESULT_FORMAT);
        assert!(desc.usage.contains(wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING));
        assert_eq!(desc.size.width, 64);
        assert_eq!(desc.size.height, 32);
    }
}
