//! Interop surface and the kernel's result image.
//!
//! The kernel writes into a [`ResultImage`]; the transfer step then
//! materializes that image into the [`InteropSurface`] the renderer samples.
//! Neither is ever resized in place: a size change releases the old
//! allocation and creates a new one with a fresh generation, so handles held
//! by the rendering side can be checked for staleness.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use super::session::DeviceSession;
use crate::util::{Error, Result};

/// Pixel format of the result image and shared surfaces.
pub const RESULT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Channels per pixel.
pub const CHANNELS: usize = 4;
/// Bytes per channel.
pub const CHANNEL_SIZE: usize = std::mem::size_of::<u8>();
/// Bytes per pixel.
pub const BYTES_PER_PIXEL: usize = CHANNELS * CHANNEL_SIZE;

/// How the computed image reaches the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One GPU allocation shared by compute and graphics.
    #[default]
    Shared,
    /// Host buffer uploaded into a graphics texture each frame.
    Staged,
}

impl StorageMode {
    /// Short label used in stats reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Shared => "attached",
            Self::Staged => "copying",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Staged => f.write_str("staged"),
        }
    }
}

/// Which context currently owns a shared surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Graphics,
    Compute,
}

/// Byte length of a tightly packed `width` x `height` image.
pub fn image_bytes(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Identity of one surface allocation, as lent to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
}

enum Storage {
    Shared { texture: wgpu::Texture, ownership: Ownership },
    Staged { pixels: Vec<u8> },
}

/// 2D image the renderer samples.
pub struct InteropSurface {
    storage: Storage,
    width: u32,
    height: u32,
    generation: u64,
}

impl InteropSurface {
    /// Wrap a graphics-owned texture as the compute transfer target.
    pub fn wrap_shared(texture: wgpu::Texture, generation: u64) -> Result<Self> {
        if texture.format() != RESULT_FORMAT {
            return Err(Error::ResourceUnsupported(format!(
                "display target format {:?}, expected {:?}",
                texture.format(),
                RESULT_FORMAT
            )));
        }
        let needed = wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING;
        if !texture.usage().contains(needed) {
            return Err(Error::ResourceUnsupported(format!(
                "display target usage {:?} lacks {:?}",
                texture.usage(),
                needed
            )));
        }
        debug!("Wrapping display texture {}x{} as compute target", texture.width(), texture.height());
        Ok(Self {
            width: texture.width(),
            height: texture.height(),
            storage: Storage::Shared { texture, ownership: Ownership::Graphics },
            generation,
        })
    }

    /// Allocate a zeroed host buffer for staged transfers.
    pub fn allocate_staged(width: u32, height: u32, generation: u64) -> Result<Self> {
        let len = image_bytes(width, height)
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::AllocationFailed(format!("invalid host image size {}x{}", width, height)))?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|e| Error::AllocationFailed(format!("host image buffer of {} bytes: {}", len, e)))?;
        pixels.resize(len, 0);

        debug!("Allocated {}x{} host image buffer ({} bytes)", width, height, len);
        Ok(Self {
            storage: Storage::Staged { pixels },
            width,
            height,
            generation,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        RESULT_FORMAT
    }

    pub fn mode(&self) -> StorageMode {
        match self.storage {
            Storage::Shared { .. } => StorageMode::Shared,
            Storage::Staged { .. } => StorageMode::Staged,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle the renderer may hold for the current frame.
    pub fn handle(&self) -> SurfaceHandle {
        SurfaceHandle { generation: self.generation, width: self.width, height: self.height }
    }

    /// Whether `handle` still refers to this allocation.
    pub fn is_current(&self, handle: &SurfaceHandle) -> bool {
        *handle == self.handle()
    }

    /// Shared texture, if this is a shared surface.
    pub fn texture(&self) -> Option<&wgpu::Texture> {
        match &self.storage {
            Storage::Shared { texture, .. } => Some(texture),
            Storage::Staged { .. } => None,
        }
    }

    /// Host pixels, if this is a staged surface.
    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Staged { pixels } => Some(pixels),
            Storage::Shared { .. } => None,
        }
    }

    pub(crate) fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Storage::Staged { pixels } => Some(pixels),
            Storage::Shared { .. } => None,
        }
    }

    /// Current owner. Staged surfaces never leave graphics ownership.
    pub fn ownership(&self) -> Ownership {
        match &self.storage {
            Storage::Shared { ownership, .. } => *ownership,
            Storage::Staged { .. } => Ownership::Graphics,
        }
    }

    /// Hand a shared surface to compute. Fails if compute already owns it.
    pub(crate) fn acquire(&mut self) -> Result<&wgpu::Texture> {
        match &mut self.storage {
            Storage::Shared { texture, ownership } => {
                if *ownership == Ownership::Compute {
                    return Err(Error::transfer("acquire", "surface is already owned by compute"));
                }
                *ownership = Ownership::Compute;
                Ok(texture)
            }
            Storage::Staged { .. } => Err(Error::transfer("acquire", "staged surfaces cannot be acquired")),
        }
    }

    /// Return a shared surface to graphics visibility.
    pub(crate) fn release(&mut self) -> Result<()> {
        match &mut self.storage {
            Storage::Shared { ownership, .. } => {
                if *ownership != Ownership::Compute {
                    return Err(Error::transfer("release", "surface is not owned by compute"));
                }
                *ownership = Ownership::Graphics;
                Ok(())
            }
            Storage::Staged { .. } => Err(Error::transfer("release", "staged surfaces cannot be released")),
        }
    }
}

impl fmt::Debug for InteropSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteropSurface")
            .field("mode", &self.mode())
            .field("size", &self.size())
            .field("generation", &self.generation)
            .field("ownership", &self.ownership())
            .finish()
    }
}

/// Storage image the kernel writes.
pub struct ResultImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl ResultImage {
    /// Allocate a `width` x `height` write-only storage image.
    pub fn create(session: &DeviceSession, width: u32, height: u32) -> Result<Self> {
        let max = session.device()?.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(Error::AllocationFailed(format!(
                "result image {}x{} outside device range 1..={}",
                width, height, max
            )));
        }

        let texture = session
            .guarded(|device, _| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("compute_result"),
                    size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: RESULT_FORMAT,
                    usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })?
            .map_err(|e| Error::AllocationFailed(e.to_string()))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        debug!("Allocated compute result image {}x{} in device memory", width, height);
        Ok(Self { texture, view, width, height })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Read a texture back into a tightly packed host buffer.
///
/// Rows are copied through a buffer padded to `COPY_BYTES_PER_ROW_ALIGNMENT`
/// and the padding is stripped while unpacking into `out`.
pub fn read_texture(
    session: &DeviceSession,
    texture: &wgpu::Texture,
    out: &mut [u8],
) -> Result<()> {
    let (width, height) = (texture.width(), texture.height());
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    if out.len() != row_bytes * height as usize {
        return Err(Error::transfer(
            "read",
            format!("host buffer holds {} bytes, image needs {}", out.len(), row_bytes * height as usize),
        ));
    }
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    let padded_row = row_bytes.div_ceil(align) * align;

    let buffer = session
        .guarded(|device, queue| {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_buffer"),
                size: (padded_row * height as usize) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row as u32),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            );
            queue.submit(Some(encoder.finish()));
            buffer
        })?
        .map_err(|e| Error::transfer("read", e.to_string()))?;

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    session
        .device()?
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| Error::transfer("read", e.to_string()))?;
    rx.recv()
        .map_err(|_| Error::transfer("read", "map callback dropped"))?
        .map_err(|e| Error::transfer("read", e.to_string()))?;

    {
        let data = slice.get_mapped_range();
        for (dst, src) in out.chunks_exact_mut(row_bytes).zip(data.chunks_exact(padded_row)) {
            dst.copy_from_slice(&src[..row_bytes]);
        }
    }
    buffer.unmap();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_allocation_is_zeroed() {
        let s = InteropSurface::allocate_staged(64, 32, 1).unwrap();
        assert_eq!(s.size(), (64, 32));
        assert_eq!(s.mode(), StorageMode::Staged);
        let pixels = s.pixels().unwrap();
        assert_eq!(pixels.len(), 64 * 32 * CHANNEL_SIZE * 4);
        assert!(pixels.iter().all(|&b| b == 0));
        assert!(s.texture().is_none());
    }

    #[test]
    fn test_staged_rejects_empty() {
        assert!(matches!(InteropSurface::allocate_staged(0, 16, 1), Err(Error::AllocationFailed(_))));
        assert!(matches!(InteropSurface::allocate_staged(16, 0, 1), Err(Error::AllocationFailed(_))));
    }

    #[test]
    fn test_handle_staleness() {
        let old = InteropSurface::allocate_staged(8, 8, 1).unwrap();
        let handle = old.handle();
        assert!(old.is_current(&handle));

        let new = InteropSurface::allocate_staged(16, 8, 2).unwrap();
        assert!(!new.is_current(&handle));
    }

    #[test]
    fn test_staged_cannot_be_acquired() {
        let mut s = InteropSurface::allocate_staged(4, 4, 1).unwrap();
        assert_eq!(s.ownership(), Ownership::Graphics);
        assert!(s.acquire().is_err());
        assert!(s.release().is_err());
    }

    #[test]
    fn test_image_bytes() {
        assert_eq!(image_bytes(64, 64), Some(64 * 64 * 4));
        assert_eq!(image_bytes(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(StorageMode::Shared.label(), "attached");
        assert_eq!(StorageMode::Staged.label(), "copying");
        assert_eq!(StorageMode::default(), StorageMode::Shared);
    }
}
