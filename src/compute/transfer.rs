//! Transfer strategies: how the result image reaches the interop surface.
//!
//! Chosen once at startup. Both variants live in every build so either
//! can be exercised without recompiling.

use log::debug;

use super::present::Presenter;
use super::session::DeviceSession;
use super::surface::{read_texture, InteropSurface, ResultImage, StorageMode};
use crate::util::{Error, Result};

/// Creates surfaces of one storage mode and moves kernel output into them.
pub trait TransferStrategy {
    fn mode(&self) -> StorageMode;

    /// Allocate a surface of the given size.
    fn create_surface(
        &mut self,
        session: &DeviceSession,
        presenter: &mut dyn Presenter,
        width: u32,
        height: u32,
        generation: u64,
    ) -> Result<InteropSurface>;

    /// Materialize `result` into `surface`. Returns with the surface owned by graphics.
    fn transfer(&mut self, session: &DeviceSession, result: &ResultImage, surface: &mut InteropSurface) -> Result<()>;
}

/// Build the strategy for `mode`.
pub fn strategy_for(mode: StorageMode) -> Box<dyn TransferStrategy> {
    match mode {
        StorageMode::Shared => Box::new(SharedTransfer),
        StorageMode::Staged => Box::new(StagedTransfer),
    }
}

fn check_sizes(result: &ResultImage, surface: &InteropSurface) -> Result<()> {
    if result.size() != surface.size() {
        return Err(Error::transfer(
            "copy",
            format!("result image {:?} does not match surface {:?}", result.size(), surface.size()),
        ));
    }
    Ok(())
}

/// GPU-side copy into a texture owned by the renderer.
#[derive(Debug, Default)]
pub struct SharedTransfer;

impl TransferStrategy for SharedTransfer {
    fn mode(&self) -> StorageMode {
        StorageMode::Shared
    }

    fn create_surface(
        &mut self,
        session: &DeviceSession,
        presenter: &mut dyn Presenter,
        width: u32,
        height: u32,
        generation: u64,
    ) -> Result<InteropSurface> {
        let texture = presenter.create_display_target(session.device()?, width, height)?;
        let surface = InteropSurface::wrap_shared(texture, generation)?;
        if surface.size() != (width, height) {
            return Err(Error::AllocationFailed(format!(
                "display target is {:?}, requested {}x{}",
                surface.size(),
                width,
                height
            )));
        }
        Ok(surface)
    }

    fn transfer(&mut self, session: &DeviceSession, result: &ResultImage, surface: &mut InteropSurface) -> Result<()> {
        let _span = tracing::debug_span!("transfer_shared").entered();
        check_sizes(result, surface)?;
        let (width, height) = surface.size();

        // release runs even when the copy fails
        let copied = copy_into(session, result, surface.acquire()?, width, height);
        surface.release()?;
        copied
    }
}

/// GPU-side copy of the whole result image into `target`, waiting for completion.
fn copy_into(
    session: &DeviceSession,
    result: &ResultImage,
    target: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<()> {
    session
        .guarded(|device, queue| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("interop_copy_encoder"),
            });
            encoder.copy_texture_to_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: result.texture(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyTextureInfo {
                    texture: target,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            );
            queue.submit(Some(encoder.finish()));
        })?
        .map_err(|e| Error::transfer("copy", e.to_string()))?;
    session
        .device()?
        .poll(wgpu::PollType::wait_indefinitely())
        .map(|_| ())
        .map_err(|e| Error::transfer("copy", e.to_string()))
}

/// Synchronous read-back into a host buffer.
#[derive(Debug, Default)]
pub struct StagedTransfer;

impl TransferStrategy for StagedTransfer {
    fn mode(&self) -> StorageMode {
        StorageMode::Staged
    }

    fn create_surface(
        &mut self,
        _session: &DeviceSession,
        _presenter: &mut dyn Presenter,
        width: u32,
        height: u32,
        generation: u64,
    ) -> Result<InteropSurface> {
        InteropSurface::allocate_staged(width, height, generation)
    }

    fn transfer(&mut self, session: &DeviceSession, result: &ResultImage, surface: &mut InteropSurface) -> Result<()> {
        let _span = tracing::debug_span!("transfer_staged").entered();
        check_sizes(result, surface)?;
        let pixels = surface
            .pixels_mut()
            .ok_or_else(|| Error::transfer("read", "surface has no host buffer"))?;
        read_texture(session, result.texture(), pixels)?;
        debug!("Read back {} bytes", pixels.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for_mode() {
        assert_eq!(strategy_for(StorageMode::Shared).mode(), StorageMode::Shared);
        assert_eq!(strategy_for(StorageMode::Staged).mode(), StorageMode::Staged);
    }
}
