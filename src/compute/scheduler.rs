//! Frame scheduler: one synchronous compute/present cycle per frame.
//!
//! ## State machine
//! ```text
//! Idle ──(dirty)──> ArgsBound ──> Dispatched ──> Transferred ──> Idle
//!   └───────(clean)──────────────────┘
//! ```
//! Every device step blocks until the device reports completion, so exactly
//! one frame is in flight and the shared surface is always back in graphics
//! ownership when control returns to the caller.
//!
//! ## Usage
//! ```ignore
//! let session = DeviceSession::open(DeviceClass::Gpu)?;
//! let mut pipeline = InteropPipeline::new(session, strategy_for(StorageMode::Staged));
//! pipeline.build_kernel(&KernelSource::embedded(), DEFAULT_TARGET_ITEMS)?;
//! pipeline.resize(&mut presenter, 512, 512)?;
//! pipeline.run_frame(&mut params, &mut presenter)?;
//! ```

use std::time::Instant;

use log::{debug, info};

use super::args::{kernel_args, pack_uniforms, DispatchParameters, UNIFORM_BLOCK_SIZE};
use super::present::{Frame, Presenter};
use super::program::{KernelProgram, KernelSource};
use super::session::DeviceSession;
use super::surface::{InteropSurface, ResultImage, StorageMode};
use super::transfer::TransferStrategy;
use crate::stats::{StatsAccumulator, StatsReport};
use crate::util::{DispatchGrid, Error, Result};

/// Position within one frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    ArgsBound,
    Dispatched,
    Transferred,
}

/// Owns every device object of the interop pipeline.
pub struct InteropPipeline {
    session: DeviceSession,
    program: Option<KernelProgram>,
    uniforms: Option<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
    result: Option<ResultImage>,
    surface: Option<InteropSurface>,
    transfer: Box<dyn TransferStrategy>,
    state: FrameState,
    generation: u64,
    rebinds: u64,
    frames: u64,
    grid: Option<DispatchGrid>,
}

impl InteropPipeline {
    /// Wrap an open session. No kernel or surface exists yet.
    pub fn new(session: DeviceSession, transfer: Box<dyn TransferStrategy>) -> Self {
        info!("Interop pipeline on {} using {} transfers", session.class(), transfer.mode());
        Self {
            session,
            program: None,
            uniforms: None,
            bind_group: None,
            result: None,
            surface: None,
            transfer,
            state: FrameState::Idle,
            generation: 0,
            rebinds: 0,
            frames: 0,
            grid: None,
        }
    }

    /// Session, kernel and first surface in one call.
    pub fn setup(
        session: DeviceSession,
        transfer: Box<dyn TransferStrategy>,
        source: &KernelSource,
        target_items_per_group: u32,
        presenter: &mut dyn Presenter,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let mut pipeline = Self::new(session, transfer);
        pipeline.build_kernel(source, target_items_per_group)?;
        pipeline.resize(presenter, width, height)?;
        Ok(pipeline)
    }

    /// Compile the kernel, releasing any previous program first.
    pub fn build_kernel(&mut self, source: &KernelSource, target_items_per_group: u32) -> Result<()> {
        self.bind_group = None;
        match &mut self.program {
            Some(program) => program.rebuild(&self.session, source, target_items_per_group)?,
            None => self.program = Some(KernelProgram::build(&self.session, source, target_items_per_group)?),
        }

        if self.uniforms.is_none() {
            let buffer = self
                .session
                .guarded(|device, _| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("kernel_params"),
                        size: UNIFORM_BLOCK_SIZE as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })?
                .map_err(|e| Error::AllocationFailed(e.to_string()))?;
            self.uniforms = Some(buffer);
        }
        Ok(())
    }

    /// Replace surface and result image with `width` x `height` ones.
    ///
    /// The old allocations are released before the new ones are created.
    pub fn resize(&mut self, presenter: &mut dyn Presenter, width: u32, height: u32) -> Result<()> {
        let _span = tracing::info_span!("resize", width, height).entered();
        self.bind_group = None;
        self.surface = None;
        self.result = None;

        info!("Creating {} surface {} x {}...", self.transfer.mode(), width, height);
        self.generation += 1;
        let result = ResultImage::create(&self.session, width, height)?;
        let surface = self
            .transfer
            .create_surface(&self.session, presenter, width, height, self.generation)?;
        presenter.configure_viewport(width, height);

        self.result = Some(result);
        self.surface = Some(surface);
        Ok(())
    }

    /// Run one frame and hand the surface to `presenter`.
    ///
    /// Returns `Ok(false)` without touching the device when the kernel or
    /// surface has not been set up yet.
    pub fn run_frame(&mut self, params: &mut DispatchParameters, presenter: &mut dyn Presenter) -> Result<bool> {
        let _span = tracing::info_span!("frame", n = self.frames).entered();
        if self.program.is_none() {
            return Ok(false);
        }
        let Some(surface) = &self.surface else {
            return Ok(false);
        };

        if surface.size() != params.size() {
            let (w, h) = params.size();
            self.resize(presenter, w, h)?;
        }
        if self.bind_group.is_none() {
            params.mark_dirty();
        }

        self.state = FrameState::Idle;
        if params.is_dirty() {
            self.bind_args(params)?;
        }
        self.dispatch()?;
        self.transfer()?;

        let surface = self.surface.as_ref().ok_or_else(|| Error::invalid("surface released mid-frame"))?;
        let frame = match surface.texture() {
            Some(texture) => Frame::Shared { texture, handle: surface.handle() },
            None => Frame::Staged {
                pixels: surface.pixels().unwrap_or_default(),
                handle: surface.handle(),
            },
        };
        presenter.present(&self.session, frame)?;

        self.state = FrameState::Idle;
        self.frames += 1;
        Ok(true)
    }

    /// Run one frame, time it, and pass any stats report to the presenter.
    pub fn run_timed_frame(
        &mut self,
        params: &mut DispatchParameters,
        presenter: &mut dyn Presenter,
        stats: &mut StatsAccumulator,
    ) -> Result<Option<StatsReport>> {
        let start = Instant::now();
        if !self.run_frame(params, presenter)? {
            return Ok(None);
        }
        let Some(rate) = stats.record_duration(start.elapsed()) else {
            return Ok(None);
        };
        let report = StatsReport::new(rate, self.session.class(), self.mode(), params);
        presenter.set_title(&report.to_string());
        Ok(Some(report))
    }

    /// Bind output image, then scalar arguments; clears dirty only on full success.
    fn bind_args(&mut self, params: &mut DispatchParameters) -> Result<()> {
        let _span = tracing::debug_span!("bind_args").entered();
        let args = kernel_args(params);
        let block = pack_uniforms(&args)?;

        let program = self.program.as_ref().ok_or_else(|| Error::bind("output", "no kernel program"))?;
        let result = self.result.as_ref().ok_or_else(|| Error::bind("output", "no result image allocated"))?;
        let uniforms = self.uniforms.as_ref().ok_or_else(|| Error::bind("width", "no parameter buffer"))?;
        if result.size() != params.size() {
            return Err(Error::bind(
                "width",
                format!("canvas {:?} does not match result image {:?}", params.size(), result.size()),
            ));
        }

        let bind_group = self
            .session
            .guarded(|device, queue| {
                let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("kernel_bind_group"),
                    layout: program.bind_group_layout(),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(result.view()),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: uniforms.as_entire_binding(),
                        },
                    ],
                });
                queue.write_buffer(uniforms, 0, &block);
                group
            })?
            .map_err(|e| Error::bind("output", e.to_string()))?;

        self.bind_group = Some(bind_group);
        self.rebinds += 1;
        params.mark_bound();
        self.state = FrameState::ArgsBound;
        debug!("Bound {} kernel arguments", args.len());
        Ok(())
    }

    /// Enqueue the kernel over the tile-aligned grid and wait for it.
    fn dispatch(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("dispatch").entered();
        let program = self.program.as_ref().ok_or_else(|| Error::DispatchFailed("no kernel program".into()))?;
        let pipeline = program.pipeline()?;
        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| Error::DispatchFailed("kernel arguments are not bound".into()))?;
        let (width, height) = self
            .result
            .as_ref()
            .map(|r| r.size())
            .ok_or_else(|| Error::DispatchFailed("no result image".into()))?;

        let grid = DispatchGrid::cover(width, height, program.shape().as_array());
        let [gx, gy] = grid.workgroups();
        let max_groups = self.session.device()?.limits().max_compute_workgroups_per_dimension;
        if gx > max_groups || gy > max_groups {
            return Err(Error::DispatchFailed(format!(
                "{}x{} work-groups exceed device limit {}",
                gx, gy, max_groups
            )));
        }
        if self.frames == 0 {
            debug!("Global[{:4} {:4}] Local[{:4} {:4}]", grid.global[0], grid.global[1], grid.local[0], grid.local[1]);
        }

        self.session
            .guarded(|device, queue| {
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("kernel_encoder"),
                });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("kernel_pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(gx, gy, 1);
                }
                queue.submit(Some(encoder.finish()));
            })?
            .map_err(|e| Error::DispatchFailed(e.to_string()))?;
        self.session.wait_idle()?;

        self.grid = Some(grid);
        self.state = FrameState::Dispatched;
        Ok(())
    }

    /// Materialize the result image into the surface.
    fn transfer(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("transfer").entered();
        let result = self.result.as_ref().ok_or_else(|| Error::transfer("copy", "no result image"))?;
        let surface = self.surface.as_mut().ok_or_else(|| Error::transfer("copy", "no surface"))?;
        self.transfer.transfer(&self.session, result, surface)?;
        self.state = FrameState::Transferred;
        Ok(())
    }

    /// Release kernel, program, surfaces, then queue and device. Idempotent.
    pub fn close(&mut self) {
        if !self.session.is_open() && self.program.is_none() && self.surface.is_none() {
            return;
        }
        info!("Shutting down...");
        self.bind_group = None;
        if let Some(mut program) = self.program.take() {
            program.release();
        }
        self.uniforms = None;
        self.surface = None;
        self.result = None;
        self.session.close();
        self.state = FrameState::Idle;
    }

    pub fn is_closed(&self) -> bool {
        !self.session.is_open()
            && self.program.is_none()
            && self.uniforms.is_none()
            && self.bind_group.is_none()
            && self.surface.is_none()
            && self.result.is_none()
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn program(&self) -> Option<&KernelProgram> {
        self.program.as_ref()
    }

    pub fn surface(&self) -> Option<&InteropSurface> {
        self.surface.as_ref()
    }

    pub fn mode(&self) -> StorageMode {
        self.transfer.mode()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of successful argument rebinds.
    pub fn rebind_count(&self) -> u64 {
        self.rebinds
    }

    /// Number of completed frames.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Grid used by the most recent dispatch.
    pub fn last_grid(&self) -> Option<DispatchGrid> {
        self.grid
    }
}

impl Drop for InteropPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{strategy_for, DeviceClass, OffscreenPresenter, DEFAULT_TARGET_ITEMS};

    fn staged_pipeline(presenter: &mut OffscreenPresenter, size: u32) -> Option<InteropPipeline> {
        let session = [DeviceClass::Gpu, DeviceClass::Cpu]
            .into_iter()
            .find_map(|class| DeviceSession::open(class).ok());
        let Some(session) = session else {
            println!("skipping: no usable adapter");
            return None;
        };
        let pipeline = InteropPipeline::setup(
            session,
            strategy_for(StorageMode::Staged),
            &KernelSource::embedded(),
            DEFAULT_TARGET_ITEMS,
            presenter,
            size,
            size,
        )
        .unwrap();
        Some(pipeline)
    }

    #[test]
    fn test_failed_bind_keeps_params_dirty() {
        let mut presenter = OffscreenPresenter::new();
        let Some(mut pipeline) = staged_pipeline(&mut presenter, 64) else { return };

        // canvas no longer matches the allocated result image
        let mut params = DispatchParameters::new(32, 32);
        let err = pipeline.bind_args(&mut params).unwrap_err();
        assert!(matches!(err, Error::ArgBindFailed { arg: "width", .. }), "{}", err);
        assert!(params.is_dirty());
        assert_eq!(pipeline.rebind_count(), 0);
        assert_eq!(pipeline.state(), FrameState::Idle);

        let mut params = DispatchParameters::new(64, 64);
        pipeline.bind_args(&mut params).unwrap();
        assert!(!params.is_dirty());
        assert_eq!(pipeline.rebind_count(), 1);
        assert_eq!(pipeline.state(), FrameState::ArgsBound);
    }

    #[test]
    fn test_failed_bind_after_release_keeps_params_dirty() {
        let mut presenter = OffscreenPresenter::new();
        let Some(mut pipeline) = staged_pipeline(&mut presenter, 16) else { return };
        pipeline.close();

        let mut params = DispatchParameters::new(16, 16);
        let err = pipeline.bind_args(&mut params).unwrap_err();
        assert!(matches!(err, Error::ArgBindFailed { arg: "output", .. }), "{}", err);
        assert!(params.is_dirty());
    }
}
