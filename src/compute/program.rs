//! Kernel program: compiled shader module, entry point and tile shape.
//!
//! ## Tile heuristic
//!
//! The work-group shape is a fixed policy, not a search:
//!
//! ```text
//! tile_x = max(1, max_invocations / target_items_per_group)
//! tile_y = max_invocations / tile_x
//! ```
//!
//! `target_items_per_group` defaults to 32 and is exposed as a setting. The
//! shape ignores the image size; the dispatch grid is rounded up instead.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::args::UNIFORM_BLOCK_SIZE;
use super::session::DeviceSession;
use super::surface::RESULT_FORMAT;
use crate::util::{Error, Result};

/// Logical name of the kernel source resource.
pub const KERNEL_NAME: &str = "mandelbrot.wgsl";
/// Entry point invoked every frame.
pub const ENTRY_POINT: &str = "mandelbrot";
/// Default work-items per group divisor.
pub const DEFAULT_TARGET_ITEMS: u32 = 32;

const EMBEDDED_KERNEL: &str = include_str!("mandelbrot.wgsl");

/// Kernel source text and where it came from.
#[derive(Clone, Debug)]
pub struct KernelSource {
    pub origin: String,
    pub text: Cow<'static, str>,
}

impl KernelSource {
    /// The kernel compiled into the binary.
    pub fn embedded() -> Self {
        Self { origin: format!("<embedded {}>", KERNEL_NAME), text: Cow::Borrowed(EMBEDDED_KERNEL) }
    }

    /// Read the kernel from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { origin: path.display().to_string(), text: Cow::Owned(text) })
    }

    /// Inline source, mostly for tests and alternative kernels.
    pub fn inline(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self { origin: origin.into(), text: Cow::Owned(text.into()) }
    }

    /// Explicit path if given, otherwise the embedded kernel.
    pub fn resolve(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::embedded()),
        }
    }
}

/// 2D work-group (tile) dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkGroupShape {
    pub x: u32,
    pub y: u32,
}

impl WorkGroupShape {
    /// Derive the tile from the device's maximum work-group size.
    pub fn derive(max_invocations: u32, target_items_per_group: u32) -> Result<Self> {
        if max_invocations == 0 {
            return Err(Error::WorkGroupQueryFailed("device reports a maximum work-group size of 0".into()));
        }
        if target_items_per_group == 0 {
            return Err(Error::WorkGroupQueryFailed("target items per group must be non-zero".into()));
        }
        let x = (max_invocations / target_items_per_group).max(1);
        let y = max_invocations / x;
        Ok(Self { x, y })
    }

    /// Check the tile against per-dimension device limits.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<()> {
        if self.x > limits.max_compute_workgroup_size_x || self.y > limits.max_compute_workgroup_size_y {
            return Err(Error::WorkGroupQueryFailed(format!(
                "tile {}x{} exceeds device limits {}x{}",
                self.x, self.y, limits.max_compute_workgroup_size_x, limits.max_compute_workgroup_size_y
            )));
        }
        Ok(())
    }

    pub fn as_array(&self) -> [u32; 2] {
        [self.x, self.y]
    }

    pub fn items(&self) -> u32 {
        self.x * self.y
    }
}

/// Compiled program plus its entry point.
pub struct KernelProgram {
    module: Option<wgpu::ShaderModule>,
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    max_workgroup_size: u32,
    shape: WorkGroupShape,
    origin: String,
}

impl KernelProgram {
    /// Compile `source`, query the work-group limit and create the entry point.
    pub fn build(session: &DeviceSession, source: &KernelSource, target_items_per_group: u32) -> Result<Self> {
        let _span = tracing::info_span!("kernel_build").entered();
        info!("Loading kernel source from '{}'...", source.origin);

        let module = session
            .guarded(|device, _| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(KERNEL_NAME),
                    source: wgpu::ShaderSource::Wgsl(source.text.clone()),
                })
            })?
            .map_err(|e| Error::CompileFailed(e.to_string()))?;

        let limits = session.device()?.limits();
        let max_workgroup_size = limits.max_compute_invocations_per_workgroup;
        let shape = WorkGroupShape::derive(max_workgroup_size, target_items_per_group)?;
        shape.validate(&limits)?;
        debug!("MaxWorkGroupSize: {}, WorkGroupItems: {}", max_workgroup_size, target_items_per_group);

        let bind_group_layout = session.device()?.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel_bind_group_layout"),
            entries: &[
                // @binding(0) output image
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: RESULT_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                // @binding(1) scalar parameters
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE as u64),
                    },
                    count: None,
                },
            ],
        });

        info!("Creating kernel '{}' with {}x{} tiles...", ENTRY_POINT, shape.x, shape.y);
        let pipeline = Self::create_entry_point(session, &module, &bind_group_layout, shape)?;

        Ok(Self {
            module: Some(module),
            pipeline: Some(pipeline),
            bind_group_layout,
            max_workgroup_size,
            shape,
            origin: source.origin.clone(),
        })
    }

    fn create_entry_point(
        session: &DeviceSession,
        module: &wgpu::ShaderModule,
        layout: &wgpu::BindGroupLayout,
        shape: WorkGroupShape,
    ) -> Result<wgpu::ComputePipeline> {
        let constants = [("TILE_X", shape.x as f64), ("TILE_Y", shape.y as f64)];
        session
            .guarded(|device, _| {
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("kernel_pipeline_layout"),
                    bind_group_layouts: &[layout],
                    push_constant_ranges: &[],
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("kernel_pipeline"),
                    layout: Some(&pipeline_layout),
                    module,
                    entry_point: Some(ENTRY_POINT),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        zero_initialize_workgroup_memory: true,
                    },
                    cache: None,
                })
            })?
            .map_err(|e| Error::EntryPointMissing { entry: ENTRY_POINT.to_string(), message: e.to_string() })
    }

    /// Release the entry point, then the module.
    pub fn release(&mut self) {
        self.pipeline = None;
        self.module = None;
    }

    /// Release the current program and compile `source` in its place.
    pub fn rebuild(&mut self, session: &DeviceSession, source: &KernelSource, target_items_per_group: u32) -> Result<()> {
        self.release();
        *self = Self::build(session, source, target_items_per_group)?;
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.module.is_some() && self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> Result<&wgpu::ComputePipeline> {
        self.pipeline.as_ref().ok_or_else(|| Error::invalid("kernel program was released"))
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Device-reported maximum invocations per work-group.
    pub fn max_workgroup_size(&self) -> u32 {
        self.max_workgroup_size
    }

    pub fn shape(&self) -> WorkGroupShape {
        self.shape
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}
