//! Kernel parameters and argument binding order.
//!
//! The kernel's positional signature is
//! `(output, width, height, max_iterations, center, zoom)`. [`kernel_args`]
//! declares that order once; [`pack_uniforms`] lays the scalar arguments out
//! in the WGSL `Params` uniform block that backs binding 1.

use glam::Vec2;

use crate::util::{Error, Result};

/// Default canvas edge in pixels.
pub const DEFAULT_SIZE: u32 = 512;
/// Default iteration bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
/// Default view center.
pub const DEFAULT_CENTER: Vec2 = Vec2::new(-0.75, 0.0);
/// Default zoom (width of the view in complex-plane units).
pub const DEFAULT_ZOOM: f32 = 3.0;

/// Size of the packed `Params` uniform block.
pub const UNIFORM_BLOCK_SIZE: usize = 32;

/// Parameters fed to the kernel, with a dirty flag tracking unbound changes.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchParameters {
    width: u32,
    height: u32,
    max_iterations: u32,
    center: Vec2,
    zoom: f32,
    dirty: bool,
}

impl Default for DispatchParameters {
    fn default() -> Self {
        Self {
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            dirty: true,
        }
    }
}

impl DispatchParameters {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, ..Default::default() }
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

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Parameters changed since the last successful bind.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force a rebind on the next frame.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Cleared by the scheduler once every argument is bound.
    pub(crate) fn mark_bound(&mut self) {
        self.dirty = false;
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.dirty = true;
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        self.max_iterations = max_iterations;
        self.dirty = true;
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.center = center;
        self.dirty = true;
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        self.dirty = true;
    }

    /// Move the center by `delta`, scaled by the current zoom.
    pub fn pan(&mut self, delta: Vec2) {
        self.set_center(self.center + delta * self.zoom);
    }

    /// Jump to a stored view.
    pub fn set_view(&mut self, center: Vec2, zoom: f32) {
        self.center = center;
        self.zoom = zoom;
        self.dirty = true;
    }
}

/// Value carried by one kernel argument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArgValue {
    /// The output image; bound through the bind group, not the uniform block.
    Surface,
    U32(u32),
    F32(f32),
    Vec2([f32; 2]),
}

impl ArgValue {
    /// Byte size of the value as the kernel sees it.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Surface => 0,
            Self::U32(_) | Self::F32(_) => 4,
            Self::Vec2(_) => 8,
        }
    }

    /// WGSL uniform alignment.
    fn align(&self) -> usize {
        match self {
            Self::Vec2(_) => 8,
            _ => 4,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            Self::Surface => {}
            Self::U32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Self::F32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Self::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice::<f32, u8>(v.as_slice())),
        }
    }
}

/// One positional kernel argument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelArg {
    pub name: &'static str,
    /// Declared size in bytes; must equal the value's size.
    pub size: usize,
    pub value: ArgValue,
}

/// Arguments in kernel signature order.
pub fn kernel_args(params: &DispatchParameters) -> [KernelArg; 6] {
    let c = params.center();
    [
        KernelArg { name: "output", size: 0, value: ArgValue::Surface },
        KernelArg { name: "width", size: 4, value: ArgValue::U32(params.width()) },
        KernelArg { name: "height", size: 4, value: ArgValue::U32(params.height()) },
        KernelArg { name: "max_iterations", size: 4, value: ArgValue::U32(params.max_iterations()) },
        KernelArg { name: "center", size: 8, value: ArgValue::Vec2([c.x, c.y]) },
        KernelArg { name: "zoom", size: 4, value: ArgValue::F32(params.zoom()) },
    ]
}

/// Byte offset of each scalar argument within the uniform block.
pub fn uniform_offsets(args: &[KernelArg]) -> Vec<(&'static str, usize)> {
    let mut offset = 0usize;
    args.iter()
        .filter(|a| a.value != ArgValue::Surface)
        .map(|a| {
            let align = a.value.align();
            offset = offset.div_ceil(align) * align;
            let at = offset;
            offset += a.size;
            (a.name, at)
        })
        .collect()
}

/// Pack the scalar arguments into the uniform block, in order.
///
/// Fails on the first argument whose declared size disagrees with its value
/// or that does not fit in the block.
pub fn pack_uniforms(args: &[KernelArg]) -> Result<[u8; UNIFORM_BLOCK_SIZE]> {
    let mut block = [0u8; UNIFORM_BLOCK_SIZE];
    let offsets = uniform_offsets(args);
    let scalars = args.iter().filter(|a| a.value != ArgValue::Surface);

    for (arg, (_, at)) in scalars.zip(offsets) {
        if arg.size != arg.value.byte_size() {
            return Err(Error::bind(
                arg.name,
                format!("declared {} bytes, value has {}", arg.size, arg.value.byte_size()),
            ));
        }
        let end = at + arg.size;
        if end > UNIFORM_BLOCK_SIZE {
            return Err(Error::bind(arg.name, format!("offset {} overflows uniform block", at)));
        }
        arg.value.write(&mut block[at..end]);
    }
    Ok(block)
}
