//! # Mandel Interop
//!
//! Real-time Mandelbrot viewer driven by a wgpu compute kernel whose output
//! reaches the screen either through a GPU-side copy into a texture owned by
//! the renderer (shared) or a host read-back (staged).
//!
//! ## Modules
//!
//! - [`util`] - Errors and dispatch-grid arithmetic
//! - [`compute`] - Device session, kernel program, interop surface, frame scheduler
//! - [`stats`] - Frame timing windows and the title line
//! - [`settings`] - Run configuration
//! - [`viewer`] - eframe front end (feature `viewer`)
//!
//! ## Example
//!
//! ```ignore
//! use mandel_interop::prelude::*;
//!
//! let session = DeviceSession::open(DeviceClass::Gpu)?;
//! let mut presenter = OffscreenPresenter::new();
//! let mut pipeline = InteropPipeline::setup(
//!     session,
//!     strategy_for(StorageMode::Staged),
//!     &KernelSource::embedded(),
//!     DEFAULT_TARGET_ITEMS,
//!     &mut presenter,
//!     512,
//!     512,
//! )?;
//! let mut params = DispatchParameters::new(512, 512);
//! pipeline.run_frame(&mut params, &mut presenter)?;
//! presenter.save("frame.png".as_ref())?;
//! ```

pub mod util;
pub mod compute;
pub mod stats;
pub mod settings;

// Windowed viewer (optional, enabled with "viewer" feature)
#[cfg(feature = "viewer")]
pub mod viewer;

pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::compute::*;
    pub use crate::settings::{Settings, TransferMode};
    pub use crate::stats::{FrameRate, StatsAccumulator, StatsReport};
}
