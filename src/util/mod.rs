//! Utility types shared by the pipeline.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`DispatchGrid`] - Tile-aligned dispatch sizing
//! - [`logging`] - env_logger / tracing setup for the binaries

mod error;
mod dimensions;
pub mod logging;

pub use error::*;
pub use dimensions::*;
