//! Compute/graphics interop core.
//!
//! - [`session`] - device selection, context, queue, teardown
//! - [`program`] - kernel compilation and work-group shape
//! - [`args`] - kernel parameters and binding order
//! - [`surface`] - result image and interop surface (shared or staged)
//! - [`transfer`] - strategies moving the result into the surface
//! - [`present`] - rendering collaborator interface
//! - [`scheduler`] - per-frame state machine tying it together

pub mod args;
pub mod present;
pub mod program;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod transfer;

pub use args::{
    kernel_args, pack_uniforms, ArgValue, DispatchParameters, KernelArg, DEFAULT_CENTER, DEFAULT_MAX_ITERATIONS,
    DEFAULT_SIZE, DEFAULT_ZOOM,
};
pub use present::{display_target_descriptor, Frame, OffscreenPresenter, Presenter};
pub use program::{KernelProgram, KernelSource, WorkGroupShape, DEFAULT_TARGET_ITEMS, ENTRY_POINT, KERNEL_NAME};
pub use scheduler::{FrameState, InteropPipeline};
pub use session::{list_adapters, DeviceClass, DeviceSession, SessionKind};
pub use surface::{InteropSurface, Ownership, ResultImage, StorageMode, SurfaceHandle, RESULT_FORMAT};
pub use transfer::{strategy_for, SharedTransfer, StagedTransfer, TransferStrategy};
