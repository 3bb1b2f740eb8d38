//! virgl wire definitions
//!
//! Everything the guest puts on the wire towards the host renderer lives here:
//!
//! - the command stream vocabulary ([`command`]): opcodes, header packing and
//!   the fixed payload shapes of the copy-region and blit records,
//! - gallium resource targets, formats and bind flags ([`format`]),
//! - the `#[repr(C)]` argument blocks of the virtio-gpu DRM ioctls ([`drm`]).
//!
//! No I/O happens in this crate.

#![no_std]

pub mod command;
pub mod drm;
pub mod format;

pub use command::{CommandHeader, Opcode, TransferBox, BLIT_LENGTH, RESOURCE_COPY_REGION_LENGTH};
pub use format::{BindFlags, PipeFormat, PipeTarget};
