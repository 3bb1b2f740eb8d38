//! Guest-side virgl 2D acceleration
//!
//! This crate keeps pixmaps in host resources of a virtio-gpu device and
//! accelerates copies between them with virgl blits, while letting the CPU
//! paint into the same pixels when it has to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Acceleration layer │
//! │ (pixmaps, copies)   │
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   DeviceContext     │◄─── This crate
//! │ surfaces │ encoder  │
//! └────┬───────────┬────┘
//!      │           │
//! ┌────▼─────┐ ┌───▼─────────┐
//! │   BOs    │ │ command     │
//! │ transfers│ │ stream      │
//! └────┬─────┘ └───┬─────────┘
//!      │           │
//! ┌────▼───────────▼────┐
//! │  virtio-gpu DRM     │
//! │  (ioctl transport)  │
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  Host renderer      │
//! │  (virglrenderer)    │
//! └─────────────────────┘
//! ```
//!
//! # CPU access
//!
//! CPU reads and writes of a host-backed surface are bracketed by
//! [`DeviceContext::prepare_access`] and [`DeviceContext::finish_access`].
//! Only rectangles not yet downloaded in the current cycle are fetched, and
//! a cycle that was read-write uploads everything it touched.
//!
//! # Usage
//!
//! ```ignore
//! use virgl_accel::{AccelConfig, AccessMode, DeviceContext, Rect, Region, UsageHint};
//!
//! let mut ctx = DeviceContext::open(AccelConfig::load("/etc/virgl.toml")?)?;
//! let a = ctx.create_pixmap(256, 256, 32, UsageHint::HOST_ACCELERATED)?.unwrap();
//! let b = ctx.create_pixmap(256, 256, 32, UsageHint::HOST_ACCELERATED)?.unwrap();
//!
//! if ctx.check_copy(b, a) && ctx.prepare_copy(a, b) {
//!     ctx.copy(a, 0, 0, 10, 10, 64, 64)?;
//!     ctx.done_copy(a)?;
//! }
//!
//! ctx.prepare_access(a, &Region::from_rect(Rect::from_size(0, 0, 16, 16)), AccessMode::ReadWrite)?;
//! ctx.finish_access(a)?;
//! ctx.block_handler()?;
//! ```

pub mod backend;
pub mod bo;
pub mod config;
pub mod context;
pub mod damage;
pub mod encoder;
pub mod error;
pub mod region;
pub mod surface;
pub mod transport;

#[cfg(test)]
mod tests;

pub use backend::{HostBackend, SoftwareBackend, SurfaceBackend, UsageHint};
pub use bo::{BoManager, BoRef, BufferObject};
pub use config::AccelConfig;
pub use context::{DeviceContext, PixmapId};
pub use encoder::CommandEncoder;
pub use error::{Error, Result, Verb};
pub use region::{Rect, Region};
pub use surface::{AccessMode, PixelFormat, Surface, SurfaceDesc, TRANSFER_FANOUT_LIMIT};
pub use transport::{DrmTransport, Transport};
