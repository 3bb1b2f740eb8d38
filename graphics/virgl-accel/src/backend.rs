//! Surface factories
//!
//! [`HostBackend`] places surfaces in host resources when asked to;
//! [`SoftwareBackend`] never touches the host and keeps every surface in
//! guest memory.

use std::sync::Arc;

use bitflags::bitflags;
use virgl_protocol::{BindFlags, PipeTarget};

use crate::bo::{BoManager, BoRef};
use crate::error::{Error, Result};
use crate::surface::{Surface, SurfaceDesc};
use crate::transport::Transport;

bitflags! {
    /// Pixmap creation hints
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UsageHint: u32 {
        const SCRATCH = 1 << 0;
        const BACKING_PIXMAP = 1 << 1;
        const SHARED = 1 << 2;
        /// Place the surface in a host resource (render-client buffers)
        const HOST_ACCELERATED = 0x1000_0000;
    }
}

/// Creates and destroys surfaces
pub trait SurfaceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// New surface; host backed only when `usage` asks for acceleration
    fn create_surface(&self, width: u32, height: u32, bpp: u32, usage: UsageHint)
        -> Result<Surface>;

    /// Scanout surface covering the whole framebuffer
    fn create_primary(&self, width: u32, height: u32, bpp: u32) -> Result<Surface>;

    /// Give a guest-memory surface a host resource, keeping its contents
    fn migrate(&self, surface: &mut Surface) -> Result<()>;

    fn destroy_surface(&self, surface: Surface) {
        log::trace!(
            "virgl: destroying {}x{} surface (host backed: {})",
            surface.width(),
            surface.height(),
            surface.is_host_backed()
        );
        drop(surface);
    }
}

/// Surfaces backed by host resources through a [`Transport`]
pub struct HostBackend {
    bos: BoManager,
}

impl HostBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            bos: BoManager::new(transport),
        }
    }

    pub fn bos(&self) -> &BoManager {
        &self.bos
    }

    fn allocate(&self, desc: &SurfaceDesc, bind: BindFlags) -> Result<BoRef> {
        self.bos.allocate(
            PipeTarget::Texture2d,
            desc.format.host_format(),
            bind,
            desc.width,
            desc.height,
        )
    }
}

impl SurfaceBackend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        bpp: u32,
        usage: UsageHint,
    ) -> Result<Surface> {
        let desc = SurfaceDesc::new(width, height, bpp)?;
        if !usage.contains(UsageHint::HOST_ACCELERATED) {
            return Ok(Surface::cpu(desc));
        }

        let bo = self.allocate(&desc, BindFlags::RENDER_TARGET)?;
        Ok(Surface::host(desc, bo))
    }

    fn create_primary(&self, width: u32, height: u32, bpp: u32) -> Result<Surface> {
        let desc = SurfaceDesc::new(width, height, bpp)?;
        let bo = self.allocate(&desc, BindFlags::RENDER_TARGET | BindFlags::SCANOUT)?;
        bo.map()?;

        log::info!(
            "virgl: primary {}x{} {:?}, stride {}",
            width,
            height,
            desc.format,
            desc.stride
        );
        Ok(Surface::primary(desc, bo))
    }

    fn migrate(&self, surface: &mut Surface) -> Result<()> {
        if surface.is_host_backed() {
            return Ok(());
        }

        let bo = self.allocate(surface.desc(), BindFlags::RENDER_TARGET)?;
        surface.attach_bo(bo)
    }
}

/// Guest-memory surfaces only
#[derive(Debug, Default)]
pub struct SoftwareBackend;

impl SurfaceBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        bpp: u32,
        _usage: UsageHint,
    ) -> Result<Surface> {
        Ok(Surface::cpu(SurfaceDesc::new(width, height, bpp)?))
    }

    fn create_primary(&self, width: u32, height: u32, bpp: u32) -> Result<Surface> {
        Ok(Surface::cpu(SurfaceDesc::new(width, height, bpp)?))
    }

    fn migrate(&self, _surface: &mut Surface) -> Result<()> {
        Err(Error::NotHostBacked)
    }
}
