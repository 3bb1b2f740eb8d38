//! Device context
//!
//! Owns everything one display device needs: the transport, the command
//! encoder, the surface backend, the primary framebuffer, every pixmap's
//! surface and the damage waiting to be reported to the display.

use std::collections::HashMap;
use std::sync::Arc;

use nix::errno::Errno;
use virgl_protocol::TransferBox;

use crate::backend::{HostBackend, SurfaceBackend, UsageHint};
use crate::config::AccelConfig;
use crate::damage::{clip_rects, Damage};
use crate::encoder::CommandEncoder;
use crate::error::{Error, Result};
use crate::region::{Rect, Region};
use crate::surface::{AccessMode, Surface};
use crate::transport::{DrmTransport, Transport};

/// Handle of a pixmap known to the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixmapId(pub u32);

impl PixmapId {
    /// The screen pixmap, backed by the primary surface
    pub const SCREEN: PixmapId = PixmapId(0);
}

struct Pixmap {
    surface: Surface,
    refcount: u32,
}

/// Per-device acceleration state
pub struct DeviceContext {
    config: AccelConfig,
    transport: Arc<dyn Transport>,
    backend: Box<dyn SurfaceBackend>,
    encoder: CommandEncoder,
    primary: Surface,
    pixmaps: HashMap<PixmapId, Pixmap>,
    next_id: u32,
    damage: Damage,
    /// We own the virtual terminal
    active: bool,
}

fn slot<'a>(
    primary: &'a Surface,
    pixmaps: &'a HashMap<PixmapId, Pixmap>,
    id: PixmapId,
) -> Result<&'a Surface> {
    if id == PixmapId::SCREEN {
        return Ok(primary);
    }
    pixmaps
        .get(&id)
        .map(|p| &p.surface)
        .ok_or(Error::UnknownPixmap(id))
}

fn slot_mut<'a>(
    primary: &'a mut Surface,
    pixmaps: &'a mut HashMap<PixmapId, Pixmap>,
    id: PixmapId,
) -> Result<&'a mut Surface> {
    if id == PixmapId::SCREEN {
        return Ok(primary);
    }
    pixmaps
        .get_mut(&id)
        .map(|p| &mut p.surface)
        .ok_or(Error::UnknownPixmap(id))
}

impl DeviceContext {
    /// Open the configured DRM node with a host backend
    pub fn open(config: AccelConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(DrmTransport::open(&config.device_path)?);
        let backend = Box::new(HostBackend::new(Arc::clone(&transport)));
        Self::new(config, transport, backend)
    }

    pub fn new(
        config: AccelConfig,
        transport: Arc<dyn Transport>,
        backend: Box<dyn SurfaceBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let encoder = CommandEncoder::new(Arc::clone(&transport), config.encoder_capacity)?;
        let mut primary =
            backend.create_primary(config.virtual_width, config.virtual_height, 32)?;
        primary.pixmap = Some(PixmapId::SCREEN);

        log::info!(
            "virgl: {} backend, {}x{} framebuffer, {} byte command buffer",
            backend.name(),
            config.virtual_width,
            config.virtual_height,
            config.encoder_capacity
        );

        Ok(Self {
            damage: Damage::new(config.virtual_width, config.virtual_height),
            config,
            transport,
            backend,
            encoder,
            primary,
            pixmaps: HashMap::new(),
            next_id: 1,
            active: true,
        })
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn primary(&self) -> &Surface {
        &self.primary
    }

    pub fn surface(&self, id: PixmapId) -> Option<&Surface> {
        slot(&self.primary, &self.pixmaps, id).ok()
    }

    pub fn surface_mut(&mut self, id: PixmapId) -> Option<&mut Surface> {
        slot_mut(&mut self.primary, &mut self.pixmaps, id).ok()
    }

    /// Pixmaps besides the screen
    pub fn pixmap_count(&self) -> usize {
        self.pixmaps.len()
    }

    /// Damage not yet reported
    pub fn damage(&mut self) -> &Region {
        self.damage.region()
    }

    pub fn enter_vt(&mut self) {
        log::info!("virgl: entering VT");
        self.active = true;
    }

    pub fn leave_vt(&mut self) {
        log::info!("virgl: leaving VT");
        if let Err(e) = self.encoder.flush() {
            log::warn!("virgl: flush on VT leave failed: {}", e);
        }
        self.active = false;
    }

    /// Create a pixmap with an attached surface
    ///
    /// `Ok(None)` means the pixmap should be handled without acceleration.
    pub fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        usage: UsageHint,
    ) -> Result<Option<PixmapId>> {
        let max = self.config.max_pixmap_dimension;
        if width > max || height > max {
            return Err(Error::PixmapTooLarge { width, height, max });
        }

        if !self.active
            || (depth == 8 && !self.config.a8_surfaces)
            || width == 0
            || height == 0
        {
            return Ok(None);
        }

        let mut surface = match self.backend.create_surface(width, height, depth, usage) {
            Ok(surface) => surface,
            Err(e) => {
                log::debug!("virgl: {}x{}x{} pixmap unaccelerated: {}", width, height, depth, e);
                return Ok(None);
            }
        };

        let id = PixmapId(self.next_id);
        self.next_id += 1;
        surface.pixmap = Some(id);
        self.pixmaps.insert(
            id,
            Pixmap {
                surface,
                refcount: 1,
            },
        );
        Ok(Some(id))
    }

    /// Drop a pixmap reference, destroying the surface with the last one
    ///
    /// Returns whether the surface was destroyed. The screen pixmap lives
    /// as long as the context.
    pub fn destroy_pixmap(&mut self, id: PixmapId) -> Result<bool> {
        if id == PixmapId::SCREEN {
            return Ok(false);
        }

        let pixmap = self.pixmaps.get_mut(&id).ok_or(Error::UnknownPixmap(id))?;
        pixmap.refcount -= 1;
        if pixmap.refcount > 0 {
            return Ok(false);
        }

        let Some(pixmap) = self.pixmaps.remove(&id) else {
            return Ok(false);
        };
        for other in self.pixmaps.values_mut() {
            if other.surface.copy_source == Some(id) {
                other.surface.copy_source = None;
            }
        }
        if self.primary.copy_source == Some(id) {
            self.primary.copy_source = None;
        }

        self.backend.destroy_surface(pixmap.surface);
        Ok(true)
    }

    /// Take another reference on a pixmap
    pub fn reference_pixmap(&mut self, id: PixmapId) -> Result<()> {
        if id == PixmapId::SCREEN {
            return Ok(());
        }
        let pixmap = self.pixmaps.get_mut(&id).ok_or(Error::UnknownPixmap(id))?;
        pixmap.refcount += 1;
        Ok(())
    }

    pub fn prepare_access(&mut self, id: PixmapId, region: &Region, mode: AccessMode) -> Result<()> {
        if !self.active {
            return Err(Error::Inactive);
        }
        slot_mut(&mut self.primary, &mut self.pixmaps, id)?.prepare_access(region, mode)
    }

    /// End CPU access; writes to the screen are recorded as damage
    pub fn finish_access(&mut self, id: PixmapId) -> Result<()> {
        let surface = slot_mut(&mut self.primary, &mut self.pixmaps, id)?;
        let written = (surface.is_primary() && surface.access_mode() == AccessMode::ReadWrite)
            .then(|| surface.access_region().clone());

        let result = surface.finish_access();
        if let Some(region) = written {
            self.damage.add_region(&region);
        }
        result
    }

    /// Whether a copy between the two pixmaps can be accelerated at all
    pub fn check_copy(&self, src: PixmapId, dst: PixmapId) -> bool {
        let (Ok(s), Ok(d)) = (
            slot(&self.primary, &self.pixmaps, src),
            slot(&self.primary, &self.pixmaps, dst),
        ) else {
            return false;
        };

        if s.format().bits_per_pixel() != d.format().bits_per_pixel() {
            log::debug!(
                "virgl: copy between {} and {} bpp not accelerated",
                s.format().bits_per_pixel(),
                d.format().bits_per_pixel()
            );
            return false;
        }
        true
    }

    /// Record `source` as the blit source for `dest`
    ///
    /// Both must be distinct and host backed.
    pub fn prepare_copy(&mut self, dest: PixmapId, source: PixmapId) -> bool {
        if dest == source {
            log::warn!("virgl: copy of {:?} onto itself refused", dest);
            return false;
        }

        let source_ok = slot(&self.primary, &self.pixmaps, source)
            .map(Surface::is_host_backed)
            .unwrap_or(false);
        if !source_ok {
            return false;
        }

        match slot_mut(&mut self.primary, &mut self.pixmaps, dest) {
            Ok(dst) if dst.is_host_backed() => {
                dst.copy_source = Some(source);
                true
            }
            _ => false,
        }
    }

    /// Encode a blit of `width`×`height` pixels from the prepared source
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &mut self,
        dest: PixmapId,
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let dst = slot(&self.primary, &self.pixmaps, dest)?;
        let source = dst.copy_source.ok_or(Error::NoCopySource)?;
        debug_assert_ne!(source, dest, "copy onto the source pixmap");
        let dst_res = dst.res_handle().ok_or(Error::NotHostBacked)?;
        let on_screen = dst.is_primary();
        let src_res = slot(&self.primary, &self.pixmaps, source)?
            .res_handle()
            .ok_or(Error::NotHostBacked)?;

        let dbox = TransferBox::new_2d(dst_x, dst_y, width, height);
        let sbox = TransferBox::new_2d(src_x, src_y, width, height);
        self.encoder.encode_blit(dst_res, src_res, &dbox, &sbox)?;

        if on_screen {
            self.damage
                .add(Rect::from_unsigned(dst_x, dst_y, width, height));
        }
        Ok(())
    }

    /// End a batch of copies and submit them
    pub fn done_copy(&mut self, dest: PixmapId) -> Result<()> {
        if let Ok(dst) = slot_mut(&mut self.primary, &mut self.pixmaps, dest) {
            dst.copy_source = None;
        }
        self.encoder.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.encoder.flush()
    }

    /// Record damage on the screen
    pub fn damage_primary(&mut self, rect: Rect) {
        self.damage.add(rect);
    }

    /// Once-per-iteration housekeeping
    ///
    /// Submits pending commands, then reports screen damage to the display.
    /// Damage is dropped whether or not the report succeeds.
    pub fn block_handler(&mut self) -> Result<()> {
        let flushed = self.encoder.flush();

        let damage = self.damage.take();
        let fb_id = self.config.framebuffer_id;
        if fb_id != 0 && !damage.is_empty() {
            let clips = clip_rects(&damage);
            match self.transport.dirty_fb(fb_id, &clips) {
                Ok(()) => log::trace!("virgl: {} dirty rects on fb {}", clips.len(), fb_id),
                Err(Error::Transport {
                    source: Errno::EINVAL,
                    ..
                }) => log::warn!("virgl: dirty framebuffer updates not supported"),
                Err(e) => log::error!("virgl: dirty framebuffer update failed: {}", e),
            }
        }

        flushed
    }

    /// Give a guest-memory pixmap a host resource
    pub fn migrate_to_host(&mut self, id: PixmapId) -> Result<()> {
        let surface = slot_mut(&mut self.primary, &mut self.pixmaps, id)?;
        self.backend.migrate(surface)
    }

    /// Global name of a pixmap's buffer object
    pub fn export_name(&self, id: PixmapId) -> Result<u32> {
        slot(&self.primary, &self.pixmaps, id)?
            .bo()
            .ok_or(Error::NotHostBacked)?
            .kernel_name()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(e) = self.encoder.flush() {
            log::warn!("virgl: final flush failed: {}", e);
        }
    }
}
