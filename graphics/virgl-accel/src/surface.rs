//! Surfaces and CPU access tracking
//!
//! A host-backed surface keeps its pixels in a buffer object shared with the
//! host renderer. CPU access is bracketed by [`Surface::prepare_access`] and
//! [`Surface::finish_access`]: prepare downloads only the parts of the
//! requested region not already fetched during the current cycle, finish
//! uploads everything touched if any access in the cycle was read-write.
//!
//! ```text
//!   prepare(R1, RO) ──► get(R1)
//!   prepare(R2, RW) ──► get(R2 − R1)        cycle tainted RW
//!   finish()        ──► put(R1 ∪ R2)        region reset
//! ```
//!
//! Regions with [`TRANSFER_FANOUT_LIMIT`] or more rectangles are moved as a
//! single bounding box.

use virgl_protocol::{PipeFormat, TransferBox};

use crate::bo::{row_stride, BoRef};
use crate::context::PixmapId;
use crate::error::{Error, Result};
use crate::region::{Rect, Region};

/// Rectangle count from which a region is transferred as its bounding box
pub const TRANSFER_FANOUT_LIMIT: usize = 25;

/// Kind of CPU access requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// CPU-side pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    A8,
    R5G6B5,
    X8R8G8B8,
    A8R8G8B8,
}

impl PixelFormat {
    pub fn from_bpp(bpp: u32) -> Result<Self> {
        match bpp {
            8 => Ok(PixelFormat::A8),
            16 => Ok(PixelFormat::R5G6B5),
            24 => Ok(PixelFormat::X8R8G8B8),
            32 => Ok(PixelFormat::A8R8G8B8),
            _ => Err(Error::UnsupportedDepth(bpp)),
        }
    }

    /// Matching host resource format
    pub fn host_format(self) -> PipeFormat {
        match self {
            PixelFormat::A8 => PipeFormat::A8Unorm,
            PixelFormat::R5G6B5 => PipeFormat::B5G6R5Unorm,
            PixelFormat::X8R8G8B8 => PipeFormat::B8G8R8X8Unorm,
            PixelFormat::A8R8G8B8 => PipeFormat::B8G8R8A8Unorm,
        }
    }

    /// Significant bits per pixel
    pub fn depth(self) -> u32 {
        match self {
            PixelFormat::A8 => 8,
            PixelFormat::R5G6B5 => 16,
            PixelFormat::X8R8G8B8 => 24,
            PixelFormat::A8R8G8B8 => 32,
        }
    }

    /// Storage bits per pixel
    pub fn bits_per_pixel(self) -> u32 {
        self.bytes_per_pixel() * 8
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::A8 => 1,
            PixelFormat::R5G6B5 => 2,
            PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8 => 4,
        }
    }
}

/// Validated surface geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Row pitch in bytes, a multiple of 4
    pub stride: u32,
}

impl SurfaceDesc {
    pub fn new(width: u32, height: u32, bpp: u32) -> Result<Self> {
        let format = PixelFormat::from_bpp(bpp)?;
        let invalid = || Error::InvalidDimensions { width, height };
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(invalid());
        }

        let stride = row_stride(width, format.bytes_per_pixel()).ok_or_else(invalid)?;
        stride.checked_mul(height).ok_or_else(invalid)?;

        Ok(Self {
            width,
            height,
            format,
            stride,
        })
    }

    /// Bytes covered by all rows
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(0, 0, self.width, self.height)
    }
}

/// Rectangles to transfer for `region`
///
/// Small regions go rectangle by rectangle, large ones as one bounding box.
pub fn transfer_rects(region: &Region) -> Vec<Rect> {
    if region.is_empty() {
        Vec::new()
    } else if region.len() < TRANSFER_FANOUT_LIMIT {
        region.rects().to_vec()
    } else {
        vec![region.extents()]
    }
}

/// A pixmap's storage, optionally resident on the host
pub struct Surface {
    desc: SurfaceDesc,
    /// CPU pixels; empty once a buffer object holds them
    pixels: Vec<u8>,
    bo: Option<BoRef>,
    access_mode: AccessMode,
    /// Area synchronised since the last finish
    access_region: Region,
    /// CPU view of a host-backed surface is published
    bound: bool,
    primary: bool,
    pub(crate) pixmap: Option<PixmapId>,
    pub(crate) copy_source: Option<PixmapId>,
}

impl Surface {
    pub(crate) fn cpu(desc: SurfaceDesc) -> Self {
        Self {
            pixels: vec![0; desc.byte_len()],
            ..Self::empty(desc, None)
        }
    }

    pub(crate) fn host(desc: SurfaceDesc, bo: BoRef) -> Self {
        Self::empty(desc, Some(bo))
    }

    pub(crate) fn primary(desc: SurfaceDesc, bo: BoRef) -> Self {
        Self {
            primary: true,
            ..Self::empty(desc, Some(bo))
        }
    }

    fn empty(desc: SurfaceDesc, bo: Option<BoRef>) -> Self {
        Self {
            desc,
            pixels: Vec::new(),
            bo,
            access_mode: AccessMode::ReadOnly,
            access_region: Region::new(),
            bound: false,
            primary: false,
            pixmap: None,
            copy_source: None,
        }
    }

    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn stride(&self) -> u32 {
        self.desc.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_host_backed(&self) -> bool {
        self.bo.is_some()
    }

    pub fn bo(&self) -> Option<&BoRef> {
        self.bo.as_ref()
    }

    /// Host resource handle, if host backed
    pub fn res_handle(&self) -> Option<u32> {
        self.bo.as_ref().map(|bo| bo.res_handle())
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn access_region(&self) -> &Region {
        &self.access_region
    }

    pub fn pixmap(&self) -> Option<PixmapId> {
        self.pixmap
    }

    pub fn copy_source(&self) -> Option<PixmapId> {
        self.copy_source
    }

    /// Make `region` of the surface coherent for CPU access
    ///
    /// Only the part of `region` outside the current access region is
    /// downloaded. A read-write request marks the whole cycle read-write.
    /// On a failed download the access region and mode are left as they
    /// were.
    pub fn prepare_access(&mut self, region: &Region, mode: AccessMode) -> Result<()> {
        let Some(bo) = self.bo.as_ref() else {
            return Ok(());
        };

        bo.map()?;

        let missing = region
            .clip(self.desc.bounds())
            .subtract(&self.access_region);

        for rect in transfer_rects(&missing) {
            let (box_, offset) = self.transfer_box(&rect);
            bo.transfer_get(box_, offset).map_err(|e| {
                log::error!("virgl: download of {:?} from bo {} failed: {}", rect, bo.kernel_handle(), e);
                e
            })?;
        }

        if mode == AccessMode::ReadWrite {
            self.access_mode = AccessMode::ReadWrite;
        }
        if !missing.is_empty() {
            self.access_region = self.access_region.union(&missing);
        }
        self.bound = true;
        Ok(())
    }

    /// End the access cycle, uploading what was touched if it was writable
    ///
    /// The access region is reset even when an upload fails; the first
    /// failure is returned.
    pub fn finish_access(&mut self) -> Result<()> {
        let Some(bo) = self.bo.as_ref() else {
            return Ok(());
        };

        let mut result = Ok(());
        if self.access_mode == AccessMode::ReadWrite {
            for rect in transfer_rects(&self.access_region) {
                let (box_, offset) = self.transfer_box(&rect);
                if let Err(e) = bo.transfer_put(box_, offset) {
                    log::error!("virgl: upload of {:?} to bo {} failed: {}", rect, bo.kernel_handle(), e);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        bo.unmap();

        self.access_region.clear();
        self.access_mode = AccessMode::ReadOnly;
        self.bound = false;
        result
    }

    /// Pixels visible to the CPU
    ///
    /// A host-backed surface only exposes its pixels between prepare and
    /// finish.
    pub fn pixels(&self) -> Option<&[u8]> {
        match self.bo.as_ref() {
            None => Some(self.pixels.as_slice()),
            Some(bo) if self.bound => {
                let ptr = bo.mapped_ptr()?;
                // The mapping lives as long as `bo`, which we hold.
                Some(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), self.desc.byte_len()) })
            }
            Some(_) => None,
        }
    }

    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        match self.bo.as_ref() {
            None => Some(self.pixels.as_mut_slice()),
            Some(bo) if self.bound => {
                let ptr = bo.mapped_ptr()?;
                Some(unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), self.desc.byte_len()) })
            }
            Some(_) => None,
        }
    }

    /// Move CPU pixels into `bo` and upload them
    ///
    /// On failure the surface keeps its CPU pixels and `bo` is released.
    pub(crate) fn attach_bo(&mut self, bo: BoRef) -> Result<()> {
        if self.bo.is_some() {
            return Ok(());
        }

        let len = self.desc.byte_len();
        if bo.size() < len {
            return Err(Error::InvalidDimensions {
                width: self.desc.width,
                height: self.desc.height,
            });
        }

        let ptr = bo.map()?;
        let mapping = unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), len) };
        mapping.copy_from_slice(&self.pixels);

        let (box_, offset) = self.transfer_box(&self.desc.bounds());
        bo.transfer_put(box_, offset).map_err(|e| {
            log::error!("virgl: initial upload to bo {} failed: {}", bo.kernel_handle(), e);
            e
        })?;

        self.pixels = Vec::new();
        self.bo = Some(bo);
        Ok(())
    }

    /// Box and byte offset of `rect` inside the linear backing
    fn transfer_box(&self, rect: &Rect) -> (TransferBox, u32) {
        let x = rect.x1.max(0) as u32;
        let y = rect.y1.max(0) as u32;
        let offset = y * self.desc.stride + x * self.desc.format.bytes_per_pixel();
        (TransferBox::new_2d(x, y, rect.width(), rect.height()), offset)
    }
}

impl core::fmt::Debug for Surface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Surface")
            .field("desc", &self.desc)
            .field("bo", &self.bo)
            .field("access_mode", &self.access_mode)
            .field("access_region", &self.access_region)
            .field("primary", &self.primary)
            .finish()
    }
}
