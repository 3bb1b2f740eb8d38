//! Buffer object handle table
//!
//! A buffer object pairs the guest kernel's GEM handle with the host's
//! resource handle. Objects are shared through [`BoRef`]; the last
//! reference unmaps the CPU view and closes the GEM handle.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use spin::Mutex;
use virgl_protocol::{BindFlags, PipeFormat, PipeTarget, TransferBox};

use crate::error::{Error, Result};
use crate::transport::{MappedRegion, ResourceCreateArgs, TransferArgs, Transport};

/// Shared handle to a buffer object
pub type BoRef = Arc<BufferObject>;

/// Host resource with a guest-visible backing
pub struct BufferObject {
    /// GEM handle
    kernel_handle: u32,
    /// Host resource handle
    res_handle: u32,
    /// Backing size in bytes
    size: usize,
    /// Row pitch in bytes
    stride: u32,
    format: PipeFormat,
    width: u32,
    height: u32,
    mapping: Mutex<Option<MappedRegion>>,
    kernel_name: Mutex<Option<u32>>,
    transport: Arc<dyn Transport>,
}

impl BufferObject {
    pub fn kernel_handle(&self) -> u32 {
        self.kernel_handle
    }

    pub fn res_handle(&self) -> u32 {
        self.res_handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PipeFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.lock().is_some()
    }

    /// Number of live references
    pub fn refcount(this: &BoRef) -> usize {
        Arc::strong_count(this)
    }

    /// Map the backing into the address space
    ///
    /// Repeated calls return the established mapping without contacting
    /// the host again.
    pub fn map(&self) -> Result<core::ptr::NonNull<u8>> {
        let mut mapping = self.mapping.lock();
        if let Some(region) = mapping.as_ref() {
            return Ok(region.as_ptr());
        }

        let offset = self.transport.map(self.kernel_handle).map_err(|e| {
            log::error!("virgl: map of bo {} failed: {}", self.kernel_handle, e);
            e
        })?;
        let region = self.transport.mmap(offset, self.size).map_err(|e| {
            log::error!("virgl: mmap of bo {} failed: {}", self.kernel_handle, e);
            e
        })?;

        let ptr = region.as_ptr();
        *mapping = Some(region);
        Ok(ptr)
    }

    /// Address of the established mapping
    pub fn mapped_ptr(&self) -> Option<core::ptr::NonNull<u8>> {
        self.mapping.lock().as_ref().map(MappedRegion::as_ptr)
    }

    /// Release a CPU view
    ///
    /// The mapping stays alive until the object is destroyed, so this only
    /// marks the end of a use.
    pub fn unmap(&self) {}

    /// Global name other clients can open, interned on first use
    pub fn kernel_name(&self) -> Result<u32> {
        let mut name = self.kernel_name.lock();
        if let Some(name) = *name {
            return Ok(name);
        }

        let flink = self.transport.flink(self.kernel_handle).map_err(|e| {
            log::error!("virgl: flink of bo {} failed: {}", self.kernel_handle, e);
            e
        })?;
        *name = Some(flink);
        Ok(flink)
    }

    /// Upload `box_` from the guest backing to the host resource
    pub fn transfer_put(&self, box_: TransferBox, offset: u32) -> Result<()> {
        let args = self.transfer_args(box_, offset);
        self.transport.transfer_put(self.kernel_handle, &args)
    }

    /// Download `box_` into the guest backing and wait for it to land
    pub fn transfer_get(&self, box_: TransferBox, offset: u32) -> Result<()> {
        let args = self.transfer_args(box_, offset);
        self.transport.transfer_get(self.kernel_handle, &args)?;
        self.transport.wait(self.kernel_handle)
    }

    /// Block until the host is done with this object
    pub fn wait(&self) -> Result<()> {
        self.transport.wait(self.kernel_handle)
    }

    fn transfer_args(&self, box_: TransferBox, offset: u32) -> TransferArgs {
        TransferArgs {
            box_,
            level: 0,
            offset,
            stride: self.stride,
        }
    }
}

impl core::fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferObject")
            .field("kernel_handle", &self.kernel_handle)
            .field("res_handle", &self.res_handle)
            .field("size", &self.size)
            .field("stride", &self.stride)
            .finish()
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        if let Some(region) = self.mapping.get_mut().take() {
            self.transport.munmap(region);
        }
        if let Err(e) = self.transport.gem_close(self.kernel_handle) {
            log::error!("virgl: closing bo {} failed: {}", self.kernel_handle, e);
        }
        log::trace!("virgl: destroyed bo {}", self.kernel_handle);
    }
}

/// Row pitch for `width` pixels of `cpp` bytes, padded to 4 bytes
pub(crate) fn row_stride(width: u32, cpp: u32) -> Option<u32> {
    width.checked_mul(cpp)?.checked_add(3).map(|s| s & !3)
}

/// Allocates buffer objects and keeps a table of the live ones
pub struct BoManager {
    transport: Arc<dyn Transport>,
    objects: Mutex<HashMap<u32, Weak<BufferObject>>>,
}

impl BoManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Create a host resource and the object that tracks it
    ///
    /// On failure nothing is left behind.
    pub fn allocate(
        &self,
        target: PipeTarget,
        format: PipeFormat,
        bind: BindFlags,
        width: u32,
        height: u32,
    ) -> Result<BoRef> {
        let invalid = || Error::InvalidDimensions { width, height };
        if width == 0 || height == 0 {
            return Err(invalid());
        }

        let cpp = format.bytes_per_pixel().ok_or_else(invalid)?;
        let stride = row_stride(width, cpp).ok_or_else(invalid)?;
        let size = stride.checked_mul(height).ok_or_else(invalid)?;

        let args = ResourceCreateArgs {
            target,
            format,
            bind,
            width,
            height,
            size,
            stride,
        };
        let created = self.transport.resource_create(&args).map_err(|e| {
            log::error!("virgl: resource create {}x{} {:?} failed: {}", width, height, format, e);
            e
        })?;

        let bo = Arc::new(BufferObject {
            kernel_handle: created.kernel_handle,
            res_handle: created.res_handle,
            size: size as usize,
            stride,
            format,
            width,
            height,
            mapping: Mutex::new(None),
            kernel_name: Mutex::new(None),
            transport: Arc::clone(&self.transport),
        });

        let mut objects = self.objects.lock();
        objects.retain(|_, weak| weak.strong_count() > 0);
        objects.insert(bo.kernel_handle, Arc::downgrade(&bo));

        log::debug!(
            "virgl: bo {} (res {}) {}x{} {:?} stride {}",
            bo.kernel_handle,
            bo.res_handle,
            width,
            height,
            format,
            stride
        );
        Ok(bo)
    }

    /// Take another reference
    pub fn incref(bo: &BoRef) -> BoRef {
        Arc::clone(bo)
    }

    /// Drop a reference, returning whether it was the last one
    pub fn decref(bo: BoRef) -> bool {
        Arc::into_inner(bo).map(drop).is_some()
    }

    /// Look up a live object by GEM handle
    pub fn get(&self, kernel_handle: u32) -> Option<BoRef> {
        self.objects.lock().get(&kernel_handle)?.upgrade()
    }

    /// Number of objects still referenced
    pub fn live_count(&self) -> usize {
        self.objects
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
