//! Host transport
//!
//! Every interaction with the host renderer is one blocking round trip
//! through a [`Transport`]. The production implementation is
//! [`DrmTransport`], which issues virtio-gpu ioctls on a DRM device node.

use core::ptr::NonNull;

use virgl_protocol::drm::ClipRect;
use virgl_protocol::{BindFlags, PipeFormat, PipeTarget, TransferBox};

use crate::error::Result;

mod drm;
#[cfg(test)]
pub(crate) mod mock;

pub use drm::DrmTransport;

/// Resource creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCreateArgs {
    pub target: PipeTarget,
    pub format: PipeFormat,
    pub bind: BindFlags,
    pub width: u32,
    pub height: u32,
    /// Backing size in bytes
    pub size: u32,
    /// Row pitch in bytes
    pub stride: u32,
}

/// Handles returned by a successful resource creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedResource {
    /// GEM handle, meaningful to the guest kernel only
    pub kernel_handle: u32,
    /// Host resource handle, used in the command stream
    pub res_handle: u32,
}

/// Parameters of one upload or download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferArgs {
    pub box_: TransferBox,
    pub level: u32,
    /// Byte offset of the box origin inside the guest backing
    pub offset: u32,
    /// Row pitch of the guest backing
    pub stride: u32,
}

/// CPU mapping of a buffer object
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared memory; synchronisation is the owner's concern.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// # Safety
    ///
    /// `ptr` must point at `len` bytes that stay valid until the region is
    /// handed back to the transport that created it.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The host round trips the acceleration core depends on
pub trait Transport: Send + Sync {
    /// Create a host resource and its guest backing
    fn resource_create(&self, args: &ResourceCreateArgs) -> Result<CreatedResource>;

    /// Ask for the mmap offset of a buffer object
    fn map(&self, kernel_handle: u32) -> Result<u64>;

    /// Establish a shared mapping at an offset returned by [`Transport::map`]
    fn mmap(&self, offset: u64, len: usize) -> Result<MappedRegion>;

    /// Tear down a mapping created by [`Transport::mmap`]
    fn munmap(&self, region: MappedRegion);

    /// Upload guest memory into the host resource (guest → host)
    fn transfer_put(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()>;

    /// Download the host resource into guest memory (host → guest)
    fn transfer_get(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()>;

    /// Block until the host consumed pending operations on the object
    fn wait(&self, kernel_handle: u32) -> Result<()>;

    /// Submit an encoded command stream
    fn execbuffer(&self, words: &[u32]) -> Result<()>;

    /// Release a buffer object handle
    fn gem_close(&self, kernel_handle: u32) -> Result<()>;

    /// Intern a global name other processes can open
    fn flink(&self, kernel_handle: u32) -> Result<u32>;

    /// Tell the display path which parts of a framebuffer changed
    fn dirty_fb(&self, fb_id: u32, clips: &[ClipRect]) -> Result<()>;
}
