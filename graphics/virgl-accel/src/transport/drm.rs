//! virtio-gpu DRM transport

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

use nix::errno::Errno;
use nix::{ioctl_readwrite, ioctl_write_ptr};
use virgl_protocol::drm::{
    nr, ClipRect, GemClose, GemFlink, ModeFbDirtyCmd, Virtgpu3dTransfer, Virtgpu3dWait,
    VirtgpuExecbuffer, VirtgpuMap, VirtgpuResourceCreate, DRM_IOCTL_BASE,
};

use super::{CreatedResource, MappedRegion, ResourceCreateArgs, TransferArgs, Transport};
use crate::error::{Error, Result, Verb};

ioctl_readwrite!(virtgpu_map, DRM_IOCTL_BASE, nr::VIRTGPU_MAP, VirtgpuMap);
ioctl_readwrite!(virtgpu_execbuffer, DRM_IOCTL_BASE, nr::VIRTGPU_EXECBUFFER, VirtgpuExecbuffer);
ioctl_readwrite!(
    virtgpu_resource_create,
    DRM_IOCTL_BASE,
    nr::VIRTGPU_RESOURCE_CREATE,
    VirtgpuResourceCreate
);
ioctl_readwrite!(
    virtgpu_transfer_from_host,
    DRM_IOCTL_BASE,
    nr::VIRTGPU_TRANSFER_FROM_HOST,
    Virtgpu3dTransfer
);
ioctl_readwrite!(
    virtgpu_transfer_to_host,
    DRM_IOCTL_BASE,
    nr::VIRTGPU_TRANSFER_TO_HOST,
    Virtgpu3dTransfer
);
ioctl_readwrite!(virtgpu_wait, DRM_IOCTL_BASE, nr::VIRTGPU_WAIT, Virtgpu3dWait);
ioctl_write_ptr!(gem_close, DRM_IOCTL_BASE, nr::GEM_CLOSE, GemClose);
ioctl_readwrite!(gem_flink, DRM_IOCTL_BASE, nr::GEM_FLINK, GemFlink);
ioctl_readwrite!(mode_dirtyfb, DRM_IOCTL_BASE, nr::MODE_DIRTYFB, ModeFbDirtyCmd);

/// Transport over an open virtio-gpu DRM node
pub struct DrmTransport {
    file: File,
}

impl DrmTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.display().to_string(),
                source,
            })?;

        log::info!("virgl: opened {}", path.display());
        Ok(Self { file })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }

    fn fd(&self) -> libc::c_int {
        self.file.as_raw_fd()
    }

    fn transfer_args(kernel_handle: u32, args: &TransferArgs) -> Virtgpu3dTransfer {
        Virtgpu3dTransfer {
            bo_handle: kernel_handle,
            box_: args.box_,
            level: args.level,
            offset: args.offset,
            stride: args.stride,
            layer_stride: 0,
        }
    }
}

impl Transport for DrmTransport {
    fn resource_create(&self, args: &ResourceCreateArgs) -> Result<CreatedResource> {
        let mut create = VirtgpuResourceCreate {
            target: args.target as u32,
            format: args.format as u32,
            bind: args.bind.bits(),
            width: args.width,
            height: args.height,
            depth: 1,
            array_size: 1,
            size: args.size,
            stride: args.stride,
            ..Default::default()
        };

        unsafe { virtgpu_resource_create(self.fd(), &mut create) }
            .map_err(|e| Error::transport(Verb::ResourceCreate, e))?;

        Ok(CreatedResource {
            kernel_handle: create.bo_handle,
            res_handle: create.res_handle,
        })
    }

    fn map(&self, kernel_handle: u32) -> Result<u64> {
        let mut map = VirtgpuMap {
            handle: kernel_handle,
            ..Default::default()
        };

        unsafe { virtgpu_map(self.fd(), &mut map) }.map_err(|e| Error::transport(Verb::Map, e))?;
        Ok(map.offset)
    }

    fn mmap(&self, offset: u64, len: usize) -> Result<MappedRegion> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                offset as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::transport(Verb::Mmap, Errno::last()));
        }

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| Error::transport(Verb::Mmap, Errno::EFAULT))?;
        Ok(unsafe { MappedRegion::from_raw(ptr, len) })
    }

    fn munmap(&self, region: MappedRegion) {
        let ret = unsafe { libc::munmap(region.as_ptr().as_ptr().cast(), region.len()) };
        if ret != 0 {
            log::warn!("virgl: munmap failed: {}", Errno::last());
        }
    }

    fn transfer_put(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()> {
        let mut put = Self::transfer_args(kernel_handle, args);
        unsafe { virtgpu_transfer_to_host(self.fd(), &mut put) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::TransferPut, e))
    }

    fn transfer_get(&self, kernel_handle: u32, args: &TransferArgs) -> Result<()> {
        let mut get = Self::transfer_args(kernel_handle, args);
        unsafe { virtgpu_transfer_from_host(self.fd(), &mut get) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::TransferGet, e))
    }

    fn wait(&self, kernel_handle: u32) -> Result<()> {
        let mut wait = Virtgpu3dWait {
            handle: kernel_handle,
            flags: 0,
        };
        unsafe { virtgpu_wait(self.fd(), &mut wait) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::Wait, e))
    }

    fn execbuffer(&self, words: &[u32]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }

        let mut eb = VirtgpuExecbuffer {
            size: (words.len() * core::mem::size_of::<u32>()) as u32,
            command: words.as_ptr() as u64,
            fence_fd: -1,
            ..Default::default()
        };
        unsafe { virtgpu_execbuffer(self.fd(), &mut eb) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::Execbuffer, e))
    }

    fn gem_close(&self, kernel_handle: u32) -> Result<()> {
        let args = GemClose {
            handle: kernel_handle,
            pad: 0,
        };
        unsafe { gem_close(self.fd(), &args) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::GemClose, e))
    }

    fn flink(&self, kernel_handle: u32) -> Result<u32> {
        let mut flink = GemFlink {
            handle: kernel_handle,
            name: 0,
        };
        unsafe { gem_flink(self.fd(), &mut flink) }.map_err(|e| Error::transport(Verb::Flink, e))?;
        Ok(flink.name)
    }

    fn dirty_fb(&self, fb_id: u32, clips: &[ClipRect]) -> Result<()> {
        let mut cmd = ModeFbDirtyCmd {
            fb_id,
            num_clips: clips.len() as u32,
            clips_ptr: clips.as_ptr() as u64,
            ..Default::default()
        };
        unsafe { mode_dirtyfb(self.fd(), &mut cmd) }
            .map(drop)
            .map_err(|e| Error::transport(Verb::DirtyFb, e))
    }
}
