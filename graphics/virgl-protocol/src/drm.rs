//! virtio-gpu DRM ioctl argument blocks
//!
//! Layouts match the kernel uapi (`virtgpu_drm.h`, `drm.h`, `drm_mode.h`).

use crate::command::TransferBox;

/// `'d'`, the DRM ioctl type
pub const DRM_IOCTL_BASE: u8 = b'd';

/// First driver-private ioctl number
pub const DRM_COMMAND_BASE: u8 = 0x40;

/// Core DRM ioctl numbers
pub mod nr {
    use super::DRM_COMMAND_BASE;

    pub const GEM_CLOSE: u8 = 0x09;
    pub const GEM_FLINK: u8 = 0x0a;
    pub const MODE_DIRTYFB: u8 = 0xb1;

    pub const VIRTGPU_MAP: u8 = DRM_COMMAND_BASE + 0x01;
    pub const VIRTGPU_EXECBUFFER: u8 = DRM_COMMAND_BASE + 0x02;
    pub const VIRTGPU_RESOURCE_CREATE: u8 = DRM_COMMAND_BASE + 0x04;
    pub const VIRTGPU_TRANSFER_FROM_HOST: u8 = DRM_COMMAND_BASE + 0x06;
    pub const VIRTGPU_TRANSFER_TO_HOST: u8 = DRM_COMMAND_BASE + 0x07;
    pub const VIRTGPU_WAIT: u8 = DRM_COMMAND_BASE + 0x08;
}

/// `DRM_IOCTL_VIRTGPU_MAP`: kernel handle in, mmap offset out
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct VirtgpuMap {
    pub offset: u64,
    pub handle: u32,
    pub pad: u32,
}

/// `DRM_IOCTL_VIRTGPU_EXECBUFFER`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct VirtgpuExecbuffer {
    pub flags: u32,
    /// Command stream size in bytes
    pub size: u32,
    /// User pointer to the command words
    pub command: u64,
    pub bo_handles: u64,
    pub num_bo_handles: u32,
    pub fence_fd: i32,
}

/// `DRM_IOCTL_VIRTGPU_RESOURCE_CREATE`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct VirtgpuResourceCreate {
    pub target: u32,
    pub format: u32,
    pub bind: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub last_level: u32,
    pub nr_samples: u32,
    pub flags: u32,
    /// Returned GEM handle
    pub bo_handle: u32,
    /// Returned host resource handle
    pub res_handle: u32,
    pub size: u32,
    pub stride: u32,
}

/// `DRM_IOCTL_VIRTGPU_TRANSFER_{TO,FROM}_HOST`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Virtgpu3dTransfer {
    pub bo_handle: u32,
    pub box_: TransferBox,
    pub level: u32,
    pub offset: u32,
    pub stride: u32,
    pub layer_stride: u32,
}

/// `DRM_IOCTL_VIRTGPU_WAIT`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Virtgpu3dWait {
    pub handle: u32,
    pub flags: u32,
}

/// `DRM_IOCTL_GEM_CLOSE`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct GemClose {
    pub handle: u32,
    pub pad: u32,
}

/// `DRM_IOCTL_GEM_FLINK`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct GemFlink {
    pub handle: u32,
    /// Returned global name
    pub name: u32,
}

/// One clip rectangle of a dirty-framebuffer request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ClipRect {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

/// `DRM_IOCTL_MODE_DIRTYFB`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ModeFbDirtyCmd {
    pub fb_id: u32,
    pub flags: u32,
    pub color: u32,
    pub num_clips: u32,
    /// User pointer to `num_clips` [`ClipRect`]s
    pub clips_ptr: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(VirtgpuMap, [u8; 16]);
    assert_eq_size!(VirtgpuExecbuffer, [u8; 32]);
    assert_eq_size!(VirtgpuResourceCreate, [u8; 56]);
    assert_eq_size!(Virtgpu3dTransfer, [u8; 44]);
    assert_eq_size!(Virtgpu3dWait, [u8; 8]);
    assert_eq_size!(GemClose, [u8; 8]);
    assert_eq_size!(GemFlink, [u8; 8]);
    assert_eq_size!(ClipRect, [u8; 8]);
    assert_eq_size!(ModeFbDirtyCmd, [u8; 24]);

    #[test]
    fn test_ioctl_numbers() {
        assert_eq!(nr::VIRTGPU_MAP, 0x41);
        assert_eq!(nr::VIRTGPU_RESOURCE_CREATE, 0x44);
        assert_eq!(nr::VIRTGPU_WAIT, 0x48);
    }
}
