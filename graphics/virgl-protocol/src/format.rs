//! Gallium resource targets, formats and bind flags

use bitflags::bitflags;

/// Resource target
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum PipeTarget {
    Buffer = 0,
    Texture1d = 1,
    Texture2d = 2,
    Texture3d = 3,
    TextureCube = 4,
    TextureRect = 5,
}

/// Host-side pixel format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum PipeFormat {
    None = 0,
    B8G8R8A8Unorm = 1,
    B8G8R8X8Unorm = 2,
    A8R8G8B8Unorm = 3,
    X8R8G8B8Unorm = 4,
    B5G5R5A1Unorm = 5,
    B4G4R4A4Unorm = 6,
    B5G6R5Unorm = 7,
    L8Unorm = 9,
    A8Unorm = 10,
}

impl PipeFormat {
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PipeFormat::None => None,
            PipeFormat::L8Unorm | PipeFormat::A8Unorm => Some(1),
            PipeFormat::B5G5R5A1Unorm | PipeFormat::B4G4R4A4Unorm | PipeFormat::B5G6R5Unorm => {
                Some(2)
            }
            _ => Some(4),
        }
    }
}

bitflags! {
    /// How the host may bind a resource
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BindFlags: u32 {
        const DEPTH_STENCIL = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const SAMPLER_VIEW = 1 << 3;
        const VERTEX_BUFFER = 1 << 4;
        const INDEX_BUFFER = 1 << 5;
        const CONSTANT_BUFFER = 1 << 6;
        const DISPLAY_TARGET = 1 << 7;
        const STREAM_OUTPUT = 1 << 11;
        const CURSOR = 1 << 16;
        const CUSTOM = 1 << 17;
        const SCANOUT = 1 << 18;
        const SHARED = 1 << 20;
    }
}
