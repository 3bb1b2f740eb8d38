//! Command stream vocabulary
//!
//! A command is one header word followed by exactly `length` payload words.
//! All words are little-endian `u32`s.
//!
//! ```text
//!  31            16 15      8 7       0
//! ┌────────────────┬─────────┬─────────┐
//! │     length     │ object  │ opcode  │
//! └────────────────┴─────────┴─────────┘
//! ```

/// Command opcodes understood by the host renderer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    CreateObject = 1,
    BindObject = 2,
    DestroyObject = 3,
    SetViewportState = 4,
    SetFramebufferState = 5,
    SetVertexBuffers = 6,
    Clear = 7,
    DrawVbo = 8,
    SetSamplerViews = 9,
    SetIndexBuffer = 10,
    SetConstantBuffer = 11,
    SetStencilRef = 12,
    SetBlendColor = 13,
    SetScissorState = 14,
    Blit = 15,
    ResourceCopyRegion = 16,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;

        Some(match value {
            0 => Nop,
            1 => CreateObject,
            2 => BindObject,
            3 => DestroyObject,
            4 => SetViewportState,
            5 => SetFramebufferState,
            6 => SetVertexBuffers,
            7 => Clear,
            8 => DrawVbo,
            9 => SetSamplerViews,
            10 => SetIndexBuffer,
            11 => SetConstantBuffer,
            12 => SetStencilRef,
            13 => SetBlendColor,
            14 => SetScissorState,
            15 => Blit,
            16 => ResourceCopyRegion,
            _ => return None,
        })
    }
}

/// Payload words of a resource-copy-region record
pub const RESOURCE_COPY_REGION_LENGTH: u16 = 13;

/// Payload words of a blit record
pub const BLIT_LENGTH: u16 = 23;

/// Blit mask selecting all four colour channels
pub const BLIT_MASK_RGBA: u32 = 0xf;

/// Packed command header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    pub opcode: Opcode,
    pub object: u8,
    /// Payload words following the header, not counting the header itself
    pub length: u16,
}

impl CommandHeader {
    pub const fn new(opcode: Opcode, object: u8, length: u16) -> Self {
        Self {
            opcode,
            object,
            length,
        }
    }

    pub const fn encode(&self) -> u32 {
        (self.opcode as u32) | ((self.object as u32) << 8) | ((self.length as u32) << 16)
    }

    /// Unpack a header word; `None` for opcodes outside the vocabulary
    pub fn decode(word: u32) -> Option<Self> {
        let opcode = Opcode::from_u8((word & 0xff) as u8)?;
        Some(Self {
            opcode,
            object: ((word >> 8) & 0xff) as u8,
            length: (word >> 16) as u16,
        })
    }

    /// Header plus payload, in words
    pub const fn total_words(&self) -> usize {
        self.length as usize + 1
    }
}

/// 3D region of a resource (`depth` is 1 for 2D surfaces)
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TransferBox {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub w: u32,
    pub h: u32,
    pub d: u32,
}

impl TransferBox {
    /// A single-slice box at `(x, y)`
    pub const fn new_2d(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x,
            y,
            z: 0,
            w,
            h,
            d: 1,
        }
    }

    pub const fn to_words(&self) -> [u32; 6] {
        [self.x, self.y, self.z, self.w, self.h, self.d]
    }

    pub const fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0 || self.d == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_packing() {
        let header = CommandHeader::new(Opcode::Blit, 0, BLIT_LENGTH);
        assert_eq!(header.encode(), 15 | (23 << 16));

        let header = CommandHeader::new(Opcode::ResourceCopyRegion, 3, RESOURCE_COPY_REGION_LENGTH);
        assert_eq!(header.encode(), 16 | (3 << 8) | (13 << 16));
        assert_eq!(header.total_words(), 14);
    }

    #[test]
    fn test_header_decode() {
        let word = CommandHeader::new(Opcode::Blit, 7, BLIT_LENGTH).encode();
        let header = CommandHeader::decode(word).unwrap();
        assert_eq!(header.opcode, Opcode::Blit);
        assert_eq!(header.object, 7);
        assert_eq!(header.length, 23);

        assert!(CommandHeader::decode(17).is_none());
        assert!(CommandHeader::decode(0xff).is_none());
    }

    #[test]
    fn test_opcode_space() {
        for value in 0u8..=16 {
            assert_eq!(Opcode::from_u8(value).unwrap() as u8, value);
        }
        assert_eq!(Opcode::from_u8(15), Some(Opcode::Blit));
        assert_eq!(Opcode::from_u8(16), Some(Opcode::ResourceCopyRegion));
        assert_eq!(Opcode::from_u8(17), None);
    }

    #[test]
    fn test_drawing_opcode_values() {
        assert_eq!(Opcode::Blit as u8, 15);
        assert_eq!(Opcode::ResourceCopyRegion as u8, 16);
        assert_eq!(Opcode::SetScissorState as u8, 14);
    }

    #[test]
    fn test_transfer_box() {
        let b = TransferBox::new_2d(10, 20, 64, 32);
        assert_eq!(b.to_words(), [10, 20, 0, 64, 32, 1]);
        assert!(!b.is_empty());
        assert!(TransferBox::new_2d(0, 0, 0, 5).is_empty());
    }
}
