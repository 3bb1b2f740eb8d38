//! Command stream encoder
//!
//! Commands are appended to a fixed buffer of 32-bit words. A command that
//! would not fit causes the pending words to be submitted first, so a
//! command is never split across two submissions.

use std::sync::Arc;

use virgl_protocol::command::BLIT_MASK_RGBA;
use virgl_protocol::{
    CommandHeader, Opcode, TransferBox, BLIT_LENGTH, RESOURCE_COPY_REGION_LENGTH,
};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default buffer size in bytes
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

const WORD_SIZE: usize = core::mem::size_of::<u32>();

/// Encoder over a fixed-size word buffer
pub struct CommandEncoder {
    buf: Box<[u32]>,
    /// Next free word
    offset: usize,
    transport: Arc<dyn Transport>,
    submissions: u64,
}

impl CommandEncoder {
    /// `capacity` is in bytes and must hold at least one blit
    pub fn new(transport: Arc<dyn Transport>, capacity: usize) -> Result<Self> {
        let min = (BLIT_LENGTH as usize + 1) * WORD_SIZE;
        if capacity % WORD_SIZE != 0 || capacity < min {
            return Err(Error::Config(format!(
                "encoder capacity {} must be a multiple of {} and at least {}",
                capacity, WORD_SIZE, min
            )));
        }

        Ok(Self {
            buf: vec![0u32; capacity / WORD_SIZE].into_boxed_slice(),
            offset: 0,
            transport,
            submissions: 0,
        })
    }

    /// Capacity in words
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Words written since the last flush
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Words written since the last flush
    pub fn pending(&self) -> &[u32] {
        &self.buf[..self.offset]
    }

    /// Number of non-empty submissions made so far
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Copy a box between two resources
    #[allow(clippy::too_many_arguments)]
    pub fn encode_resource_copy_region(
        &mut self,
        dst_res: u32,
        dst_level: u32,
        dst_x: u32,
        dst_y: u32,
        dst_z: u32,
        src_res: u32,
        src_level: u32,
        src_box: &TransferBox,
    ) -> Result<()> {
        let b = src_box.to_words();
        let payload = [
            dst_res, dst_level, dst_x, dst_y, dst_z, src_res, src_level, b[0], b[1], b[2], b[3],
            b[4], b[5],
        ];
        self.emit(
            CommandHeader::new(Opcode::ResourceCopyRegion, 0, RESOURCE_COPY_REGION_LENGTH),
            &payload,
        )
    }

    /// Blit `sbox` of `src_res` onto `dbox` of `dst_res`
    ///
    /// Full RGBA mask, no filtering, scissor or conditional rendering.
    pub fn encode_blit(
        &mut self,
        dst_res: u32,
        src_res: u32,
        dbox: &TransferBox,
        sbox: &TransferBox,
    ) -> Result<()> {
        let d = dbox.to_words();
        let s = sbox.to_words();
        let payload = [
            BLIT_MASK_RGBA,
            0, // filter
            0, // scissor enable
            0, // scissor min
            0, // scissor max
            dst_res,
            0, // dst level
            0, // dst format
            d[0],
            d[1],
            d[2],
            d[3],
            d[4],
            d[5],
            src_res,
            0, // src level
            0, // src format
            s[0],
            s[1],
            s[2],
            s[3],
            s[4],
            s[5],
        ];
        self.emit(CommandHeader::new(Opcode::Blit, 0, BLIT_LENGTH), &payload)
    }

    /// Submit pending words
    ///
    /// An empty buffer submits nothing. The buffer is emptied whether or
    /// not the submission succeeds.
    pub fn flush(&mut self) -> Result<()> {
        if self.offset == 0 {
            return Ok(());
        }

        let words = self.offset;
        let result = self.transport.execbuffer(&self.buf[..words]);
        self.offset = 0;
        self.submissions += 1;

        match result {
            Ok(()) => {
                log::trace!("virgl: submitted {} words", words);
                Ok(())
            }
            Err(e) => {
                log::error!("virgl: submitting {} words failed: {}", words, e);
                Err(e)
            }
        }
    }

    fn emit(&mut self, header: CommandHeader, payload: &[u32]) -> Result<()> {
        debug_assert_eq!(payload.len(), header.length as usize);

        let words = header.total_words();
        if words > self.buf.len() {
            return Err(Error::CommandTooLarge {
                words,
                capacity: self.buf.len(),
            });
        }
        if self.offset + words > self.buf.len() {
            self.flush()?;
        }

        self.buf[self.offset] = header.encode();
        self.buf[self.offset + 1..self.offset + words].copy_from_slice(payload);

        #[cfg(feature = "debug-logging")]
        log::trace!(
            "virgl: {:?} at word {}: {:x?}",
            header.opcode,
            self.offset,
            &self.buf[self.offset..self.offset + words]
        );

        self.offset += words;
        Ok(())
    }
}

impl Drop for CommandEncoder {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::debug!("virgl: dropping encoder with {} unsubmitted words", self.offset);
        }
    }
}
