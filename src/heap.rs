use log::debug;

use crate::block::BlockClass;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::header::{BLOCK_HEADER_SIZE, BLOCK_SIZE, VALUE_FRAME_PREFIX, align_up};
use crate::io::block_offset_of;

/// The frame size `data` would occupy: the fixed prefix plus the value
/// bytes, rounded up to 16-byte alignment.
pub(crate) fn frame_size(data_len: usize) -> usize {
    align_up(VALUE_FRAME_PREFIX + data_len, 16)
}

/// Checks `value` will fit in a single block's worth of value-frame space
/// before any tree mutation is attempted, matching the original's
/// unconditional too-big check ahead of any descent.
pub(crate) fn check_value_fits(value: &[u8]) -> Result<()> {
    if frame_size(value.len()) > BLOCK_SIZE - BLOCK_HEADER_SIZE {
        return Err(Error::TooBig);
    }
    Ok(())
}

impl Db {
    /// Bump-allocates a frame for `data` out of the current value block,
    /// rolling over to a freshly allocated block when it doesn't fit, and
    /// returns the frame's absolute file offset (the `value_ref` stored in
    /// the owning key slot).
    pub(crate) fn allocate_value(&mut self, data: &[u8]) -> Result<u64> {
        check_value_fits(data)?;
        let need = frame_size(data.len());

        let mut block = if self.header.current_value_block != 0 {
            self.io.read_block(self.header.current_value_block)?
        } else {
            let block = self.allocate_block(BlockClass::Value, false)?;
            self.header.current_value_block = block.self_offset();
            block
        };

        if block.high_water() as usize + need > BLOCK_SIZE {
            let block = self.allocate_block(BlockClass::Value, false)?;
            self.header.current_value_block = block.self_offset();
            return self.allocate_value(data);
        }

        let frame_start = block.high_water() as usize;
        let size = data.len() as u64;
        block.body_mut()[frame_start - BLOCK_HEADER_SIZE..frame_start - BLOCK_HEADER_SIZE + 8]
            .copy_from_slice(&size.to_le_bytes());
        block.body_mut()[frame_start - BLOCK_HEADER_SIZE + VALUE_FRAME_PREFIX
            ..frame_start - BLOCK_HEADER_SIZE + VALUE_FRAME_PREFIX + data.len()]
            .copy_from_slice(data);

        let value_ref = block.self_offset() + frame_start as u64;
        block.set_high_water((frame_start + need) as u32);
        block.set_num(block.num() + 1);
        self.io.write_block(&block)?;
        self.store_header()?;
        debug!("allocated {} byte value at {value_ref}", data.len());
        Ok(value_ref)
    }

    /// Reads the value frame at `value_ref` into a fresh `Vec`.
    pub(crate) fn read_value(&mut self, value_ref: u64) -> Result<Vec<u8>> {
        let block_offset = block_offset_of(value_ref);
        let block = self.io.read_block(block_offset)?;
        let frame_off = (value_ref - block_offset) as usize - BLOCK_HEADER_SIZE;
        let size = u64::from_le_bytes(block.body()[frame_off..frame_off + 8].try_into().unwrap())
            as usize;
        Ok(block.body()[frame_off + VALUE_FRAME_PREFIX..frame_off + VALUE_FRAME_PREFIX + size]
            .to_vec())
    }

    /// Reads just the value's size without copying its bytes, for callers
    /// that only need to check a destination buffer's capacity.
    pub(crate) fn value_size(&mut self, value_ref: u64) -> Result<usize> {
        let block_offset = block_offset_of(value_ref);
        let block = self.io.read_block(block_offset)?;
        let frame_off = (value_ref - block_offset) as usize - BLOCK_HEADER_SIZE;
        Ok(
            u64::from_le_bytes(block.body()[frame_off..frame_off + 8].try_into().unwrap())
                as usize,
        )
    }

    /// Decrements the owning value block's live count; retires the block
    /// to the free list once it hits zero.
    pub(crate) fn release_value(&mut self, value_ref: u64) -> Result<()> {
        let block_offset = block_offset_of(value_ref);
        let mut block = self.io.read_block(block_offset)?;
        block.set_num(block.num() - 1);
        if block.num() == 0 {
            if self.header.current_value_block == block_offset {
                self.header.current_value_block = 0;
                self.store_header()?;
            }
            self.release_block(block)?;
        } else {
            self.io.write_block(&block)?;
        }
        Ok(())
    }
}
