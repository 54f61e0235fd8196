use log::warn;

use crate::block::BlockClass;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::header::{BLOCK_SIZE, HEADER_REGION_SIZE, KeyKind, compute_m, compute_stride};

impl Db {
    /// Re-derives the aggregate counters by scanning every block in the
    /// file and checks them against the header. Run automatically at the
    /// end of `open`; callable directly as well.
    pub fn verify(&mut self) -> Result<()> {
        let file_size = self.io.file_size()?;
        if file_size < (HEADER_REGION_SIZE + BLOCK_SIZE) as u64
            || (file_size - HEADER_REGION_SIZE as u64) % BLOCK_SIZE as u64 != 0
        {
            return Err(Error::Corruption("file size is not block-aligned"));
        }

        match self.key_kind {
            KeyKind::String | KeyKind::Bytes => {
                if !(4..=128).contains(&self.key_size) {
                    return Err(Error::Corruption("key size out of range for string/bytes"));
                }
            }
            KeyKind::Int32 => {
                if self.key_size != 4 {
                    return Err(Error::Corruption("int32 key size must be 4"));
                }
            }
            KeyKind::Int64 => {
                if self.key_size != 8 {
                    return Err(Error::Corruption("int64 key size must be 8"));
                }
            }
        }

        let expected_stride = compute_stride(self.key_size as u32) as usize;
        if expected_stride != self.key_slot_stride {
            return Err(Error::Corruption("key slot stride disagrees with key size"));
        }
        let expected_m = compute_m(expected_stride as u32) as usize;
        if expected_m != self.m || self.m < 3 {
            return Err(Error::Corruption("branching factor disagrees with stride"));
        }

        let mut key_total = 0u64;
        let mut value_total = 0u64;
        let mut key_block_count = 0u64;
        let mut value_block_count = 0u64;

        let mut offset = HEADER_REGION_SIZE as u64;
        while offset < file_size {
            let block = self.io.read_block(offset)?;
            if block.self_offset() != offset {
                return Err(Error::Corruption("block self-pointer mismatch"));
            }
            if block.in_use() {
                match block.class() {
                    BlockClass::Index => {
                        key_total += block.num();
                        key_block_count += 1;
                    }
                    BlockClass::Value => {
                        value_total += block.num();
                        value_block_count += 1;
                    }
                }
            }
            offset += BLOCK_SIZE as u64;
        }

        if key_total != value_total {
            warn!("verify: {key_total} live keys but {value_total} live values");
            return Err(Error::Corruption("key count and value count disagree"));
        }
        if key_total != self.header.key_total {
            warn!(
                "verify: scanned key_total {key_total} disagrees with header {}",
                self.header.key_total
            );
            return Err(Error::Corruption("key total disagrees with header"));
        }
        if key_block_count != self.header.key_block_count
            || value_block_count != self.header.value_block_count
        {
            warn!("verify: block counts disagree with header");
            return Err(Error::Corruption("block counts disagree with header"));
        }

        Ok(())
    }
}
