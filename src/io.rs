use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;

use crate::block::Block;
use crate::error::{Error, Result};
use crate::header::{BLOCK_SIZE, HEADER_REGION_SIZE, Header};

/// Positional access to the backing file. Every read/write is whole-header
/// or whole-block; there is no partial-block I/O anywhere in the engine.
pub struct FileIo {
    file: File,
}

impl FileIo {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(FileIo { file })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileIo { file })
    }

    pub fn file_size(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let mut buf = [0u8; HEADER_REGION_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Ok(bytemuck::pod_read_unaligned(
            &buf[0..core::mem::size_of::<Header>()],
        ))
    }

    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        let mut buf = [0u8; HEADER_REGION_SIZE];
        buf[0..core::mem::size_of::<Header>()].copy_from_slice(bytemuck::bytes_of(header));
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        trace!("wrote header region");
        Ok(())
    }

    pub fn read_block(&mut self, offset: u64) -> Result<Block> {
        let mut block = Block::zeroed();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(block.bytes.as_mut_slice())?;
        trace!("read block at {offset}");
        Ok(block)
    }

    pub fn write_block(&mut self, block: &Block) -> Result<()> {
        let offset = block.self_offset();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block.bytes.as_slice())?;
        trace!("wrote block at {offset}");
        Ok(())
    }

    /// Extends the file by one block and returns its offset. Rolls the
    /// file back to its prior length if the write comes up short, and
    /// surfaces that as out-of-space rather than a bare I/O error, so a
    /// failed grow never leaves a half-written trailing block behind.
    pub fn append_block(&mut self, block: &Block) -> Result<u64> {
        let prior_len = self.file.seek(SeekFrom::End(0))?;
        match self.file.write_all(block.bytes.as_slice()) {
            Ok(()) => {
                self.file.flush()?;
                Ok(prior_len)
            }
            Err(_) => {
                let _ = self.file.set_len(prior_len);
                Err(Error::OutOfSpace)
            }
        }
    }

    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }
}

pub fn block_offset_of(abs_offset: u64) -> u64 {
    HEADER_REGION_SIZE as u64
        + ((abs_offset - HEADER_REGION_SIZE as u64) / BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}
