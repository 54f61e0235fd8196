use log::debug;

use crate::block::{Block, BlockClass};
use crate::db::Db;
use crate::error::Result;

impl Db {
    /// Pops a block off the free list if one is available, otherwise grows
    /// the file by one block. Either way returns it initialized for
    /// `class`/`leaf`.
    pub(crate) fn allocate_block(&mut self, class: BlockClass, leaf: bool) -> Result<Block> {
        if self.header.free_head != 0 {
            let offset = self.header.free_head;
            let free_block = self.io.read_block(offset)?;
            self.header.free_head = free_block.free_next();
            let block = Block::init(offset, class, leaf);
            self.io.write_block(&block)?;
            self.bump_class_count(class, 1);
            self.store_header()?;
            debug!("reused free block at {offset}");
            return Ok(block);
        }

        let unwritten = Block::init(0, class, leaf);
        let offset = self.io.append_block(&unwritten)?;
        let mut block = unwritten;
        block.set_self_offset(offset);
        self.io.write_block(&block)?;
        self.bump_class_count(class, 1);
        self.store_header()?;
        debug!("grew file by one block at {offset}");
        Ok(block)
    }

    /// Pushes `block` onto the free list, head-first.
    pub(crate) fn release_block(&mut self, mut block: Block) -> Result<()> {
        let offset = block.self_offset();
        let class = block.class();
        block.set_free_next(self.header.free_head);
        let mut flags = block.flags();
        flags.set_in_use(false);
        block.set_flags(flags);
        self.io.write_block(&block)?;
        self.header.free_head = offset;
        self.bump_class_count(class, -1);
        self.store_header()?;
        debug!("released block at {offset} to the free list");
        Ok(())
    }

    fn bump_class_count(&mut self, class: BlockClass, delta: i64) {
        match class {
            BlockClass::Index => {
                self.header.key_block_count =
                    (self.header.key_block_count as i64 + delta) as u64;
            }
            BlockClass::Value => {
                self.header.value_block_count =
                    (self.header.value_block_count as i64 + delta) as u64;
            }
        }
    }
}
