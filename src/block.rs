use bitfield::bitfield;
use bytemuck::{Pod, Zeroable};

use crate::header::{BLOCK_HEADER_SIZE, BLOCK_SIZE, KEY_SLOT_PREFIX};

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags(u32);
    impl Debug;
    pub in_use, set_in_use: 0;
    pub class_bit, set_class_bit: 1;
    pub leaf_bit, set_leaf_bit: 2;
    pub high_water, set_high_water: 31, 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    Index,
    Value,
}

/// On-disk block header, the first 32 bytes of every 8192-byte block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockHeaderRaw {
    pub self_offset: u64,
    pub num: u64,
    pub free_next: u64,
    pub flags: u32,
    pub _reserved: u32,
}

/// One in-memory copy of an on-disk block: header plus body, read and
/// written as a unit.
#[derive(Clone)]
pub struct Block {
    pub bytes: Box<[u8; BLOCK_SIZE]>,
}

impl Block {
    pub fn zeroed() -> Self {
        Block {
            bytes: Box::new([0u8; BLOCK_SIZE]),
        }
    }

    fn header(&self) -> BlockHeaderRaw {
        bytemuck::pod_read_unaligned(&self.bytes[0..BLOCK_HEADER_SIZE])
    }

    fn set_header(&mut self, h: BlockHeaderRaw) {
        self.bytes[0..BLOCK_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&h));
    }

    pub fn self_offset(&self) -> u64 {
        self.header().self_offset
    }

    pub fn set_self_offset(&mut self, v: u64) {
        let mut h = self.header();
        h.self_offset = v;
        self.set_header(h);
    }

    pub fn num(&self) -> u64 {
        self.header().num
    }

    pub fn set_num(&mut self, v: u64) {
        let mut h = self.header();
        h.num = v;
        self.set_header(h);
    }

    pub fn free_next(&self) -> u64 {
        self.header().free_next
    }

    pub fn set_free_next(&mut self, v: u64) {
        let mut h = self.header();
        h.free_next = v;
        self.set_header(h);
    }

    pub fn flags(&self) -> BlockFlags {
        BlockFlags(self.header().flags)
    }

    pub fn set_flags(&mut self, f: BlockFlags) {
        let mut h = self.header();
        h.flags = f.0;
        self.set_header(h);
    }

    pub fn in_use(&self) -> bool {
        self.flags().in_use()
    }

    pub fn leaf(&self) -> bool {
        self.flags().leaf_bit()
    }

    pub fn set_leaf(&mut self, leaf: bool) {
        let mut f = self.flags();
        f.set_leaf_bit(leaf);
        self.set_flags(f);
    }

    pub fn class(&self) -> BlockClass {
        if self.flags().class_bit() {
            BlockClass::Value
        } else {
            BlockClass::Index
        }
    }

    pub fn high_water(&self) -> u32 {
        self.flags().high_water()
    }

    pub fn set_high_water(&mut self, v: u32) {
        let mut f = self.flags();
        f.set_high_water(v);
        self.set_flags(f);
    }

    /// Initializes an in-use block of the given class at `offset`. Index
    /// blocks start empty leaves (callers flip `leaf` off once they gain a
    /// child); value blocks start with an empty high-water mark.
    pub fn init(offset: u64, class: BlockClass, leaf: bool) -> Self {
        let mut b = Block::zeroed();
        b.set_self_offset(offset);
        b.set_num(0);
        b.set_free_next(0);
        let mut f = BlockFlags(0);
        f.set_in_use(true);
        f.set_class_bit(matches!(class, BlockClass::Value));
        f.set_leaf_bit(leaf);
        f.set_high_water(BLOCK_HEADER_SIZE as u32);
        b.set_flags(f);
        b
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[BLOCK_HEADER_SIZE..]
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[BLOCK_HEADER_SIZE..]
    }

    /// Borrows the key slot at index `i` (prefix + key bytes, `stride` wide).
    pub fn key_slot(&self, i: usize, stride: usize) -> KeySlotView<'_> {
        let start = BLOCK_HEADER_SIZE + i * stride;
        KeySlotView {
            bytes: &self.bytes[start..start + stride],
        }
    }

    pub fn key_slot_mut(&mut self, i: usize, stride: usize) -> KeySlotViewMut<'_> {
        let start = BLOCK_HEADER_SIZE + i * stride;
        KeySlotViewMut {
            bytes: &mut self.bytes[start..start + stride],
        }
    }

    /// Shifts `count + 1` whole key slots (the extra one carries the
    /// trailing child pointer of an internal node) from slot `src` to slot
    /// `dst` within this block. Tolerant of overlapping ranges.
    pub fn shift_key_slots(&mut self, dst: usize, src: usize, count: usize, stride: usize) {
        if count == 0 {
            return;
        }
        let len = (count + 1) * stride;
        let src_start = BLOCK_HEADER_SIZE + src * stride;
        let dst_start = BLOCK_HEADER_SIZE + dst * stride;
        self.bytes.copy_within(src_start..src_start + len, dst_start);
    }
}

/// Copies `count` key slots from `src[src_i..]` into `dst[dst_i..]` across
/// two distinct blocks (no overlap possible, so a plain slice copy suffices).
pub fn copy_key_slots_between(
    dst: &mut Block,
    dst_i: usize,
    src: &Block,
    src_i: usize,
    count: usize,
    stride: usize,
) {
    if count == 0 {
        return;
    }
    let len = count * stride;
    let src_start = BLOCK_HEADER_SIZE + src_i * stride;
    let dst_start = BLOCK_HEADER_SIZE + dst_i * stride;
    dst.bytes[dst_start..dst_start + len]
        .copy_from_slice(&src.bytes[src_start..src_start + len]);
}

pub struct KeySlotView<'a> {
    bytes: &'a [u8],
}

impl<'a> KeySlotView<'a> {
    pub fn value_ref(&self) -> u64 {
        u64::from_le_bytes(self.bytes[0..8].try_into().unwrap())
    }

    pub fn child(&self) -> u64 {
        u64::from_le_bytes(self.bytes[8..16].try_into().unwrap())
    }

    pub fn key(&self) -> &[u8] {
        &self.bytes[KEY_SLOT_PREFIX..]
    }
}

pub struct KeySlotViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> KeySlotViewMut<'a> {
    pub fn set_value_ref(&mut self, v: u64) {
        self.bytes[0..8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn set_child(&mut self, v: u64) {
        self.bytes[8..16].copy_from_slice(&v.to_le_bytes());
    }

    pub fn key_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[KEY_SLOT_PREFIX..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDE: usize = 32;

    #[test]
    fn flags_round_trip_through_bits() {
        let mut f = BlockFlags(0);
        f.set_in_use(true);
        f.set_class_bit(true);
        f.set_leaf_bit(false);
        f.set_high_water(1234);
        assert!(f.in_use());
        assert!(f.class_bit());
        assert!(!f.leaf_bit());
        assert_eq!(f.high_water(), 1234);
    }

    #[test]
    fn init_sets_class_and_leaf_and_high_water() {
        let b = Block::init(ROOT_OFFSET_FOR_TEST, BlockClass::Value, true);
        assert_eq!(b.self_offset(), ROOT_OFFSET_FOR_TEST);
        assert_eq!(b.num(), 0);
        assert!(b.in_use());
        assert!(b.leaf());
        assert_eq!(b.class(), BlockClass::Value);
        assert_eq!(b.high_water() as usize, BLOCK_HEADER_SIZE);
    }

    const ROOT_OFFSET_FOR_TEST: u64 = 4096;

    #[test]
    fn key_slot_write_then_read_round_trips() {
        let mut b = Block::zeroed();
        {
            let mut s = b.key_slot_mut(0, STRIDE);
            s.set_value_ref(42);
            s.set_child(7);
            s.key_mut()[..3].copy_from_slice(b"abc");
        }
        let s = b.key_slot(0, STRIDE);
        assert_eq!(s.value_ref(), 42);
        assert_eq!(s.child(), 7);
        assert_eq!(&s.key()[..3], b"abc");
    }

    #[test]
    fn shift_key_slots_moves_overlapping_ranges_correctly() {
        let mut b = Block::zeroed();
        for i in 0..3 {
            let mut s = b.key_slot_mut(i, STRIDE);
            s.set_value_ref(i as u64);
        }
        b.shift_key_slots(1, 0, 2, STRIDE);
        assert_eq!(b.key_slot(1, STRIDE).value_ref(), 0);
        assert_eq!(b.key_slot(2, STRIDE).value_ref(), 1);
        assert_eq!(b.key_slot(3, STRIDE).value_ref(), 2);
    }

    #[test]
    fn copy_key_slots_between_distinct_blocks() {
        let mut src = Block::zeroed();
        src.key_slot_mut(0, STRIDE).set_value_ref(99);
        src.key_slot_mut(1, STRIDE).set_value_ref(100);
        let mut dst = Block::zeroed();
        copy_key_slots_between(&mut dst, 2, &src, 0, 2, STRIDE);
        assert_eq!(dst.key_slot(2, STRIDE).value_ref(), 99);
        assert_eq!(dst.key_slot(3, STRIDE).value_ref(), 100);
    }
}
