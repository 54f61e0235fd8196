use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};

pub const HEADER_REGION_SIZE: usize = 4096;
pub const BLOCK_SIZE: usize = 8192;
pub const ROOT_OFFSET: u64 = HEADER_REGION_SIZE as u64;

pub const BLOCK_HEADER_SIZE: usize = core::mem::size_of::<crate::block::BlockHeaderRaw>();
pub const KEY_SLOT_PREFIX: usize = 16;
pub const VALUE_FRAME_PREFIX: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    String,
    Bytes,
    Int32,
    Int64,
}

impl Default for KeyKind {
    fn default() -> Self {
        KeyKind::String
    }
}

impl KeyKind {
    pub fn to_u32(self) -> u32 {
        match self {
            KeyKind::String => 0,
            KeyKind::Bytes => 1,
            KeyKind::Int32 => 2,
            KeyKind::Int64 => 3,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            0 => Ok(KeyKind::String),
            1 => Ok(KeyKind::Bytes),
            2 => Ok(KeyKind::Int32),
            3 => Ok(KeyKind::Int64),
            _ => Err(Error::Corruption("unrecognized key kind in header")),
        }
    }
}

/// On-disk header, persisted verbatim into the first 4096-byte region.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Header {
    pub key_kind: u32,
    pub key_size: u32,
    pub key_slot_stride: u32,
    pub m: u32,
    pub key_total: u64,
    pub key_block_count: u64,
    pub value_block_count: u64,
    pub free_head: u64,
    pub current_value_block: u64,
}

/// Rounds `n` up to the next multiple of `align` (`align` must be a power of two).
pub fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Byte stride of one key slot: a fixed prefix plus the key body, 16-byte aligned.
pub fn compute_stride(key_size: u32) -> u32 {
    align_up(KEY_SLOT_PREFIX + key_size as usize, 16) as u32
}

/// Maximum live keys per node the chosen stride allows, derived the same way
/// as the original implementation: as many slots as fit after the header,
/// minus one (the node always keeps one spare slot free during a descent).
pub fn compute_m(stride: u32) -> u32 {
    (((BLOCK_SIZE - BLOCK_HEADER_SIZE) / stride as usize) as u32).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn stride_includes_prefix_and_rounds_to_16() {
        assert_eq!(compute_stride(4), 32);
        assert_eq!(compute_stride(16), 32);
        assert_eq!(compute_stride(17), 48);
    }

    #[test]
    fn m_leaves_room_for_a_usable_branching_factor() {
        let stride = compute_stride(16);
        let m = compute_m(stride);
        assert!(m >= 3);
    }

    #[test]
    fn key_kind_round_trips_through_u32() {
        for kind in [KeyKind::String, KeyKind::Bytes, KeyKind::Int32, KeyKind::Int64] {
            assert_eq!(KeyKind::from_u32(kind.to_u32()).unwrap(), kind);
        }
    }
}
