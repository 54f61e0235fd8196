use std::path::Path;

use smart_default::SmartDefault;

use crate::block::{Block, BlockClass};
use crate::error::{Error, Result};
use crate::header::{Header, KeyKind, ROOT_OFFSET, compute_m, compute_stride};
use crate::io::FileIo;

/// A key passed to `insert`/`delete`/`search`. The variant used on every
/// call must match the `KeyKind` the database was created with.
#[derive(Debug, Clone, Copy)]
pub enum Key<'a> {
    Int32(i32),
    Int64(i64),
    Bytes(&'a [u8]),
    Str(&'a str),
}

#[derive(Debug, Clone, Copy, SmartDefault)]
pub struct CreateOptions {
    pub key_kind: KeyKind,
    #[default(16)]
    pub max_key_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub struct Db {
    pub(crate) io: FileIo,
    pub(crate) header: Header,
    pub(crate) key_kind: KeyKind,
    pub(crate) key_size: usize,
    pub(crate) key_slot_stride: usize,
    pub(crate) m: usize,
}

fn validate_key_size(kind: KeyKind, key_size: usize) -> Result<()> {
    match kind {
        KeyKind::String | KeyKind::Bytes => {
            if !(4..=128).contains(&key_size) {
                return Err(Error::InvalidArgument(
                    "string/bytes key size must be between 4 and 128",
                ));
            }
        }
        KeyKind::Int32 => {
            if key_size != 4 {
                return Err(Error::InvalidArgument("int32 key size must be 4"));
            }
        }
        KeyKind::Int64 => {
            if key_size != 8 {
                return Err(Error::InvalidArgument("int64 key size must be 8"));
            }
        }
    }
    Ok(())
}

impl Db {
    pub fn create(path: impl AsRef<Path>, options: CreateOptions) -> Result<()> {
        validate_key_size(options.key_kind, options.max_key_size)?;

        let stride = compute_stride(options.max_key_size as u32) as usize;
        let m = compute_m(stride as u32) as usize;
        if m < 3 {
            return Err(Error::InvalidArgument(
                "key size leaves no room for a usable branching factor",
            ));
        }

        if path.as_ref().exists() {
            return Err(Error::AlreadyExists);
        }

        let mut io = FileIo::create(path.as_ref())?;

        let header = Header {
            key_kind: options.key_kind.to_u32(),
            key_size: options.max_key_size as u32,
            key_slot_stride: stride as u32,
            m: m as u32,
            key_total: 0,
            key_block_count: 1,
            value_block_count: 0,
            free_head: 0,
            current_value_block: 0,
        };
        io.write_header(&header)?;

        let root = Block::init(ROOT_OFFSET, BlockClass::Index, true);
        io.write_block(&root)?;

        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Db> {
        let mut io = FileIo::open(path.as_ref())?;
        let header = io.read_header()?;
        let key_kind = KeyKind::from_u32(header.key_kind)?;

        let mut db = Db {
            io,
            key_kind,
            key_size: header.key_size as usize,
            key_slot_stride: header.key_slot_stride as usize,
            m: header.m as usize,
            header,
        };
        db.verify()?;
        Ok(db)
    }

    /// Consumes the handle, closing the underlying file. Equivalent to
    /// letting the `Db` drop, spelled out for callers who want the close to
    /// happen at a precise point.
    pub fn close(self) {}

    pub fn key_total(&self) -> u64 {
        self.header.key_total
    }

    pub fn value_block_count(&self) -> u64 {
        self.header.value_block_count
    }

    pub(crate) fn store_header(&mut self) -> Result<()> {
        self.io.write_header(&self.header)
    }

    pub(crate) fn encode_key(&self, key: &Key) -> Result<Vec<u8>> {
        match (self.key_kind, key) {
            (KeyKind::Int32, Key::Int32(v)) => {
                let mut buf = vec![0u8; self.key_size];
                buf[..4].copy_from_slice(&v.to_ne_bytes());
                Ok(buf)
            }
            (KeyKind::Int64, Key::Int64(v)) => {
                let mut buf = vec![0u8; self.key_size];
                buf[..8].copy_from_slice(&v.to_ne_bytes());
                Ok(buf)
            }
            (KeyKind::Bytes, Key::Bytes(b)) => {
                if b.len() != self.key_size {
                    return Err(Error::InvalidArgument(
                        "bytes key length must equal the database's configured key size",
                    ));
                }
                Ok(b.to_vec())
            }
            (KeyKind::String, Key::Str(s)) => {
                if s.len() >= self.key_size {
                    return Err(Error::InvalidArgument(
                        "string key length must be less than the database's configured key size",
                    ));
                }
                let mut buf = vec![0u8; self.key_size];
                buf[..s.len()].copy_from_slice(s.as_bytes());
                Ok(buf)
            }
            _ => Err(Error::InvalidArgument(
                "key variant does not match the database's configured key kind",
            )),
        }
    }
}
