use log::trace;

use crate::block::{Block, BlockClass, copy_key_slots_between};
use crate::compare::compare;
use crate::db::{DeleteOutcome, Db, InsertOutcome, Key};
use crate::error::{Error, Result};
use crate::header::ROOT_OFFSET;

/// Binary searches `block`'s live key slots for `key`. Returns the matching
/// slot index as `Ok(i)` if found, or the insertion point encoded as
/// `-(i+1)` if not (so callers can tell "found" from "not found" from the
/// sign alone, matching the original C convention).
fn binary_search(db: &Db, block: &Block, key: &[u8]) -> i64 {
    let mut lo: i64 = 0;
    let mut hi: i64 = block.num() as i64 - 1;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let slot = block.key_slot(mid as usize, db.key_slot_stride);
        match compare(db.key_kind, key, slot.key()) {
            core::cmp::Ordering::Equal => return mid,
            core::cmp::Ordering::Less => hi = mid - 1,
            core::cmp::Ordering::Greater => lo = mid + 1,
        }
    }
    -(lo + 1)
}

impl Db {
    pub(crate) fn read_block(&mut self, offset: u64) -> Result<Block> {
        self.io.read_block(offset)
    }

    pub(crate) fn write_block(&mut self, block: &Block) -> Result<()> {
        self.io.write_block(block)
    }

    /// Increases tree height by one: the current root's body moves into a
    /// freshly allocated child, the root is reinitialized as a single-child
    /// internal node, and the new child is preemptively split.
    fn grow_height(&mut self, root: &mut Block) -> Result<()> {
        let root_leaf = root.leaf();
        let mut sub_x = self.allocate_block(BlockClass::Index, root_leaf)?;
        sub_x
            .body_mut()
            .copy_from_slice(root.body());
        sub_x.set_num(root.num());
        self.write_block(&sub_x)?;

        root.body_mut().fill(0);
        root.set_num(0);
        root.set_leaf(false);
        root.key_slot_mut(0, self.key_slot_stride).set_child(sub_x.self_offset());

        let sub_y = self.allocate_block(BlockClass::Index, sub_x.leaf())?;
        self.split_child(root, 0, &mut sub_x, sub_y)?;
        Ok(())
    }

    /// Splits `sub_x` (the child at `parent`'s slot `pos`) around its
    /// median key, which rises into `parent`; the upper half moves into
    /// `sub_y`.
    fn split_child(
        &mut self,
        parent: &mut Block,
        pos: usize,
        sub_x: &mut Block,
        mut sub_y: Block,
    ) -> Result<()> {
        let stride = self.key_slot_stride;
        let mid = (self.m - 1) / 2;

        let (median_vref, median_key) = {
            let s = sub_x.key_slot(mid, stride);
            (s.value_ref(), s.key().to_vec())
        };

        let upper_count = sub_x.num() as usize - mid - 1;
        copy_key_slots_between(&mut sub_y, 0, sub_x, mid + 1, upper_count + 1, stride);
        sub_y.set_num(upper_count as u64);
        sub_y.set_leaf(sub_x.leaf());

        sub_x.set_num(mid as u64);
        self.write_block(sub_x)?;
        self.write_block(&sub_y)?;

        let shift_count = parent.num() as usize - pos;
        parent.shift_key_slots(pos + 1, pos, shift_count, stride);
        {
            let mut dst = parent.key_slot_mut(pos, stride);
            dst.set_value_ref(median_vref);
            dst.key_mut().copy_from_slice(&median_key);
        }
        parent.key_slot_mut(pos + 1, stride).set_child(sub_y.self_offset());
        parent.set_num(parent.num() + 1);
        self.write_block(parent)?;

        trace!("split child at slot {pos}, median rose into parent");
        Ok(())
    }

    pub fn insert(&mut self, key: Key, value: &[u8]) -> Result<InsertOutcome> {
        let key_bytes = self.encode_key(&key)?;
        let stride = self.key_slot_stride;

        crate::heap::check_value_fits(value)?;

        let mut current = self.read_block(ROOT_OFFSET)?;
        if current.num() as usize == self.m - 1 {
            self.grow_height(&mut current)?;
            current = self.read_block(ROOT_OFFSET)?;
        }

        loop {
            if current.leaf() {
                break;
            }

            let idx = binary_search(self, &current, &key_bytes);
            if idx >= 0 {
                return Ok(InsertOutcome::Duplicate);
            }
            let i = (-(idx + 1)) as usize;
            let mut child_offset = current.key_slot(i, stride).child();
            let mut child = self.read_block(child_offset)?;

            if child.num() as usize == self.m - 1 {
                let sub_y = self.allocate_block(BlockClass::Index, child.leaf())?;
                self.split_child(&mut current, i, &mut child, sub_y)?;
                let risen = current.key_slot(i, stride);
                match compare(self.key_kind, &key_bytes, risen.key()) {
                    core::cmp::Ordering::Equal => return Ok(InsertOutcome::Duplicate),
                    core::cmp::Ordering::Greater => {
                        child_offset = current.key_slot(i + 1, stride).child();
                        child = self.read_block(child_offset)?;
                    }
                    core::cmp::Ordering::Less => {}
                }
            }
            current = child;
        }

        let idx = binary_search(self, &current, &key_bytes);
        if idx >= 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        let i = (-(idx + 1)) as usize;
        let value_ref = self.allocate_value(value)?;

        let count = current.num() as usize - i;
        current.shift_key_slots(i + 1, i, count, stride);
        {
            let mut dst = current.key_slot_mut(i, stride);
            dst.set_value_ref(value_ref);
            dst.key_mut().copy_from_slice(&key_bytes);
        }
        current.set_num(current.num() + 1);
        self.write_block(&current)?;

        self.header.key_total += 1;
        self.store_header()?;
        Ok(InsertOutcome::Inserted)
    }

    /// Merges `sub_x` and `sub_y`, the children at `parent`'s slots `pos`
    /// and `pos + 1`, absorbing `parent`'s slot `pos` key/value between
    /// them. If that empties `parent` down to zero keys (only possible at
    /// the root), `parent`'s body is replaced with the merged contents and
    /// `sub_x` is freed instead of `sub_y`; the node to continue the
    /// descent from is returned either way.
    fn merge(&mut self, parent: &mut Block, pos: usize, mut sub_x: Block, sub_y: Block) -> Result<Block> {
        let stride = self.key_slot_stride;

        let (vref, key) = {
            let s = parent.key_slot(pos, stride);
            (s.value_ref(), s.key().to_vec())
        };
        let sx_num = sub_x.num() as usize;
        {
            let mut dst = sub_x.key_slot_mut(sx_num, stride);
            dst.set_value_ref(vref);
            dst.key_mut().copy_from_slice(&key);
        }
        copy_key_slots_between(&mut sub_x, sx_num + 1, &sub_y, 0, sub_y.num() as usize + 1, stride);
        sub_x.set_num((sx_num + 1 + sub_y.num() as usize) as u64);

        let shift_count = parent.num() as usize - pos - 1;
        parent.shift_key_slots(pos, pos + 1, shift_count, stride);
        parent.key_slot_mut(pos, stride).set_child(sub_x.self_offset());
        parent.set_num(parent.num() - 1);

        self.release_block(sub_y)?;

        if parent.num() == 0 {
            let leaf = sub_x.leaf();
            parent.body_mut().copy_from_slice(sub_x.body());
            parent.set_num(sub_x.num());
            parent.set_leaf(leaf);
            self.release_block(sub_x)?;
            self.write_block(parent)?;
            Ok(parent.clone())
        } else {
            self.write_block(parent)?;
            self.write_block(&sub_x)?;
            Ok(sub_x)
        }
    }

    /// Rotates `sub_y`'s (slot `pos + 1`'s) least key through `parent` into
    /// `sub_x` (slot `pos`), which has fallen to the minimum occupancy.
    fn borrow_from_right(&mut self, parent: &mut Block, pos: usize, sub_x: &mut Block, sub_y: &mut Block) -> Result<()> {
        let stride = self.key_slot_stride;
        let (vref, key) = {
            let s = parent.key_slot(pos, stride);
            (s.value_ref(), s.key().to_vec())
        };
        let sy0_child = sub_y.key_slot(0, stride).child();
        let n = sub_x.num() as usize;
        {
            let mut dst = sub_x.key_slot_mut(n, stride);
            dst.set_value_ref(vref);
            dst.key_mut().copy_from_slice(&key);
        }
        sub_x.key_slot_mut(n + 1, stride).set_child(sy0_child);
        sub_x.set_num(sub_x.num() + 1);

        let (vref, key) = {
            let s = sub_y.key_slot(0, stride);
            (s.value_ref(), s.key().to_vec())
        };
        {
            let mut dst = parent.key_slot_mut(pos, stride);
            dst.set_value_ref(vref);
            dst.key_mut().copy_from_slice(&key);
        }
        let count = sub_y.num() as usize - 1;
        sub_y.shift_key_slots(0, 1, count, stride);
        sub_y.set_num(sub_y.num() - 1);

        self.write_block(parent)?;
        self.write_block(sub_x)?;
        self.write_block(sub_y)?;
        Ok(())
    }

    /// Rotates `sub_w`'s (slot `pos - 1`'s) greatest key through `parent`
    /// into `sub_x` (slot `pos`), which has fallen to the minimum
    /// occupancy.
    fn borrow_from_left(&mut self, parent: &mut Block, pos: usize, sub_x: &mut Block, sub_w: &mut Block) -> Result<()> {
        let stride = self.key_slot_stride;
        let count = sub_x.num() as usize;
        sub_x.shift_key_slots(1, 0, count, stride);

        let (vref, key) = {
            let s = parent.key_slot(pos - 1, stride);
            (s.value_ref(), s.key().to_vec())
        };
        let sw_child = sub_w.key_slot(sub_w.num() as usize, stride).child();
        {
            let mut dst = sub_x.key_slot_mut(0, stride);
            dst.set_value_ref(vref);
            dst.key_mut().copy_from_slice(&key);
        }
        sub_x.key_slot_mut(0, stride).set_child(sw_child);
        sub_x.set_num(sub_x.num() + 1);

        let wn = sub_w.num() as usize - 1;
        let (vref, key) = {
            let s = sub_w.key_slot(wn, stride);
            (s.value_ref(), s.key().to_vec())
        };
        {
            let mut dst = parent.key_slot_mut(pos - 1, stride);
            dst.set_value_ref(vref);
            dst.key_mut().copy_from_slice(&key);
        }
        sub_w.set_num(sub_w.num() - 1);

        self.write_block(parent)?;
        self.write_block(sub_x)?;
        self.write_block(sub_w)?;
        Ok(())
    }

    pub fn delete(&mut self, key: Key) -> Result<DeleteOutcome> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum State {
            Normal,
            SeekPredecessor,
            SeekSuccessor,
        }

        let key_bytes = self.encode_key(&key)?;
        let stride = self.key_slot_stride;
        let half = (self.m - 1) / 2;

        let mut state = State::Normal;
        let mut current = self.read_block(ROOT_OFFSET)?;
        let mut promo: Option<(Block, usize)> = None;

        loop {
            if current.leaf() {
                break;
            }

            let search_idx = match state {
                State::Normal => binary_search(self, &current, &key_bytes),
                State::SeekPredecessor => -(current.num() as i64) - 1,
                State::SeekSuccessor => -1,
            };

            if search_idx >= 0 {
                let i = search_idx as usize;
                let sx = self.read_block(current.key_slot(i, stride).child())?;
                if sx.num() as usize > half {
                    promo = Some((current.clone(), i));
                    state = State::SeekPredecessor;
                    current = sx;
                } else {
                    let sy = self.read_block(current.key_slot(i + 1, stride).child())?;
                    if sy.num() as usize > half {
                        promo = Some((current.clone(), i));
                        state = State::SeekSuccessor;
                        current = sy;
                    } else {
                        let mut parent = current;
                        current = self.merge(&mut parent, i, sx, sy)?;
                    }
                }
                continue;
            }

            let i = (-(search_idx + 1)) as usize;
            let sx = self.read_block(current.key_slot(i, stride).child())?;
            if sx.num() as usize > half {
                current = sx;
                continue;
            }

            let has_right = i + 1 <= current.num() as usize;
            let sy = if has_right {
                Some(self.read_block(current.key_slot(i + 1, stride).child())?)
            } else {
                None
            };
            let right_is_thin = sy.as_ref().map(|b| b.num() as usize <= half).unwrap_or(true);
            let has_left = i >= 1 && (!has_right || right_is_thin);
            let sw = if has_left {
                Some(self.read_block(current.key_slot(i - 1, stride).child())?)
            } else {
                None
            };

            if has_right && !right_is_thin {
                let mut parent = current;
                let mut sx = sx;
                let mut sy = sy.unwrap();
                self.borrow_from_right(&mut parent, i, &mut sx, &mut sy)?;
                current = sx;
            } else if has_left && sw.as_ref().unwrap().num() as usize > half {
                let mut parent = current;
                let mut sx = sx;
                let mut sw = sw.unwrap();
                self.borrow_from_left(&mut parent, i, &mut sx, &mut sw)?;
                current = sx;
            } else if has_right {
                let mut parent = current;
                current = self.merge(&mut parent, i, sx, sy.unwrap())?;
            } else {
                let mut parent = current;
                current = self.merge(&mut parent, i - 1, sw.unwrap(), sx)?;
            }
            continue;
        }

        let deleted_value_ref = match state {
            State::Normal => {
                let idx = binary_search(self, &current, &key_bytes);
                if idx < 0 {
                    return Ok(DeleteOutcome::NotFound);
                }
                let i = idx as usize;
                let value_ref = current.key_slot(i, stride).value_ref();
                let count = current.num() as usize - i - 1;
                current.shift_key_slots(i, i + 1, count, stride);
                current.set_num(current.num() - 1);
                self.write_block(&current)?;
                value_ref
            }
            State::SeekSuccessor => {
                let (mut node_match, i_match) = promo.take().unwrap();
                let (vref, key) = {
                    let s = current.key_slot(0, stride);
                    (s.value_ref(), s.key().to_vec())
                };
                {
                    let mut dst = node_match.key_slot_mut(i_match, stride);
                    dst.set_value_ref(vref);
                    dst.key_mut().copy_from_slice(&key);
                }
                let count = current.num() as usize - 1;
                current.shift_key_slots(0, 1, count, stride);
                current.set_num(current.num() - 1);
                self.write_block(&node_match)?;
                self.write_block(&current)?;
                vref
            }
            State::SeekPredecessor => {
                let (mut node_match, i_match) = promo.take().unwrap();
                let last = current.num() as usize - 1;
                let (vref, key) = {
                    let s = current.key_slot(last, stride);
                    (s.value_ref(), s.key().to_vec())
                };
                {
                    let mut dst = node_match.key_slot_mut(i_match, stride);
                    dst.set_value_ref(vref);
                    dst.key_mut().copy_from_slice(&key);
                }
                current.set_num(current.num() - 1);
                self.write_block(&node_match)?;
                self.write_block(&current)?;
                vref
            }
        };

        self.release_value(deleted_value_ref)?;
        self.header.key_total -= 1;
        self.store_header()?;
        Ok(DeleteOutcome::Deleted)
    }

    pub fn search(&mut self, key: Key, out: &mut [u8]) -> Result<usize> {
        let key_bytes = self.encode_key(&key)?;
        let stride = self.key_slot_stride;
        let mut offset = ROOT_OFFSET;

        loop {
            let node = self.read_block(offset)?;
            let idx = binary_search(self, &node, &key_bytes);
            if idx >= 0 {
                let value_ref = node.key_slot(idx as usize, stride).value_ref();
                let size = self.value_size(value_ref)?;
                if size > out.len() {
                    return Err(Error::DestinationTooSmall {
                        needed: size,
                        available: out.len(),
                    });
                }
                let value = self.read_value(value_ref)?;
                out[..size].copy_from_slice(&value);
                return Ok(size);
            }
            let i = (-(idx + 1)) as usize;
            let child = node.key_slot(i, stride).child();
            if child == 0 {
                return Err(Error::NotFound);
            }
            offset = child;
        }
    }
}
