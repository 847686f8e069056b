//! Generation-checked handle registry.
//!
//! Drivers hand guests opaque `i32` handles rather than references. The
//! registry is the arena behind those handles: each initialized device
//! occupies one slot, and the handle packs the slot index together with the
//! slot's generation counter. Deinitializing a device bumps the generation,
//! so a stale handle fails structurally instead of resolving to whatever
//! device reuses the slot.
//!
//! Handle layout (31 usable bits, bit 31 always clear so handles never
//! collide with negative status codes):
//!
//! ```text
//! bits  0..16   slot index
//! bits 16..31   slot generation
//! bit  31       always 0
//! ```
//!
//! A slot's generation wraps after 2^15 reuses; a handle held across exactly
//! that many deinit/init cycles of one slot would false-match. Accepted.

use bitvec::prelude::*;

use crate::error::{Error, Result};

/// Hard ceiling on slots a registry can address with 16 index bits.
const MAX_SLOTS: usize = 1 << 16;

const GENERATION_MASK: u16 = 0x7fff;

fn pack(slot: usize, generation: u16) -> i32 {
    let mut raw: u32 = 0;
    let view = raw.view_bits_mut::<Lsb0>();
    view[0..16].store(slot as u16);
    view[16..31].store(generation);
    raw as i32
}

fn unpack(handle: i32) -> Option<(usize, u16)> {
    if handle < 0 {
        return None;
    }
    let raw = handle as u32;
    let view = raw.view_bits::<Lsb0>();
    Some((view[0..16].load::<u16>() as usize, view[16..31].load::<u16>()))
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Arena of device-state slots indexed by generation-checked handles.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    capacity: usize,
}

impl<T> Registry<T> {
    /// Create a registry that will issue at most `capacity` live handles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity: capacity.min(MAX_SLOTS),
        }
    }

    /// Store a device state, returning its handle.
    ///
    /// Fails with `ResourceExhausted` when every slot is live.
    pub fn insert(&mut self, value: T) -> Result<i32> {
        if let Some(slot) = self.slots.iter().position(|s| s.value.is_none()) {
            self.slots[slot].value = Some(value);
            return Ok(pack(slot, self.slots[slot].generation));
        }
        if self.slots.len() >= self.capacity {
            return Err(Error::ResourceExhausted);
        }
        let slot = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Ok(pack(slot, 0))
    }

    /// Resolve a handle to its device state.
    pub fn get(&self, handle: i32) -> Result<&T> {
        let (slot, generation) = unpack(handle).ok_or(Error::InvalidHandle)?;
        self.slots
            .get(slot)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_ref())
            .ok_or(Error::InvalidHandle)
    }

    /// Resolve a handle to its device state, mutably.
    pub fn get_mut(&mut self, handle: i32) -> Result<&mut T> {
        let (slot, generation) = unpack(handle).ok_or(Error::InvalidHandle)?;
        self.slots
            .get_mut(slot)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_mut())
            .ok_or(Error::InvalidHandle)
    }

    /// Destroy the device state behind a handle, invalidating it.
    pub fn remove(&mut self, handle: i32) -> Result<T> {
        let (slot, generation) = unpack(handle).ok_or(Error::InvalidHandle)?;
        let entry = self
            .slots
            .get_mut(slot)
            .filter(|s| s.generation == generation)
            .ok_or(Error::InvalidHandle)?;
        let value = entry.value.take().ok_or(Error::InvalidHandle)?;
        entry.generation = (entry.generation + 1) & GENERATION_MASK;
        Ok(value)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_non_negative() {
        let mut registry = Registry::with_capacity(8);
        for n in 0..8 {
            let handle = registry.insert(n).unwrap();
            assert!(handle >= 0);
        }
    }

    #[test]
    fn insert_get_remove() {
        let mut registry = Registry::with_capacity(4);
        let handle = registry.insert("dev0").unwrap();
        assert_eq!(*registry.get(handle).unwrap(), "dev0");
        assert_eq!(registry.remove(handle).unwrap(), "dev0");
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut registry = Registry::with_capacity(4);
        let stale = registry.insert(1).unwrap();
        registry.remove(stale).unwrap();

        // The slot is reused, but under a new generation.
        let fresh = registry.insert(2).unwrap();
        assert_ne!(stale, fresh);
        assert_eq!(registry.get(stale), Err(Error::InvalidHandle));
        assert_eq!(*registry.get(fresh).unwrap(), 2);
    }

    #[test]
    fn double_remove_fails() {
        let mut registry = Registry::with_capacity(4);
        let handle = registry.insert(7).unwrap();
        assert!(registry.remove(handle).is_ok());
        assert_eq!(registry.remove(handle), Err(Error::InvalidHandle));
    }

    #[test]
    fn never_issued_handle_is_rejected() {
        let registry = Registry::<u8>::with_capacity(4);
        assert_eq!(registry.get(0), Err(Error::InvalidHandle));
        assert_eq!(registry.get(12345), Err(Error::InvalidHandle));
        assert_eq!(registry.get(-1), Err(Error::InvalidHandle));
        assert_eq!(registry.get(i32::MIN), Err(Error::InvalidHandle));
    }

    #[test]
    fn capacity_exhaustion() {
        let mut registry = Registry::with_capacity(2);
        registry.insert(0).unwrap();
        registry.insert(1).unwrap();
        assert_eq!(registry.insert(2), Err(Error::ResourceExhausted));
    }

    #[test]
    fn freed_slot_is_reusable_after_exhaustion() {
        let mut registry = Registry::with_capacity(1);
        let handle = registry.insert(0).unwrap();
        assert_eq!(registry.insert(1), Err(Error::ResourceExhausted));
        registry.remove(handle).unwrap();
        assert!(registry.insert(1).is_ok());
    }

    #[test]
    fn generation_survives_many_reuses() {
        let mut registry = Registry::with_capacity(1);
        let mut previous = registry.insert(0u32).unwrap();
        for n in 1..100u32 {
            registry.remove(previous).unwrap();
            let handle = registry.insert(n).unwrap();
            assert_eq!(registry.get(previous), Err(Error::InvalidHandle));
            previous = handle;
        }
    }
}
