//! Open-file and open-directory handle table.
//!
//! Fixed-capacity slots, first-free allocation. Every entry is bound to
//! one mount and one backend handle. Freeing a slot bumps its generation,
//! which is what makes a closed or reclaimed [`HandleId`] fail validation.

use dmvfs_types::{BackendHandle, HandleId, OwnerId, VfsResult};

use super::mount::MountId;

/// Whether a slot holds a file or a directory stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    File,
    Dir,
}

/// A bound handle slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenEntry {
    pub mount: MountId,
    pub backend: BackendHandle,
    pub owner: OwnerId,
    pub kind: HandleKind,
}

#[derive(Debug, Default)]
struct HandleSlot {
    generation: u32,
    entry: Option<OpenEntry>,
}

#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<HandleSlot>,
}

impl HandleTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, HandleSlot::default);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of bound slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind the first free slot. `None` when the table is full.
    pub fn allocate(&mut self, entry: OpenEntry) -> Option<HandleId> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.entry.is_none())?;
        let index = u32::try_from(index).ok()?;
        slot.entry = Some(entry);
        Some(HandleId::new(index, slot.generation))
    }

    /// Entry for `id`, if it is live and of the expected kind.
    pub fn get(&self, id: HandleId, kind: HandleKind) -> Option<&OpenEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .filter(|e| e.kind == kind)
    }

    /// Unbind the slot and return what it held.
    pub fn free(&mut self, id: HandleId) -> Option<OpenEntry> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(entry)
    }

    /// Free every entry accepted by `matches`, calling `close` on each first.
    ///
    /// The sweep always runs to the end and every matching slot is freed,
    /// whatever `close` returns. Returns false if any `close` failed.
    pub fn sweep<M, C>(&mut self, matches: M, mut close: C) -> bool
    where
        M: Fn(&OpenEntry) -> bool,
        C: FnMut(&OpenEntry) -> VfsResult<()>,
    {
        let mut all_ok = true;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.filter(|e| matches(e)) else {
                continue;
            };
            if let Err(e) = close(&entry) {
                tracing::warn!(
                    index,
                    generation = slot.generation,
                    error = %e,
                    "backend close failed during sweep"
                );
                all_ok = false;
            }
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        all_ok
    }

    /// Number of live handles bound to `mount`.
    pub fn count_for_mount(&self, mount: MountId) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.mount == mount)
            .count()
    }
}
