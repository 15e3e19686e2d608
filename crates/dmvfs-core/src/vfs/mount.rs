//! Mount table with longest-prefix routing.
//!
//! Fixed-capacity array of mount slots. Slots are reused first-free, and
//! each slot carries a generation that is bumped when the mount goes away,
//! so a [`MountId`] kept by an open handle cannot resolve to a later mount
//! in the same slot.

use std::fmt;

use super::ops::FsContext;
use super::path::prefix_matches;

/// Generation-tagged reference to a mount slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MountId {
    index: u32,
    generation: u32,
}

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount prefix (e.g. "/mnt").
    pub prefix: String,
    /// Name of the driver that provides this mount.
    pub fs_name: String,
    /// Files and directory streams currently open on this mount.
    pub open_handles: usize,
}

/// A live mount.
pub struct MountPoint {
    pub prefix: String,
    pub fs_name: String,
    pub context: Box<dyn FsContext>,
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("prefix", &self.prefix)
            .field("fs_name", &self.fs_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MountSlot {
    generation: u32,
    mount: Option<MountPoint>,
}

/// Routes paths to mounted backends.
///
/// Mount points are matched by longest prefix. If `/mnt` and `/mnt/sub`
/// are both mounted, `/mnt/sub/x` goes to `/mnt/sub`.
#[derive(Debug)]
pub struct MountTable {
    slots: Vec<MountSlot>,
}

impl MountTable {
    /// Create a table with `capacity` free slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, MountSlot::default);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active mounts.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.mount.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mount owning `abs`, by longest matching prefix.
    pub fn find_owning(&self, abs: &str) -> Option<MountId> {
        self.iter()
            .filter(|(_, mount)| prefix_matches(abs, &mount.prefix))
            .max_by_key(|(_, mount)| mount.prefix.len())
            .map(|(id, _)| id)
    }

    /// Mount whose prefix is exactly `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<MountId> {
        self.iter()
            .find(|(_, mount)| mount.prefix == prefix)
            .map(|(id, _)| id)
    }

    /// Index of the first free slot, or `None` when the table is full.
    pub fn allocate_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.mount.is_none())
    }

    /// Fill slot `index` (from [`allocate_slot`](Self::allocate_slot)).
    ///
    /// Returns `None` if the slot is out of range or already taken.
    pub fn insert(&mut self, index: usize, mount: MountPoint) -> Option<MountId> {
        let id_index = u32::try_from(index).ok()?;
        let slot = self.slots.get_mut(index)?;
        if slot.mount.is_some() {
            return None;
        }
        slot.mount = Some(mount);
        Some(MountId {
            index: id_index,
            generation: slot.generation,
        })
    }

    /// Free the slot and hand back its mount.
    pub fn remove(&mut self, id: MountId) -> Option<MountPoint> {
        let slot = self.slot_mut(id)?;
        let mount = slot.mount.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(mount)
    }

    pub fn get(&self, id: MountId) -> Option<&MountPoint> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.mount.as_ref())
    }

    pub fn get_mut(&mut self, id: MountId) -> Option<&mut MountPoint> {
        self.slot_mut(id).and_then(|s| s.mount.as_mut())
    }

    /// Active mounts in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (MountId, &MountPoint)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let index = u32::try_from(index).ok()?;
            slot.mount.as_ref().map(|mount| {
                (
                    MountId {
                        index,
                        generation: slot.generation,
                    },
                    mount,
                )
            })
        })
    }

    fn slot_mut(&mut self, id: MountId) -> Option<&mut MountSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
    }
}
