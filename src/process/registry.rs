//! Process Registry
//!
//! Tracks parent/child links and exit statuses for `exec` and `wait`.
//!
//! # Design
//! - Fixed arena of entries addressed by [`SlotId`]; a child knows its slot,
//!   a parent finds its children by pid
//! - Each entry carries its own one-shot [`ExitSignal`]; waiting never holds
//!   the arena lock and never touches the filesystem lock
//! - Each entry is referenced by the parent side and the child side; it is
//!   reclaimed once both have let go
//! - A [`SlotId`] carries the generation of its reservation, so a child
//!   side that outlives its entry gets `StaleSlot` instead of reaching the
//!   entry's next occupant
//!
//! ```text
//!   reserve ──► bind(pid) ──► child exit ──► parent wait ──► reclaimed
//!                                    └────► parent exit ──► reclaimed
//! ```

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::{Mutex, Once};

use super::Pid;

/// Number of entries in the registry.
pub const REGISTRY_SIZE: usize = 64;

/// A reservation in the registry: an entry index plus the generation the
/// entry had when it was reserved.
///
/// Reusing an index bumps its generation, so a `SlotId` held past the end of
/// its entry no longer matches anything.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Get the generation.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Every entry is in use.
    Full,
    /// The pid is not a child of the caller, or was already waited for.
    NotChild,
    /// The slot's entry has been reclaimed or reused.
    StaleSlot,
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "process registry full"),
            Self::NotChild => write!(f, "not a waitable child"),
            Self::StaleSlot => write!(f, "stale registry slot"),
        }
    }
}

/// One-shot exit notification raised by the child and awaited by the parent.
#[derive(Debug)]
pub struct ExitSignal {
    status: Once<i32>,
}

impl ExitSignal {
    /// Create an unraised signal.
    pub const fn new() -> Self {
        Self { status: Once::new() }
    }

    /// Raise the signal. Only the first status is kept.
    pub fn raise(&self, status: i32) {
        self.status.call_once(|| status);
    }

    /// The status, if raised.
    pub fn poll(&self) -> Option<i32> {
        self.status.get().copied()
    }

    /// Block until the signal is raised, calling `idle` between polls.
    ///
    /// `idle` is where the caller gives up the CPU; the signal itself never
    /// spins.
    pub fn wait(&self, mut idle: impl FnMut()) -> i32 {
        loop {
            if let Some(status) = self.poll() {
                return status;
            }
            idle();
        }
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    /// Bound once the loader has assigned the child a pid.
    pid: Option<Pid>,
    parent: Pid,
    signal: Arc<ExitSignal>,
    /// Parent side plus child side.
    refs: u8,
    /// Parent has waited or exited; no further `wait` can succeed.
    waited: bool,
}

#[derive(Debug)]
struct Slots {
    entries: Vec<Option<Entry>>,
    /// Generation handed to the next reservation of each index.
    next_generation: Vec<u32>,
}

impl Slots {
    /// The live entry `slot` refers to.
    fn live_mut(&mut self, slot: SlotId) -> Result<&mut Entry, RegistryError> {
        self.entries
            .get_mut(slot.index())
            .and_then(Option::as_mut)
            .filter(|entry| entry.generation == slot.generation)
            .ok_or(RegistryError::StaleSlot)
    }

    /// Drop one reference to the entry at `index`, reclaiming it at zero.
    fn release(&mut self, index: usize) {
        let reclaim = match self.entries[index].as_mut() {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if reclaim {
            self.entries[index] = None;
        }
    }
}

/// The shared parent/child table.
#[derive(Debug)]
pub struct ProcessRegistry {
    slots: Mutex<Slots>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(REGISTRY_SIZE);
        entries.resize_with(REGISTRY_SIZE, || None);
        Self {
            slots: Mutex::new(Slots {
                entries,
                next_generation: vec![0; REGISTRY_SIZE],
            }),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.lock().entries.iter().flatten().count()
    }

    /// Check whether no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve an entry for a child of `parent` that is about to be spawned.
    pub fn reserve(&self, parent: Pid) -> Result<SlotId, RegistryError> {
        let mut slots = self.slots.lock();
        let index = slots
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::Full)?;
        let generation = slots.next_generation[index];
        slots.next_generation[index] = generation.wrapping_add(1);
        slots.entries[index] = Some(Entry {
            generation,
            pid: None,
            parent,
            signal: Arc::new(ExitSignal::new()),
            refs: 2,
            waited: false,
        });
        Ok(SlotId {
            index: index as u32,
            generation,
        })
    }

    /// Record the pid the loader gave the child.
    pub fn bind(&self, slot: SlotId, pid: Pid) -> Result<(), RegistryError> {
        self.slots.lock().live_mut(slot)?.pid = Some(pid);
        Ok(())
    }

    /// Drop a reservation whose child never started.
    pub fn cancel(&self, slot: SlotId) -> Result<(), RegistryError> {
        let mut slots = self.slots.lock();
        slots.live_mut(slot)?;
        slots.entries[slot.index()] = None;
        Ok(())
    }

    /// Child side: publish the exit status and let go of the entry.
    pub fn exit(&self, slot: SlotId, status: i32) -> Result<(), RegistryError> {
        let mut slots = self.slots.lock();
        slots.live_mut(slot)?.signal.raise(status);
        slots.release(slot.index());
        Ok(())
    }

    /// Parent side: wait for child `pid` to exit and consume its status.
    ///
    /// Fails immediately if `pid` is not a direct child of `parent` or was
    /// already waited for. Otherwise calls `idle` until the child exits;
    /// the registry lock is not held meanwhile.
    pub fn wait(&self, parent: Pid, pid: Pid, idle: impl FnMut()) -> Result<i32, RegistryError> {
        let (index, signal) = {
            let mut slots = self.slots.lock();
            let (index, entry) = slots
                .entries
                .iter_mut()
                .enumerate()
                .find_map(|(i, e)| {
                    e.as_mut()
                        .filter(|e| e.pid == Some(pid) && e.parent == parent && !e.waited)
                        .map(|e| (i, e))
                })
                .ok_or(RegistryError::NotChild)?;
            entry.waited = true;
            (index, Arc::clone(&entry.signal))
        };

        let status = signal.wait(idle);
        self.slots.lock().release(index);
        Ok(status)
    }

    /// Parent side: `parent` is exiting, give up on every child not waited for.
    pub fn orphan_children(&self, parent: Pid) {
        let mut slots = self.slots.lock();
        for index in 0..slots.entries.len() {
            let orphaned = match slots.entries[index].as_mut() {
                Some(entry) if entry.parent == parent && !entry.waited => {
                    entry.waited = true;
                    true
                }
                _ => false,
            };
            if orphaned {
                slots.release(index);
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
