//! Window registry
//!
//! Mirror of the server's stacking order for the root's children, kept
//! bottom to top. Records are keyed by `WinKey` so that a destroyed window
//! still fading out never aliases a new window that reuses its X id; id
//! lookups only ever see live (non-destroyed) records.

use indexmap::IndexMap;
use tracing::trace;
use x11rb::protocol::xproto::Window;

use crate::compositor::c_window::{CWindow, WinKey};

#[derive(Debug, Default)]
pub struct WindowRegistry {
    /// Stacking order, bottom to top
    windows: IndexMap<WinKey, CWindow>,
    next_key: u64,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn allocate_key(&mut self) -> WinKey {
        self.next_key += 1;
        WinKey(self.next_key)
    }

    /// Live record with exactly this id
    pub fn find(&self, id: Window) -> Option<WinKey> {
        self.windows
            .values()
            .find(|w| w.id == id && !w.destroyed)
            .map(|w| w.key)
    }

    /// Resolve a top-level id or a client window to its tracked top-level
    pub fn find_toplevel(&self, id: Window) -> Option<WinKey> {
        self.find(id).or_else(|| {
            self.windows
                .values()
                .find(|w| w.client_win == Some(id) && !w.destroyed)
                .map(|w| w.key)
        })
    }

    pub fn get(&self, key: WinKey) -> Option<&CWindow> {
        self.windows.get(&key)
    }

    pub fn get_mut(&mut self, key: WinKey) -> Option<&mut CWindow> {
        self.windows.get_mut(&key)
    }

    fn live_index(&self, id: Window, skip: Option<WinKey>) -> Option<usize> {
        self.windows
            .values()
            .position(|w| w.id == id && !w.destroyed && Some(w.key) != skip)
    }

    /// Insert `window` directly above the live window `above`, or at the
    /// bottom when `above` is `None` or unknown.
    pub fn insert(&mut self, window: CWindow, above: Option<Window>) -> WinKey {
        let key = window.key;
        let index = above
            .and_then(|id| self.live_index(id, None))
            .map_or(0, |i| i + 1);
        trace!("registry: insert {:#x} at {}", window.id, index);
        self.windows.shift_insert(index, key, window);
        key
    }

    /// Remove a record; the caller releases its resources
    pub fn remove(&mut self, key: WinKey) -> Option<CWindow> {
        self.windows.shift_remove(&key)
    }

    /// Id of the window directly below `key`, `None` at the bottom
    pub fn below(&self, key: WinKey) -> Option<Window> {
        let index = self.windows.get_index_of(&key)?;
        index
            .checked_sub(1)
            .and_then(|i| self.windows.get_index(i))
            .map(|(_, w)| w.id)
    }

    /// Move `key` directly above the live window `new_above`, or to the
    /// bottom when `new_above` is `None` or unknown. Returns whether the
    /// order changed.
    pub fn restack(&mut self, key: WinKey, new_above: Option<Window>) -> bool {
        let Some(from) = self.windows.get_index_of(&key) else {
            return false;
        };
        if self.below(key) == new_above {
            return false;
        }
        let to = match new_above.and_then(|id| self.live_index(id, Some(key))) {
            Some(pos) if pos < from => pos + 1,
            Some(pos) => pos,
            None => 0,
        };
        if to == from {
            return false;
        }
        self.windows.move_index(from, to);
        trace!("registry: restack {:?} {} -> {}", key, from, to);
        true
    }

    /// Topmost live window other than `except`
    pub fn top(&self, except: Option<WinKey>) -> Option<Window> {
        self.windows
            .values()
            .rev()
            .find(|w| !w.destroyed && Some(w.key) != except)
            .map(|w| w.id)
    }

    /// Records bottom to top
    #[cfg(test)]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CWindow> {
        self.windows.values()
    }

    /// Keys bottom to top
    pub fn keys(&self) -> Vec<WinKey> {
        self.windows.keys().copied().collect()
    }

    /// Ids of live windows bottom to top
    #[cfg(test)]
    pub fn stacking(&self) -> Vec<Window> {
        self.windows
            .values()
            .filter(|w| !w.destroyed)
            .map(|w| w.id)
            .collect()
    }
}
