//! Open file handle tracking.
//!
//! Maps the opaque handles returned by OPEN to the node they were opened on.

use std::collections::HashMap;

pub const DEFAULT_MAX_HANDLES: usize = 1024;

pub type Handle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many open handles (limit {limit})")]
pub struct CapacityExceeded {
    pub limit: usize,
}

pub struct HandleTable {
    handles: HashMap<Handle, u64>,
    next_handle: Handle,
    max_handles: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HANDLES)
    }

    pub fn with_capacity(max_handles: usize) -> Self {
        Self {
            handles: HashMap::new(),
            next_handle: 0,
            max_handles,
        }
    }

    /// Allocates a handle for `node`.
    ///
    /// Handles come from a wrapping counter; ids still held by an open file
    /// are skipped, so a live handle is never issued twice.
    pub fn try_open(&mut self, node: u64) -> Result<Handle, CapacityExceeded> {
        if self.handles.len() >= self.max_handles {
            return Err(CapacityExceeded {
                limit: self.max_handles,
            });
        }

        let mut handle = self.next_handle;
        while self.handles.contains_key(&handle) {
            handle = handle.wrapping_add(1);
        }
        self.next_handle = handle.wrapping_add(1);

        self.handles.insert(handle, node);
        Ok(handle)
    }

    pub fn lookup(&self, handle: Handle) -> Option<u64> {
        self.handles.get(&handle).copied()
    }

    /// Forgets `handle`. Closing an unknown handle does nothing.
    pub fn close(&mut self, handle: Handle) -> Option<u64> {
        self.handles.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_handles
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn open_lookup_close() {
        let mut table = HandleTable::new();
        let fh = table.try_open(42).unwrap();

        assert_eq!(table.lookup(fh), Some(42));
        assert_eq!(table.close(fh), Some(42));
        assert_eq!(table.lookup(fh), None);
    }

    #[test]
    fn close_unknown_is_noop() {
        let mut table = HandleTable::new();
        let fh = table.try_open(7).unwrap();

        assert_eq!(table.close(fh + 1), None);
        assert_eq!(table.close(fh), Some(7));
        assert_eq!(table.close(fh), None);
        assert!(table.is_empty());
    }

    #[test]
    fn handle_limit_enforced() {
        let mut table = HandleTable::new();

        for i in 0..DEFAULT_MAX_HANDLES {
            let result = table.try_open(i as u64 + 2);
            assert!(result.is_ok(), "failed at {}", i);
        }

        let result = table.try_open(99999);
        assert_eq!(
            result,
            Err(CapacityExceeded {
                limit: DEFAULT_MAX_HANDLES
            })
        );
    }

    #[test]
    fn release_frees_exactly_one_slot() {
        let mut table = HandleTable::with_capacity(3);
        let first = table.try_open(10).unwrap();
        table.try_open(11).unwrap();
        table.try_open(12).unwrap();
        assert!(table.try_open(13).is_err());

        table.close(first);
        assert!(table.try_open(13).is_ok());
        assert!(table.try_open(14).is_err());
    }

    #[test]
    fn counter_wraps_and_skips_live_handles() {
        let mut table = HandleTable::with_capacity(8);
        table.next_handle = u32::MAX - 1;

        let a = table.try_open(2).unwrap();
        let b = table.try_open(3).unwrap();
        let c = table.try_open(4).unwrap();
        assert_eq!((a, b, c), (u32::MAX - 1, u32::MAX, 0));

        // Drive the counter all the way around so it lands on live ids again.
        table.close(c);
        table.next_handle = u32::MAX - 1;
        let d = table.try_open(5).unwrap();
        assert_eq!(d, 0);

        let live: HashSet<Handle> = [a, b, d].into_iter().collect();
        assert_eq!(live.len(), 3);
    }

    #[test]
    fn handles_unique_under_churn() {
        let mut table = HandleTable::with_capacity(16);
        table.next_handle = u32::MAX - 20;
        let mut live: Vec<Handle> = Vec::new();

        for round in 0..200u64 {
            if live.len() == 16 || (round % 3 == 0 && !live.is_empty()) {
                let victim = live.remove((round as usize) % live.len());
                table.close(victim);
            }
            let fh = table.try_open(round + 2).unwrap();
            assert!(!live.contains(&fh), "handle {fh} issued twice");
            live.push(fh);
        }
    }
}
