use std::collections::BTreeMap;

use super::types::{ResourceHandle, ResourceKind};

/// A resource that has been allocated and not yet released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveResource {
    pub id: u64,
    pub kind: ResourceKind,
    pub label: Option<String>,
}

/// Registry of live device resources.
///
/// Ids are unique per tracker and never reused. Backends allocate through
/// the tracker so that the leak check sees every resource regardless of
/// backend.
#[derive(Debug)]
pub struct ResourceTracker {
    next_id: u64,
    allocations: u64,
    live: BTreeMap<u64, LiveResource>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            allocations: 0,
            live: BTreeMap::new(),
        }
    }

    /// Reserves an id that is not tracked as a resource (e.g. a render pass).
    pub fn next_untracked_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Registers a new live resource and returns its id.
    pub fn allocate(&mut self, kind: ResourceKind, label: Option<&str>) -> u64 {
        let id = self.next_untracked_id();
        self.allocations += 1;
        self.live.insert(
            id,
            LiveResource {
                id,
                kind,
                label: label.map(str::to_owned),
            },
        );
        id
    }

    /// Marks a resource as released. Returns `false` (and logs) when the
    /// handle is unknown or was already released.
    pub fn release(&mut self, handle: ResourceHandle) -> bool {
        match self.live.get(&handle.id()) {
            Some(entry) if entry.kind == handle.kind() => {
                self.live.remove(&handle.id());
                true
            }
            _ => {
                log::warn!("release of unknown or already released {} #{}", handle.kind(), handle.id());
                false
            }
        }
    }

    pub fn is_live(&self, handle: ResourceHandle) -> bool {
        self.live
            .get(&handle.id())
            .is_some_and(|entry| entry.kind == handle.kind())
    }

    /// Total number of resources ever allocated.
    #[inline]
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Lists every resource that was allocated and never released.
    pub fn leaks(&self) -> Vec<LiveResource> {
        self.live.values().cloned().collect()
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs each leaked resource at warn level; returns the number of leaks.
pub fn report_leaks(leaks: &[LiveResource]) -> usize {
    if leaks.is_empty() {
        log::debug!("leak check: no live resources");
        return 0;
    }

    for leak in leaks {
        log::warn!(
            "leaked {} #{} ({})",
            leak.kind,
            leak.id,
            leak.label.as_deref().unwrap_or("unlabeled")
        );
    }
    leaks.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::types::{Buffer, Program};

    #[test]
    fn released_resources_are_not_reported() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.allocate(ResourceKind::Buffer, Some("a"));
        let b = tracker.allocate(ResourceKind::Program, None);

        assert!(tracker.release(Buffer::from_raw(a).into()));

        let leaks = tracker.leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].id, b);
        assert_eq!(leaks[0].kind, ResourceKind::Program);
        assert_eq!(tracker.allocations(), 2);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut tracker = ResourceTracker::new();
        let id = tracker.allocate(ResourceKind::Program, None);

        assert!(tracker.release(Program::from_raw(id).into()));
        assert!(!tracker.release(Program::from_raw(id).into()));
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn release_with_mismatched_kind_is_rejected() {
        let mut tracker = ResourceTracker::new();
        let id = tracker.allocate(ResourceKind::Program, None);

        assert!(!tracker.release(Buffer::from_raw(id).into()));
        assert!(tracker.is_live(Program::from_raw(id).into()));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut tracker = ResourceTracker::new();
        let a = tracker.allocate(ResourceKind::Buffer, None);
        tracker.release(Buffer::from_raw(a).into());
        let pass = tracker.next_untracked_id();
        let b = tracker.allocate(ResourceKind::Buffer, None);

        assert!(a < pass && pass < b);
    }
}
