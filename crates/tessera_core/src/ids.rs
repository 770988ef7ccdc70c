//! # Identifiers
//!
//! Node and client identifiers plus the allocator that hands them out.
//!
//! Node ids are client-visible (they end up in DOM markers), so they are
//! allocated from one process-wide counter and never reused. A replacement
//! node produced by an incremental re-render inherits the id of the node it
//! replaces instead of keeping its own.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a render node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Creates a node id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Null/invalid client ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a client id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this client ID is null.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Monotonic id source shared by everything that creates nodes or clients.
#[derive(Debug)]
pub struct IdAllocator {
    next_node: AtomicU64,
    next_client: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator whose first ids are 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_node: AtomicU64::new(1),
            next_client: AtomicU64::new(1),
        }
    }

    /// Hands out the next node id.
    #[inline]
    pub fn next_node(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    /// Hands out the next client id.
    #[inline]
    pub fn next_client(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let ids = IdAllocator::new();
        let a = ids.next_node();
        let b = ids.next_node();
        assert!(b > a);
        assert_eq!(a.raw() + 1, b.raw());
    }

    #[test]
    fn test_client_ids_independent_of_node_ids() {
        let ids = IdAllocator::new();
        let _ = ids.next_node();
        let _ = ids.next_node();
        assert_eq!(ids.next_client(), ClientId::new(1));
        assert!(ClientId::default().is_null());
    }
}
