//! Slot-to-node mapping and the derived node registry.
//!
//! The slot table is the client's cached view of cluster ownership. It is
//! rebuilt wholesale on a topology refresh and patched one slot at a time
//! when the server reports a permanent redirect. Every mutation builds a
//! fresh table and swaps it in, so concurrent lookups always observe a
//! complete mapping, never a partial write.

use crate::cluster::node::{Node, NodeRole};
use crate::cluster::slot::SLOT_COUNT;
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// An inclusive range of slots as reported by topology discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    /// Start slot (inclusive)
    pub start: u16,
    /// End slot (inclusive, as the wire protocol reports it)
    pub end: u16,
}

impl SlotRange {
    /// Create a new slot range
    pub fn new(start: u16, end: u16) -> Self {
        assert!(start <= end, "start must not exceed end");
        assert!(end < SLOT_COUNT, "end must be < 16384");
        Self { start, end }
    }

    /// Check if a slot is within this range
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Number of slots in this range (inclusive ranges never cover zero)
    pub fn slot_count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// One entry of the discovered ownership table: a slot range, its owning
/// master, and the replicas mirroring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    pub range: SlotRange,
    pub master: Node,
    pub replicas: Vec<Node>,
}

/// Immutable snapshot of the full slot table plus the derived registry.
#[derive(Debug)]
struct SlotTable {
    slots: Vec<Option<Arc<Node>>>,
    nodes: Vec<Arc<Node>>,
}

/// Shared slot-to-node mapping with copy-then-swap mutation.
#[derive(Debug)]
pub struct SlotMap {
    table: RwLock<Arc<SlotTable>>,
}

impl SlotMap {
    /// Create an empty, uninitialized slot map
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(SlotTable {
                slots: vec![None; SLOT_COUNT as usize],
                nodes: Vec::new(),
            })),
        }
    }

    fn snapshot(&self) -> Arc<SlotTable> {
        self.table.read().expect("slot table lock poisoned").clone()
    }

    fn swap(&self, next: SlotTable) {
        *self.table.write().expect("slot table lock poisoned") = Arc::new(next);
    }

    /// Resolve the node owning a slot.
    ///
    /// An unmapped slot after initialization is an ownership-cache
    /// invariant violation and surfaces as a routing error.
    pub fn lookup(&self, slot: u16) -> Result<Arc<Node>> {
        if slot >= SLOT_COUNT {
            return Err(ClientError::Routing(format!(
                "Slot {} out of range",
                slot
            )));
        }
        self.snapshot().slots[slot as usize]
            .clone()
            .ok_or_else(|| ClientError::Routing(format!("No node mapped for slot {}", slot)))
    }

    /// Overwrite exactly one slot entry.
    ///
    /// Used when a permanent redirect names a new owner for that slot.
    /// Idempotent; the rest of the table is carried over untouched.
    pub fn apply_patch(&self, slot: u16, node: Node) {
        if slot >= SLOT_COUNT {
            return;
        }
        let current = self.snapshot();
        let node = Arc::new(node);

        let mut slots = current.slots.clone();
        slots[slot as usize] = Some(node.clone());

        let mut nodes = current.nodes.clone();
        if !nodes.iter().any(|n| **n == *node) {
            nodes.push(node);
        }

        self.swap(SlotTable { slots, nodes });
    }

    /// Atomically replace the whole mapping and the derived registry.
    pub fn rebuild(&self, assignments: &[SlotAssignment]) {
        let mut slots: Vec<Option<Arc<Node>>> = vec![None; SLOT_COUNT as usize];
        let mut nodes: Vec<Arc<Node>> = Vec::new();
        let mut seen: HashSet<(String, u16)> = HashSet::new();

        for assignment in assignments {
            let master = Arc::new(assignment.master.clone());
            for slot in assignment.range.start..=assignment.range.end {
                slots[slot as usize] = Some(master.clone());
            }
            if seen.insert((master.host().to_string(), master.port())) {
                nodes.push(master.clone());
            }
            for replica in &assignment.replicas {
                if seen.insert((replica.host().to_string(), replica.port())) {
                    nodes.push(Arc::new(replica.clone()));
                }
            }
        }

        self.swap(SlotTable { slots, nodes });
    }

    /// All known nodes (masters and replicas)
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.snapshot().nodes.clone()
    }

    /// All known master nodes
    pub fn masters(&self) -> Vec<Arc<Node>> {
        self.snapshot()
            .nodes
            .iter()
            .filter(|n| n.role() == NodeRole::Master)
            .cloned()
            .collect()
    }

    /// Whether the map holds at least one slot assignment
    pub fn is_initialized(&self) -> bool {
        self.snapshot().slots.iter().any(|s| s.is_some())
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        Self::new()
    }
}
